//! # Salesboard CLI (`salesboard`)
//!
//! ## Usage
//!
//! ```bash
//! salesboard --config ./config/salesboard.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `salesboard serve` | Start the JSON HTTP server for the dashboard |
//! | `salesboard ingest --upload <domain>=<path> ...` | Run uploads against a fresh session and print the result |
//! | `salesboard schema <domain>` | Print the target schema sent to the oracle |
//!
//! ## Examples
//!
//! ```bash
//! # Two sales files and a review export, then the flagship analysis
//! salesboard ingest --upload sales=jan.xlsx --upload sales=feb.csv \
//!     --upload review=voc.json --view flagship
//!
//! # Offline, with the rule-based oracle
//! salesboard --config ./config/offline.toml ingest --upload product=weekly.csv
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `salesboard=info,tower_http=info`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

use salesboard::analysis::ViewAnalyzer;
use salesboard::config;
use salesboard::ingest::Ingestor;
use salesboard::models::{UploadDomain, ViewId};
use salesboard::normalize::Normalizer;
use salesboard::oracle::create_oracle;
use salesboard::progress::ProgressMode;
use salesboard::schema;
use salesboard::server;
use salesboard::session::SessionState;

/// Salesboard: upload-driven sales analytics ingestion.
///
/// Uploaded spreadsheets are parsed, normalized into typed records by an LLM
/// oracle, and merged into per-domain datasets by natural key.
#[derive(Parser)]
#[command(
    name = "salesboard",
    about = "Upload-driven sales analytics ingestion",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/salesboard.toml`. Built-in defaults are used
    /// when the file does not exist.
    #[arg(long, global = true, default_value = "./config/salesboard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the JSON HTTP server.
    Serve,

    /// Run one or more uploads sequentially against a fresh session.
    ///
    /// Prints the resulting datasets, telemetry and (with `--view`) the
    /// view's analysis as JSON on stdout. A failed upload is reported and
    /// does not stop the ones after it.
    Ingest {
        /// Upload as `<domain>=<path>`; repeatable. Domains: sales,
        /// competitor, product, review.
        #[arg(long = "upload", value_parser = parse_upload_arg, required = true)]
        uploads: Vec<(UploadDomain, PathBuf)>,

        /// Active view to analyze after the uploads.
        #[arg(long)]
        view: Option<ViewId>,

        /// Progress on stderr: human, json, or off. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Print the target schema description for a domain.
    Schema { domain: UploadDomain },
}

fn parse_upload_arg(s: &str) -> Result<(UploadDomain, PathBuf), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid DOMAIN=PATH: no '=' found in '{}'", s))?;
    let domain = s[..pos].parse::<UploadDomain>()?;
    Ok((domain, PathBuf::from(&s[pos + 1..])))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salesboard=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Schema { domain } = &cli.command {
        println!("{}", schema::describe(*domain));
        return Ok(());
    }

    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest {
            uploads,
            view,
            progress,
        } => {
            run_ingest(&cfg, uploads, view, progress).await?;
        }
        Commands::Schema { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}

async fn run_ingest(
    cfg: &config::Config,
    uploads: Vec<(UploadDomain, PathBuf)>,
    view: Option<ViewId>,
    progress: Option<ProgressMode>,
) -> anyhow::Result<()> {
    let oracle = create_oracle(&cfg.oracle).context("Failed to initialize oracle")?;
    let session = SessionState::shared();
    let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
    let ingestor = Ingestor::new(
        session.clone(),
        Normalizer::new(oracle.clone(), cfg.oracle.sample_limit),
    )
    .with_reporter(mode.reporter());

    let total = uploads.len();
    let mut results = Vec::with_capacity(total);
    let mut failed = 0;
    for (domain, path) in uploads {
        match ingestor.ingest_path(domain, &path).await {
            Ok(outcome) => results.push(json!({
                "path": path.display().to_string(),
                "ok": true,
                "outcome": outcome,
            })),
            Err(err) => {
                failed += 1;
                eprintln!("Error: {} ({})", err.user_message(), path.display());
                results.push(json!({
                    "path": path.display().to_string(),
                    "ok": false,
                    "domain": domain,
                    "error": { "code": err.code(), "message": err.user_message() },
                }));
            }
        }
    }

    let analysis = match view {
        Some(view) => {
            session.lock().await.set_active_view(view);
            let analyzer = ViewAnalyzer::new(oracle, session.clone(), cfg.analysis.clone());
            Some(analyzer.refresh().await)
        }
        None => None,
    };

    let report = {
        let state = session.lock().await;
        let datasets: BTreeMap<UploadDomain, serde_json::Value> = UploadDomain::ALL
            .iter()
            .filter_map(|d| state.dataset(*d).map(|ds| (*d, ds.records_json())))
            .collect();
        json!({
            "uploads": results,
            "session": state.snapshot(),
            "datasets": datasets,
            "analysis": analysis,
        })
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if failed == total {
        bail!("all {} uploads failed", total);
    }
    Ok(())
}
