//! Upload progress reporting.
//!
//! Reports each stage an upload passes through (`parsing`, `normalizing`,
//! `merging`, then `committed` or `failed`) so CLI users see where a slow
//! oracle call is stuck. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use crate::models::UploadDomain;

/// A single progress event for one upload.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    /// Reading and decoding the file.
    Parsing {
        domain: UploadDomain,
        file_name: String,
    },
    /// Waiting on the oracle with `rows` raw rows.
    Normalizing { domain: UploadDomain, rows: u64 },
    /// Overlaying `records` normalized records onto the dataset.
    Merging { domain: UploadDomain, records: u64 },
    Committed {
        domain: UploadDomain,
        total: u64,
        upload_count: u32,
    },
    Failed {
        domain: UploadDomain,
        message: String,
    },
}

impl IngestProgressEvent {
    pub fn stage(&self) -> &'static str {
        match self {
            IngestProgressEvent::Parsing { .. } => "parsing",
            IngestProgressEvent::Normalizing { .. } => "normalizing",
            IngestProgressEvent::Merging { .. } => "merging",
            IngestProgressEvent::Committed { .. } => "committed",
            IngestProgressEvent::Failed { .. } => "failed",
        }
    }

    pub fn domain(&self) -> UploadDomain {
        match self {
            IngestProgressEvent::Parsing { domain, .. }
            | IngestProgressEvent::Normalizing { domain, .. }
            | IngestProgressEvent::Merging { domain, .. }
            | IngestProgressEvent::Committed { domain, .. }
            | IngestProgressEvent::Failed { domain, .. } => *domain,
        }
    }
}

/// Reports upload progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the orchestrator.
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "upload sales  normalizing  1,234 rows".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let detail = match &event {
            IngestProgressEvent::Parsing { file_name, .. } => file_name.clone(),
            IngestProgressEvent::Normalizing { rows, .. } => {
                format!("{} rows", format_number(*rows))
            }
            IngestProgressEvent::Merging { records, .. } => {
                format!("{} records", format_number(*records))
            }
            IngestProgressEvent::Committed {
                total,
                upload_count,
                ..
            } => format!(
                "{} records in dataset (upload #{})",
                format_number(*total),
                upload_count
            ),
            IngestProgressEvent::Failed { message, .. } => message.clone(),
        };
        let line = format!("upload {}  {}  {}\n", event.domain(), event.stage(), detail);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let mut obj = serde_json::json!({
            "event": "progress",
            "domain": event.domain().as_str(),
            "stage": event.stage(),
        });
        match &event {
            IngestProgressEvent::Parsing { file_name, .. } => {
                obj["file_name"] = serde_json::json!(file_name);
            }
            IngestProgressEvent::Normalizing { rows, .. } => {
                obj["rows"] = serde_json::json!(rows);
            }
            IngestProgressEvent::Merging { records, .. } => {
                obj["records"] = serde_json::json!(records);
            }
            IngestProgressEvent::Committed {
                total,
                upload_count,
                ..
            } => {
                obj["total"] = serde_json::json!(total);
                obj["upload_count"] = serde_json::json!(upload_count);
            }
            IngestProgressEvent::Failed { message, .. } => {
                obj["message"] = serde_json::json!(message);
            }
        }
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller can pass it to the orchestrator.
    pub fn reporter(&self) -> Arc<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}'. Must be human, json, or off.",
                other
            )),
        }
    }
}
