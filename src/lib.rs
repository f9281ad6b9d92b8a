//! # Salesboard
//!
//! Upload-driven ingestion core for a sales analytics dashboard.
//!
//! Users upload spreadsheet, CSV or JSON exports for one of four domains
//! (sales, competitor, product, review). Each file is parsed into raw rows,
//! normalized into typed records by an external LLM oracle, and merged into
//! the domain's running dataset by its natural key. A per-view analysis text
//! is derived from the active view and its dataset.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │  parse   │──▶│ normalize │──▶│   merge   │──▶│ session  │
//! │ csv/xlsx │   │  (oracle) │   │ by key    │   │ datasets │
//! └──────────┘   └───────────┘   └───────────┘   └────┬─────┘
//!                                                      │
//!                           ┌──────────────────────────┤
//!                           ▼                          ▼
//!                     ┌──────────┐              ┌──────────┐
//!                     │ analysis │              │   HTTP   │
//!                     │ per view │              │   CLI    │
//!                     └──────────┘              └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! salesboard schema sales                          # show the target schema
//! salesboard ingest --upload sales=jan.xlsx --view flagship
//! salesboard serve                                 # start the HTTP surface
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Domains, record shapes, datasets, views |
//! | [`error`] | Error taxonomy |
//! | [`parse`] | CSV / JSON / XLSX / XLS to raw rows |
//! | [`schema`] | Target schemas and oracle-output validation |
//! | [`oracle`] | Oracle trait and providers |
//! | [`normalize`] | Sampling, oracle call, tail re-application |
//! | [`merge`] | Keyed merge engine |
//! | [`session`] | Session state and transitions |
//! | [`ingest`] | Upload orchestrator |
//! | [`analysis`] | View analysis trigger |
//! | [`recommend`] | Next-upload suggestion |
//! | [`progress`] | CLI progress reporting |
//! | [`server`] | JSON HTTP server |

pub mod analysis;
pub mod config;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod oracle;
pub mod parse;
pub mod progress;
pub mod recommend;
pub mod schema;
pub mod server;
pub mod session;
