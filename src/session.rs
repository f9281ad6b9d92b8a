//! Session state: the four datasets, upload telemetry, the first-ingestion
//! date, the latest error and the active view.
//!
//! All mutation goes through the transition methods below; the merge engine
//! never touches this struct. A session is shared as [`SharedSession`]
//! (`tokio::sync::Mutex`) between the orchestrator, the view analyzer and
//! the HTTP handlers.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::IngestError;
use crate::models::{Dataset, UploadDomain, ViewId};

pub type SharedSession = Arc<Mutex<SessionState>>;

/// Per-domain upload counters. Observational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadTelemetry {
    pub has_uploaded: bool,
    pub upload_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionMeta {
    /// Set by the first successful commit, never overwritten.
    pub first_ingestion_date: Option<NaiveDate>,
}

/// Where the current (or last) upload is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    #[default]
    Idle,
    Parsing,
    Normalizing,
    Merging,
    Committed,
    Failed,
}

impl IngestStage {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            IngestStage::Parsing | IngestStage::Normalizing | IngestStage::Merging
        )
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    datasets: BTreeMap<UploadDomain, Dataset>,
    telemetry: BTreeMap<UploadDomain, UploadTelemetry>,
    meta: SessionMeta,
    last_error: Option<String>,
    stage: IngestStage,
    active_view: ViewId,
    /// Bumped on every commit; analysis derivations key on it.
    data_generation: u64,
}

/// Serializable view of the session for the HTTP surface and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub telemetry: BTreeMap<UploadDomain, UploadTelemetry>,
    pub dataset_sizes: BTreeMap<UploadDomain, usize>,
    pub first_ingestion_date: Option<NaiveDate>,
    pub last_error: Option<String>,
    pub ingesting: bool,
    pub stage: IngestStage,
    pub active_view: ViewId,
    pub data_generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Start an upload: claims the global ingestion slot and clears the
    /// previous error. Fails with [`IngestError::Busy`] while another upload
    /// is in flight, leaving the state untouched.
    pub fn begin_upload(&mut self) -> Result<(), IngestError> {
        if self.is_ingesting() {
            return Err(IngestError::Busy);
        }
        self.last_error = None;
        self.stage = IngestStage::Parsing;
        Ok(())
    }

    pub fn set_stage(&mut self, stage: IngestStage) {
        self.stage = stage;
    }

    /// Record a successful merge for `domain` and release the ingestion slot.
    pub fn commit(&mut self, merged: Dataset, today: NaiveDate) -> UploadTelemetry {
        let domain = merged.domain();
        self.datasets.insert(domain, merged);

        let telemetry = self.telemetry.entry(domain).or_default();
        telemetry.has_uploaded = true;
        telemetry.upload_count += 1;
        let telemetry = *telemetry;

        if self.meta.first_ingestion_date.is_none() {
            self.meta.first_ingestion_date = Some(today);
        }
        self.stage = IngestStage::Committed;
        self.data_generation += 1;
        telemetry
    }

    /// Record a failed upload and release the ingestion slot.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.stage = IngestStage::Failed;
    }

    /// Returns `true` when the view actually changed.
    pub fn set_active_view(&mut self, view: ViewId) -> bool {
        let changed = self.active_view != view;
        self.active_view = view;
        changed
    }

    pub fn dataset(&self, domain: UploadDomain) -> Option<&Dataset> {
        self.datasets.get(&domain)
    }

    pub fn has_dataset(&self, domain: UploadDomain) -> bool {
        self.datasets.contains_key(&domain)
    }

    pub fn telemetry(&self, domain: UploadDomain) -> UploadTelemetry {
        self.telemetry.get(&domain).copied().unwrap_or_default()
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stage(&self) -> IngestStage {
        self.stage
    }

    pub fn is_ingesting(&self) -> bool {
        self.stage.is_in_flight()
    }

    pub fn active_view(&self) -> ViewId {
        self.active_view
    }

    pub fn data_generation(&self) -> u64 {
        self.data_generation
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            telemetry: UploadDomain::ALL
                .iter()
                .map(|d| (*d, self.telemetry(*d)))
                .collect(),
            dataset_sizes: self
                .datasets
                .iter()
                .map(|(d, ds)| (*d, ds.len()))
                .collect(),
            first_ingestion_date: self.meta.first_ingestion_date,
            last_error: self.last_error.clone(),
            ingesting: self.is_ingesting(),
            stage: self.stage,
            active_view: self.active_view,
            data_generation: self.data_generation,
        }
    }
}
