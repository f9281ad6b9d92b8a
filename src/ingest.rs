//! Ingestion orchestrator.
//!
//! Drives one upload end to end:
//!
//! ```text
//! Idle → Parsing → Normalizing → Merging → Committed | Failed
//! ```
//!
//! 1. **Claim** the global ingestion slot (fails with [`IngestError::Busy`]).
//! 2. **Parse** the file into raw rows ([`crate::parse`]).
//! 3. **Normalize** the rows through the oracle ([`crate::normalize`]).
//! 4. **Merge** into the domain's dataset and commit telemetry and the
//!    first-ingestion date in one critical section ([`crate::merge`]).
//!
//! Any failure in steps 2–3 is converted into the session's error slot and
//! leaves datasets, telemetry and the date untouched.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{IngestError, ParseError};
use crate::merge;
use crate::models::UploadDomain;
use crate::normalize::{NormalizeStats, Normalizer};
use crate::parse;
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress};
use crate::session::{IngestStage, SharedSession, UploadTelemetry};

/// One uploaded file addressed to a domain.
#[derive(Debug, Clone)]
pub struct Upload {
    pub domain: UploadDomain,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(domain: UploadDomain, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            domain,
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an upload from disk; the file name (and so the format) comes from the path.
    pub async fn from_path(domain: UploadDomain, path: &Path) -> Result<Self, ParseError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        parse::SourceFormat::from_file_name(&file_name)?;
        let bytes = parse::read_upload(path).await?;
        Ok(Self::new(domain, file_name, bytes))
    }
}

enum Source {
    Loaded(Upload),
    File(PathBuf),
}

impl Source {
    fn file_name(&self) -> String {
        match self {
            Source::Loaded(upload) => upload.file_name.clone(),
            Source::File(path) => path.display().to_string(),
        }
    }
}

/// Result of a committed upload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub upload_id: Uuid,
    pub domain: UploadDomain,
    /// Raw rows parsed from the file.
    pub parsed_rows: usize,
    /// Normalized records merged in.
    pub received: usize,
    /// Records in the dataset after the merge.
    pub total: usize,
    pub telemetry: UploadTelemetry,
    pub first_ingestion_date: Option<NaiveDate>,
    pub sampled: usize,
    pub extrapolated: usize,
    pub dropped: usize,
}

/// Owns the upload pipeline for one session.
#[derive(Clone)]
pub struct Ingestor {
    session: SharedSession,
    normalizer: Normalizer,
    reporter: Arc<dyn IngestProgressReporter>,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl Ingestor {
    pub fn new(session: SharedSession, normalizer: Normalizer) -> Self {
        Self {
            session,
            normalizer,
            reporter: Arc::new(NoProgress),
            today: local_today,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn IngestProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Override the calendar used for the first-ingestion date.
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Run one upload. On failure the session error slot holds
    /// [`IngestError::user_message`]; `Busy` leaves the session untouched.
    ///
    /// Once the slot is claimed the pipeline runs on its own task, so
    /// dropping the returned future (a disconnected HTTP client) does not
    /// abandon the session mid-stage. The upload still commits or fails.
    pub async fn ingest(&self, upload: Upload) -> Result<IngestOutcome, IngestError> {
        self.claim_and_run(upload.domain, Source::Loaded(upload)).await
    }

    /// Like [`Ingestor::ingest`], reading the file inside the pipeline so a
    /// bad path or extension is recorded in the session like any other
    /// parse failure.
    pub async fn ingest_path(
        &self,
        domain: UploadDomain,
        path: &Path,
    ) -> Result<IngestOutcome, IngestError> {
        self.claim_and_run(domain, Source::File(path.to_path_buf())).await
    }

    async fn claim_and_run(
        &self,
        domain: UploadDomain,
        source: Source,
    ) -> Result<IngestOutcome, IngestError> {
        self.session.lock().await.begin_upload()?;

        let this = self.clone();
        let task = tokio::spawn(async move { this.process(domain, source).await });
        match task.await {
            Ok(result) => result,
            Err(join) => {
                let err = IngestError::Interrupted(join.to_string());
                self.record_failure(domain, &err).await;
                Err(err)
            }
        }
    }

    async fn process(
        &self,
        domain: UploadDomain,
        source: Source,
    ) -> Result<IngestOutcome, IngestError> {
        let upload_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "upload",
            upload_id = %upload_id,
            domain = %domain,
            file = %source.file_name(),
        );

        let result = async {
            let upload = match source {
                Source::Loaded(upload) => upload,
                Source::File(path) => match Upload::from_path(domain, &path).await {
                    Ok(upload) => upload,
                    Err(e) => return Err(IngestError::from(e)),
                },
            };
            self.run(upload_id, upload).await
        }
        .instrument(span.clone())
        .await;

        if let Err(err) = &result {
            span.in_scope(|| tracing::warn!(code = err.code(), error = %err, "upload failed"));
            self.record_failure(domain, err).await;
        }
        result
    }

    async fn record_failure(&self, domain: UploadDomain, err: &IngestError) {
        let message = err.user_message();
        self.session.lock().await.fail(message.clone());
        self.reporter.report(IngestProgressEvent::Failed { domain, message });
    }

    async fn run(&self, upload_id: Uuid, upload: Upload) -> Result<IngestOutcome, IngestError> {
        let domain = upload.domain;

        self.reporter.report(IngestProgressEvent::Parsing {
            domain,
            file_name: upload.file_name.clone(),
        });
        let rows = parse::parse_upload(&upload.file_name, &upload.bytes)?;
        tracing::info!(rows = rows.len(), "parsed");
        if rows.is_empty() {
            return Err(IngestError::NoValidData(domain));
        }

        self.session.lock().await.set_stage(IngestStage::Normalizing);
        self.reporter.report(IngestProgressEvent::Normalizing {
            domain,
            rows: rows.len() as u64,
        });
        let (normalized, stats) = self.normalizer.normalize_with_stats(&rows, domain).await?;
        tracing::info!(
            oracle = self.normalizer.oracle().name(),
            records = normalized.len(),
            extrapolated = stats.extrapolated,
            dropped = stats.dropped,
            "normalized"
        );
        if normalized.is_empty() {
            return Err(IngestError::NoValidData(domain));
        }

        let received = normalized.len();
        self.reporter.report(IngestProgressEvent::Merging {
            domain,
            records: received as u64,
        });

        let (total, telemetry, first_ingestion_date) = {
            let mut session = self.session.lock().await;
            session.set_stage(IngestStage::Merging);
            let merged = merge::merge(session.dataset(domain), normalized);
            let total = merged.len();
            let telemetry = session.commit(merged, (self.today)());
            (total, telemetry, session.meta().first_ingestion_date)
        };

        tracing::info!(total, upload_count = telemetry.upload_count, "committed");
        self.reporter.report(IngestProgressEvent::Committed {
            domain,
            total: total as u64,
            upload_count: telemetry.upload_count,
        });

        let NormalizeStats {
            sampled,
            extrapolated,
            dropped,
        } = stats;
        Ok(IngestOutcome {
            upload_id,
            domain,
            parsed_rows: rows.len(),
            received,
            total,
            telemetry,
            first_ingestion_date,
            sampled,
            extrapolated,
            dropped,
        })
    }
}
