//! Error taxonomy for the ingestion pipeline.
//!
//! Each pipeline stage has its own error type so callers can tell a bad
//! file apart from a failed oracle call. [`IngestError`] wraps them at the
//! orchestrator boundary and renders the single user-facing message that
//! lands in the session error slot.

use thiserror::Error;

use crate::models::UploadDomain;

/// Raw parsing failed. Messages are surfaced to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unsupported file format: '{0}' (expected csv, json, xlsx or xls)")]
    UnsupportedFormat(String),
    #[error("JSON parse error: {0}")]
    MalformedJson(String),
    #[error("invalid JSON shape: {0}")]
    InvalidShape(String),
    #[error("CSV parse error: {0}")]
    CsvParseError(String),
    #[error("Excel parse error: {0}")]
    ExcelParseError(String),
    #[error("failed to read upload: {0}")]
    Io(String),
}

/// The transformation oracle failed, or its answer did not hold up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("record {index} does not match the target schema: {reason}")]
    InvalidRecord { index: usize, reason: String },
    #[error("oracle provider is disabled")]
    Disabled,
}

/// A single upload failed somewhere between parsing and commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("no valid {0} data found in the uploaded file")]
    NoValidData(UploadDomain),
    #[error("another upload is already in progress")]
    Busy,
    #[error("upload was interrupted: {0}")]
    Interrupted(String),
}

impl IngestError {
    /// Text stored in the session error slot for this failure.
    pub fn user_message(&self) -> String {
        match self {
            IngestError::Parse(e) => e.to_string(),
            IngestError::Oracle(e) => format!("AI transformation failed: {}", e),
            IngestError::NoValidData(domain) => format!(
                "No valid data found in the uploaded file for {}",
                domain.label()
            ),
            IngestError::Busy | IngestError::Interrupted(_) => self.to_string(),
        }
    }

    /// Machine-readable code used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Parse(ParseError::UnsupportedFormat(_)) => "unsupported_format",
            IngestError::Parse(_) => "bad_request",
            IngestError::Oracle(_) => "oracle_failed",
            IngestError::NoValidData(_) => "no_valid_data",
            IngestError::Busy => "busy",
            IngestError::Interrupted(_) => "interrupted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_surface_verbatim() {
        let err = IngestError::from(ParseError::CsvParseError("bad row 3".into()));
        assert_eq!(err.user_message(), "CSV parse error: bad row 3");
    }

    #[test]
    fn oracle_errors_are_prefixed() {
        let err = IngestError::from(OracleError::Unavailable("timeout".into()));
        assert_eq!(
            err.user_message(),
            "AI transformation failed: oracle unavailable: timeout"
        );
        let err = IngestError::from(OracleError::MalformedResponse("eof".into()));
        assert!(err.user_message().starts_with("AI transformation failed:"));
    }

    #[test]
    fn no_valid_data_is_distinct() {
        let err = IngestError::NoValidData(UploadDomain::Review);
        assert!(err.user_message().starts_with("No valid data"));
        assert_eq!(err.code(), "no_valid_data");
    }
}
