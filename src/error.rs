// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for PathDelta
//!
//! Only structural failures surface as [`Error`]. Expected outcomes such as
//! "no stabilization point" or "no partner within tolerance" are modelled as
//! `Option` values and counters instead.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for PathDelta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for PathDelta operations
#[derive(Error, Debug)]
pub enum Error {
    /// A record is missing required fields or carries an unparseable value
    #[error("Malformed input: {reason}")]
    MalformedInput { reason: String },

    /// A snapshot already exists for this (destination, timestamp) pair
    #[error("Duplicate snapshot for {destination} at {timestamp}")]
    DuplicateTimestamp {
        destination: String,
        timestamp: Timestamp,
    },

    /// Not enough snapshots stored for the requested lookup
    #[error("Destination {destination}: need {needed} snapshot(s), have {available}")]
    NotFound {
        destination: String,
        needed: usize,
        available: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON decoding error at the top level of a document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::MalformedInput`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            reason: reason.into(),
        }
    }
}

/// Family of input document a skipped record belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    PathSnapshot,
    Delta,
    Probe,
    Bandwidth,
    Traceroute,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::PathSnapshot => "path_snapshot",
            RecordKind::Delta => "delta",
            RecordKind::Probe => "probe",
            RecordKind::Bandwidth => "bandwidth",
            RecordKind::Traceroute => "traceroute",
        }
    }
}

/// A record dropped during ingestion. Never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub kind: RecordKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(kind: RecordKind, destination: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            destination: destination.map(str::to_string),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::malformed("missing fingerprint");
        assert_eq!(err.to_string(), "Malformed input: missing fingerprint");

        let err = Error::NotFound {
            destination: "19-ffaa:0:1301".to_string(),
            needed: 2,
            available: 1,
        };
        assert!(err.to_string().contains("need 2"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_skipped_record() {
        let skipped = SkippedRecord::new(RecordKind::Probe, Some("D"), "no fingerprint");
        assert_eq!(skipped.kind.as_str(), "probe");
        assert_eq!(skipped.destination.as_deref(), Some("D"));
    }
}
