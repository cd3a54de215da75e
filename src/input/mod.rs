// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Decoders for collector documents.
//!
//! Each document family has a serde schema accepting the current field names
//! plus the legacy aliases still found in archived data, and a
//! [`DocumentDecoder`] impl that validates required fields and produces the
//! canonical type:
//! - [`PathSnapshotDocument`] -> [`Snapshot`](crate::store::Snapshot)
//! - [`DeltaDocument`] -> [`SnapshotDelta`](crate::churn::SnapshotDelta)
//! - [`ProbeBatchDocument`] -> [`ProbeBatch`]
//! - [`BandwidthBatchDocument`] -> [`BandwidthBatch`]
//! - [`TracerouteDocument`] -> [`TraceRecord`]
//!
//! A document that fails validation becomes a [`SkippedRecord`]; only input
//! that is not JSON, or whose top level is neither an object nor an array,
//! is fatal.

mod bandwidth;
mod delta;
mod probe;
mod snapshot;
mod traceroute;

pub use bandwidth::{
    BandwidthBatch, BandwidthBatchDocument, BandwidthEntry, BandwidthRecord, BandwidthResult,
    Direction, DirectionBlock, TargetServer, TargetTier, METRIC_BW, METRIC_IA_AVG, METRIC_IA_MAX,
    METRIC_IA_MDEV, METRIC_IA_MIN, METRIC_LOSS,
};
pub use delta::{DeltaChange, DeltaDocument};
pub use probe::{
    PingReply, PingResult, PingStatistics, ProbeBatch, ProbeBatchDocument, ProbeEntry, ProbeRecord,
    METRIC_AVG_RTT, METRIC_MDEV_RTT, METRIC_PACKET_LOSS,
};
pub use snapshot::{PathEntry, PathSnapshotDocument};
pub use traceroute::{TraceRecord, TracerouteDocument, TracerouteHop};

use crate::error::{Error, RecordKind, Result, SkippedRecord};
use crate::time::{parse_timestamp, Timestamp};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A decoded value plus the sub-records dropped while decoding it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub skipped: Vec<SkippedRecord>,
}

/// All records decoded from one input, plus everything skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedRecord>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Trait for collector document schemas.
pub trait DocumentDecoder: DeserializeOwned {
    /// Canonical type produced.
    type Output;

    /// Family used when reporting skips.
    const KIND: RecordKind;

    /// Destination named by the document, if any (for skip reports).
    fn destination_hint(&self) -> Option<&str>;

    /// Validate and convert. `Err` means the whole document is skipped.
    fn decode(&self, formats: &[String]) -> Result<Decoded<Self::Output>>;
}

/// Decode JSON text holding one document or an array of documents.
pub fn decode_documents<D: DocumentDecoder>(
    json: &str,
    formats: &[String],
) -> Result<Batch<D::Output>> {
    let value: Value = serde_json::from_str(json)?;
    decode_value::<D>(value, formats)
}

/// Same as [`decode_documents`] for an already parsed value.
pub fn decode_value<D: DocumentDecoder>(
    value: Value,
    formats: &[String],
) -> Result<Batch<D::Output>> {
    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(Error::malformed(format!(
                "expected object or array of {} documents, got {}",
                D::KIND.as_str(),
                json_type(&other)
            )))
        }
    };

    let mut batch = Batch::default();
    for item in items {
        let doc: D = match serde_json::from_value(item) {
            Ok(doc) => doc,
            Err(e) => {
                batch.skipped.push(SkippedRecord::new(D::KIND, None, e.to_string()));
                continue;
            }
        };
        match doc.decode(formats) {
            Ok(decoded) => {
                batch.records.push(decoded.value);
                batch.skipped.extend(decoded.skipped);
            }
            Err(e) => batch
                .skipped
                .push(SkippedRecord::new(D::KIND, doc.destination_hint(), e.to_string())),
        }
    }
    Ok(batch)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shared required-field checks.
pub(crate) fn require_destination(destination: Option<&str>) -> Result<String> {
    match destination.map(str::trim) {
        Some(d) if !d.is_empty() => Ok(d.to_string()),
        _ => Err(Error::malformed("missing destination")),
    }
}

pub(crate) fn require_timestamp(raw: Option<&str>, formats: &[String]) -> Result<Timestamp> {
    let raw = raw.ok_or_else(|| Error::malformed("missing timestamp"))?;
    parse_timestamp(raw, formats)
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;

    fn formats() -> Vec<String> {
        IngestConfig::default().timestamp_formats
    }

    #[test]
    fn test_top_level_scalar_is_fatal() {
        let err = decode_documents::<PathSnapshotDocument>("42", &formats()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        let err = decode_documents::<PathSnapshotDocument>("{not json", &formats()).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_array_with_bad_element_skips_it() {
        let json = r#"[
            {"destination": "D", "timestamp": "2025-07-15T10:00", "paths": []},
            {"destination": "D", "paths": []},
            "oops"
        ]"#;
        let batch = decode_documents::<PathSnapshotDocument>(json, &formats()).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.skipped[0].destination.as_deref(), Some("D"));
    }

    #[test]
    fn test_require_helpers() {
        assert!(require_destination(Some("  ")).is_err());
        assert_eq!(require_destination(Some(" D ")).unwrap(), "D");
        assert!(require_timestamp(None, &formats()).is_err());
        assert_eq!(non_empty(Some("")), None);
    }
}
