// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Path-discovery snapshot documents.

use super::{non_empty, require_destination, require_timestamp, Decoded, DocumentDecoder};
use crate::error::{RecordKind, Result, SkippedRecord};
use crate::path::PathDescriptor;
use crate::store::Snapshot;
use serde::{Deserialize, Serialize};

/// Path snapshot document.
///
/// Example JSON:
/// ```json
/// {
///   "destination": "19-ffaa:0:1301",
///   "timestamp": "2025-07-15T22:14",
///   "paths": [
///     {"fingerprint": "6f1c...", "sequence": "19-ffaa:1:11de#0,1 19-ffaa:0:1301#2"}
///   ]
/// }
/// ```
///
/// Older archives name the destination `ia`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSnapshotDocument {
    #[serde(default, alias = "ia")]
    pub destination: Option<String>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub paths: Vec<PathEntry>,
}

/// One path in a snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEntry {
    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default)]
    pub sequence: Option<String>,
}

impl DocumentDecoder for PathSnapshotDocument {
    type Output = Snapshot;
    const KIND: RecordKind = RecordKind::PathSnapshot;

    fn destination_hint(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    fn decode(&self, formats: &[String]) -> Result<Decoded<Snapshot>> {
        let destination = require_destination(self.destination.as_deref())?;
        let timestamp = require_timestamp(self.timestamp.as_deref(), formats)?;

        let mut skipped = Vec::new();
        let mut descriptors = Vec::with_capacity(self.paths.len());
        for (i, path) in self.paths.iter().enumerate() {
            let Some(fp) = non_empty(path.fingerprint.as_deref()) else {
                skipped.push(SkippedRecord::new(
                    Self::KIND,
                    Some(destination.as_str()),
                    format!("path #{} has no fingerprint", i),
                ));
                continue;
            };
            descriptors.push(PathDescriptor::from_sequence(
                fp,
                path.sequence.as_deref().unwrap_or_default(),
            ));
        }

        Ok(Decoded {
            value: Snapshot::new(destination, timestamp, descriptors),
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::input::decode_documents;
    use crate::path::Fingerprint;

    fn formats() -> Vec<String> {
        IngestConfig::default().timestamp_formats
    }

    #[test]
    fn test_decode_snapshot() {
        let json = r#"{
            "destination": "19-ffaa:0:1301",
            "timestamp": "2025-07-15T22:14",
            "paths": [
                {"fingerprint": "a", "sequence": "19-ffaa:1:11de#0,1 19-ffaa:0:1301#2"},
                {"fingerprint": "b",
                 "sequence": "19-ffaa:1:11de#3 19-ffaa:0:1303#1 19-ffaa:0:1301#4"}
            ]
        }"#;
        let batch = decode_documents::<PathSnapshotDocument>(json, &formats()).unwrap();
        assert!(batch.skipped.is_empty());
        let snap = &batch.records[0];
        assert_eq!(snap.destination, "19-ffaa:0:1301");
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.descriptor(&Fingerprint::from("b")).unwrap().hop_count, 3);
    }

    #[test]
    fn test_legacy_ia_alias() {
        let json = r#"{"ia": "D", "timestamp": "2025-07-15T22:14:00Z", "paths": []}"#;
        let batch = decode_documents::<PathSnapshotDocument>(json, &formats()).unwrap();
        assert_eq!(batch.records[0].destination, "D");
        assert!(batch.records[0].is_empty());
    }

    #[test]
    fn test_path_without_fingerprint_skipped() {
        let json = r#"{"destination": "D", "timestamp": "2025-07-15T22:14",
            "paths": [{"sequence": "A#1"}, {"fingerprint": "x"}]}"#;
        let batch = decode_documents::<PathSnapshotDocument>(json, &formats()).unwrap();
        assert_eq!(batch.records[0].len(), 1);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].kind, RecordKind::PathSnapshot);
    }

    #[test]
    fn test_bad_timestamp_skips_document() {
        let json = r#"{"destination": "D", "timestamp": "July 15th", "paths": []}"#;
        let batch = decode_documents::<PathSnapshotDocument>(json, &formats()).unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.skipped.len(), 1);
        assert!(batch.skipped[0].reason.contains("timestamp"));
    }
}
