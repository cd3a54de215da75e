// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Stored comparer deltas (precomputed snapshot differences).

use super::{non_empty, require_destination, require_timestamp, Decoded, DocumentDecoder};
use crate::churn::{ChangeKind, ChangeStatus, SnapshotDelta};
use crate::error::{RecordKind, Result, SkippedRecord};
use crate::path::PathDescriptor;
use serde::{Deserialize, Serialize};

/// Delta document.
///
/// Example JSON:
/// ```json
/// {
///   "timestamp": "2025-07-15T22:15",
///   "destination": "19-ffaa:0:1301",
///   "change_status": "change_detected",
///   "changes": [
///     {"fingerprint": "a1", "sequence": "19-ffaa:1:11de#1 19-ffaa:0:1301#2", "change": "added"}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaDocument {
    #[serde(default)]
    pub destination: Option<String>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub change_status: Option<String>,

    #[serde(default)]
    pub changes: Vec<DeltaChange>,
}

/// One change line in a delta document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaChange {
    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default)]
    pub sequence: Option<String>,

    #[serde(default)]
    pub change: Option<String>,
}

impl DocumentDecoder for DeltaDocument {
    type Output = SnapshotDelta;
    const KIND: RecordKind = RecordKind::Delta;

    fn destination_hint(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    fn decode(&self, formats: &[String]) -> Result<Decoded<SnapshotDelta>> {
        let destination = require_destination(self.destination.as_deref())?;
        let timestamp = require_timestamp(self.timestamp.as_deref(), formats)?;
        let status = self.change_status.as_deref().and_then(ChangeStatus::parse);

        let mut skipped = Vec::new();
        let mut changes = Vec::with_capacity(self.changes.len());
        for change in &self.changes {
            // Only added/removed lines carry churn
            let kind = match change.change.as_deref() {
                Some("added") => ChangeKind::Added,
                Some("removed") => ChangeKind::Removed,
                _ => continue,
            };
            let Some(fp) = non_empty(change.fingerprint.as_deref()) else {
                skipped.push(SkippedRecord::new(
                    Self::KIND,
                    Some(destination.as_str()),
                    format!("{} change without fingerprint", kind.as_str()),
                ));
                continue;
            };
            let descriptor =
                PathDescriptor::from_sequence(fp, change.sequence.as_deref().unwrap_or_default());
            changes.push((kind, descriptor));
        }

        Ok(Decoded {
            value: SnapshotDelta {
                destination,
                timestamp,
                status,
                changes,
            },
            skipped,
        })
    }
}
