// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bandwidth test batches.
//!
//! Each tested path carries one result block per direction. Block values are
//! already numeric; text extraction belongs to the collector. Metrics are
//! flattened into a [`MetricMap`] with a direction prefix (`sc_bw`,
//! `cs_ia_mdev`, ...) so the matcher can treat them like any other metric.

use super::{non_empty, require_destination, require_timestamp, Decoded, DocumentDecoder};
use crate::error::{Error, RecordKind, Result, SkippedRecord};
use crate::matcher::MetricMap;
use crate::path::Fingerprint;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Transfer direction of a bandwidth block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Server to client (download).
    ServerToClient,
    /// Client to server (upload).
    ClientToServer,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::ServerToClient, Direction::ClientToServer];

    /// Metric name prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            Direction::ServerToClient => "sc",
            Direction::ClientToServer => "cs",
        }
    }

    /// Human label as found in collector output.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::ServerToClient => "S->C",
            Direction::ClientToServer => "C->S",
        }
    }

    /// Split `sc_bw` into `(Some(ServerToClient), "bw")`. Names without a
    /// known prefix come back unchanged with `None`.
    pub fn split_metric(name: &str) -> (Option<Direction>, &str) {
        for direction in Self::ALL {
            if let Some(rest) = name
                .strip_prefix(direction.prefix())
                .and_then(|r| r.strip_prefix('_'))
            {
                return (Some(direction), rest);
            }
        }
        (None, name)
    }

    pub fn metric_name(&self, base: &str) -> String {
        format!("{}_{}", self.prefix(), base)
    }
}

pub const METRIC_BW: &str = "bw";
pub const METRIC_LOSS: &str = "loss";
pub const METRIC_IA_MIN: &str = "ia_min";
pub const METRIC_IA_AVG: &str = "ia_avg";
pub const METRIC_IA_MAX: &str = "ia_max";
pub const METRIC_IA_MDEV: &str = "ia_mdev";

/// Bandwidth batch document.
///
/// Example JSON:
/// ```json
/// {
///   "destination": "16-ffaa:0:1002",
///   "timestamp": "2025-07-15T22:20",
///   "target_mbps": 50,
///   "paths": [{
///     "fingerprint": "a1",
///     "result": {
///       "S->C results": {"achieved_mbps": 48.9, "loss_rate": 0.1,
///                        "interarrival_avg": 0.24, "interarrival_mdev": 0.02},
///       "C->S results": {"achieved_mbps": 47.5, "loss_rate": 0.3}
///     }
///   }]
/// }
/// ```
///
/// Legacy shapes: destination under `as` or `target_server.ia`, tier under
/// `target.tier_mbps`, and single-path files with `fingerprint`/`result` at
/// the top level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthBatchDocument {
    #[serde(default, alias = "as")]
    pub destination: Option<String>,

    #[serde(default)]
    pub target_server: Option<TargetServer>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub target_mbps: Option<f64>,

    #[serde(default)]
    pub target: Option<TargetTier>,

    #[serde(default)]
    pub paths: Vec<BandwidthEntry>,

    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default)]
    pub result: Option<BandwidthResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetServer {
    #[serde(default)]
    pub ia: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetTier {
    #[serde(default)]
    pub tier_mbps: Option<f64>,
}

/// One tested path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthEntry {
    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default)]
    pub result: Option<BandwidthResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandwidthResult {
    #[serde(default)]
    pub invalid_format: bool,

    #[serde(default, rename = "S->C results")]
    pub server_to_client: Option<DirectionBlock>,

    #[serde(default, rename = "C->S results")]
    pub client_to_server: Option<DirectionBlock>,
}

impl BandwidthResult {
    pub fn block(&self, direction: Direction) -> Option<&DirectionBlock> {
        match direction {
            Direction::ServerToClient => self.server_to_client.as_ref(),
            Direction::ClientToServer => self.client_to_server.as_ref(),
        }
    }
}

/// Pre-parsed figures of one direction. Units: Mbps, percent, milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionBlock {
    #[serde(default)]
    pub achieved_mbps: Option<f64>,
    #[serde(default)]
    pub loss_rate: Option<f64>,
    #[serde(default)]
    pub interarrival_min: Option<f64>,
    #[serde(default)]
    pub interarrival_avg: Option<f64>,
    #[serde(default)]
    pub interarrival_max: Option<f64>,
    #[serde(default)]
    pub interarrival_mdev: Option<f64>,
}

impl DirectionBlock {
    fn fill(&self, direction: Direction, metrics: &mut MetricMap) {
        let fields = [
            (METRIC_BW, self.achieved_mbps),
            (METRIC_LOSS, self.loss_rate),
            (METRIC_IA_MIN, self.interarrival_min),
            (METRIC_IA_AVG, self.interarrival_avg),
            (METRIC_IA_MAX, self.interarrival_max),
            (METRIC_IA_MDEV, self.interarrival_mdev),
        ];
        for (base, value) in fields {
            metrics.insert(direction.metric_name(base), value);
        }
    }
}

/// Canonical per-path bandwidth result.
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthRecord {
    pub fingerprint: Fingerprint,
    pub metrics: MetricMap,
}

impl BandwidthRecord {
    pub fn metric(&self, direction: Direction, base: &str) -> Option<f64> {
        self.metrics.get(&direction.metric_name(base)).copied().flatten()
    }
}

/// Canonical bandwidth batch for one destination at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthBatch {
    pub destination: String,
    pub timestamp: Timestamp,
    /// Requested rate tier, if the collector recorded one.
    pub target_mbps: Option<f64>,
    pub paths: Vec<BandwidthRecord>,
}

impl BandwidthBatchDocument {
    fn resolved_destination(&self) -> Option<&str> {
        non_empty(self.destination.as_deref())
            .or_else(|| non_empty(self.target_server.as_ref().and_then(|t| t.ia.as_deref())))
    }

    fn entries(&self) -> Vec<(Option<&str>, Option<&BandwidthResult>)> {
        if self.paths.is_empty() && (self.fingerprint.is_some() || self.result.is_some()) {
            return vec![(self.fingerprint.as_deref(), self.result.as_ref())];
        }
        self.paths
            .iter()
            .map(|p| (p.fingerprint.as_deref(), p.result.as_ref()))
            .collect()
    }
}

impl DocumentDecoder for BandwidthBatchDocument {
    type Output = BandwidthBatch;
    const KIND: RecordKind = RecordKind::Bandwidth;

    fn destination_hint(&self) -> Option<&str> {
        self.resolved_destination()
    }

    fn decode(&self, formats: &[String]) -> Result<Decoded<BandwidthBatch>> {
        let destination = require_destination(self.resolved_destination())?;
        let timestamp = require_timestamp(self.timestamp.as_deref(), formats)?;
        let target_mbps = self
            .target_mbps
            .or_else(|| self.target.as_ref().and_then(|t| t.tier_mbps));

        let entries = self.entries();
        if entries.is_empty() {
            return Err(Error::malformed("bandwidth batch has no paths"));
        }

        let mut skipped = Vec::new();
        let mut paths = Vec::with_capacity(entries.len());
        for (i, (fingerprint, result)) in entries.into_iter().enumerate() {
            let reason = match (non_empty(fingerprint), result) {
                (None, _) => format!("path #{} has no fingerprint", i),
                (Some(_), None) => format!("path #{} has no result", i),
                (Some(_), Some(r)) if r.invalid_format => {
                    format!("path #{} flagged invalid_format", i)
                }
                (Some(fp), Some(r)) => {
                    let mut metrics = MetricMap::new();
                    for direction in Direction::ALL {
                        if let Some(block) = r.block(direction) {
                            block.fill(direction, &mut metrics);
                        }
                    }
                    paths.push(BandwidthRecord {
                        fingerprint: Fingerprint::from(fp),
                        metrics,
                    });
                    continue;
                }
            };
            skipped.push(SkippedRecord::new(Self::KIND, Some(destination.as_str()), reason));
        }

        Ok(Decoded {
            value: BandwidthBatch {
                destination,
                timestamp,
                target_mbps,
                paths,
            },
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::input::decode_documents;

    fn formats() -> Vec<String> {
        IngestConfig::default().timestamp_formats
    }

    #[test]
    fn test_direction_metric_names() {
        assert_eq!(Direction::ServerToClient.metric_name(METRIC_BW), "sc_bw");
        assert_eq!(
            Direction::split_metric("cs_ia_mdev"),
            (Some(Direction::ClientToServer), "ia_mdev")
        );
        assert_eq!(Direction::split_metric("avg_rtt"), (None, "avg_rtt"));
        assert_eq!(Direction::split_metric("scary"), (None, "scary"));
    }

    #[test]
    fn test_decode_batch() {
        let json = r#"{
            "destination": "16-ffaa:0:1002",
            "timestamp": "2025-07-15T22:20",
            "target_mbps": 50,
            "paths": [
                {"fingerprint": "a", "result": {
                    "S->C results": {"achieved_mbps": 48.9, "loss_rate": 0.1},
                    "C->S results": {"achieved_mbps": 47.5, "interarrival_mdev": 0.02}}},
                {"fingerprint": "b", "result": {"invalid_format": true}},
                {"fingerprint": "c"}
            ]
        }"#;
        let batch = decode_documents::<BandwidthBatchDocument>(json, &formats()).unwrap();
        assert_eq!(batch.skipped.len(), 2);

        let bw = &batch.records[0];
        assert_eq!(bw.target_mbps, Some(50.0));
        assert_eq!(bw.paths.len(), 1);
        let a = &bw.paths[0];
        assert_eq!(a.metric(Direction::ServerToClient, METRIC_BW), Some(48.9));
        assert_eq!(a.metric(Direction::ClientToServer, METRIC_IA_MDEV), Some(0.02));
        assert_eq!(a.metric(Direction::ClientToServer, METRIC_LOSS), None);
        assert_eq!(a.metrics.len(), 12);
    }

    #[test]
    fn test_legacy_single_path_shape() {
        let json = r#"{
            "target_server": {"ia": "16-ffaa:0:1002"},
            "timestamp": "2025-07-15T22:20:00",
            "target": {"tier_mbps": 10},
            "fingerprint": "a",
            "result": {"S->C results": {"achieved_mbps": 9.8}}
        }"#;
        let batch = decode_documents::<BandwidthBatchDocument>(json, &formats()).unwrap();
        let bw = &batch.records[0];
        assert_eq!(bw.destination, "16-ffaa:0:1002");
        assert_eq!(bw.target_mbps, Some(10.0));
        assert_eq!(bw.paths[0].metrics.len(), 6);
    }

    #[test]
    fn test_as_alias_and_empty_document() {
        let json = r#"[
            {"as": "D", "timestamp": "2025-07-15T22:20", "fingerprint": "x",
             "result": {"C->S results": {"achieved_mbps": 1.0}}},
            {"as": "D", "timestamp": "2025-07-15T22:20"}
        ]"#;
        let batch = decode_documents::<BandwidthBatchDocument>(json, &formats()).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].destination, "D");
        assert_eq!(batch.skipped.len(), 1);
    }
}
