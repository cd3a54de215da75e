// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Latency probe batches.

use super::{non_empty, require_destination, require_timestamp, Decoded, DocumentDecoder};
use crate::error::{Error, RecordKind, Result, SkippedRecord};
use crate::matcher::MetricMap;
use crate::path::Fingerprint;
use crate::series::RunningStats;
use crate::stabilization::TimelinePoint;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

pub const METRIC_AVG_RTT: &str = "avg_rtt";
pub const METRIC_MDEV_RTT: &str = "mdev_rtt";
pub const METRIC_PACKET_LOSS: &str = "packet_loss";

/// Probe batch document.
///
/// Example JSON:
/// ```json
/// {
///   "destination": "17-ffaa:1:11e4",
///   "timestamp": "2025-07-15T22:14",
///   "probes": [{
///     "fingerprint": "a1",
///     "ping_result": {
///       "statistics": {"avg_rtt": 48.2, "mdev_rtt": 1.1, "packet_loss": 0.0},
///       "replies": [{"sequence_number": 0}, {"sequence_number": 1}]
///     }
///   }]
/// }
/// ```
///
/// Older archives name the destination `ia` and reply sequence `scmp_seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeBatchDocument {
    #[serde(default, alias = "ia")]
    pub destination: Option<String>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub probes: Vec<ProbeEntry>,
}

/// One probed path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeEntry {
    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default)]
    pub ping_result: Option<PingResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingResult {
    #[serde(default)]
    pub statistics: Option<PingStatistics>,

    #[serde(default)]
    pub replies: Vec<PingReply>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingStatistics {
    #[serde(default)]
    pub avg_rtt: Option<f64>,
    #[serde(default)]
    pub mdev_rtt: Option<f64>,
    #[serde(default)]
    pub packet_loss: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingReply {
    #[serde(default, alias = "scmp_seq")]
    pub sequence_number: Option<u64>,
}

/// Canonical per-path probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRecord {
    pub fingerprint: Fingerprint,
    pub metrics: MetricMap,
    /// Reply sequence numbers arrived out of order.
    pub sequence_issue: bool,
}

impl ProbeRecord {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }
}

/// Canonical probe batch for one destination at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeBatch {
    pub destination: String,
    pub timestamp: Timestamp,
    pub probes: Vec<ProbeRecord>,
}

impl ProbeBatch {
    /// Mean of `metric` across probes that report it.
    pub fn mean_metric(&self, metric: &str) -> Option<f64> {
        let mut acc = RunningStats::new();
        for probe in &self.probes {
            if let Some(v) = probe.metric(metric) {
                acc.add_sample(v);
            }
        }
        acc.mean()
    }

    /// Timeline point for stabilization, `None` if no probe reports `metric`.
    pub fn timeline_point(&self, metric: &str) -> Option<TimelinePoint> {
        Some(TimelinePoint {
            timestamp: self.timestamp,
            value: self.mean_metric(metric)?,
            fingerprints: self.probes.iter().map(|p| p.fingerprint.clone()).collect(),
        })
    }
}

fn sequence_out_of_order(replies: &[PingReply]) -> bool {
    let seqs: Vec<u64> = replies.iter().filter_map(|r| r.sequence_number).collect();
    seqs.windows(2).any(|w| w[0] > w[1])
}

impl DocumentDecoder for ProbeBatchDocument {
    type Output = ProbeBatch;
    const KIND: RecordKind = RecordKind::Probe;

    fn destination_hint(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    fn decode(&self, formats: &[String]) -> Result<Decoded<ProbeBatch>> {
        let destination = require_destination(self.destination.as_deref())?;
        let timestamp = require_timestamp(self.timestamp.as_deref(), formats)?;
        if self.probes.is_empty() {
            return Err(Error::malformed("probe batch has no probes"));
        }

        let mut skipped = Vec::new();
        let mut probes = Vec::with_capacity(self.probes.len());
        for (i, entry) in self.probes.iter().enumerate() {
            let fingerprint = non_empty(entry.fingerprint.as_deref());
            let stats = entry.ping_result.as_ref().and_then(|p| p.statistics.as_ref());
            let (Some(fp), Some(stats)) = (fingerprint, stats) else {
                skipped.push(SkippedRecord::new(
                    Self::KIND,
                    Some(destination.as_str()),
                    format!("probe #{} lacks fingerprint or statistics", i),
                ));
                continue;
            };

            let mut metrics = MetricMap::new();
            metrics.insert(METRIC_AVG_RTT.to_string(), stats.avg_rtt);
            metrics.insert(METRIC_MDEV_RTT.to_string(), stats.mdev_rtt);
            metrics.insert(METRIC_PACKET_LOSS.to_string(), stats.packet_loss);

            let replies = entry
                .ping_result
                .as_ref()
                .map(|p| p.replies.as_slice())
                .unwrap_or_default();

            probes.push(ProbeRecord {
                fingerprint: Fingerprint::from(fp),
                metrics,
                sequence_issue: sequence_out_of_order(replies),
            });
        }

        Ok(Decoded {
            value: ProbeBatch {
                destination,
                timestamp,
                probes,
            },
            skipped,
        })
    }
}
