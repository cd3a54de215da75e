// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Traceroute documents.

use super::{non_empty, require_destination, require_timestamp, Decoded, DocumentDecoder};
use crate::error::{Error, RecordKind, Result};
use crate::path::Fingerprint;
use crate::series::RunningStats;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One traceroute over one path.
///
/// Example JSON:
/// ```json
/// {
///   "destination": "19-ffaa:0:1310",
///   "timestamp": "2025-07-15T22:14",
///   "fingerprint": "a1",
///   "hops": [
///     {"isd_as": "19-ffaa:1:11de", "round_trip_times": [1.2, 1.4, 1.3]},
///     {"isd_as": "19-ffaa:0:1310", "round_trip_times": []}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteDocument {
    #[serde(default, alias = "ia")]
    pub destination: Option<String>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default)]
    pub hops: Vec<TracerouteHop>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracerouteHop {
    #[serde(default)]
    pub isd_as: Option<String>,

    #[serde(default)]
    pub round_trip_times: Vec<f64>,
}

/// Canonical traceroute result.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub destination: String,
    pub timestamp: Timestamp,
    pub fingerprint: Option<Fingerprint>,
    /// Hops reported, answered or not.
    pub hop_count: usize,
    /// Hops without a single round-trip time.
    pub missing_rtts: usize,
    /// Mean of the per-hop mean RTTs, `None` if no hop answered.
    pub avg_rtt: Option<f64>,
    /// AS-hop -> per-hop mean RTTs observed in this trace.
    pub as_rtts: BTreeMap<String, Vec<f64>>,
}

fn mean(values: &[f64]) -> Option<f64> {
    let mut acc = RunningStats::new();
    for v in values {
        acc.add_sample(*v);
    }
    acc.mean()
}

impl DocumentDecoder for TracerouteDocument {
    type Output = TraceRecord;
    const KIND: RecordKind = RecordKind::Traceroute;

    fn destination_hint(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    fn decode(&self, formats: &[String]) -> Result<Decoded<TraceRecord>> {
        let destination = require_destination(self.destination.as_deref())?;
        let timestamp = require_timestamp(self.timestamp.as_deref(), formats)?;
        if self.hops.is_empty() {
            return Err(Error::malformed("traceroute has no hops"));
        }

        let mut missing_rtts = 0;
        let mut hop_rtts = Vec::with_capacity(self.hops.len());
        let mut as_rtts: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for hop in &self.hops {
            let Some(rtt) = mean(&hop.round_trip_times) else {
                missing_rtts += 1;
                continue;
            };
            hop_rtts.push(rtt);
            if let Some(as_hop) = non_empty(hop.isd_as.as_deref()) {
                as_rtts.entry(as_hop.to_string()).or_default().push(rtt);
            }
        }

        Ok(Decoded {
            value: TraceRecord {
                destination,
                timestamp,
                fingerprint: non_empty(self.fingerprint.as_deref()).map(Fingerprint::from),
                hop_count: self.hops.len(),
                missing_rtts,
                avg_rtt: mean(&hop_rtts),
                as_rtts,
            },
            skipped: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::input::decode_documents;
    use approx::assert_relative_eq;

    fn formats() -> Vec<String> {
        IngestConfig::default().timestamp_formats
    }

    #[test]
    fn test_decode_traceroute() {
        let json = r#"{
            "ia": "19-ffaa:0:1310",
            "timestamp": "2025-07-15T22:14",
            "hops": [
                {"isd_as": "19-ffaa:1:11de", "round_trip_times": [1.0, 3.0]},
                {"isd_as": "19-ffaa:0:1303", "round_trip_times": []},
                {"isd_as": "19-ffaa:0:1310", "round_trip_times": [10.0]},
                {"round_trip_times": [6.0]},
                {"isd_as": "19-ffaa:1:11de", "round_trip_times": [4.0]}
            ]
        }"#;
        let batch = decode_documents::<TracerouteDocument>(json, &formats()).unwrap();
        let trace = &batch.records[0];

        assert_eq!(trace.destination, "19-ffaa:0:1310");
        assert_eq!(trace.fingerprint, None);
        assert_eq!(trace.hop_count, 5);
        assert_eq!(trace.missing_rtts, 1);
        // Hop means 2, 10, 6, 4
        assert_relative_eq!(trace.avg_rtt.unwrap(), 5.5);
        assert_eq!(trace.as_rtts["19-ffaa:1:11de"], vec![2.0, 4.0]);
        assert!(!trace.as_rtts.contains_key("19-ffaa:0:1303"));
    }

    #[test]
    fn test_unanswered_trace_has_no_rtt() {
        let json = r#"{"destination": "D", "timestamp": "2025-07-15T22:14", "fingerprint": "p",
            "hops": [{"isd_as": "1-a"}, {"isd_as": "1-b", "round_trip_times": []}]}"#;
        let batch = decode_documents::<TracerouteDocument>(json, &formats()).unwrap();
        let trace = &batch.records[0];
        assert_eq!(trace.missing_rtts, 2);
        assert!(trace.avg_rtt.is_none());
        assert_eq!(trace.fingerprint, Some(Fingerprint::from("p")));
    }

    #[test]
    fn test_no_hops_skipped() {
        let json = r#"{"destination": "D", "timestamp": "2025-07-15T22:14", "hops": []}"#;
        let batch = decode_documents::<TracerouteDocument>(json, &formats()).unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.skipped[0].kind, RecordKind::Traceroute);
        assert!(batch.skipped[0].reason.contains("no hops"));
    }
}
