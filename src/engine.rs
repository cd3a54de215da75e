// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! AnalysisEngine - main orchestration for one analysis run.

use crate::churn::{ChurnDetector, DestinationChurn, SnapshotDelta};
use crate::config::AnalysisConfig;
use crate::error::{Error, Result, SkippedRecord};
use crate::input::{
    decode_documents, BandwidthBatch, BandwidthBatchDocument, Batch, DeltaDocument,
    PathSnapshotDocument, ProbeBatch, ProbeBatchDocument, TraceRecord, TracerouteDocument,
};
use crate::matcher::{CrossSeriesMatcher, SeriesRecords, SeriesSide};
use crate::stabilization::{StabilizationDetector, StabilizationReport, TimelinePoint};
use crate::store::{Snapshot, SnapshotStore};
use crate::summary::{AnalysisOutputs, AnalysisReport, Comparison, SummaryAggregator};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Counters for one `ingest_*` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

/// Main analysis engine orchestrating all components.
///
/// Documents are ingested first; [`AnalysisEngine::run`] then reads the
/// collected data without modifying it and can be called repeatedly.
pub struct AnalysisEngine {
    config: AnalysisConfig,
    churn_detector: ChurnDetector,
    stabilization_detector: StabilizationDetector,
    matcher: CrossSeriesMatcher,
    aggregator: SummaryAggregator,

    store: SnapshotStore,
    deltas: BTreeMap<String, Vec<SnapshotDelta>>,
    probes: Vec<(SeriesSide, ProbeBatch)>,
    bandwidth: Vec<(SeriesSide, BandwidthBatch)>,
    traceroutes: Vec<TraceRecord>,

    skipped: Vec<SkippedRecord>,
    duplicate_snapshots: usize,
}

impl AnalysisEngine {
    /// Create a new engine. Fails on an invalid configuration.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            churn_detector: ChurnDetector::new(config.churn.clone()),
            stabilization_detector: StabilizationDetector::new(config.stabilization.clone()),
            matcher: CrossSeriesMatcher::new(config.matching.clone()),
            aggregator: SummaryAggregator::new(config.churn.clone()),
            config,
            store: SnapshotStore::new(),
            deltas: BTreeMap::new(),
            probes: Vec::new(),
            bandwidth: Vec::new(),
            traceroutes: Vec::new(),
            skipped: Vec::new(),
            duplicate_snapshots: 0,
        })
    }

    /// Get current configuration.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Everything skipped so far.
    pub fn skipped(&self) -> &[SkippedRecord] {
        &self.skipped
    }

    pub fn duplicate_snapshots(&self) -> usize {
        self.duplicate_snapshots
    }

    fn formats(&self) -> &[String] {
        &self.config.ingest.timestamp_formats
    }

    fn absorb_skips(&mut self, skipped: Vec<SkippedRecord>) -> usize {
        for skip in &skipped {
            warn!(
                kind = skip.kind.as_str(),
                destination = skip.destination.as_deref().unwrap_or("-"),
                reason = %skip.reason,
                "record skipped"
            );
        }
        let count = skipped.len();
        self.skipped.extend(skipped);
        count
    }

    /// Add an already decoded snapshot. A duplicate `(destination, timestamp)`
    /// is logged, counted and returned as an error.
    pub fn ingest_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        match self.store.insert(snapshot) {
            Err(e @ Error::DuplicateTimestamp { .. }) => {
                warn!(error = %e, "duplicate snapshot ignored");
                self.duplicate_snapshots += 1;
                Err(e)
            }
            other => other,
        }
    }

    /// Decode and store path snapshot documents.
    pub fn ingest_snapshots_json(&mut self, json: &str) -> Result<IngestSummary> {
        let Batch { records, skipped } =
            decode_documents::<PathSnapshotDocument>(json, self.formats())?;
        let mut summary = IngestSummary {
            skipped: self.absorb_skips(skipped),
            ..Default::default()
        };
        for snapshot in records {
            match self.ingest_snapshot(snapshot) {
                Ok(()) => summary.accepted += 1,
                Err(Error::DuplicateTimestamp { .. }) => summary.duplicates += 1,
                Err(e) => return Err(e),
            }
        }
        debug!(accepted = summary.accepted, skipped = summary.skipped, "snapshots ingested");
        Ok(summary)
    }

    /// Add an already decoded delta.
    pub fn ingest_delta(&mut self, delta: SnapshotDelta) {
        self.deltas
            .entry(delta.destination.clone())
            .or_default()
            .push(delta);
    }

    /// Decode and store comparer delta documents.
    pub fn ingest_deltas_json(&mut self, json: &str) -> Result<IngestSummary> {
        let Batch { records, skipped } = decode_documents::<DeltaDocument>(json, self.formats())?;
        let summary = IngestSummary {
            accepted: records.len(),
            skipped: self.absorb_skips(skipped),
            duplicates: 0,
        };
        for delta in records {
            self.ingest_delta(delta);
        }
        debug!(accepted = summary.accepted, skipped = summary.skipped, "deltas ingested");
        Ok(summary)
    }

    pub fn ingest_probe_batch(&mut self, side: SeriesSide, batch: ProbeBatch) {
        self.probes.push((side, batch));
    }

    /// Decode and store latency probe batches for one series.
    pub fn ingest_probes_json(&mut self, side: SeriesSide, json: &str) -> Result<IngestSummary> {
        let Batch { records, skipped } =
            decode_documents::<ProbeBatchDocument>(json, self.formats())?;
        let summary = IngestSummary {
            accepted: records.len(),
            skipped: self.absorb_skips(skipped),
            duplicates: 0,
        };
        for batch in records {
            self.ingest_probe_batch(side, batch);
        }
        debug!(
            series = side.as_str(),
            accepted = summary.accepted,
            skipped = summary.skipped,
            "probe batches ingested"
        );
        Ok(summary)
    }

    pub fn ingest_bandwidth_batch(&mut self, side: SeriesSide, batch: BandwidthBatch) {
        self.bandwidth.push((side, batch));
    }

    /// Decode and store bandwidth batches for one series.
    pub fn ingest_bandwidth_json(&mut self, side: SeriesSide, json: &str) -> Result<IngestSummary> {
        let Batch { records, skipped } =
            decode_documents::<BandwidthBatchDocument>(json, self.formats())?;
        let summary = IngestSummary {
            accepted: records.len(),
            skipped: self.absorb_skips(skipped),
            duplicates: 0,
        };
        for batch in records {
            self.ingest_bandwidth_batch(side, batch);
        }
        debug!(
            series = side.as_str(),
            accepted = summary.accepted,
            skipped = summary.skipped,
            "bandwidth batches ingested"
        );
        Ok(summary)
    }

    pub fn ingest_traceroute(&mut self, trace: TraceRecord) {
        self.traceroutes.push(trace);
    }

    /// Decode and store traceroute documents.
    pub fn ingest_traceroutes_json(&mut self, json: &str) -> Result<IngestSummary> {
        let Batch { records, skipped } =
            decode_documents::<TracerouteDocument>(json, self.formats())?;
        let summary = IngestSummary {
            accepted: records.len(),
            skipped: self.absorb_skips(skipped),
            duplicates: 0,
        };
        for trace in records {
            self.ingest_traceroute(trace);
        }
        debug!(accepted = summary.accepted, skipped = summary.skipped, "traceroutes ingested");
        Ok(summary)
    }

    /// Run every detector over the ingested data and aggregate.
    pub fn run(&self) -> AnalysisReport {
        let churn = self.run_churn();
        let stabilization = self.run_stabilization();
        let comparisons = self.run_matching();

        let snapshot_counts = self
            .store
            .destinations()
            .into_iter()
            .map(|d| (d.to_string(), self.store.snapshot_count(d)))
            .collect();

        let outputs = AnalysisOutputs {
            churn,
            snapshot_counts,
            probes: self.probes.iter().map(|(s, b)| (*s, b)).collect(),
            bandwidth: self.bandwidth.iter().map(|(s, b)| (*s, b)).collect(),
            traceroutes: self.traceroutes.iter().collect(),
            stabilization,
            comparisons,
            skipped: &self.skipped,
            duplicate_snapshots: self.duplicate_snapshots,
        };
        let report = self.aggregator.build(outputs);

        info!(
            destinations = report.global.destinations,
            snapshots = report.global.total_snapshots,
            change_events = report.global.change_events,
            skipped = report.global.skipped_records,
            "analysis complete"
        );
        report
    }

    /// Snapshot histories first; delta documents for destinations without
    /// snapshots.
    fn run_churn(&self) -> BTreeMap<String, DestinationChurn> {
        let mut churn = self.churn_detector.process_store(&self.store);
        for (destination, deltas) in &self.deltas {
            if churn.contains_key(destination) {
                warn!(
                    destination = %destination,
                    "deltas ignored, destination has snapshots"
                );
                continue;
            }
            churn.insert(
                destination.clone(),
                self.churn_detector.process_deltas(destination, deltas),
            );
        }
        churn
    }

    /// Series A probe timelines, one report per destination.
    fn run_stabilization(&self) -> Vec<StabilizationReport> {
        let metric = &self.config.stabilization.metric;
        let mut timelines: BTreeMap<&str, Vec<TimelinePoint>> = BTreeMap::new();
        for (side, batch) in &self.probes {
            if *side != SeriesSide::A {
                continue;
            }
            if let Some(point) = batch.timeline_point(metric) {
                timelines
                    .entry(batch.destination.as_str())
                    .or_default()
                    .push(point);
            }
        }

        timelines
            .into_iter()
            .map(|(dest, timeline)| {
                let report = self.stabilization_detector.analyze(dest, &timeline);
                debug!(
                    destination = dest,
                    samples = report.samples,
                    index = ?report.index,
                    "stabilization analyzed"
                );
                report
            })
            .collect()
    }

    fn run_matching(&self) -> Vec<Comparison> {
        let mut probe_records = [SeriesRecords::new(), SeriesRecords::new()];
        for (side, batch) in &self.probes {
            let records = &mut probe_records[side_index(*side)];
            for probe in &batch.probes {
                records.insert(
                    &batch.destination,
                    batch.timestamp,
                    probe.fingerprint.clone(),
                    probe.metrics.clone(),
                );
            }
        }

        let mut bandwidth_records = [SeriesRecords::new(), SeriesRecords::new()];
        for (side, batch) in &self.bandwidth {
            let records = &mut bandwidth_records[side_index(*side)];
            for path in &batch.paths {
                records.insert(
                    &batch.destination,
                    batch.timestamp,
                    path.fingerprint.clone(),
                    path.metrics.clone(),
                );
            }
        }

        let mut comparisons = Vec::new();
        for (family, records) in [("probe", &probe_records), ("bandwidth", &bandwidth_records)] {
            let [a, b] = records;
            if !a.is_empty() {
                comparisons.push(Comparison {
                    name: comparison_name(family, SeriesSide::A),
                    outcome: self.matcher.match_series(a, b),
                });
            }
            if self.config.matching.symmetric && !b.is_empty() {
                comparisons.push(Comparison {
                    name: comparison_name(family, SeriesSide::B),
                    outcome: self.matcher.match_series(b, a),
                });
            }
        }
        comparisons
    }
}

fn side_index(side: SeriesSide) -> usize {
    match side {
        SeriesSide::A => 0,
        SeriesSide::B => 1,
    }
}

/// `probe_a_to_b`, `bandwidth_b_to_a`, ...
pub fn comparison_name(family: &str, from: SeriesSide) -> String {
    format!("{}_{}_to_{}", family, from.as_str(), from.other().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StabilizationConfig;

    #[test]
    fn test_invalid_config_rejected() {
        let config = AnalysisConfig {
            stabilization: StabilizationConfig {
                window: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            AnalysisEngine::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_comparison_name() {
        assert_eq!(comparison_name("probe", SeriesSide::A), "probe_a_to_b");
        assert_eq!(comparison_name("bandwidth", SeriesSide::B), "bandwidth_b_to_a");
    }

    #[test]
    fn test_duplicate_snapshot_counted() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();
        let json = r#"[
            {"destination": "D", "timestamp": "2025-07-15T10:00",
             "paths": [{"fingerprint": "a", "sequence": "A#1"}]},
            {"destination": "D", "timestamp": "2025-07-15T10:00", "paths": []}
        ]"#;
        let summary = engine.ingest_snapshots_json(json).unwrap();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(engine.duplicate_snapshots(), 1);
        assert_eq!(engine.run().global.duplicate_snapshots, 1);
    }

    #[test]
    fn test_deltas_used_when_no_snapshots() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();
        engine
            .ingest_deltas_json(
                r#"[
                {"destination": "D", "timestamp": "2025-07-15T10:00",
                 "changes": [{"fingerprint": "a", "sequence": "A#1 B#1", "change": "added"}]},
                {"destination": "D", "timestamp": "2025-07-15T10:30",
                 "changes": [{"fingerprint": "a", "sequence": "A#1 B#1", "change": "removed"}]}
            ]"#,
            )
            .unwrap();
        let report = engine.run();
        let dest = report.destination("D").unwrap();
        assert_eq!(dest.added_total, 1);
        assert_eq!(dest.removed_total, 1);
        assert_eq!(dest.avg_lifetime_secs, Some(1800.0));
    }

    #[test]
    fn test_symmetric_adds_reverse_comparison() {
        let config = AnalysisConfig {
            matching: crate::config::MatchConfig {
                symmetric: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut engine = AnalysisEngine::new(config).unwrap();
        let probe = |ts: &str, rtt: f64| {
            format!(
                r#"{{"destination": "D", "timestamp": "{}", "probes": [
                    {{"fingerprint": "x", "ping_result": {{"statistics": {{"avg_rtt": {}}}}}}}]}}"#,
                ts, rtt
            )
        };
        engine
            .ingest_probes_json(SeriesSide::A, &probe("2025-07-15T10:00", 50.0))
            .unwrap();
        engine
            .ingest_probes_json(SeriesSide::B, &probe("2025-07-15T10:05", 45.0))
            .unwrap();

        let report = engine.run();
        let forward = report.cross_series("probe_a_to_b").unwrap();
        let reverse = report.cross_series("probe_b_to_a").unwrap();
        assert_eq!(forward.by_metric["avg_rtt"].mean, Some(5.0));
        assert_eq!(reverse.by_metric["avg_rtt"].mean, Some(-5.0));
        assert!(report.cross_series("bandwidth_a_to_b").is_none());
    }

    #[test]
    fn test_traceroutes_reported() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();
        let summary = engine
            .ingest_traceroutes_json(
                r#"[
                {"destination": "D", "timestamp": "2025-07-15T10:00",
                 "hops": [{"isd_as": "1-a", "round_trip_times": [2.0]},
                          {"isd_as": "1-b", "round_trip_times": [6.0]}]},
                {"destination": "D", "timestamp": "2025-07-15T10:15",
                 "hops": [{"isd_as": "1-a", "round_trip_times": [4.0]},
                          {"isd_as": "1-b", "round_trip_times": []},
                          {"isd_as": "1-c", "round_trip_times": [9.0]}]},
                {"destination": "D", "timestamp": "2025-07-15T10:30", "hops": []}
            ]"#,
            )
            .unwrap();
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.skipped, 1);

        let report = engine.run();
        assert_eq!(report.global.total_traceroutes, 2);
        assert_eq!(report.destination("D").unwrap().traceroutes, 2);
        let trace = &report.traceroute[0];
        assert_eq!(trace.traces, 2);
        assert_eq!(trace.hop_count.mean, Some(2.5));
        assert_eq!(trace.missing_rtts.mean, Some(0.5));
        assert_eq!(trace.slowest_as_hops[0].as_hop, "1-c");
    }
}
