// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! SummaryAggregator - reduction of detector outputs into reports.
//!
//! Pure reduction: no I/O, no logging. Everything is keyed by `BTreeMap` so
//! reports are ordered and reproducible.

use crate::churn::{ChurnTally, DestinationChurn};
use crate::config::ChurnConfig;
use crate::error::SkippedRecord;
use crate::input::{
    BandwidthBatch, Direction, ProbeBatch, METRIC_AVG_RTT, METRIC_BW, METRIC_IA_AVG, METRIC_IA_MAX,
    METRIC_IA_MDEV, METRIC_IA_MIN, METRIC_LOSS, METRIC_MDEV_RTT, METRIC_PACKET_LOSS, TraceRecord,
};
use crate::matcher::{summarize, DiffStats, MatchOutcome, MatchedPair, SeriesSide};
use crate::series::{RunningStats, SeriesStats};
use crate::stabilization::StabilizationReport;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Version of the report format.
pub const REPORT_VERSION: &str = "0.3.0";

/// Per-destination counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationSummary {
    pub destination: String,
    pub snapshots: usize,
    pub probe_batches: usize,
    pub bandwidth_batches: usize,
    #[serde(default)]
    pub traceroutes: usize,
    pub comparisons: usize,
    pub change_events: usize,
    pub added_total: usize,
    pub removed_total: usize,
    pub avg_path_length_of_changes: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_lifetime_secs: Option<f64>,
    pub unmatched_removals: usize,
    pub open_intervals: usize,
}

/// One entry of the unstable AS-hop ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstableHop {
    pub as_hop: String,
    pub count: u64,
}

/// Aggregates of one directional join (e.g. probes A -> B).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSeriesSummary {
    pub name: String,
    pub matched_pairs: usize,
    pub matched_timestamps: usize,
    pub unmatched_timestamps: usize,
    pub matched_fingerprints: usize,
    /// Keyed by full metric name.
    pub by_metric: BTreeMap<String, DiffStats>,
    /// Direction label (`S->C`, `C->S`) -> unprefixed metric -> stats.
    /// Only metrics carrying a direction prefix appear here.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub by_direction: BTreeMap<String, BTreeMap<String, DiffStats>>,
}

/// Run-wide figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSummary {
    pub destinations: usize,
    pub total_snapshots: usize,
    pub total_probe_batches: usize,
    pub total_bandwidth_batches: usize,
    #[serde(default)]
    pub total_traceroutes: usize,
    pub comparisons: usize,
    pub change_events: usize,
    pub added_total: usize,
    pub removed_total: usize,
    pub avg_path_length_of_changes: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_lifetime_secs: Option<f64>,
    pub unmatched_removals: usize,
    pub top_unstable_hops: Vec<UnstableHop>,
    pub churn_by_path_length: BTreeMap<usize, u64>,
    pub stabilized_destinations: usize,
    pub cross_series: Vec<CrossSeriesSummary>,
    pub skipped_records: usize,
    pub skipped_by_kind: BTreeMap<String, usize>,
    pub duplicate_snapshots: usize,
}

/// Latency figures for one destination of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub destination: String,
    pub series: SeriesSide,
    pub batches: usize,
    /// Probed paths across all batches.
    pub probes: usize,
    pub rtt: SeriesStats,
    pub loss: SeriesStats,
    /// Mean of per-path `mdev_rtt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_path_jitter: Option<f64>,
    pub sequence_issues: usize,
}

/// Figures for one transfer direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionSummary {
    pub bandwidth: SeriesStats,
    pub loss: SeriesStats,
    pub interarrival_avg: SeriesStats,
    pub interarrival_mdev: SeriesStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interarrival_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interarrival_max: Option<f64>,
}

/// Bandwidth figures for one destination, series and target tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSummary {
    pub destination: String,
    pub series: SeriesSide,
    /// `"<n>Mbps"`, or `"unknown"` when no tier was recorded.
    pub tier: String,
    pub files: usize,
    /// Keyed by direction label.
    pub directions: BTreeMap<String, DirectionSummary>,
}

/// Mean RTT through one AS-hop across traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsLatency {
    pub as_hop: String,
    pub avg_rtt: f64,
    /// Answered hops that contributed.
    pub samples: u64,
}

/// Traceroute figures for one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteSummary {
    pub destination: String,
    pub traces: usize,
    /// Over per-trace mean RTTs; unanswered traces are left out.
    pub rtt: SeriesStats,
    pub hop_count: SeriesStats,
    pub missing_rtts: SeriesStats,
    /// Highest mean RTT first, ties by ascending AS-hop.
    pub slowest_as_hops: Vec<AsLatency>,
}

/// Named output of one directional join.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub name: String,
    pub outcome: MatchOutcome,
}

/// Everything the aggregator reduces. Built by the engine.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutputs<'a> {
    pub churn: BTreeMap<String, DestinationChurn>,
    pub snapshot_counts: BTreeMap<String, usize>,
    pub probes: Vec<(SeriesSide, &'a ProbeBatch)>,
    pub bandwidth: Vec<(SeriesSide, &'a BandwidthBatch)>,
    pub traceroutes: Vec<&'a TraceRecord>,
    pub stabilization: Vec<StabilizationReport>,
    pub comparisons: Vec<Comparison>,
    pub skipped: &'a [SkippedRecord],
    pub duplicate_snapshots: usize,
}

/// Complete result of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub version: String,
    pub global: GlobalSummary,
    pub destinations: Vec<DestinationSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stabilization: Vec<StabilizationReport>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub probes: Vec<ProbeSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub bandwidth: Vec<BandwidthSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub traceroute: Vec<TracerouteSummary>,
    /// Full churn detail (events and lifetimes) per destination.
    pub churn: BTreeMap<String, DestinationChurn>,
    /// Matched pairs per comparison name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub pairs: BTreeMap<String, Vec<MatchedPair>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub skipped: Vec<SkippedRecord>,
}

impl AnalysisReport {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn destination(&self, destination: &str) -> Option<&DestinationSummary> {
        self.destinations.iter().find(|d| d.destination == destination)
    }

    pub fn cross_series(&self, name: &str) -> Option<&CrossSeriesSummary> {
        self.global.cross_series.iter().find(|c| c.name == name)
    }
}

/// Reduces detector outputs into an [`AnalysisReport`].
#[derive(Debug, Clone, Default)]
pub struct SummaryAggregator {
    config: ChurnConfig,
}

impl SummaryAggregator {
    pub fn new(config: ChurnConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, outputs: AnalysisOutputs<'_>) -> AnalysisReport {
        let destinations = self.destination_summaries(&outputs);
        let probes = self.probe_summaries(&outputs.probes);
        let bandwidth = self.bandwidth_summaries(&outputs.bandwidth);
        let traceroute = self.traceroute_summaries(&outputs.traceroutes);

        let cross_series: Vec<CrossSeriesSummary> = outputs
            .comparisons
            .iter()
            .map(|c| cross_series_summary(&c.name, &c.outcome))
            .collect();

        let mut tally = ChurnTally::default();
        let mut lifetimes = RunningStats::new();
        for churn in outputs.churn.values() {
            tally.merge(&churn.tally);
            for lifetime in &churn.lifetimes {
                lifetimes.add_sample(lifetime.duration_secs);
            }
        }

        let mut skipped_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for skip in outputs.skipped {
            *skipped_by_kind.entry(skip.kind.as_str().to_string()).or_default() += 1;
        }

        let global = GlobalSummary {
            destinations: destinations.len(),
            total_snapshots: outputs.snapshot_counts.values().sum(),
            total_probe_batches: outputs.probes.len(),
            total_bandwidth_batches: outputs.bandwidth.len(),
            total_traceroutes: outputs.traceroutes.len(),
            comparisons: outputs.churn.values().map(|c| c.comparisons).sum(),
            change_events: outputs.churn.values().map(|c| c.change_events).sum(),
            added_total: outputs.churn.values().map(|c| c.added_total).sum(),
            removed_total: outputs.churn.values().map(|c| c.removed_total).sum(),
            avg_path_length_of_changes: tally.avg_path_length(),
            avg_lifetime_secs: lifetimes.mean(),
            unmatched_removals: outputs.churn.values().map(|c| c.unmatched_removals).sum(),
            top_unstable_hops: tally
                .top_unstable(self.config.top_n)
                .into_iter()
                .map(|(as_hop, count)| UnstableHop { as_hop, count })
                .collect(),
            churn_by_path_length: tally.by_path_length.clone(),
            stabilized_destinations: outputs
                .stabilization
                .iter()
                .filter(|r| r.is_stable())
                .count(),
            cross_series,
            skipped_records: outputs.skipped.len(),
            skipped_by_kind,
            duplicate_snapshots: outputs.duplicate_snapshots,
        };

        let pairs = outputs
            .comparisons
            .into_iter()
            .map(|c| (c.name, c.outcome.pairs))
            .collect();

        AnalysisReport {
            version: REPORT_VERSION.to_string(),
            global,
            destinations,
            stabilization: outputs.stabilization,
            probes,
            bandwidth,
            traceroute,
            churn: outputs.churn,
            pairs,
            skipped: outputs.skipped.to_vec(),
        }
    }

    fn destination_summaries(&self, outputs: &AnalysisOutputs<'_>) -> Vec<DestinationSummary> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        names.extend(outputs.churn.keys().map(String::as_str));
        names.extend(outputs.snapshot_counts.keys().map(String::as_str));
        names.extend(outputs.probes.iter().map(|(_, b)| b.destination.as_str()));
        names.extend(outputs.bandwidth.iter().map(|(_, b)| b.destination.as_str()));
        names.extend(outputs.traceroutes.iter().map(|t| t.destination.as_str()));

        names
            .into_iter()
            .map(|dest| {
                let churn = outputs.churn.get(dest);
                DestinationSummary {
                    destination: dest.to_string(),
                    snapshots: outputs.snapshot_counts.get(dest).copied().unwrap_or(0),
                    probe_batches: outputs
                        .probes
                        .iter()
                        .filter(|(_, b)| b.destination == dest)
                        .count(),
                    bandwidth_batches: outputs
                        .bandwidth
                        .iter()
                        .filter(|(_, b)| b.destination == dest)
                        .count(),
                    traceroutes: outputs
                        .traceroutes
                        .iter()
                        .filter(|t| t.destination == dest)
                        .count(),
                    comparisons: churn.map_or(0, |c| c.comparisons),
                    change_events: churn.map_or(0, |c| c.change_events),
                    added_total: churn.map_or(0, |c| c.added_total),
                    removed_total: churn.map_or(0, |c| c.removed_total),
                    avg_path_length_of_changes: churn
                        .map_or(0.0, |c| c.avg_path_length_of_changes()),
                    avg_lifetime_secs: churn.and_then(|c| c.avg_lifetime_secs()),
                    unmatched_removals: churn.map_or(0, |c| c.unmatched_removals),
                    open_intervals: churn.map_or(0, |c| c.open_intervals.len()),
                }
            })
            .collect()
    }

    /// One summary per (series, destination).
    pub fn probe_summaries(&self, batches: &[(SeriesSide, &ProbeBatch)]) -> Vec<ProbeSummary> {
        let mut grouped: BTreeMap<(SeriesSide, &str), Vec<&ProbeBatch>> = BTreeMap::new();
        for (side, batch) in batches {
            grouped
                .entry((*side, batch.destination.as_str()))
                .or_default()
                .push(*batch);
        }

        grouped
            .into_iter()
            .map(|((series, dest), batches)| {
                let mut rtt = RunningStats::new();
                let mut loss = RunningStats::new();
                let mut mdev = RunningStats::new();
                let mut probes = 0;
                let mut sequence_issues = 0;
                for probe in batches.iter().flat_map(|b| &b.probes) {
                    probes += 1;
                    if probe.sequence_issue {
                        sequence_issues += 1;
                    }
                    if let Some(v) = probe.metric(METRIC_AVG_RTT) {
                        rtt.add_sample(v);
                    }
                    if let Some(v) = probe.metric(METRIC_PACKET_LOSS) {
                        loss.add_sample(v);
                    }
                    if let Some(v) = probe.metric(METRIC_MDEV_RTT) {
                        mdev.add_sample(v);
                    }
                }
                ProbeSummary {
                    destination: dest.to_string(),
                    series,
                    batches: batches.len(),
                    probes,
                    rtt: rtt.finish(),
                    loss: loss.finish(),
                    avg_path_jitter: mdev.mean(),
                    sequence_issues,
                }
            })
            .collect()
    }

    /// One summary per (series, destination, tier).
    pub fn bandwidth_summaries(
        &self,
        batches: &[(SeriesSide, &BandwidthBatch)],
    ) -> Vec<BandwidthSummary> {
        let mut grouped: BTreeMap<(SeriesSide, &str, String), Vec<&BandwidthBatch>> =
            BTreeMap::new();
        for (side, batch) in batches {
            grouped
                .entry((*side, batch.destination.as_str(), tier_key(batch.target_mbps)))
                .or_default()
                .push(*batch);
        }

        grouped
            .into_iter()
            .map(|((series, dest, tier), batches)| {
                let directions = Direction::ALL
                    .iter()
                    .map(|d| (d.label().to_string(), direction_summary(*d, &batches)))
                    .collect();
                BandwidthSummary {
                    destination: dest.to_string(),
                    series,
                    tier,
                    files: batches.len(),
                    directions,
                }
            })
            .collect()
    }

    /// One summary per destination, AS ranking capped at `top_n`.
    pub fn traceroute_summaries(&self, traces: &[&TraceRecord]) -> Vec<TracerouteSummary> {
        let mut grouped: BTreeMap<&str, Vec<&TraceRecord>> = BTreeMap::new();
        for trace in traces {
            grouped.entry(trace.destination.as_str()).or_default().push(*trace);
        }

        grouped
            .into_iter()
            .map(|(dest, traces)| {
                let mut per_as: BTreeMap<&str, RunningStats> = BTreeMap::new();
                for (as_hop, rtts) in traces.iter().flat_map(|t| &t.as_rtts) {
                    let acc = per_as.entry(as_hop.as_str()).or_default();
                    for rtt in rtts {
                        acc.add_sample(*rtt);
                    }
                }
                let mut slowest: Vec<AsLatency> = per_as
                    .into_iter()
                    .filter_map(|(as_hop, acc)| {
                        Some(AsLatency {
                            as_hop: as_hop.to_string(),
                            avg_rtt: acc.mean()?,
                            samples: acc.count(),
                        })
                    })
                    .collect();
                slowest.sort_by(|a, b| {
                    b.avg_rtt
                        .total_cmp(&a.avg_rtt)
                        .then_with(|| a.as_hop.cmp(&b.as_hop))
                });
                slowest.truncate(self.config.top_n);

                TracerouteSummary {
                    destination: dest.to_string(),
                    traces: traces.len(),
                    rtt: SeriesStats::from_values(traces.iter().filter_map(|t| t.avg_rtt)),
                    hop_count: SeriesStats::from_values(
                        traces.iter().map(|t| t.hop_count as f64),
                    ),
                    missing_rtts: SeriesStats::from_values(
                        traces.iter().map(|t| t.missing_rtts as f64),
                    ),
                    slowest_as_hops: slowest,
                }
            })
            .collect()
    }
}

fn tier_key(target_mbps: Option<f64>) -> String {
    match target_mbps {
        Some(mbps) => format!("{}Mbps", mbps),
        None => "unknown".to_string(),
    }
}

fn direction_summary(direction: Direction, batches: &[&BandwidthBatch]) -> DirectionSummary {
    let mut bw = RunningStats::new();
    let mut loss = RunningStats::new();
    let mut ia_avg = RunningStats::new();
    let mut ia_mdev = RunningStats::new();
    let mut ia_min: Option<f64> = None;
    let mut ia_max: Option<f64> = None;

    for path in batches.iter().flat_map(|b| &b.paths) {
        if let Some(v) = path.metric(direction, METRIC_BW) {
            bw.add_sample(v);
        }
        if let Some(v) = path.metric(direction, METRIC_LOSS) {
            loss.add_sample(v);
        }
        if let Some(v) = path.metric(direction, METRIC_IA_AVG) {
            ia_avg.add_sample(v);
        }
        if let Some(v) = path.metric(direction, METRIC_IA_MDEV) {
            ia_mdev.add_sample(v);
        }
        if let Some(v) = path.metric(direction, METRIC_IA_MIN) {
            ia_min = Some(ia_min.map_or(v, |m| m.min(v)));
        }
        if let Some(v) = path.metric(direction, METRIC_IA_MAX) {
            ia_max = Some(ia_max.map_or(v, |m| m.max(v)));
        }
    }

    DirectionSummary {
        bandwidth: bw.finish(),
        loss: loss.finish(),
        interarrival_avg: ia_avg.finish(),
        interarrival_mdev: ia_mdev.finish(),
        interarrival_min: ia_min,
        interarrival_max: ia_max,
    }
}

/// Reduce one join to counts and per-metric / per-direction difference stats.
pub fn cross_series_summary(name: &str, outcome: &MatchOutcome) -> CrossSeriesSummary {
    let by_metric = summarize(&outcome.pairs);

    let mut grouped: BTreeMap<String, Vec<MatchedPair>> = BTreeMap::new();
    for pair in &outcome.pairs {
        if let (Some(direction), base) = Direction::split_metric(&pair.metric) {
            let mut renamed = pair.clone();
            renamed.metric = base.to_string();
            grouped
                .entry(direction.label().to_string())
                .or_default()
                .push(renamed);
        }
    }
    let by_direction = grouped
        .into_iter()
        .map(|(label, pairs)| (label, summarize(&pairs)))
        .collect();

    CrossSeriesSummary {
        name: name.to_string(),
        matched_pairs: outcome.pairs.len(),
        matched_timestamps: outcome.matched_timestamps,
        unmatched_timestamps: outcome.unmatched_timestamps,
        matched_fingerprints: outcome.matched_fingerprints,
        by_metric,
        by_direction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordKind;
    use crate::input::{BandwidthRecord, ProbeRecord};
    use crate::matcher::MetricMap;
    use crate::path::Fingerprint;
    use crate::time::Timestamp;
    use approx::assert_relative_eq;

    fn ts(minute: u32) -> Timestamp {
        chrono::NaiveDate::from_ymd_opt(2025, 7, 15)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    fn probe(fp: &str, rtt: f64, mdev: Option<f64>, issue: bool) -> ProbeRecord {
        let mut metrics = MetricMap::new();
        metrics.insert(METRIC_AVG_RTT.into(), Some(rtt));
        metrics.insert(METRIC_MDEV_RTT.into(), mdev);
        metrics.insert(METRIC_PACKET_LOSS.into(), Some(0.0));
        ProbeRecord {
            fingerprint: Fingerprint::from(fp),
            metrics,
            sequence_issue: issue,
        }
    }

    fn pair(metric: &str, diff: f64) -> MatchedPair {
        MatchedPair {
            destination: "D".into(),
            fingerprint: "x".into(),
            a_timestamp: ts(0),
            b_timestamp: ts(1),
            time_delta_secs: 60.0,
            metric: metric.into(),
            a_value: diff,
            b_value: 0.0,
            diff,
        }
    }

    #[test]
    fn test_probe_summary() {
        let batch = ProbeBatch {
            destination: "D".into(),
            timestamp: ts(0),
            probes: vec![
                probe("a", 40.0, Some(2.0), false),
                probe("b", 60.0, None, true),
            ],
        };
        let summaries = SummaryAggregator::default().probe_summaries(&[(SeriesSide::A, &batch)]);
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.probes, 2);
        assert_eq!(s.sequence_issues, 1);
        assert_relative_eq!(s.rtt.mean.unwrap(), 50.0);
        assert_eq!(s.rtt.min, Some(40.0));
        assert_eq!(s.avg_path_jitter, Some(2.0));
    }

    #[test]
    fn test_bandwidth_summary_groups_by_tier() {
        let record = |bw: f64, ia_min: f64| {
            let mut metrics = MetricMap::new();
            metrics.insert("sc_bw".into(), Some(bw));
            metrics.insert("sc_ia_min".into(), Some(ia_min));
            BandwidthRecord {
                fingerprint: "x".into(),
                metrics,
            }
        };
        let batch = |minute, tier, bw, ia_min| BandwidthBatch {
            destination: "D".into(),
            timestamp: ts(minute),
            target_mbps: tier,
            paths: vec![record(bw, ia_min)],
        };
        let b1 = batch(0, Some(10.0), 9.0, 0.5);
        let b2 = batch(5, Some(10.0), 8.0, 0.3);
        let b3 = batch(10, None, 1.0, 0.1);

        let summaries = SummaryAggregator::default().bandwidth_summaries(&[
            (SeriesSide::A, &b1),
            (SeriesSide::A, &b2),
            (SeriesSide::A, &b3),
        ]);
        assert_eq!(summaries.len(), 2);
        let tier = summaries.iter().find(|s| s.tier == "10Mbps").unwrap();
        assert_eq!(tier.files, 2);
        let sc = &tier.directions["S->C"];
        assert_relative_eq!(sc.bandwidth.mean.unwrap(), 8.5);
        assert_eq!(sc.interarrival_min, Some(0.3));
        assert_eq!(tier.directions["C->S"].bandwidth.count, 0);
        assert!(summaries.iter().any(|s| s.tier == "unknown"));
    }

    #[test]
    fn test_cross_series_by_direction() {
        let outcome = MatchOutcome {
            pairs: vec![
                pair("sc_bw", 4.0),
                pair("sc_bw", 6.0),
                pair("cs_bw", 1.0),
                pair("avg_rtt", 2.0),
            ],
            matched_timestamps: 1,
            unmatched_timestamps: 2,
            matched_fingerprints: 1,
        };
        let summary = cross_series_summary("bandwidth_a_to_b", &outcome);
        assert_eq!(summary.matched_pairs, 4);
        assert_eq!(summary.unmatched_timestamps, 2);
        assert_eq!(summary.by_metric.len(), 3);
        assert_relative_eq!(summary.by_direction["S->C"]["bw"].mean.unwrap(), 5.0);
        assert_eq!(summary.by_direction["C->S"]["bw"].stdev, Some(0.0));
        assert!(!summary.by_direction.contains_key("avg_rtt"));
    }

    fn trace(minute: u32, hop_count: usize, as_rtts: &[(&str, &[f64])]) -> TraceRecord {
        let as_rtts: BTreeMap<String, Vec<f64>> = as_rtts
            .iter()
            .map(|(as_hop, rtts)| (as_hop.to_string(), rtts.to_vec()))
            .collect();
        let all: Vec<f64> = as_rtts.values().flatten().copied().collect();
        TraceRecord {
            destination: "D".to_string(),
            timestamp: ts(minute),
            fingerprint: None,
            hop_count,
            missing_rtts: hop_count - all.len(),
            avg_rtt: SeriesStats::from_values(all).mean,
            as_rtts,
        }
    }

    #[test]
    fn test_traceroute_ranking() {
        let t1 = trace(0, 3, &[("1-a", &[10.0]), ("1-b", &[30.0])]);
        let t2 = trace(15, 4, &[("1-a", &[30.0]), ("1-c", &[20.0]), ("1-d", &[10.0])]);
        let t3 = trace(30, 2, &[]);

        let summaries = SummaryAggregator::new(ChurnConfig { top_n: 3 })
            .traceroute_summaries(&[&t1, &t2, &t3]);
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.traces, 3);
        // Unanswered trace has no mean RTT
        assert_eq!(summary.rtt.count, 2);
        assert_relative_eq!(summary.rtt.mean.unwrap(), 20.0);
        assert_relative_eq!(summary.hop_count.mean.unwrap(), 3.0);
        assert_relative_eq!(summary.missing_rtts.mean.unwrap(), 4.0 / 3.0);

        // 1-b 30, then 1-a and 1-c tied at 20 by name; 1-d cut
        let ranked: Vec<(&str, f64)> = summary
            .slowest_as_hops
            .iter()
            .map(|a| (a.as_hop.as_str(), a.avg_rtt))
            .collect();
        assert_eq!(ranked, vec![("1-b", 30.0), ("1-a", 20.0), ("1-c", 20.0)]);
        assert_eq!(summary.slowest_as_hops[1].samples, 2);
    }

    #[test]
    fn test_build_report_counts_skips() {
        let skipped = vec![
            SkippedRecord::new(RecordKind::Probe, Some("D"), "bad"),
            SkippedRecord::new(RecordKind::Probe, None, "bad"),
            SkippedRecord::new(RecordKind::PathSnapshot, None, "bad"),
        ];
        let mut snapshot_counts = BTreeMap::new();
        snapshot_counts.insert("D".to_string(), 3);
        let outputs = AnalysisOutputs {
            snapshot_counts,
            skipped: &skipped,
            duplicate_snapshots: 1,
            ..Default::default()
        };

        let report = SummaryAggregator::default().build(outputs);
        assert_eq!(report.global.skipped_records, 3);
        assert_eq!(report.global.skipped_by_kind["probe"], 2);
        assert_eq!(report.global.duplicate_snapshots, 1);
        assert_eq!(report.destinations.len(), 1);
        assert_eq!(report.destination("D").unwrap().snapshots, 3);
        assert_eq!(report.global.avg_path_length_of_changes, 0.0);

        let json = report.to_json().unwrap();
        let parsed = AnalysisReport::from_json(&json).unwrap();
        assert_eq!(parsed.global, report.global);
    }
}
