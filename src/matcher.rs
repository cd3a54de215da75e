// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Tolerance-windowed nearest-neighbour join of two measurement series.
//!
//! ## Contract
//!
//! The join runs A -> B: every `(destination, ta)` in A looks for the `tb` in
//! B that minimises `|ta - tb|` subject to `|ta - tb| <= tolerance`. Ties go
//! to the earliest `tb`. Consequences:
//!
//! - a B timestamp may partner several A timestamps;
//! - a B timestamp with no A partner contributes nothing;
//! - an A timestamp without a partner is counted as unmatched, not an error.
//!
//! Callers that need the other view call [`CrossSeriesMatcher::match_series`]
//! with the arguments swapped.
//!
//! For each partner pair, every fingerprint present on both sides and every
//! metric with a value on both sides yields one [`MatchedPair`] with
//! `diff = a_value - b_value`.

use crate::config::MatchConfig;
use crate::path::Fingerprint;
use crate::series::RunningStats;
use crate::time::{seconds_between, Timestamp};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Metric name -> value. `None` is an explicit null from the collector.
pub type MetricMap = BTreeMap<String, Option<f64>>;

/// Fingerprint -> metrics at one timestamp.
pub type FingerprintRecords = BTreeMap<Fingerprint, MetricMap>;

/// Timestamp -> fingerprint records for one destination.
pub type DestinationRecords = BTreeMap<Timestamp, FingerprintRecords>;

/// Time-bucketed records of one measurement campaign.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesRecords {
    destinations: BTreeMap<String, DestinationRecords>,
}

impl SeriesRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store metrics for `(destination, timestamp, fingerprint)`. A repeated
    /// key overwrites per metric.
    pub fn insert(
        &mut self,
        destination: &str,
        timestamp: Timestamp,
        fingerprint: Fingerprint,
        metrics: MetricMap,
    ) {
        self.destinations
            .entry(destination.to_string())
            .or_default()
            .entry(timestamp)
            .or_default()
            .entry(fingerprint)
            .or_default()
            .extend(metrics);
    }

    pub fn destination(&self, destination: &str) -> Option<&DestinationRecords> {
        self.destinations.get(destination)
    }

    pub fn destinations(&self) -> impl Iterator<Item = (&String, &DestinationRecords)> {
        self.destinations.iter()
    }

    pub fn timestamp_count(&self) -> usize {
        self.destinations.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

/// Which of the two measurement campaigns a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSide {
    A,
    B,
}

impl SeriesSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesSide::A => "a",
            SeriesSide::B => "b",
        }
    }

    pub fn other(&self) -> SeriesSide {
        match self {
            SeriesSide::A => SeriesSide::B,
            SeriesSide::B => SeriesSide::A,
        }
    }
}

/// One per-metric difference between partner records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub destination: String,
    pub fingerprint: Fingerprint,
    pub a_timestamp: Timestamp,
    pub b_timestamp: Timestamp,
    /// `|a_timestamp - b_timestamp|` in seconds.
    pub time_delta_secs: f64,
    pub metric: String,
    pub a_value: f64,
    pub b_value: f64,
    pub diff: f64,
}

/// Everything one join produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub pairs: Vec<MatchedPair>,
    /// A timestamps that found a partner.
    pub matched_timestamps: usize,
    /// A timestamps with no partner within tolerance.
    pub unmatched_timestamps: usize,
    /// (A timestamp, fingerprint) combinations present on both sides.
    pub matched_fingerprints: usize,
}

impl MatchOutcome {
    fn absorb(&mut self, other: MatchOutcome) {
        self.pairs.extend(other.pairs);
        self.matched_timestamps += other.matched_timestamps;
        self.unmatched_timestamps += other.unmatched_timestamps;
        self.matched_fingerprints += other.matched_fingerprints;
    }
}

/// Per-metric aggregate of matched differences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffStats {
    pub count: u64,
    /// `None` when `count == 0`.
    pub mean: Option<f64>,
    /// Sample stdev; `0.0` for one pair, `None` when `count == 0`.
    pub stdev: Option<f64>,
}

/// Group pair differences by metric name.
pub fn summarize(pairs: &[MatchedPair]) -> BTreeMap<String, DiffStats> {
    let mut acc: BTreeMap<String, RunningStats> = BTreeMap::new();
    for pair in pairs {
        acc.entry(pair.metric.clone()).or_default().add_sample(pair.diff);
    }
    acc.into_iter()
        .map(|(metric, stats)| {
            (
                metric,
                DiffStats {
                    count: stats.count(),
                    mean: stats.mean(),
                    stdev: stats.stdev(),
                },
            )
        })
        .collect()
}

/// Nearest-timestamp joiner.
#[derive(Debug, Clone, Default)]
pub struct CrossSeriesMatcher {
    config: MatchConfig,
}

impl CrossSeriesMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Join `a` against `b`. Output is ordered by destination, then A
    /// timestamp, then fingerprint, then metric.
    pub fn match_series(&self, a: &SeriesRecords, b: &SeriesRecords) -> MatchOutcome {
        let work: Vec<(&String, &DestinationRecords)> = a.destinations().collect();

        #[cfg(feature = "parallel")]
        let per_destination: Vec<MatchOutcome> = {
            use rayon::prelude::*;
            work.par_iter()
                .map(|(dest, a_recs)| self.match_destination(dest, a_recs, b.destination(dest)))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let per_destination: Vec<MatchOutcome> = work
            .iter()
            .map(|(dest, a_recs)| self.match_destination(dest, a_recs, b.destination(dest)))
            .collect();

        let mut outcome = MatchOutcome::default();
        for partial in per_destination {
            outcome.absorb(partial);
        }
        outcome
    }

    /// Closest `tb` within tolerance; ties to the earliest.
    pub fn nearest_partner<'b>(
        &self,
        ta: Timestamp,
        b: &'b DestinationRecords,
    ) -> Option<(Timestamp, &'b FingerprintRecords)> {
        let tolerance = self.config.tolerance();
        if tolerance < chrono::Duration::zero() {
            return None;
        }
        let lo = ta.checked_sub_signed(tolerance).unwrap_or(NaiveDateTime::MIN);
        let hi = ta.checked_add_signed(tolerance).unwrap_or(NaiveDateTime::MAX);

        let mut best: Option<(chrono::Duration, Timestamp, &FingerprintRecords)> = None;
        for (tb, recs) in b.range(lo..=hi) {
            let delta = (ta - *tb).abs();
            if delta > tolerance {
                continue;
            }
            // Ascending scan: strict comparison keeps the earliest on ties
            if best.as_ref().map_or(true, |(d, _, _)| delta < *d) {
                best = Some((delta, *tb, recs));
            }
        }
        best.map(|(_, tb, recs)| (tb, recs))
    }

    fn match_destination(
        &self,
        destination: &str,
        a: &DestinationRecords,
        b: Option<&DestinationRecords>,
    ) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();

        for (ta, a_fps) in a {
            let Some((tb, b_fps)) = b.and_then(|b| self.nearest_partner(*ta, b)) else {
                outcome.unmatched_timestamps += 1;
                continue;
            };
            outcome.matched_timestamps += 1;
            let time_delta_secs = seconds_between(*ta, tb).abs();

            for (fp, a_metrics) in a_fps {
                let Some(b_metrics) = b_fps.get(fp) else {
                    continue;
                };
                outcome.matched_fingerprints += 1;

                for (metric, a_value) in a_metrics {
                    let (Some(a_value), Some(Some(b_value))) = (a_value, b_metrics.get(metric))
                    else {
                        continue;
                    };
                    outcome.pairs.push(MatchedPair {
                        destination: destination.to_string(),
                        fingerprint: fp.clone(),
                        a_timestamp: *ta,
                        b_timestamp: tb,
                        time_delta_secs,
                        metric: metric.clone(),
                        a_value: *a_value,
                        b_value: *b_value,
                        diff: a_value - b_value,
                    });
                }
            }
        }

        debug!(
            destination,
            matched = outcome.matched_timestamps,
            unmatched = outcome.unmatched_timestamps,
            pairs = outcome.pairs.len(),
            "destination matched"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ts(hour: u32, minute: u32) -> Timestamp {
        chrono::NaiveDate::from_ymd_opt(2025, 7, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn metrics(pairs: &[(&str, Option<f64>)]) -> MetricMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_bandwidth_scenario() {
        let mut a = SeriesRecords::new();
        a.insert("D", ts(10, 0), "x".into(), metrics(&[("bandwidth", Some(80.0))]));
        let mut b = SeriesRecords::new();
        b.insert("D", ts(10, 10), "x".into(), metrics(&[("bandwidth", Some(75.0))]));

        let outcome = CrossSeriesMatcher::default().match_series(&a, &b);
        assert_eq!(outcome.pairs.len(), 1);
        let pair = &outcome.pairs[0];
        assert_relative_eq!(pair.diff, 5.0);
        assert_relative_eq!(pair.time_delta_secs, 600.0);
        assert_eq!(pair.b_timestamp, ts(10, 10));
        assert_eq!(outcome.matched_timestamps, 1);
        assert_eq!(outcome.unmatched_timestamps, 0);
    }

    #[test]
    fn test_no_partner_counts_unmatched() {
        let mut a = SeriesRecords::new();
        a.insert("D", ts(10, 0), "x".into(), metrics(&[("bw", Some(1.0))]));
        let mut b = SeriesRecords::new();
        b.insert("D", ts(10, 16), "x".into(), metrics(&[("bw", Some(1.0))]));

        let outcome = CrossSeriesMatcher::default().match_series(&a, &b);
        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.unmatched_timestamps, 1);
    }

    #[test]
    fn test_destination_missing_in_b() {
        let mut a = SeriesRecords::new();
        a.insert("D", ts(10, 0), "x".into(), metrics(&[("bw", Some(1.0))]));
        a.insert("D", ts(11, 0), "x".into(), metrics(&[("bw", Some(1.0))]));

        let outcome = CrossSeriesMatcher::default().match_series(&a, &SeriesRecords::new());
        assert_eq!(outcome.unmatched_timestamps, 2);
    }

    #[test]
    fn test_tie_picks_earliest() {
        let mut a = SeriesRecords::new();
        a.insert("D", ts(10, 0), "x".into(), metrics(&[("bw", Some(10.0))]));
        let mut b = SeriesRecords::new();
        b.insert("D", ts(9, 55), "x".into(), metrics(&[("bw", Some(1.0))]));
        b.insert("D", ts(10, 5), "x".into(), metrics(&[("bw", Some(2.0))]));

        let outcome = CrossSeriesMatcher::default().match_series(&a, &b);
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].b_timestamp, ts(9, 55));
        assert_relative_eq!(outcome.pairs[0].diff, 9.0);
    }

    #[test]
    fn test_nearest_wins_over_earlier() {
        let mut a = SeriesRecords::new();
        a.insert("D", ts(10, 0), "x".into(), metrics(&[("bw", Some(10.0))]));
        let mut b = SeriesRecords::new();
        b.insert("D", ts(9, 50), "x".into(), metrics(&[("bw", Some(1.0))]));
        b.insert("D", ts(10, 2), "x".into(), metrics(&[("bw", Some(2.0))]));

        let outcome = CrossSeriesMatcher::default().match_series(&a, &b);
        assert_eq!(outcome.pairs[0].b_timestamp, ts(10, 2));
    }

    #[test]
    fn test_b_timestamp_reused() {
        let mut a = SeriesRecords::new();
        a.insert("D", ts(10, 0), "x".into(), metrics(&[("bw", Some(1.0))]));
        a.insert("D", ts(10, 10), "x".into(), metrics(&[("bw", Some(2.0))]));
        let mut b = SeriesRecords::new();
        b.insert("D", ts(10, 5), "x".into(), metrics(&[("bw", Some(0.0))]));

        let outcome = CrossSeriesMatcher::default().match_series(&a, &b);
        assert_eq!(outcome.pairs.len(), 2);
        assert!(outcome.pairs.iter().all(|p| p.b_timestamp == ts(10, 5)));
    }

    #[test]
    fn test_only_shared_fingerprints_and_non_null_metrics() {
        let mut a = SeriesRecords::new();
        a.insert(
            "D",
            ts(10, 0),
            "x".into(),
            metrics(&[("rtt", Some(30.0)), ("loss", None), ("mdev", Some(2.0))]),
        );
        a.insert("D", ts(10, 0), "y".into(), metrics(&[("rtt", Some(1.0))]));
        let mut b = SeriesRecords::new();
        b.insert(
            "D",
            ts(10, 1),
            "x".into(),
            metrics(&[("rtt", Some(20.0)), ("loss", Some(0.0))]),
        );

        let outcome = CrossSeriesMatcher::default().match_series(&a, &b);
        assert_eq!(outcome.matched_fingerprints, 1);
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].metric, "rtt");
    }

    #[test]
    fn test_time_delta_within_tolerance() {
        let matcher = CrossSeriesMatcher::new(MatchConfig {
            tolerance_secs: 300,
            symmetric: false,
        });
        let mut a = SeriesRecords::new();
        let mut b = SeriesRecords::new();
        for m in 0..60 {
            a.insert("D", ts(12, m), "x".into(), metrics(&[("v", Some(m as f64))]));
            if m % 7 == 0 {
                b.insert("D", ts(12, m), "x".into(), metrics(&[("v", Some(0.0))]));
            }
        }
        let outcome = matcher.match_series(&a, &b);
        assert!(!outcome.pairs.is_empty());
        assert!(outcome.pairs.iter().all(|p| p.time_delta_secs <= 300.0));
    }

    #[test]
    fn test_summarize() {
        let mut a = SeriesRecords::new();
        let mut b = SeriesRecords::new();
        for (i, fp) in ["x", "y", "z"].iter().enumerate() {
            let rtt = 10.0 + i as f64 * 10.0;
            a.insert("D", ts(10, 0), (*fp).into(), metrics(&[("rtt", Some(rtt))]));
            b.insert("D", ts(10, 0), (*fp).into(), metrics(&[("rtt", Some(0.0))]));
        }
        a.insert("D", ts(10, 0), "x".into(), metrics(&[("loss", Some(1.0))]));
        b.insert("D", ts(10, 0), "x".into(), metrics(&[("loss", Some(0.5))]));

        let outcome = CrossSeriesMatcher::default().match_series(&a, &b);
        let summary = summarize(&outcome.pairs);

        let rtt = &summary["rtt"];
        assert_eq!(rtt.count, 3);
        assert_relative_eq!(rtt.mean.unwrap(), 20.0);
        assert_relative_eq!(rtt.stdev.unwrap(), 10.0, epsilon = 1e-9);

        let loss = &summary["loss"];
        assert_eq!(loss.count, 1);
        assert_eq!(loss.stdev, Some(0.0));
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&[]).is_empty());
    }
}
