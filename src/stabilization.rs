// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sliding-window stabilization detection.

use crate::config::StabilizationConfig;
use crate::path::Fingerprint;
use crate::series::MetricSeries;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Smallest `i` such that `max(values[i..i + window]) - min(values[i..i + window]) <= tolerance`.
///
/// Returns `None` when `window == 0`, `values.len() < window`, or no window
/// qualifies. Each window is scanned in full, so the cost is
/// O(len * window); both are caller-controlled.
pub fn find_stabilization(values: &[f64], window: usize, tolerance: f64) -> Option<usize> {
    if window == 0 || values.len() < window {
        return None;
    }

    (0..=values.len() - window).find(|&i| {
        let slice = &values[i..i + window];
        let (min, max) = slice
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        max - min <= tolerance
    })
}

/// One point of a per-batch timeline: the batch's aggregate metric value and
/// the fingerprints it observed.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePoint {
    pub timestamp: Timestamp,
    pub value: f64,
    pub fingerprints: BTreeSet<Fingerprint>,
}

/// Stabilization result for one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizationReport {
    pub destination: String,
    pub metric: String,
    pub samples: usize,
    /// Index of the first sample of the stable window.
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Seen before the stabilization point, not after.
    pub lost: BTreeSet<Fingerprint>,
    /// Seen after the stabilization point, not before.
    pub new: BTreeSet<Fingerprint>,
    pub persistent: BTreeSet<Fingerprint>,
}

impl StabilizationReport {
    pub fn is_stable(&self) -> bool {
        self.index.is_some()
    }
}

/// Detector configured with a window and tolerance.
#[derive(Debug, Clone, Default)]
pub struct StabilizationDetector {
    config: StabilizationConfig,
}

impl StabilizationDetector {
    pub fn new(config: StabilizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StabilizationConfig {
        &self.config
    }

    pub fn find(&self, values: &[f64]) -> Option<usize> {
        find_stabilization(values, self.config.window, self.config.tolerance)
    }

    /// Run detection over a frozen series.
    pub fn find_in_series(&self, series: &MetricSeries) -> Option<usize> {
        self.find(&series.values())
    }

    /// Detect stabilization on a timeline and compare fingerprint sets seen
    /// before and after it.
    ///
    /// The timeline is frozen into a [`MetricSeries`] (and bucketed when
    /// `bucket_secs` is set). Points stamped before the stable sample's
    /// timestamp count as "before", the rest as "after".
    pub fn analyze(&self, destination: &str, timeline: &[TimelinePoint]) -> StabilizationReport {
        let mut series = timeline_series(destination, &self.config.metric, timeline);
        if let Some(width) = self.config.bucket_width() {
            series = series.bucketed(width);
        }
        let index = self.find_in_series(&series);

        let mut report = StabilizationReport {
            destination: destination.to_string(),
            metric: self.config.metric.clone(),
            samples: series.len(),
            index,
            timestamp: None,
            lost: BTreeSet::new(),
            new: BTreeSet::new(),
            persistent: BTreeSet::new(),
        };

        if let Some(start) = index.map(|i| series.samples()[i].timestamp) {
            let (before, after) = split_fingerprints(timeline, start);
            report.timestamp = Some(start);
            report.lost = before.difference(&after).cloned().collect();
            report.new = after.difference(&before).cloned().collect();
            report.persistent = before.intersection(&after).cloned().collect();
        }

        report
    }
}

fn split_fingerprints(
    timeline: &[TimelinePoint],
    start: Timestamp,
) -> (BTreeSet<Fingerprint>, BTreeSet<Fingerprint>) {
    let mut before = BTreeSet::new();
    let mut after = BTreeSet::new();
    for point in timeline {
        let side = if point.timestamp < start {
            &mut before
        } else {
            &mut after
        };
        side.extend(point.fingerprints.iter().cloned());
    }
    (before, after)
}

/// Build a frozen series from a timeline.
pub fn timeline_series(
    destination: &str,
    metric: &str,
    timeline: &[TimelinePoint],
) -> MetricSeries {
    let mut series = MetricSeries::new(destination, metric);
    for point in timeline {
        series.push(point.timestamp, point.value);
    }
    series.freeze()
}
