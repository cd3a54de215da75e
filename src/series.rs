// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Metric time series and summary statistics.

use crate::time::{epoch_secs, from_epoch_secs, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running accumulator for count / mean / sample stdev / min / max.
///
/// Welford update, so large offsets (bandwidth in bit/s) keep their variance.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the running mean.
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.mean)
        }
    }

    /// Bessel-corrected standard deviation. `0.0` for a single sample.
    pub fn stdev(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            n => Some((self.m2 / (n - 1) as f64).max(0.0).sqrt()),
        }
    }

    pub fn finish(&self) -> SeriesStats {
        if self.count == 0 {
            return SeriesStats::empty();
        }
        SeriesStats {
            count: self.count,
            mean: self.mean(),
            jitter: self.stdev(),
            min: Some(self.min),
            max: Some(self.max),
        }
    }
}

/// Summary statistics of a set of values. Jitter is the sample stdev.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub count: u64,
    pub mean: Option<f64>,
    pub jitter: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SeriesStats {
    pub fn empty() -> Self {
        Self {
            count: 0,
            mean: None,
            jitter: None,
            min: None,
            max: None,
        }
    }

    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut acc = RunningStats::new();
        for v in values {
            acc.add_sample(v);
        }
        acc.finish()
    }
}

/// One (timestamp, value) observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// Ordered samples of one metric for one entity.
///
/// Append-only while building; [`MetricSeries::freeze`] sorts by timestamp
/// (stable) and the series is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub entity: String,
    pub metric: String,
    samples: Vec<MetricSample>,
}

impl MetricSeries {
    pub fn new(entity: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            metric: metric.into(),
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, timestamp: Timestamp, value: f64) {
        self.samples.push(MetricSample { timestamp, value });
    }

    /// Sort samples by timestamp and hand back a read-only series.
    pub fn freeze(mut self) -> Self {
        self.samples.sort_by_key(|s| s.timestamp);
        self
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> SeriesStats {
        SeriesStats::from_values(self.samples.iter().map(|s| s.value))
    }

    /// Average samples into fixed-width buckets aligned to the Unix epoch.
    ///
    /// Each output sample is stamped with its bucket start. A non-positive
    /// width returns the series unchanged.
    pub fn bucketed(&self, width: chrono::Duration) -> MetricSeries {
        let width_secs = width.num_seconds();
        if width_secs <= 0 {
            return self.clone();
        }

        let mut buckets: BTreeMap<i64, RunningStats> = BTreeMap::new();
        for sample in &self.samples {
            let start = epoch_secs(sample.timestamp).div_euclid(width_secs) * width_secs;
            buckets.entry(start).or_default().add_sample(sample.value);
        }

        let mut out = MetricSeries::new(self.entity.clone(), self.metric.clone());
        for (start, acc) in buckets {
            if let (Some(ts), Some(mean)) = (from_epoch_secs(start), acc.mean()) {
                out.push(ts, mean);
            }
        }
        out
    }
}
