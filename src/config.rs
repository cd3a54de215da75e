// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Analysis configuration.
//!
//! Every component receives its section of [`AnalysisConfig`] at construction
//! time. There is no process-wide state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Master configuration for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Churn tallies and rankings.
    pub churn: ChurnConfig,

    /// Latency stabilization detection.
    pub stabilization: StabilizationConfig,

    /// Cross-series matching.
    pub matching: MatchConfig,

    /// Input decoding.
    pub ingest: IngestConfig,
}

impl AnalysisConfig {
    /// Parse from JSON string. Missing sections fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the detectors cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.churn.top_n == 0 {
            return Err(Error::InvalidConfig("churn.top_n must be > 0".into()));
        }
        if self.stabilization.window == 0 {
            return Err(Error::InvalidConfig(
                "stabilization.window must be > 0".into(),
            ));
        }
        if self.stabilization.tolerance.is_nan() || self.stabilization.tolerance < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "stabilization.tolerance must be >= 0, got {}",
                self.stabilization.tolerance
            )));
        }
        if self.stabilization.metric.is_empty() {
            return Err(Error::InvalidConfig(
                "stabilization.metric must not be empty".into(),
            ));
        }
        if self.stabilization.bucket_secs < 0
            || chrono::Duration::try_seconds(self.stabilization.bucket_secs).is_none()
        {
            return Err(Error::InvalidConfig(format!(
                "stabilization.bucket_secs out of range, got {}",
                self.stabilization.bucket_secs
            )));
        }
        if self.matching.tolerance_secs < 0
            || chrono::Duration::try_seconds(self.matching.tolerance_secs).is_none()
        {
            return Err(Error::InvalidConfig(format!(
                "matching.tolerance_secs out of range, got {}",
                self.matching.tolerance_secs
            )));
        }
        if self.ingest.timestamp_formats.is_empty() {
            return Err(Error::InvalidConfig(
                "ingest.timestamp_formats must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Churn accounting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    /// Number of AS-hops kept in the unstable ranking.
    pub top_n: usize,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

/// Stabilization detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizationConfig {
    /// Number of consecutive samples in the sliding window.
    pub window: usize,

    /// Maximum allowed range (max - min) inside the window, in metric units.
    pub tolerance: f64,

    /// Probe metric used to build the per-batch series.
    pub metric: String,

    /// Average the series into buckets of this many seconds before
    /// detection. `0` keeps one sample per batch.
    pub bucket_secs: i64,
}

impl StabilizationConfig {
    /// Bucket width, `None` when bucketing is off or out of range.
    pub fn bucket_width(&self) -> Option<chrono::Duration> {
        if self.bucket_secs > 0 {
            chrono::Duration::try_seconds(self.bucket_secs)
        } else {
            None
        }
    }
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            window: 10,
            tolerance: 5.0, // ms
            metric: "avg_rtt".to_string(),
            bucket_secs: 0,
        }
    }
}

/// Cross-series matching configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Maximum |ta - tb| for two timestamps to be partners, in seconds.
    pub tolerance_secs: i64,

    /// Also run the B -> A direction.
    pub symmetric: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: 15 * 60,
            symmetric: false,
        }
    }
}

impl MatchConfig {
    /// Tolerance as a duration, saturating at the largest representable one.
    pub fn tolerance(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.tolerance_secs).unwrap_or(chrono::Duration::MAX)
    }
}

/// Input decoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// `chrono` format strings tried in order when parsing timestamps.
    pub timestamp_formats: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timestamp_formats: vec![
                "%Y-%m-%dT%H:%M:%SZ".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M".to_string(),
                "%Y-%m-%dT%H-%M-%S".to_string(),
                "%Y-%m-%dT%H-%M".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.churn.top_n, 10);
        assert_eq!(config.stabilization.window, 10);
        assert_eq!(config.matching.tolerance_secs, 900);
        assert!(!config.matching.symmetric);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AnalysisConfig::from_json(r#"{"stabilization": {"window": 5}}"#).unwrap();
        assert_eq!(config.stabilization.window, 5);
        assert!((config.stabilization.tolerance - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.churn.top_n, 10);
    }

    #[test]
    fn test_config_serialization() {
        let config = AnalysisConfig::default();
        let json = config.to_json_pretty().unwrap();
        let parsed = AnalysisConfig::from_json(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AnalysisConfig::default();
        config.stabilization.window = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = AnalysisConfig::default();
        config.stabilization.tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.matching.tolerance_secs = -1;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.stabilization.bucket_secs = -60;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.ingest.timestamp_formats.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_match_tolerance_duration() {
        let config = MatchConfig::default();
        assert_eq!(config.tolerance(), chrono::Duration::minutes(15));
    }

    #[test]
    fn test_huge_match_tolerance() {
        let mut config = AnalysisConfig::default();
        config.matching.tolerance_secs = 10_000_000_000_000_000;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        assert_eq!(config.matching.tolerance(), chrono::Duration::MAX);
    }
}
