// PathDelta Report - Batch runner for path churn analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Report and CSV table writers.
//!
//! The JSON report carries everything; the CSV tables are flat views for
//! plotting tools (one row per matched pair, path lifetime, churn event).

use pathdelta::{AnalysisReport, Timestamp};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Runner errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] pathdelta::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read an input document file.
pub fn read_input(path: &Path) -> Result<String, ReportError> {
    if !path.exists() {
        return Err(ReportError::FileNotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?)
}

#[derive(Debug, Serialize)]
struct PairRow<'a> {
    comparison: &'a str,
    destination: &'a str,
    fingerprint: &'a str,
    a_timestamp: Timestamp,
    b_timestamp: Timestamp,
    time_delta_secs: f64,
    metric: &'a str,
    a_value: f64,
    b_value: f64,
    diff: f64,
}

#[derive(Debug, Serialize)]
struct LifetimeRow<'a> {
    destination: &'a str,
    fingerprint: &'a str,
    start: Timestamp,
    end: Timestamp,
    duration_secs: f64,
}

#[derive(Debug, Serialize)]
struct EventRow<'a> {
    destination: &'a str,
    timestamp: Timestamp,
    kind: &'a str,
    fingerprint: &'a str,
    hop_count: usize,
    sequence: String,
}

/// Write the full report as pretty JSON.
pub fn write_report_json(path: &Path, report: &AnalysisReport) -> Result<(), ReportError> {
    fs::write(path, report.to_json_pretty()?)?;
    Ok(())
}

/// One row per matched pair, all comparisons. Returns the row count.
pub fn write_pairs_csv(path: &Path, report: &AnalysisReport) -> Result<usize, ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for (comparison, pairs) in &report.pairs {
        for pair in pairs {
            writer.serialize(PairRow {
                comparison,
                destination: &pair.destination,
                fingerprint: pair.fingerprint.as_str(),
                a_timestamp: pair.a_timestamp,
                b_timestamp: pair.b_timestamp,
                time_delta_secs: pair.time_delta_secs,
                metric: &pair.metric,
                a_value: pair.a_value,
                b_value: pair.b_value,
                diff: pair.diff,
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

/// One row per closed path lifetime. Returns the row count.
pub fn write_lifetimes_csv(path: &Path, report: &AnalysisReport) -> Result<usize, ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for (destination, churn) in &report.churn {
        for lifetime in &churn.lifetimes {
            writer.serialize(LifetimeRow {
                destination,
                fingerprint: lifetime.fingerprint.as_str(),
                start: lifetime.start,
                end: lifetime.end,
                duration_secs: lifetime.duration_secs,
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

/// One row per added/removed event. Returns the row count.
pub fn write_events_csv(path: &Path, report: &AnalysisReport) -> Result<usize, ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for churn in report.churn.values() {
        for event in &churn.events {
            writer.serialize(EventRow {
                destination: &event.destination,
                timestamp: event.timestamp,
                kind: event.kind.as_str(),
                fingerprint: event.fingerprint.as_str(),
                hop_count: event.descriptor.hop_count,
                sequence: event.descriptor.sequence.join(" "),
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}
