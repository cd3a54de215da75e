// PathDelta Report - Batch runner for path churn analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # PathDelta Report
//!
//! Reads collector JSON documents, runs one analysis and writes the report.
//!
//! ## Usage
//!
//! ```bash
//! # Churn only
//! pathdelta-report --snapshots paths.json --output report.json
//!
//! # Single-path vs multi-path comparison, both directions
//! pathdelta-report --probes-a sp_ping.json --probes-b mp_ping.json \
//!     --bandwidth-a sp_bw.json --bandwidth-b mp_bw.json --symmetric \
//!     --pairs-csv pairs.csv
//! ```

mod export;

use clap::Parser;
use export::{
    read_input, write_events_csv, write_lifetimes_csv, write_pairs_csv, write_report_json,
    ReportError,
};
use pathdelta::{AnalysisConfig, AnalysisEngine, AnalysisReport, IngestSummary, SeriesSide};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// PathDelta batch report
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path snapshot document file (repeatable)
    #[arg(long)]
    snapshots: Vec<PathBuf>,

    /// Comparer delta document file (repeatable)
    #[arg(long)]
    deltas: Vec<PathBuf>,

    /// Latency probe file for series A (repeatable)
    #[arg(long)]
    probes_a: Vec<PathBuf>,

    /// Latency probe file for series B (repeatable)
    #[arg(long)]
    probes_b: Vec<PathBuf>,

    /// Bandwidth file for series A (repeatable)
    #[arg(long)]
    bandwidth_a: Vec<PathBuf>,

    /// Bandwidth file for series B (repeatable)
    #[arg(long)]
    bandwidth_b: Vec<PathBuf>,

    /// Traceroute document file (repeatable)
    #[arg(long)]
    traceroutes: Vec<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stabilization window size (samples)
    #[arg(long)]
    window: Option<usize>,

    /// Stabilization tolerance (metric units)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Cross-series matching tolerance in seconds
    #[arg(long)]
    match_tolerance_secs: Option<i64>,

    /// Also match series B against series A
    #[arg(long)]
    symmetric: bool,

    /// Number of unstable AS-hops to rank
    #[arg(long)]
    top_n: Option<usize>,

    /// Report output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Matched pairs CSV output
    #[arg(long)]
    pairs_csv: Option<PathBuf>,

    /// Path lifetimes CSV output
    #[arg(long)]
    lifetimes_csv: Option<PathBuf>,

    /// Churn events CSV output
    #[arg(long)]
    events_csv: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn analysis_config(&self) -> Result<AnalysisConfig, ReportError> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json(&read_input(path)?)?,
            None => AnalysisConfig::default(),
        };
        if let Some(window) = self.window {
            config.stabilization.window = window;
        }
        if let Some(tolerance) = self.tolerance {
            config.stabilization.tolerance = tolerance;
        }
        if let Some(secs) = self.match_tolerance_secs {
            config.matching.tolerance_secs = secs;
        }
        if self.symmetric {
            config.matching.symmetric = true;
        }
        if let Some(top_n) = self.top_n {
            config.churn.top_n = top_n;
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("PathDelta Report v{}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), ReportError> {
    let mut engine = AnalysisEngine::new(args.analysis_config()?)?;

    ingest_files(&args.snapshots, "snapshots", |json| {
        engine.ingest_snapshots_json(json)
    })?;
    ingest_files(&args.deltas, "deltas", |json| engine.ingest_deltas_json(json))?;
    ingest_files(&args.probes_a, "probes A", |json| {
        engine.ingest_probes_json(SeriesSide::A, json)
    })?;
    ingest_files(&args.probes_b, "probes B", |json| {
        engine.ingest_probes_json(SeriesSide::B, json)
    })?;
    ingest_files(&args.bandwidth_a, "bandwidth A", |json| {
        engine.ingest_bandwidth_json(SeriesSide::A, json)
    })?;
    ingest_files(&args.bandwidth_b, "bandwidth B", |json| {
        engine.ingest_bandwidth_json(SeriesSide::B, json)
    })?;
    ingest_files(&args.traceroutes, "traceroutes", |json| {
        engine.ingest_traceroutes_json(json)
    })?;

    let report = engine.run();
    write_outputs(args, &report)
}

fn ingest_files<F>(paths: &[PathBuf], label: &str, mut ingest: F) -> Result<(), ReportError>
where
    F: FnMut(&str) -> pathdelta::Result<IngestSummary>,
{
    for path in paths {
        let summary = ingest(&read_input(path)?)?;
        info!(
            file = %path.display(),
            accepted = summary.accepted,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            "{} loaded",
            label
        );
    }
    Ok(())
}

fn write_outputs(args: &Args, report: &AnalysisReport) -> Result<(), ReportError> {
    match &args.output {
        Some(path) => {
            write_report_json(path, report)?;
            info!(file = %path.display(), "report written");
        }
        None => println!("{}", report.to_json_pretty()?),
    }

    write_table(args.pairs_csv.as_deref(), "pairs", report, write_pairs_csv)?;
    write_table(args.lifetimes_csv.as_deref(), "lifetimes", report, write_lifetimes_csv)?;
    write_table(args.events_csv.as_deref(), "events", report, write_events_csv)?;
    Ok(())
}

fn write_table(
    path: Option<&Path>,
    label: &str,
    report: &AnalysisReport,
    write: fn(&Path, &AnalysisReport) -> Result<usize, ReportError>,
) -> Result<(), ReportError> {
    if let Some(path) = path {
        let rows = write(path, report)?;
        info!(file = %path.display(), rows, "{} table written", label);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"stabilization": {{"window": 4, "tolerance": 2.0}}, "churn": {{"top_n": 3}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let path = file.path().to_string_lossy().to_string();
        let args = Args::parse_from([
            "pathdelta-report",
            "--config",
            path.as_str(),
            "--window",
            "6",
            "--symmetric",
        ]);
        let config = args.analysis_config().unwrap();
        assert_eq!(config.stabilization.window, 6);
        assert_eq!(config.stabilization.tolerance, 2.0);
        assert_eq!(config.churn.top_n, 3);
        assert!(config.matching.symmetric);
        assert_eq!(config.matching.tolerance_secs, 900);
    }

    #[test]
    fn test_run_rejects_invalid_config() {
        let args = Args::parse_from(["pathdelta-report", "--window", "0"]);
        assert!(matches!(
            run(&args),
            Err(ReportError::Analysis(pathdelta::Error::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_run_writes_report() {
        let mut snapshots = NamedTempFile::new().unwrap();
        write!(
            snapshots,
            r#"[{{"destination": "D", "timestamp": "2025-07-15T10:00", "paths": []}}]"#
        )
        .unwrap();
        snapshots.flush().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("report.json");

        let args = Args::parse_from([
            "pathdelta-report".to_string(),
            "--snapshots".to_string(),
            snapshots.path().to_string_lossy().to_string(),
            "--output".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        run(&args).unwrap();
        let report = AnalysisReport::from_json(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report.global.total_snapshots, 1);
    }

    #[test]
    fn test_run_ingests_traceroutes() {
        let mut traces = NamedTempFile::new().unwrap();
        write!(
            traces,
            r#"{{"destination": "D", "timestamp": "2025-07-15T10:00",
                "hops": [{{"isd_as": "1-a", "round_trip_times": [3.0]}}]}}"#
        )
        .unwrap();
        traces.flush().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("report.json");

        let args = Args::parse_from([
            "pathdelta-report".to_string(),
            "--traceroutes".to_string(),
            traces.path().to_string_lossy().to_string(),
            "--output".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        run(&args).unwrap();
        let report = AnalysisReport::from_json(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report.global.total_traceroutes, 1);
        assert_eq!(report.traceroute[0].slowest_as_hops[0].as_hop, "1-a");
    }
}
