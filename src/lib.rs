// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # PathDelta
//!
//! Batch analysis of network path measurement snapshots.
//!
//! Collectors periodically record, per destination, the set of available
//! paths (each identified by a fingerprint), latency probes and bandwidth
//! tests. PathDelta derives:
//! - **Churn**: which paths appeared or disappeared between snapshots, how
//!   long they lived, and which AS-hops and path lengths churn most
//! - **Stabilization**: the first point where a latency series settles into
//!   a narrow band
//! - **Cross-series divergence**: how two independently scheduled campaigns
//!   (series A and B) differ for the same destination and fingerprint
//! - **Traceroute latency**: hop counts, unanswered hops and the slowest
//!   AS-hops per destination
//!
//! ## Quick Start
//!
//! ```rust
//! use pathdelta::{AnalysisConfig, AnalysisEngine, SeriesSide};
//!
//! let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();
//!
//! engine
//!     .ingest_snapshots_json(
//!         r#"[
//!         {"destination": "D", "timestamp": "2025-07-15T10:00",
//!          "paths": [{"fingerprint": "fp1", "sequence": "1-a#1 1-b#2"},
//!                    {"fingerprint": "fp2", "sequence": "1-a#1 1-c#2"}]},
//!         {"destination": "D", "timestamp": "2025-07-15T11:00",
//!          "paths": [{"fingerprint": "fp2", "sequence": "1-a#1 1-c#2"},
//!                    {"fingerprint": "fp3", "sequence": "1-a#1 1-d#3 1-c#2"}]}
//!     ]"#,
//!     )
//!     .unwrap();
//!
//! engine
//!     .ingest_bandwidth_json(
//!         SeriesSide::A,
//!         r#"{"destination": "D", "timestamp": "2025-07-15T10:00", "fingerprint": "fp2",
//!             "result": {"S->C results": {"achieved_mbps": 80.0}}}"#,
//!     )
//!     .unwrap();
//! engine
//!     .ingest_bandwidth_json(
//!         SeriesSide::B,
//!         r#"{"destination": "D", "timestamp": "2025-07-15T10:10", "fingerprint": "fp2",
//!             "result": {"S->C results": {"achieved_mbps": 75.0}}}"#,
//!     )
//!     .unwrap();
//!
//! let report = engine.run();
//! let dest = report.destination("D").unwrap();
//! assert_eq!(dest.added_total, 1);
//! assert_eq!(dest.removed_total, 1);
//!
//! let bw = report.cross_series("bandwidth_a_to_b").unwrap();
//! assert_eq!(bw.matched_pairs, 1);
//! assert_eq!(bw.by_metric["sc_bw"].mean, Some(5.0));
//! ```
//!
//! ## Components
//!
//! Each component can also be used on its own:
//!
//! - [`store::SnapshotStore`]: per-destination snapshot history
//! - [`churn::ChurnDetector`]: snapshot diffs, lifetimes, churn tallies
//! - [`stabilization::find_stabilization`]: sliding-window range scan
//! - [`matcher::CrossSeriesMatcher`]: tolerance-windowed nearest-timestamp join
//! - [`summary::SummaryAggregator`]: destination and global reports
//! - [`input`]: decoders for collector JSON documents
//!
//! ## Feature flags
//!
//! - `parallel`: run per-destination churn walks and matching on the rayon
//!   thread pool. Results are identical to the sequential run.

// Core modules
pub mod churn;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod matcher;
pub mod path;
pub mod series;
pub mod stabilization;
pub mod store;
pub mod summary;
pub mod time;

// Re-exports for convenience
pub use churn::{ChangeKind, ChangeStatus, ChurnDetector, ChurnEvent, PathLifetime, SnapshotDiff};
pub use config::{AnalysisConfig, ChurnConfig, IngestConfig, MatchConfig, StabilizationConfig};
pub use engine::{AnalysisEngine, IngestSummary};
pub use error::{Error, RecordKind, Result, SkippedRecord};
pub use matcher::{CrossSeriesMatcher, MatchOutcome, MatchedPair, SeriesRecords, SeriesSide};
pub use path::{Fingerprint, PathDescriptor};
pub use series::{MetricSeries, SeriesStats};
pub use stabilization::{find_stabilization, StabilizationDetector, StabilizationReport};
pub use store::{Snapshot, SnapshotStore};
pub use summary::{AnalysisReport, SummaryAggregator};
pub use time::Timestamp;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
