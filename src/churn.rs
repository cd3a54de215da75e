// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fingerprint-set differencing, path lifetimes and churn tallies.
//!
//! [`ChurnDetector::diff`] compares two snapshots. The sequential walkers
//! ([`ChurnDetector::process_history`] and [`ChurnDetector::process_deltas`])
//! keep an open-interval map per destination:
//!
//! - `Added` opens (or overwrites) the interval start for a fingerprint.
//! - `Removed` closes it and yields a [`PathLifetime`]. A removal without an
//!   open start is counted in `unmatched_removals` and yields no lifetime.
//!
//! A second `Added` before the matching `Removed` replaces the earlier start
//! (last writer wins).

use crate::config::ChurnConfig;
use crate::path::{Fingerprint, PathDescriptor};
use crate::store::{Snapshot, SnapshotStore};
use crate::time::{seconds_between, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Outcome of comparing two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    ChangeDetected,
    NoPathsPresent,
    AllPathsLost,
    AllPathsNew,
    NoChange,
}

impl ChangeStatus {
    /// Classify a diff. Checked in priority order.
    pub fn classify(
        added: &BTreeSet<Fingerprint>,
        removed: &BTreeSet<Fingerprint>,
        older_empty: bool,
        newer_empty: bool,
    ) -> Self {
        if !added.is_empty() || !removed.is_empty() {
            ChangeStatus::ChangeDetected
        } else if older_empty && newer_empty {
            ChangeStatus::NoPathsPresent
        } else if newer_empty {
            ChangeStatus::AllPathsLost
        } else if older_empty {
            ChangeStatus::AllPathsNew
        } else {
            ChangeStatus::NoChange
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::ChangeDetected => "change_detected",
            ChangeStatus::NoPathsPresent => "no_paths_present",
            ChangeStatus::AllPathsLost => "all_paths_lost",
            ChangeStatus::AllPathsNew => "all_paths_new",
            ChangeStatus::NoChange => "no_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "change_detected" => Some(ChangeStatus::ChangeDetected),
            "no_paths_present" => Some(ChangeStatus::NoPathsPresent),
            "all_paths_lost" => Some(ChangeStatus::AllPathsLost),
            "all_paths_new" => Some(ChangeStatus::AllPathsNew),
            "no_change" => Some(ChangeStatus::NoChange),
            _ => None,
        }
    }
}

/// Partition of `older ∪ newer` fingerprints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub added: BTreeSet<Fingerprint>,
    pub removed: BTreeSet<Fingerprint>,
    pub persistent: BTreeSet<Fingerprint>,
    pub status: ChangeStatus,
}

/// Direction of a churn event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
        }
    }
}

/// One path appearing or disappearing between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnEvent {
    pub destination: String,
    pub fingerprint: Fingerprint,
    pub kind: ChangeKind,
    pub timestamp: Timestamp,
    pub descriptor: PathDescriptor,
}

/// Closed add/remove interval for one fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathLifetime {
    pub fingerprint: Fingerprint,
    pub start: Timestamp,
    pub end: Timestamp,
    pub duration_secs: f64,
}

/// A precomputed set of changes at one timestamp, e.g. from a stored delta
/// document.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDelta {
    pub destination: String,
    pub timestamp: Timestamp,
    /// Status recorded alongside the changes, if any.
    pub status: Option<ChangeStatus>,
    pub changes: Vec<(ChangeKind, PathDescriptor)>,
}

impl SnapshotDelta {
    fn effective_status(&self) -> ChangeStatus {
        match self.status {
            Some(status) => status,
            None if self.changes.is_empty() => ChangeStatus::NoChange,
            None => ChangeStatus::ChangeDetected,
        }
    }
}

/// Churn counters keyed by AS-hop and by path length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChurnTally {
    pub by_as_hop: BTreeMap<String, u64>,
    pub by_path_length: BTreeMap<usize, u64>,
    /// Number of added + removed events counted.
    pub events: u64,
    hop_count_sum: u64,
}

impl ChurnTally {
    pub fn record(&mut self, descriptor: &PathDescriptor) {
        self.events += 1;
        self.hop_count_sum += descriptor.hop_count as u64;
        *self.by_path_length.entry(descriptor.hop_count).or_default() += 1;
        for hop in &descriptor.sequence {
            *self.by_as_hop.entry(hop.clone()).or_default() += 1;
        }
    }

    pub fn merge(&mut self, other: &ChurnTally) {
        self.events += other.events;
        self.hop_count_sum += other.hop_count_sum;
        for (len, count) in &other.by_path_length {
            *self.by_path_length.entry(*len).or_default() += count;
        }
        for (hop, count) in &other.by_as_hop {
            *self.by_as_hop.entry(hop.clone()).or_default() += count;
        }
    }

    /// Mean `hop_count` over all counted events, `0.0` if none.
    pub fn avg_path_length(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.hop_count_sum as f64 / self.events as f64
        }
    }

    /// Highest counts first; ties by ascending AS-hop identifier.
    pub fn top_unstable(&self, n: usize) -> Vec<(String, u64)> {
        let mut ranked: Vec<(String, u64)> = self
            .by_as_hop
            .iter()
            .map(|(hop, count)| (hop.clone(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

/// Result of walking one destination's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationChurn {
    pub destination: String,
    /// Number of consecutive comparisons performed.
    pub comparisons: usize,
    /// Comparisons classified as `change_detected`.
    pub change_events: usize,
    pub added_total: usize,
    pub removed_total: usize,
    pub statuses: Vec<(Timestamp, ChangeStatus)>,
    pub events: Vec<ChurnEvent>,
    pub lifetimes: Vec<PathLifetime>,
    /// Removals with no observed start.
    pub unmatched_removals: usize,
    /// Intervals still open at the end of the history.
    pub open_intervals: BTreeMap<Fingerprint, Timestamp>,
    pub tally: ChurnTally,
}

impl DestinationChurn {
    fn new(destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
            comparisons: 0,
            change_events: 0,
            added_total: 0,
            removed_total: 0,
            statuses: Vec::new(),
            events: Vec::new(),
            lifetimes: Vec::new(),
            unmatched_removals: 0,
            open_intervals: BTreeMap::new(),
            tally: ChurnTally::default(),
        }
    }

    pub fn avg_path_length_of_changes(&self) -> f64 {
        self.tally.avg_path_length()
    }

    /// Mean closed lifetime in seconds, `None` if no interval closed.
    pub fn avg_lifetime_secs(&self) -> Option<f64> {
        if self.lifetimes.is_empty() {
            None
        } else {
            let total: f64 = self.lifetimes.iter().map(|l| l.duration_secs).sum();
            Some(total / self.lifetimes.len() as f64)
        }
    }

    fn apply(
        &mut self,
        timestamp: Timestamp,
        status: ChangeStatus,
        changes: Vec<(ChangeKind, PathDescriptor)>,
    ) {
        self.comparisons += 1;
        if status == ChangeStatus::ChangeDetected {
            self.change_events += 1;
        }
        self.statuses.push((timestamp, status));

        for (kind, descriptor) in changes {
            let fingerprint = descriptor.fingerprint.clone();
            match kind {
                ChangeKind::Added => {
                    self.added_total += 1;
                    self.open_intervals.insert(fingerprint.clone(), timestamp);
                }
                ChangeKind::Removed => {
                    self.removed_total += 1;
                    match self.open_intervals.remove(&fingerprint) {
                        Some(start) => self.lifetimes.push(PathLifetime {
                            fingerprint: fingerprint.clone(),
                            start,
                            end: timestamp,
                            duration_secs: seconds_between(start, timestamp),
                        }),
                        None => self.unmatched_removals += 1,
                    }
                }
            }
            self.tally.record(&descriptor);
            self.events.push(ChurnEvent {
                destination: self.destination.clone(),
                fingerprint,
                kind,
                timestamp,
                descriptor,
            });
        }
    }
}

/// Snapshot differ and history walker.
#[derive(Debug, Clone, Default)]
pub struct ChurnDetector {
    config: ChurnConfig,
}

impl ChurnDetector {
    pub fn new(config: ChurnConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChurnConfig {
        &self.config
    }

    /// Compare two snapshots of the same destination.
    pub fn diff(&self, older: &Snapshot, newer: &Snapshot) -> SnapshotDiff {
        let old_fps = older.fingerprints();
        let new_fps = newer.fingerprints();

        let added: BTreeSet<Fingerprint> = new_fps.difference(&old_fps).cloned().collect();
        let removed: BTreeSet<Fingerprint> = old_fps.difference(&new_fps).cloned().collect();
        let persistent: BTreeSet<Fingerprint> = new_fps.intersection(&old_fps).cloned().collect();
        let status =
            ChangeStatus::classify(&added, &removed, old_fps.is_empty(), new_fps.is_empty());

        SnapshotDiff {
            added,
            removed,
            persistent,
            status,
        }
    }

    /// Walk snapshots in chronological order, diffing each consecutive pair.
    ///
    /// Input is re-sorted by timestamp (stable), so callers may pass
    /// snapshots in any order. Snapshots are assumed to share a destination;
    /// the first one names the result.
    pub fn process_history(&self, snapshots: &[&Snapshot]) -> DestinationChurn {
        let mut ordered: Vec<&Snapshot> = snapshots.to_vec();
        ordered.sort_by_key(|s| s.timestamp);

        let destination = ordered.first().map_or("", |s| s.destination.as_str());
        let mut churn = DestinationChurn::new(destination);

        for pair in ordered.windows(2) {
            let (older, newer) = (pair[0], pair[1]);
            let diff = self.diff(older, newer);

            let mut changes = Vec::with_capacity(diff.added.len() + diff.removed.len());
            for fp in &diff.added {
                if let Some(desc) = newer.descriptor(fp) {
                    changes.push((ChangeKind::Added, desc.clone()));
                }
            }
            for fp in &diff.removed {
                if let Some(desc) = older.descriptor(fp) {
                    changes.push((ChangeKind::Removed, desc.clone()));
                }
            }

            churn.apply(newer.timestamp, diff.status, changes);
        }

        debug!(
            destination = %churn.destination,
            comparisons = churn.comparisons,
            added = churn.added_total,
            removed = churn.removed_total,
            "churn history processed"
        );
        churn
    }

    /// Walk precomputed deltas with the same lifetime and tally rules as
    /// [`ChurnDetector::process_history`].
    pub fn process_deltas(&self, destination: &str, deltas: &[SnapshotDelta]) -> DestinationChurn {
        let mut ordered: Vec<&SnapshotDelta> = deltas.iter().collect();
        ordered.sort_by_key(|d| d.timestamp);

        let mut churn = DestinationChurn::new(destination);
        for delta in ordered {
            churn.apply(delta.timestamp, delta.effective_status(), delta.changes.clone());
        }

        debug!(
            destination = %churn.destination,
            comparisons = churn.comparisons,
            "churn deltas processed"
        );
        churn
    }

    /// Walk every destination in the store.
    ///
    /// Destinations are independent; with the `parallel` feature they run on
    /// the rayon pool. Output is keyed (and therefore ordered) by destination.
    pub fn process_store(&self, store: &SnapshotStore) -> BTreeMap<String, DestinationChurn> {
        let destinations = store.destinations();

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            destinations
                .par_iter()
                .map(|dest| {
                    (
                        dest.to_string(),
                        self.process_history(&store.ordered_snapshots(dest)),
                    )
                })
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            destinations
                .iter()
                .map(|dest| {
                    (
                        dest.to_string(),
                        self.process_history(&store.ordered_snapshots(dest)),
                    )
                })
                .collect()
        }
    }
}
