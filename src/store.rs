// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Path snapshots and their per-destination store.

use crate::error::{Error, Result};
use crate::path::{Fingerprint, PathDescriptor};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One path-discovery run for one destination. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub destination: String,
    pub timestamp: Timestamp,
    descriptors: BTreeMap<Fingerprint, PathDescriptor>,
}

impl Snapshot {
    /// Build a snapshot. A later descriptor replaces an earlier one with the
    /// same fingerprint.
    pub fn new(
        destination: impl Into<String>,
        timestamp: Timestamp,
        descriptors: impl IntoIterator<Item = PathDescriptor>,
    ) -> Self {
        Self {
            destination: destination.into(),
            timestamp,
            descriptors: descriptors
                .into_iter()
                .map(|d| (d.fingerprint.clone(), d))
                .collect(),
        }
    }

    pub fn fingerprints(&self) -> BTreeSet<Fingerprint> {
        self.descriptors.keys().cloned().collect()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.descriptors.contains_key(fingerprint)
    }

    pub fn descriptor(&self, fingerprint: &Fingerprint) -> Option<&PathDescriptor> {
        self.descriptors.get(fingerprint)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PathDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Snapshots indexed by destination, kept in insertion order.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    by_destination: HashMap<String, Vec<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a snapshot built from `descriptors`.
    ///
    /// Rejects an exact (destination, timestamp) duplicate instead of merging.
    pub fn add_snapshot(
        &mut self,
        destination: &str,
        timestamp: Timestamp,
        descriptors: impl IntoIterator<Item = PathDescriptor>,
    ) -> Result<()> {
        self.insert(Snapshot::new(destination, timestamp, descriptors))
    }

    /// Insert an already built snapshot. Same duplicate policy as
    /// [`SnapshotStore::add_snapshot`].
    pub fn insert(&mut self, snapshot: Snapshot) -> Result<()> {
        let entries = self
            .by_destination
            .entry(snapshot.destination.clone())
            .or_default();

        if entries.iter().any(|s| s.timestamp == snapshot.timestamp) {
            return Err(Error::DuplicateTimestamp {
                destination: snapshot.destination,
                timestamp: snapshot.timestamp,
            });
        }

        entries.push(snapshot);
        Ok(())
    }

    /// Snapshots for `destination`, ascending by timestamp. Stable: ties keep
    /// insertion order.
    pub fn ordered_snapshots(&self, destination: &str) -> Vec<&Snapshot> {
        let mut ordered: Vec<&Snapshot> = self
            .by_destination
            .get(destination)
            .map(|v| v.iter().collect())
            .unwrap_or_default();
        ordered.sort_by_key(|s| s.timestamp);
        ordered
    }

    /// Most recent snapshot.
    pub fn latest(&self, destination: &str) -> Result<&Snapshot> {
        self.nth_latest(destination, 0)
    }

    /// Second most recent snapshot.
    pub fn previous(&self, destination: &str) -> Result<&Snapshot> {
        self.nth_latest(destination, 1)
    }

    fn nth_latest(&self, destination: &str, n: usize) -> Result<&Snapshot> {
        let ordered = self.ordered_snapshots(destination);
        let available = ordered.len();
        ordered
            .into_iter()
            .rev()
            .nth(n)
            .ok_or_else(|| Error::NotFound {
                destination: destination.to_string(),
                needed: n + 1,
                available,
            })
    }

    /// Destinations in ascending order.
    pub fn destinations(&self) -> Vec<&str> {
        let mut dests: Vec<&str> = self.by_destination.keys().map(String::as_str).collect();
        dests.sort_unstable();
        dests
    }

    pub fn snapshot_count(&self, destination: &str) -> usize {
        self.by_destination.get(destination).map_or(0, Vec::len)
    }

    pub fn total_snapshots(&self) -> usize {
        self.by_destination.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_snapshots() == 0
    }
}
