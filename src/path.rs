// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Path fingerprints and descriptors.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Marker separating the AS-hop from the interface list in a hop token,
/// e.g. `19-ffaa:0:1301#1,2`.
pub const INTERFACE_MARKER: char = '#';

/// Stable identifier of one concrete path instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(fp: impl Into<String>) -> Self {
        Self(fp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for Fingerprint {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A path as seen in one discovery snapshot.
///
/// Invariant: `hop_count == sequence.len()` and `sequence` never holds the
/// same AS-hop twice in a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDescriptor {
    pub fingerprint: Fingerprint,
    pub sequence: Vec<String>,
    pub hop_count: usize,
}

impl PathDescriptor {
    /// Build from a raw hop string such as
    /// `"19-ffaa:0:1301#0,1 19-ffaa:0:1303#2,3 19-ffaa:0:1303#4,5"`.
    ///
    /// Tokens without an interface marker are ignored.
    pub fn from_sequence(fingerprint: impl Into<Fingerprint>, raw: &str) -> Self {
        let sequence = parse_as_hops(raw);
        Self {
            fingerprint: fingerprint.into(),
            hop_count: sequence.len(),
            sequence,
        }
    }
}

/// Extract AS-hops from a raw hop string, collapsing consecutive repeats.
pub fn parse_as_hops(raw: &str) -> Vec<String> {
    let mut hops: Vec<String> = Vec::new();
    for token in raw.split_whitespace() {
        let Some((hop, _)) = token.split_once(INTERFACE_MARKER) else {
            continue;
        };
        if hops.last().map(String::as_str) != Some(hop) {
            hops.push(hop.to_string());
        }
    }
    hops
}
