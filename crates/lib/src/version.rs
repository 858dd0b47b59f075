//! Causal version vectors.
//!
//! Every node of a document carries a [`VersionVector`]: a map from replica
//! ([`LifespanId`]) to a counter that only ever grows. Modifying a node on a
//! replica increments that replica's counter. Comparing two vectors tells
//! whether one edit history contains the other or whether the two replicas
//! edited concurrently; reconciling concurrent edits is left to callers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::keys::{LifespanId, NodeKey};

/// Versions of every node in a document, keyed by node.
pub type VersionMap = HashMap<NodeKey, VersionVector>;

/// Immutable map from replica to modification counter.
///
/// Absent replicas count as zero and zero counters are never stored, so two
/// vectors describing the same history are always `==`.
///
/// `PartialOrd` implements causal order: `a < b` when every counter of `a` is
/// at most the matching counter of `b` and at least one is smaller. Vectors
/// edited concurrently are incomparable (`partial_cmp` returns `None`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector {
    clocks: BTreeMap<LifespanId, u32>,
}

impl VersionVector {
    /// The empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter for `replica`, zero when absent.
    pub fn get(&self, replica: &LifespanId) -> u32 {
        self.clocks.get(replica).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Returns a copy of this vector with `replica`'s counter one greater.
    pub fn incr(&self, replica: LifespanId) -> Self {
        let mut clocks = self.clocks.clone();
        *clocks.entry(replica).or_insert(0) += 1;
        Self { clocks }
    }

    /// Returns a copy with `replica`'s counter raised to at least `value`.
    ///
    /// Counters never decrease, so a smaller `value` leaves the vector as is.
    pub fn with(&self, replica: LifespanId, value: u32) -> Self {
        let mut clocks = self.clocks.clone();
        if value > 0 {
            let current = clocks.entry(replica).or_insert(0);
            *current = (*current).max(value);
        }
        Self { clocks }
    }

    /// Pointwise maximum of two vectors.
    pub fn sync(&self, other: &VersionVector) -> Self {
        let mut clocks = self.clocks.clone();
        for (replica, value) in &other.clocks {
            let current = clocks.entry(*replica).or_insert(0);
            *current = (*current).max(*value);
        }
        Self { clocks }
    }

    /// Iterates replicas and counters in replica order.
    pub fn iter(&self) -> impl Iterator<Item = (&LifespanId, u32)> {
        self.clocks.iter().map(|(k, v)| (k, *v))
    }

    /// `true` if `other` saw everything this vector saw, plus more.
    pub fn happened_before(&self, other: &VersionVector) -> bool {
        self.partial_cmp(other) == Some(Ordering::Less)
    }

    /// `true` if this vector saw everything `other` saw, plus more.
    pub fn after(&self, other: &VersionVector) -> bool {
        self.partial_cmp(other) == Some(Ordering::Greater)
    }

    /// `true` if each vector contains edits the other has not seen.
    pub fn is_concurrent(&self, other: &VersionVector) -> bool {
        self.partial_cmp(other).is_none()
    }
}

impl PartialOrd for VersionVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let mut self_ahead = false;
        let mut other_ahead = false;
        for replica in self.clocks.keys().chain(other.clocks.keys()) {
            match self.get(replica).cmp(&other.get(replica)) {
                Ordering::Greater => self_ahead = true,
                Ordering::Less => other_ahead = true,
                Ordering::Equal => {}
            }
            if self_ahead && other_ahead {
                return None;
            }
        }
        match (self_ahead, other_ahead) {
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => Some(Ordering::Equal),
            (true, true) => None,
        }
    }
}

impl FromIterator<(LifespanId, u32)> for VersionVector {
    fn from_iter<I: IntoIterator<Item = (LifespanId, u32)>>(iter: I) -> Self {
        let clocks = iter.into_iter().filter(|(_, v)| *v > 0).collect();
        Self { clocks }
    }
}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (replica, value)) in self.clocks.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{replica} -> {value}")?;
        }
        f.write_str("}")
    }
}
