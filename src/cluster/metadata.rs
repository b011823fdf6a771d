use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque server identity as reported by the registry
pub type NodeId = String;

/// Job identifier; the id space is totally ordered
pub type JobId = u64;

/// Half-open job-id range `[lower, upper)`; `upper == None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataInterval {
    pub lower: JobId,
    pub upper: Option<JobId>,
}

impl DataInterval {
    pub fn new(lower: JobId, upper: JobId) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    pub fn unbounded(lower: JobId) -> Self {
        Self { lower, upper: None }
    }

    pub fn contains(&self, id: JobId) -> bool {
        id >= self.lower && self.upper.map_or(true, |upper| id < upper)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.upper, Some(upper) if upper <= self.lower)
    }

    /// Compare as an unordered set of boundaries, ignoring which end each value sits on.
    pub fn same_boundaries(&self, other: &DataInterval) -> bool {
        self.boundaries() == other.boundaries()
    }

    fn boundaries(&self) -> BTreeSet<Option<JobId>> {
        [Some(self.lower), self.upper].into_iter().collect()
    }
}

impl std::fmt::Display for DataInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.upper {
            Some(upper) => write!(f, "[{}, {})", self.lower, upper),
            None => write!(f, "[{}, +inf)", self.lower),
        }
    }
}

/// A replica group and the slice of the job-id space it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySet {
    pub id: usize,
    pub servers: Vec<NodeId>,
    pub leader: Option<NodeId>,
    pub data_interval: Option<DataInterval>,
}

impl CopySet {
    pub fn new(id: usize, servers: Vec<NodeId>) -> Self {
        Self {
            id,
            servers,
            leader: None,
            data_interval: None,
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.servers.iter().any(|s| s == node_id)
    }

    pub fn is_leader(&self, node_id: &str) -> bool {
        self.leader.as_deref() == Some(node_id)
    }
}

/// Immutable cluster layout produced by the leader.
///
/// A new snapshot replaces the previous one wholesale; nothing mutates a published value.
/// `(term, generation)` orders snapshots so receivers can discard stale deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    pub term: u64,
    pub generation: u64,
    pub nodes: Vec<NodeId>,
    pub interval_boundaries: Vec<JobId>,
    pub copy_sets: Vec<CopySet>,
    pub created_at: DateTime<Utc>,
}

impl ClusterMetadata {
    pub fn new(nodes: Vec<NodeId>, interval_boundaries: Vec<JobId>, copy_sets: Vec<CopySet>) -> Self {
        Self {
            term: 0,
            generation: 0,
            nodes,
            interval_boundaries,
            copy_sets,
            created_at: Utc::now(),
        }
    }

    pub fn version(&self) -> (u64, u64) {
        (self.term, self.generation)
    }

    /// Write the snapshot as pretty-printed JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Copy sets the given node is a member of.
    pub fn copy_sets_for<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a CopySet> + 'a {
        self.copy_sets.iter().filter(move |cs| cs.contains(node_id))
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }

    /// Check that the intervals tile `[boundaries[0], +inf)` without gaps or overlaps.
    pub fn covers_id_space(&self) -> bool {
        if self.copy_sets.len() != self.interval_boundaries.len() || self.copy_sets.is_empty() {
            return false;
        }
        if self.interval_boundaries.windows(2).any(|w| w[0] > w[1]) {
            return false;
        }

        let last = self.copy_sets.len() - 1;
        self.copy_sets.iter().enumerate().all(|(i, cs)| {
            let expected = if i == last {
                DataInterval::unbounded(self.interval_boundaries[i])
            } else {
                DataInterval::new(self.interval_boundaries[i], self.interval_boundaries[i + 1])
            };
            cs.data_interval == Some(expected)
        })
    }
}
