//! Copy-set placement.
//!
//! Random replication scatters every node's data over nearly the whole fleet, so almost any
//! simultaneous failure of `R` nodes loses some group entirely. Copy sets restrict placement to a
//! small number of fixed groups: each node only ever shares groups with a bounded set of peers
//! (its scatter width), which keeps the number of fatal failure combinations low.
//!
//! Groups are formed by drawing seeded permutations of the node list and chopping each
//! permutation into consecutive runs of `R` nodes. The seed makes the layout reproducible.

use std::collections::{BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::cluster::metadata::{CopySet, NodeId};
use crate::error::{ClusterError, Result};

#[derive(Debug, Clone, Copy)]
pub struct CopySetBuilder {
    seed: u64,
}

impl CopySetBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Partition `nodes` into groups of exactly `replication_factor` distinct members.
    ///
    /// Every node lands in at least one group. Groups carry no leader or interval yet.
    pub fn build(
        &self,
        nodes: &[NodeId],
        replication_factor: usize,
        scatter_width: usize,
    ) -> Result<Vec<CopySet>> {
        if replication_factor == 0 {
            return Err(ClusterError::InvalidConfiguration(
                "replication factor must be positive".to_string(),
            ));
        }
        if scatter_width == 0 {
            return Err(ClusterError::InvalidConfiguration(
                "scatter width must be positive".to_string(),
            ));
        }

        // Canonical input order so the result only depends on the node set and the seed
        let nodes: Vec<NodeId> = nodes
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if nodes.len() < replication_factor {
            return Err(ClusterError::InsufficientNodes {
                available: nodes.len(),
                required: replication_factor,
            });
        }

        let permutations = permutation_count(replication_factor, scatter_width);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut seen: HashSet<Vec<NodeId>> = HashSet::new();
        let mut groups: Vec<Vec<NodeId>> = Vec::new();

        for _ in 0..permutations {
            let mut permutation = nodes.clone();
            permutation.shuffle(&mut rng);

            for chunk in permutation.chunks(replication_factor) {
                let mut group = chunk.to_vec();
                if group.len() < replication_factor {
                    // Tail members never appear in the permutation prefix, so these are distinct
                    let missing = replication_factor - group.len();
                    group.extend_from_slice(&permutation[..missing]);
                }
                group.sort();
                if seen.insert(group.clone()) {
                    groups.push(group);
                }
            }
        }

        tracing::debug!(
            nodes = nodes.len(),
            replication_factor,
            scatter_width,
            permutations,
            copy_sets = groups.len(),
            "Built copy sets"
        );

        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(id, servers)| CopySet::new(id, servers))
            .collect())
    }
}

/// Number of permutations that keeps a node's peer count (itself included) within `scatter_width`.
///
/// Each permutation adds at most `R - 1` peers; at least one permutation is always drawn so that
/// every node is covered.
pub fn permutation_count(replication_factor: usize, scatter_width: usize) -> usize {
    if replication_factor <= 1 {
        return 1;
    }
    (scatter_width.saturating_sub(1) / (replication_factor - 1)).max(1)
}
