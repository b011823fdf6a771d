use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::catalog::JobCatalog;
use crate::cluster::copyset::CopySetBuilder;
use crate::cluster::metadata::{ClusterMetadata, CopySet, DataInterval, JobId, NodeId};
use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::registry::MembershipService;

/// Slots led so far in the current partitioning run, by node.
pub type LeaderLoad = HashMap<NodeId, usize>;

/// Picks the member of a copy set that runs the active scheduler.
pub trait LeaderSelector: Send + Sync {
    /// Must return one of `copy_set.servers` and be deterministic for a given copy set.
    fn select_leader(&self, copy_set: &CopySet) -> Result<NodeId>;

    /// Pick the leader of a slot given the slots already assigned in this run.
    ///
    /// Slots are assigned in id order. Selectors that ignore load keep the default.
    fn select_slot_leader(&self, copy_set: &CopySet, _load: &LeaderLoad) -> Result<NodeId> {
        self.select_leader(copy_set)
    }
}

/// Rotates leadership through the members by slot id.
///
/// Within a partitioning run a slot goes to the member leading the fewest slots so far, with
/// ties broken by the rotation. A group reused for several slots hands each one to a different
/// member, so a node sitting in several slots does not end up leading all of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinLeaderSelector;

impl LeaderSelector for RoundRobinLeaderSelector {
    fn select_leader(&self, copy_set: &CopySet) -> Result<NodeId> {
        self.select_slot_leader(copy_set, &LeaderLoad::new())
    }

    fn select_slot_leader(&self, copy_set: &CopySet, load: &LeaderLoad) -> Result<NodeId> {
        let len = copy_set.servers.len();
        (0..len)
            .map(|offset| &copy_set.servers[(copy_set.id + offset) % len])
            .min_by_key(|server| load.get(*server).copied().unwrap_or(0))
            .cloned()
            .ok_or_else(|| {
                ClusterError::InvalidConfiguration(format!(
                    "copy set {} has no servers",
                    copy_set.id
                ))
            })
    }
}

/// Leader-only computation of the cluster layout.
pub struct ClusterPartitioner {
    builder: CopySetBuilder,
    replica_count: usize,
    scatter_width: usize,
    membership: Arc<dyn MembershipService>,
    catalog: Arc<dyn JobCatalog>,
    leader_selector: Arc<dyn LeaderSelector>,
}

impl ClusterPartitioner {
    pub fn new(
        config: &ClusterConfig,
        membership: Arc<dyn MembershipService>,
        catalog: Arc<dyn JobCatalog>,
        leader_selector: Arc<dyn LeaderSelector>,
    ) -> Self {
        Self {
            builder: CopySetBuilder::new(config.copyset_seed),
            replica_count: config.replica_count,
            scatter_width: config.scatter_width,
            membership,
            catalog,
            leader_selector,
        }
    }

    /// Partition the currently running nodes.
    pub async fn partition(&self, cancel: &CancellationToken) -> Result<ClusterMetadata> {
        let running_nodes = self.membership.running_nodes().await?;
        self.partition_nodes(running_nodes, cancel).await
    }

    /// Build copy sets over `running_nodes`, shard the job-id space across them and pick
    /// each group's leader.
    ///
    /// Nothing is published here. The whole run fails on the first error, or with
    /// [`ClusterError::LeadershipLost`] once `cancel` fires.
    pub async fn partition_nodes(
        &self,
        running_nodes: Vec<NodeId>,
        cancel: &CancellationToken,
    ) -> Result<ClusterMetadata> {
        if running_nodes.is_empty() {
            return Err(ClusterError::NoRunningNodes);
        }

        let groups = self
            .builder
            .build(&running_nodes, self.replica_count, self.scatter_width)?;
        let slot_count = groups.len().max(running_nodes.len());
        let mut copy_sets = assign_slots(&groups, slot_count);
        ensure_active(cancel)?;

        let job_count = self.catalog.assignable_job_count().await?;
        let mut boundaries: Vec<JobId> = Vec::with_capacity(slot_count);
        for rank in boundary_ranks(job_count, slot_count) {
            ensure_active(cancel)?;
            let previous = boundaries.last().copied().unwrap_or(0);
            // Ranks past the end of the catalog collapse onto the previous boundary
            let id = self.catalog.job_id_at_rank(rank).await?.unwrap_or(previous);
            boundaries.push(id.max(previous));
        }

        let mut load = LeaderLoad::new();
        for (i, copy_set) in copy_sets.iter_mut().enumerate() {
            copy_set.data_interval = Some(interval_for(&boundaries, i));
            let leader = self.leader_selector.select_slot_leader(copy_set, &load)?;
            if !copy_set.contains(&leader) {
                return Err(ClusterError::InvalidLeader {
                    leader,
                    copy_set: copy_set.id,
                });
            }
            *load.entry(leader.clone()).or_default() += 1;
            copy_set.leader = Some(leader);
        }
        ensure_active(cancel)?;

        tracing::info!(
            nodes = running_nodes.len(),
            copy_sets = groups.len(),
            slots = slot_count,
            job_count,
            "Cluster partitioned"
        );

        Ok(ClusterMetadata::new(running_nodes, boundaries, copy_sets))
    }
}

/// Fill `slot_count` slots by cycling through `groups`; slot `i` gets id `i`.
pub fn assign_slots(groups: &[CopySet], slot_count: usize) -> Vec<CopySet> {
    if groups.is_empty() {
        return Vec::new();
    }
    (0..slot_count)
        .map(|i| CopySet::new(i, groups[i % groups.len()].servers.clone()))
        .collect()
}

/// Catalog ranks whose job ids become the interval boundaries.
pub fn boundary_ranks(job_count: usize, slot_count: usize) -> Vec<usize> {
    if slot_count == 0 {
        return Vec::new();
    }
    let offset = job_count.div_ceil(slot_count);
    (0..slot_count).map(|i| offset * i).collect()
}

/// Interval owned by slot `i`; the last slot is open-ended.
pub fn interval_for(boundaries: &[JobId], i: usize) -> DataInterval {
    match boundaries.get(i + 1) {
        Some(&upper) => DataInterval::new(boundaries[i], upper),
        None => DataInterval::unbounded(boundaries[i]),
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ClusterError::LeadershipLost);
    }
    Ok(())
}
