use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::catalog::JobCatalog;
use crate::cluster::{
    ClusterMetadata, ClusterPartitioner, DataInterval, LeaderSelector, MembershipGate,
    MetadataDistributor, NodeId, RoundRobinLeaderSelector,
};
use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::registry::{
    ClusterEvent, ClusterRegistry, EventSource, LeaderElection, MembershipService, MetadataStore,
};
use crate::scheduler::{
    scheduler_name, SchedulerLifecycleManager, SchedulerRegistry, SchedulerRole, SharedScheduler,
};

/// External services the coordinator is wired to.
pub struct Collaborators {
    pub membership: Arc<dyn MembershipService>,
    pub election: Arc<dyn LeaderElection>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub events: Arc<dyn EventSource>,
    pub catalog: Arc<dyn JobCatalog>,
    pub leader_selector: Arc<dyn LeaderSelector>,
}

impl Collaborators {
    /// Use one registry backend for membership, election, metadata and events.
    pub fn from_registry<R>(registry: Arc<R>, catalog: Arc<dyn JobCatalog>) -> Self
    where
        R: ClusterRegistry + 'static,
    {
        Self {
            membership: registry.clone(),
            election: registry.clone(),
            metadata_store: registry.clone(),
            events: registry,
            catalog,
            leader_selector: Arc::new(RoundRobinLeaderSelector),
        }
    }

    pub fn with_leader_selector(mut self, leader_selector: Arc<dyn LeaderSelector>) -> Self {
        self.leader_selector = leader_selector;
        self
    }
}

/// Leadership as seen by this node.
///
/// Becoming leader opens a term with its own cancellation token and partition trigger;
/// losing leadership cancels the token, which abandons any in-flight partitioning.
enum LeadershipState {
    NotLeader,
    Leader {
        term: u64,
        cancel: CancellationToken,
        trigger: Arc<Notify>,
    },
}

/// Wires quorum gating, leader election, partitioning and scheduler reconciliation together.
///
/// Every node runs one coordinator. All of them reconcile their local schedulers from published
/// metadata; only the current leader partitions.
pub struct ClusterCoordinator {
    config: ClusterConfig,
    election: Arc<dyn LeaderElection>,
    metadata_store: Arc<dyn MetadataStore>,
    membership: Arc<dyn MembershipService>,
    events: Arc<dyn EventSource>,
    gate: MembershipGate,
    partitioner: ClusterPartitioner,
    distributor: MetadataDistributor,
    schedulers: Arc<SchedulerLifecycleManager>,
    leadership: Mutex<LeadershipState>,
    /// Serializes metadata reconciliation so snapshots apply in order
    applied_version: Mutex<Option<(u64, u64)>>,
    partition_runs: AtomicU64,
    /// Highest election term seen, from events or resync
    observed_term: AtomicU64,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterCoordinator {
    pub fn new(config: ClusterConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let Collaborators {
            membership,
            election,
            metadata_store,
            events,
            catalog,
            leader_selector,
        } = collaborators;

        let gate = MembershipGate::new(membership.clone(), config.quorum_poll_interval());
        let partitioner = ClusterPartitioner::new(
            &config,
            membership.clone(),
            catalog.clone(),
            leader_selector,
        );
        let distributor = MetadataDistributor::new(metadata_store.clone());
        let schedulers = Arc::new(SchedulerLifecycleManager::new(
            Arc::new(SchedulerRegistry::new()),
            catalog,
            config.scheduler.clone(),
        ));

        Ok(Self {
            config,
            election,
            metadata_store,
            membership,
            events,
            gate,
            partitioner,
            distributor,
            schedulers,
            leadership: Mutex::new(LeadershipState::NotLeader),
            applied_version: Mutex::new(None),
            partition_runs: AtomicU64::new(0),
            observed_term: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn schedulers(&self) -> &Arc<SchedulerLifecycleManager> {
        &self.schedulers
    }

    pub fn scheduler_registry(&self) -> &Arc<SchedulerRegistry> {
        self.schedulers.registry()
    }

    pub async fn is_leader(&self) -> bool {
        matches!(*self.leadership.lock().await, LeadershipState::Leader { .. })
    }

    pub async fn current_term(&self) -> Option<u64> {
        match &*self.leadership.lock().await {
            LeadershipState::Leader { term, .. } => Some(*term),
            LeadershipState::NotLeader => None,
        }
    }

    /// Version of the last snapshot reconciled on this node
    pub async fn applied_version(&self) -> Option<(u64, u64)> {
        *self.applied_version.lock().await
    }

    /// Partitioning runs started by this node, across all terms
    pub fn partition_runs(&self) -> u64 {
        self.partition_runs.load(Ordering::SeqCst)
    }

    /// Wait for quorum, subscribe to registry events and enter the leader election.
    ///
    /// Blocks until the running-node count reaches `min_running_nodes`; returns early
    /// without error if [`stop`](Self::stop) is called meanwhile. If the resync or the
    /// campaign fails the coordinator is stopped before the error is returned.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            _ = self.gate.await_quorum(self.config.min_running_nodes) => {}
        }

        let events = self.events.subscribe();
        let this = Arc::clone(self);
        self.track(tokio::spawn(async move { this.event_loop(events).await }))
            .await;

        if let Err(e) = self.join_election().await {
            tracing::error!(node_id = %self.config.node_id, error = %e, "Coordinator failed to start");
            self.stop().await;
            return Err(e);
        }

        tracing::info!(node_id = %self.config.node_id, "Coordinator started");
        Ok(())
    }

    async fn join_election(self: &Arc<Self>) -> Result<()> {
        // Catch up on state published before the subscription existed
        self.resync().await?;
        self.election.campaign(&self.config.node_id).await
    }

    /// Leave the election, stop all tasks and drop every scheduler handle.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.on_leadership_lost().await;

        if let Err(e) = self.election.resign(&self.config.node_id).await {
            tracing::warn!(node_id = %self.config.node_id, error = %e, "Failed to resign leadership");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Coordinator task ended abnormally");
            }
        }

        self.schedulers.shutdown().await;
        tracing::info!(node_id = %self.config.node_id, "Coordinator stopped");
    }

    /// `NotLeader -> Leader`: open `term` and queue its first partitioning run.
    ///
    /// Repeated notifications for the current or an older term are ignored.
    pub async fn on_leader_elected(self: &Arc<Self>, term: u64) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let mut leadership = self.leadership.lock().await;
        if let LeadershipState::Leader {
            term: current,
            cancel,
            ..
        } = &*leadership
        {
            if *current >= term {
                return;
            }
            cancel.cancel();
        }

        let cancel = self.shutdown.child_token();
        let trigger = Arc::new(Notify::new());
        trigger.notify_one();
        *leadership = LeadershipState::Leader {
            term,
            cancel: cancel.clone(),
            trigger: trigger.clone(),
        };
        drop(leadership);

        tracing::info!(node_id = %self.config.node_id, term, "Became leader");
        let this = Arc::clone(self);
        self.track(tokio::spawn(async move {
            this.partition_worker(term, cancel, trigger).await
        }))
        .await;
    }

    /// `Leader -> NotLeader`: cancel the term, abandoning any in-flight partitioning.
    pub async fn on_leadership_lost(&self) {
        let mut leadership = self.leadership.lock().await;
        if let LeadershipState::Leader { term, cancel, .. } =
            std::mem::replace(&mut *leadership, LeadershipState::NotLeader)
        {
            cancel.cancel();
            tracing::info!(node_id = %self.config.node_id, term, "Leadership lost");
        }
    }

    /// Queue a repartitioning if this node leads. Runs requested while one is in flight
    /// coalesce into a single follow-up run.
    pub async fn on_membership_changed(&self, nodes: Vec<NodeId>) {
        tracing::debug!(node_id = %self.config.node_id, running = nodes.len(), "Membership changed");
        if let LeadershipState::Leader { term, trigger, .. } = &*self.leadership.lock().await {
            tracing::debug!(term, "Repartitioning queued");
            trigger.notify_one();
        }
    }

    /// Reconcile local scheduler handles with a published snapshot.
    ///
    /// Snapshots older than the last applied one are ignored. The local node gets an active
    /// handle for every slot it leads and a standby handle for every other slot it belongs to;
    /// handles for slots it no longer holds are removed.
    pub async fn on_metadata_changed(&self, metadata: Arc<ClusterMetadata>) {
        let mut applied = self.applied_version.lock().await;
        if let Some(version) = *applied {
            if metadata.version() < version {
                tracing::debug!(
                    node_id = %self.config.node_id,
                    received = ?metadata.version(),
                    applied = ?version,
                    "Ignoring stale cluster metadata"
                );
                return;
            }
        }

        let node_id = &self.config.node_id;
        let mut keep = HashSet::new();
        let mut reconciliations = JoinSet::new();
        for copy_set in metadata.copy_sets_for(node_id) {
            let Some(interval) = copy_set.data_interval else {
                tracing::warn!(copy_set = copy_set.id, "Copy set has no data interval");
                continue;
            };
            let role = if copy_set.is_leader(node_id) {
                SchedulerRole::Active
            } else {
                SchedulerRole::Standby
            };
            keep.insert(scheduler_name(node_id, copy_set.id));

            let schedulers = self.schedulers.clone();
            let node_id = node_id.clone();
            let copy_set_id = copy_set.id;
            reconciliations.spawn(async move {
                let result = schedulers
                    .ensure_scheduler(&node_id, copy_set_id, interval, role)
                    .await;
                (copy_set_id, result)
            });
        }

        let mut failed = 0usize;
        while let Some(joined) = reconciliations.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((copy_set_id, Err(e))) => {
                    failed += 1;
                    tracing::warn!(copy_set = copy_set_id, error = %e, "Scheduler reconciliation failed");
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(error = %e, "Scheduler reconciliation task failed");
                }
            }
        }

        let removed = self.schedulers.retain(&keep).await;
        *applied = Some(metadata.version());

        tracing::info!(
            node_id = %node_id,
            term = metadata.term,
            generation = metadata.generation,
            assigned = keep.len(),
            removed = removed.len(),
            failed,
            "Cluster metadata applied"
        );
    }

    pub async fn create_active_scheduler(
        &self,
        node_id: &NodeId,
        copy_set_id: usize,
        interval: DataInterval,
    ) -> Result<SharedScheduler> {
        self.schedulers
            .create_active_scheduler(node_id, copy_set_id, interval)
            .await
    }

    pub async fn create_standby_scheduler(
        &self,
        node_id: &NodeId,
        copy_set_id: usize,
        interval: DataInterval,
    ) -> Result<SharedScheduler> {
        self.schedulers
            .create_standby_scheduler(node_id, copy_set_id, interval)
            .await
    }

    async fn event_loop(self: Arc<Self>, mut events: broadcast::Receiver<ClusterEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(node_id = %self.config.node_id, skipped, "Event stream lagged, resynchronizing");
                        if let Err(e) = self.resync().await {
                            tracing::warn!(error = %e, "Resynchronization failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!(node_id = %self.config.node_id, "Event loop stopped");
    }

    async fn handle_event(self: &Arc<Self>, event: ClusterEvent) {
        match event {
            ClusterEvent::LeadershipChanged { leader, term } => {
                self.apply_leadership(leader.as_ref(), term).await
            }
            ClusterEvent::MembershipChanged { nodes } => self.on_membership_changed(nodes).await,
            ClusterEvent::MetadataChanged(metadata) => self.on_metadata_changed(metadata).await,
        }
    }

    /// Events queued before a resync can carry an older term than the one already applied.
    async fn apply_leadership(self: &Arc<Self>, leader: Option<&NodeId>, term: u64) {
        let previous = self.observed_term.fetch_max(term, Ordering::SeqCst);
        if term < previous {
            tracing::debug!(term, observed = previous, "Ignoring stale leadership change");
            return;
        }
        if leader == Some(&self.config.node_id) {
            self.on_leader_elected(term).await;
        } else {
            self.on_leadership_lost().await;
        }
    }

    /// Rebuild local state from the registry instead of from missed events.
    async fn resync(self: &Arc<Self>) -> Result<()> {
        if let Some(metadata) = self.metadata_store.latest_metadata().await? {
            self.on_metadata_changed(metadata).await;
        }
        match self.election.current_leader().await? {
            Some((leader, term)) => self.apply_leadership(Some(&leader), term).await,
            None => self.on_leadership_lost().await,
        }
        let nodes = self.membership.running_nodes().await?;
        self.on_membership_changed(nodes).await;
        Ok(())
    }

    async fn partition_worker(
        self: Arc<Self>,
        term: u64,
        cancel: CancellationToken,
        trigger: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = trigger.notified() => {}
            }

            self.partition_runs.fetch_add(1, Ordering::SeqCst);
            match self.run_partitioning(term, &cancel).await {
                Ok(metadata) => {
                    tracing::debug!(term, generation = metadata.generation, "Partitioning run finished");
                }
                Err(ClusterError::LeadershipLost) => {
                    tracing::info!(term, "Partitioning abandoned, leadership lost");
                    break;
                }
                Err(e) => {
                    tracing::warn!(term, error = %e, "Partitioning aborted, retrying on next membership change");
                }
            }
        }
        tracing::debug!(node_id = %self.config.node_id, term, "Partition worker stopped");
    }

    async fn run_partitioning(
        &self,
        term: u64,
        cancel: &CancellationToken,
    ) -> Result<Arc<ClusterMetadata>> {
        let metadata = self.partitioner.partition(cancel).await?;
        self.distributor.distribute(metadata, term, cancel).await
    }

    async fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}
