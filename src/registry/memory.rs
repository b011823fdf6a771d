use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::cluster::{ClusterMetadata, NodeId};
use crate::error::Result;
use crate::registry::{ClusterEvent, EventSource, LeaderElection, MembershipService, MetadataStore};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct RegistryState {
    running: BTreeSet<NodeId>,
    /// Campaigning nodes in arrival order; the first running one wins
    candidates: Vec<NodeId>,
    leader: Option<NodeId>,
    term: u64,
    metadata: Option<Arc<ClusterMetadata>>,
    publications: u64,
}

impl RegistryState {
    /// Hand leadership to the first running candidate, if any, under a new term.
    fn elect_next(&mut self) -> ClusterEvent {
        self.leader = self
            .candidates
            .iter()
            .find(|c| self.running.contains(*c))
            .cloned();
        self.term += 1;
        ClusterEvent::LeadershipChanged {
            leader: self.leader.clone(),
            term: self.term,
        }
    }

    fn membership_event(&self) -> ClusterEvent {
        ClusterEvent::MembershipChanged {
            nodes: self.running.iter().cloned().collect(),
        }
    }
}

/// Single-process registry: membership, election, metadata and a broadcast event bus.
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
    events: broadcast::Sender<ClusterEvent>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(RegistryState::default()),
            events,
        }
    }

    /// Mark a node as running.
    pub async fn join(&self, node_id: impl Into<NodeId>) {
        let node_id = node_id.into();
        let mut state = self.state.write().await;
        if state.running.insert(node_id.clone()) {
            tracing::info!(node_id = %node_id, "Node joined");
            self.emit(state.membership_event());
        }
    }

    /// Remove a node; if it held leadership the next candidate takes over.
    pub async fn leave(&self, node_id: &str) {
        let mut state = self.state.write().await;
        if !state.running.remove(node_id) {
            return;
        }
        state.candidates.retain(|c| c != node_id);
        tracing::info!(node_id, "Node left");
        self.emit(state.membership_event());

        if state.leader.as_deref() == Some(node_id) {
            let event = state.elect_next();
            self.emit(event);
        }
    }

    pub async fn leader(&self) -> Option<NodeId> {
        self.state.read().await.leader.clone()
    }

    pub async fn term(&self) -> u64 {
        self.state.read().await.term
    }

    /// Number of snapshots published so far
    pub async fn publication_count(&self) -> u64 {
        self.state.read().await.publications
    }

    fn emit(&self, event: ClusterEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipService for InMemoryRegistry {
    async fn running_node_count(&self) -> Result<usize> {
        Ok(self.state.read().await.running.len())
    }

    async fn running_nodes(&self) -> Result<Vec<NodeId>> {
        Ok(self.state.read().await.running.iter().cloned().collect())
    }
}

#[async_trait]
impl LeaderElection for InMemoryRegistry {
    async fn campaign(&self, node_id: &NodeId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.candidates.contains(node_id) {
            state.candidates.push(node_id.clone());
        }
        if state.leader.is_none() && state.running.contains(node_id) {
            let event = state.elect_next();
            tracing::info!(leader = ?state.leader, term = state.term, "Leader elected");
            self.emit(event);
        }
        Ok(())
    }

    async fn resign(&self, node_id: &NodeId) -> Result<()> {
        let mut state = self.state.write().await;
        state.candidates.retain(|c| c != node_id);
        if state.leader.as_ref() == Some(node_id) {
            let event = state.elect_next();
            self.emit(event);
        }
        Ok(())
    }

    async fn current_leader(&self) -> Result<Option<(NodeId, u64)>> {
        let state = self.state.read().await;
        Ok(state.leader.clone().map(|leader| (leader, state.term)))
    }
}

#[async_trait]
impl MetadataStore for InMemoryRegistry {
    async fn publish_metadata(&self, metadata: Arc<ClusterMetadata>) -> Result<()> {
        let mut state = self.state.write().await;
        state.metadata = Some(metadata.clone());
        state.publications += 1;
        self.emit(ClusterEvent::MetadataChanged(metadata));
        Ok(())
    }

    async fn latest_metadata(&self) -> Result<Option<Arc<ClusterMetadata>>> {
        Ok(self.state.read().await.metadata.clone())
    }
}

impl EventSource for InMemoryRegistry {
    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_running_candidate_becomes_leader() {
        let registry = InMemoryRegistry::new();
        registry.join("a").await;
        registry.join("b").await;

        registry.campaign(&"b".to_string()).await.unwrap();
        registry.campaign(&"a".to_string()).await.unwrap();

        assert_eq!(registry.current_leader().await.unwrap(), Some(("b".to_string(), 1)));
    }

    #[tokio::test]
    async fn leader_departure_promotes_next_candidate() {
        let registry = InMemoryRegistry::new();
        let mut events = registry.subscribe();
        registry.join("a").await;
        registry.join("b").await;
        registry.campaign(&"a".to_string()).await.unwrap();
        registry.campaign(&"b".to_string()).await.unwrap();

        registry.leave("a").await;

        assert_eq!(registry.leader().await.as_deref(), Some("b"));
        assert_eq!(registry.term().await, 2);

        let mut last_leadership = None;
        while let Ok(event) = events.try_recv() {
            if let ClusterEvent::LeadershipChanged { leader, term } = event {
                last_leadership = Some((leader, term));
            }
        }
        assert_eq!(last_leadership, Some((Some("b".to_string()), 2)));
    }

    #[tokio::test]
    async fn running_nodes_are_ordered() {
        let registry = InMemoryRegistry::new();
        registry.join("c").await;
        registry.join("a").await;
        registry.join("b").await;
        registry.join("a").await;

        assert_eq!(registry.running_node_count().await.unwrap(), 3);
        assert_eq!(registry.running_nodes().await.unwrap(), vec!["a", "b", "c"]);
    }
}
