//! Contracts of the coordination registry.
//!
//! The registry owns leader election, membership tracking and event delivery. This crate only
//! consumes it; [`InMemoryRegistry`] is an in-process implementation used by tests and the
//! `simulate` command.
//!
//! Events are delivered at least once, asynchronously, with no ordering guarantee across nodes.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::cluster::{ClusterMetadata, NodeId};
use crate::error::Result;

pub use memory::InMemoryRegistry;

/// Notification fanned out by the registry to every subscribed node.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// The running-node set changed
    MembershipChanged { nodes: Vec<NodeId> },
    /// A leader published a new snapshot
    MetadataChanged(Arc<ClusterMetadata>),
    /// Leadership moved; `leader == None` while nobody holds it
    LeadershipChanged { leader: Option<NodeId>, term: u64 },
}

#[async_trait]
pub trait MembershipService: Send + Sync {
    async fn running_node_count(&self) -> Result<usize>;

    /// Running node ids in registry order
    async fn running_nodes(&self) -> Result<Vec<NodeId>>;
}

#[async_trait]
pub trait LeaderElection: Send + Sync {
    /// Enter the election. The outcome arrives as [`ClusterEvent::LeadershipChanged`].
    async fn campaign(&self, node_id: &NodeId) -> Result<()>;

    /// Withdraw from the election, releasing leadership if held.
    async fn resign(&self, node_id: &NodeId) -> Result<()>;

    async fn current_leader(&self) -> Result<Option<(NodeId, u64)>>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn publish_metadata(&self, metadata: Arc<ClusterMetadata>) -> Result<()>;

    async fn latest_metadata(&self) -> Result<Option<Arc<ClusterMetadata>>>;
}

pub trait EventSource: Send + Sync {
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent>;
}

/// Everything a registry backend provides.
pub trait ClusterRegistry: MembershipService + LeaderElection + MetadataStore + EventSource {}

impl<T> ClusterRegistry for T where T: MembershipService + LeaderElection + MetadataStore + EventSource {}
