//! Cluster layout: copy-set placement, quorum gating, partitioning and publication.
//!
//! The leader builds copy sets over the running nodes, cuts the job-id space into one interval
//! per slot, and publishes the result as an immutable [`ClusterMetadata`] snapshot.

pub mod copyset;
pub mod distributor;
pub mod gate;
pub mod metadata;
pub mod partitioner;

pub use copyset::CopySetBuilder;
pub use distributor::MetadataDistributor;
pub use gate::MembershipGate;
pub use metadata::{ClusterMetadata, CopySet, DataInterval, JobId, NodeId};
pub use partitioner::{ClusterPartitioner, LeaderLoad, LeaderSelector, RoundRobinLeaderSelector};
