//! Cluster coordination core of a distributed job scheduler.
//!
//! Once a node wins the leader election it groups the running fleet into copy sets, cuts the
//! job-id space into one interval per slot and publishes the layout as [`ClusterMetadata`].
//! Every node then keeps an active scheduler for the slots it leads and pre-loaded standby
//! schedulers for the slots it replicates.
//!
//! [`ClusterMetadata`]: cluster::ClusterMetadata

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod shutdown;

pub use coordinator::{ClusterCoordinator, Collaborators};
pub use error::{ClusterError, Result};
