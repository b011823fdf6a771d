use thiserror::Error;

use crate::cluster::NodeId;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Insufficient nodes: {available} running, replication factor requires {required}")]
    InsufficientNodes { available: usize, required: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No running nodes at partitioning time")]
    NoRunningNodes,

    /// Not a failure: the handle's interval differs from the requested one and must be reloaded.
    #[error("Scheduler {name} holds a stale data interval")]
    StaleIntervalMismatch { name: String },

    #[error("Leader selector chose {leader}, which is not a member of copy set {copy_set}")]
    InvalidLeader { leader: NodeId, copy_set: usize },

    #[error("Leadership lost, partitioning abandoned")]
    LeadershipLost,

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Job catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
