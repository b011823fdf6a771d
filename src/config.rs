use std::time::Duration;

use crate::cluster::NodeId;
use crate::error::{ClusterError, Result};

/// Fixed execution-engine settings applied to every scheduler handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Worker threads of the execution engine
    pub thread_count: usize,
    /// Delay after which a missed firing is treated as a misfire
    pub misfire_threshold_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            thread_count: 8,
            misfire_threshold_ms: 3000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Identity of the local node as known to the registry
    pub node_id: NodeId,
    /// Members per copy set
    pub replica_count: usize,
    /// Upper bound on distinct peers a node shares copy sets with (itself included)
    pub scatter_width: usize,
    /// Running nodes required before the coordinator campaigns for leadership
    pub min_running_nodes: usize,
    pub quorum_poll_interval_ms: u64,
    /// Seed for copy-set permutations; every leader must use the same value
    pub copyset_seed: u64,
    pub scheduler: SchedulerSettings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            replica_count: 2,
            scatter_width: 2,
            min_running_nodes: 2,
            quorum_poll_interval_ms: 1000,
            copyset_seed: 0x6a6f_626d_6573_68,
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl ClusterConfig {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    pub fn with_replication(mut self, replica_count: usize, scatter_width: usize) -> Self {
        self.replica_count = replica_count;
        self.scatter_width = scatter_width;
        self
    }

    pub fn with_min_running_nodes(mut self, min_running_nodes: usize) -> Self {
        self.min_running_nodes = min_running_nodes;
        self
    }

    pub fn with_quorum_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.quorum_poll_interval_ms = interval_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.copyset_seed = seed;
        self
    }

    pub fn quorum_poll_interval(&self) -> Duration {
        Duration::from_millis(self.quorum_poll_interval_ms)
    }

    /// Reject parameters the partitioner can never satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(ClusterError::InvalidConfiguration(
                "node_id must not be empty".to_string(),
            ));
        }
        if self.replica_count == 0 {
            return Err(ClusterError::InvalidConfiguration(
                "replica_count must be positive".to_string(),
            ));
        }
        if self.scatter_width == 0 {
            return Err(ClusterError::InvalidConfiguration(
                "scatter_width must be positive".to_string(),
            ));
        }
        if self.quorum_poll_interval_ms == 0 {
            return Err(ClusterError::InvalidConfiguration(
                "quorum_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.scheduler.thread_count == 0 {
            return Err(ClusterError::InvalidConfiguration(
                "scheduler thread_count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_settings_default() {
        let settings = SchedulerSettings::default();
        assert_eq!(settings.thread_count, 8);
        assert_eq!(settings.misfire_threshold_ms, 3000);
    }

    #[test]
    fn cluster_config_default_is_valid() {
        let cfg = ClusterConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.quorum_poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn cluster_config_builders() {
        let cfg = ClusterConfig::new("node-7")
            .with_replication(3, 5)
            .with_min_running_nodes(4)
            .with_seed(42);
        assert_eq!(cfg.node_id, "node-7");
        assert_eq!(cfg.replica_count, 3);
        assert_eq!(cfg.scatter_width, 5);
        assert_eq!(cfg.min_running_nodes, 4);
        assert_eq!(cfg.copyset_seed, 42);
    }

    #[test]
    fn cluster_config_rejects_zero_replication() {
        let cfg = ClusterConfig::default().with_replication(0, 2);
        assert!(matches!(
            cfg.validate(),
            Err(ClusterError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn cluster_config_rejects_zero_scatter_width() {
        let cfg = ClusterConfig::default().with_replication(2, 0);
        assert!(matches!(
            cfg.validate(),
            Err(ClusterError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn cluster_config_rejects_zero_threads() {
        let mut cfg = ClusterConfig::default();
        cfg.scheduler.thread_count = 0;
        assert!(cfg.validate().is_err());
    }
}
