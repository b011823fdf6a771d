use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::JobInfo;
use crate::cluster::{DataInterval, JobId, NodeId};
use crate::config::SchedulerSettings;
use crate::error::{ClusterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerRole {
    /// Runs on the copy-set leader and fires jobs
    Active,
    /// Pre-loaded replica, passive until promoted
    Standby,
}

impl std::fmt::Display for SchedulerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerRole::Active => write!(f, "active"),
            SchedulerRole::Standby => write!(f, "standby"),
        }
    }
}

/// Stable handle name for a node's scheduler in one copy-set slot.
pub fn scheduler_name(node_id: &str, copy_set_id: usize) -> String {
    format!("scheduler-{}-{}", node_id, copy_set_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub scheduler_name: String,
    pub thread_count: usize,
    pub misfire_threshold_ms: u64,
}

impl SchedulerConfig {
    pub fn new(scheduler_name: String, settings: &SchedulerSettings) -> Self {
        Self {
            scheduler_name,
            thread_count: settings.thread_count,
            misfire_threshold_ms: settings.misfire_threshold_ms,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler_name.is_empty() {
            return Err(ClusterError::InvalidConfiguration(
                "scheduler name must not be empty".to_string(),
            ));
        }
        if self.thread_count == 0 {
            return Err(ClusterError::InvalidConfiguration(format!(
                "scheduler {} needs at least one thread",
                self.scheduler_name
            )));
        }
        Ok(())
    }
}

/// Local view of one execution-engine instance: its role, its interval and the jobs it holds.
#[derive(Debug)]
pub struct SchedulerHandle {
    config: SchedulerConfig,
    node_id: NodeId,
    copy_set_id: usize,
    role: Option<SchedulerRole>,
    data_interval: Option<DataInterval>,
    jobs: BTreeMap<JobId, JobInfo>,
    load_count: u64,
}

impl SchedulerHandle {
    pub fn new(config: SchedulerConfig, node_id: NodeId, copy_set_id: usize) -> Self {
        Self {
            config,
            node_id,
            copy_set_id,
            role: None,
            data_interval: None,
            jobs: BTreeMap::new(),
            load_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.scheduler_name
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn copy_set_id(&self) -> usize {
        self.copy_set_id
    }

    pub fn role(&self) -> Option<SchedulerRole> {
        self.role
    }

    pub fn data_interval(&self) -> Option<DataInterval> {
        self.data_interval
    }

    /// Loaded job ids in ascending order
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs.keys().copied().collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn contains_job(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    /// Number of job-set replacements so far
    pub fn load_count(&self) -> u64 {
        self.load_count
    }

    /// `Err(StaleIntervalMismatch)` when the loaded jobs do not belong to `interval`.
    pub fn check_interval(&self, interval: &DataInterval) -> Result<()> {
        match &self.data_interval {
            Some(current) if current.same_boundaries(interval) => Ok(()),
            _ => Err(ClusterError::StaleIntervalMismatch {
                name: self.config.scheduler_name.clone(),
            }),
        }
    }

    /// Replace the schedulable job set.
    pub fn load_jobs(&mut self, jobs: Vec<JobInfo>) {
        self.jobs = jobs.into_iter().map(|job| (job.id, job)).collect();
        self.load_count += 1;
    }

    pub fn assign(&mut self, interval: DataInterval, role: SchedulerRole) {
        self.data_interval = Some(interval);
        self.role = Some(role);
    }

    /// Drop all jobs and the interval tag.
    pub fn shutdown(&mut self) {
        self.jobs.clear();
        self.data_interval = None;
        self.role = None;
    }
}
