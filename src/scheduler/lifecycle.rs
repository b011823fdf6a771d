use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::JobCatalog;
use crate::cluster::{DataInterval, NodeId};
use crate::config::SchedulerSettings;
use crate::error::{ClusterError, Result};
use crate::scheduler::handle::{scheduler_name, SchedulerConfig, SchedulerRole};
use crate::scheduler::registry::{SchedulerRegistry, SharedScheduler};

/// Keeps each local scheduler handle loaded with exactly the jobs of its assigned interval.
pub struct SchedulerLifecycleManager {
    registry: Arc<SchedulerRegistry>,
    catalog: Arc<dyn JobCatalog>,
    settings: SchedulerSettings,
}

impl SchedulerLifecycleManager {
    pub fn new(
        registry: Arc<SchedulerRegistry>,
        catalog: Arc<dyn JobCatalog>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            registry,
            catalog,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<SchedulerRegistry> {
        &self.registry
    }

    /// Create or reuse the handle for `node_id` in slot `copy_set_id` and reconcile it.
    ///
    /// Jobs are fetched only when the recorded interval differs from `interval`. A failed fetch
    /// returns early and leaves the handle's previous interval and jobs untouched, so the next
    /// call retries the full load.
    pub async fn ensure_scheduler(
        &self,
        node_id: &NodeId,
        copy_set_id: usize,
        interval: DataInterval,
        role: SchedulerRole,
    ) -> Result<SharedScheduler> {
        let name = scheduler_name(node_id, copy_set_id);
        let handle = match self.registry.get_scheduler(&name).await {
            Some(handle) => handle,
            None => {
                let config = SchedulerConfig::new(name.clone(), &self.settings);
                self.registry
                    .create_scheduler(config, node_id, copy_set_id)
                    .await?
            }
        };

        let mut guard = handle.lock().await;
        match guard.check_interval(&interval) {
            Ok(()) => {
                tracing::debug!(scheduler = %name, %interval, "Scheduler interval unchanged");
            }
            Err(ClusterError::StaleIntervalMismatch { .. }) => {
                let jobs = self
                    .catalog
                    .jobs_in_range(interval.lower, interval.upper)
                    .await?;
                tracing::info!(
                    scheduler = %name,
                    %interval,
                    previous = ?guard.data_interval(),
                    jobs = jobs.len(),
                    "Loading scheduler jobs"
                );
                guard.load_jobs(jobs);
            }
            Err(e) => return Err(e),
        }
        guard.assign(interval, role);

        let registered = match role {
            SchedulerRole::Active => self.registry.register_active(&name).await,
            SchedulerRole::Standby => self.registry.register_standby(&name).await,
        };
        drop(guard);
        if !registered {
            tracing::debug!(scheduler = %name, "Scheduler removed during reconciliation");
        }

        Ok(handle)
    }

    pub async fn create_active_scheduler(
        &self,
        node_id: &NodeId,
        copy_set_id: usize,
        interval: DataInterval,
    ) -> Result<SharedScheduler> {
        self.ensure_scheduler(node_id, copy_set_id, interval, SchedulerRole::Active)
            .await
    }

    pub async fn create_standby_scheduler(
        &self,
        node_id: &NodeId,
        copy_set_id: usize,
        interval: DataInterval,
    ) -> Result<SharedScheduler> {
        self.ensure_scheduler(node_id, copy_set_id, interval, SchedulerRole::Standby)
            .await
    }

    /// Remove every handle whose name is not in `keep`. Returns the removed names.
    pub async fn retain(&self, keep: &HashSet<String>) -> Vec<String> {
        let mut removed = Vec::new();
        for name in self.registry.names().await {
            if !keep.contains(&name) && self.registry.remove_scheduler(&name).await.is_some() {
                removed.push(name);
            }
        }
        removed
    }

    pub async fn shutdown(&self) {
        self.registry.clear().await;
    }
}
