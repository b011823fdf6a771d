use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::cluster::{DataInterval, NodeId};
use crate::error::Result;
use crate::scheduler::handle::{SchedulerConfig, SchedulerHandle, SchedulerRole};

/// Handle shared between the registry and in-flight reconciliations.
///
/// The mutex is the per-name lock: holding it serializes reconciliations of one handle.
pub type SharedScheduler = Arc<Mutex<SchedulerHandle>>;

/// Scheduler handles of the local process, by name.
#[derive(Default)]
pub struct SchedulerRegistry {
    schedulers: RwLock<HashMap<String, SharedScheduler>>,
    roles: RwLock<HashMap<String, SchedulerRole>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_scheduler(&self, name: &str) -> Option<SharedScheduler> {
        self.schedulers.read().await.get(name).cloned()
    }

    /// Create the handle named by `config`, or return the existing one.
    pub async fn create_scheduler(
        &self,
        config: SchedulerConfig,
        node_id: &NodeId,
        copy_set_id: usize,
    ) -> Result<SharedScheduler> {
        config.validate()?;
        let mut schedulers = self.schedulers.write().await;
        let handle = schedulers
            .entry(config.scheduler_name.clone())
            .or_insert_with(|| {
                tracing::info!(scheduler = %config.scheduler_name, "Scheduler created");
                Arc::new(Mutex::new(SchedulerHandle::new(
                    config.clone(),
                    node_id.clone(),
                    copy_set_id,
                )))
            });
        Ok(handle.clone())
    }

    /// Interval currently recorded on the handle. Waits for an in-flight reconciliation.
    pub async fn scheduler_interval(&self, name: &str) -> Option<DataInterval> {
        let handle = self.get_scheduler(name).await?;
        let guard = handle.lock().await;
        guard.data_interval()
    }

    /// Record `name` as active. Returns false if the handle is no longer registered.
    pub async fn register_active(&self, name: &str) -> bool {
        self.register_role(name, SchedulerRole::Active).await
    }

    /// Record `name` as standby. Returns false if the handle is no longer registered.
    pub async fn register_standby(&self, name: &str) -> bool {
        self.register_role(name, SchedulerRole::Standby).await
    }

    async fn register_role(&self, name: &str, role: SchedulerRole) -> bool {
        // Held across the insert so a concurrent removal cannot slip in between
        let schedulers = self.schedulers.read().await;
        if !schedulers.contains_key(name) {
            return false;
        }
        self.roles.write().await.insert(name.to_string(), role);
        true
    }

    pub async fn role_of(&self, name: &str) -> Option<SchedulerRole> {
        self.roles.read().await.get(name).copied()
    }

    pub async fn active_schedulers(&self) -> Vec<String> {
        self.names_with_role(SchedulerRole::Active).await
    }

    pub async fn standby_schedulers(&self) -> Vec<String> {
        self.names_with_role(SchedulerRole::Standby).await
    }

    async fn names_with_role(&self, role: SchedulerRole) -> Vec<String> {
        let mut names: Vec<String> = self
            .roles
            .read()
            .await
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// All handle names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schedulers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.schedulers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.schedulers.read().await.is_empty()
    }

    /// Unregister a handle and shut it down.
    pub async fn remove_scheduler(&self, name: &str) -> Option<SharedScheduler> {
        let handle = self.schedulers.write().await.remove(name)?;
        self.roles.write().await.remove(name);
        handle.lock().await.shutdown();
        tracing::info!(scheduler = name, "Scheduler removed");
        Some(handle)
    }

    /// Remove every handle.
    pub async fn clear(&self) {
        for name in self.names().await {
            self.remove_scheduler(&name).await;
        }
    }
}
