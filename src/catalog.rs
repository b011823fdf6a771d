//! Job catalog contract.
//!
//! Job definitions are persisted and queried elsewhere; coordination only needs the ordered id
//! space, the total count, and range fetches for loading schedulers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cluster::{DataInterval, JobId};
use crate::error::Result;

/// Job definition as handed to an execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub group: String,
    pub name: String,
    pub cron: String,
}

impl JobInfo {
    pub fn new(id: JobId, group: impl Into<String>, name: impl Into<String>, cron: impl Into<String>) -> Self {
        Self {
            id,
            group: group.into(),
            name: name.into(),
            cron: cron.into(),
        }
    }
}

#[async_trait]
pub trait JobCatalog: Send + Sync {
    /// Jobs eligible for placement
    async fn assignable_job_count(&self) -> Result<usize>;

    /// Id of the job at `rank` in ascending id order, `None` past the end
    async fn job_id_at_rank(&self, rank: usize) -> Result<Option<JobId>>;

    /// Jobs with `lower <= id < upper`; `upper == None` is open-ended
    async fn jobs_in_range(&self, lower: JobId, upper: Option<JobId>) -> Result<Vec<JobInfo>>;
}

/// Id-ordered catalog held in memory.
#[derive(Default)]
pub struct InMemoryJobCatalog {
    jobs: RwLock<BTreeMap<JobId, JobInfo>>,
}

impl InMemoryJobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding one job per id with generated names.
    pub fn with_ids(ids: impl IntoIterator<Item = JobId>) -> Self {
        let jobs = ids
            .into_iter()
            .map(|id| (id, JobInfo::new(id, "default", format!("job-{}", id), "0 * * * * ?")))
            .collect();
        Self {
            jobs: RwLock::new(jobs),
        }
    }

    /// Insert or replace a job. Returns true if the id was new.
    pub async fn insert(&self, job: JobInfo) -> bool {
        self.jobs.write().await.insert(job.id, job).is_none()
    }

    pub async fn remove(&self, id: JobId) -> Option<JobInfo> {
        self.jobs.write().await.remove(&id)
    }
}

#[async_trait]
impl JobCatalog for InMemoryJobCatalog {
    async fn assignable_job_count(&self) -> Result<usize> {
        Ok(self.jobs.read().await.len())
    }

    async fn job_id_at_rank(&self, rank: usize) -> Result<Option<JobId>> {
        Ok(self.jobs.read().await.keys().nth(rank).copied())
    }

    async fn jobs_in_range(&self, lower: JobId, upper: Option<JobId>) -> Result<Vec<JobInfo>> {
        let interval = DataInterval { lower, upper };
        if interval.is_empty() {
            return Ok(Vec::new());
        }
        let jobs = self.jobs.read().await;
        let selected = match upper {
            Some(upper) => jobs.range(lower..upper).map(|(_, job)| job.clone()).collect(),
            None => jobs.range(lower..).map(|(_, job)| job.clone()).collect(),
        };
        Ok(selected)
    }
}
