//! In-memory job registry.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::types::{Job, JobId, JobTransitionError};

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Transition(#[from] JobTransitionError),
}

/// Process-wide map from job id to job.
///
/// Each job sits behind its own lock, so polling one job never waits on
/// another job's driver. Entries live for the lifetime of the registry.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<RwLock<Job>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a job in `Queued` and returns a snapshot of it.
    pub async fn create(&self) -> Job {
        let job = Job::new(JobId::new());
        let snapshot = job.clone();
        self.jobs
            .write()
            .await
            .insert(job.id, Arc::new(RwLock::new(job)));
        snapshot
    }

    async fn entry(&self, id: &JobId) -> Result<Arc<RwLock<Job>>, RegistryError> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(RegistryError::NotFound(*id))
    }

    /// Snapshot of a job.
    pub async fn get(&self, id: &JobId) -> Result<Job, RegistryError> {
        let entry = self.entry(id).await?;
        let job = entry.read().await;
        Ok(job.clone())
    }

    /// Applies `mutator` while holding the job's write lock.
    pub async fn update<T, F>(&self, id: &JobId, mutator: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&mut Job) -> Result<T, JobTransitionError>,
    {
        let entry = self.entry(id).await?;
        let mut job = entry.write().await;
        Ok(mutator(&mut job)?)
    }

    /// Snapshots of every job, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let entries: Vec<_> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.read().await.clone());
        }
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
