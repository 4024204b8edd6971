//! Background job execution and the job registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::JobLimits;
use crate::error::ImportError;
use crate::extract::Extractor;
use crate::importer::{ImportResult, Importer};
use crate::job::{Job, JobSpec, JobStatus};
use crate::target::Connector;

/// Job id → job handle, bounded by [`JobLimits`].
#[derive(Debug)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, Arc<Job>>>,
    limits: JobLimits,
}

impl JobRegistry {
    pub fn new(limits: JobLimits) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            limits,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<Job>>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a job, evicting old terminal jobs to make room.
    ///
    /// Fails with `RegistryFull` when every slot holds a running job.
    pub fn insert(&self, job: Arc<Job>) -> Result<(), ImportError> {
        let mut jobs = self.lock();

        let retention = self.limits.retention();
        let now = Utc::now();
        let expired = |ended: chrono::DateTime<Utc>| {
            (now - ended).to_std().map(|age| age > retention).unwrap_or(false)
        };
        jobs.retain(|id, job| match job.ended_at() {
            Some(ended) if expired(ended) => {
                debug!(job = %id, "evicting expired job");
                false
            }
            _ => true,
        });

        if jobs.len() >= self.limits.max_jobs {
            let oldest = jobs
                .values()
                .filter_map(|job| job.ended_at().map(|ended| (ended, job.id())))
                .min();
            match oldest {
                Some((_, id)) => {
                    debug!(job = %id, "evicting oldest finished job");
                    jobs.remove(&id);
                }
                None => return Err(ImportError::RegistryFull(jobs.len())),
            }
        }

        jobs.insert(job.id(), job);
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Job>> {
        self.lock().get(id).cloned()
    }

    /// Remove a job that has ended. Running jobs stay.
    pub fn evict(&self, id: &Uuid) -> bool {
        let mut jobs = self.lock();
        match jobs.get(id) {
            Some(job) if job.is_terminal() => jobs.remove(id).is_some(),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Runs imports on the tokio runtime and answers status queries.
pub struct ImportService<X, C> {
    importer: Arc<Importer<X, C>>,
    registry: Arc<JobRegistry>,
}

impl<X, C> Clone for ImportService<X, C> {
    fn clone(&self) -> Self {
        Self {
            importer: Arc::clone(&self.importer),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<X, C> ImportService<X, C>
where
    X: Extractor + 'static,
    C: Connector + 'static,
{
    pub fn new(importer: Importer<X, C>, limits: JobLimits) -> Self {
        Self {
            importer: Arc::new(importer),
            registry: Arc::new(JobRegistry::new(limits)),
        }
    }

    /// Register and start a job. Returns immediately.
    pub fn submit(&self, spec: JobSpec) -> Result<Uuid, ImportError> {
        let job = Arc::new(Job::new());
        let id = job.id();
        self.registry.insert(Arc::clone(&job))?;
        info!(job = %id, source = %spec.source.display(), "job submitted");

        let importer = Arc::clone(&self.importer);
        let worker_job = Arc::clone(&job);
        let worker = tokio::spawn(async move {
            importer.execute(&worker_job, &spec).await.map(|_| ())
        });
        tokio::spawn(watch(job, worker));
        Ok(id)
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.registry.get(id).map(|job| job.status())
    }

    /// Present only for jobs that succeeded.
    pub fn result(&self, id: &Uuid) -> Option<ImportResult> {
        self.registry.get(id).and_then(|job| job.result())
    }

    pub fn job(&self, id: &Uuid) -> Option<Arc<Job>> {
        self.registry.get(id)
    }

    pub fn evict(&self, id: &Uuid) -> bool {
        self.registry.evict(id)
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(&self, id: &Uuid) -> Option<JobStatus> {
        let job = self.registry.get(id)?;
        job.ended().await;
        Some(job.status())
    }
}

/// Record what happened to a worker that did not report for itself.
async fn watch(job: Arc<Job>, worker: JoinHandle<Result<(), ImportError>>) {
    match worker.await {
        Ok(_) if job.is_terminal() => {}
        Ok(_) => {
            job.crash("worker exited without reporting an outcome");
        }
        Err(err) if err.is_panic() => {
            let panic = err.into_panic();
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            job.crash(format!("worker panicked: {reason}"));
        }
        Err(err) => {
            job.crash(format!("worker was cancelled: {err}"));
        }
    }
}
