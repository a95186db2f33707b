use std::sync::{Arc, Mutex};
use std::time::Duration;

use genqueue_core::{
    AdmissionScheduler, GenerationRequest, Job, JobId, JobStatus, JobStore, StoreEvent,
    SubscriptionId, WorkspaceView, DEFAULT_MAX_CONCURRENT,
};
use genqueue_logging::{gq_debug, gq_info};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::runner::{lock_store, JobRunner, RunnerSettings, SharedStore};
use crate::{OrchestratorError, RemoteOperationClient};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_concurrent: usize,
    pub poll_interval: Duration,
    pub api_key: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            poll_interval: Duration::from_secs(10),
            api_key: None,
        }
    }
}

struct Inner {
    store: SharedStore,
    scheduler: AdmissionScheduler,
    runner: Arc<JobRunner>,
    runtime: Handle,
    changes: watch::Receiver<u64>,
    cancel: CancellationToken,
}

/// Process-wide job queue service.
///
/// Owns the [`JobStore`], promotes queued jobs whenever the store changes
/// and runs each promoted job on the Tokio runtime it was started on.
/// Created once at startup; [`Orchestrator::shutdown`] tears it down.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Starts the reactive scheduler loop. Must be called from within a
    /// Tokio runtime.
    pub fn start(
        store: JobStore,
        client: Arc<dyn RemoteOperationClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        let store: SharedStore = Arc::new(Mutex::new(store));
        let wake = Arc::new(Notify::new());
        let (changes_tx, changes_rx) = watch::channel(0u64);
        {
            let wake = wake.clone();
            lock_store(&store).subscribe(move |_event: &StoreEvent| {
                changes_tx.send_modify(|version| *version += 1);
                wake.notify_one();
            });
        }

        let cancel = CancellationToken::new();
        let runner = Arc::new(JobRunner::new(
            client,
            store.clone(),
            RunnerSettings {
                poll_interval: settings.poll_interval,
                api_key: settings.api_key.clone(),
            },
            cancel.clone(),
        ));

        let orchestrator = Self {
            inner: Arc::new(Inner {
                store,
                scheduler: AdmissionScheduler::new(settings.max_concurrent),
                runner,
                runtime: Handle::current(),
                changes: changes_rx,
                cancel,
            }),
        };
        orchestrator.spawn_scheduler_loop(wake);
        orchestrator
    }

    fn spawn_scheduler_loop(&self, wake: Arc<Notify>) {
        let this = self.clone();
        // Restored QUEUED jobs are admitted without waiting for a change.
        wake.notify_one();
        self.inner.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = this.inner.cancel.cancelled() => break,
                    _ = wake.notified() => {}
                }
                while this.tick().is_some() {}
            }
            gq_debug!("scheduler loop stopped");
        });
    }

    /// One admission step: promotes at most one QUEUED job and starts its
    /// runner. Safe to call from anywhere; promotion is atomic under the
    /// store lock.
    pub fn tick(&self) -> Option<JobId> {
        if self.inner.cancel.is_cancelled() {
            return None;
        }
        let job = {
            let mut store = lock_store(&self.inner.store);
            self.inner.scheduler.tick(&mut store)?
        };
        let id = job.id;
        let runner = self.inner.runner.clone();
        self.inner.runtime.spawn(async move {
            runner.run(job).await;
        });
        Some(id)
    }

    /// Validates and queues a new job.
    pub fn enqueue(&self, request: GenerationRequest) -> Result<JobId, OrchestratorError> {
        request.validate()?;
        let job = Job::new(request);
        let id = job.id;
        let prefix = job.log_prefix();
        lock_store(&self.inner.store).insert(job)?;
        gq_info!("{} new job queued", prefix);
        Ok(id)
    }

    /// Queues a fresh job with the request of FAILED job `id`; the failed
    /// job stays in the store untouched.
    pub fn retry(&self, id: JobId) -> Result<JobId, OrchestratorError> {
        let mut store = lock_store(&self.inner.store);
        let failed = store.get(id).ok_or(OrchestratorError::NotFound(id))?;
        if failed.status != JobStatus::Failed {
            return Err(OrchestratorError::NotRetryable(id));
        }
        let retried = failed.retry();
        let new_id = retried.id;
        gq_info!("{} retrying as {}", failed.log_prefix(), retried.log_prefix());
        store.insert(retried)?;
        Ok(new_id)
    }

    /// Retries every FAILED job, oldest first.
    pub fn retry_failed(&self) -> Vec<JobId> {
        let failed: Vec<JobId> = self
            .jobs()
            .into_iter()
            .rev()
            .filter(|job| job.status == JobStatus::Failed)
            .map(|job| job.id)
            .collect();
        failed
            .into_iter()
            .filter_map(|id| self.retry(id).ok())
            .collect()
    }

    /// Deletes a job. A GENERATING job keeps its in-flight calls; its result
    /// is dropped when it lands.
    pub fn remove(&self, id: JobId) -> Result<Job, OrchestratorError> {
        let removed = lock_store(&self.inner.store)
            .remove(id)
            .ok_or(OrchestratorError::NotFound(id))?;
        gq_info!("{} removed ({})", removed.log_prefix(), removed.status);
        Ok(removed)
    }

    pub fn job(&self, id: JobId) -> Option<Job> {
        lock_store(&self.inner.store).get(id)
    }

    pub fn jobs(&self) -> Vec<Job> {
        lock_store(&self.inner.store).list()
    }

    pub fn view(&self) -> WorkspaceView {
        WorkspaceView::from_store(&lock_store(&self.inner.store))
    }

    pub fn workspace(&self) -> String {
        lock_store(&self.inner.store).workspace().to_string()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.scheduler.max_concurrent()
    }

    /// Observers run synchronously under the store lock and must not call
    /// back into the orchestrator.
    pub fn subscribe(&self, observer: impl Fn(&StoreEvent) + Send + 'static) -> SubscriptionId {
        lock_store(&self.inner.store).subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock_store(&self.inner.store).unsubscribe(id)
    }

    /// Resolves once no job is QUEUED, PENDING or GENERATING, or after
    /// shutdown.
    pub async fn wait_idle(&self) {
        let mut changes = self.inner.changes.clone();
        loop {
            let busy = lock_store(&self.inner.store).has_active();
            if !busy || self.inner.cancel.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = self.inner.cancel.cancelled() => return,
                changed = changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Stops admitting jobs and trips the poll-loop cancellation hook.
    pub fn shutdown(&self) {
        gq_info!("orchestrator shutting down");
        self.inner.cancel.cancel();
    }
}
