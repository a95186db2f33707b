use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use genqueue_core::{
    downloading_message, progress_message, Artifact, FanOutProgress, GenerationRequest, Job,
    JobId, JobPatch, JobStatus, JobStore, UpdateOutcome,
};
use genqueue_logging::{gq_debug, gq_error, gq_info, gq_warn, output_prefix};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{JobFailure, OperationHandle, RemoteError, RemoteOperationClient};

pub type SharedStore = Arc<Mutex<JobStore>>;

/// Locks the store, recovering the data if a previous holder panicked.
pub(crate) fn lock_store(store: &SharedStore) -> MutexGuard<'_, JobStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub poll_interval: Duration,
    pub api_key: Option<String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            api_key: None,
        }
    }
}

impl RunnerSettings {
    fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Drives one GENERATING job to COMPLETED or FAILED.
pub struct JobRunner {
    client: Arc<dyn RemoteOperationClient>,
    store: SharedStore,
    settings: RunnerSettings,
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(
        client: Arc<dyn RemoteOperationClient>,
        store: SharedStore,
        settings: RunnerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            cancel,
        }
    }

    /// Runs `job` and performs its single terminal store write.
    pub async fn run(&self, job: Job) -> JobStatus {
        let prefix = job.log_prefix();
        gq_info!(
            "{} starting generation: {} output(s), model {}, prompt {:?}",
            prefix,
            job.request.number_of_outputs,
            job.request.model,
            job.request.prompt
        );

        let (patch, status) = match self.execute(&job).await {
            Ok(artifacts) => {
                gq_info!("{} job completed successfully", prefix);
                (JobPatch::completed(artifacts), JobStatus::Completed)
            }
            Err(failure) => {
                gq_error!("{} job failed: {}", prefix, failure);
                (JobPatch::failed(failure.to_string()), JobStatus::Failed)
            }
        };

        match lock_store(&self.store).update(job.id, patch) {
            UpdateOutcome::Applied | UpdateOutcome::Unchanged => {}
            UpdateOutcome::NotFound => {
                gq_debug!("{} removed while generating; result dropped", prefix);
            }
            UpdateOutcome::Rejected => {
                gq_warn!("{} terminal update rejected by store", prefix);
            }
        }
        status
    }

    async fn execute(&self, job: &Job) -> Result<Vec<Artifact>, JobFailure> {
        if !self.settings.has_credential() {
            return Err(JobFailure::Configuration);
        }
        // Restored or directly inserted jobs skip the enqueue check.
        job.request.validate().map_err(JobFailure::InvalidRequest)?;

        let total = job.request.number_of_outputs;
        let progress = Arc::new(Mutex::new(FanOutProgress::new(total)));

        // Fan out: one independent task per requested output.
        let tasks: Vec<JoinHandle<Result<Artifact, RemoteError>>> = (0..total)
            .map(|index| {
                let sub = SubOperation {
                    job_id: job.id,
                    prefix: format!("{} {}", job.log_prefix(), output_prefix(index, total)),
                    index,
                    request: job.request.clone(),
                    client: self.client.clone(),
                    store: self.store.clone(),
                    progress: progress.clone(),
                    poll_interval: self.settings.poll_interval,
                    cancel: self.cancel.clone(),
                };
                tokio::spawn(sub.drive())
            })
            .collect();

        // Fan in: wait for every sub-operation, success or failure.
        let results: Vec<Result<Artifact, RemoteError>> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|err| Err(RemoteError::Aborted(err.to_string()))))
            .collect();

        aggregate(&job.log_prefix(), results)
    }
}

/// All-or-nothing: artifacts in request order, or the first failure by
/// output index. Every failure is logged.
fn aggregate(
    prefix: &str,
    results: Vec<Result<Artifact, RemoteError>>,
) -> Result<Vec<Artifact>, JobFailure> {
    let total = results.len();
    let mut artifacts = Vec::with_capacity(total);
    let mut first_failure: Option<(usize, RemoteError)> = None;
    let mut failed = 0;

    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(artifact) => artifacts.push(artifact),
            Err(err) => {
                failed += 1;
                gq_error!("{} {} failed: {}", prefix, output_prefix(index, total), err);
                if first_failure.is_none() {
                    first_failure = Some((index, err));
                }
            }
        }
    }

    match first_failure {
        None => Ok(artifacts),
        Some((index, source)) => Err(JobFailure::Aggregate {
            index,
            total,
            failed,
            source,
        }),
    }
}

/// One remote operation within a job: submit, poll until done, fetch.
struct SubOperation {
    job_id: JobId,
    prefix: String,
    index: usize,
    request: GenerationRequest,
    client: Arc<dyn RemoteOperationClient>,
    store: SharedStore,
    progress: Arc<Mutex<FanOutProgress>>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl SubOperation {
    async fn drive(self) -> Result<Artifact, RemoteError> {
        let handle = self.client.submit(&self.request, self.index).await?;
        gq_info!("{} operation started ({}); polling", self.prefix, handle);

        let finished = loop {
            // Cancellation hook; nothing triggers it before shutdown.
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RemoteError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            let response = self.poll(&handle).await?;
            if response.done {
                break response;
            }
        };

        if let Some(envelope) = finished.error {
            return Err(RemoteError::Operation(envelope));
        }
        let reference = finished.result_reference.ok_or(RemoteError::MissingResult)?;

        gq_info!("{} output generated; downloading", self.prefix);
        self.announce_download();
        let bytes = self.client.fetch(&reference).await?;
        gq_debug!("{} downloaded {} bytes", self.prefix, bytes.len());
        Ok(Artifact::new(reference, bytes))
    }

    async fn poll(&self, handle: &OperationHandle) -> Result<crate::PollResponse, RemoteError> {
        let response = self.client.poll(handle).await?;
        gq_debug!(
            "{} poll: done={} progress={:?}",
            self.prefix,
            response.done,
            response.progress_percent
        );
        self.report(response.progress_percent);
        Ok(response)
    }

    /// Records the tick and writes the refreshed message. The progress lock
    /// is held across the store write so messages land in tick order.
    fn report(&self, percent: Option<f64>) {
        let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        progress.record(self.index, percent);
        let message = progress_message(&progress);
        lock_store(&self.store).update(self.job_id, JobPatch::progress(message));
    }

    fn announce_download(&self) {
        let progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        let message = downloading_message(self.index, progress.total());
        lock_store(&self.store).update(self.job_id, JobPatch::progress(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_keeps_request_order() {
        let results = vec![
            Ok(Artifact::new("r0", b"0".to_vec())),
            Ok(Artifact::new("r1", b"1".to_vec())),
        ];
        let artifacts = aggregate("[JOB-test]", results).unwrap();
        let refs: Vec<_> = artifacts.iter().map(|a| a.source_uri.as_str()).collect();
        assert_eq!(refs, vec!["r0", "r1"]);
    }

    #[test]
    fn aggregate_reports_first_failure_by_index() {
        let results = vec![
            Ok(Artifact::new("r0", b"0".to_vec())),
            Err(RemoteError::Transport("reset".to_string())),
            Err(RemoteError::NotFound("gone".to_string())),
        ];
        let failure = aggregate("[JOB-test]", results).unwrap_err();
        assert_eq!(
            failure,
            JobFailure::Aggregate {
                index: 1,
                total: 3,
                failed: 2,
                source: RemoteError::Transport("reset".to_string()),
            }
        );
        assert_eq!(failure.to_string(), "output 2/3 failed: transport error: reset");
    }

    #[test]
    fn blank_api_key_is_not_a_credential() {
        let settings = RunnerSettings {
            api_key: Some("  ".to_string()),
            ..RunnerSettings::default()
        };
        assert!(!settings.has_credential());
    }
}
