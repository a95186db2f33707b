use genqueue_logging::gq_warn;

use crate::{Job, JobStatus, FAILED_MESSAGE};

pub const STALE_JOB_ERROR: &str = "interrupted: operation handle lost on restart";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub marked_stale: usize,
    /// COMPLETED jobs restored without bytes for their artifacts.
    pub unmaterialized: usize,
    /// QUEUED or COMPLETED jobs whose request no longer validates.
    pub invalid: usize,
}

/// Normalizes jobs loaded from a previous process.
///
/// Remote handles are not persisted, so GENERATING and PENDING jobs cannot
/// be resumed and become FAILED. QUEUED jobs stay queued. A COMPLETED job
/// whose artifact count no longer matches its request is marked FAILED too,
/// and so is any QUEUED or COMPLETED job whose request fails validation.
pub fn reconcile_restored(jobs: Vec<Job>) -> (Vec<Job>, RecoveryReport) {
    let mut report = RecoveryReport::default();
    let jobs = jobs
        .into_iter()
        .map(|mut job| {
            if matches!(job.status, JobStatus::Queued | JobStatus::Completed) {
                if let Err(err) = job.request.validate() {
                    gq_warn!("{} restored with an invalid request: {}", job.log_prefix(), err);
                    mark_failed(&mut job, &format!("invalid request: {err}"));
                    report.invalid += 1;
                    return job;
                }
            }
            match job.status {
                JobStatus::Queued => report.requeued += 1,
                JobStatus::Pending | JobStatus::Generating => {
                    gq_warn!("{} was {} at shutdown; marking failed", job.log_prefix(), job.status);
                    mark_failed(&mut job, STALE_JOB_ERROR);
                    report.marked_stale += 1;
                }
                JobStatus::Completed => {
                    if job.artifacts.len() != job.request.number_of_outputs {
                        mark_failed(&mut job, "restored without its artifacts");
                        report.marked_stale += 1;
                    } else if job.artifacts.iter().any(|a| !a.is_materialized()) {
                        report.unmaterialized += 1;
                    }
                }
                JobStatus::Failed => {
                    if job.error.is_none() {
                        job.error = Some("failed".to_string());
                    }
                    job.artifacts.clear();
                }
            }
            job
        })
        .collect();
    (jobs, report)
}

fn mark_failed(job: &mut Job, reason: &str) {
    job.status = JobStatus::Failed;
    job.progress_message = FAILED_MESSAGE.to_string();
    job.artifacts.clear();
    job.error = Some(reason.to_string());
}
