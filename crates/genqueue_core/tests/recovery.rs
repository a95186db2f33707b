use genqueue_core::{
    reconcile_restored, Artifact, GenerationRequest, Job, JobStatus, STALE_JOB_ERROR,
};

fn job_with(status: JobStatus) -> Job {
    let mut job = Job::new(GenerationRequest::new("restored"));
    job.status = status;
    job
}

#[test]
fn in_flight_jobs_are_marked_stale() {
    let generating = job_with(JobStatus::Generating);
    let pending = job_with(JobStatus::Pending);
    let queued = job_with(JobStatus::Queued);

    let (jobs, report) = reconcile_restored(vec![generating, pending, queued]);

    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[0].error.as_deref(), Some(STALE_JOB_ERROR));
    assert_eq!(jobs[1].status, JobStatus::Failed);
    assert_eq!(jobs[2].status, JobStatus::Queued);
    assert_eq!(report.marked_stale, 2);
    assert_eq!(report.requeued, 1);
}

#[test]
fn completed_jobs_keep_references_without_bytes() {
    let mut completed = job_with(JobStatus::Completed);
    completed.artifacts = vec![Artifact::restored("https://remote/video")];

    let (jobs, report) = reconcile_restored(vec![completed]);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].artifacts[0].source_uri, "https://remote/video");
    assert_eq!(report.unmaterialized, 1);
}

#[test]
fn completed_job_missing_artifacts_becomes_failed() {
    let completed = job_with(JobStatus::Completed);

    let (jobs, report) = reconcile_restored(vec![completed]);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(jobs[0].artifacts.is_empty());
    assert_eq!(report.marked_stale, 1);
}

#[test]
fn invalid_requests_are_failed_instead_of_requeued() {
    let mut zero = job_with(JobStatus::Queued);
    zero.request = zero.request.with_outputs(0);
    let mut blank = Job::new(GenerationRequest::new("   "));
    blank.status = JobStatus::Completed;
    blank.artifacts = vec![Artifact::restored("https://remote/video")];
    let fine = job_with(JobStatus::Queued);

    let (jobs, report) = reconcile_restored(vec![zero, blank, fine]);

    for job in &jobs[..2] {
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.artifacts.is_empty());
        assert!(job
            .error
            .as_deref()
            .is_some_and(|error| error.starts_with("invalid request")));
    }
    assert_eq!(jobs[2].status, JobStatus::Queued);
    assert_eq!(report.invalid, 2);
    assert_eq!(report.requeued, 1);
    assert_eq!(report.unmaterialized, 0);
}
