use crate::{Job, JobId, JobStatus, JobStore};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkspaceView {
    pub workspace: String,
    pub jobs: Vec<JobRowView>,
    pub queued: usize,
    pub generating: usize,
    pub completed: usize,
    pub failed: usize,
}

impl WorkspaceView {
    pub fn from_store(store: &JobStore) -> Self {
        let jobs: Vec<JobRowView> = store.list().iter().map(JobRowView::from).collect();
        let count = |status| jobs.iter().filter(|row| row.status == status).count();
        Self {
            workspace: store.workspace().to_string(),
            queued: count(JobStatus::Queued) + count(JobStatus::Pending),
            generating: count(JobStatus::Generating),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Failed),
            jobs,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.queued + self.generating > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub id: JobId,
    pub status: JobStatus,
    pub prompt: String,
    pub progress_message: String,
    pub outputs: usize,
    pub artifacts: usize,
    pub error: Option<String>,
}

impl From<&Job> for JobRowView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            prompt: job.request.prompt.clone(),
            progress_message: job.progress_message.clone(),
            outputs: job.request.number_of_outputs,
            artifacts: job.artifacts.len(),
            error: job.error.clone(),
        }
    }
}
