use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::progress::QUEUED_MESSAGE;
use crate::GenerationRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// First four characters, used in exported file names.
    pub fn short(&self) -> String {
        self.0.simple().to_string().chars().take(4).collect()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Pending,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Still waiting for admission or occupying the remote service.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Pending | Self::Generating)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Pending => 1,
            Self::Generating => 2,
            Self::Completed | Self::Failed => 3,
        }
    }

    /// Status only moves forward; terminal states never move.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Pending => "PENDING",
            Self::Generating => "GENERATING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One output of a job. The bytes live only in memory; persisted
/// snapshots keep the reference the bytes were fetched from, so a restored
/// artifact has `bytes == None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub source_uri: String,
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
}

impl Artifact {
    /// A freshly fetched artifact. An empty body is still materialized.
    pub fn new(source_uri: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source_uri: source_uri.into(),
            bytes: Some(bytes),
        }
    }

    /// Known only by reference, as after loading a snapshot.
    pub fn restored(source_uri: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            bytes: None,
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.bytes.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub request: GenerationRequest,
    pub progress_message: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Job {
    /// A fresh job in the only initial state, QUEUED.
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            request,
            progress_message: QUEUED_MESSAGE.to_string(),
            artifacts: Vec::new(),
            error: None,
        }
    }

    /// New identity seeded with the same request; `self` is left untouched.
    pub fn retry(&self) -> Job {
        Job::new(self.request.clone())
    }

    pub fn clone_request(&self) -> GenerationRequest {
        self.request.clone()
    }

    pub fn log_prefix(&self) -> String {
        genqueue_logging::job_prefix(&self.id.to_string())
    }
}

/// Field-level merge applied by [`crate::JobStore::update`]. `None` leaves the
/// field as it is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress_message: Option<String>,
    pub artifacts: Option<Vec<Artifact>>,
    pub error: Option<String>,
}

impl JobPatch {
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            progress_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn status(status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            progress_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn completed(artifacts: Vec<Artifact>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress_message: Some(crate::COMPLETED_MESSAGE.to_string()),
            artifacts: Some(artifacts),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            progress_message: Some(crate::FAILED_MESSAGE.to_string()),
            artifacts: None,
            error: Some(error.into()),
        }
    }
}
