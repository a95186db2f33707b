//! Genqueue core: job model, job store, admission and progress projection.
//!
//! Everything in this crate is synchronous. The engine crate wraps the
//! [`JobStore`] in a lock and drives it from async tasks.
mod job;
mod progress;
mod recovery;
mod request;
mod scheduler;
mod store;
mod view_model;

pub use job::{Artifact, Job, JobId, JobPatch, JobStatus};
pub use progress::{
    downloading_message, progress_message, FanOutProgress, COMPLETED_MESSAGE, FAILED_MESSAGE,
    INITIALIZING_MESSAGE, QUEUED_MESSAGE,
};
pub use recovery::{reconcile_restored, RecoveryReport, STALE_JOB_ERROR};
pub use request::{
    AspectRatio, GenerationRequest, Resolution, SourceImage, ValidationError, VideoModel,
    MAX_OUTPUTS,
};
pub use scheduler::{AdmissionScheduler, DEFAULT_MAX_CONCURRENT};
pub use store::{JobStore, StoreError, StoreEvent, SubscriptionId, UpdateOutcome};
pub use view_model::{JobRowView, WorkspaceView};
