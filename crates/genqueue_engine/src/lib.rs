//! Genqueue engine: remote operation client, job runner and orchestrator.
mod client;
mod export;
mod filename;
mod http;
mod orchestrator;
mod persist;
mod runner;
mod types;

pub use client::RemoteOperationClient;
pub use export::{export_artifacts, ExportError, ExportSummary};
pub use filename::{artifact_filename, sanitize_component};
pub use http::{HttpClientSettings, HttpOperationClient};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use persist::{
    ensure_output_dir, load_workspace, restore_store, save_workspace, snapshot_path,
    AtomicFileWriter, PersistError,
};
pub use runner::{JobRunner, RunnerSettings, SharedStore};
pub use types::{
    ErrorEnvelope, JobFailure, OperationHandle, OrchestratorError, PollResponse, RemoteError,
};
