use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use genqueue_core::{reconcile_restored, Job, JobStore, RecoveryReport};
use genqueue_logging::{gq_info, gq_warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::filename::sanitize_component;

const SNAPSHOT_SUFFIX: &str = ".jobs.ron";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize workspace: {0}")]
    Serialize(String),
    #[error("failed to parse workspace snapshot {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Ensure a directory exists and is writable; create it if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!("{} is not a directory", dir.display())));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Writes whole files through a temp file in the target directory followed
/// by a rename, so readers never observe a partial file.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkspaceSnapshot {
    workspace: String,
    jobs: Vec<Job>,
}

pub fn snapshot_path(state_dir: &Path, workspace: &str) -> PathBuf {
    state_dir.join(format!("{}{SNAPSHOT_SUFFIX}", sanitize_component(workspace, 64)))
}

/// Persists the job list of `workspace` (most-recent-first). Artifact bytes
/// are not written, only their references.
pub fn save_workspace(
    state_dir: &Path,
    workspace: &str,
    jobs: &[Job],
) -> Result<PathBuf, PersistError> {
    let snapshot = WorkspaceSnapshot {
        workspace: workspace.to_string(),
        jobs: jobs.to_vec(),
    };
    let content = ron::ser::to_string_pretty(&snapshot, ron::ser::PrettyConfig::new())
        .map_err(|err| PersistError::Serialize(err.to_string()))?;

    let path = snapshot_path(state_dir, workspace);
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| PersistError::OutputDir(path.display().to_string()))?;
    let written = AtomicFileWriter::new(state_dir.to_path_buf()).write(&filename, content.as_bytes())?;
    gq_info!("saved {} jobs of workspace {} to {:?}", jobs.len(), workspace, written);
    Ok(written)
}

/// Reads the raw job list of `workspace`; a missing snapshot is empty.
pub fn load_workspace(state_dir: &Path, workspace: &str) -> Result<Vec<Job>, PersistError> {
    let path = snapshot_path(state_dir, workspace);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let snapshot: WorkspaceSnapshot = ron::from_str(&content).map_err(|err| PersistError::Parse {
        path: path.clone(),
        message: err.to_string(),
    })?;
    if snapshot.workspace != workspace {
        gq_warn!(
            "snapshot {:?} belongs to workspace {}, loading it for {}",
            path,
            snapshot.workspace,
            workspace
        );
    }
    Ok(snapshot.jobs)
}

/// Loads `workspace` into a fresh [`JobStore`], reconciling jobs that were
/// in flight when the previous process stopped.
pub fn restore_store(
    state_dir: &Path,
    workspace: &str,
) -> Result<(JobStore, RecoveryReport), PersistError> {
    let jobs = load_workspace(state_dir, workspace)?;
    let (jobs, report) = reconcile_restored(jobs);
    let mut store = JobStore::new(workspace);
    store.restore(jobs);
    if report.marked_stale > 0 {
        gq_warn!(
            "workspace {}: {} job(s) were in flight at shutdown and are now FAILED",
            workspace,
            report.marked_stale
        );
    }
    Ok((store, report))
}
