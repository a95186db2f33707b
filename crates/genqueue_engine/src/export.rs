use std::path::{Path, PathBuf};

use genqueue_core::{Job, JobStatus};
use genqueue_logging::{gq_error, gq_info};

use crate::filename::artifact_filename;
use crate::persist::{ensure_output_dir, AtomicFileWriter, PersistError};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    /// Artifacts known only by reference (restored from a snapshot).
    pub skipped: usize,
    pub failed: usize,
}

impl ExportSummary {
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.skipped == 0 && self.failed == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

/// Writes every in-memory artifact of every COMPLETED job into `dir`.
///
/// A failing file is logged and counted; the remaining files are still
/// written.
pub fn export_artifacts(jobs: &[Job], dir: &Path) -> Result<ExportSummary, ExportError> {
    let completed: Vec<&Job> = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Completed && !job.artifacts.is_empty())
        .collect();
    let mut summary = ExportSummary::default();
    if completed.is_empty() {
        gq_info!("no completed artifacts to export");
        return Ok(summary);
    }

    ensure_output_dir(dir)?;
    let writer = AtomicFileWriter::new(dir.to_path_buf());
    let total: usize = completed.iter().map(|job| job.artifacts.len()).sum();
    gq_info!("exporting {} artifact(s) to {:?}", total, dir);

    for job in completed {
        for (index, artifact) in job.artifacts.iter().enumerate() {
            let Some(bytes) = artifact.bytes.as_deref() else {
                summary.skipped += 1;
                continue;
            };
            let filename = artifact_filename(job, index);
            match writer.write(&filename, bytes) {
                Ok(path) => summary.written.push(path),
                Err(err) => {
                    summary.failed += 1;
                    gq_error!("{} failed to export {}: {}", job.log_prefix(), filename, err);
                }
            }
        }
    }

    gq_info!(
        "export finished: {} written, {} skipped, {} failed",
        summary.written.len(),
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}
