use genqueue_logging::gq_info;

use crate::{Job, JobPatch, JobStatus, JobStore, UpdateOutcome, INITIALIZING_MESSAGE};

pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Bounds the number of GENERATING jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionScheduler {
    max_concurrent: usize,
}

impl Default for AdmissionScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

impl AdmissionScheduler {
    /// A cap of zero is raised to one so the queue can always drain.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn has_capacity(&self, store: &JobStore) -> bool {
        store.count_with_status(JobStatus::Generating) < self.max_concurrent
    }

    /// Promotes at most one job: the oldest QUEUED one, if a slot is free.
    ///
    /// Check and transition happen under the same `&mut` borrow, so a caller
    /// holding the store lock cannot promote a job twice.
    pub fn tick(&self, store: &mut JobStore) -> Option<Job> {
        if !self.has_capacity(store) {
            return None;
        }
        let id = store.oldest_queued()?;
        match store.update(
            id,
            JobPatch::status(JobStatus::Generating, INITIALIZING_MESSAGE),
        ) {
            UpdateOutcome::Applied => {
                let job = store.get(id)?;
                gq_info!(
                    "{} promoted to GENERATING ({}/{} slots)",
                    job.log_prefix(),
                    store.count_with_status(JobStatus::Generating),
                    self.max_concurrent
                );
                Some(job)
            }
            _ => None,
        }
    }
}
