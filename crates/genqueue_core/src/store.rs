use std::fmt;

use genqueue_logging::{gq_debug, gq_warn};
use thiserror::Error;

use crate::{Job, JobId, JobPatch, JobStatus};

pub type SubscriptionId = u64;

type Observer = Box<dyn Fn(&StoreEvent) + Send>;

/// Change notification, delivered synchronously in apply order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Inserted { id: JobId, status: JobStatus },
    Updated { id: JobId, status: JobStatus },
    Removed { id: JobId },
    Restored { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Fields were merged and observers notified.
    Applied,
    /// The patch changed nothing (e.g. re-applying a terminal status).
    Unchanged,
    NotFound,
    /// The patch would break a status invariant and was dropped.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("job {0} already exists")]
    DuplicateId(JobId),
}

struct Entry {
    seq: u64,
    job: Job,
}

/// Ordered, most-recent-first collection of jobs for one workspace.
///
/// All mutation goes through `insert`, `update`, `remove` and `restore`;
/// readers get clones.
pub struct JobStore {
    workspace: String,
    entries: Vec<Entry>,
    next_seq: u64,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: SubscriptionId,
}

impl fmt::Debug for JobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobStore")
            .field("workspace", &self.workspace)
            .field("jobs", &self.entries.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new("default")
    }
}

impl JobStore {
    pub fn new(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            entries: Vec::new(),
            next_seq: 0,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subscribe(&mut self, observer: impl Fn(&StoreEvent) + Send + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    /// Prepends `job`; the newest job is first in [`JobStore::list`].
    pub fn insert(&mut self, job: Job) -> Result<(), StoreError> {
        if self.position(job.id).is_some() {
            return Err(StoreError::DuplicateId(job.id));
        }
        let event = StoreEvent::Inserted {
            id: job.id,
            status: job.status,
        };
        let seq = self.bump_seq();
        self.entries.insert(0, Entry { seq, job });
        self.notify(&event);
        Ok(())
    }

    pub fn update(&mut self, id: JobId, patch: JobPatch) -> UpdateOutcome {
        let Some(pos) = self.position(id) else {
            return UpdateOutcome::NotFound;
        };
        let job = &mut self.entries[pos].job;

        if job.status.is_terminal() {
            return match patch.status {
                Some(status) if status != job.status => {
                    gq_warn!(
                        "{} ignoring {} -> {} on terminal job",
                        job.log_prefix(),
                        job.status,
                        status
                    );
                    UpdateOutcome::Rejected
                }
                _ => UpdateOutcome::Unchanged,
            };
        }

        let mut next = job.clone();
        if let Some(status) = patch.status {
            if status != next.status && !next.status.can_transition_to(status) {
                gq_warn!(
                    "{} invalid transition {} -> {}",
                    next.log_prefix(),
                    next.status,
                    status
                );
                return UpdateOutcome::Rejected;
            }
            next.status = status;
        }
        if let Some(message) = patch.progress_message {
            next.progress_message = message;
        }
        if let Some(artifacts) = patch.artifacts {
            next.artifacts = artifacts;
        }
        if let Some(error) = patch.error {
            next.error = Some(error);
        }

        if !terminal_fields_consistent(&next) {
            gq_warn!(
                "{} rejecting {} update with inconsistent artifacts/error",
                next.log_prefix(),
                next.status
            );
            return UpdateOutcome::Rejected;
        }
        if next == *job {
            return UpdateOutcome::Unchanged;
        }

        let event = StoreEvent::Updated {
            id,
            status: next.status,
        };
        *job = next;
        self.notify(&event);
        UpdateOutcome::Applied
    }

    /// Deletes a job regardless of its status.
    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        let pos = self.position(id)?;
        let entry = self.entries.remove(pos);
        self.notify(&StoreEvent::Removed { id });
        Some(entry.job)
    }

    /// Replaces the contents with `jobs` (most-recent-first), dropping
    /// duplicate ids after the first occurrence.
    pub fn restore(&mut self, jobs: Vec<Job>) {
        self.entries.clear();
        let mut seen = std::collections::HashSet::new();
        let unique: Vec<Job> = jobs.into_iter().filter(|job| seen.insert(job.id)).collect();
        // Oldest job gets the lowest sequence number.
        for job in unique.into_iter().rev() {
            let seq = self.bump_seq();
            self.entries.insert(0, Entry { seq, job });
        }
        gq_debug!(
            "restored {} jobs into workspace {}",
            self.entries.len(),
            self.workspace
        );
        self.notify(&StoreEvent::Restored {
            count: self.entries.len(),
        });
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.entries
            .iter()
            .find(|entry| entry.job.id == id)
            .map(|entry| entry.job.clone())
    }

    /// Snapshot in observable (most-recent-first) order.
    pub fn list(&self) -> Vec<Job> {
        self.entries.iter().map(|entry| entry.job.clone()).collect()
    }

    pub fn count_with_status(&self, status: JobStatus) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.job.status == status)
            .count()
    }

    pub fn has_active(&self) -> bool {
        self.entries.iter().any(|entry| entry.job.status.is_active())
    }

    /// First-enqueued job still waiting for admission.
    pub fn oldest_queued(&self) -> Option<JobId> {
        self.entries
            .iter()
            .filter(|entry| entry.job.status == JobStatus::Queued)
            .min_by_key(|entry| entry.seq)
            .map(|entry| entry.job.id)
    }

    fn position(&self, id: JobId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.job.id == id)
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn notify(&self, event: &StoreEvent) {
        for (_, observer) in &self.observers {
            observer(event);
        }
    }
}

fn terminal_fields_consistent(job: &Job) -> bool {
    match job.status {
        JobStatus::Completed => {
            job.error.is_none()
                && !job.artifacts.is_empty()
                && job.artifacts.len() == job.request.number_of_outputs
        }
        JobStatus::Failed => job.error.is_some() && job.artifacts.is_empty(),
        _ => true,
    }
}
