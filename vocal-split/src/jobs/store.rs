//! In-memory job record store.
//!
//! Each record is mutated under its map shard lock, so the pipeline that owns
//! a job and the request handlers reading it never observe a torn record.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::model::{JobRecord, JobStatus};
use crate::{Error, Result};

/// Process-scoped store of job records keyed by job id.
#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<String, JobRecord>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Fails if the id is already taken.
    pub fn create(&self, record: JobRecord) -> Result<()> {
        match self.jobs.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateId(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Snapshot of a record.
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.get(id).map(|r| r.clone())
    }

    /// Apply `mutator` to a record and return the updated snapshot.
    pub fn update<F>(&self, id: &str, mutator: F) -> Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut record = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Job", id))?;
        mutator(record.value_mut());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Move a record to `next`, rejecting edges outside the state machine.
    pub fn transition(
        &self,
        id: &str,
        next: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<JobRecord> {
        self.transition_with(id, next, progress, message, |_| {})
    }

    /// Like [`transition`](Self::transition), additionally applying `mutator`
    /// in the same critical section.
    pub fn transition_with<F>(
        &self,
        id: &str,
        next: JobStatus,
        progress: u8,
        message: impl Into<String>,
        mutator: F,
    ) -> Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut record = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Job", id))?;

        if !record.status.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: record.status.to_string(),
                to: next.to_string(),
            });
        }

        debug!(job_id = %id, from = %record.status, to = %next, "Job transition");
        record.status = next;
        record.progress = progress.min(100);
        record.message = message.into();
        mutator(record.value_mut());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Status override used by the stop action.
    ///
    /// Flips a non-terminal record to `error`. Returns the snapshot and whether
    /// anything changed; terminal records are left untouched.
    pub fn cancel(&self, id: &str, message: impl Into<String>) -> Result<(JobRecord, bool)> {
        let mut record = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Job", id))?;

        if record.status.is_terminal() {
            return Ok((record.clone(), false));
        }

        record.status = JobStatus::Error;
        record.message = message.into();
        record.updated_at = Utc::now();
        Ok((record.clone(), true))
    }

    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        self.jobs.remove(id).map(|(_, r)| r)
    }

    /// Snapshots of all records, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.jobs.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Snapshots of records with the given status, newest first.
    pub fn list_by_status(&self, status: JobStatus) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .jobs
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
