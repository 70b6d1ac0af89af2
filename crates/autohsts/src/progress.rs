//! Per-host rollout progress and the store that persists it
//!
//! A host has a record exactly while it carries an HSTS header that is not
//! yet permanent. Records are created on activation, bumped on each
//! increase and deleted on promotion.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use autohsts_common::HostId;

use crate::error::{HstsError, StoreError};
use crate::schedule::StepSchedule;

/// Rollout progress for one virtual host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub host_id: HostId,
    /// Schedule position currently written to the header
    pub current_index: usize,
    /// Increases applied since activation
    pub num_updates: usize,
    /// Activation or last increase
    pub last_updated: DateTime<Utc>,
}

impl ProgressRecord {
    /// Record for a freshly activated host
    pub fn new(host_id: HostId, now: DateTime<Utc>) -> Self {
        Self {
            host_id,
            current_index: 0,
            num_updates: 0,
            last_updated: now,
        }
    }

    /// Record after one more increase
    pub fn advanced(&self, now: DateTime<Utc>) -> Self {
        Self {
            host_id: self.host_id.clone(),
            current_index: self.current_index + 1,
            num_updates: self.num_updates + 1,
            last_updated: now,
        }
    }

    /// Whether at least `frequency` has elapsed since the last update
    pub fn gate_open(&self, now: DateTime<Utc>, frequency: Duration) -> bool {
        TimeDelta::from_std(frequency)
            .ok()
            .and_then(|delta| self.last_updated.checked_add_signed(delta))
            .is_some_and(|due| now >= due)
    }

    /// Reject records that disagree with themselves or with the schedule
    pub fn check(&self, schedule: &StepSchedule) -> Result<(), HstsError> {
        if self.num_updates != self.current_index {
            return Err(HstsError::InconsistentRecord {
                host: self.host_id.clone(),
                reason: format!(
                    "update count {} does not match schedule index {}",
                    self.num_updates, self.current_index
                ),
            });
        }

        if self.current_index > schedule.last_index() {
            return Err(HstsError::InconsistentRecord {
                host: self.host_id.clone(),
                reason: format!(
                    "schedule index {} is beyond the last step {}",
                    self.current_index,
                    schedule.last_index()
                ),
            });
        }

        Ok(())
    }
}

/// All tracked hosts, ordered by id
pub type ProgressMap = BTreeMap<HostId, ProgressRecord>;

/// Durable mapping from host id to progress record
///
/// `put` and `delete` stage changes that become durable on `commit`.
/// `fetch_all` reflects staged changes.
pub trait ProgressStore {
    fn fetch_all(&self) -> Result<ProgressMap, StoreError>;

    fn put(&mut self, host: &HostId, record: ProgressRecord) -> Result<(), StoreError>;

    fn delete(&mut self, host: &HostId) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    /// Drop staged changes and re-read the durable content
    fn reload(&mut self) -> Result<(), StoreError>;
}

/// In-memory progress store
#[derive(Debug, Default, Clone)]
pub struct MemoryProgressStore {
    staged: ProgressMap,
    committed: ProgressMap,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose initial content is already committed
    pub fn with_records(records: impl IntoIterator<Item = ProgressRecord>) -> Self {
        let map: ProgressMap = records
            .into_iter()
            .map(|r| (r.host_id.clone(), r))
            .collect();
        Self {
            staged: map.clone(),
            committed: map,
        }
    }

    /// Content as of the last commit
    pub fn committed(&self) -> &ProgressMap {
        &self.committed
    }
}

impl ProgressStore for MemoryProgressStore {
    fn fetch_all(&self) -> Result<ProgressMap, StoreError> {
        Ok(self.staged.clone())
    }

    fn put(&mut self, host: &HostId, record: ProgressRecord) -> Result<(), StoreError> {
        self.staged.insert(host.clone(), record);
        Ok(())
    }

    fn delete(&mut self, host: &HostId) -> Result<(), StoreError> {
        self.staged.remove(host);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.committed = self.staged.clone();
        Ok(())
    }

    fn reload(&mut self) -> Result<(), StoreError> {
        self.staged = self.committed.clone();
        Ok(())
    }
}
