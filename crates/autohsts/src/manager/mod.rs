//! Gradual HSTS enablement for virtual hosts
//!
//! [`AutoHsts`] ties the collaborators together:
//!
//! - enabling adds the header with the first schedule value and starts
//!   tracking the host ([`AutoHsts::activate`])
//! - each gated update cycle moves tracked hosts one step up the schedule
//!   ([`AutoHsts::advance`], [`AutoHsts::update_all`])
//! - each successful renewal makes hosts that sit on the last step
//!   permanent and stops tracking them ([`AutoHsts::promote_if_due`],
//!   [`AutoHsts::deploy`])
//!
//! Every mutating operation ends by committing the tree and then the
//! progress store. When any step of it fails, staged changes in both are
//! dropped by reloading them, so a failing host leaves nothing half-written
//! behind for a later commit to pick up.

mod activate;
mod advance;
mod promote;

pub use advance::{AdvanceOutcome, UpdateReport};
pub use promote::{DeployReport, PromoteOutcome};

use std::time::Duration;

use tracing::warn;

use autohsts_common::HostId;

use crate::clock::{Clock, SystemClock};
use crate::directive::{DirectiveAccessor, DirectiveLocation, HostPath};
use crate::error::{HstsError, HstsResult};
use crate::header;
use crate::modules::ModuleRegistry;
use crate::progress::{ProgressRecord, ProgressStore};
use crate::schedule::StepSchedule;

/// Default minimum time between two increases (two days)
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(autohsts_config::DEFAULT_FREQUENCY_SECS);

/// Tracked host as reported by [`AutoHsts::status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStatus {
    pub record: ProgressRecord,
    /// Max-age the header should currently carry
    pub max_age: u64,
    /// Whether the next successful renewal makes the value permanent
    pub due_for_promotion: bool,
}

/// HSTS rollout manager
pub struct AutoHsts<T, M, S, C = SystemClock> {
    tree: T,
    modules: M,
    store: S,
    clock: C,
    schedule: StepSchedule,
    frequency: Duration,
}

impl<T, M, S> AutoHsts<T, M, S, SystemClock>
where
    T: DirectiveAccessor,
    M: ModuleRegistry,
    S: ProgressStore,
{
    /// Create a manager using wall-clock time and the default frequency
    pub fn new(tree: T, modules: M, store: S, schedule: StepSchedule) -> Self {
        Self {
            tree,
            modules,
            store,
            clock: SystemClock,
            schedule,
            frequency: DEFAULT_FREQUENCY,
        }
    }
}

impl<T, M, S, C> AutoHsts<T, M, S, C>
where
    T: DirectiveAccessor,
    M: ModuleRegistry,
    S: ProgressStore,
    C: Clock,
{
    /// Set the minimum time between two increases for one host
    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = frequency;
        self
    }

    /// Replace the time source
    pub fn with_clock<C2: Clock>(self, clock: C2) -> AutoHsts<T, M, S, C2> {
        AutoHsts {
            tree: self.tree,
            modules: self.modules,
            store: self.store,
            clock,
            schedule: self.schedule,
            frequency: self.frequency,
        }
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    pub fn modules(&self) -> &M {
        &self.modules
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn schedule(&self) -> &StepSchedule {
        &self.schedule
    }

    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    /// Tracked hosts with the max-age their header should carry
    pub fn status(&self) -> HstsResult<Vec<HostStatus>> {
        self.store
            .fetch_all()?
            .into_values()
            .map(|record| {
                record.check(&self.schedule)?;
                let step = self.schedule.step(record.current_index).ok_or_else(|| {
                    HstsError::InconsistentRecord {
                        host: record.host_id.clone(),
                        reason: "schedule index out of range".to_string(),
                    }
                })?;
                Ok(HostStatus {
                    max_age: step.max_age,
                    due_for_promotion: step.is_last,
                    record,
                })
            })
            .collect()
    }

    /// Current max-age written in the host's HSTS header, if any
    pub fn current_max_age(&self, host: &HostId) -> HstsResult<Option<u64>> {
        let path = self.tree.resolve_host(host)?;
        if header::hsts_headers(&self.tree, &path)?.is_empty() {
            return Ok(None);
        }
        let (_, value) = self.hsts_value(&path)?;
        Ok(header::parse_max_age(&value))
    }

    /// Location and raw value of the single HSTS header value of `host`
    fn hsts_value(&self, host: &HostPath) -> HstsResult<(DirectiveLocation, String)> {
        let headers = header::hsts_headers(&self.tree, host)?;

        let name_location = match headers.as_slice() {
            [only] => only,
            [] => {
                return Err(HstsError::MissingDirective {
                    host: host.id.clone(),
                })
            }
            _ => {
                return Err(HstsError::DuplicateDirective {
                    host: host.id.clone(),
                    count: headers.len(),
                })
            }
        };

        let value_location = name_location.next_arg();
        let value = self
            .tree
            .get(&value_location)?
            .ok_or_else(|| HstsError::MalformedDirective {
                host: host.id.clone(),
                value: String::new(),
            })?;

        Ok((value_location, value))
    }

    /// Rewrite the max-age of the host's HSTS header in place
    ///
    /// Nothing is written when the current value cannot be rewritten.
    fn write_max_age(&mut self, host: &HostPath, max_age: u64) -> HstsResult<()> {
        let (location, value) = self.hsts_value(host)?;
        let rewritten =
            header::rewrite_max_age(&value, max_age).ok_or_else(|| HstsError::MalformedDirective {
                host: host.id.clone(),
                value,
            })?;

        self.tree.set(&location, &rewritten)?;
        Ok(())
    }

    /// Re-read tree and store, dropping anything staged
    ///
    /// Long-lived managers call this before each cycle so that changes
    /// written by other processes are not overwritten.
    pub fn refresh(&mut self) -> HstsResult<()> {
        self.tree.reload()?;
        self.store.reload()?;
        Ok(())
    }

    /// Run `mutate` and commit tree then store
    ///
    /// On error staged changes are dropped and the original error returned.
    fn transaction<R>(&mut self, mutate: impl FnOnce(&mut Self) -> HstsResult<R>) -> HstsResult<R> {
        let result = mutate(self).and_then(|value| {
            self.tree.commit()?;
            self.store.commit()?;
            Ok(value)
        });

        if result.is_err() {
            self.discard_staged();
        }
        result
    }

    fn discard_staged(&mut self) {
        if let Err(e) = self.tree.reload() {
            warn!(error = %e, "Failed to drop staged virtual host changes");
        }
        if let Err(e) = self.store.reload() {
            warn!(error = %e, "Failed to drop staged AutoHSTS progress");
        }
    }
}
