//! Gated max-age increases.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use autohsts_common::HostId;

use super::AutoHsts;
use crate::clock::Clock;
use crate::directive::DirectiveAccessor;
use crate::error::HstsResult;
use crate::modules::ModuleRegistry;
use crate::progress::{ProgressRecord, ProgressStore};

/// Result of one advance attempt for one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The host has no progress record
    Untracked,
    /// Too soon since the last increase
    Gated,
    /// Already on the last step; waiting for promotion
    AtFinalStep,
    /// Header rewritten to the next step
    Advanced { index: usize, max_age: u64 },
}

/// Summary of an update cycle over all tracked hosts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub advanced: Vec<HostId>,
    pub gated: Vec<HostId>,
    pub at_final_step: Vec<HostId>,
}

impl UpdateReport {
    pub fn is_empty(&self) -> bool {
        self.advanced.is_empty() && self.gated.is_empty() && self.at_final_step.is_empty()
    }
}

impl<T, M, S, C> AutoHsts<T, M, S, C>
where
    T: DirectiveAccessor,
    M: ModuleRegistry,
    S: ProgressStore,
    C: Clock,
{
    /// Move one host a step up the schedule if its gate is open
    ///
    /// Returns without reading the clock when nothing is tracked.
    pub fn advance(&mut self, host: &HostId) -> HstsResult<AdvanceOutcome> {
        let records = self.store.fetch_all()?;
        if records.is_empty() {
            return Ok(AdvanceOutcome::Untracked);
        }

        let Some(record) = records.get(host) else {
            debug!(host = %host, "Host not tracked by AutoHSTS");
            return Ok(AdvanceOutcome::Untracked);
        };

        let now = self.clock.now();
        self.advance_record(record, now)
    }

    /// Run [`advance`](Self::advance) for every tracked host
    ///
    /// Hosts are handled in id order and each commits on its own. The first
    /// error stops the cycle; hosts advanced before it stay committed.
    pub fn update_all(&mut self) -> HstsResult<UpdateReport> {
        let records = self.store.fetch_all()?;
        if records.is_empty() {
            debug!("No hosts tracked by AutoHSTS");
            return Ok(UpdateReport::default());
        }

        let now = self.clock.now();
        let mut report = UpdateReport::default();

        for (host, record) in &records {
            match self.advance_record(record, now)? {
                AdvanceOutcome::Advanced { .. } => report.advanced.push(host.clone()),
                AdvanceOutcome::Gated => report.gated.push(host.clone()),
                AdvanceOutcome::AtFinalStep => report.at_final_step.push(host.clone()),
                AdvanceOutcome::Untracked => {}
            }
        }

        info!(
            advanced = report.advanced.len(),
            gated = report.gated.len(),
            at_final_step = report.at_final_step.len(),
            "AutoHSTS update cycle finished"
        );
        Ok(report)
    }

    fn advance_record(
        &mut self,
        record: &ProgressRecord,
        now: DateTime<Utc>,
    ) -> HstsResult<AdvanceOutcome> {
        record.check(&self.schedule)?;
        let host = &record.host_id;

        if !record.gate_open(now, self.frequency) {
            debug!(
                host = %host,
                last_updated = %record.last_updated,
                "Skipping HSTS increase, last increase too recent"
            );
            return Ok(AdvanceOutcome::Gated);
        }

        let Some(next) = self.schedule.next_after(record.current_index) else {
            debug!(host = %host, "HSTS max-age at last step, waiting for renewal");
            return Ok(AdvanceOutcome::AtFinalStep);
        };

        self.transaction(|m| {
            let path = m.tree.resolve_host(host)?;
            m.write_max_age(&path, next.max_age)?;
            m.store.put(host, record.advanced(now))?;
            Ok(())
        })?;

        info!(
            host = %host,
            max_age = next.max_age,
            step = next.index,
            "Increased HSTS max-age"
        );
        Ok(AdvanceOutcome::Advanced {
            index: next.index,
            max_age: next.max_age,
        })
    }
}
