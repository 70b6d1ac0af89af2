//! Making the max-age permanent after a renewal.

use tracing::{debug, info};

use autohsts_common::HostId;

use super::AutoHsts;
use crate::clock::Clock;
use crate::directive::DirectiveAccessor;
use crate::error::HstsResult;
use crate::header;
use crate::modules::ModuleRegistry;
use crate::progress::{ProgressRecord, ProgressStore};
use crate::renewal::Lineage;

/// Result of one promotion attempt for one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// The host has no progress record
    Untracked,
    /// The host has not reached the last step yet
    NotDue,
    /// The renewed certificate is not the one this host serves
    NotInLineage,
    /// Header set to the permanent value and tracking stopped
    Promoted { max_age: u64 },
}

/// Summary of promotions after one renewal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub promoted: Vec<HostId>,
    pub not_due: Vec<HostId>,
    pub not_in_lineage: Vec<HostId>,
}

impl<T, M, S, C> AutoHsts<T, M, S, C>
where
    T: DirectiveAccessor,
    M: ModuleRegistry,
    S: ProgressStore,
    C: Clock,
{
    /// Make the host's max-age permanent if it sits on the last step
    ///
    /// Returns without writing to the store when nothing is tracked.
    pub fn promote_if_due(&mut self, host: &HostId, lineage: &Lineage) -> HstsResult<PromoteOutcome> {
        let records = self.store.fetch_all()?;
        if records.is_empty() {
            return Ok(PromoteOutcome::Untracked);
        }

        match records.get(host) {
            Some(record) => self.promote_record(record, lineage),
            None => Ok(PromoteOutcome::Untracked),
        }
    }

    /// Run [`promote_if_due`](Self::promote_if_due) for every tracked host
    pub fn deploy(&mut self, lineage: &Lineage) -> HstsResult<DeployReport> {
        let records = self.store.fetch_all()?;
        if records.is_empty() {
            debug!(lineage = %lineage.id, "No hosts tracked by AutoHSTS");
            return Ok(DeployReport::default());
        }

        let mut report = DeployReport::default();
        for (host, record) in &records {
            match self.promote_record(record, lineage)? {
                PromoteOutcome::Promoted { .. } => report.promoted.push(host.clone()),
                PromoteOutcome::NotDue => report.not_due.push(host.clone()),
                PromoteOutcome::NotInLineage => report.not_in_lineage.push(host.clone()),
                PromoteOutcome::Untracked => {}
            }
        }

        if !report.promoted.is_empty() {
            info!(
                lineage = %lineage.id,
                promoted = report.promoted.len(),
                "Made HSTS max-age permanent"
            );
        }
        Ok(report)
    }

    fn promote_record(&mut self, record: &ProgressRecord, lineage: &Lineage) -> HstsResult<PromoteOutcome> {
        record.check(&self.schedule)?;
        let host = &record.host_id;

        if record.current_index != self.schedule.last_index() {
            debug!(
                host = %host,
                step = record.current_index,
                "HSTS max-age not at last step, not making permanent"
            );
            return Ok(PromoteOutcome::NotDue);
        }

        let path = self.tree.resolve_host(host)?;
        if !header::uses_key_file(&self.tree, &path, &lineage.key_path_str())? {
            debug!(
                host = %host,
                lineage = %lineage.id,
                "Host not served by the renewed certificate"
            );
            return Ok(PromoteOutcome::NotInLineage);
        }

        let permanent = self.schedule.permanent();
        self.transaction(|m| {
            m.write_max_age(&path, permanent)?;
            m.store.delete(host)?;
            Ok(())
        })?;

        info!(
            host = %host,
            max_age = permanent,
            "Strict-Transport-Security max-age made permanent"
        );
        Ok(PromoteOutcome::Promoted { max_age: permanent })
    }
}
