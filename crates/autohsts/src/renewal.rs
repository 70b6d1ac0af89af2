//! Certificate renewal notifications
//!
//! The renewal side knows nothing about headers: it reports periodic
//! cycles and finished renewals through [`RenewalHooks`].

use std::path::PathBuf;

use tracing::warn;

use autohsts_common::LineageId;

use crate::clock::Clock;
use crate::directive::DirectiveAccessor;
use crate::error::HstsResult;
use crate::manager::{AutoHsts, DeployReport, UpdateReport};
use crate::modules::ModuleRegistry;
use crate::progress::ProgressStore;

/// A certificate's renewal identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub id: LineageId,
    /// Private key served by hosts using this certificate
    pub key_path: PathBuf,
}

impl Lineage {
    pub fn new(id: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            id: LineageId::new(id),
            key_path: key_path.into(),
        }
    }

    /// Key path as it appears in the configuration tree
    pub fn key_path_str(&self) -> String {
        self.key_path.to_string_lossy().into_owned()
    }
}

/// How a renewal attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    Succeeded,
    Failed { reason: String },
}

/// Notification sent once a renewal attempt for a lineage is over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalEvent {
    pub lineage: Lineage,
    pub outcome: RenewalOutcome,
}

impl RenewalEvent {
    pub fn succeeded(lineage: Lineage) -> Self {
        Self {
            lineage,
            outcome: RenewalOutcome::Succeeded,
        }
    }

    pub fn failed(lineage: Lineage, reason: impl Into<String>) -> Self {
        Self {
            lineage,
            outcome: RenewalOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// Callbacks invoked by a renewal workflow
pub trait RenewalHooks {
    /// Periodic cycle; increases are gated by frequency
    fn on_cycle(&mut self) -> HstsResult<UpdateReport>;

    /// A renewal attempt finished; `None` when nothing was attempted
    fn on_renewal(&mut self, event: &RenewalEvent) -> HstsResult<Option<DeployReport>>;
}

impl<T, M, S, C> RenewalHooks for AutoHsts<T, M, S, C>
where
    T: DirectiveAccessor,
    M: ModuleRegistry,
    S: ProgressStore,
    C: Clock,
{
    fn on_cycle(&mut self) -> HstsResult<UpdateReport> {
        self.refresh()?;
        self.update_all()
    }

    fn on_renewal(&mut self, event: &RenewalEvent) -> HstsResult<Option<DeployReport>> {
        match &event.outcome {
            RenewalOutcome::Succeeded => {
                self.refresh()?;
                self.deploy(&event.lineage).map(Some)
            }
            RenewalOutcome::Failed { reason } => {
                warn!(
                    lineage = %event.lineage.id,
                    reason = %reason,
                    "Certificate renewal failed, leaving HSTS max-age unchanged"
                );
                Ok(None)
            }
        }
    }
}
