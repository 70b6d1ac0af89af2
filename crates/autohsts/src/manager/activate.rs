//! Turning AutoHSTS on for a host.

use tracing::{debug, info};

use autohsts_common::HostId;

use super::AutoHsts;
use crate::clock::Clock;
use crate::directive::DirectiveAccessor;
use crate::error::{HstsError, HstsResult};
use crate::header;
use crate::modules::{ModuleRegistry, REQUIRED_MODULES};
use crate::progress::{ProgressRecord, ProgressStore};

impl<T, M, S, C> AutoHsts<T, M, S, C>
where
    T: DirectiveAccessor,
    M: ModuleRegistry,
    S: ProgressStore,
    C: Clock,
{
    /// Add an HSTS header with the first schedule value and start tracking
    ///
    /// Missing prerequisite modules are activated first. Fails with
    /// [`HstsError::AlreadyEnabled`] without touching the header when the
    /// host already has one.
    pub fn activate(&mut self, host: &HostId) -> HstsResult<ProgressRecord> {
        let path = self.tree.resolve_host(host)?;

        self.ensure_modules()?;

        if !header::is_tls_host(&self.tree, &path)? {
            return Err(HstsError::NotTlsHost { host: host.clone() });
        }

        if !header::hsts_headers(&self.tree, &path)?.is_empty() {
            debug!(host = %host, "Strict-Transport-Security header already present");
            return Err(HstsError::AlreadyEnabled { host: host.clone() });
        }

        let first = self.schedule.first();
        let record = self.transaction(|m| {
            m.tree.add(
                &path,
                header::HEADER_DIRECTIVE,
                &header::header_args(first.max_age),
            )?;

            let record = ProgressRecord::new(host.clone(), m.clock.now());
            m.store.put(host, record.clone())?;
            Ok(record)
        })?;

        info!(
            host = %host,
            max_age = first.max_age,
            "Added gradually increasing HSTS header"
        );
        Ok(record)
    }

    fn ensure_modules(&mut self) -> HstsResult<()> {
        for module in REQUIRED_MODULES {
            if !self.modules.is_active(module) {
                debug!(module, "Required module inactive, enabling");
                self.modules.activate(module)?;
            }
        }
        Ok(())
    }
}
