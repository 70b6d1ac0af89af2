//! Background AutoHSTS update scheduler
//!
//! Periodically runs the gated update cycle. Increases are still gated
//! per host by the configured frequency; the interval here only bounds how
//! often the gate is looked at.

use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, error, info};

use crate::renewal::RenewalHooks;

/// Default check interval (12 hours)
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 3600);

/// Minimum check interval (1 hour)
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Background update scheduler
pub struct RenewalScheduler<H> {
    hooks: H,
    check_interval: Duration,
}

impl<H: RenewalHooks> RenewalScheduler<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            hooks,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the check interval
    ///
    /// The interval is clamped to a minimum of 1 hour to avoid
    /// excessive polling.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(MIN_CHECK_INTERVAL);
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Run the update loop
    ///
    /// This runs indefinitely; the first cycle runs immediately.
    pub async fn run(mut self) {
        info!(
            check_interval_hours = self.check_interval.as_secs() / 3600,
            "Starting AutoHSTS update scheduler"
        );

        let mut interval = interval(self.check_interval);

        loop {
            interval.tick().await;
            debug!("Running scheduled AutoHSTS update");
            self.run_cycle();
        }
    }

    /// Run one cycle, logging instead of propagating errors
    pub fn run_cycle(&mut self) {
        let start = Instant::now();

        match self.hooks.on_cycle() {
            Ok(report) => {
                debug!(
                    advanced = report.advanced.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "AutoHSTS update completed"
                );
            }
            Err(e) => {
                error!(error = %e, "AutoHSTS update failed");
            }
        }
    }
}

impl<H> std::fmt::Debug for RenewalScheduler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("check_interval", &self.check_interval)
            .finish()
    }
}
