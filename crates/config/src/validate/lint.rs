//! Configuration linting for best practices
//!
//! Checks the rollout knobs for values that are valid but risky.

use super::{ValidationResult, ValidationWarning};
use crate::Config;

/// One day in seconds
const ONE_DAY_SECS: u64 = 86_400;

/// Minimum max-age accepted by the HSTS preload list
const PRELOAD_MIN_SECS: u64 = 31_536_000;

/// Lint configuration for best practices
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    let settings = &config.autohsts;

    // A long first step defeats the point of a gradual rollout
    if let Some(&first) = settings.steps.first() {
        if first > ONE_DAY_SECS {
            result.add_warning(ValidationWarning::new(format!(
                "First HSTS step is {} seconds (more than one day); a misconfiguration would lock clients out for that long",
                first
            )));
        }
    }

    if settings.permanent_secs < PRELOAD_MIN_SECS {
        result.add_warning(ValidationWarning::new(format!(
            "Permanent max-age {} is below one year ({}), the minimum for HSTS preloading",
            settings.permanent_secs, PRELOAD_MIN_SECS
        )));
    }

    if settings.frequency_secs == 0 {
        result.add_warning(ValidationWarning::new(
            "frequency-secs is 0: max-age will increase on every update run".to_string(),
        ));
    }

    result
}
