//! AutoHSTS and paths KDL parsing.

use anyhow::Result;
use std::path::PathBuf;
use tracing::trace;

use crate::{AutoHstsSettings, PathsConfig};

use super::{get_int_args, get_int_entry, get_string_entry, to_secs};

/// Parse the `autohsts` block
pub fn parse_autohsts_settings(node: &kdl::KdlNode) -> Result<AutoHstsSettings> {
    trace!("Parsing autohsts configuration block");

    let defaults = AutoHstsSettings::default();

    let frequency_secs = match get_int_entry(node, "frequency-secs")? {
        Some(v) => to_secs("frequency-secs", v)?,
        None => defaults.frequency_secs,
    };

    let steps = match get_int_args(node, "steps")? {
        Some(values) => values
            .into_iter()
            .map(|v| to_secs("steps", v))
            .collect::<Result<Vec<_>>>()?,
        None => defaults.steps,
    };

    let permanent_secs = match get_int_entry(node, "permanent-secs")? {
        Some(v) => to_secs("permanent-secs", v)?,
        None => defaults.permanent_secs,
    };

    let settings = AutoHstsSettings {
        frequency_secs,
        steps,
        permanent_secs,
    };

    trace!(
        frequency_secs = settings.frequency_secs,
        step_count = settings.steps.len(),
        permanent_secs = settings.permanent_secs,
        "Parsed autohsts configuration"
    );

    Ok(settings)
}

/// Parse the `paths` block
pub fn parse_paths_config(node: &kdl::KdlNode) -> Result<PathsConfig> {
    trace!("Parsing paths configuration block");

    let defaults = PathsConfig::default();

    Ok(PathsConfig {
        vhosts: get_string_entry(node, "vhosts")
            .map(PathBuf::from)
            .unwrap_or(defaults.vhosts),
        modules: get_string_entry(node, "modules")
            .map(PathBuf::from)
            .unwrap_or(defaults.modules),
        storage: get_string_entry(node, "storage")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage),
    })
}
