//! Configuration loading and validation for AutoHSTS
//!
//! The configuration carries the rollout knobs (gating frequency, the
//! ordered max-age steps and the permanent value) and the locations of the
//! virtual host tree, the module list and the progress storage.
//!
//! # Example
//!
//! ```kdl
//! autohsts {
//!     frequency-secs 172800
//!     steps 60 300 900 3600 21600 43200 86400
//!     permanent-secs 31536000
//! }
//!
//! paths {
//!     vhosts "/etc/autohsts/vhosts.kdl"
//!     modules "/etc/autohsts/modules.kdl"
//!     storage "/var/lib/autohsts"
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::Validate;

pub mod kdl;
pub mod validate;

pub use validate::{lint_config, ValidationResult, ValidationWarning};

// ============================================================================
// Defaults
// ============================================================================

/// Minimum time between two max-age increases (two days)
pub const DEFAULT_FREQUENCY_SECS: u64 = 172_800;

/// Max-age steps walked through before the value is made permanent
pub const DEFAULT_STEPS: [u64; 7] = [60, 300, 900, 3600, 21_600, 43_200, 86_400];

/// Permanent max-age (one year)
pub const DEFAULT_PERMANENT_SECS: u64 = 31_536_000;

fn default_frequency_secs() -> u64 {
    DEFAULT_FREQUENCY_SECS
}

fn default_steps() -> Vec<u64> {
    DEFAULT_STEPS.to_vec()
}

fn default_permanent_secs() -> u64 {
    DEFAULT_PERMANENT_SECS
}

fn default_vhosts_path() -> PathBuf {
    PathBuf::from("/etc/autohsts/vhosts.kdl")
}

fn default_modules_path() -> PathBuf {
    PathBuf::from("/etc/autohsts/modules.kdl")
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/lib/autohsts")
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Errors raised when a loaded configuration is not usable
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    Invalid(String),

    #[error("Invalid autohsts schedule: {0}")]
    Schedule(#[from] ScheduleError),
}

/// Rule violations of a max-age step schedule
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("step schedule must contain at least one value")]
    Empty,

    #[error("step values must be greater than zero")]
    ZeroStep,

    #[error("step values must be strictly increasing ({previous} is followed by {next})")]
    NotIncreasing { previous: u64, next: u64 },

    #[error("permanent value {permanent} must be greater than the last step {last}")]
    PermanentTooSmall { permanent: u64, last: u64 },
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Rollout knobs
    #[serde(default)]
    #[validate(nested)]
    pub autohsts: AutoHstsSettings,

    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,
}

/// HSTS rollout knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct AutoHstsSettings {
    /// Minimum number of seconds between two increases for one host
    #[serde(default = "default_frequency_secs")]
    pub frequency_secs: u64,

    /// Strictly increasing max-age values, applied one per increase
    #[serde(default = "default_steps")]
    #[validate(length(min = 1))]
    pub steps: Vec<u64>,

    /// Max-age committed once the steps are exhausted
    #[serde(default = "default_permanent_secs")]
    #[validate(range(min = 1))]
    pub permanent_secs: u64,
}

impl Default for AutoHstsSettings {
    fn default() -> Self {
        Self {
            frequency_secs: default_frequency_secs(),
            steps: default_steps(),
            permanent_secs: default_permanent_secs(),
        }
    }
}

/// Locations of the files AutoHSTS reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Virtual host tree
    #[serde(default = "default_vhosts_path")]
    pub vhosts: PathBuf,

    /// Enabled web-server modules
    #[serde(default = "default_modules_path")]
    pub modules: PathBuf,

    /// Directory holding the progress store
    #[serde(default = "default_storage_path")]
    pub storage: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            vhosts: default_vhosts_path(),
            modules: default_modules_path(),
            storage: default_storage_path(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Load configuration from a file, picking the format from its extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("kdl");

        match extension {
            "kdl" => Self::from_kdl(&content),
            "json" => Self::from_json(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(anyhow::anyhow!("Unsupported config format: {}", extension)),
        }
    }

    /// Parse configuration from KDL format
    pub fn from_kdl(content: &str) -> Result<Self> {
        let doc: ::kdl::KdlDocument = content
            .parse()
            .map_err(|e: ::kdl::KdlError| anyhow::anyhow!("{}", kdl::render_parse_error(content, &e)))?;

        kdl::parse_kdl_document(doc)
    }

    /// Parse configuration from JSON format
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON configuration")
    }

    /// Parse configuration from TOML format
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        Validate::validate(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.autohsts.validate_schedule()
    }
}

impl AutoHstsSettings {
    /// Check the ordering constraints the derive cannot express
    pub fn validate_schedule(&self) -> Result<(), ConfigError> {
        check_schedule(&self.steps, self.permanent_secs)?;
        Ok(())
    }
}

/// Check a step list and its permanent value
///
/// Steps must be non-empty, non-zero and strictly increasing, and the
/// permanent value must exceed the last step.
pub fn check_schedule(steps: &[u64], permanent: u64) -> Result<(), ScheduleError> {
    let Some(&last) = steps.last() else {
        return Err(ScheduleError::Empty);
    };

    if steps.contains(&0) {
        return Err(ScheduleError::ZeroStep);
    }

    if let Some(pair) = steps.windows(2).find(|w| w[0] >= w[1]) {
        return Err(ScheduleError::NotIncreasing {
            previous: pair[0],
            next: pair[1],
        });
    }

    if permanent <= last {
        return Err(ScheduleError::PermanentTooSmall { permanent, last });
    }

    Ok(())
}
