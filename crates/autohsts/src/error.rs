//! AutoHSTS error types

use std::io;
use thiserror::Error;

use autohsts_common::HostId;

pub use autohsts_config::ScheduleError;

/// Result alias for the enhancement operations
pub type HstsResult<T> = Result<T, HstsError>;

/// Errors raised by the enhancement operations
#[derive(Debug, Error)]
pub enum HstsError {
    /// The host already carries a Strict-Transport-Security header
    #[error("Strict-Transport-Security header already present on virtual host '{host}'")]
    AlreadyEnabled { host: HostId },

    /// The store tracks the host but its header is gone
    #[error("AutoHSTS: unable to find the existing Strict-Transport-Security header on virtual host '{host}'")]
    MissingDirective { host: HostId },

    /// The header exists but its value has no usable max-age
    #[error("AutoHSTS: malformed Strict-Transport-Security value on virtual host '{host}': {value:?}")]
    MalformedDirective { host: HostId, value: String },

    /// More than one header directive would be rewritten
    #[error("AutoHSTS: virtual host '{host}' has {count} Strict-Transport-Security headers, expected one")]
    DuplicateDirective { host: HostId, count: usize },

    /// HSTS only makes sense on a host serving TLS
    #[error("Virtual host '{host}' does not serve TLS, refusing to enable AutoHSTS")]
    NotTlsHost { host: HostId },

    /// Stored progress does not fit the current schedule
    #[error("AutoHSTS: inconsistent progress record for virtual host '{host}': {reason}")]
    InconsistentRecord { host: HostId, reason: String },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl HstsError {
    /// Whether this is the informational "already enabled" outcome
    pub fn is_already_enabled(&self) -> bool {
        matches!(self, HstsError::AlreadyEnabled { .. })
    }
}

/// Errors raised by a directive accessor
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("No virtual host found with id '{host}'")]
    HostNotFound { host: HostId },

    #[error("Virtual host id '{host}' is ambiguous ({count} matching blocks)")]
    AmbiguousHost { host: HostId, count: usize },

    #[error("Invalid directive location: {0}")]
    InvalidLocation(String),

    #[error("Failed to parse virtual host configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by a module registry
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Failed to parse module list: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by a progress store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
