//! Common types shared across the AutoHSTS crates.

pub mod ids;
pub mod logging;

pub use ids::{HostId, LineageId};
pub use logging::LogFormat;
