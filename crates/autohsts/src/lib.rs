//! AutoHSTS Library
//!
//! Gradual rollout of the `Strict-Transport-Security` header for virtual
//! hosts of a web server whose certificates are renewed automatically.
//!
//! A host starts with a short `max-age`. Each periodic cycle raises it one
//! step along a fixed schedule, at most once per configured frequency. Once
//! the last step is reached, the next successful renewal of the host's
//! certificate makes the value permanent and tracking stops.
//!
//! - **Manager**: [`AutoHsts`] with activate, advance and promote operations
//! - **Collaborators**: [`DirectiveAccessor`], [`ModuleRegistry`],
//!   [`ProgressStore`] and [`Clock`] traits with file-backed implementations
//! - **Renewal**: [`RenewalHooks`] and the background [`RenewalScheduler`]
//!
//! # Example
//!
//! ```ignore
//! use autohsts::{AutoHsts, FileModuleRegistry, FileProgressStore, KdlVhostTree, StepSchedule};
//!
//! let tree = KdlVhostTree::load(Path::new("/etc/autohsts/vhosts.kdl"))?;
//! let modules = FileModuleRegistry::load(Path::new("/etc/autohsts/modules.kdl"))?;
//! let store = FileProgressStore::open(Path::new("/var/lib/autohsts"))?;
//!
//! let mut manager = AutoHsts::new(tree, modules, store, StepSchedule::default());
//! manager.activate(&"example.com".into())?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod clock;
pub mod directive;
pub mod error;
pub mod header;
pub mod manager;
pub mod modules;
pub mod progress;
pub mod renewal;
pub mod schedule;
pub mod scheduler;
pub mod storage;
pub mod vhost_tree;

// ============================================================================
// Public API Re-exports
// ============================================================================

pub use clock::{Clock, SystemClock};
pub use directive::{DirectiveAccessor, DirectiveLocation, HostPath};
pub use error::{HstsError, HstsResult, ModuleError, ScheduleError, StoreError, TreeError};
pub use manager::{
    AdvanceOutcome, AutoHsts, DeployReport, HostStatus, PromoteOutcome, UpdateReport,
};
pub use modules::{FileModuleRegistry, ModuleRegistry};
pub use progress::{MemoryProgressStore, ProgressMap, ProgressRecord, ProgressStore};
pub use renewal::{Lineage, RenewalEvent, RenewalHooks, RenewalOutcome};
pub use schedule::{Step, StepSchedule};
pub use scheduler::RenewalScheduler;
pub use storage::FileProgressStore;
pub use vhost_tree::KdlVhostTree;

pub use autohsts_common::{HostId, LineageId};
