//! Directive access on a parsed web-server configuration tree
//!
//! Locations are structured values (host, directive index, argument index)
//! rather than textual paths. They are only valid until the next structural
//! change (`add`/`remove`) to the same host.

use std::fmt;

use autohsts_common::HostId;

use crate::error::TreeError;

/// A resolved virtual host block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPath {
    /// Position of the block in the tree
    pub index: usize,
    /// Identifier the block was resolved from
    pub id: HostId,
}

/// One argument of one directive inside a virtual host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveLocation {
    pub host: HostPath,
    /// Position of the directive among the host's directives
    pub directive: usize,
    /// Position of the argument among the directive's arguments
    pub arg: usize,
}

impl DirectiveLocation {
    /// The argument right after this one in the same directive
    pub fn next_arg(&self) -> Self {
        Self {
            host: self.host.clone(),
            directive: self.directive,
            arg: self.arg + 1,
        }
    }
}

impl fmt::Display for DirectiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/directive[{}]/arg[{}]",
            self.host.id, self.directive, self.arg
        )
    }
}

/// Lookup and mutation of directives for virtual hosts
pub trait DirectiveAccessor {
    /// Resolve a host id to exactly one block
    fn resolve_host(&self, host: &HostId) -> Result<HostPath, TreeError>;

    /// Locate arguments of directives called `name` inside `host`
    ///
    /// Name and `arg` comparisons are case-insensitive. With `arg` set, only
    /// arguments equal to it are returned; otherwise every argument of every
    /// matching directive is.
    fn find(
        &self,
        name: &str,
        arg: Option<&str>,
        host: &HostPath,
    ) -> Result<Vec<DirectiveLocation>, TreeError>;

    /// Argument value, or `None` when the directive has fewer arguments
    fn get(&self, location: &DirectiveLocation) -> Result<Option<String>, TreeError>;

    fn set(&mut self, location: &DirectiveLocation, value: &str) -> Result<(), TreeError>;

    /// Append a directive to the host
    fn add(&mut self, host: &HostPath, name: &str, args: &[String]) -> Result<(), TreeError>;

    /// Remove the whole directive that `location` points into
    fn remove(&mut self, location: &DirectiveLocation) -> Result<(), TreeError>;

    /// Persist all pending changes
    fn commit(&mut self) -> Result<(), TreeError>;

    /// Drop uncommitted changes and re-read the persisted tree
    ///
    /// Any location obtained before the reload must be resolved again.
    fn reload(&mut self) -> Result<(), TreeError>;
}
