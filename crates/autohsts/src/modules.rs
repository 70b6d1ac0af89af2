//! Web-server module enablement
//!
//! The HSTS header needs the header-processing module and the TLS module.
//! Activating a module is its own side effect and is persisted right away,
//! independent of the virtual host tree commit.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlEntry, KdlNode};
use tracing::{debug, info};

use crate::error::ModuleError;

/// Header-processing module
pub const HEADERS_MODULE: &str = "headers_module";

/// TLS module
pub const SSL_MODULE: &str = "ssl_module";

/// Modules that must be active before an HSTS header is added
pub const REQUIRED_MODULES: [&str; 2] = [HEADERS_MODULE, SSL_MODULE];

/// Query and activate web-server modules
pub trait ModuleRegistry {
    fn is_active(&self, name: &str) -> bool;

    fn activate(&mut self, name: &str) -> Result<(), ModuleError>;
}

/// Module list kept as `module "<name>"` nodes in a KDL file
#[derive(Debug, Clone, Default)]
pub struct FileModuleRegistry {
    path: Option<PathBuf>,
    active: BTreeSet<String>,
}

impl FileModuleRegistry {
    /// Load the module list; a missing file means nothing is active
    pub fn load(path: &Path) -> Result<Self, ModuleError> {
        let active = if path.exists() {
            let content = fs::read_to_string(path)?;
            let doc: KdlDocument = content
                .parse()
                .map_err(|e: kdl::KdlError| ModuleError::Parse(e.to_string()))?;

            doc.nodes()
                .iter()
                .filter(|node| node.name().value() == "module")
                .filter_map(|node| node.entries().first())
                .filter_map(|entry| entry.value().as_string())
                .map(str::to_string)
                .collect()
        } else {
            BTreeSet::new()
        };

        debug!(
            modules_path = %path.display(),
            active = active.len(),
            "Loaded module list"
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            active,
        })
    }

    /// Registry held only in memory
    pub fn in_memory<I, S>(active: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: None,
            active: active.into_iter().map(Into::into).collect(),
        }
    }

    /// Active modules, sorted by name
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    fn persist(&self, path: &Path) -> Result<(), ModuleError> {
        let mut doc = KdlDocument::new();
        for name in &self.active {
            let mut node = KdlNode::new("module");
            node.push(KdlEntry::new(name.clone()));
            doc.nodes_mut().push(node);
        }
        doc.autoformat();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to temp file then rename for atomicity
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "modules.kdl".to_string());
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));
        fs::write(&tmp_path, doc.to_string())?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl ModuleRegistry for FileModuleRegistry {
    fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    fn activate(&mut self, name: &str) -> Result<(), ModuleError> {
        if !self.active.insert(name.to_string()) {
            return Ok(());
        }

        if let Some(path) = &self.path {
            self.persist(path)?;
        }

        info!(module = name, "Enabled web-server module");
        Ok(())
    }
}
