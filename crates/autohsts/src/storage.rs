//! File-backed progress store
//!
//! # Directory Structure
//!
//! ```text
//! storage/
//! └── autohsts.json     # host id -> progress record
//! ```
//!
//! Changes are staged in memory and written on commit through a temporary
//! file and a rename, so a crash never leaves a half-written store behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use autohsts_common::HostId;

use crate::error::StoreError;
use crate::progress::{ProgressMap, ProgressRecord, ProgressStore};

/// Name of the store file inside the storage directory
pub const STORE_FILE: &str = "autohsts.json";

/// Progress store persisted as a single JSON document
#[derive(Debug)]
pub struct FileProgressStore {
    /// Base storage directory
    base_path: PathBuf,
    /// Records including uncommitted changes
    records: ProgressMap,
    /// Whether `records` differs from disk
    dirty: bool,
}

impl FileProgressStore {
    /// Open the store at the given directory
    ///
    /// Creates the directory if it doesn't exist and sets restrictive
    /// permissions (0700 on Unix). Existing records are loaded eagerly.
    pub fn open(base_path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(base_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(base_path, fs::Permissions::from_mode(0o700))?;
        }

        let records = read_records(&base_path.join(STORE_FILE))?;

        Ok(Self {
            base_path: base_path.to_path_buf(),
            records,
            dirty: false,
        })
    }

    /// Get the storage base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn store_path(&self) -> PathBuf {
        self.base_path.join(STORE_FILE)
    }
}

impl ProgressStore for FileProgressStore {
    fn fetch_all(&self) -> Result<ProgressMap, StoreError> {
        Ok(self.records.clone())
    }

    fn put(&mut self, host: &HostId, record: ProgressRecord) -> Result<(), StoreError> {
        self.records.insert(host.clone(), record);
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, host: &HostId) -> Result<(), StoreError> {
        if self.records.remove(host).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            trace!("AutoHSTS progress unchanged, skipping write");
            return Ok(());
        }

        let store_path = self.store_path();
        let tmp_path = self.base_path.join(format!(".{}.tmp", STORE_FILE));
        let content = serde_json::to_string_pretty(&self.records)?;
        fs::write(&tmp_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, &store_path)?;
        self.dirty = false;

        info!(
            storage_path = %store_path.display(),
            host_count = self.records.len(),
            "Saved AutoHSTS progress"
        );
        Ok(())
    }

    fn reload(&mut self) -> Result<(), StoreError> {
        self.records = read_records(&self.store_path())?;
        self.dirty = false;
        Ok(())
    }
}

/// Read the store file; a missing file is an empty store
fn read_records(store_path: &Path) -> Result<ProgressMap, StoreError> {
    if !store_path.exists() {
        trace!(storage_path = %store_path.display(), "No stored AutoHSTS progress found");
        return Ok(ProgressMap::new());
    }

    let content = fs::read_to_string(store_path)?;
    let records: ProgressMap = serde_json::from_str(&content)?;
    debug!(
        storage_path = %store_path.display(),
        host_count = records.len(),
        "Loaded AutoHSTS progress"
    );
    Ok(records)
}
