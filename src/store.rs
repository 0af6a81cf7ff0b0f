//! Stack specification storage
//!
//! Specifications are authored elsewhere and looked up by name. A missing
//! name is reported as [`Error::ConfigNotFound`] carrying
//! [`NO_ROWS_MESSAGE`], whatever the backing store.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Message reported for a name with no stored specification
pub const NO_ROWS_MESSAGE: &str = "no rows in result set";

/// File extension of specifications in a [`FileSpecStore`]
pub const SPEC_EXTENSION: &str = "yaml";

/// Read-only lookup of specification text by name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Return the specification text stored under `name`
    async fn lookup_by_name(&self, name: &str) -> Result<String, Error>;
}

fn not_found(name: &str) -> Error {
    Error::config_not_found(name, NO_ROWS_MESSAGE)
}

/// Specifications stored as `<dir>/<name>.yaml`
#[derive(Clone, Debug)]
pub struct FileSpecStore {
    dir: PathBuf,
}

impl FileSpecStore {
    /// Serve specifications from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory specifications are read from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for `name`, or None if the name could escape the directory
    fn path_for(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        Some(self.dir.join(format!("{name}.{SPEC_EXTENSION}")))
    }
}

#[async_trait]
impl SpecStore for FileSpecStore {
    async fn lookup_by_name(&self, name: &str) -> Result<String, Error> {
        let path = self.path_for(name).ok_or_else(|| not_found(name))?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                debug!(stack = %name, path = %path.display(), "specification read");
                Ok(text)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found(name)),
            Err(e) => Err(Error::storage(name, e)),
        }
    }
}

/// Specifications held in memory
#[derive(Clone, Debug, Default)]
pub struct StaticSpecStore {
    specs: BTreeMap<String, String>,
}

impl StaticSpecStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a specification
    pub fn with_spec(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.specs.insert(name.into(), text.into());
        self
    }
}

#[async_trait]
impl SpecStore for StaticSpecStore {
    async fn lookup_by_name(&self, name: &str) -> Result<String, Error> {
        self.specs.get(name).cloned().ok_or_else(|| not_found(name))
    }
}
