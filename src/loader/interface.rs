use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// Trait for loading templates from different sources.
pub trait TemplateLoader {
    /// Makes the template available on the local filesystem.
    fn load(&self) -> Result<LoadedTemplate>;
}

/// A template root on disk.
///
/// Archives are extracted into a temporary directory that lives as long as
/// this value; cloned and local templates stay where they are.
#[derive(Debug)]
pub struct LoadedTemplate {
    path: PathBuf,
    scratch: Option<TempDir>,
}

impl LoadedTemplate {
    pub fn persistent(path: PathBuf) -> Self {
        Self { path, scratch: None }
    }

    pub fn temporary(path: PathBuf, scratch: TempDir) -> Self {
        Self { path, scratch: Some(scratch) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the files go away when this value is dropped.
    pub fn is_temporary(&self) -> bool {
        self.scratch.is_some()
    }

    /// Narrows the template root to a subdirectory.
    pub fn join(mut self, directory: &Path) -> Self {
        self.path = self.path.join(directory);
        self
    }
}
