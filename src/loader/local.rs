use std::path::{Path, PathBuf};

use log::debug;

use crate::constants::MANIFEST_FILE;
use crate::error::{Error, Result};
use crate::loader::interface::{LoadedTemplate, TemplateLoader};

/// Loader for templates from the local filesystem.
///
/// The identifier is tried as a path first, then as a name inside the
/// template cache directory.
pub struct LocalLoader<P: AsRef<Path>> {
    path: P,
    cache_dir: PathBuf,
    directory: Option<PathBuf>,
}

impl<P: AsRef<Path>> LocalLoader<P> {
    pub fn new(path: P, cache_dir: &Path, directory: Option<&Path>) -> Self {
        Self {
            path,
            cache_dir: cache_dir.to_path_buf(),
            directory: directory.map(Path::to_path_buf),
        }
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let path = self.path.as_ref();
        let mut candidates = vec![path.to_path_buf()];
        if path.is_relative() {
            candidates.push(self.cache_dir.join(path));
        }
        candidates
    }
}

impl<P: AsRef<Path>> TemplateLoader for LocalLoader<P> {
    /// # Errors
    /// * `Error::RepositoryNotFound` listing every location tried.
    fn load(&self) -> Result<LoadedTemplate> {
        let candidates = self.candidates();
        for candidate in &candidates {
            let root = match &self.directory {
                Some(directory) => candidate.join(directory),
                None => candidate.clone(),
            };
            if root.join(MANIFEST_FILE).is_file() {
                debug!("Using local template '{}'", candidate.display());
                return Ok(LoadedTemplate::persistent(candidate.clone()));
            }
        }

        Err(Error::RepositoryNotFound {
            template: self.path.as_ref().display().to_string(),
            tried: candidates.iter().map(|c| c.display().to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falls_back_to_cache_dir() {
        let cache = tempfile::tempdir().unwrap();
        let template = cache.path().join("cached-template");
        std::fs::create_dir(&template).unwrap();
        std::fs::write(template.join(MANIFEST_FILE), "{}").unwrap();

        let loaded = LocalLoader::new("cached-template", cache.path(), None).load().unwrap();
        assert_eq!(loaded.path(), template.as_path());
        assert!(!loaded.is_temporary());
    }

    #[test]
    fn test_missing_template_lists_locations() {
        let cache = tempfile::tempdir().unwrap();
        match LocalLoader::new("no-such-template", cache.path(), None).load() {
            Err(Error::RepositoryNotFound { tried, .. }) => assert_eq!(tried.len(), 2),
            other => panic!("expected RepositoryNotFound, got {other:?}"),
        }
    }
}
