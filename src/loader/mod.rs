//! Template acquisition.
//!
//! Turns a template identifier (path, cached name, abbreviation, git URL or
//! zip archive) into a directory on disk that holds a manifest.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use regex::Regex;

use crate::config::expand_abbreviations;
use crate::constants::MANIFEST_FILE;
use crate::error::{Error, Result};
use crate::loader::archive::ZipLoader;
use crate::loader::git::GitLoader;
use crate::loader::interface::TemplateLoader;
use crate::loader::local::LocalLoader;
use crate::prompt::Prompter;

pub mod archive;
pub mod git;
pub mod interface;
pub mod local;

pub use interface::LoadedTemplate;

/// Represents the source location of a template.
#[derive(Debug, PartialEq, Eq)]
pub enum TemplateSource {
    /// Local filesystem template path
    FileSystem(PathBuf),
    /// Git repository URL (HTTPS, SSH or file), optionally `git+` prefixed
    Git(String),
    /// Zip archive, local path or http(s) URL
    Zip(String),
}

impl std::fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateSource::FileSystem(path) => {
                write!(f, "local path: '{}'", path.display())
            }
            TemplateSource::Git(repo) => write!(f, "git repository: '{repo}'"),
            TemplateSource::Zip(archive) => write!(f, "zip archive: '{archive}'"),
        }
    }
}

const REPO_URL_PATTERN: &str = r"^(((git|hg)\+)?(git|ssh|file|https?):(//)?|\w+@[\w.]+)";

/// Whether `value` looks like a VCS repository URL.
pub fn is_repo_url(value: &str) -> bool {
    Regex::new(REPO_URL_PATTERN).map(|re| re.is_match(value)).unwrap_or(false)
}

pub fn is_zip_file(value: &str) -> bool {
    value.to_lowercase().ends_with(".zip")
}

impl TemplateSource {
    /// Classifies an already abbreviation-expanded identifier.
    pub fn from_string(s: &str) -> Self {
        if is_zip_file(s) {
            Self::Zip(s.to_string())
        } else if is_repo_url(s) {
            Self::Git(s.to_string())
        } else {
            Self::FileSystem(PathBuf::from(s))
        }
    }
}

/// Everything needed to locate a template.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions<'a> {
    pub template: &'a str,
    pub abbreviations: &'a IndexMap<String, String>,
    /// Cache directory for clones, downloads and named templates.
    pub cookiecutters_dir: &'a Path,
    pub checkout: Option<&'a str>,
    pub no_input: bool,
    pub password: Option<&'a str>,
    /// Subdirectory of the template holding the manifest.
    pub directory: Option<&'a Path>,
}

/// Returns the template directory for the given identifier.
///
/// # Errors
/// * `Error::RepositoryNotFound` when the resolved directory has no manifest.
pub fn load_template(prompt: &dyn Prompter, options: &LoadOptions) -> Result<LoadedTemplate> {
    let template = expand_abbreviations(options.template, options.abbreviations);
    let source = TemplateSource::from_string(&template);
    info!("Using template from the {source}");

    let loader: Box<dyn TemplateLoader + '_> = match source {
        TemplateSource::Zip(uri) => Box::new(ZipLoader::new(
            prompt,
            &uri,
            options.cookiecutters_dir,
            options.password,
            options.no_input,
        )),
        TemplateSource::Git(repo) => Box::new(GitLoader::new(
            prompt,
            repo,
            options.cookiecutters_dir,
            options.checkout,
            options.no_input,
        )),
        TemplateSource::FileSystem(path) => {
            Box::new(LocalLoader::new(path, options.cookiecutters_dir, options.directory))
        }
    };

    let mut loaded = loader.load()?;
    if let Some(directory) = options.directory {
        loaded = loaded.join(directory);
    }
    if !loaded.path().join(MANIFEST_FILE).is_file() {
        return Err(Error::RepositoryNotFound {
            template,
            tried: vec![loaded.path().display().to_string()],
        });
    }
    debug!("Template root is {}", loaded.path().display());
    Ok(loaded)
}

/// Names of cached templates, sorted.
pub fn list_installed<P: AsRef<Path>>(cookiecutters_dir: P) -> Result<Vec<String>> {
    let dir = cookiecutters_dir.as_ref();
    if !dir.is_dir() {
        let reason = format!("cannot find installed templates in '{}'", dir.display());
        return Err(Error::Config(reason));
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.join(MANIFEST_FILE).is_file() {
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
