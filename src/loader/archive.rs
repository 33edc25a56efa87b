use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::constants::REPO_PASSWORD_ENV;
use crate::error::{Error, Result};
use crate::loader::interface::{LoadedTemplate, TemplateLoader};
use crate::prompt::Prompter;

const PASSWORD_ATTEMPTS: usize = 3;

/// Whether `uri` is an http(s) URL rather than a local path.
pub fn is_remote(uri: &str) -> bool {
    url::Url::parse(uri).map(|url| matches!(url.scheme(), "http" | "https")).unwrap_or(false)
}

/// Loader for zipped templates, local or downloaded.
///
/// The archive must contain a single top-level directory; it is extracted
/// into a temporary directory that is removed once the run finishes.
pub struct ZipLoader<'a> {
    prompt: &'a dyn Prompter,
    uri: String,
    cache_dir: PathBuf,
    password: Option<String>,
    no_input: bool,
}

impl<'a> ZipLoader<'a> {
    pub fn new(
        prompt: &'a dyn Prompter,
        uri: &str,
        cache_dir: &Path,
        password: Option<&str>,
        no_input: bool,
    ) -> Self {
        Self {
            prompt,
            uri: uri.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            password: password.map(String::from),
            no_input,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidZipRepository { path: self.uri.clone(), reason: reason.into() }
    }

    /// Downloads a remote archive into the cache, or reuses a cached copy.
    fn fetch(&self) -> Result<PathBuf> {
        let file_name = self.uri.trim_end_matches('/').rsplit('/').next().unwrap_or("template.zip");
        fs::create_dir_all(&self.cache_dir)?;
        let target = self.cache_dir.join(file_name);

        if target.exists() {
            let replace = self.prompt.confirm(
                self.no_input,
                format!(
                    "You've downloaded {} before. Is it okay to delete and re-download it?",
                    target.display()
                ),
            )?;
            if !replace {
                debug!("Re-using downloaded archive '{}'", target.display());
                return Ok(target);
            }
            fs::remove_file(&target)?;
        }

        debug!("Downloading '{}'", self.uri);
        let bytes = reqwest::blocking::get(&self.uri)?.error_for_status()?.bytes()?;
        fs::write(&target, &bytes)?;
        Ok(target)
    }

    fn extract_with_password(&self, archive: &mut ZipArchive<fs::File>, dest: &Path) -> Result<()> {
        let mut candidate = self.password.clone().or_else(|| std::env::var(REPO_PASSWORD_ENV).ok());
        let mut attempts = 0;
        loop {
            let password = match candidate.take() {
                Some(password) => password,
                None if self.no_input => {
                    return Err(self.invalid("archive is encrypted and no password was given"))
                }
                None => self.prompt.password("Repo password")?,
            };
            match extract(archive, dest, Some(&password)) {
                Ok(()) => return Ok(()),
                Err(Error::ZipError(ZipError::InvalidPassword)) => {
                    attempts += 1;
                    if self.no_input || attempts >= PASSWORD_ATTEMPTS {
                        return Err(self.invalid("invalid password"));
                    }
                    warn!("Invalid password for '{}'", self.uri);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn extract(archive: &mut ZipArchive<fs::File>, dest: &Path, password: Option<&str>) -> Result<()> {
    for i in 0..archive.len() {
        let mut file = match password {
            Some(password) => archive.by_index_decrypt(i, password.as_bytes())?,
            None => archive.by_index(i)?,
        };
        let Some(relative) = file.enclosed_name() else {
            warn!("Skipping unsafe archive entry '{}'", file.name());
            continue;
        };
        let out = dest.join(relative);
        if file.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = fs::File::create(&out)?;
        io::copy(&mut file, &mut writer)?;
        set_mode(&out, file.unix_mode())?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

impl TemplateLoader for ZipLoader<'_> {
    /// # Errors
    /// * `Error::RepositoryNotFound` when a local archive does not exist
    /// * `Error::InvalidZipRepository` for empty archives, archives without a
    ///   top-level directory and wrong passwords
    fn load(&self) -> Result<LoadedTemplate> {
        let zip_path = if is_remote(&self.uri) {
            self.fetch()?
        } else {
            let path = PathBuf::from(&self.uri);
            if !path.is_file() {
                return Err(Error::RepositoryNotFound {
                    template: self.uri.clone(),
                    tried: vec![self.uri.clone()],
                });
            }
            path
        };

        let mut archive = ZipArchive::new(fs::File::open(&zip_path)?)
            .map_err(|e| self.invalid(e.to_string()))?;
        if archive.is_empty() {
            return Err(self.invalid("archive is empty"));
        }
        let first = archive.by_index_raw(0)?.name().to_string();
        let Some(top_level) = first.strip_suffix('/').filter(|name| !name.contains('/')) else {
            return Err(self.invalid("archive does not start with a top-level directory"));
        };
        let top_level = top_level.to_string();

        let encrypted = (0..archive.len())
            .any(|i| archive.by_index_raw(i).map(|f| f.encrypted()).unwrap_or(false));

        let scratch = tempfile::tempdir()?;
        if encrypted {
            self.extract_with_password(&mut archive, scratch.path())?;
        } else {
            extract(&mut archive, scratch.path(), None)?;
        }
        debug!("Extracted '{}' into {}", zip_path.display(), scratch.path().display());

        Ok(LoadedTemplate::temporary(scratch.path().join(top_level), scratch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, Option<&str>)]) {
        let mut zip = ZipWriter::new(fs::File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            match content {
                None => zip.add_directory(*name, options).unwrap(),
                Some(content) => {
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(content.as_bytes()).unwrap();
                }
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/t.zip"));
        assert!(!is_remote("/tmp/t.zip"));
        assert!(!is_remote("t.zip"));
    }

    #[test]
    fn test_extracts_top_level_directory() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("fake-repo.zip");
        write_zip(
            &zip_path,
            &[
                ("fake-repo/", None),
                ("fake-repo/cookiecutter.json", Some("{}")),
                ("fake-repo/{{cookiecutter.x}}/", None),
            ],
        );

        let prompter = crate::prompt::DialoguerPrompter::new();
        let loader = ZipLoader::new(&prompter, zip_path.to_str().unwrap(), dir.path(), None, true);
        let loaded = loader.load().unwrap();
        assert!(loaded.is_temporary());
        assert!(loaded.path().ends_with("fake-repo"));
        assert!(loaded.path().join("cookiecutter.json").is_file());
    }

    #[test]
    fn test_rejects_archive_without_top_level_directory() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("flat.zip");
        write_zip(&zip_path, &[("cookiecutter.json", Some("{}"))]);

        let prompter = crate::prompt::DialoguerPrompter::new();
        let loader = ZipLoader::new(&prompter, zip_path.to_str().unwrap(), dir.path(), None, true);
        assert!(matches!(loader.load(), Err(Error::InvalidZipRepository { .. })));
    }

    #[test]
    fn test_rejects_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("empty.zip");
        write_zip(&zip_path, &[]);

        let prompter = crate::prompt::DialoguerPrompter::new();
        let loader = ZipLoader::new(&prompter, zip_path.to_str().unwrap(), dir.path(), None, true);
        assert!(matches!(loader.load(), Err(Error::InvalidZipRepository { .. })));
    }
}
