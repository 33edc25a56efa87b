use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::loader::interface::{LoadedTemplate, TemplateLoader};
use crate::prompt::Prompter;

/// Loader for templates from git repositories.
///
/// Repositories are cloned into the template cache directory and reused on
/// later runs unless the user agrees to re-download them.
pub struct GitLoader<'a, S: AsRef<str>> {
    prompt: &'a dyn Prompter,
    repo: S,
    cache_dir: PathBuf,
    checkout: Option<String>,
    no_input: bool,
}

/// Splits an optional `git+` / `hg+` prefix off a repository URL.
///
/// # Errors
/// * `Error::UnsupportedVcs` for Mercurial repositories.
pub fn strip_vcs_prefix(url: &str) -> Result<&str> {
    if url.starts_with("hg+") {
        return Err(Error::UnsupportedVcs { url: url.to_string() });
    }
    Ok(url.strip_prefix("git+").unwrap_or(url))
}

/// The directory name a clone of `url` gets.
pub fn repo_name(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .map(|name| name.trim_end_matches(".git"))
        .filter(|name| !name.is_empty())
        .unwrap_or("template")
}

impl<'a, S: AsRef<str>> GitLoader<'a, S> {
    pub fn new(
        prompt: &'a dyn Prompter,
        repo: S,
        cache_dir: &Path,
        checkout: Option<&str>,
        no_input: bool,
    ) -> Self {
        Self {
            prompt,
            repo,
            cache_dir: cache_dir.to_path_buf(),
            checkout: checkout.map(String::from),
            no_input,
        }
    }

    fn clone_repo(&self, url: &str, clone_path: &Path) -> Result<git2::Repository> {
        debug!("Cloning '{url}' to '{}'", clone_path.display());

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, allowed_types| {
            let username = username_from_url.unwrap_or("git");
            if allowed_types.contains(git2::CredentialType::SSH_KEY) {
                let home = std::env::var("HOME").unwrap_or_default();
                let key = Path::new(&home).join(".ssh").join("id_rsa");
                return git2::Cred::ssh_key(username, None, &key, None);
            }
            git2::Cred::default()
        });

        let mut fetch_opts = git2::FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks);

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_opts);
        Ok(builder.clone(url, clone_path)?)
    }

    /// Checks out a branch, tag or commit, detaching HEAD.
    fn checkout(&self, repo: &git2::Repository, rev: &str) -> Result<()> {
        let object = repo
            .revparse_single(rev)
            .or_else(|_| repo.revparse_single(&format!("origin/{rev}")))?;
        repo.checkout_tree(&object, Some(git2::build::CheckoutBuilder::new().force()))?;
        repo.set_head_detached(object.peel_to_commit()?.id())?;
        debug!("Checked out '{rev}'");
        Ok(())
    }
}

impl<S: AsRef<str>> TemplateLoader for GitLoader<'_, S> {
    fn load(&self) -> Result<LoadedTemplate> {
        let url = strip_vcs_prefix(self.repo.as_ref())?;
        fs::create_dir_all(&self.cache_dir)?;
        let clone_path = self.cache_dir.join(repo_name(url));

        let repo = if clone_path.exists() {
            let replace = self.prompt.confirm(
                self.no_input,
                format!(
                    "You've downloaded {} before. Is it okay to delete and re-download it?",
                    clone_path.display()
                ),
            )?;
            if replace {
                fs::remove_dir_all(&clone_path)?;
                self.clone_repo(url, &clone_path)?
            } else {
                debug!("Re-using existing clone '{}'", clone_path.display());
                git2::Repository::open(&clone_path)?
            }
        } else {
            self.clone_repo(url, &clone_path)?
        };

        if let Some(rev) = &self.checkout {
            self.checkout(&repo, rev)?;
        }

        Ok(LoadedTemplate::persistent(clone_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name() {
        assert_eq!(repo_name("https://github.com/user/cookiecutter-demo.git"), "cookiecutter-demo");
        assert_eq!(repo_name("git@github.com:user/demo.git"), "demo");
        assert_eq!(repo_name("git@host:demo"), "demo");
        assert_eq!(repo_name("https://example.com/demo/"), "demo");
    }

    #[test]
    fn test_strip_vcs_prefix() {
        let url = "https://example.com/x.git";
        assert_eq!(strip_vcs_prefix("git+https://example.com/x.git").unwrap(), url);
        assert_eq!(strip_vcs_prefix(url).unwrap(), url);
        assert!(matches!(
            strip_vcs_prefix("hg+https://example.com/x"),
            Err(Error::UnsupportedVcs { .. })
        ));
    }

    #[test]
    fn test_clone_local_repository_and_checkout() {
        let origin = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(origin.path()).unwrap();
        std::fs::write(origin.path().join("cookiecutter.json"), "{}").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("cookiecutter.json")).unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = git2::Signature::now("Test", "test@example.com").unwrap();
        let commit =
            repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[]).unwrap();

        let cache = tempfile::tempdir().unwrap();
        let prompter = crate::prompt::DialoguerPrompter::new();
        let url = format!("file://{}", origin.path().display());
        let loader = GitLoader::new(&prompter, url, cache.path(), Some(&commit.to_string()), true);
        let loaded = loader.load().unwrap();
        assert!(loaded.path().join("cookiecutter.json").is_file());

        // Cached clone is replaced without asking under no_input.
        assert!(loader.load().is_ok());
    }
}
