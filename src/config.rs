//! User configuration.
//!
//! A YAML file (`~/.cookiecutterrc` by default) that sets where templates are
//! cached, where replay files go, default answers for every template and
//! repository abbreviations. User values are merged over the built-in defaults.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::CONFIG_ENV;
use crate::error::{Error, Result};

const USER_CONFIG_PATH: &str = "~/.cookiecutterrc";
const DEFAULT_COOKIECUTTERS_DIR: &str = "~/.cookiecutters/";
const DEFAULT_REPLAY_DIR: &str = "~/.cookiecutter_replay/";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where cloned and downloaded templates are kept.
    pub cookiecutters_dir: PathBuf,
    pub replay_dir: PathBuf,
    /// Defaults applied to every template before extra context.
    pub default_context: IndexMap<String, Value>,
    /// Prefix to URL pattern; `{0}` is replaced by the text after the prefix.
    pub abbreviations: IndexMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let abbreviations = [
            ("gh", "https://github.com/{0}.git"),
            ("gl", "https://gitlab.com/{0}.git"),
            ("bb", "https://bitbucket.org/{0}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            cookiecutters_dir: expand_path(DEFAULT_COOKIECUTTERS_DIR)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_COOKIECUTTERS_DIR)),
            replay_dir: expand_path(DEFAULT_REPLAY_DIR)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_REPLAY_DIR)),
            default_context: IndexMap::new(),
            abbreviations,
        }
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    cookiecutters_dir: Option<String>,
    replay_dir: Option<String>,
    #[serde(default)]
    default_context: IndexMap<String, Value>,
    #[serde(default)]
    abbreviations: IndexMap<String, String>,
}

/// Expands `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.into_owned()))
        .map_err(|e| Error::Config(format!("cannot expand '{raw}': {e}")))
}

impl Config {
    /// Loads a config file and merges it over the defaults.
    ///
    /// # Errors
    /// * `Error::Config` when the file is missing or malformed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading user config from {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read '{}': {e}", path.display())))?;
        Self::parse(&content).map_err(|e| match e {
            Error::Config(reason) => Error::Config(format!("'{}': {reason}", path.display())),
            other => other,
        })
    }

    /// Parses YAML configuration text and merges it over the defaults.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?
        };

        let mut config = Self::default();
        if let Some(dir) = raw.cookiecutters_dir {
            config.cookiecutters_dir = expand_path(&dir)?;
        }
        if let Some(dir) = raw.replay_dir {
            config.replay_dir = expand_path(&dir)?;
        }
        config.default_context = raw.default_context;
        config.abbreviations.extend(raw.abbreviations);
        Ok(config)
    }
}

/// Resolves the configuration for a run.
///
/// `default_config` ignores every file. Otherwise an explicit file wins, then
/// the `COOKIECUTTER_CONFIG` variable, then `~/.cookiecutterrc` if it exists.
pub fn get_user_config(config_file: Option<&Path>, default_config: bool) -> Result<Config> {
    if default_config {
        debug!("Using built-in default config");
        return Ok(Config::default());
    }
    if let Some(path) = config_file {
        return Config::from_file(path);
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Config::from_file(expand_path(&path)?);
    }
    let user_config = expand_path(USER_CONFIG_PATH)?;
    if user_config.exists() {
        return Config::from_file(user_config);
    }
    Ok(Config::default())
}

/// Expands a repository abbreviation such as `gh:owner/repo`.
///
/// An exact key match uses the pattern as-is; a `prefix:rest` match substitutes
/// `rest` for `{0}`.
pub fn expand_abbreviations(template: &str, abbreviations: &IndexMap<String, String>) -> String {
    if let Some(pattern) = abbreviations.get(template) {
        return pattern.clone();
    }
    if let Some((prefix, rest)) = template.split_once(':') {
        if let Some(pattern) = abbreviations.get(prefix) {
            return pattern.replace("{0}", rest);
        }
    }
    template.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merges_over_defaults() {
        let config = Config::parse(
            "replay_dir: /tmp/replays\n\
             default_context:\n  full_name: Ada\n\
             abbreviations:\n  corp: https://git.corp/{0}.git\n",
        )
        .unwrap();
        assert_eq!(config.replay_dir, PathBuf::from("/tmp/replays"));
        assert_eq!(config.cookiecutters_dir, Config::default().cookiecutters_dir);
        assert_eq!(config.default_context["full_name"], Value::from("Ada"));
        assert_eq!(config.abbreviations.len(), 4);
        assert_eq!(config.abbreviations["gh"], "https://github.com/{0}.git");
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        assert!(matches!(Config::parse("colour: blue\n"), Err(Error::Config(_))));
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_expand_abbreviations() {
        let abbreviations = Config::default().abbreviations;
        assert_eq!(
            expand_abbreviations("gh:audreyfeldroy/cookiecutter-pypackage", &abbreviations),
            "https://github.com/audreyfeldroy/cookiecutter-pypackage.git"
        );
        assert_eq!(
            expand_abbreviations("bb:team/repo", &abbreviations),
            "https://bitbucket.org/team/repo"
        );
        assert_eq!(expand_abbreviations("./local", &abbreviations), "./local");
        assert_eq!(
            expand_abbreviations("https://example.com/x.git", &abbreviations),
            "https://example.com/x.git"
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = get_user_config(Some(&dir.path().join("nope.yaml")), false);
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(
            get_user_config(Some(&dir.path().join("nope.yaml")), true).unwrap(),
            Config::default()
        );
    }
}
