//! Replay files: the resolved context of a previous run, stored per template.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde_json::Value;

use crate::constants::CONTEXT_NAMESPACE;
use crate::context::{namespaced, Context};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ReplayStore {
    dir: PathBuf,
}

impl ReplayStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<template_name>.json`.
    pub fn path_for(&self, template_name: &str) -> PathBuf {
        if template_name.ends_with(".json") {
            self.dir.join(template_name)
        } else {
            self.dir.join(format!("{template_name}.json"))
        }
    }

    pub fn dump(&self, template_name: &str, context: &Context) -> Result<PathBuf> {
        if template_name.is_empty() {
            return Err(Error::Replay {
                path: self.dir.clone(),
                reason: "template name is empty".to_string(),
            });
        }
        let path = self.path_for(template_name);
        dump_file(&path, context)?;
        Ok(path)
    }

    pub fn load(&self, template_name: &str) -> Result<Context> {
        load_file(self.path_for(template_name))
    }
}

pub fn dump_file<P: AsRef<Path>>(path: P, context: &Context) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!("Writing replay file {}", path.display());
    fs::write(path, serde_json::to_string_pretty(&namespaced(context))?)?;
    Ok(())
}

/// Reads a replay file written by [`dump_file`].
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Context> {
    let path = path.as_ref();
    let invalid = |reason: String| Error::Replay { path: path.to_path_buf(), reason };

    let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let value: Value = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    match value {
        Value::Object(mut root) => match root.remove(CONTEXT_NAMESPACE) {
            Some(Value::Object(context)) => Ok(context),
            _ => Err(invalid(format!("missing '{CONTEXT_NAMESPACE}' object"))),
        },
        _ => Err(invalid("expected a JSON object".to_string())),
    }
}
