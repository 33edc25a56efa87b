//! One generation run, from template identifier to rendered project.
//!
//! Sequence: locate the template, optionally run `pre_prompt`, resolve the
//! context (or replay it), record it for replay, create the project
//! directory, then `pre_gen_project`, tree rendering and `post_gen_project`.
//! A failure after the project directory was created removes it again,
//! unless it already existed or the caller asked to keep it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;

use crate::config::Config;
use crate::context::{Context, ContextResolver, Overrides};
use crate::error::{Error, Result};
use crate::extensions::FilterPlugin;
use crate::generate::{copy_tree, GenerateOptions, TreeRenderer};
use crate::hooks::{find_hook, Hook, HookOptions, HookPolicy, HookRunner};
use crate::loader::{load_template, LoadOptions};
use crate::manifest::{ExtraContext, Manifest};
use crate::prompt::Prompter;
use crate::renderer::MiniJinjaRenderer;
use crate::replay::{self, ReplayStore};
use crate::serializer::SerializerRegistry;

/// Options for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub template: String,
    pub checkout: Option<String>,
    pub no_input: bool,
    pub extra_context: ExtraContext,
    /// Reuse the context recorded by the last run of this template.
    pub replay: bool,
    /// Replay from this file instead of the replay directory.
    pub replay_file: Option<PathBuf>,
    pub overwrite_if_exists: bool,
    pub skip_if_file_exists: bool,
    pub output_dir: PathBuf,
    pub password: Option<String>,
    /// Template subdirectory holding the manifest.
    pub directory: Option<PathBuf>,
    pub hook_policy: HookPolicy,
    pub keep_project_on_failure: bool,
    pub hook_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            template: String::new(),
            checkout: None,
            no_input: false,
            extra_context: ExtraContext::default(),
            replay: false,
            replay_file: None,
            overwrite_if_exists: false,
            skip_if_file_exists: false,
            output_dir: PathBuf::from("."),
            password: None,
            directory: None,
            hook_policy: HookPolicy::default(),
            keep_project_on_failure: false,
            hook_timeout: None,
        }
    }
}

impl RunOptions {
    fn is_replay(&self) -> bool {
        self.replay || self.replay_file.is_some()
    }

    /// # Errors
    /// * `Error::InvalidMode` when replay is combined with `no_input` or extra context.
    pub fn validate(&self) -> Result<()> {
        if self.is_replay() && self.no_input {
            return Err(Error::InvalidMode("replay cannot be combined with no-input".to_string()));
        }
        if self.is_replay() && !self.extra_context.is_empty() {
            let reason = "replay cannot be combined with extra context";
            return Err(Error::InvalidMode(reason.to_string()));
        }
        Ok(())
    }
}

fn template_name(template_root: &Path) -> String {
    let root = fs::canonicalize(template_root).unwrap_or_else(|_| template_root.to_path_buf());
    root.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "template".to_string())
}

fn rollback(project_dir: &Path, keep: bool) {
    if keep {
        debug!("Leaving {} in place", project_dir.display());
        return;
    }
    match fs::remove_dir_all(project_dir) {
        Ok(()) => info!("Removed partially generated {}", project_dir.display()),
        Err(e) => warn!("Could not remove {}: {e}", project_dir.display()),
    }
}

/// Generates a project and returns its directory.
pub fn run(options: &RunOptions, config: &Config, prompter: &dyn Prompter) -> Result<PathBuf> {
    options.validate()?;

    let loaded = load_template(
        prompter,
        &LoadOptions {
            template: &options.template,
            abbreviations: &config.abbreviations,
            cookiecutters_dir: &config.cookiecutters_dir,
            checkout: options.checkout.as_deref(),
            no_input: options.no_input,
            password: options.password.as_deref(),
            directory: options.directory.as_deref(),
        },
    )?;
    let name = template_name(loaded.path());
    let run_hooks = options.hook_policy.allows(prompter, loaded.path(), options.no_input)?;
    let serializers = SerializerRegistry::with_builtins();
    let hook_options = HookOptions { timeout: options.hook_timeout };

    // pre_prompt may rewrite the template, so it runs against a scratch copy.
    let mut scratch = None;
    let mut template_root = loaded.path().to_path_buf();
    if run_hooks && find_hook(&template_root, Hook::PrePrompt)?.is_some() {
        let copy = tempfile::tempdir()?;
        let copied_root = copy.path().join(&name);
        copy_tree(&template_root, &copied_root)?;
        let plain = MiniJinjaRenderer::new();
        HookRunner::new(&plain, &serializers, hook_options).run(
            &copied_root,
            Hook::PrePrompt,
            &Context::new(),
            &copied_root,
        )?;
        template_root = copied_root;
        scratch = Some(copy);
    }

    let manifest = Manifest::from_template_dir(&template_root)?;
    let plugins = FilterPlugin::discover(&template_root)?;
    let engine = MiniJinjaRenderer::with_extensions(&manifest.extensions(), &plugins)?;

    let store = ReplayStore::new(&config.replay_dir);
    let replay_context = match (&options.replay_file, options.replay) {
        (Some(path), _) => Some(replay::load_file(path)?),
        (None, true) => Some(store.load(&name)?),
        (None, false) => None,
    };
    let overrides = Overrides {
        default_context: config.default_context.clone(),
        extra_context: options.extra_context.clone(),
        replay_context,
    };
    let mut context =
        ContextResolver::new(&engine, prompter).resolve(&manifest, &overrides, options.no_input)?;

    let output_dir = std::path::absolute(&options.output_dir)?;
    context.insert("_template".to_string(), Value::from(options.template.clone()));
    context.insert("_output_dir".to_string(), Value::from(output_dir.display().to_string()));
    context.insert("_repo_dir".to_string(), Value::from(loaded.path().display().to_string()));
    let checkout = options.checkout.clone().map(Value::from).unwrap_or(Value::Null);
    context.insert("_checkout".to_string(), checkout);

    store.dump(&name, &context)?;

    let generate = GenerateOptions { skip_if_file_exists: options.skip_if_file_exists };
    let tree = TreeRenderer::new(&engine, generate);
    let (_, mut project_dir) = tree.project_dir(&template_root, &context, &output_dir)?;
    let existed = project_dir.exists();
    if existed && !options.overwrite_if_exists && !options.skip_if_file_exists {
        let output_dir = project_dir.display().to_string();
        return Err(Error::OutputDirectoryExists { output_dir });
    }
    fs::create_dir_all(&project_dir)?;
    // Directories this run created and must remove on failure.
    let mut created: Vec<PathBuf> = Vec::new();
    if !existed {
        created.push(project_dir.clone());
    }

    let hooks = HookRunner::new(&engine, &serializers, hook_options);
    let outcome = (|| -> Result<()> {
        if run_hooks {
            let pre_gen = hooks.run(&template_root, Hook::PreGenProject, &context, &project_dir)?;
            if let Some(update) = pre_gen {
                context = update;
            }
        }
        let (_, target) = tree.project_dir(&template_root, &context, &output_dir)?;
        if target != project_dir {
            debug!("Project directory moved to {} by {}", target.display(), Hook::PreGenProject);
            if !target.exists() {
                created.push(target.clone());
            }
            project_dir = target;
        }
        tree.render(&template_root, &context, &output_dir)?;
        if run_hooks {
            hooks.run(&template_root, Hook::PostGenProject, &context, &project_dir)?;
        }
        Ok(())
    })();

    if let Err(e) = outcome {
        for dir in &created {
            rollback(dir, options.keep_project_on_failure);
        }
        return Err(e);
    }

    // A directory abandoned by pre_gen_project is dropped when nothing was written to it.
    for dir in created.iter().filter(|dir| **dir != project_dir) {
        if fs::remove_dir(dir).is_ok() {
            debug!("Removed unused {}", dir.display());
        }
    }

    drop(scratch);
    info!("Generated {}", project_dir.display());
    Ok(project_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replay_rejects_no_input_and_extra_context() {
        let options = RunOptions { replay: true, no_input: true, ..Default::default() };
        assert!(matches!(options.validate(), Err(Error::InvalidMode(_))));

        let Value::Object(map) = json!({"a": 1}) else { unreachable!() };
        let extra = ExtraContext::Values(map.into_iter().collect());
        let options = RunOptions {
            replay_file: Some(PathBuf::from("r.json")),
            extra_context: extra,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidMode(_))));

        assert!(RunOptions { replay: true, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn test_rollback_respects_keep() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        fs::create_dir(&project).unwrap();

        rollback(&project, true);
        assert!(project.exists());
        rollback(&project, false);
        assert!(!project.exists());
    }
}
