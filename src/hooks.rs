//! Hook scripts.
//!
//! Templates may ship `hooks/pre_prompt`, `hooks/pre_gen_project` and
//! `hooks/post_gen_project` scripts (any extension). Generation hooks are
//! rendered against the context first. Every hook receives the serialized
//! context on stdin; the last well-formed object it prints becomes the new
//! context.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_json::Value;

use crate::constants::{CONTEXT_NAMESPACE, HOOKS_DIR, HOOK_SERIALIZER_KEY};
use crate::context::{namespaced, Context};
use crate::error::{Error, Result};
use crate::prompt::Prompter;
use crate::renderer::TemplateRenderer;
use crate::serializer::{Serializer, SerializerRegistry, DEFAULT_SERIALIZER};

const HOOKS_WARNING: &str = "WARNING: This template contains hooks that will execute commands \
                             on your system. Do you want to run these hooks?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    PrePrompt,
    PreGenProject,
    PostGenProject,
}

impl Hook {
    pub const ALL: [Hook; 3] = [Self::PrePrompt, Self::PreGenProject, Self::PostGenProject];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PrePrompt => "pre_prompt",
            Self::PreGenProject => "pre_gen_project",
            Self::PostGenProject => "post_gen_project",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether hooks may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookPolicy {
    #[default]
    Yes,
    /// Ask once per run, only when the template has hooks.
    Ask,
    No,
}

impl HookPolicy {
    pub fn allows(
        &self,
        prompter: &dyn Prompter,
        template_dir: &Path,
        no_input: bool,
    ) -> Result<bool> {
        match self {
            Self::Yes => Ok(true),
            Self::No => Ok(false),
            Self::Ask if !has_hooks(template_dir)? => Ok(true),
            Self::Ask if no_input => {
                debug!("Not running hooks: asking is impossible without input");
                Ok(false)
            }
            Self::Ask => prompter.confirm(false, HOOKS_WARNING.to_string()),
        }
    }
}

/// Finds the script for `hook`, matching the file stem.
///
/// Backup files ending in `~` are ignored. When several scripts match, the
/// first by name wins.
pub fn find_hook<P: AsRef<Path>>(template_dir: P, hook: Hook) -> Result<Option<PathBuf>> {
    let dir = template_dir.as_ref().join(HOOKS_DIR);
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut scripts = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_file() || file_name.ends_with('~') {
            continue;
        }
        if file_name.split('.').next() == Some(hook.name()) {
            scripts.push(path);
        }
    }
    scripts.sort();

    if scripts.len() > 1 {
        warn!("Found {} scripts for hook {hook}, using {}", scripts.len(), scripts[0].display());
    }
    Ok(scripts.into_iter().next())
}

pub fn has_hooks<P: AsRef<Path>>(template_dir: P) -> Result<bool> {
    for hook in Hook::ALL {
        if find_hook(template_dir.as_ref(), hook)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Picks the context update out of a hook's stdout.
///
/// Lines are tried from last to first, then the whole output. A namespaced
/// object (`{"cookiecutter": {...}}`) is unwrapped.
pub fn parse_context_update(serializer: &dyn Serializer, stdout: &str) -> Option<Context> {
    let as_context = |text: &str| match serializer.deserialize(text) {
        Ok(Value::Object(mut map)) => match map.remove(CONTEXT_NAMESPACE) {
            Some(Value::Object(inner)) if map.is_empty() => Some(inner),
            Some(other) => {
                map.insert(CONTEXT_NAMESPACE.to_string(), other);
                Some(map)
            }
            None => Some(map),
        },
        _ => None,
    };

    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(as_context)
        .or_else(|| if stdout.trim().is_empty() { None } else { as_context(stdout) })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HookOptions {
    /// Kill a hook that runs longer than this.
    pub timeout: Option<Duration>,
}

pub struct HookRunner<'a> {
    engine: &'a dyn TemplateRenderer,
    serializers: &'a SerializerRegistry,
    options: HookOptions,
}

impl<'a> HookRunner<'a> {
    pub fn new(
        engine: &'a dyn TemplateRenderer,
        serializers: &'a SerializerRegistry,
        options: HookOptions,
    ) -> Self {
        Self { engine, serializers, options }
    }

    /// Runs `hook` from `template_dir` inside `working_dir`.
    ///
    /// Returns `Ok(None)` when the template has no such hook or the hook
    /// printed no context.
    ///
    /// # Errors
    /// * `Error::FailedHook` when the script cannot start, exits non-zero or times out.
    pub fn run(
        &self,
        template_dir: &Path,
        hook: Hook,
        context: &Context,
        working_dir: &Path,
    ) -> Result<Option<Context>> {
        let Some(script) = find_hook(template_dir, hook)? else {
            debug!("No {hook} hook");
            return Ok(None);
        };
        info!("Running hook {hook}");

        let source = fs::read_to_string(&script)?;
        let content = match hook {
            Hook::PrePrompt => source,
            _ => {
                let origin = script.display().to_string();
                let compiled = self.engine.compile(&origin, &source)?;
                self.engine.render_compiled(&compiled, &namespaced(context))?
            }
        };

        let tag =
            context.get(HOOK_SERIALIZER_KEY).and_then(Value::as_str).unwrap_or(DEFAULT_SERIALIZER);
        let serializer = self.serializers.get(tag)?;
        let payload = serializer
            .serialize(&Value::Object(context.clone()))
            .map_err(|e| Error::Serializer(format!("{e:#}")))?;

        let stdout = self.execute(hook, &script, &content, &payload, working_dir)?;
        Ok(parse_context_update(serializer, &stdout))
    }

    fn execute(
        &self,
        hook: Hook,
        script: &Path,
        content: &str,
        payload: &str,
        working_dir: &Path,
    ) -> Result<String> {
        let failed = |reason: String| Error::FailedHook { hook: hook.name().to_string(), reason };
        let extension = script.extension().and_then(|e| e.to_str());

        let suffix = extension.map(|e| format!(".{e}")).unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix(hook.name()).suffix(&suffix);
        let mut file = builder.tempfile()?;
        file.write_all(content.as_bytes())?;
        let path = file.into_temp_path();
        make_executable(&path)?;

        let mut command = match extension {
            Some("py") => {
                let mut command = Command::new("python3");
                command.arg(&path);
                command
            }
            _ => Command::new(&path),
        };
        command
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = spawn(&mut command).map_err(|e| failed(e.to_string()))?;

        let stdout = child.stdout.take();
        let reader = thread::spawn(move || {
            let mut output = String::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_string(&mut output);
            }
            output
        });

        // Fed from a thread so a script that never reads its input still times out.
        let stdin = child.stdin.take();
        let input = payload.to_string();
        let writer = thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(input.as_bytes()),
            None => Ok(()),
        });

        let status = self.wait(&mut child, hook)?;
        let output = reader.join().unwrap_or_default();
        match writer.join() {
            // The script may exit without reading its input.
            Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => return Err(failed(e.to_string())),
            _ => {}
        }
        for line in output.lines() {
            info!("{hook}: {line}");
        }

        if !status.success() {
            return Err(failed(format!("exited with {status}")));
        }
        Ok(output)
    }

    fn wait(&self, child: &mut Child, hook: Hook) -> Result<ExitStatus> {
        let Some(timeout) = self.options.timeout else {
            return Ok(child.wait()?);
        };
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::FailedHook {
                    hook: hook.name().to_string(),
                    reason: format!("timed out after {}s", timeout.as_secs_f64()),
                });
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

/// `ETXTBSY`: a concurrently forked process still holds the script open for writing.
const TEXT_FILE_BUSY: i32 = 26;

fn spawn(command: &mut Command) -> std::io::Result<Child> {
    let mut attempts = 0;
    loop {
        match command.spawn() {
            Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) && attempts < 5 => {
                attempts += 1;
                thread::sleep(Duration::from_millis(50));
            }
            result => return result,
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;
    use serde_json::json;

    #[test]
    fn test_find_hook_ignores_backups() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = dir.path().join(HOOKS_DIR);
        fs::create_dir(&hooks).unwrap();
        fs::write(hooks.join("pre_gen_project.sh~"), "").unwrap();
        assert_eq!(find_hook(dir.path(), Hook::PreGenProject).unwrap(), None);

        fs::write(hooks.join("pre_gen_project.sh"), "").unwrap();
        fs::write(hooks.join("post_gen_project.py"), "").unwrap();
        assert_eq!(
            find_hook(dir.path(), Hook::PreGenProject).unwrap(),
            Some(hooks.join("pre_gen_project.sh"))
        );
        assert_eq!(find_hook(dir.path(), Hook::PrePrompt).unwrap(), None);
        assert!(has_hooks(dir.path()).unwrap());
    }

    #[test]
    fn test_parse_context_update_takes_last_object() {
        let stdout = "installing...\n{\"a\": 1}\ndone\n{\"a\": 2, \"b\": true}\n";
        let update = parse_context_update(&JsonSerializer, stdout).unwrap();
        assert_eq!(Value::Object(update), json!({"a": 2, "b": true}));
    }

    #[test]
    fn test_parse_context_update_unwraps_namespace() {
        let stdout = "{\"cookiecutter\": {\"x\": \"y\"}}\n";
        let update = parse_context_update(&JsonSerializer, stdout).unwrap();
        assert_eq!(Value::Object(update), json!({"x": "y"}));
    }

    #[test]
    fn test_parse_context_update_ignores_noise() {
        assert_eq!(parse_context_update(&JsonSerializer, "hello\n{not json\n"), None);
        assert_eq!(parse_context_update(&JsonSerializer, ""), None);
    }
}
