//! Template tree rendering.
//!
//! Walks the single project directory of a template, renders every directory
//! and file name through the engine and writes the output tree. Text files are
//! rendered, binary files and copy-without-render matches are copied as-is,
//! symlinks are recreated and permission bits follow every file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, warn};
use serde_json::Value;
use walkdir::WalkDir;

use crate::constants::{
    BINARY_SAMPLE_SIZE, COPY_WITHOUT_RENDER_KEY, NEW_LINES_KEY, NON_TEMPLATE_ENTRIES,
};
use crate::context::{namespaced, Context};
use crate::error::{Error, Result};
use crate::renderer::TemplateRenderer;

/// Whether a path component carries template delimiters.
pub fn is_templated(name: &str) -> bool {
    (name.contains("{{") && name.contains("}}")) || (name.contains("{%") && name.contains("%}"))
}

/// Heuristic binary check on leading bytes: NUL bytes or invalid UTF-8.
///
/// A multi-byte character cut off by the sample boundary still counts as text.
pub fn is_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_SAMPLE_SIZE)];
    if sample.contains(&0) {
        return true;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => false,
        Err(e) => e.error_len().is_some(),
    }
}

/// Samples the first bytes of a file; see [`is_binary`].
pub fn is_binary_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    let mut sample = Vec::with_capacity(BINARY_SAMPLE_SIZE);
    fs::File::open(path)?.take(BINARY_SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(is_binary(&sample))
}

/// Locates the project directory inside a template root.
///
/// VCS metadata, hooks, filters and inheritance directories are never candidates.
/// When several candidates remain only the templated ones are considered.
///
/// # Errors
/// * `Error::TemplateDirNotFound` when there is no candidate
/// * `Error::AmbiguousTemplateDir` when more than one candidate remains
/// * `Error::NonTemplatedInputDir` when the only candidate has a plain name
pub fn find_template_dir<P: AsRef<Path>>(template_root: P) -> Result<PathBuf> {
    let template_root = template_root.as_ref();
    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(template_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_dir() && !NON_TEMPLATE_ENTRIES.contains(&name.as_str()) {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    let name_of = |path: &PathBuf| {
        path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
    };

    if candidates.len() > 1 {
        let templated: Vec<PathBuf> =
            candidates.iter().filter(|c| is_templated(&name_of(c))).cloned().collect();
        if templated.len() != 1 {
            return Err(Error::AmbiguousTemplateDir {
                candidates: candidates.iter().map(name_of).collect(),
            });
        }
        candidates = templated;
    }

    match candidates.pop() {
        None => Err(Error::TemplateDirNotFound { template_dir: template_root.to_path_buf() }),
        Some(dir) if is_templated(&name_of(&dir)) => {
            debug!("Project template directory is {}", dir.display());
            Ok(dir)
        }
        Some(dir) => Err(Error::NonTemplatedInputDir { dir }),
    }
}

/// Builds the glob set from the `_copy_without_render` context key.
pub fn copy_without_render_set(context: &Context) -> Result<GlobSet> {
    let patterns: Vec<String> = match context.get(COPY_WITHOUT_RENDER_KEY) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(pattern)) => vec![pattern.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(String::from).ok_or_else(|| {
                    Error::CopyWithoutRender(format!("pattern {item} is not a string"))
                })
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(Error::CopyWithoutRender(format!("expected a list of globs, got {other}")))
        }
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in &patterns {
        builder.add(Glob::new(pattern).map_err(|e| Error::CopyWithoutRender(e.to_string()))?);
    }
    builder.build().map_err(|e| Error::CopyWithoutRender(e.to_string()))
}

/// Copies a tree without rendering anything, recreating symlinks and permissions.
pub fn copy_tree<P: AsRef<Path>, Q: AsRef<Path>>(source: P, target: Q) -> Result<()> {
    let source = source.as_ref();
    let target = target.as_ref();
    fs::create_dir_all(target)?;
    for entry in WalkDir::new(source).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::IoError(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::IoError(std::io::Error::other(e)))?;
        let destination = target.join(relative);
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            create_symlink(&fs::read_link(entry.path())?, &destination)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
            copy_permissions(entry.path(), &destination)?;
        }
    }
    Ok(())
}

fn copy_permissions(source: &Path, target: &Path) -> Result<()> {
    let permissions = fs::metadata(source)?.permissions();
    fs::set_permissions(target, permissions)?;
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link_target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link_target, link)?;
    Ok(())
}

#[cfg(windows)]
fn create_symlink(link_target: &Path, link: &Path) -> Result<()> {
    let resolved =
        link.parent().map(|p| p.join(link_target)).unwrap_or_else(|| link_target.to_path_buf());
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(link_target, link)?;
    } else {
        std::os::windows::fs::symlink_file(link_target, link)?;
    }
    Ok(())
}

fn detect_newline(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Tree renderer options.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    /// Leave files that already exist in the output untouched.
    pub skip_if_file_exists: bool,
}

pub struct TreeRenderer<'a> {
    engine: &'a dyn TemplateRenderer,
    options: GenerateOptions,
}

impl<'a> TreeRenderer<'a> {
    pub fn new(engine: &'a dyn TemplateRenderer, options: GenerateOptions) -> Self {
        Self { engine, options }
    }

    /// Returns the template's project directory and the output directory it renders to.
    pub fn project_dir(
        &self,
        template_root: &Path,
        context: &Context,
        output_dir: &Path,
    ) -> Result<(PathBuf, PathBuf)> {
        let template_dir = find_template_dir(template_root)?;
        let name =
            template_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let rendered = self.render_name(&name, &name, &namespaced(context))?;
        if rendered.trim().is_empty() {
            return Err(Error::Render {
                path: name,
                line: 1,
                message: "project directory name rendered empty".to_string(),
            });
        }
        Ok((template_dir, output_dir.join(rendered)))
    }

    /// Renders the template tree under `output_dir` and returns the project directory.
    ///
    /// Existing directories are reused. Rendering stops at the first failure,
    /// leaving cleanup to the caller.
    pub fn render(
        &self,
        template_root: &Path,
        context: &Context,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let (template_dir, project_dir) = self.project_dir(template_root, context, output_dir)?;
        fs::create_dir_all(&project_dir)?;
        debug!("Rendering {} into {}", template_dir.display(), project_dir.display());

        let rendering = namespaced(context);
        let verbatim_globs = copy_without_render_set(context)?;
        let newline = match context.get(NEW_LINES_KEY).and_then(Value::as_str) {
            Some(nl @ ("\n" | "\r\n")) => Some(nl.to_string()),
            Some(other) => {
                warn!("Ignoring unsupported {NEW_LINES_KEY} value {other:?}");
                None
            }
            None => None,
        };

        let mut targets: HashMap<PathBuf, PathBuf> = HashMap::new();
        targets.insert(template_dir.clone(), project_dir.clone());
        // Directories matched by `_copy_without_render`; their contents keep raw names.
        let mut verbatim_dirs: HashSet<PathBuf> = HashSet::new();

        let mut walker = WalkDir::new(&template_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| Error::IoError(e.into()))?;
            let source = entry.path();
            let Some(parent) = source.parent().and_then(|p| targets.get(p)).cloned() else {
                continue;
            };
            let relative = source
                .strip_prefix(&template_dir)
                .map_err(|e| Error::IoError(std::io::Error::other(e)))?
                .to_string_lossy()
                .replace('\\', "/");
            let file_name = entry.file_name().to_string_lossy().to_string();
            let inside_verbatim = source.parent().is_some_and(|p| verbatim_dirs.contains(p));
            let verbatim = inside_verbatim || verbatim_globs.is_match(&relative);

            let rendered_name = if inside_verbatim {
                file_name
            } else {
                self.render_name(&relative, &file_name, &rendering)?
            };
            if rendered_name.trim().is_empty() {
                debug!("Skipping '{relative}': name rendered empty");
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }
            let target = parent.join(&rendered_name);

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                self.render_symlink(source, &target, &relative, verbatim, &rendering)?;
            } else if file_type.is_dir() {
                if verbatim {
                    debug!("Copying directory '{relative}' without rendering");
                    verbatim_dirs.insert(source.to_path_buf());
                }
                fs::create_dir_all(&target)?;
                targets.insert(source.to_path_buf(), target);
            } else {
                let newline = newline.as_deref();
                self.render_file(source, &target, &relative, verbatim, newline, &rendering)?;
            }
        }

        Ok(project_dir)
    }

    fn render_name(&self, origin: &str, name: &str, rendering: &Value) -> Result<String> {
        let compiled = self.engine.compile(origin, name)?;
        self.engine.render_compiled(&compiled, rendering)
    }

    fn render_file(
        &self,
        source: &Path,
        target: &Path,
        relative: &str,
        verbatim: bool,
        newline: Option<&str>,
        rendering: &Value,
    ) -> Result<()> {
        if self.options.skip_if_file_exists && target.exists() {
            debug!("Skipping existing file {}", target.display());
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = fs::read(source)?;
        let text = if verbatim || is_binary(&bytes) {
            None
        } else {
            String::from_utf8(bytes.clone()).ok()
        };

        match text {
            None => {
                debug!("Copying '{relative}' without rendering");
                fs::write(target, &bytes)?;
            }
            Some(text) => {
                debug!("Rendering '{relative}'");
                let compiled = self.engine.compile(relative, &text)?;
                let rendered =
                    self.engine.render_compiled(&compiled, rendering)?.replace("\r\n", "\n");
                let content = match newline.unwrap_or_else(|| detect_newline(&text)) {
                    "\r\n" => rendered.replace('\n', "\r\n"),
                    _ => rendered,
                };
                fs::write(target, content)?;
            }
        }

        copy_permissions(source, target)
    }

    fn render_symlink(
        &self,
        source: &Path,
        target: &Path,
        relative: &str,
        verbatim: bool,
        rendering: &Value,
    ) -> Result<()> {
        if target.symlink_metadata().is_ok() {
            if self.options.skip_if_file_exists {
                debug!("Skipping existing link {}", target.display());
                return Ok(());
            }
            fs::remove_file(target)?;
        }

        let link_target = fs::read_link(source)?;
        let link_text = link_target.to_string_lossy();
        let rendered = if !verbatim && is_templated(&link_text) {
            PathBuf::from(self.render_name(relative, &link_text, rendering)?)
        } else {
            link_target.clone()
        };
        debug!("Linking {} -> {}", target.display(), rendered.display());
        create_symlink(&rendered, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_templated() {
        assert!(is_templated("{{cookiecutter.project_slug}}"));
        assert!(is_templated("{% if x %}a{% endif %}"));
        assert!(!is_templated("myproject"));
        assert!(!is_templated("{{half"));
    }

    #[test]
    fn test_is_binary() {
        assert!(!is_binary(b"plain text\n"));
        assert!(is_binary(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR"));
        assert!(is_binary(&[0xff, 0xfe, 0x41]));
        // "é" split by the sample boundary is still text.
        let mut bytes = vec![b'a'; BINARY_SAMPLE_SIZE - 1];
        bytes.extend_from_slice("é".as_bytes());
        assert!(!is_binary(&bytes));
    }

    #[test]
    fn test_detect_newline() {
        assert_eq!(detect_newline("a\r\nb"), "\r\n");
        assert_eq!(detect_newline("a\nb"), "\n");
    }

    #[test]
    fn test_copy_without_render_set() {
        let mut context = Context::new();
        let patterns = serde_json::json!(["*.txt", "static/*"]);
        context.insert(COPY_WITHOUT_RENDER_KEY.to_string(), patterns);
        let set = copy_without_render_set(&context).unwrap();
        assert!(set.is_match("notes.txt"));
        assert!(set.is_match("docs/notes.txt"));
        assert!(set.is_match("static/app.js"));
        assert!(!set.is_match("main.py"));

        context.insert(COPY_WITHOUT_RENDER_KEY.to_string(), serde_json::json!(42));
        assert!(copy_without_render_set(&context).is_err());
    }
}
