//! Template renderer for Cutter.
//! Wraps MiniJinja behind a small trait so the resolver, tree renderer and hook
//! runner only ever see "compile" and "render".
use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior};

use crate::error::{Error, Result};
use crate::extensions::{Extension, FilterPlugin};

/// Origin used for inline templates such as defaults and path components.
const INLINE_ORIGIN: &str = "<string>";

/// A template whose syntax has been checked, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    origin: String,
    source: String,
}

impl CompiledTemplate {
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Trait for template rendering engines.
pub trait TemplateRenderer {
    /// Checks the syntax of `source`.
    ///
    /// # Errors
    /// * `Error::TemplateSyntax` carrying `origin`, the 1-based line and a message.
    fn compile(&self, origin: &str, source: &str) -> Result<CompiledTemplate>;

    /// Renders a compiled template. Undefined variables are errors.
    fn render_compiled(
        &self,
        template: &CompiledTemplate,
        context: &serde_json::Value,
    ) -> Result<String>;

    /// Compiles and renders an inline template string.
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String> {
        let compiled = self.compile(INLINE_ORIGIN, template)?;
        self.render_compiled(&compiled, context)
    }
}

/// MiniJinja-based template rendering engine.
pub struct MiniJinjaRenderer {
    /// MiniJinja environment instance
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    /// Creates a renderer with the default extension set.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        for extension in Extension::DEFAULTS {
            extension.register(&mut env);
        }
        Self { env }
    }

    /// Creates a renderer with the default extensions, the named ones and
    /// template-local filter plugins.
    ///
    /// # Errors
    /// * `Error::UnknownExtension` when a name matches no known extension.
    pub fn with_extensions(names: &[String], plugins: &[FilterPlugin]) -> Result<Self> {
        let mut renderer = Self::new();
        for name in names {
            let extension = Extension::from_name(name)
                .ok_or_else(|| Error::UnknownExtension { name: name.clone() })?;
            extension.register(&mut renderer.env);
        }
        for plugin in plugins {
            plugin.register(&mut renderer.env);
        }
        Ok(renderer)
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        MiniJinjaRenderer::new()
    }
}

fn to_error(origin: &str, err: minijinja::Error) -> Error {
    let line = err.line().unwrap_or(1);
    let message = err.detail().map(String::from).unwrap_or_else(|| err.to_string());
    match err.kind() {
        ErrorKind::SyntaxError => {
            Error::TemplateSyntax { path: origin.to_string(), line, message }
        }
        _ => Error::Render { path: origin.to_string(), line, message },
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn compile(&self, origin: &str, source: &str) -> Result<CompiledTemplate> {
        let mut env = self.env.clone();
        env.add_template_owned(origin.to_string(), source.to_string())
            .map_err(|e| to_error(origin, e))?;
        Ok(CompiledTemplate { origin: origin.to_string(), source: source.to_string() })
    }

    fn render_compiled(
        &self,
        template: &CompiledTemplate,
        context: &serde_json::Value,
    ) -> Result<String> {
        self.env
            .render_named_str(&template.origin, &template.source, context)
            .map_err(|e| to_error(&template.origin, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_inline() {
        let engine = MiniJinjaRenderer::new();
        let context = json!({"cookiecutter": {"name": "demo"}});
        assert_eq!(engine.render("{{ cookiecutter.name | upper }}", &context).unwrap(), "DEMO");
    }

    #[test]
    fn test_syntax_error_carries_origin_and_line() {
        let engine = MiniJinjaRenderer::new();
        match engine.compile("src/main.py", "line one\n{% if %}\n") {
            Err(Error::TemplateSyntax { path, line, .. }) => {
                assert_eq!(path, "src/main.py");
                assert_eq!(line, 2);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_undefined_is_an_error() {
        let engine = MiniJinjaRenderer::new();
        let context = json!({"cookiecutter": {}});
        assert!(matches!(
            engine.render("{{ cookiecutter.missing }}", &context),
            Err(Error::Render { .. })
        ));
    }

    #[test]
    fn test_trailing_newline_and_no_escaping() {
        let engine = MiniJinjaRenderer::new();
        let compiled = engine.compile("index.html", "<p>{{ v }}</p>\n").unwrap();
        let out = engine.render_compiled(&compiled, &json!({"v": "<b>"})).unwrap();
        assert_eq!(out, "<p><b></p>\n");
    }

    #[test]
    fn test_unknown_extension() {
        let err = MiniJinjaRenderer::with_extensions(&["nope.Missing".to_string()], &[]);
        assert!(matches!(err, Err(Error::UnknownExtension { .. })));
    }
}
