//! Context resolution.
//!
//! Turns a manifest plus the override layers into the ordered name to value
//! mapping every template is rendered against. Version 1 and version 2
//! manifests go through separate algorithms.

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::constants::{CONTEXT_NAMESPACE, PROMPTS_KEY};
use crate::error::{Error, Result};
use crate::manifest::{apply_overwrites, ExtraContext, Manifest, ManifestV1};
use crate::prompt::{display_value, prompt_choice, prompt_variable, Prompter};
use crate::renderer::TemplateRenderer;
use crate::variable::{parse_yes_no, Variable};

/// Resolved variables in declaration order.
pub type Context = Map<String, Value>;

/// Wraps a context under the namespace templates refer to (`cookiecutter.x`).
pub fn namespaced(context: &Context) -> Value {
    let mut root = Map::new();
    root.insert(CONTEXT_NAMESPACE.to_string(), Value::Object(context.clone()));
    Value::Object(root)
}

/// Override layers applied on top of the manifest defaults.
///
/// Precedence: `extra_context` over `default_context` over the manifest.
/// A `replay_context` replaces resolution entirely.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub default_context: IndexMap<String, Value>,
    pub extra_context: ExtraContext,
    pub replay_context: Option<Context>,
}

/// Jump bookkeeping for `if_yes_skip_to` / `if_no_skip_to`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SkipState {
    #[default]
    Scanning,
    Skipping(String),
}

impl SkipState {
    /// Whether the variable `name` should be processed. Reaching the pending
    /// target ends the jump and admits the target itself.
    pub fn admit(&mut self, name: &str) -> bool {
        let admitted = match self {
            Self::Scanning => true,
            Self::Skipping(target) => target == name,
        };
        if admitted {
            *self = Self::Scanning;
        }
        admitted
    }

    pub fn jump_to(&mut self, target: &str) {
        *self = Self::Skipping(target.to_string());
    }

    /// The target still being searched for, if any.
    pub fn pending(&self) -> Option<&str> {
        match self {
            Self::Scanning => None,
            Self::Skipping(target) => Some(target),
        }
    }
}

pub struct ContextResolver<'a> {
    engine: &'a dyn TemplateRenderer,
    prompter: &'a dyn Prompter,
}

impl<'a> ContextResolver<'a> {
    pub fn new(engine: &'a dyn TemplateRenderer, prompter: &'a dyn Prompter) -> Self {
        Self { engine, prompter }
    }

    /// Resolves a manifest into a context.
    ///
    /// With `no_input` every value comes from its (overridden, rendered) default.
    pub fn resolve(
        &self,
        manifest: &Manifest,
        overrides: &Overrides,
        no_input: bool,
    ) -> Result<Context> {
        if let Some(replay) = &overrides.replay_context {
            debug!("Using replayed context, skipping resolution");
            return Ok(replay.clone());
        }

        match manifest {
            Manifest::V1(manifest) => self.resolve_v1(manifest, overrides, no_input),
            Manifest::V2(manifest) => {
                let variables =
                    manifest.variables(&overrides.default_context, &overrides.extra_context)?;
                self.resolve_variables(&variables, no_input)
            }
        }
    }

    /// Version 2 resolution over already-constructed variables.
    ///
    /// Per variable: pending jumps first, then `skip_if` / `do_if`, then the
    /// value, then the variable's own jump directive.
    pub fn resolve_variables(&self, variables: &[Variable], no_input: bool) -> Result<Context> {
        let mut context = Context::new();
        let mut skip = SkipState::default();

        for variable in variables {
            if !skip.admit(&variable.name) {
                debug!(
                    "Skipping '{}' while jumping to '{}'",
                    variable.name,
                    skip.pending().unwrap_or_default()
                );
                continue;
            }

            let rendering = namespaced(&context);
            if let Some(expression) = &variable.skip_if {
                if self.evaluate_condition(variable, expression, &rendering)? {
                    debug!("Skipping '{}': skip_if is true", variable.name);
                    continue;
                }
            }
            if let Some(expression) = &variable.do_if {
                if !self.evaluate_condition(variable, expression, &rendering)? {
                    debug!("Skipping '{}': do_if is false", variable.name);
                    continue;
                }
            }

            let default = self.render_string(&variable.default, &rendering)?;
            let value = if no_input || !variable.prompt_user {
                variable.var_type.deserialize(&variable.name, default)?
            } else {
                let choices = variable
                    .choices
                    .iter()
                    .map(|choice| self.render_string(choice, &rendering))
                    .collect::<Result<Vec<_>>>()?;
                let raw = prompt_variable(self.prompter, variable, &default, &choices)?;
                variable.var_type.deserialize(&variable.name, raw)?
            };

            if let Some(target) = variable.skip_target(&value) {
                debug!("'{}' jumps to '{target}'", variable.name);
                skip.jump_to(target);
            }
            context.insert(variable.name.clone(), value);
        }

        if let Some(target) = skip.pending() {
            warn!("Skip target '{target}' was never found in the manifest");
        }

        Ok(context)
    }

    /// Renders a `skip_if` / `do_if` expression to a boolean. An empty result is false.
    fn evaluate_condition(
        &self,
        variable: &Variable,
        expression: &str,
        rendering: &Value,
    ) -> Result<bool> {
        let rendered = self.engine.render(expression, rendering)?;
        let rendered = rendered.trim();
        if rendered.is_empty() {
            return Ok(false);
        }
        parse_yes_no(rendered).ok_or_else(|| Error::InvalidValue {
            variable: variable.name.clone(),
            value: rendered.to_string(),
            reason: format!("condition '{expression}' did not render to a boolean"),
        })
    }

    fn render_string(&self, value: &Value, rendering: &Value) -> Result<Value> {
        match value {
            Value::String(template) => Ok(Value::String(self.engine.render(template, rendering)?)),
            other => Ok(other.clone()),
        }
    }

    /// Renders strings nested anywhere inside lists and objects.
    fn render_deep(&self, value: &Value, rendering: &Value) -> Result<Value> {
        match value {
            Value::String(_) => self.render_string(value, rendering),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render_deep(item, rendering))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut rendered = Map::new();
                for (key, item) in map {
                    let key = self.engine.render(key, rendering)?;
                    rendered.insert(key, self.render_deep(item, rendering)?);
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    }

    /// Legacy flat resolution.
    ///
    /// `_` keys are copied verbatim and `__` keys rendered without prompting.
    /// Other keys prompt by the shape of their default: booleans as yes/no,
    /// lists as a choice, objects as JSON (in a second pass, so they can refer
    /// to everything else), anything else as free text.
    fn resolve_v1(
        &self,
        manifest: &ManifestV1,
        overrides: &Overrides,
        no_input: bool,
    ) -> Result<Context> {
        let mut entries = manifest.entries.clone();
        apply_overwrites(&mut entries, overrides.default_context.iter(), false)?;
        match &overrides.extra_context {
            ExtraContext::Values(values) => apply_overwrites(&mut entries, values.iter(), false)?,
            ExtraContext::Variables(_) => {
                return Err(Error::InvalidExtraContext(
                    "list-form extra context requires a version 2 manifest".to_string(),
                ))
            }
        }

        // Prompt labels only; never part of the resolved context.
        let prompts = match entries.shift_remove(PROMPTS_KEY) {
            Some(Value::Object(prompts)) => prompts,
            _ => Map::new(),
        };
        let prompt_for = |key: &str| match prompts.get(key) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Object(labels)) => {
                labels.get("__prompt__").and_then(Value::as_str).unwrap_or(key).to_string()
            }
            _ => key.to_string(),
        };

        let mut context = Context::new();

        for (key, raw) in &entries {
            if key.starts_with('_') && !key.starts_with("__") {
                context.insert(key.clone(), raw.clone());
                continue;
            }
            let rendering = namespaced(&context);
            if key.starts_with("__") {
                let value = self.render_deep(raw, &rendering)?;
                context.insert(key.clone(), value);
                continue;
            }

            let value = match raw {
                Value::Object(_) => continue,
                Value::Bool(default) => {
                    if no_input {
                        raw.clone()
                    } else {
                        Value::Bool(self.prompter.yes_no(&prompt_for(key), *default)?)
                    }
                }
                Value::Array(options) => {
                    let choices = options
                        .iter()
                        .map(|option| self.render_deep(option, &rendering))
                        .collect::<Result<Vec<_>>>()?;
                    match choices.first() {
                        None => Value::Array(Vec::new()),
                        Some(first) if no_input => first.clone(),
                        Some(first) => {
                            let first = first.clone();
                            prompt_choice(self.prompter, &prompt_for(key), &choices, &first)?
                        }
                    }
                }
                Value::String(_) => {
                    let rendered = self.render_string(raw, &rendering)?;
                    if no_input {
                        rendered
                    } else {
                        let default = display_value(&rendered);
                        let answer = self.prompter.text(&prompt_for(key), Some(&default))?;
                        Value::String(answer)
                    }
                }
                other if no_input => other.clone(),
                other => {
                    let answer = self.prompter.text(&prompt_for(key), Some(&display_value(other)))?;
                    Value::String(answer)
                }
            };
            context.insert(key.clone(), value);
        }

        for (key, raw) in &entries {
            if key.starts_with('_') || !raw.is_object() {
                continue;
            }
            let rendered = self.render_deep(raw, &namespaced(&context))?;
            let value = if no_input {
                rendered
            } else {
                self.read_user_dict(&prompt_for(key), rendered)?
            };
            context.insert(key.clone(), value);
        }

        Ok(context)
    }

    /// Prompts for a JSON object, re-asking until the answer decodes to one.
    fn read_user_dict(&self, prompt: &str, default: Value) -> Result<Value> {
        let default_text = default.to_string();
        loop {
            let answer = self.prompter.text(prompt, Some(&default_text))?;
            if answer == default_text {
                return Ok(default);
            }
            match serde_json::from_str::<Value>(&answer) {
                Ok(value @ Value::Object(_)) => return Ok(value),
                Ok(_) => self.prompter.notify("Requires JSON dict."),
                Err(e) => self.prompter.notify(&format!("Unable to decode JSON: {e}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_state_reaches_target() {
        let mut skip = SkipState::default();
        assert!(skip.admit("a"));
        skip.jump_to("d");
        assert!(!skip.admit("b"));
        assert!(!skip.admit("c"));
        assert_eq!(skip.pending(), Some("d"));
        assert!(skip.admit("d"));
        assert_eq!(skip.pending(), None);
        assert!(skip.admit("e"));
    }

    #[test]
    fn test_skip_state_unreached_target_stays_pending() {
        let mut skip = SkipState::default();
        skip.jump_to("missing");
        for name in ["a", "b", "c"] {
            assert!(!skip.admit(name));
        }
        assert_eq!(skip.pending(), Some("missing"));
    }

    #[test]
    fn test_namespaced() {
        let mut context = Context::new();
        context.insert("name".to_string(), Value::from("demo"));
        assert_eq!(namespaced(&context), serde_json::json!({"cookiecutter": {"name": "demo"}}));
    }
}
