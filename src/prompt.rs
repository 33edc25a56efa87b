//! User input and interaction handling.
//!
//! [`Prompter`] is the raw interaction seam (text, yes/no, choice); the typed
//! prompting rules for declared variables live in [`prompt_variable`].

use dialoguer::{Confirm, Input, Password, Select};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::variable::{VarType, Variable};

/// Interaction seam used by the resolver, the loader and the hook runner.
pub trait Prompter {
    /// Asks a safety question (replace a cached template, run hooks).
    /// Returns `true` without asking when `skip_confirmation` is set.
    fn confirm(&self, skip_confirmation: bool, prompt: String) -> Result<bool>;

    /// Reads a line of text; an empty answer yields `default` when given.
    fn text(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Reads a line of text without echoing it.
    fn password(&self, prompt: &str) -> Result<String>;

    fn yes_no(&self, prompt: &str, default: bool) -> Result<bool>;

    /// Returns the index of the selected item.
    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize>;

    /// Shows an informational or retry message.
    fn notify(&self, message: &str);
}

/// Terminal prompter backed by dialoguer.
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self
    }
}

fn prompt_error(e: dialoguer::Error) -> Error {
    Error::Prompt(e.to_string())
}

impl Prompter for DialoguerPrompter {
    fn confirm(&self, skip_confirmation: bool, prompt: String) -> Result<bool> {
        if skip_confirmation {
            return Ok(true);
        }
        Confirm::new().with_prompt(prompt).default(false).interact().map_err(prompt_error)
    }

    fn text(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(prompt_error)
    }

    fn password(&self, prompt: &str) -> Result<String> {
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(prompt_error)
    }

    fn yes_no(&self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::new().with_prompt(prompt).default(default).interact().map_err(prompt_error)
    }

    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize> {
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }

    fn notify(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Text shown for a value inside a prompt.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Asks the user to pick one of `choices`; `default` is preselected when present.
pub fn prompt_choice(
    prompter: &dyn Prompter,
    prompt: &str,
    choices: &[Value],
    default: &Value,
) -> Result<Value> {
    let items: Vec<String> = choices.iter().map(display_value).collect();
    let default_index = choices.iter().position(|c| c == default).unwrap_or(0);
    let selected = prompter.select(prompt, &items, default_index)?;
    choices
        .get(selected)
        .cloned()
        .ok_or_else(|| Error::Prompt(format!("selection {selected} is out of range")))
}

/// Prompts for one declared variable and returns the raw accepted answer.
///
/// Choices take precedence over the type-specific prompt. Text answers are
/// re-asked until they match the validation regex and parse as the declared
/// type; malformed JSON re-prompts instead of failing.
pub fn prompt_variable(
    prompter: &dyn Prompter,
    variable: &Variable,
    default: &Value,
    choices: &[Value],
) -> Result<Value> {
    if let Some(description) = &variable.description {
        prompter.notify(description);
    }

    if !choices.is_empty() {
        return prompt_choice(prompter, &variable.prompt, choices, default);
    }

    match variable.var_type {
        VarType::Boolean | VarType::YesNo => {
            let default = variable
                .var_type
                .deserialize(&variable.name, default.clone())
                .ok()
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            prompter.yes_no(&variable.prompt, default).map(Value::Bool)
        }
        VarType::String => {
            prompt_text(prompter, variable, default, |answer| Ok(Value::String(answer)))
        }
        VarType::Int | VarType::Float | VarType::Uuid => {
            prompt_text(prompter, variable, default, |answer| {
                variable
                    .var_type
                    .deserialize(&variable.name, Value::String(answer))
                    .map_err(|e| e.to_string())
            })
        }
        VarType::Json => prompt_text(prompter, variable, default, |answer| {
            serde_json::from_str::<Value>(&answer)
                .map_err(|e| format!("Unable to decode JSON: {e}"))
        }),
    }
}

fn prompt_text<F>(
    prompter: &dyn Prompter,
    variable: &Variable,
    default: &Value,
    parse: F,
) -> Result<Value>
where
    F: Fn(String) -> std::result::Result<Value, String>,
{
    let default_text = display_value(default);
    loop {
        let answer = if variable.hide_input {
            let answer = prompter.password(&variable.prompt)?;
            if answer.is_empty() {
                default_text.clone()
            } else {
                answer
            }
        } else {
            prompter.text(&variable.prompt, Some(&default_text))?
        };

        if !variable.is_valid(&answer) {
            if let Some(regex) = &variable.validation {
                prompter.notify(&format!(
                    "Input validation failure against regex: '{}', try again!",
                    regex.as_str()
                ));
            }
            if let Some(message) = &variable.validation_msg {
                prompter.notify(message);
            }
            continue;
        }

        match parse(answer) {
            Ok(value) => return Ok(value),
            Err(reason) => prompter.notify(&reason),
        }
    }
}
