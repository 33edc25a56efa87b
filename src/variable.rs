//! Declared template variables.
//!
//! A [`Variable`] is built once per entry of a version 2 manifest and checks its
//! own declaration: every option must have the expected JSON type, the variable
//! type must be known, choices must contain the default, skip-to directives are
//! only allowed on `yes_no` variables and the validation regex must compile.

use std::fmt;

use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Options a declaration may carry besides `name` and `default`.
const KNOWN_OPTIONS: [&str; 14] = [
    "name",
    "default",
    "type",
    "prompt",
    "description",
    "hide_input",
    "prompt_user",
    "choices",
    "skip_if",
    "do_if",
    "if_yes_skip_to",
    "if_no_skip_to",
    "validation",
    "validation_msg",
];

/// Supported variable types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarType {
    #[default]
    String,
    Boolean,
    YesNo,
    Int,
    Float,
    Uuid,
    Json,
}

impl VarType {
    /// Parses a manifest type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "yes_no" => Some(Self::YesNo),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "uuid" => Some(Self::Uuid),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::YesNo => "yes_no",
            Self::Int => "int",
            Self::Float => "float",
            Self::Uuid => "uuid",
            Self::Json => "json",
        }
    }

    /// Converts an accepted raw value into the declared type.
    ///
    /// Strings and JSON values pass through, booleans accept the usual yes/no
    /// spellings, numbers accept their textual form and UUIDs are normalised to
    /// the hyphenated lowercase form.
    pub fn deserialize(&self, variable: &str, raw: Value) -> Result<Value> {
        let invalid = |raw: &Value, reason: &str| Error::InvalidValue {
            variable: variable.to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        match self {
            Self::String | Self::Json => Ok(raw),
            Self::Boolean | Self::YesNo => match &raw {
                Value::Bool(_) => Ok(raw),
                Value::String(s) => parse_yes_no(s)
                    .map(Value::Bool)
                    .ok_or_else(|| invalid(&raw, "expected a yes/no value")),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(invalid(&raw, "expected 0 or 1")),
                },
                _ => Err(invalid(&raw, "expected a boolean")),
            },
            Self::Int => match &raw {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(raw),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|e| invalid(&raw, &e.to_string())),
                _ => Err(invalid(&raw, "expected an integer")),
            },
            Self::Float => {
                let parsed = match &raw {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                parsed
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| invalid(&raw, "expected a float"))
            }
            Self::Uuid => match &raw {
                Value::String(s) => uuid::Uuid::parse_str(s.trim())
                    .map(|u| Value::String(u.hyphenated().to_string()))
                    .map_err(|e| invalid(&raw, &e.to_string())),
                _ => Err(invalid(&raw, "expected a UUID string")),
            },
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the yes/no spellings accepted for boolean answers.
pub fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Named regex compile flags accepted in `validation_flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFlag {
    Ascii,
    Debug,
    IgnoreCase,
    Locale,
    Multiline,
    DotAll,
    Verbose,
}

impl ValidationFlag {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ascii" => Some(Self::Ascii),
            "debug" => Some(Self::Debug),
            "ignorecase" => Some(Self::IgnoreCase),
            "locale" => Some(Self::Locale),
            "multiline" => Some(Self::Multiline),
            "dotall" => Some(Self::DotAll),
            "verbose" => Some(Self::Verbose),
            _ => None,
        }
    }

    fn apply(&self, builder: &mut RegexBuilder) {
        match self {
            Self::Ascii => {
                builder.unicode(false);
            }
            Self::IgnoreCase => {
                builder.case_insensitive(true);
            }
            Self::Multiline => {
                builder.multi_line(true);
            }
            Self::DotAll => {
                builder.dot_matches_new_line(true);
            }
            Self::Verbose => {
                builder.ignore_whitespace(true);
            }
            // No regex-crate counterpart.
            Self::Debug | Self::Locale => {}
        }
    }
}

/// One declared template variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub default: Value,
    pub var_type: VarType,
    pub prompt: String,
    pub description: Option<String>,
    pub hide_input: bool,
    pub prompt_user: bool,
    pub choices: Vec<Value>,
    pub skip_if: Option<String>,
    pub do_if: Option<String>,
    pub if_yes_skip_to: Option<String>,
    pub if_no_skip_to: Option<String>,
    pub validation: Option<Regex>,
    pub validation_msg: Option<String>,
    pub validation_flags: Vec<ValidationFlag>,
}

impl Variable {
    /// Builds a variable from its name, default and the remaining declaration options.
    ///
    /// # Errors
    /// * `Error::InvalidVariable` when an option has the wrong JSON type, the type name
    ///   is unknown, the default is not one of the choices, a skip-to directive is set on
    ///   a non `yes_no` variable or the validation regex does not compile.
    ///
    /// Unknown validation flag names are logged and dropped.
    pub fn new(
        name: impl Into<String>,
        default: Value,
        options: &Map<String, Value>,
    ) -> Result<Self> {
        let name = name.into();
        let fail = |reason: String| Error::InvalidVariable { variable: name.clone(), reason };

        for key in options.keys() {
            if !KNOWN_OPTIONS.contains(&key.as_str()) && key != "validation_flags" {
                debug!("Variable '{name}': ignoring unknown option '{key}'");
            }
        }

        let var_type = match opt_str(&name, options, "type")? {
            Some(type_name) => VarType::parse(&type_name)
                .ok_or_else(|| fail(format!("unsupported type '{type_name}'")))?,
            None => VarType::String,
        };

        let prompt = opt_str(&name, options, "prompt")?
            .unwrap_or_else(|| format!("Please enter a value for \"{name}\""));
        let description = opt_str(&name, options, "description")?;
        let hide_input = opt_bool(&name, options, "hide_input")?.unwrap_or(false);
        let prompt_user =
            opt_bool(&name, options, "prompt_user")?.unwrap_or(true) && !name.starts_with('_');

        let choices = opt_array(&name, options, "choices")?.unwrap_or_default();
        if !choices.is_empty() && !choices.contains(&default) {
            return Err(fail(format!(
                "default value {default} is not one of the choices {}",
                Value::Array(choices.clone())
            )));
        }

        let skip_if = opt_str(&name, options, "skip_if")?;
        let do_if = opt_str(&name, options, "do_if")?;
        let if_yes_skip_to = opt_str(&name, options, "if_yes_skip_to")?;
        let if_no_skip_to = opt_str(&name, options, "if_no_skip_to")?;
        if (if_yes_skip_to.is_some() || if_no_skip_to.is_some()) && var_type != VarType::YesNo {
            return Err(fail(format!(
                "'if_yes_skip_to' and 'if_no_skip_to' require type 'yes_no', found '{var_type}'"
            )));
        }

        let validation_flags = parse_validation_flags(&name, options)?;
        let validation_msg = opt_str(&name, options, "validation_msg")?;
        let validation = match opt_str(&name, options, "validation")? {
            Some(pattern) => {
                let mut builder = RegexBuilder::new(&pattern);
                for flag in &validation_flags {
                    flag.apply(&mut builder);
                }
                Some(builder.build().map_err(|e| {
                    fail(format!("validation regex '{pattern}' does not compile: {e}"))
                })?)
            }
            None => None,
        };

        Ok(Self {
            name,
            default,
            var_type,
            prompt,
            description,
            hide_input,
            prompt_user,
            choices,
            skip_if,
            do_if,
            if_yes_skip_to,
            if_no_skip_to,
            validation,
            validation_msg,
            validation_flags,
        })
    }

    /// Builds a variable from a full declaration object carrying `name` and `default`.
    pub fn from_declaration(declaration: &Map<String, Value>) -> Result<Self> {
        let name = match declaration.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(Error::InvalidVariable {
                    variable: other.to_string(),
                    reason: "option 'name' expects string".to_string(),
                })
            }
            None => {
                return Err(Error::InvalidVariable {
                    variable: "<unnamed>".to_string(),
                    reason: "missing mandatory field 'name'".to_string(),
                })
            }
        };
        let default = declaration.get("default").cloned().ok_or_else(|| Error::InvalidVariable {
            variable: name.clone(),
            reason: "missing mandatory field 'default'".to_string(),
        })?;

        Self::new(name, default, declaration)
    }

    /// Whether `text` satisfies the validation regex; always true without one.
    ///
    /// The match must start at the beginning of the answer.
    pub fn is_valid(&self, text: &str) -> bool {
        match &self.validation {
            Some(regex) => regex.find(text).is_some_and(|m| m.start() == 0),
            None => true,
        }
    }

    /// The jump target selected by a resolved `yes_no` value, if any.
    pub fn skip_target(&self, value: &Value) -> Option<&str> {
        if self.var_type != VarType::YesNo {
            return None;
        }
        match value {
            Value::Bool(true) => self.if_yes_skip_to.as_deref(),
            Value::Bool(false) => self.if_no_skip_to.as_deref(),
            _ => None,
        }
    }
}

fn type_mismatch(variable: &str, option: &str, expected: &str, actual: &Value) -> Error {
    Error::InvalidVariable {
        variable: variable.to_string(),
        reason: format!("option '{option}' expects {expected}, got {actual}"),
    }
}

fn opt_str(variable: &str, options: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(type_mismatch(variable, key, "string", other)),
    }
}

fn opt_bool(variable: &str, options: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(type_mismatch(variable, key, "bool", other)),
    }
}

fn opt_array(
    variable: &str,
    options: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<Value>>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items.clone())),
        Some(other) => Err(type_mismatch(variable, key, "list", other)),
    }
}

fn parse_validation_flags(
    variable: &str,
    options: &Map<String, Value>,
) -> Result<Vec<ValidationFlag>> {
    let mut flags = Vec::new();
    for raw in opt_array(variable, options, "validation_flags")?.unwrap_or_default() {
        let Value::String(flag_name) = &raw else {
            return Err(type_mismatch(variable, "validation_flags", "list of strings", &raw));
        };
        match ValidationFlag::from_name(flag_name) {
            Some(flag) => flags.push(flag),
            None => warn!("Variable '{variable}': dropping unknown validation flag '{flag_name}'"),
        }
    }
    Ok(flags)
}
