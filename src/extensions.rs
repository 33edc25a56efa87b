//! Filters and global functions available to templates.
//!
//! Extensions are an explicit list: the built-in bundles below, selected by
//! name, and filter plugins discovered in the template's `filters/` directory.
//! The renderer only sees named filters and functions.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{Local, TimeDelta, Utc};
use cruet::Inflector;
use log::debug;
use minijinja::value::{Kwargs, Rest};
use minijinja::{Environment, ErrorKind};
use rand::Rng;
use serde::Serialize;

use crate::constants::FILTERS_DIR;
use crate::error::Result;

/// Built-in extension bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Jsonify,
    RandomString,
    Slugify,
    Time,
    Uuid,
    Inflection,
}

impl Extension {
    /// Bundles every renderer starts with.
    pub const DEFAULTS: [Extension; 5] =
        [Self::Jsonify, Self::RandomString, Self::Slugify, Self::Time, Self::Uuid];

    /// Resolves a short or fully qualified extension name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "jsonify" | "cookiecutter.extensions.JsonifyExtension" => Some(Self::Jsonify),
            "random_string" | "cookiecutter.extensions.RandomStringExtension" => {
                Some(Self::RandomString)
            }
            "slugify" | "cookiecutter.extensions.SlugifyExtension" => Some(Self::Slugify),
            "time" | "cookiecutter.extensions.TimeExtension" | "jinja2_time.TimeExtension" => {
                Some(Self::Time)
            }
            "uuid" | "cookiecutter.extensions.UUIDExtension" => Some(Self::Uuid),
            "inflection" => Some(Self::Inflection),
            _ => None,
        }
    }

    pub fn register(&self, env: &mut Environment<'static>) {
        match self {
            Self::Jsonify => env.add_filter("jsonify", jsonify),
            Self::RandomString => env.add_function("random_ascii_string", random_ascii_string),
            Self::Slugify => env.add_filter("slugify", slugify_filter),
            Self::Time => env.add_function("now", now),
            Self::Uuid => env.add_function("uuid4", || uuid::Uuid::new_v4().to_string()),
            Self::Inflection => {
                env.add_filter("snake_case", |v: String| v.to_snake_case());
                env.add_filter("kebab_case", |v: String| v.to_kebab_case());
                env.add_filter("camel_case", |v: String| v.to_camel_case());
                env.add_filter("pascal_case", |v: String| v.to_pascal_case());
                env.add_filter("plural", |v: String| v.to_plural());
                env.add_filter("singular", |v: String| v.to_singular());
            }
        }
    }
}

fn invalid(message: impl Into<String>) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Reads an argument given either by keyword or by position.
fn argument<'a, T>(
    kwargs: &'a Kwargs,
    name: &'a str,
    positional: Option<T>,
) -> std::result::Result<Option<T>, minijinja::Error>
where
    T: minijinja::value::ArgType<'a, Output = T>,
{
    match kwargs.get::<Option<T>>(name)? {
        Some(_) if positional.is_some() => {
            Err(invalid(format!("argument '{name}' given by position and by keyword")))
        }
        Some(value) => Ok(Some(value)),
        None => Ok(positional),
    }
}

fn jsonify(
    value: minijinja::Value,
    indent: Option<usize>,
    kwargs: Kwargs,
) -> std::result::Result<String, minijinja::Error> {
    let indent = argument(&kwargs, "indent", indent)?;
    kwargs.assert_all_used()?;
    let indent = " ".repeat(indent.unwrap_or(4));
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer).map_err(|e| invalid(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| invalid(e.to_string()))
}

fn slugify_filter(
    value: String,
    separator: Option<String>,
    kwargs: Kwargs,
) -> std::result::Result<String, minijinja::Error> {
    let separator = argument(&kwargs, "separator", separator)?;
    kwargs.assert_all_used()?;
    Ok(slugify(&value, separator.as_deref().unwrap_or("-")))
}

/// Lowercases `value` and joins runs of alphanumerics with `separator`.
/// Apostrophes are dropped so "Bob's" becomes "bobs".
pub fn slugify(value: &str, separator: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push_str(separator);
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        } else if c != '\'' {
            pending_separator = true;
        }
    }
    slug
}

fn random_ascii_string(
    length: Option<usize>,
    punctuation: Option<bool>,
    kwargs: Kwargs,
) -> std::result::Result<String, minijinja::Error> {
    let length = argument(&kwargs, "length", length)?
        .ok_or_else(|| invalid("random_ascii_string requires a length"))?;
    let punctuation = argument(&kwargs, "punctuation", punctuation)?.unwrap_or(false);
    kwargs.assert_all_used()?;
    Ok(random_string(length, punctuation))
}

fn random_string(length: usize, punctuation: bool) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const PUNCTUATION: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

    let mut charset = LETTERS.to_vec();
    if punctuation {
        charset.extend_from_slice(PUNCTUATION);
    }
    let mut rng = rand::rng();
    (0..length).map(|_| charset[rng.random_range(0..charset.len())] as char).collect()
}

fn out_of_range(offset: &str) -> String {
    format!("offset '{offset}' is out of range")
}

/// Parses `[+|-]unit=n[,unit=n...]` into a signed duration.
pub fn parse_offset(text: &str) -> std::result::Result<TimeDelta, String> {
    let text = text.trim();
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text.strip_prefix('+').unwrap_or(text)),
    };

    let mut total = TimeDelta::zero();
    for part in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (unit, amount) =
            part.split_once('=').ok_or_else(|| format!("invalid offset component '{part}'"))?;
        let amount: i64 =
            amount.trim().parse().map_err(|_| format!("invalid offset amount in '{part}'"))?;
        let delta = match unit.trim() {
            "weeks" => TimeDelta::try_weeks(amount),
            "days" => TimeDelta::try_days(amount),
            "hours" => TimeDelta::try_hours(amount),
            "minutes" => TimeDelta::try_minutes(amount),
            "seconds" => TimeDelta::try_seconds(amount),
            other => return Err(format!("unknown offset unit '{other}'")),
        }
        .ok_or_else(|| out_of_range(part))?;
        total = total.checked_add(&delta).ok_or_else(|| out_of_range(text))?;
    }
    total.checked_mul(sign).ok_or_else(|| out_of_range(text))
}

fn now(
    tz: Option<String>,
    format: Option<String>,
    offset: Option<String>,
    kwargs: Kwargs,
) -> std::result::Result<String, minijinja::Error> {
    let tz = argument(&kwargs, "tz", tz)?;
    let format = argument(&kwargs, "format", format)?;
    let offset = argument(&kwargs, "offset", offset)?;
    kwargs.assert_all_used()?;

    let format = format.unwrap_or_else(|| "%Y-%m-%d".to_string());
    let delta = match offset.as_deref() {
        Some(text) => parse_offset(text).map_err(invalid)?,
        None => TimeDelta::zero(),
    };

    let unreachable_time = || invalid("time offset is out of range");
    let mut out = String::new();
    let written = match tz.as_deref().unwrap_or("utc").to_lowercase().as_str() {
        "utc" => {
            let time = Utc::now().checked_add_signed(delta).ok_or_else(unreachable_time)?;
            write!(out, "{}", time.format(&format))
        }
        "local" => {
            let time = Local::now().checked_add_signed(delta).ok_or_else(unreachable_time)?;
            write!(out, "{}", time.format(&format))
        }
        other => return Err(invalid(format!("unsupported timezone '{other}'"))),
    };
    written.map_err(|_| invalid(format!("invalid time format '{format}'")))?;
    Ok(out)
}

/// An executable in the template's `filters/` directory, exposed as a filter
/// named after its file stem.
///
/// The filter writes the value to the executable's stdin, passes extra filter
/// arguments as argv and uses stdout (without trailing newlines) as the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPlugin {
    pub name: String,
    pub path: PathBuf,
}

impl FilterPlugin {
    /// Lists executable filter plugins of a template, sorted by name.
    pub fn discover<P: AsRef<Path>>(template_dir: P) -> Result<Vec<FilterPlugin>> {
        let dir = template_dir.as_ref().join(FILTERS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut plugins = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() || !is_executable(&path)? {
                debug!("Skipping non-executable filter candidate {}", path.display());
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                plugins.push(FilterPlugin { name: name.to_string(), path: path.clone() });
            }
        }
        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plugins)
    }

    pub fn register(&self, env: &mut Environment<'static>) {
        debug!("Registering filter plugin '{}' from {}", self.name, self.path.display());
        let path = self.path.clone();
        env.add_filter(self.name.clone(), move |value: String, args: Rest<String>| {
            run_filter(&path, &value, &args)
        });
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::metadata(path)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> Result<bool> {
    Ok(true)
}

fn run_filter(
    path: &Path,
    value: &str,
    args: &[String],
) -> std::result::Result<String, minijinja::Error> {
    let failed =
        |reason: String| invalid(format!("filter plugin '{}' failed: {reason}", path.display()));

    let mut child = Command::new(path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| failed(e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(value.as_bytes()).map_err(|e| failed(e.to_string()))?;
    }

    let output = child.wait_with_output().map_err(|e| failed(e.to_string()))?;
    if !output.status.success() {
        return Err(failed(format!("exited with {}", output.status)));
    }
    let stdout = String::from_utf8(output.stdout).map_err(|e| failed(e.to_string()))?;
    Ok(stdout.trim_end_matches(['\n', '\r']).to_string())
}
