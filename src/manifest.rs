//! Template manifest loading.
//!
//! A manifest is either the legacy flat key/default object (version 1) or a
//! structured document carrying `name`, `cookiecutter_version` and an ordered
//! `variables` list (version 2). The version is detected from the presence of
//! those three top-level fields.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::constants::{
    EXTENSIONS_KEY, MANDATORY_FIELDS, MANIFEST_FILE, REMOVE_FIELD, V2_REQUIRED_FIELDS,
};
use crate::error::{Error, Result};
use crate::variable::{parse_yes_no, Variable};

/// A parsed template manifest.
#[derive(Debug, Clone)]
pub enum Manifest {
    V1(ManifestV1),
    V2(ManifestV2),
}

/// Legacy manifest: ordered key to default mapping.
#[derive(Debug, Clone)]
pub struct ManifestV1 {
    pub path: PathBuf,
    pub entries: Map<String, Value>,
}

/// Structured manifest with typed variable declarations.
#[derive(Debug, Clone)]
pub struct ManifestV2 {
    pub path: PathBuf,
    pub name: String,
    pub cookiecutter_version: String,
    /// Raw declarations, kept so extra context can rewrite them before construction.
    pub declarations: Vec<Map<String, Value>>,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub license: Option<String>,
    pub url: Option<String>,
    pub version: Option<String>,
    pub extensions: Vec<String>,
}

#[derive(Deserialize)]
struct RawManifestV2 {
    name: String,
    cookiecutter_version: String,
    variables: Vec<Map<String, Value>>,
    #[serde(default)]
    authors: Vec<String>,
    description: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    license: Option<String>,
    url: Option<String>,
    version: Option<String>,
    #[serde(default)]
    extensions: Vec<String>,
}

/// Caller-supplied extra context.
///
/// Either a plain name to value mapping, or a list of partial variable
/// declarations each identified by `name`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraContext {
    Values(IndexMap<String, Value>),
    Variables(Vec<Map<String, Value>>),
}

impl Default for ExtraContext {
    fn default() -> Self {
        Self::Values(IndexMap::new())
    }
}

impl ExtraContext {
    /// Accepts a JSON object or a list of JSON objects.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::Values(map.into_iter().collect())),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(Error::InvalidExtraContext(format!(
                        "list entries must be objects, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::Variables),
            other => Err(Error::InvalidExtraContext(format!(
                "expected an object or a list of objects, got {other}"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Values(values) => values.is_empty(),
            Self::Variables(entries) => entries.is_empty(),
        }
    }
}

impl Manifest {
    /// Reads `cookiecutter.json` from a template root.
    pub fn from_template_dir<P: AsRef<Path>>(template_dir: P) -> Result<Self> {
        Self::load(template_dir.as_ref().join(MANIFEST_FILE))
    }

    /// Reads and parses a manifest file.
    ///
    /// # Errors
    /// * `Error::InvalidManifest` when the file is not a JSON object, or a version 2
    ///   manifest fails schema validation or carries an invalid variable declaration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading manifest from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    /// Parses manifest content; `path` is only used for error reporting.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content).map_err(|e| Error::InvalidManifest {
            path: path.to_path_buf(),
            location: format!("line {}, column {}", e.line(), e.column()),
            reason: e.to_string(),
        })?;

        let Value::Object(object) = value else {
            return Err(Error::InvalidManifest {
                path: path.to_path_buf(),
                location: "document root".to_string(),
                reason: "expected a JSON object".to_string(),
            });
        };

        if V2_REQUIRED_FIELDS.iter().all(|field| object.contains_key(*field)) {
            debug!("Detected version 2 manifest");
            ManifestV2::from_object(path, object).map(Self::V2)
        } else {
            debug!("Detected version 1 manifest");
            Ok(Self::V1(ManifestV1 { path: path.to_path_buf(), entries: object }))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::V1(manifest) => &manifest.path,
            Self::V2(manifest) => &manifest.path,
        }
    }

    /// Renderer extensions requested by the template.
    pub fn extensions(&self) -> Vec<String> {
        match self {
            Self::V1(manifest) => match manifest.entries.get(EXTENSIONS_KEY) {
                Some(Value::Array(items)) => {
                    items.iter().filter_map(|v| v.as_str().map(String::from)).collect()
                }
                _ => Vec::new(),
            },
            Self::V2(manifest) => manifest.extensions.clone(),
        }
    }
}

fn v2_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "cookiecutter_version", "variables"],
        "properties": {
            "name": {"type": "string"},
            "cookiecutter_version": {"type": "string"},
            "variables": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "default"],
                    "properties": {"name": {"type": "string"}}
                }
            },
            "authors": {"type": "array", "items": {"type": "string"}},
            "description": {"type": "string"},
            "keywords": {"type": "array", "items": {"type": "string"}},
            "license": {"type": "string"},
            "url": {"type": "string"},
            "version": {"type": "string"},
            "extensions": {"type": "array", "items": {"type": "string"}}
        }
    })
}

impl ManifestV2 {
    fn from_object(path: &Path, object: Map<String, Value>) -> Result<Self> {
        let invalid = |location: String, reason: String| Error::InvalidManifest {
            path: path.to_path_buf(),
            location,
            reason,
        };

        if let Some(Value::Array(variables)) = object.get("variables") {
            for (index, declaration) in variables.iter().enumerate() {
                for field in MANDATORY_FIELDS {
                    if declaration.get(field).is_none() {
                        return Err(invalid(
                            format!("variables[{index}]"),
                            format!("missing mandatory field '{field}'"),
                        ));
                    }
                }
            }
        }

        let document = Value::Object(object);
        let validator = jsonschema::validator_for(&v2_schema())
            .map_err(|e| invalid("schema".to_string(), e.to_string()))?;
        let errors: Vec<String> = validator.iter_errors(&document).map(|e| e.to_string()).collect();
        if !errors.is_empty() {
            return Err(invalid("document".to_string(), errors.join("; ")));
        }

        let raw: RawManifestV2 = serde_json::from_value(document)
            .map_err(|e| invalid("document".to_string(), e.to_string()))?;

        let manifest = Self {
            path: path.to_path_buf(),
            name: raw.name,
            cookiecutter_version: raw.cookiecutter_version,
            declarations: raw.variables,
            authors: raw.authors,
            description: raw.description,
            keywords: raw.keywords,
            license: raw.license,
            url: raw.url,
            version: raw.version,
            extensions: raw.extensions,
        };

        // Declaration errors surface at load time, before any prompt.
        for (index, declaration) in manifest.declarations.iter().enumerate() {
            Variable::from_declaration(declaration)
                .map_err(|e| invalid(format!("variables[{index}]"), e.to_string()))?;
        }

        Ok(manifest)
    }

    /// Builds the variables after applying the override layers.
    ///
    /// `default_context` replaces defaults of matching variables, then `extra`
    /// does the same (mapping form) or rewrites whole declarations (list form).
    pub fn variables(
        &self,
        default_context: &IndexMap<String, Value>,
        extra: &ExtraContext,
    ) -> Result<Vec<Variable>> {
        let mut declarations = self.declarations.clone();
        override_defaults(&mut declarations, default_context);

        match extra {
            ExtraContext::Values(values) => override_defaults(&mut declarations, values),
            ExtraContext::Variables(entries) => {
                for entry in entries {
                    apply_declaration_override(&mut declarations, entry)?;
                }
            }
        }

        declarations.iter().map(Variable::from_declaration).collect()
    }
}

fn declaration_name(declaration: &Map<String, Value>) -> Option<&str> {
    declaration.get("name").and_then(Value::as_str)
}

fn override_defaults(declarations: &mut [Map<String, Value>], values: &IndexMap<String, Value>) {
    for (name, value) in values {
        match declarations.iter_mut().find(|d| declaration_name(d) == Some(name.as_str())) {
            Some(declaration) => {
                declaration.insert("default".to_string(), value.clone());
            }
            None => debug!("Ignoring override for undeclared variable '{name}'"),
        }
    }
}

fn apply_declaration_override(
    declarations: &mut [Map<String, Value>],
    entry: &Map<String, Value>,
) -> Result<()> {
    let name = declaration_name(entry).ok_or_else(|| {
        let entry = Value::Object(entry.clone());
        Error::InvalidExtraContext(format!("list entry {entry} has no 'name'"))
    })?;

    let declaration = declarations
        .iter_mut()
        .find(|d| declaration_name(d) == Some(name))
        .ok_or_else(|| Error::UnknownExtraContextVariable { name: name.to_string() })?;

    for (field, value) in entry {
        if field == "name" {
            continue;
        }
        if value.as_str() == Some(REMOVE_FIELD) {
            if MANDATORY_FIELDS.contains(&field.as_str()) {
                return Err(Error::MandatoryField {
                    variable: name.to_string(),
                    field: field.clone(),
                });
            }
            declaration.remove(field);
        } else {
            declaration.insert(field.clone(), value.clone());
        }
    }
    Ok(())
}

/// Applies an override layer to a version 1 context.
///
/// Choice lists get the override moved to the front, nested objects merge
/// recursively, booleans accept yes/no strings and unknown top-level keys are
/// ignored. Unknown keys inside nested objects are added.
pub fn apply_overwrites<'a, I>(
    context: &mut Map<String, Value>,
    overwrites: I,
    nested: bool,
) -> Result<()>
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    for (key, overwrite) in overwrites {
        let Some(current) = context.get_mut(key) else {
            if nested {
                context.insert(key.clone(), overwrite.clone());
            } else {
                debug!("Ignoring override for unknown key '{key}'");
            }
            continue;
        };

        match (current, overwrite) {
            (Value::Array(choices), Value::Array(_)) => {
                debug!("Replacing choices of '{key}'");
                *choices = overwrite.as_array().cloned().unwrap_or_default();
            }
            (Value::Array(choices), _) => match choices.iter().position(|c| c == overwrite) {
                Some(position) => {
                    let chosen = choices.remove(position);
                    choices.insert(0, chosen);
                }
                None => {
                    return Err(Error::InvalidExtraContext(format!(
                        "{overwrite} provided for choice variable '{key}', but the choices are {}",
                        Value::Array(choices.clone())
                    )))
                }
            },
            (Value::Object(inner), Value::Object(inner_overwrites)) => {
                apply_overwrites(inner, inner_overwrites.iter(), true)?;
            }
            (current @ Value::Bool(_), Value::String(answer)) => {
                let parsed = parse_yes_no(answer).ok_or_else(|| Error::InvalidValue {
                    variable: key.clone(),
                    value: overwrite.to_string(),
                    reason: "expected a yes/no value".to_string(),
                })?;
                *current = Value::Bool(parsed);
            }
            (current, _) => *current = overwrite.clone(),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_context_shapes() {
        assert!(matches!(
            ExtraContext::from_value(json!({"a": 1})).unwrap(),
            ExtraContext::Values(_)
        ));
        assert!(matches!(
            ExtraContext::from_value(json!([{"name": "a"}])).unwrap(),
            ExtraContext::Variables(_)
        ));
        assert!(ExtraContext::from_value(json!("a=1")).is_err());
        assert!(ExtraContext::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_apply_overwrites_choice_moves_to_front() {
        let mut context = json!({"license": ["MIT", "BSD", "GPL"]}).as_object().cloned().unwrap();
        let overwrites = json!({"license": "GPL"}).as_object().cloned().unwrap();
        apply_overwrites(&mut context, overwrites.iter(), false).unwrap();
        assert_eq!(context["license"], json!(["GPL", "MIT", "BSD"]));

        let bad = json!({"license": "WTFPL"}).as_object().cloned().unwrap();
        assert!(apply_overwrites(&mut context, bad.iter(), false).is_err());
    }

    #[test]
    fn test_apply_overwrites_nested_and_bool() {
        let mut context = json!({
            "use_docker": false,
            "settings": {"port": 8000},
        })
        .as_object()
        .cloned()
        .unwrap();
        let overwrites = json!({
            "use_docker": "yes",
            "settings": {"host": "localhost"},
            "unknown": 1,
        })
        .as_object()
        .cloned()
        .unwrap();
        apply_overwrites(&mut context, overwrites.iter(), false).unwrap();
        assert_eq!(
            Value::Object(context),
            json!({"use_docker": true, "settings": {"port": 8000, "host": "localhost"}})
        );
    }
}
