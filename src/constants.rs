//! Common constants used throughout the Cutter application.

/// Manifest file every template root must carry.
pub const MANIFEST_FILE: &str = "cookiecutter.json";

/// Namespace under which the resolved context is exposed to templates.
pub const CONTEXT_NAMESPACE: &str = "cookiecutter";

/// Directory holding hook scripts, relative to the template root.
pub const HOOKS_DIR: &str = "hooks";

/// Directory holding template-local filter plugins, relative to the template root.
pub const FILTERS_DIR: &str = "filters";

/// Extra-context sentinel that deletes a field from a variable declaration.
pub const REMOVE_FIELD: &str = "<<REMOVE::FIELD>>";

/// Fields every v2 variable declaration must keep.
pub const MANDATORY_FIELDS: [&str; 2] = ["name", "default"];

/// Top-level keys that mark a manifest as version 2.
pub const V2_REQUIRED_FIELDS: [&str; 3] = ["name", "cookiecutter_version", "variables"];

/// Top-level entries of a template root that are never the project directory.
pub const NON_TEMPLATE_ENTRIES: [&str; 7] =
    [".git", ".hg", ".svn", HOOKS_DIR, FILTERS_DIR, "templates", "__pycache__"];

/// Context keys with special meaning to the tree renderer and hook runner.
pub const COPY_WITHOUT_RENDER_KEY: &str = "_copy_without_render";
pub const NEW_LINES_KEY: &str = "_new_lines";
pub const EXTENSIONS_KEY: &str = "_extensions";
pub const HOOK_SERIALIZER_KEY: &str = "_hook_serializer";
pub const PROMPTS_KEY: &str = "__prompts__";

/// Environment variables consulted by the loader and config.
pub const CONFIG_ENV: &str = "COOKIECUTTER_CONFIG";
pub const REPO_PASSWORD_ENV: &str = "COOKIECUTTER_REPO_PASSWORD";

/// Number of leading bytes sampled when deciding whether a file is binary.
pub const BINARY_SAMPLE_SIZE: usize = 8000;
