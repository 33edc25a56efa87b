//! Error handling for the Cutter application.
//! Defines the error type shared by every stage of a generation run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for Cutter operations.
///
/// Each variant maps to one failure condition so callers can branch on it.
/// Declaration and resolution errors are raised before any output is written;
/// filesystem precondition, rendering and hook errors abort a run in progress.
#[derive(Error, Debug)]
pub enum Error {
    /// A variable declaration in the manifest is invalid.
    #[error("Invalid variable '{variable}': {reason}.")]
    InvalidVariable { variable: String, reason: String },

    /// The manifest file could not be decoded or failed validation.
    #[error("Invalid manifest '{}' at {location}: {reason}.", path.display())]
    InvalidManifest { path: PathBuf, location: String, reason: String },

    /// Extra context was supplied in an unsupported shape.
    #[error("Invalid extra context: {0}.")]
    InvalidExtraContext(String),

    /// A list-form extra context entry names a variable the manifest does not declare.
    #[error("Extra context entry '{name}' does not match any declared variable.")]
    UnknownExtraContextVariable { name: String },

    /// Extra context tried to remove a field every variable must carry.
    #[error("Cannot remove mandatory field '{field}' from variable '{variable}'.")]
    MandatoryField { variable: String, field: String },

    /// A value could not be converted into the declared variable type.
    #[error("Invalid value {value} for variable '{variable}': {reason}.")]
    InvalidValue { variable: String, value: String, reason: String },

    /// Template source failed to compile.
    #[error("Template syntax error in '{path}' at line {line}: {message}.")]
    TemplateSyntax { path: String, line: usize, message: String },

    /// Template compiled but failed while rendering (undefined variable, bad filter call).
    #[error("Unable to render '{path}' (line {line}): {message}.")]
    Render { path: String, line: usize, message: String },

    /// A renderer extension named by the template does not exist.
    #[error("Unknown extension: '{name}'.")]
    UnknownExtension { name: String },

    /// The project directory of the template has no template syntax in its name.
    #[error("The project directory '{}' is not templated.", dir.display())]
    NonTemplatedInputDir { dir: PathBuf },

    /// More than one directory could be the project directory.
    #[error(
        "Ambiguous template: more than one project directory candidate ({}).",
        candidates.join(", ")
    )]
    AmbiguousTemplateDir { candidates: Vec<String> },

    /// No project directory exists in the template.
    #[error("No project directory found in template '{}'.", template_dir.display())]
    TemplateDirNotFound { template_dir: PathBuf },

    /// The project directory already exists and overwriting was not requested.
    #[error("Output directory '{output_dir}' already exists.")]
    OutputDirectoryExists { output_dir: String },

    /// A hook script exited with a non-zero status or could not run.
    #[error("Hook script '{hook}' failed: {reason}.")]
    FailedHook { hook: String, reason: String },

    /// The template could not be located.
    #[error(
        "A valid repository for \"{template}\" could not be found \
         in the following locations: {}.",
        tried.join(", ")
    )]
    RepositoryNotFound { template: String, tried: Vec<String> },

    /// The zip archive is not a usable template.
    #[error("Zip repository '{path}' is invalid: {reason}.")]
    InvalidZipRepository { path: String, reason: String },

    /// The repository uses a version control system that cannot be cloned.
    #[error("Unsupported version control system for '{url}'.")]
    UnsupportedVcs { url: String },

    /// A replay file is missing or malformed.
    #[error("Invalid replay file '{}': {reason}.", path.display())]
    Replay { path: PathBuf, reason: String },

    /// Mutually exclusive options were combined.
    #[error("Invalid mode: {0}.")]
    InvalidMode(String),

    /// User configuration errors.
    #[error("Configuration error: {0}.")]
    Config(String),

    /// User interaction failed.
    #[error("Prompt error: {0}.")]
    Prompt(String),

    /// The copy-without-render pattern list is invalid.
    #[error("Invalid copy-without-render pattern: {0}.")]
    CopyWithoutRender(String),

    /// Serializer registration or hook (de)serialization failed.
    #[error("Serializer error: {0}.")]
    Serializer(String),

    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}.")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}.")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Git error: {0}.")]
    Git2Error(#[from] git2::Error),

    #[error("Zip error: {0}.")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP error: {0}.")]
    HttpError(#[from] reqwest::Error),
}

/// Convenience type alias for Results with [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// Prints the error message to stderr and exits with status code 1.
pub fn default_error_handler(err: Error) {
    eprintln!("{err}");
    std::process::exit(1);
}
