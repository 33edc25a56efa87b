//! Cutter generates projects from cookiecutter-style templates.
//! It locates a template, resolves its variables into a context, renders the
//! template tree and runs the template's hook scripts around generation.

/// Command-line interface module for the Cutter application
pub mod cli;

/// User configuration (`~/.cookiecutterrc`)
pub mod config;

/// Shared file names, context keys and environment variables
pub mod constants;

/// Context resolution for version 1 and version 2 manifests
pub mod context;

/// Error types and handling for the Cutter application
pub mod error;

/// Template filters and functions
pub mod extensions;

/// Template tree rendering
pub mod generate;

/// Hook script discovery and execution
/// Handles execution of scripts in:
/// - hooks/pre_prompt
/// - hooks/pre_gen_project
/// - hooks/post_gen_project
pub mod hooks;

/// Template acquisition from paths, caches, git and zip archives
pub mod loader;

pub mod logger;

/// Manifest (`cookiecutter.json`) loading and validation
pub mod manifest;

/// User input and interaction handling
pub mod prompt;

/// Template rendering engine
pub mod renderer;

/// Replay files
pub mod replay;

/// Generation run orchestration
pub mod runner;

/// Hook context encodings
pub mod serializer;

/// Variable declarations and typed values
pub mod variable;
