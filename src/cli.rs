//! Command-line interface implementation for Cutter.
//! Provides argument parsing and help text formatting using clap, and turns
//! parsed arguments into a generation run.

use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use log::debug;
use serde_json::Value;

use crate::config::get_user_config;
use crate::error::{Error, Result};
use crate::hooks::HookPolicy;
use crate::loader::list_installed;
use crate::manifest::ExtraContext;
use crate::prompt::DialoguerPrompter;
use crate::runner::{self, RunOptions};

/// Whether hook scripts may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AcceptHooks {
    #[default]
    Yes,
    Ask,
    No,
}

impl From<AcceptHooks> for HookPolicy {
    fn from(value: AcceptHooks) -> Self {
        match value {
            AcceptHooks::Yes => HookPolicy::Yes,
            AcceptHooks::Ask => HookPolicy::Ask,
            AcceptHooks::No => HookPolicy::No,
        }
    }
}

/// Command-line arguments structure for Cutter.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Cutter: create projects from cookiecutter templates",
    long_about = None
)]
pub struct Args {
    /// Template path, cached template name, abbreviation (gh:user/repo), git URL or zip archive
    #[arg(value_name = "TEMPLATE", required_unless_present = "list_installed")]
    pub template: Option<String>,

    /// Extra context as key=value pairs, overriding manifest defaults
    #[arg(value_name = "EXTRA_CONTEXT", value_parser = parse_key_val)]
    pub extra_context: Vec<(String, String)>,

    /// Do not prompt; use defaults and extra context only
    #[arg(long)]
    pub no_input: bool,

    /// Branch, tag or commit to check out after cloning
    #[arg(short, long)]
    pub checkout: Option<String>,

    /// Template subdirectory containing cookiecutter.json
    #[arg(long)]
    pub directory: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Reuse the answers recorded by the last run of this template
    #[arg(long)]
    pub replay: bool,

    /// Reuse the answers stored in this file
    #[arg(long, value_name = "PATH")]
    pub replay_file: Option<PathBuf>,

    /// Render into an existing project directory
    #[arg(short = 'f', long)]
    pub overwrite_if_exists: bool,

    /// Leave files that already exist untouched
    #[arg(short, long)]
    pub skip_if_file_exists: bool,

    /// Directory the project is generated in
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// User configuration file
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Ignore user configuration files
    #[arg(long)]
    pub default_config: bool,

    /// Whether hook scripts may run
    #[arg(long, value_enum, default_value_t = AcceptHooks::Yes)]
    pub accept_hooks: AcceptHooks,

    /// Keep the partially generated project when a run fails
    #[arg(long)]
    pub keep_project_on_failure: bool,

    /// Kill hook scripts that run longer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub hook_timeout: Option<f64>,

    /// JSON file with extra context (an object, or a list of variable overrides)
    #[arg(long, value_name = "PATH")]
    pub extra_context_file: Option<PathBuf>,

    /// List templates installed in the template cache
    #[arg(short, long)]
    pub list_installed: bool,
}

/// Parses a `key=value` pair.
pub fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid KEY=VALUE: no `=` found in `{s}`")),
    }
}

/// Parses command line arguments and returns the Args structure.
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if e.kind() == ErrorKind::MissingRequiredArgument {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}

/// Combines the extra context file and the command-line pairs.
///
/// Pairs are added to an object-form file; they cannot be combined with a
/// list-form file.
pub fn build_extra_context(args: &Args) -> Result<ExtraContext> {
    let from_file = match &args.extra_context_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            ExtraContext::from_value(serde_json::from_str(&content)?)?
        }
        None => ExtraContext::default(),
    };

    match from_file {
        ExtraContext::Values(mut values) => {
            for (key, value) in &args.extra_context {
                values.insert(key.clone(), Value::String(value.clone()));
            }
            Ok(ExtraContext::Values(values))
        }
        ExtraContext::Variables(_) if !args.extra_context.is_empty() => {
            Err(Error::InvalidExtraContext(
                "key=value pairs cannot be combined with a list of variable overrides".to_string(),
            ))
        }
        variables => Ok(variables),
    }
}

/// Runs the command described by `args`.
pub fn run(args: Args) -> Result<()> {
    let config = get_user_config(args.config_file.as_deref(), args.default_config)?;
    debug!("Using config {config:?}");

    if args.list_installed {
        let names = list_installed(&config.cookiecutters_dir)?;
        println!("{} installed templates:", names.len());
        for name in names {
            println!(" * {name}");
        }
        return Ok(());
    }

    let hook_timeout = match args.hook_timeout {
        Some(seconds) => Some(
            Duration::try_from_secs_f64(seconds)
                .map_err(|e| Error::InvalidMode(format!("invalid hook timeout {seconds}: {e}")))?,
        ),
        None => None,
    };

    let options = RunOptions {
        extra_context: build_extra_context(&args)?,
        template: args.template.unwrap_or_default(),
        checkout: args.checkout,
        no_input: args.no_input,
        replay: args.replay,
        replay_file: args.replay_file,
        overwrite_if_exists: args.overwrite_if_exists,
        skip_if_file_exists: args.skip_if_file_exists,
        output_dir: args.output_dir,
        password: None,
        directory: args.directory,
        hook_policy: args.accept_hooks.into(),
        keep_project_on_failure: args.keep_project_on_failure,
        hook_timeout,
    };

    let prompter = DialoguerPrompter::new();
    let project_dir = runner::run(&options, &config, &prompter)?;
    println!("Project generated in {}.", project_dir.display());
    Ok(())
}
