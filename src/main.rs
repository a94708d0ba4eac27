//! maintgate - command-line entry point
//!
//! Usage:
//!   maintgate [apply]            Apply MAINTENANCE_MODE from the environment file
//!   maintgate render             Print the site for the current flag
//!   maintgate status             Compare the flag with the live site
//!   maintgate backups            List backups of the live site

use anyhow::{Context, Result};
use maintgate::config::{Config, Strategy, DEFAULT_CONFIG_PATH};
use maintgate::error::exit_code_for;
use maintgate::lock::RunLock;
use maintgate::service::SystemService;
use maintgate::workflow::{Outcome, Workflow};
use maintgate::{PKG_NAME, VERSION};
use std::env;
use std::path::PathBuf;
use tracing::{error, info};

/// Environment variable naming the configuration file
const CONFIG_ENV_VAR: &str = "MAINTGATE_CONFIG";

#[derive(Debug, PartialEq)]
enum Command {
    Apply,
    Render { maintenance: Option<bool> },
    Status { json: bool },
    Backups,
    Help,
    Version,
}

/// Options accepted before or after the command
#[derive(Debug, Default, PartialEq)]
struct GlobalOptions {
    config: Option<PathBuf>,
    env_file: Option<PathBuf>,
    site: Option<PathBuf>,
    template: Option<PathBuf>,
    legacy: bool,
}

fn main() {
    // Logs go to stderr so `render` output can be redirected cleanly
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("maintgate=info".parse().expect("valid log directive")),
        )
        .init();

    if let Err(e) = run() {
        error!(error = ?e, "maintgate failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code_for(&e));
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (options, command) = parse_args(&args)?;

    match command {
        Command::Help => {
            print_help();
            return Ok(());
        }
        Command::Version => {
            print_version();
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&options)?;
    let service = SystemService::from_config(&config.service)?;
    let workflow = Workflow::new(config, service);

    match command {
        Command::Apply => handle_apply(&workflow),
        Command::Render { maintenance } => handle_render(&workflow, maintenance),
        Command::Status { json } => handle_status(&workflow, json),
        Command::Backups => handle_backups(&workflow),
        Command::Help | Command::Version => Ok(()),
    }
}

fn parse_args(args: &[String]) -> Result<(GlobalOptions, Command)> {
    let mut options = GlobalOptions::default();
    let mut positional: Vec<&str> = Vec::new();
    let mut json = false;
    let mut maintenance = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .map(PathBuf::from)
                .with_context(|| format!("{} requires a value", name))
        };
        match arg.as_str() {
            "--config" | "-c" => options.config = Some(value(arg)?),
            "--env-file" => options.env_file = Some(value(arg)?),
            "--site" => options.site = Some(value(arg)?),
            "--template" => options.template = Some(value(arg)?),
            "--legacy" => options.legacy = true,
            "--json" => json = true,
            "--maintenance" => maintenance = Some(true),
            "--normal" => maintenance = Some(false),
            "--help" | "-h" => return Ok((options, Command::Help)),
            "--version" | "-v" => return Ok((options, Command::Version)),
            other if other.starts_with('-') => anyhow::bail!("unknown option: {}", other),
            other => positional.push(other),
        }
    }

    let command = match positional.first().copied() {
        None | Some("apply") => Command::Apply,
        Some("render") => Command::Render { maintenance },
        Some("status") => Command::Status { json },
        Some("backups") => Command::Backups,
        Some("help") => Command::Help,
        Some("version") => Command::Version,
        Some(other) => anyhow::bail!("unknown command: {} (see `maintgate help`)", other),
    };

    if positional.len() > 1 {
        anyhow::bail!("unexpected argument: {}", positional[1]);
    }

    Ok((options, command))
}

fn load_config(options: &GlobalOptions) -> Result<Config> {
    let explicit = options
        .config
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

    let mut config = match &explicit {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load_or_default(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_PATH))?,
    };

    if let Some(path) = &options.env_file {
        config.paths.env_file = path.clone();
    }
    if let Some(path) = &options.site {
        config.paths.site_config = path.clone();
    }
    if let Some(path) = &options.template {
        config.paths.template = path.clone();
    }
    if options.legacy {
        config.materializer.strategy = Strategy::Legacy;
    }

    info!(
        name = PKG_NAME,
        version = VERSION,
        config = %explicit.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".to_string()),
        site = %config.paths.site_config.display(),
        strategy = ?config.materializer.strategy,
        "Configuration loaded"
    );

    Ok(config)
}

fn handle_apply(workflow: &Workflow<SystemService>) -> Result<()> {
    let _lock = match &workflow.config().paths.lock_file {
        Some(path) => Some(RunLock::acquire(path)?),
        None => None,
    };

    let outcome = workflow.run()?;
    let state = if outcome.maintenance() { "enabled" } else { "disabled" };

    match &outcome {
        Outcome::Applied { .. } => println!("Maintenance mode {} (configuration updated and reloaded)", state),
        Outcome::Unchanged { .. } => println!("Maintenance mode already {}", state),
    }
    if let Some(backup) = outcome.backup() {
        println!("Backup: {}", backup.display());
    }

    Ok(())
}

fn handle_render(workflow: &Workflow<SystemService>, maintenance: Option<bool>) -> Result<()> {
    let maintenance = maintenance.unwrap_or_else(|| workflow.read_flag());
    let content = workflow.preview(maintenance)?;
    print!("{}", content);
    Ok(())
}

fn handle_status(workflow: &Workflow<SystemService>, json: bool) -> Result<()> {
    let status = workflow.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Site:             {}", status.site_config.display());
    println!("MAINTENANCE_MODE: {}", status.maintenance_flag);
    println!("Active block:     {}", status.active.as_str());
    println!("In sync:          {}", if status.in_sync { "yes" } else { "no" });
    println!("Backups:          {}", status.backups);
    Ok(())
}

fn handle_backups(workflow: &Workflow<SystemService>) -> Result<()> {
    let backups = workflow.backups().list()?;
    if backups.is_empty() {
        println!("No backups of {}", workflow.backups().live_path().display());
        return Ok(());
    }
    for backup in backups {
        println!("{}", backup.display());
    }
    Ok(())
}

fn print_help() {
    println!(r#"
maintgate - nginx maintenance mode switch

USAGE:
    maintgate [command] [options]

COMMANDS:
    apply                    Apply the flag from the environment file (default)
    render                   Print the site configuration for the current flag
      --maintenance          Render with maintenance mode on
      --normal               Render with maintenance mode off
    status                   Compare the flag with the live site configuration
      --json                 Print status as JSON
    backups                  List backups of the live site configuration

    help                     Show this help
    version                  Show version

OPTIONS:
    -c, --config <path>      Configuration file (default: {default_config})
    --env-file <path>        Environment file holding the flag
    --site <path>            Live nginx site file
    --template <path>        Site template
    --legacy                 Edit the live file in place instead of rendering a template

EXIT CODES:
    0   success or nothing to do
    1   unexpected error
    2   configuration check failed (backup restored)
    3   reload failed
    4   missing template or site file
    5   site file does not have the expected shape
    6   another run holds the lock file

ENVIRONMENT:
    {env_var}         Configuration file path
    RUST_LOG                 Log filter (default: maintgate=info)
"#, default_config = DEFAULT_CONFIG_PATH, env_var = CONFIG_ENV_VAR);
}

fn print_version() {
    println!("{} {}", PKG_NAME, VERSION);
}
