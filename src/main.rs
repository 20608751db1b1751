//! resticctl - Main entry point
//!
//! Parses the command line, loads the configuration, runs the preflight
//! check and hands each selected target to the orchestrator. The exit code
//! is the most severe per-target outcome.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use resticctl::cli::{Cli, Commands};
use resticctl::config::Config;
use resticctl::config_file;
use resticctl::logic::matcher;
use resticctl::orchestrator::{aggregate, Orchestrator, Outcome};
use resticctl::sanity;

/// Initialize tracing on stderr. RUST_LOG wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);
    debug!("CLI arguments parsed");

    let code = run(cli)?;
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    if !cli.command.needs_config() {
        println!("{}", config_file::example_config_json()?);
        return Ok(0);
    }

    let path = match cli.config {
        Some(path) => path,
        None => config_file::default_config_path()
            .context("Unable to determine the configuration directory")?,
    };
    let config = config_file::load_from_file(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;

    let orchestrator = Orchestrator::new(&config);
    if cli.command.needs_engine() {
        sanity::run_preflight_checks(orchestrator.engine())
            .context("Restic command is not available")?;
    }

    let outcome = match cli.command {
        Commands::Backup { backups } => {
            let selected = orchestrator.select_backups(&backups)?;
            aggregate(selected.into_iter().map(|b| orchestrator.backup_outcome(b)))
        }
        Commands::Check { repositories } => {
            let selected = orchestrator.select_repositories(&repositories)?;
            aggregate(selected.into_iter().map(|r| orchestrator.check_outcome(r)))
        }
        Commands::Forget { repositories } => {
            let selected = orchestrator.select_repositories(&repositories)?;
            aggregate(selected.into_iter().map(|r| orchestrator.forget_outcome(r)))
        }
        Commands::CheckAge { backups } => {
            let selected = orchestrator.select_backups(&backups)?;
            aggregate(selected.into_iter().map(|b| {
                let outcome = orchestrator.check_age_outcome(b);
                match outcome {
                    Outcome::Success => println!("✓ Backup {} is up to date", b.name),
                    Outcome::Warn => println!("! Warning limit reached for backup {}", b.name),
                    _ => println!("✗ Error limit reached for backup {}", b.name),
                }
                outcome
            }))
        }
        Commands::Age => print_ages(&orchestrator),
        Commands::Snapshots { repositories } => {
            let selected = orchestrator.select_repositories(&repositories)?;
            aggregate(selected.into_iter().map(|repository| {
                match orchestrator.snapshots(repository) {
                    Ok(listing) => {
                        println!("Snapshots for {} ({}):\n", repository.name, repository.url);
                        println!("{}", listing);
                        Outcome::Success
                    }
                    Err(e) => {
                        error!("Failed to list snapshots of {}: {}", repository.name, e);
                        Outcome::Failed
                    }
                }
            }))
        }
        Commands::Init { repositories } => {
            let selected = orchestrator.select_repositories(&repositories)?;
            aggregate(selected.into_iter().map(|repository| {
                match orchestrator.init(repository) {
                    Ok(()) => {
                        println!("✓ Repository {} initialized", repository.name);
                        Outcome::Success
                    }
                    Err(e) => {
                        error!("Failed to initialize {}: {}", repository.name, e);
                        Outcome::Failed
                    }
                }
            }))
        }
        #[cfg(unix)]
        Commands::Mount {
            repository,
            mount_point,
        } => mount(&orchestrator, &repository, mount_point)?,
        Commands::Repos => {
            print_repositories(&config);
            Outcome::Success
        }
        Commands::Backups => {
            print_backups(&config);
            Outcome::Success
        }
        Commands::Validate => {
            println!("✓ Configuration file is valid: {}", path.display());
            Outcome::Success
        }
        Commands::ExampleConfig => Outcome::Success,
    };

    info!("Finished with outcome {}", outcome);
    Ok(outcome.exit_code())
}

#[cfg(unix)]
fn mount(orchestrator: &Orchestrator<'_>, name: &str, mount_point: PathBuf) -> Result<Outcome> {
    let repository = orchestrator.config().require_repository(name)?;
    match orchestrator.mount(repository, &mount_point) {
        Ok(()) => Ok(Outcome::Success),
        Err(e) => {
            eprintln!("✗ Failed to mount repository {}: {}", name, e);
            Ok(Outcome::Failed)
        }
    }
}

fn print_ages(orchestrator: &Orchestrator<'_>) -> Outcome {
    let config = orchestrator.config();
    let now = Utc::now();
    let mut outcome = Outcome::Success;
    let mut rows = Vec::new();

    for backup in &config.backups {
        let age = config
            .repository_for(backup)
            .and_then(|repository| orchestrator.last_backup_time(backup, repository));
        let cell = match age {
            Ok(Some(last)) => {
                let elapsed = matcher::elapsed_since(last, now);
                humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
            }
            Ok(None) => "-".to_string(),
            Err(e) => {
                error!("Failed to get age for backup {}: {}", backup.name, e);
                outcome = Outcome::Failed;
                "?".to_string()
            }
        };
        rows.push(vec![
            backup.name.clone(),
            backup.data_summary(),
            backup.repository.clone(),
            cell,
        ]);
    }

    print_table(&["name", "data", "repository", "age"], &rows);
    outcome
}

fn print_repositories(config: &Config) {
    let rows: Vec<Vec<String>> = config
        .repositories
        .iter()
        .map(|repo| vec![repo.name.clone(), repo.url.clone()])
        .collect();
    print_table(&["name", "URL"], &rows);
}

fn print_backups(config: &Config) {
    let rows: Vec<Vec<String>> = config
        .backups
        .iter()
        .map(|backup| {
            vec![
                backup.name.clone(),
                backup.data_summary(),
                backup.repository.clone(),
            ]
        })
        .collect();
    print_table(&["name", "data", "repository"], &rows);
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header.
fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<String>| {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        println!("{}", line.join("  ").trim_end());
    };

    render(headers.iter().map(|h| h.to_string()).collect());
    render(headers.iter().map(|h| "-".repeat(h.chars().count())).collect());
    for row in rows {
        render(row.clone());
    }
}
