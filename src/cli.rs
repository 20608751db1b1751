use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config_file::CONFIG_ENV;

/// resticctl - declarative backups on top of restic
#[derive(Parser, Debug)]
#[command(name = "resticctl")]
#[command(about = "Run restic backups, checks and retention from a single configuration file")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: <config dir>/resticctl/config.json)
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run backups (all configured backups when none are named)
    Backup {
        /// Backup names
        backups: Vec<String>,
    },
    /// Check repository integrity
    Check {
        /// Repository names
        repositories: Vec<String>,
    },
    /// Apply the retention policy and prune
    Forget {
        /// Repository names
        repositories: Vec<String>,
    },
    /// Compare backup age against the warn/error thresholds.
    ///
    /// Exit status: 0 all fresh, 2 a warning limit was reached, 3 an error
    /// limit was reached or the age could not be determined.
    CheckAge {
        /// Backup names
        backups: Vec<String>,
    },
    /// Show the age of every backup
    Age,
    /// List snapshots
    Snapshots {
        /// Repository names
        repositories: Vec<String>,
    },
    /// Initialize repositories
    Init {
        /// Repository names
        repositories: Vec<String>,
    },
    /// Mount a repository (blocks until unmounted)
    #[cfg(unix)]
    Mount {
        /// Repository name
        repository: String,
        /// Existing directory to mount on
        mount_point: PathBuf,
    },
    /// List configured repositories
    Repos,
    /// List configured backups
    Backups,
    /// Print an example configuration as a template
    ExampleConfig,
    /// Load and validate the configuration, then exit
    Validate,
}

impl Commands {
    /// Whether the command runs restic (and so needs the preflight check)
    pub fn needs_engine(&self) -> bool {
        !matches!(
            self,
            Self::Repos | Self::Backups | Self::ExampleConfig | Self::Validate
        )
    }

    /// Whether the command reads the configuration file
    pub fn needs_config(&self) -> bool {
        !matches!(self, Self::ExampleConfig)
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
