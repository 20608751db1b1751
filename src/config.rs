//! Configuration model: repositories, backups and the shared defaults block.
//!
//! These types mirror the JSON document one-to-one. Every optional field uses
//! its zero value (0, "", empty list, zero duration) as "not set"; the
//! resolver in [`crate::logic::resolver`] fills such fields from
//! [`Defaults`] and then validates the whole document.
//!
//! Empty fields are skipped on serialization so a resolved configuration
//! prints back as a compact document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::duration::AgeDuration;
use crate::error::{ResticCtlError, Result};

/// Conventional name of the engine executable.
pub const DEFAULT_RESTIC_EXECUTABLE: &str = "restic";

/// Environment variable overrides, ordered for deterministic output.
pub type Environment = BTreeMap<String, String>;

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Retention policy handed to `restic forget --prune`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    #[serde(skip_serializing_if = "is_zero")]
    pub keep_last: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub keep_hourly: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub keep_daily: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub keep_weekly: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub keep_monthly: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub keep_yearly: u32,
    /// Passed through verbatim, e.g. `"1y5m7d2h"`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub keep_within: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keep_tags: Vec<String>,
}

/// Repository check settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Check {
    /// Share of pack data to read back during `check`, 0-100
    #[serde(skip_serializing_if = "is_zero")]
    pub read_data_percentage: u32,
}

/// Hooks fired around repository maintenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryHandler {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub forget_success: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub forget_failure: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub check_success: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub check_failure: String,
}

/// Repository fields that may be inherited from `defaults.repositories`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryOptions {
    #[serde(skip_serializing_if = "is_default")]
    pub policy: Policy,
    #[serde(skip_serializing_if = "is_default")]
    pub handler: RepositoryHandler,
    /// KiB/s, 0 means unlimited
    #[serde(skip_serializing_if = "is_zero")]
    pub limit_download: u32,
    /// KiB/s, 0 means unlimited
    #[serde(skip_serializing_if = "is_zero")]
    pub limit_upload: u32,
}

/// A named restic repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub name: String,
    pub url: String,
    pub password: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: Environment,
    #[serde(skip_serializing_if = "is_default")]
    pub check: Check,
    #[serde(flatten)]
    pub options: RepositoryOptions,
}

/// Hooks fired around a backup and its age check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupHandler {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub before: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub after: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub success: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub failure: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub age_warn: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub age_error: String,
}

/// Age thresholds for `check-age`. Invariant after resolution: `warn <= error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupAge {
    #[serde(skip_serializing_if = "AgeDuration::is_zero")]
    pub warn: AgeDuration,
    #[serde(skip_serializing_if = "AgeDuration::is_zero")]
    pub error: AgeDuration,
}

/// Backup fields that may be inherited from `defaults.backups`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupOptions {
    #[serde(skip_serializing_if = "is_default")]
    pub handler: BackupHandler,
    #[serde(skip_serializing_if = "is_default")]
    pub age: BackupAge,
}

/// A named backup job targeting one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backup {
    pub name: String,
    pub repository: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data_stdin_command: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdin_filename: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub one_file_system: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: Environment,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_flags: Vec<String>,
    #[serde(flatten)]
    pub options: BackupOptions,
}

/// Where a backup's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource<'a> {
    /// Filesystem paths, in declaration order
    Paths(&'a [String]),
    /// Output of a shell command stored under `filename`
    Stdin { command: &'a str, filename: &'a str },
}

impl Backup {
    /// The backup's data source. Only meaningful on a validated backup,
    /// where exactly one of paths/stdin command is set.
    pub fn data_source(&self) -> DataSource<'_> {
        if self.data_stdin_command.is_empty() {
            DataSource::Paths(&self.data)
        } else {
            DataSource::Stdin {
                command: &self.data_stdin_command,
                filename: &self.stdin_filename,
            }
        }
    }

    /// Short description of the data source for listings.
    pub fn data_summary(&self) -> String {
        match self.data_source() {
            DataSource::Paths(paths) => paths.join(","),
            DataSource::Stdin { command, .. } => command.to_string(),
        }
    }
}

/// Fallback values for repositories and backups. Never validated on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    #[serde(skip_serializing_if = "is_default")]
    pub repositories: RepositoryOptions,
    #[serde(skip_serializing_if = "is_default")]
    pub backups: BackupOptions,
}

/// Whole configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub restic_executable: String,
    #[serde(skip_serializing_if = "is_default")]
    pub defaults: Defaults,
    pub repositories: Vec<Repository>,
    pub backups: Vec<Backup>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            restic_executable: DEFAULT_RESTIC_EXECUTABLE.to_string(),
            defaults: Defaults::default(),
            repositories: Vec::new(),
            backups: Vec::new(),
        }
    }
}

impl Config {
    /// First repository with the given name.
    pub fn repository_by_name(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|repo| repo.name == name)
    }

    /// First backup with the given name.
    pub fn backup_by_name(&self, name: &str) -> Option<&Backup> {
        self.backups.iter().find(|backup| backup.name == name)
    }

    /// Like [`Config::repository_by_name`] but a missing name is a reference error.
    pub fn require_repository(&self, name: &str) -> Result<&Repository> {
        self.repository_by_name(name)
            .ok_or_else(|| ResticCtlError::UnknownRepository(name.to_string()))
    }

    /// Like [`Config::backup_by_name`] but a missing name is a reference error.
    pub fn require_backup(&self, name: &str) -> Result<&Backup> {
        self.backup_by_name(name)
            .ok_or_else(|| ResticCtlError::UnknownBackup(name.to_string()))
    }

    /// The repository a backup writes to.
    pub fn repository_for(&self, backup: &Backup) -> Result<&Repository> {
        self.require_repository(&backup.repository)
    }
}

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}
