//! Configuration resolver
//!
//! Turns a freshly parsed document into a resolved [`Config`]:
//!
//! 1. Every inheritable repository/backup field still at its zero value is
//!    copied from the matching field of the defaults block.
//! 2. The result is validated, stopping at the first violation.
//!
//! # Zero means unset
//!
//! A field explicitly set to `0`, `""` or `[]` cannot be told apart from an
//! absent one, so it still inherits the default. Configure a non-zero value
//! to opt out of a default.

use tracing::{debug, warn};

use crate::config::{
    Backup, BackupAge, BackupHandler, BackupOptions, Config, Policy, Repository,
    RepositoryHandler, RepositoryOptions,
};
use crate::error::{ResticCtlError, Result};
use std::collections::HashSet;

/// Path separator forbidden in repository and backup names.
const NAME_SEPARATOR: char = '/';

/// Copy `fallback` into `field` when `field` holds its zero value.
fn inherit<T: Default + PartialEq + Clone>(field: &mut T, fallback: &T) {
    if *field == T::default() {
        *field = fallback.clone();
    }
}

trait Inherit {
    fn inherit_from(&mut self, defaults: &Self);
}

impl Inherit for Policy {
    fn inherit_from(&mut self, defaults: &Self) {
        inherit(&mut self.keep_last, &defaults.keep_last);
        inherit(&mut self.keep_hourly, &defaults.keep_hourly);
        inherit(&mut self.keep_daily, &defaults.keep_daily);
        inherit(&mut self.keep_weekly, &defaults.keep_weekly);
        inherit(&mut self.keep_monthly, &defaults.keep_monthly);
        inherit(&mut self.keep_yearly, &defaults.keep_yearly);
        inherit(&mut self.keep_within, &defaults.keep_within);
        inherit(&mut self.keep_tags, &defaults.keep_tags);
    }
}

impl Inherit for RepositoryHandler {
    fn inherit_from(&mut self, defaults: &Self) {
        inherit(&mut self.check_success, &defaults.check_success);
        inherit(&mut self.check_failure, &defaults.check_failure);
        inherit(&mut self.forget_success, &defaults.forget_success);
        inherit(&mut self.forget_failure, &defaults.forget_failure);
    }
}

impl Inherit for RepositoryOptions {
    fn inherit_from(&mut self, defaults: &Self) {
        self.policy.inherit_from(&defaults.policy);
        self.handler.inherit_from(&defaults.handler);
        inherit(&mut self.limit_download, &defaults.limit_download);
        inherit(&mut self.limit_upload, &defaults.limit_upload);
    }
}

impl Inherit for BackupHandler {
    fn inherit_from(&mut self, defaults: &Self) {
        inherit(&mut self.before, &defaults.before);
        inherit(&mut self.after, &defaults.after);
        inherit(&mut self.success, &defaults.success);
        inherit(&mut self.failure, &defaults.failure);
        inherit(&mut self.age_warn, &defaults.age_warn);
        inherit(&mut self.age_error, &defaults.age_error);
    }
}

impl Inherit for BackupAge {
    fn inherit_from(&mut self, defaults: &Self) {
        inherit(&mut self.warn, &defaults.warn);
        inherit(&mut self.error, &defaults.error);
    }
}

impl Inherit for BackupOptions {
    fn inherit_from(&mut self, defaults: &Self) {
        self.handler.inherit_from(&defaults.handler);
        self.age.inherit_from(&defaults.age);
    }
}

/// Fill unset fields from the defaults block and validate the result.
pub fn resolve(mut config: Config) -> Result<Config> {
    apply_defaults(&mut config);
    validate(&config)?;
    debug!(
        "Resolved configuration: {} repositories, {} backups",
        config.repositories.len(),
        config.backups.len()
    );
    Ok(config)
}

/// Copy default values into every repository and backup field left unset.
pub fn apply_defaults(config: &mut Config) {
    let defaults = &config.defaults;
    for repository in &mut config.repositories {
        repository.options.inherit_from(&defaults.repositories);
    }
    for backup in &mut config.backups {
        backup.options.inherit_from(&defaults.backups);
    }
}

/// Validate a configuration whose defaults have already been applied.
pub fn validate(config: &Config) -> Result<()> {
    if config.restic_executable.is_empty() {
        return Err(ResticCtlError::validation("Restic executable path is empty."));
    }

    let mut repository_names: HashSet<&str> = HashSet::new();
    for repository in &config.repositories {
        validate_repository(repository)?;
        if !repository_names.insert(repository.name.as_str()) {
            return Err(ResticCtlError::validation(format!(
                "Repository name {} is used multiple times.",
                repository.name
            )));
        }
    }

    for backup in &config.backups {
        validate_backup(backup, config)?;
    }

    Ok(())
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ResticCtlError::validation(format!("{} has no name.", kind)));
    }
    if name.contains(NAME_SEPARATOR) {
        return Err(ResticCtlError::validation(format!(
            "{} name {} must not contain '{}'.",
            kind, name, NAME_SEPARATOR
        )));
    }
    Ok(())
}

fn validate_repository(repository: &Repository) -> Result<()> {
    validate_name("Repository", &repository.name)?;

    if repository.url.is_empty() {
        return Err(ResticCtlError::validation(format!(
            "Repository {} has no URL.",
            repository.name
        )));
    }

    if repository.password.is_empty() {
        return Err(ResticCtlError::validation(format!(
            "Repository {} has no password.",
            repository.name
        )));
    }

    if repository.check.read_data_percentage > 100 {
        return Err(ResticCtlError::validation(format!(
            "Repository {} check read data percentage outside expected range [0,100].",
            repository.name
        )));
    }

    Ok(())
}

fn validate_backup(backup: &Backup, config: &Config) -> Result<()> {
    validate_name("Backup", &backup.name)?;

    if backup.repository.is_empty() {
        return Err(ResticCtlError::validation(format!(
            "Backup {} has no repository.",
            backup.name
        )));
    }

    if config.repository_by_name(&backup.repository).is_none() {
        return Err(ResticCtlError::validation(format!(
            "Backup {} repository {} not defined.",
            backup.name, backup.repository
        )));
    }

    let has_paths = !backup.data.is_empty();
    let has_stdin = !backup.data_stdin_command.is_empty();

    if has_paths && has_stdin {
        return Err(ResticCtlError::validation(format!(
            "Backup {} can't use data from filesystem and stdin.",
            backup.name
        )));
    }

    if !has_paths && !has_stdin {
        return Err(ResticCtlError::validation(format!(
            "Backup {} needs something to backup.",
            backup.name
        )));
    }

    if has_stdin && backup.stdin_filename.is_empty() {
        return Err(ResticCtlError::validation(format!(
            "Backup {} from stdin needs a stdin filename.",
            backup.name
        )));
    }

    let age = &backup.options.age;
    if age.error.as_nanos() < age.warn.as_nanos() {
        return Err(ResticCtlError::validation(format!(
            "Backup {} age error limit < warn limit.",
            backup.name
        )));
    }

    if cfg!(windows) && backup.one_file_system {
        warn!(
            "Backup {}: restic option --one-file-system does not work as expected on windows yet.",
            backup.name
        );
    }

    Ok(())
}
