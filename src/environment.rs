//! Environment composition for engine and hook processes.
//!
//! Precedence, lowest first: the inherited process environment, the
//! repository's `environment`, the backup's `environment`, and finally the
//! engine credentials (`RESTIC_REPOSITORY`, `RESTIC_PASSWORD`).

use crate::config::{Backup, Environment, Repository};

/// Variable carrying the repository locator to restic.
pub const REPOSITORY_VAR: &str = "RESTIC_REPOSITORY";
/// Variable carrying the repository secret to restic.
pub const PASSWORD_VAR: &str = "RESTIC_PASSWORD";

/// New map with every entry of `base`, overwritten by same-keyed entries of
/// `overrides`. Neither input is modified.
pub fn combine(base: &Environment, overrides: &Environment) -> Environment {
    let mut result = base.clone();
    result.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    result
}

/// Repository environment with the backup's environment layered on top.
pub fn for_backup(repository: &Repository, backup: &Backup) -> Environment {
    combine(&repository.environment, &backup.environment)
}

/// Full overlay for an engine process: `extra` over the repository's own
/// environment, then the locator and secret.
pub fn for_engine(repository: &Repository, extra: &Environment) -> Environment {
    let mut env = combine(&repository.environment, extra);
    env.insert(REPOSITORY_VAR.to_string(), repository.url.clone());
    env.insert(PASSWORD_VAR.to_string(), repository.password.clone());
    env
}
