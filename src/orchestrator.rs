//! Operation orchestrator
//!
//! Drives each operation through its stages (see [`crate::stage`]):
//!
//! | Operation | Stages | Result hooks |
//! |-----------|--------|--------------|
//! | backup    | preflight, unlock, before, restic backup, after, result | success / failure |
//! | check     | unlock, restic check, result | check_success / check_failure |
//! | forget    | unlock, restic forget --prune, result | forget_success / forget_failure |
//! | check-age | unlock, snapshot listing, result | age_warn / age_error |
//!
//! The `after` hook runs whenever the primary step ran, whatever its result.
//! An operation aborted before its primary step still fires its failure
//! hook. Hooks never change an operation's outcome.
//!
//! Each call handles one backup or repository. Calls share no mutable
//! state, so callers may run them in parallel.

use chrono::{DateTime, Utc};
use std::path::Path;
use strum::Display;
use tracing::{error, info, warn};

use crate::config::{Backup, Config, DataSource, Environment, Repository};
use crate::engine::args::{
    BackupArgs, CheckArgs, EngineArgs, ForgetArgs, InitArgs, MountArgs, SnapshotsArgs, UnlockArgs,
};
use crate::engine::snapshot::parse_snapshots;
use crate::engine::{Engine, OutputMode};
use crate::environment;
use crate::error::{ResticCtlError, Result};
use crate::hooks::{self, HookContext, HookKind, HookRunner};
use crate::logic::matcher::{self, AgeStatus};
use crate::stage::{Operation, Stage, StageTracker};

/// Final result of one operation, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Outcome {
    Success,
    Warn,
    Error,
    Failed,
}

impl Outcome {
    /// Process exit code for this outcome.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::Warn => 2,
            Self::Error => 3,
        }
    }

    pub const fn from_age(status: AgeStatus) -> Self {
        match status {
            AgeStatus::Ok => Self::Success,
            AgeStatus::Warn => Self::Warn,
            AgeStatus::Error => Self::Error,
        }
    }
}

/// Most severe of `outcomes`; `Success` when empty.
pub fn aggregate(outcomes: impl IntoIterator<Item = Outcome>) -> Outcome {
    outcomes.into_iter().max().unwrap_or(Outcome::Success)
}

/// Runs operations against the repositories and backups of one configuration.
#[derive(Debug, Clone)]
pub struct Orchestrator<'a> {
    config: &'a Config,
    engine: Engine,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            engine: Engine::new(config.restic_executable.as_str()),
        }
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    // ========================================================================
    // Target selection
    // ========================================================================

    /// Backups named in `names`, or all configured backups when empty.
    pub fn select_backups(&self, names: &[String]) -> Result<Vec<&'a Backup>> {
        if names.is_empty() {
            return Ok(self.config.backups.iter().collect());
        }
        names.iter().map(|name| self.config.require_backup(name)).collect()
    }

    /// Repositories named in `names`, or all configured repositories when empty.
    pub fn select_repositories(&self, names: &[String]) -> Result<Vec<&'a Repository>> {
        if names.is_empty() {
            return Ok(self.config.repositories.iter().collect());
        }
        names
            .iter()
            .map(|name| self.config.require_repository(name))
            .collect()
    }

    // ========================================================================
    // Backup
    // ========================================================================

    /// Back up `backup` into `repository`.
    pub fn backup(&self, backup: &Backup, repository: &Repository) -> Result<()> {
        let handler = &backup.options.handler;
        let hooks = HookRunner::new(
            environment::for_backup(repository, backup),
            HookContext::for_backup(backup, repository),
        );
        let mut run = StageTracker::new(Operation::Backup);

        run.enter(Stage::Preflight)?;
        if let Err(e) = self.probe(repository, &backup.environment) {
            error!("Repository {} is not available: {}", repository.name, e);
            return Err(abort(&mut run, &hooks, HookKind::Failure, &handler.failure, e));
        }

        run.enter(Stage::Unlock)?;
        if let Err(e) = self.unlock(repository, &backup.environment) {
            return Err(abort(&mut run, &hooks, HookKind::Failure, &handler.failure, e));
        }

        run.enter(Stage::PreHook)?;
        hooks.fire(HookKind::Before, &handler.before);

        run.enter(Stage::Primary)?;
        info!(
            "Backing up {} ({}) to repository {}",
            backup.name,
            backup.data_summary(),
            repository.name
        );
        let result = self.run_backup(backup, repository);

        run.enter(Stage::PostHook)?;
        hooks.fire(HookKind::After, &handler.after);

        run.enter(Stage::ResultHook)?;
        match result {
            Ok(()) => {
                hooks.fire(HookKind::Success, &handler.success);
                run.enter(Stage::Done)?;
                Ok(())
            }
            Err(e) => {
                hooks.fire(HookKind::Failure, &handler.failure);
                run.fail();
                Err(e)
            }
        }
    }

    fn run_backup(&self, backup: &Backup, repository: &Repository) -> Result<()> {
        let args = BackupArgs { backup };
        let output = match backup.data_source() {
            DataSource::Paths(_) => {
                self.engine
                    .run(repository, &backup.environment, &args, OutputMode::Inherit)?
            }
            DataSource::Stdin { command, .. } => {
                let producer =
                    hooks::command(command, &environment::for_backup(repository, backup))?;
                self.engine
                    .run_piped(repository, &backup.environment, &args, producer)?
            }
        };
        output.ensure_success(&format!(
            "Backup {} to repository {}",
            backup.name, repository.name
        ))
    }

    /// Backup with the outcome logged rather than returned.
    pub fn backup_outcome(&self, backup: &Backup) -> Outcome {
        let result = self
            .config
            .repository_for(backup)
            .and_then(|repository| self.backup(backup, repository));
        match result {
            Ok(()) => Outcome::Success,
            Err(e) => {
                error!("Backup {} failed: {}", backup.name, e);
                Outcome::Failed
            }
        }
    }

    // ========================================================================
    // Repository maintenance
    // ========================================================================

    /// `restic check`, reading back the configured share of data.
    pub fn check(&self, repository: &Repository) -> Result<()> {
        let handler = &repository.options.handler;
        self.maintain(
            Operation::Check,
            repository,
            &CheckArgs::for_repository(repository),
            (handler.check_success.as_str(), handler.check_failure.as_str()),
        )
    }

    /// `restic forget --prune` with the repository's policy.
    pub fn forget(&self, repository: &Repository) -> Result<()> {
        let handler = &repository.options.handler;
        self.maintain(
            Operation::Forget,
            repository,
            &ForgetArgs {
                policy: &repository.options.policy,
            },
            (handler.forget_success.as_str(), handler.forget_failure.as_str()),
        )
    }

    pub fn check_outcome(&self, repository: &Repository) -> Outcome {
        log_outcome("Check", repository, self.check(repository))
    }

    pub fn forget_outcome(&self, repository: &Repository) -> Outcome {
        log_outcome("Forget", repository, self.forget(repository))
    }

    fn maintain<A: EngineArgs>(
        &self,
        operation: Operation,
        repository: &Repository,
        args: &A,
        (on_success, on_failure): (&str, &str),
    ) -> Result<()> {
        let (success_kind, failure_kind) = match operation {
            Operation::Forget => (HookKind::ForgetSuccess, HookKind::ForgetFailure),
            _ => (HookKind::CheckSuccess, HookKind::CheckFailure),
        };
        let hooks = HookRunner::new(
            repository.environment.clone(),
            HookContext::for_repository(repository),
        );
        let mut run = StageTracker::new(operation);

        run.enter(Stage::Unlock)?;
        if let Err(e) = self.unlock(repository, &Environment::new()) {
            return Err(abort(&mut run, &hooks, failure_kind, on_failure, e));
        }

        run.enter(Stage::Primary)?;
        let result = self
            .engine
            .run(repository, &Environment::new(), args, OutputMode::Inherit)
            .and_then(|output| {
                output.ensure_success(&format!(
                    "{} repository {}",
                    operation, repository.name
                ))
            });

        run.enter(Stage::ResultHook)?;
        match result {
            Ok(()) => {
                hooks.fire(success_kind, on_success);
                run.enter(Stage::Done)?;
                Ok(())
            }
            Err(e) => {
                hooks.fire(failure_kind, on_failure);
                run.fail();
                Err(e)
            }
        }
    }

    // ========================================================================
    // Age checks
    // ========================================================================

    /// Classify how long ago `backup` last completed. Never backed up,
    /// unlock failures and listing failures all fire the `age_error` hook.
    pub fn check_age(&self, backup: &Backup, repository: &Repository) -> Result<AgeStatus> {
        let handler = &backup.options.handler;
        let hooks = HookRunner::new(
            environment::for_backup(repository, backup),
            HookContext::for_backup(backup, repository),
        );
        let mut run = StageTracker::new(Operation::CheckAge);

        run.enter(Stage::Unlock)?;
        if let Err(e) = self.unlock(repository, &backup.environment) {
            return Err(abort(&mut run, &hooks, HookKind::AgeError, &handler.age_error, e));
        }

        run.enter(Stage::Primary)?;
        let last = match self.last_backup_time(backup, repository) {
            Ok(last) => last,
            Err(e) => {
                return Err(abort(&mut run, &hooks, HookKind::AgeError, &handler.age_error, e));
            }
        };
        let status = matcher::classify(last, Utc::now(), &backup.options.age);

        run.enter(Stage::ResultHook)?;
        match (status, last) {
            (AgeStatus::Ok, _) => {}
            (AgeStatus::Warn, _) => {
                warn!("Warning limit reached for backup {}", backup.name);
                hooks.fire(HookKind::AgeWarn, &handler.age_warn);
            }
            (AgeStatus::Error, None) => {
                error!("Backup {} has never completed", backup.name);
                hooks.fire(HookKind::AgeError, &handler.age_error);
            }
            (AgeStatus::Error, Some(_)) => {
                error!("Error limit reached for backup {}", backup.name);
                hooks.fire(HookKind::AgeError, &handler.age_error);
            }
        }
        run.enter(Stage::Done)?;
        Ok(status)
    }

    pub fn check_age_outcome(&self, backup: &Backup) -> Outcome {
        let result = self
            .config
            .repository_for(backup)
            .and_then(|repository| self.check_age(backup, repository));
        match result {
            Ok(status) => Outcome::from_age(status),
            Err(e) => {
                error!("Age check of backup {} failed: {}", backup.name, e);
                Outcome::Error
            }
        }
    }

    /// Time of the newest snapshot of `backup` taken on this host.
    pub fn last_backup_time(
        &self,
        backup: &Backup,
        repository: &Repository,
    ) -> Result<Option<DateTime<Utc>>> {
        let output = self.engine.run(
            repository,
            &backup.environment,
            &SnapshotsArgs { json: true },
            OutputMode::Capture,
        )?;
        output.ensure_success(&format!("List snapshots of repository {}", repository.name))?;
        let snapshots = parse_snapshots(&output.stdout)?;
        let hostname = matcher::current_hostname();
        Ok(matcher::last_backup_time(backup, &snapshots, hostname.as_deref()))
    }

    // ========================================================================
    // Plain restic commands
    // ========================================================================

    /// Human readable snapshot listing.
    pub fn snapshots(&self, repository: &Repository) -> Result<String> {
        self.unlock(repository, &Environment::new())?;
        let output = self.engine.run(
            repository,
            &Environment::new(),
            &SnapshotsArgs { json: false },
            OutputMode::Capture,
        )?;
        output.ensure_success(&format!("List snapshots of repository {}", repository.name))?;
        Ok(output.stdout)
    }

    /// Create the repository.
    pub fn init(&self, repository: &Repository) -> Result<()> {
        info!("Initializing repository {}", repository.name);
        self.engine
            .run(repository, &Environment::new(), &InitArgs, OutputMode::Inherit)?
            .ensure_success(&format!("Initialize repository {}", repository.name))
    }

    /// Mount the repository; blocks until restic exits.
    pub fn mount(&self, repository: &Repository, mount_point: &Path) -> Result<()> {
        if !mount_point.is_dir() {
            return Err(ResticCtlError::engine(format!(
                "Mount point {} is not a directory",
                mount_point.display()
            )));
        }
        self.unlock(repository, &Environment::new())?;
        self.engine
            .run(
                repository,
                &Environment::new(),
                &MountArgs { mount_point },
                OutputMode::Inherit,
            )?
            .ensure_success(&format!("Mount repository {}", repository.name))
    }

    fn probe(&self, repository: &Repository, extra_env: &Environment) -> Result<()> {
        self.engine
            .run(repository, extra_env, &SnapshotsArgs { json: false }, OutputMode::Quiet)?
            .ensure_success(&format!("Open repository {}", repository.name))
    }

    fn unlock(&self, repository: &Repository, extra_env: &Environment) -> Result<()> {
        self.engine
            .run(repository, extra_env, &UnlockArgs, OutputMode::Quiet)?
            .ensure_success(&format!("Unlock repository {}", repository.name))
    }
}

/// Fire the failure hook for an operation that cannot reach its primary
/// step and mark it failed.
fn abort(
    run: &mut StageTracker,
    hooks: &HookRunner<'_>,
    kind: HookKind,
    template: &str,
    err: ResticCtlError,
) -> ResticCtlError {
    error!("{} aborted while {}: {}", run.operation(), run.current_stage(), err);
    if run.enter(Stage::ResultHook).is_ok() {
        hooks.fire(kind, template);
    }
    run.fail();
    err
}

fn log_outcome(what: &str, repository: &Repository, result: Result<()>) -> Outcome {
    match result {
        Ok(()) => Outcome::Success,
        Err(e) => {
            error!("{} of repository {} failed: {}", what, repository.name, e);
            Outcome::Failed
        }
    }
}
