//! User hooks
//!
//! A hook is a command line from the configuration, run at a fixed point of
//! an operation. Before it runs, the template is expanded in three steps:
//!
//! 1. a leading `~` becomes the home directory
//! 2. placeholders are substituted: `{{.BackupName}}`, `{{.RepositoryName}}`
//!    and `{{.RepositoryURL}}` (spaces inside the braces are allowed)
//! 3. the result is split into words with POSIX shell quoting rules
//!
//! The first word is the program; no shell is involved. Hook failures are
//! logged and never change the outcome of the operation that fired them.

use std::process::Command;
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::config::{Backup, Environment, Repository};
use crate::error::{ResticCtlError, Result};

/// Point in an operation at which a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HookKind {
    Before,
    After,
    Success,
    Failure,
    AgeWarn,
    AgeError,
    CheckSuccess,
    CheckFailure,
    ForgetSuccess,
    ForgetFailure,
}

/// Values available to placeholders. Missing parts render as "".
#[derive(Debug, Clone, Copy, Default)]
pub struct HookContext<'a> {
    pub backup: Option<&'a Backup>,
    pub repository: Option<&'a Repository>,
}

impl<'a> HookContext<'a> {
    pub fn for_backup(backup: &'a Backup, repository: &'a Repository) -> Self {
        Self {
            backup: Some(backup),
            repository: Some(repository),
        }
    }

    pub fn for_repository(repository: &'a Repository) -> Self {
        Self {
            backup: None,
            repository: Some(repository),
        }
    }

    fn value(&self, key: &str) -> Option<&'a str> {
        match key {
            ".BackupName" => Some(self.backup.map_or("", |b| b.name.as_str())),
            ".RepositoryName" => Some(self.repository.map_or("", |r| r.name.as_str())),
            ".RepositoryURL" => Some(self.repository.map_or("", |r| r.url.as_str())),
            _ => None,
        }
    }
}

/// Replace every `{{ key }}` placeholder in `template`.
pub fn substitute(template: &str, context: &HookContext<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            ResticCtlError::hook(format!("unterminated placeholder in {:?}", template))
        })?;
        let key = after[..end].trim();
        let value = context
            .value(key)
            .ok_or_else(|| ResticCtlError::hook(format!("unknown placeholder {{{{{}}}}}", key)))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Split a command line into words. Empty lines and unbalanced quotes are errors.
pub fn tokenize(command_line: &str) -> Result<Vec<String>> {
    match shlex::split(command_line) {
        Some(words) if !words.is_empty() => Ok(words),
        Some(_) => Err(ResticCtlError::hook("empty command line")),
        None => Err(ResticCtlError::hook(format!(
            "unable to split command line {:?}",
            command_line
        ))),
    }
}

/// Expand `template` into an argument vector.
pub fn render(template: &str, context: &HookContext<'_>) -> Result<Vec<String>> {
    let expanded = shellexpand::tilde(template);
    let substituted = substitute(&expanded, context)?;
    tokenize(&substituted)
}

/// Build a command from an already-rendered command line, with `env`
/// layered over the inherited environment.
pub fn command(command_line: &str, env: &Environment) -> Result<Command> {
    let words = tokenize(command_line)?;
    let mut cmd = Command::new(&words[0]);
    cmd.args(&words[1..]).envs(env);
    Ok(cmd)
}

/// Fires hooks for one operation with a fixed environment and context.
#[derive(Debug, Clone)]
pub struct HookRunner<'a> {
    env: Environment,
    context: HookContext<'a>,
}

impl<'a> HookRunner<'a> {
    pub fn new(env: Environment, context: HookContext<'a>) -> Self {
        Self { env, context }
    }

    /// Render and run `template`, waiting for it to finish.
    pub fn execute(&self, kind: HookKind, template: &str) -> Result<()> {
        let words = render(template, &self.context)?;
        debug!("{} hook: {:?}", kind, words);

        let status = Command::new(&words[0])
            .args(&words[1..])
            .envs(&self.env)
            .status()
            .map_err(|e| ResticCtlError::hook(format!("failed to start {}: {}", words[0], e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(ResticCtlError::hook(format!(
                "{} exited with code {}",
                words[0],
                status.code().unwrap_or(-1)
            )))
        }
    }

    /// Run `template` if one is configured. Failures are logged only.
    pub fn fire(&self, kind: HookKind, template: &str) {
        if template.is_empty() {
            return;
        }
        info!("Running {} hook", kind);
        if let Err(e) = self.execute(kind, template) {
            warn!("Failed to run {} hook: {}", kind, e);
        }
    }
}
