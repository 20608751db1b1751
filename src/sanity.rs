//! Pre-flight sanity checks
//!
//! Before any command that talks to a repository, verify that the
//! configured restic executable can be started and answers `restic version`.
//! Listing and config commands skip this check.

use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{ResticCtlError, Result};

/// Result of the engine availability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityCheckResult {
    pub executable: String,
    /// First line of `restic version`, when it ran successfully
    pub version: Option<String>,
    /// Why the probe failed, when it did
    pub problem: Option<String>,
}

impl SanityCheckResult {
    /// Returns true if the engine is usable
    pub fn is_ok(&self) -> bool {
        self.problem.is_none()
    }
}

/// Probe the engine without failing
pub fn verify_engine(engine: &Engine) -> SanityCheckResult {
    let mut result = SanityCheckResult {
        executable: engine.executable().to_string(),
        version: None,
        problem: None,
    };

    match engine.version() {
        Ok(output) if output.success => {
            result.version = output.stdout.lines().next().map(|line| line.trim().to_string());
        }
        Ok(output) => {
            result.problem = Some(
                output
                    .ensure_success("restic version")
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
            );
        }
        Err(e) => result.problem = Some(e.to_string()),
    }

    result
}

/// Verify the engine and turn a failed probe into an error
pub fn run_preflight_checks(engine: &Engine) -> Result<()> {
    debug!("Running pre-flight checks for {}", engine.executable());

    let result = verify_engine(engine);
    if let Some(problem) = result.problem {
        return Err(ResticCtlError::engine(format!(
            "restic executable {} is not usable: {}",
            result.executable, problem
        )));
    }

    info!(
        "Pre-flight checks passed: {}",
        result.version.as_deref().unwrap_or("unknown version")
    );
    Ok(())
}
