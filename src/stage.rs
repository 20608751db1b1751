//! Operation stage tracking
//!
//! Every orchestrated operation walks the same pipeline, skipping the
//! stages that do not apply to its kind:
//!
//! ```text
//! Pending
//!     ↓
//! Preflight      (backup only: is the repository reachable?)
//!     ↓
//! Unlock         (clear stale restic locks)
//!     ↓
//! PreHook        (backup only: `before` hook)
//!     ↓
//! Primary        (backup / check / forget / snapshot listing)
//!     ↓
//! PostHook       (backup only: `after` hook)
//!     ↓
//! ResultHook     (success/failure or age_warn/age_error hook)
//!     ↓
//! Done
//!
//! (Any stage can transition to Failed)
//! ```
//!
//! Transitions only move forward, so the result hook can be entered at most
//! once per operation.

use std::fmt;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;

/// Kind of orchestrated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Operation {
    Backup,
    Check,
    Forget,
    CheckAge,
}

impl Operation {
    /// Stages this operation visits, in order (excluding Failed).
    pub const fn stages(self) -> &'static [Stage] {
        match self {
            Self::Backup => &[
                Stage::Pending,
                Stage::Preflight,
                Stage::Unlock,
                Stage::PreHook,
                Stage::Primary,
                Stage::PostHook,
                Stage::ResultHook,
                Stage::Done,
            ],
            Self::Check | Self::Forget | Self::CheckAge => &[
                Stage::Pending,
                Stage::Unlock,
                Stage::Primary,
                Stage::ResultHook,
                Stage::Done,
            ],
        }
    }

    /// Returns true if `stage` is part of this operation's pipeline
    pub fn visits(self, stage: Stage) -> bool {
        stage == Stage::Failed || self.stages().contains(&stage)
    }
}

/// Pipeline stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stage {
    Pending = 0,
    Preflight = 1,
    Unlock = 2,
    PreHook = 3,
    Primary = 4,
    PostHook = 5,
    ResultHook = 6,
    Done = 7,
    Failed = 255,
}

impl Stage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Done or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preflight => "checking repository",
            Self::Unlock => "unlocking repository",
            Self::PreHook => "running before hook",
            Self::Primary => "running restic",
            Self::PostHook => "running after hook",
            Self::ResultHook => "running result hook",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("{operation} never enters stage '{stage}'")]
    NotInPlan { operation: Operation, stage: Stage },

    #[error("Cannot go backwards from '{from}' to '{to}'")]
    BackwardTransition { from: Stage, to: Stage },

    #[error("Cannot leave terminal stage '{from}'")]
    FromTerminalState { from: Stage },
}

/// Tracks the stage of a single operation on one backup/repository pair.
#[derive(Debug, Clone)]
pub struct StageTracker {
    operation: Operation,
    current: Stage,
    failed_at: Option<Stage>,
    history: Vec<Stage>,
}

impl StageTracker {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            current: Stage::Pending,
            failed_at: None,
            history: vec![Stage::Pending],
        }
    }

    #[inline]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    #[inline]
    pub fn current_stage(&self) -> Stage {
        self.current
    }

    /// Stage at which the operation failed, if it did
    #[inline]
    pub fn failed_at(&self) -> Option<Stage> {
        self.failed_at
    }

    /// Every stage entered so far, in order
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// Returns true if the operation has reached Done
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == Stage::Done
    }

    /// Move forward to `stage`. Skipping stages is allowed; going backwards,
    /// re-entering the current stage, or leaving a terminal stage is not.
    pub fn enter(&mut self, stage: Stage) -> Result<Stage, StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }
        if !self.operation.visits(stage) {
            return Err(StageTransitionError::NotInPlan {
                operation: self.operation,
                stage,
            });
        }
        if stage.order() <= self.current.order() {
            return Err(StageTransitionError::BackwardTransition {
                from: self.current,
                to: stage,
            });
        }

        debug!("{}: {} -> {}", self.operation, self.current, stage);
        self.current = stage;
        self.history.push(stage);
        Ok(stage)
    }

    /// Mark the operation failed at its current stage. No-op once terminal.
    pub fn fail(&mut self) {
        if self.current.is_terminal() {
            return;
        }
        self.failed_at = Some(self.current);
        self.current = Stage::Failed;
        self.history.push(Stage::Failed);
    }
}
