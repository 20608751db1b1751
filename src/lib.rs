//! resticctl library
//!
//! Declarative orchestration of restic: configuration with cascading
//! defaults, environment composition, snapshot matching, hook rendering and
//! the operation pipeline that drives the restic executable.

pub mod cli;
pub mod config;
pub mod config_file;
pub mod duration;
pub mod engine;
pub mod environment;
pub mod error;
pub mod hooks;
pub mod logic;
pub mod orchestrator;
pub mod sanity;
pub mod stage;

// Re-export main types for convenience
pub use config::{Backup, Config, Defaults, Environment, Repository};
pub use duration::AgeDuration;
pub use engine::{Engine, EngineOutput, OutputMode};
pub use error::{ResticCtlError, Result};
pub use hooks::{HookContext, HookKind, HookRunner};
pub use logic::matcher::AgeStatus;
pub use orchestrator::{aggregate, Orchestrator, Outcome};
pub use stage::{Operation, Stage, StageTracker, StageTransitionError};
