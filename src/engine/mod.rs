//! Engine modules: everything that talks to the restic executable.
//!
//! - [`args`]: typed subcommand arguments
//! - [`runner`]: process spawning, environment layering, stdin piping
//! - [`snapshot`]: parsing `restic snapshots --json`

pub mod args;
pub mod runner;
pub mod snapshot;

pub use runner::{Engine, EngineOutput, OutputMode};
