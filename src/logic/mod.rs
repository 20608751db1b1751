//! Logic modules: pure decisions over configuration and engine output.
//!
//! Nothing in here launches a process; the orchestrator feeds these
//! functions and acts on what they return.
//!
//! # Modules
//!
//! - `resolver` - default cascading and validation of the configuration
//! - `matcher` - snapshot attribution and backup age classification

pub mod matcher;
pub mod resolver;
