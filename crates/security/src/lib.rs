//! Security module for AgentGate — memory store sandboxing.
//!
//! Provides:
//! - **Path validation**: every memory path must stay inside one root directory

pub mod path;

pub use path::{PathValidationError, Sandbox, validate_memory_path};
