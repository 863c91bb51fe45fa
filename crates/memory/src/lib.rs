//! Sandboxed memory store for AgentGate.
//!
//! Agents keep cross-conversation notes as plain text files under a single
//! root. [`MemoryStore`] implements the file operations; [`MemoryTool`]
//! exposes them to agent logic through the `Tool` trait.

pub mod store;
pub mod tool;

pub use store::{DirEntry, EntryKind, MemoryStore, ViewOutcome};
pub use tool::MemoryTool;
