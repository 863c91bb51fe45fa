//! # AgentGate Core
//!
//! Domain types, traits, and error definitions for the AgentGate mediation
//! layer. This crate has **zero framework dependencies**: it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (LLM provider, origin document store,
//! external cache, transcript store) is a trait here. Implementations live
//! in their respective crates or in the embedding application.

pub mod agent;
pub mod error;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod tool;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use agent::AgentProfile;
pub use error::{Error, Result};
pub use knowledge::{CacheStore, Document, OriginFile, OriginStore};
pub use message::{ContentBlock, ConversationKey, Role, Turn, TurnContent};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{Tool, ToolDefinition, ToolResult};
pub use transcript::{NoopTranscriptSink, TranscriptSink};
