//! Knowledge layer for AgentGate.
//!
//! - [`KnowledgeCache`]: cache-aside document sets per agent namespace
//! - [`FsOriginStore`]: folder-per-namespace origin store
//! - [`ExtractorRegistry`]: file-to-text conversion
//! - [`SelectionRanker`]: trims a namespace to the documents a turn needs

pub mod cache;
pub mod extract;
pub mod origin;
pub mod selection;

pub use cache::{CacheStats, InMemoryCacheStore, KnowledgeCache};
pub use extract::{ExtractorRegistry, TextExtractor};
pub use origin::FsOriginStore;
pub use selection::{
    SelectionRanker, SelectionRequest, SizePressure, TopicCategory, TopicGroup, render_knowledge,
};
