//! Static per-agent configuration.

use serde::{Deserialize, Serialize};

/// Static configuration of one agent persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent identifier (e.g., "grant-cards").
    pub id: String,

    /// Conversation-length ceiling in user/assistant exchanges.
    /// The window keeps at most `2 * max_exchanges` turns.
    pub max_exchanges: usize,

    /// Knowledge-base namespace owned by this agent.
    pub knowledge_namespace: String,

    /// Filename marker of the document that is always selected for this
    /// agent's tasks, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_document: Option<String>,
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, max_exchanges: usize) -> Self {
        let id = id.into();
        Self {
            knowledge_namespace: id.clone(),
            id,
            max_exchanges,
            primary_document: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.knowledge_namespace = namespace.into();
        self
    }

    pub fn with_primary_document(mut self, marker: impl Into<String>) -> Self {
        self.primary_document = Some(marker.into());
        self
    }

    /// Maximum number of raw turns retained by standard pruning.
    pub fn max_turns(&self) -> usize {
        self.max_exchanges.saturating_mul(2)
    }
}
