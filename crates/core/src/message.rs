//! Turn and conversation-key domain types.
//!
//! These are the value objects that flow through the mediation layer:
//! a caller submits a user turn, the coordinator budgets and sends it,
//! and the assistant reply is appended to the conversation window.

use serde::{Deserialize, Serialize};

/// Opaque key identifying one conversation of one agent.
///
/// Derived from the agent identity plus the caller-supplied conversation id,
/// so two agents can never share a window even if callers reuse ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(agent_id: &str, conversation_id: &str) -> Self {
        Self(format!("{agent_id}:{conversation_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The agent half of the key.
    pub fn agent_id(&self) -> &str {
        self.0.split_once(':').map_or(&self.0, |(agent, _)| agent)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

/// One block of a structured turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// Model reasoning. Ephemeral: never stored or re-sent.
    Reasoning { text: String },
    /// Text extracted from an uploaded file.
    Attachment { name: String, text: String },
}

impl ContentBlock {
    fn len(&self) -> usize {
        match self {
            Self::Text { text } | Self::Reasoning { text } => text.len(),
            Self::Attachment { name, text } => name.len() + text.len(),
        }
    }
}

/// Turn content: plain text or a sequence of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl TurnContent {
    /// Character count of everything that would be sent to the model.
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Blocks(blocks) => blocks.iter().map(ContentBlock::len).sum(),
        }
    }

    /// Flatten to plain text (reasoning excluded).
    pub fn to_plain_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.clone()),
                    ContentBlock::Attachment { name, text } => Some(format!("[{name}]\n{text}")),
                    ContentBlock::Reasoning { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single turn in a conversation.
///
/// Immutable once appended to a window; the only transformation ever applied
/// is [`Turn::without_reasoning`] before storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
    /// Character size of `content` at construction time.
    pub approximate_size: usize,
}

impl Turn {
    pub fn new(role: Role, content: TurnContent) -> Self {
        let approximate_size = content.char_len();
        Self {
            role,
            content,
            approximate_size,
        }
    }

    /// Create a user turn with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, TurnContent::Text(text.into()))
    }

    /// Create an assistant turn with text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, TurnContent::Text(text.into()))
    }

    /// Create a turn from structured blocks.
    pub fn blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self::new(role, TurnContent::Blocks(blocks))
    }

    /// Drop reasoning blocks. Returns a turn that is safe to store and
    /// re-send on the next call.
    pub fn without_reasoning(self) -> Self {
        match self.content {
            TurnContent::Text(_) => self,
            TurnContent::Blocks(blocks) => {
                let kept: Vec<ContentBlock> = blocks
                    .into_iter()
                    .filter(|b| !matches!(b, ContentBlock::Reasoning { .. }))
                    .collect();
                Self::new(self.role, TurnContent::Blocks(kept))
            }
        }
    }

    /// Plain text of the turn, reasoning excluded.
    pub fn text(&self) -> String {
        self.content.to_plain_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_scopes_by_agent() {
        let a = ConversationKey::new("grant-cards", "42");
        let b = ConversationKey::new("etg-writer", "42");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "grant-cards:42");
        assert_eq!(a.agent_id(), "grant-cards");
    }

    #[test]
    fn approximate_size_tracks_content() {
        let turn = Turn::user("hello");
        assert_eq!(turn.approximate_size, 5);
        assert_eq!(turn.role, Role::User);
    }

    #[test]
    fn reasoning_blocks_are_stripped() {
        let turn = Turn::blocks(
            Role::Assistant,
            vec![
                ContentBlock::Reasoning {
                    text: "let me think about eligibility".into(),
                },
                ContentBlock::Text {
                    text: "You qualify.".into(),
                },
            ],
        );
        let stripped = turn.without_reasoning();
        assert_eq!(stripped.text(), "You qualify.");
        assert_eq!(stripped.approximate_size, "You qualify.".len());
        match stripped.content {
            TurnContent::Blocks(blocks) => assert_eq!(blocks.len(), 1),
            TurnContent::Text(_) => panic!("expected blocks"),
        }
    }

    #[test]
    fn plain_text_includes_attachments() {
        let turn = Turn::blocks(
            Role::User,
            vec![
                ContentBlock::Text {
                    text: "Please review".into(),
                },
                ContentBlock::Attachment {
                    name: "budget.csv".into(),
                    text: "item,cost".into(),
                },
            ],
        );
        let text = turn.text();
        assert!(text.contains("Please review"));
        assert!(text.contains("[budget.csv]"));
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::assistant("Done");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"assistant\""));
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }
}
