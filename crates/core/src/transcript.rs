//! Transcript sink — the durable system of record for conversations.
//!
//! The in-memory conversation window is only a working cache; every turn
//! that is appended is also handed to a `TranscriptSink`.

use async_trait::async_trait;

use crate::error::Error;
use crate::message::{ConversationKey, Turn};

#[async_trait]
pub trait TranscriptSink: Send + Sync {
    fn name(&self) -> &str;

    /// Persist one turn. Reasoning blocks have already been stripped.
    async fn persist(&self, key: &ConversationKey, turn: &Turn) -> Result<(), Error>;
}

/// A sink that discards everything.
pub struct NoopTranscriptSink;

#[async_trait]
impl TranscriptSink for NoopTranscriptSink {
    fn name(&self) -> &str {
        "none"
    }

    async fn persist(&self, _key: &ConversationKey, _turn: &Turn) -> Result<(), Error> {
        Ok(())
    }
}
