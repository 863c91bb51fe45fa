//! Provider trait — the abstraction over the LLM completion service.
//!
//! The mediation layer only needs success/failure and, optionally, token
//! usage from a call. Request framing and streaming belong to the concrete
//! provider implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Turn;

/// A completion request built after budgeting and admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Agent issuing the call
    pub agent_id: String,

    /// Instruction text with the selected knowledge appended
    pub system: String,

    /// Pruned conversation history followed by the pending user turn
    pub turns: Vec<Turn>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The assistant turn (may contain reasoning blocks)
    pub turn: Turn,

    /// Token usage statistics
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The coordinator calls `complete()` only after the admission controller
/// allowed the call; implementations own transport timeouts.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;
}
