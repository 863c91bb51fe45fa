//! Error types for the AgentGate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::time::Duration;
use thiserror::Error;

/// The top-level error type for all AgentGate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Admission errors ---
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    // --- Context budget errors ---
    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    // --- Memory store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Knowledge errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

/// Outbound call refused by the admission controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Call rate exceeded, retry after {}ms", retry_after.as_millis())]
    RateExceeded { retry_after: Duration },
}

impl AdmissionError {
    /// The message shown to the end user when a call is refused.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateExceeded { retry_after } => {
                let secs = retry_after.as_millis().div_ceil(1000).max(1);
                format!(
                    "The assistant is handling a lot of requests right now. Please try again in {secs} second{}.",
                    if secs == 1 { "" } else { "s" }
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    #[error("Context overflow: ~{estimated} tokens exceeds the {limit} token window")]
    ContextOverflow { estimated: usize, limit: usize },
}

/// Failures of the sandboxed memory store.
///
/// These are always reported back to the calling agent as structured
/// output; none of them is fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("Path rejected '{path}': {reason}")]
    PathRejected { path: String, reason: String },

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("File '{path}' would be {size} bytes, exceeding the {max} byte limit")]
    SizeExceeded { path: String, size: usize, max: usize },

    #[error("Text not found in {0}; the replacement anchor must match exactly")]
    TextNotFound(String),

    #[error("Text occurs {count} times in {path}; supply a unique anchor")]
    AmbiguousMatch { path: String, count: usize },

    #[error("Invalid line range [{start}, {end}] for a file with {total} lines")]
    InvalidRange { start: usize, end: usize, total: usize },

    #[error("Invalid insert line {line}; must be between 1 and {max}")]
    InvalidLine { line: usize, max: usize },

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Storage error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Error)]
pub enum KnowledgeError {
    #[error("Origin fetch failed for namespace '{namespace}': {reason}")]
    OriginFetchFailed { namespace: String, reason: String },

    #[error("Unsupported format for '{filename}': {mime_type}")]
    UnsupportedFormat { filename: String, mime_type: String },

    #[error("Could not extract text from '{filename}': {reason}")]
    ExtractionFailed { filename: String, reason: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn rate_exceeded_user_message_rounds_up_to_a_second() {
        let err = AdmissionError::RateExceeded {
            retry_after: Duration::from_millis(250),
        };
        assert!(err.user_message().contains("1 second."));

        let err = AdmissionError::RateExceeded {
            retry_after: Duration::from_secs(12),
        };
        assert!(err.user_message().contains("12 seconds"));
    }

    #[test]
    fn rate_exceeded_user_message_never_understates_the_wait() {
        let err = AdmissionError::RateExceeded {
            retry_after: Duration::from_millis(45_900),
        };
        assert!(err.user_message().contains("46 seconds"));

        let err = AdmissionError::RateExceeded {
            retry_after: Duration::from_millis(1_001),
        };
        assert!(err.user_message().contains("2 seconds"));
    }

    #[test]
    fn memory_error_converts_into_top_level() {
        let err: Error = MemoryError::NotFound("/memories/a.md".into()).into();
        assert!(err.to_string().contains("/memories/a.md"));
        assert!(matches!(err, Error::Memory(MemoryError::NotFound(_))));
    }
}
