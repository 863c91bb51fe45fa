//! Context window management.
//!
//! - [`token`]: character-based token estimation
//! - [`budget`]: per-call estimates and threshold classification
//! - [`window`]: per-conversation turn windows, pruning and idle expiry

pub mod budget;
pub mod token;
pub mod window;

pub use budget::{BudgetLevel, ContextBudget, TokenEstimate};
pub use window::{ConversationStore, ConversationWindow, PruneOutcome, PruneStage, plan_prune};
