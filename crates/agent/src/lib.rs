//! Turn mediation for AgentGate.
//!
//! Every outbound model call passes through [`TurnCoordinator`]:
//!
//! 1. **Select** the knowledge documents relevant to the turn
//! 2. **Budget** the request and plan how far to prune the conversation window
//! 3. **Admit** the call against the shared rate window
//! 4. **Call** the provider, then apply the prune and record the exchange
//!
//! A turn either completes fully or leaves the conversation untouched.

pub mod context;
pub mod coordinator;

pub use context::{
    BudgetLevel, ContextBudget, ConversationStore, ConversationWindow, PruneOutcome, PruneStage,
    TokenEstimate, plan_prune,
};
pub use coordinator::{Attachment, TurnCoordinator, TurnOutcome, TurnRequest};
