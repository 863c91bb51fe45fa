//! Estimating a prospective call and classifying it.
//!
//! ```text
//! total = Σ turn cost + ceil((knowledge + instructions + pending) / cpt) + output reserve
//! ```
//!
//! Thresholds, in increasing severity: warning (log only), hard (prune),
//! absolute (the model's window; a sent request never exceeds it).

use agentgate_config::ContextConfig;
use agentgate_core::message::Turn;
use serde::Serialize;

use super::token::{estimate_tokens, estimate_turn_tokens, estimate_turns_tokens};

/// Token estimate for one prospective call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenEstimate {
    pub turn_count: usize,
    pub history_tokens: usize,
    /// Knowledge, instructions, pending input and the output reserve.
    pub fixed_tokens: usize,
    pub total: usize,
}

impl TokenEstimate {
    /// Average cost of one history turn, rounded up. At least 1.
    pub fn average_turn_cost(&self) -> usize {
        if self.turn_count == 0 {
            return 1;
        }
        self.history_tokens.div_ceil(self.turn_count).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    Normal,
    Warning,
    Hard,
    Absolute,
}

/// Estimator constants and thresholds.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    tokens_per_turn: usize,
    chars_per_token: f64,
    output_reserve: usize,
    warning_tokens: usize,
    hard_tokens: usize,
    absolute_tokens: usize,
    emergency_floor_turns: usize,
}

impl ContextBudget {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            tokens_per_turn: config.tokens_per_turn,
            chars_per_token: config.chars_per_token,
            output_reserve: config.output_reserve,
            warning_tokens: config.warning_tokens,
            hard_tokens: config.hard_tokens,
            absolute_tokens: config.absolute_tokens,
            emergency_floor_turns: config.emergency_floor_turns,
        }
    }

    /// Estimate the cost of sending `turns` plus the fixed parts.
    pub fn estimate(
        &self,
        turns: &[Turn],
        knowledge_text: &str,
        instruction_text: &str,
        pending_input: &str,
    ) -> TokenEstimate {
        let history_tokens = self.history_tokens(turns);
        let fixed_tokens = self.fixed_tokens(knowledge_text, instruction_text, pending_input);
        TokenEstimate {
            turn_count: turns.len(),
            history_tokens,
            fixed_tokens,
            total: history_tokens + fixed_tokens,
        }
    }

    /// Re-estimate with different history but the same fixed parts.
    pub fn with_history(&self, turns: &[Turn], previous: &TokenEstimate) -> TokenEstimate {
        let history_tokens = self.history_tokens(turns);
        TokenEstimate {
            turn_count: turns.len(),
            history_tokens,
            fixed_tokens: previous.fixed_tokens,
            total: history_tokens + previous.fixed_tokens,
        }
    }

    pub fn history_tokens(&self, turns: &[Turn]) -> usize {
        estimate_turns_tokens(turns, self.tokens_per_turn, self.chars_per_token)
    }

    pub fn turn_tokens(&self, turn: &Turn) -> usize {
        estimate_turn_tokens(turn, self.tokens_per_turn, self.chars_per_token)
    }

    pub fn fixed_tokens(&self, knowledge_text: &str, instruction_text: &str, pending_input: &str) -> usize {
        let chars = knowledge_text.len() + instruction_text.len() + pending_input.len();
        estimate_tokens(chars, self.chars_per_token) + self.output_reserve
    }

    pub fn classify(&self, total: usize) -> BudgetLevel {
        if total > self.absolute_tokens {
            BudgetLevel::Absolute
        } else if total > self.hard_tokens {
            BudgetLevel::Hard
        } else if total > self.warning_tokens {
            BudgetLevel::Warning
        } else {
            BudgetLevel::Normal
        }
    }

    pub fn hard_tokens(&self) -> usize {
        self.hard_tokens
    }

    pub fn absolute_tokens(&self) -> usize {
        self.absolute_tokens
    }

    pub fn output_reserve(&self) -> usize {
        self.output_reserve
    }

    pub fn emergency_floor_turns(&self) -> usize {
        self.emergency_floor_turns
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::new(&ContextConfig::default())
    }
}
