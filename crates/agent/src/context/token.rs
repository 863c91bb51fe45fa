//! Token estimation utilities.
//!
//! Uses a character-based heuristic with a configurable characters-per-token
//! ratio and always rounds up, so counts err on the high side.

use agentgate_core::message::Turn;

/// Per-turn overhead for role name, delimiters and formatting markers.
pub const TURN_OVERHEAD: usize = 4;

/// Estimate the token count for `chars` characters of free text.
///
/// Rounds up. A non-positive ratio is treated as one character per token.
pub fn estimate_tokens(chars: usize, chars_per_token: f64) -> usize {
    if chars == 0 {
        return 0;
    }
    let ratio = if chars_per_token > 0.0 { chars_per_token } else { 1.0 };
    (chars as f64 / ratio).ceil() as usize
}

/// Estimate the token count for a string.
pub fn estimate_text_tokens(text: &str, chars_per_token: f64) -> usize {
    estimate_tokens(text.len(), chars_per_token)
}

/// Estimate tokens for a single turn: its content plus overhead, never less
/// than the flat per-turn average.
pub fn estimate_turn_tokens(turn: &Turn, tokens_per_turn: usize, chars_per_token: f64) -> usize {
    let content = estimate_tokens(turn.approximate_size, chars_per_token) + TURN_OVERHEAD;
    content.max(tokens_per_turn)
}

/// Estimate tokens for a slice of turns.
pub fn estimate_turns_tokens(turns: &[Turn], tokens_per_turn: usize, chars_per_token: f64) -> usize {
    turns
        .iter()
        .map(|t| estimate_turn_tokens(t, tokens_per_turn, chars_per_token))
        .sum()
}
