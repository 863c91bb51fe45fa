//! Conversation windows — per-conversation turn history and its pruning.
//!
//! The store is the in-memory working copy of every active conversation;
//! the durable transcript lives behind a `TranscriptSink`. Windows only
//! ever grow at the back and shrink at the front.
//!
//! Pruning per pass: Normal → StandardPruned → EmergencyPruned.
//! - Standard: keep at most `2 × max_exchanges` turns.
//! - Emergency: if still over the hard threshold and above the floor, cut
//!   to `max(floor, (hard − fixed) / average turn cost)` turns.

use agentgate_config::ConversationConfig;
use agentgate_core::AgentProfile;
use agentgate_core::message::{ConversationKey, Turn};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};

use super::budget::{ContextBudget, TokenEstimate};

/// Ordered turn history of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
    last_write: DateTime<Utc>,
}

impl ConversationWindow {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            turns: Vec::new(),
            created_at: now,
            last_write: now,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_write(&self) -> DateTime<Utc> {
        self.last_write
    }

    /// Drop the oldest turns so that at most `keep` remain.
    fn truncate_front(&mut self, keep: usize) {
        if self.turns.len() > keep {
            let excess = self.turns.len() - keep;
            self.turns.drain(..excess);
        }
    }
}

/// Furthest pruning stage reached in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneStage {
    Normal,
    StandardPruned,
    EmergencyPruned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PruneOutcome {
    pub before: usize,
    pub after: usize,
    pub stage: PruneStage,
}

impl PruneOutcome {
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// All conversation windows of the process.
pub struct ConversationStore {
    windows: RwLock<HashMap<ConversationKey, ConversationWindow>>,
    ttl: chrono::Duration,
    sweep_probability: f64,
}

impl ConversationStore {
    pub fn new(config: &ConversationConfig) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            ttl: config.ttl(),
            sweep_probability: config.sweep_probability,
        }
    }

    /// Append one turn. Reasoning blocks are stripped first.
    pub fn append(&self, key: &ConversationKey, turn: Turn) {
        let now = Utc::now();
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        let window = windows
            .entry(key.clone())
            .or_insert_with(|| ConversationWindow::new(now));
        window.turns.push(turn.without_reasoning());
        window.last_write = now;
    }

    /// Append a user turn and its reply in one step.
    pub fn append_exchange(&self, key: &ConversationKey, user: Turn, assistant: Turn) {
        self.commit_exchange(key, 0, user, assistant);
    }

    /// Copy of the current turns (empty for unknown conversations).
    pub fn snapshot(&self, key: &ConversationKey) -> Vec<Turn> {
        self.windows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|w| w.turns.clone())
            .unwrap_or_default()
    }

    pub fn len(&self, key: &ConversationKey) -> usize {
        self.windows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map_or(0, |w| w.turns.len())
    }

    pub fn delete(&self, key: &ConversationKey) -> bool {
        self.windows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some()
    }

    /// Number of live conversations.
    pub fn conversation_count(&self) -> usize {
        self.windows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Prune a conversation ahead of a call estimated at `estimate`.
    pub fn prune(
        &self,
        key: &ConversationKey,
        profile: &AgentProfile,
        budget: &ContextBudget,
        estimate: &TokenEstimate,
    ) -> PruneOutcome {
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        let Some(window) = windows.get_mut(key) else {
            return plan_prune(key, &[], profile, budget, estimate);
        };
        let outcome = plan_prune(key, &window.turns, profile, budget, estimate);
        window.truncate_front(outcome.after);
        outcome
    }

    /// Drop the `removed` oldest turns and append an exchange, under one lock.
    ///
    /// Pairs with [`plan_prune`]: the plan is made on a snapshot and only
    /// applied once the call it was made for has succeeded. Turns appended
    /// in between are never dropped since windows only grow at the back.
    pub fn commit_exchange(&self, key: &ConversationKey, removed: usize, user: Turn, assistant: Turn) {
        let now = Utc::now();
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        let window = windows
            .entry(key.clone())
            .or_insert_with(|| ConversationWindow::new(now));
        let removed = removed.min(window.turns.len());
        window.turns.drain(..removed);
        window.turns.push(user.without_reasoning());
        window.turns.push(assistant.without_reasoning());
        window.last_write = now;
        debug!(
            conversation = %key,
            removed,
            turns = window.turns.len(),
            "Exchange committed"
        );
    }

    /// Delete windows idle for longer than the TTL as of `now`.
    pub fn sweep_idle_at(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, w| now.signed_duration_since(w.last_write) <= self.ttl);
        let removed = before - windows.len();
        if removed > 0 {
            info!(removed, remaining = windows.len(), "Idle conversations swept");
        }
        removed
    }

    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Utc::now())
    }

    /// Run an idle sweep with the configured probability.
    pub fn maybe_sweep(&self) -> usize {
        if rand::random::<f64>() < self.sweep_probability {
            self.sweep_idle()
        } else {
            0
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(&ConversationConfig::default())
    }
}

/// Work out how far `turns` must be pruned before a call estimated at
/// `estimate`, without touching any stored window. Keeping the newest
/// `after` turns satisfies the plan.
pub fn plan_prune(
    key: &ConversationKey,
    turns: &[Turn],
    profile: &AgentProfile,
    budget: &ContextBudget,
    estimate: &TokenEstimate,
) -> PruneOutcome {
    let before = turns.len();
    let mut after = before;
    let mut stage = PruneStage::Normal;

    let max_turns = profile.max_turns();
    if after > max_turns {
        after = max_turns;
        stage = PruneStage::StandardPruned;
    }

    let floor = budget.emergency_floor_turns();
    let current = budget.with_history(&turns[before - after..], estimate);
    if current.total > budget.hard_tokens() && after > floor {
        let available = budget.hard_tokens().saturating_sub(current.fixed_tokens);
        let mut target = (available / current.average_turn_cost()).max(floor);
        // Keep whole exchanges where the floor allows it.
        if target % 2 == 1 && target > floor {
            target -= 1;
        }
        if target < after {
            after = target;
            stage = PruneStage::EmergencyPruned;
        }
    }

    match stage {
        PruneStage::Normal => {}
        PruneStage::StandardPruned => info!(
            conversation = %key,
            before,
            after,
            "Conversation pruned to exchange ceiling"
        ),
        PruneStage::EmergencyPruned => warn!(
            conversation = %key,
            before,
            after,
            estimated_tokens = current.total,
            "Conversation emergency-pruned"
        ),
    }

    PruneOutcome { before, after, stage }
}
