//! `agentgate budget` — Estimate the token cost of a transcript.

use std::path::Path;

use agentgate_agent::{ContextBudget, TokenEstimate};
use agentgate_config::AppConfig;
use agentgate_core::message::{Role, Turn, TurnContent};
use serde::Deserialize;

/// Transcript entry as written by hand or exported from a transcript store.
#[derive(Debug, Deserialize)]
struct TranscriptEntry {
    role: Role,
    content: TurnContent,
}

fn parse_transcript(json: &str) -> Result<Vec<Turn>, serde_json::Error> {
    let entries: Vec<TranscriptEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|e| Turn::new(e.role, e.content).without_reasoning())
        .collect())
}

fn estimate_transcript(
    budget: &ContextBudget,
    json: &str,
    instructions: &str,
    message: &str,
) -> Result<TokenEstimate, serde_json::Error> {
    let turns = parse_transcript(json)?;
    Ok(budget.estimate(&turns, "", instructions, message))
}

pub async fn estimate(
    transcript: &Path,
    instructions: Option<&Path>,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let budget = ContextBudget::new(&config.context);

    let json = std::fs::read_to_string(transcript)?;
    let instructions = match instructions {
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };
    let estimate = estimate_transcript(&budget, &json, &instructions, message)?;
    let level = budget.classify(estimate.total);

    println!("📏 Context estimate");
    println!("   Turns:         {}", estimate.turn_count);
    println!("   History:       {} tokens", estimate.history_tokens);
    println!("   Fixed:         {} tokens (incl. {} output reserve)", estimate.fixed_tokens, budget.output_reserve());
    println!("   Total:         {} tokens", estimate.total);
    println!("   Level:         {level:?}");
    println!(
        "   Thresholds:    warning {} / hard {} / absolute {}",
        config.context.warning_tokens, config.context.hard_tokens, config.context.absolute_tokens
    );
    Ok(())
}
