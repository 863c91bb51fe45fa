//! `agentgate knowledge` — Inspect, rank and refresh agent knowledge.

use std::path::Path;
use std::sync::Arc;

use agentgate_config::AppConfig;
use agentgate_core::AgentProfile;
use agentgate_knowledge::{
    FsOriginStore, InMemoryCacheStore, KnowledgeCache, SelectionRanker, SelectionRequest,
    SizePressure,
};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn open(agent: &str) -> Result<(AppConfig, AgentProfile, KnowledgeCache), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let profile = config
        .agent(agent)
        .cloned()
        .ok_or_else(|| format!("Unknown agent: {agent}"))?;
    tracing::debug!(
        agent = %profile.id,
        origin = %config.knowledge.origin_dir.display(),
        "Opening knowledge cache"
    );
    let cache = KnowledgeCache::new(
        Arc::new(FsOriginStore::new(&config.knowledge.origin_dir)),
        Arc::new(InMemoryCacheStore::new()),
        &config.knowledge,
    );
    Ok((config, profile, cache))
}

pub async fn list(agent: &str) -> CmdResult {
    let (config, profile, cache) = open(agent)?;
    let documents = cache.get_namespace(&profile.knowledge_namespace).await;

    println!("📚 Knowledge for {} (namespace '{}')", profile.id, profile.knowledge_namespace);
    println!("   Origin: {}", config.knowledge.origin_dir.display());
    if documents.is_empty() {
        println!("   (no documents)");
    }
    for doc in documents.iter() {
        println!(
            "  - {} ({} bytes, {})",
            doc.filename,
            doc.byte_size,
            doc.source_timestamp.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn select(agent: &str, message: &str, attachment: Option<&Path>) -> CmdResult {
    let (config, profile, cache) = open(agent)?;
    let attachment_text = match attachment {
        Some(path) => String::from_utf8_lossy(&std::fs::read(path)?).into_owned(),
        None => String::new(),
    };
    let pressure = SizePressure::from_attachment_len(
        attachment_text.len(),
        config.knowledge.medium_attachment_chars,
        config.knowledge.large_attachment_chars,
    );

    let documents = cache.get_namespace(&profile.knowledge_namespace).await;
    let ranker = SelectionRanker::default();
    let selected = ranker.select_relevant(
        &SelectionRequest {
            task: &profile.id,
            message,
            attachment_text: &attachment_text,
            primary_document: profile.primary_document.as_deref(),
            pressure,
            ..Default::default()
        },
        &documents,
    );

    println!(
        "🎯 Selected {} of {} documents (pressure {pressure:?}, cap {})",
        selected.len(),
        documents.len(),
        pressure.max_documents()
    );
    for doc in &selected {
        println!("  - {}", doc.filename);
    }
    Ok(())
}

pub async fn refresh(agent: &str) -> CmdResult {
    let (_, profile, cache) = open(agent)?;
    let documents = cache.refresh(&profile.knowledge_namespace).await?;
    let stats = cache.stats();
    println!(
        "🔄 Refreshed '{}': {} documents ({} origin fetches)",
        profile.knowledge_namespace,
        documents.len(),
        stats.origin_fetches
    );
    Ok(())
}
