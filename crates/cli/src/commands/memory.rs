//! `agentgate memory` — Operate on the sandboxed memory store.

use agentgate_config::AppConfig;
use agentgate_memory::MemoryStore;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn open(agent: Option<&str>) -> Result<MemoryStore, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = MemoryStore::from_config(&config.memory)?;
    Ok(match agent {
        Some(id) => {
            if config.agent(id).is_none() {
                return Err(format!("Unknown agent: {id}").into());
            }
            store.for_agent(id)
        }
        None => store,
    })
}

pub async fn view(agent: Option<&str>, path: &str, range: Option<(usize, usize)>) -> CmdResult {
    let outcome = open(agent)?.view(path, range).await?;
    println!("{}", outcome.render());
    Ok(())
}

pub async fn create(agent: Option<&str>, path: &str, content: &str) -> CmdResult {
    open(agent)?.create(path, content).await?;
    println!("✅ Created {path}");
    Ok(())
}

pub async fn str_replace(agent: Option<&str>, path: &str, old: &str, new: &str) -> CmdResult {
    open(agent)?.str_replace(path, old, new).await?;
    println!("✅ Edited {path}");
    Ok(())
}

pub async fn insert(agent: Option<&str>, path: &str, line: usize, text: &str) -> CmdResult {
    open(agent)?.insert(path, line, text).await?;
    println!("✅ Inserted at line {line} in {path}");
    Ok(())
}

pub async fn delete(agent: Option<&str>, path: &str) -> CmdResult {
    open(agent)?.delete(path).await?;
    println!("🗑️  Deleted {path}");
    Ok(())
}

pub async fn rename(agent: Option<&str>, old_path: &str, new_path: &str) -> CmdResult {
    open(agent)?.rename(old_path, new_path).await?;
    println!("✅ Renamed {old_path} → {new_path}");
    Ok(())
}
