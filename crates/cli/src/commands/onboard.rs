//! `agentgate onboard` — First-time setup.

use agentgate_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🚦 AgentGate — First-Time Setup");
    println!("===============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.memory.root_dir.exists() {
        std::fs::create_dir_all(&config.memory.root_dir)?;
        println!("✅ Created memory root: {}", config.memory.root_dir.display());
    }

    // One origin folder per agent namespace.
    for agent in &config.agents {
        let dir = config.knowledge.origin_dir.join(&agent.knowledge_namespace);
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
            println!("✅ Created knowledge folder: {}", dir.display());
        }
    }

    println!("\n📝 Next steps:");
    println!(
        "   1. Drop reference documents into {}/<agent>/",
        config.knowledge.origin_dir.display()
    );
    println!("   2. Run: agentgate knowledge list <agent>");
    println!("\n🎉 Setup complete!\n");

    Ok(())
}
