//! `agentgate config` — Configuration management commands.

use agentgate_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed and validated");

            let mut warnings = Vec::new();

            if !config.knowledge.origin_dir.exists() {
                warnings.push(format!(
                    "Knowledge origin folder does not exist: {}",
                    config.knowledge.origin_dir.display()
                ));
            }
            for agent in &config.agents {
                if agent.primary_document.is_none() {
                    warnings.push(format!("Agent '{}' has no primary document", agent.id));
                }
            }
            if config.admission.min_spacing_ms.saturating_mul(config.admission.max_calls_per_window as u64)
                > config.admission.window_secs.saturating_mul(1_000)
            {
                warnings.push("min_spacing_ms makes max_calls_per_window unreachable".to_string());
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!(
                "   Admission: {} calls / {}s, {}ms spacing",
                config.admission.max_calls_per_window,
                config.admission.window_secs,
                config.admission.min_spacing_ms
            );
            println!(
                "   Context:   warning {} / hard {} / absolute {} tokens",
                config.context.warning_tokens, config.context.hard_tokens, config.context.absolute_tokens
            );
            println!("   Memory:    {} → {}", config.memory.root_marker, config.memory.root_dir.display());
            println!("   Agents:    {}", config.agents.len());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = agentgate_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn default_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&agentgate_config::AppConfig::default()).unwrap();
        assert!(rendered.contains("[admission]"));
        assert!(rendered.contains("[[agents]]"));
    }
}
