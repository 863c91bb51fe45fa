//! Configuration loading, validation, and management for AgentGate.
//!
//! Loads configuration from `~/.agentgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use agentgate_core::AgentProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.agentgate/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Outbound LLM call admission
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Context budget thresholds and estimator constants
    #[serde(default)]
    pub context: ContextConfig,

    /// Conversation window retention
    #[serde(default)]
    pub conversations: ConversationConfig,

    /// Knowledge cache configuration
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Memory store sandbox
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Agent profiles
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentProfile>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Calls admitted per rolling window
    #[serde(default = "default_max_calls")]
    pub max_calls_per_window: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Minimum spacing between consecutive calls
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,

    /// Record size at which the timestamp history is hard-truncated
    #[serde(default = "default_safety_cap")]
    pub safety_cap: usize,
}

fn default_max_calls() -> usize {
    50
}
fn default_window_secs() -> u64 {
    60
}
fn default_min_spacing_ms() -> u64 {
    1_000
}
fn default_safety_cap() -> usize {
    1_000
}

impl AdmissionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_calls_per_window: default_max_calls(),
            window_secs: default_window_secs(),
            min_spacing_ms: default_min_spacing_ms(),
            safety_cap: default_safety_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Flat per-turn cost (half of an average exchange)
    #[serde(default = "default_tokens_per_turn")]
    pub tokens_per_turn: usize,

    /// Characters per token for free text; lower is more conservative
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,

    /// Tokens reserved for the model's reply
    #[serde(default = "default_output_reserve")]
    pub output_reserve: usize,

    /// Log a warning above this estimate
    #[serde(default = "default_warning_tokens")]
    pub warning_tokens: usize,

    /// Prune above this estimate
    #[serde(default = "default_hard_tokens")]
    pub hard_tokens: usize,

    /// The model's context window; never exceeded by a sent request
    #[serde(default = "default_absolute_tokens")]
    pub absolute_tokens: usize,

    /// Emergency pruning never goes below this many turns
    #[serde(default = "default_emergency_floor")]
    pub emergency_floor_turns: usize,
}

fn default_tokens_per_turn() -> usize {
    500
}
fn default_chars_per_token() -> f64 {
    3.5
}
fn default_output_reserve() -> usize {
    4_096
}
fn default_warning_tokens() -> usize {
    150_000
}
fn default_hard_tokens() -> usize {
    180_000
}
fn default_absolute_tokens() -> usize {
    200_000
}
fn default_emergency_floor() -> usize {
    20
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            tokens_per_turn: default_tokens_per_turn(),
            chars_per_token: default_chars_per_token(),
            output_reserve: default_output_reserve(),
            warning_tokens: default_warning_tokens(),
            hard_tokens: default_hard_tokens(),
            absolute_tokens: default_absolute_tokens(),
            emergency_floor_turns: default_emergency_floor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Idle windows older than this are swept
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// Chance that a turn triggers an idle sweep
    #[serde(default = "default_sweep_probability")]
    pub sweep_probability: f64,
}

fn default_ttl_hours() -> u64 {
    24
}
fn default_sweep_probability() -> f64 {
    0.01
}

impl ConversationConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours as i64)
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            sweep_probability: default_sweep_probability(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Root folder of the filesystem origin store; one sub-folder per namespace
    #[serde(default = "default_origin_dir")]
    pub origin_dir: PathBuf,

    /// Prefix of external cache keys
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Lifetime of the in-process layer in front of the external cache
    #[serde(default = "default_local_ttl_secs")]
    pub local_ttl_secs: u64,

    /// Attachment size (chars) above which selection is capped at 3 documents
    #[serde(default = "default_medium_attachment")]
    pub medium_attachment_chars: usize,

    /// Attachment size (chars) above which selection is capped at 2 documents
    #[serde(default = "default_large_attachment")]
    pub large_attachment_chars: usize,
}

fn default_origin_dir() -> PathBuf {
    AppConfig::config_dir().join("knowledge")
}
fn default_cache_prefix() -> String {
    "kb".into()
}
fn default_local_ttl_secs() -> u64 {
    30 * 60
}
fn default_medium_attachment() -> usize {
    20_000
}
fn default_large_attachment() -> usize {
    60_000
}

impl KnowledgeConfig {
    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs)
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            origin_dir: default_origin_dir(),
            cache_prefix: default_cache_prefix(),
            local_ttl_secs: default_local_ttl_secs(),
            medium_attachment_chars: default_medium_attachment(),
            large_attachment_chars: default_large_attachment(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory backing the sandbox root
    #[serde(default = "default_memory_root")]
    pub root_dir: PathBuf,

    /// Virtual prefix every memory path must start with
    #[serde(default = "default_root_marker")]
    pub root_marker: String,

    /// Maximum size of a memory file in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Restrict each agent to `<marker>/<agent_id>/`
    #[serde(default)]
    pub enforce_agent_scope: bool,

    /// Hide dot-files from directory views
    #[serde(default = "default_true")]
    pub hide_dotfiles: bool,
}

fn default_memory_root() -> PathBuf {
    AppConfig::config_dir().join("memories")
}
fn default_root_marker() -> String {
    "/memories".into()
}
fn default_max_file_size() -> usize {
    1024 * 1024
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            root_dir: default_memory_root(),
            root_marker: default_root_marker(),
            max_file_size: default_max_file_size(),
            enforce_agent_scope: false,
            hide_dotfiles: true,
        }
    }
}

fn default_agents() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new("grant-cards", 15).with_primary_document("grant-card"),
        AgentProfile::new("etg-writer", 50).with_primary_document("etg"),
        AgentProfile::new("canexport-claims", 25).with_primary_document("claims"),
    ]
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentgate/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `AGENTGATE_KNOWLEDGE_DIR`
    /// - `AGENTGATE_MEMORY_DIR`
    /// - `AGENTGATE_MAX_CALLS_PER_MINUTE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = std::env::var("AGENTGATE_KNOWLEDGE_DIR") {
            self.knowledge.origin_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("AGENTGATE_MEMORY_DIR") {
            self.memory.root_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var("AGENTGATE_MAX_CALLS_PER_MINUTE") {
            self.admission.max_calls_per_window = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "AGENTGATE_MAX_CALLS_PER_MINUTE must be an integer, got '{raw}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentgate")
    }

    /// Look up an agent profile by id.
    pub fn agent(&self, id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admission.max_calls_per_window == 0 {
            return Err(ConfigError::ValidationError(
                "admission.max_calls_per_window must be > 0".into(),
            ));
        }
        if self.admission.safety_cap < self.admission.max_calls_per_window {
            return Err(ConfigError::ValidationError(
                "admission.safety_cap must be >= max_calls_per_window".into(),
            ));
        }

        let ctx = &self.context;
        if !(ctx.warning_tokens < ctx.hard_tokens && ctx.hard_tokens <= ctx.absolute_tokens) {
            return Err(ConfigError::ValidationError(
                "context thresholds must satisfy warning < hard <= absolute".into(),
            ));
        }
        if ctx.chars_per_token <= 0.0 || ctx.tokens_per_turn == 0 {
            return Err(ConfigError::ValidationError(
                "context.chars_per_token and context.tokens_per_turn must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.conversations.sweep_probability) {
            return Err(ConfigError::ValidationError(
                "conversations.sweep_probability must be between 0.0 and 1.0".into(),
            ));
        }

        if !self.memory.root_marker.starts_with('/') || self.memory.root_marker.len() < 2 {
            return Err(ConfigError::ValidationError(
                "memory.root_marker must look like '/name'".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.max_exchanges == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{}' must allow at least one exchange",
                    agent.id
                )));
            }
            if !seen.insert(agent.knowledge_namespace.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "knowledge namespace '{}' is shared by more than one agent",
                    agent.knowledge_namespace
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            context: ContextConfig::default(),
            conversations: ConversationConfig::default(),
            knowledge: KnowledgeConfig::default(),
            memory: MemoryConfig::default(),
            agents: default_agents(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.admission.window(), Duration::from_secs(60));
        assert_eq!(config.context.emergency_floor_turns, 20);
        assert_eq!(config.conversations.ttl(), chrono::Duration::hours(24));
        assert_eq!(config.knowledge.local_ttl(), Duration::from_secs(1800));
        assert_eq!(config.memory.root_marker, "/memories");
    }

    #[test]
    fn default_agents_have_distinct_ceilings() {
        let config = AppConfig::default();
        let cards = config.agent("grant-cards").unwrap();
        let etg = config.agent("etg-writer").unwrap();
        assert!(etg.max_exchanges > cards.max_exchanges);
        assert!(config.agent("unknown").is_none());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.admission.max_calls_per_window, 50);
        assert_eq!(parsed.agents.len(), config.agents.len());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[admission]
max_calls_per_window = 10

[[agents]]
id = "classifier"
max_exchanges = 3
knowledge_namespace = "classifier-kb"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.admission.max_calls_per_window, 10);
        assert_eq!(config.admission.min_spacing_ms, 1_000);
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].max_turns(), 6);
        assert!(config.agents[0].primary_document.is_none());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.context.hard_tokens = config.context.warning_tokens;
        assert!(config.validate().is_err());
    }

    #[test]
    fn shared_namespace_rejected() {
        let mut config = AppConfig::default();
        config
            .agents
            .push(AgentProfile::new("copycat", 5).with_namespace("grant-cards"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("grant-cards"));
    }

    #[test]
    fn bad_marker_rejected() {
        let mut config = AppConfig::default();
        config.memory.root_marker = "memories".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.admission.max_calls_per_window, 50);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[memory]\nmax_file_size = 2048\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.memory.max_file_size, 2048);
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[admission\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_calls_per_window"));
        assert!(toml_str.contains("etg-writer"));
    }
}
