//! Planner configuration.
//!
//! Every section has working defaults; a JSON file can override any subset of
//! fields and `RULE_PLANNER_*` environment variables override the file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::model::DEFAULT_MAX_VISITS;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Knowledge base path. The built-in knowledge base is used when unset.
    pub knowledge_base: Option<PathBuf>,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub solve: SolveConfig,
}

impl PlannerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigurationError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(ConfigurationError::ConfigFormat)
    }

    /// Applies `RULE_PLANNER_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = env::var("RULE_PLANNER_KNOWLEDGE_BASE") {
            self.knowledge_base = Some(PathBuf::from(path));
        }
        if let Ok(url) = env::var("RULE_PLANNER_EMBEDDING_URL") {
            self.embedding.base_url = url;
        }
        if let Ok(model) = env::var("RULE_PLANNER_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(url) = env::var("RULE_PLANNER_LLM_URL") {
            self.generation.base_url = url;
        }
        if let Ok(model) = env::var("RULE_PLANNER_LLM_MODEL") {
            self.generation.model = model;
        }
        if let Some(enabled) = env_flag("RULE_PLANNER_EMBEDDING") {
            self.embedding.enabled = enabled;
        }
        if let Some(enabled) = env_flag("RULE_PLANNER_LLM") {
            self.generation.enabled = enabled;
        }
        if let Some(secs) = env::var("RULE_PLANNER_TIME_LIMIT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
        {
            self.solve.time_limit_secs = secs;
        }
        self
    }

    /// Configuration that never touches the network.
    pub fn offline() -> Self {
        let mut config = Self::default();
        config.embedding.enabled = false;
        config.generation.enabled = false;
        config
    }
}

fn env_flag(name: &str) -> Option<bool> {
    match env::var(name).ok()?.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Neighbours considered by the semantic stage.
    pub top_k: usize,
    /// Squared L2 distance below which a semantic neighbour counts.
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:1234/v1".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:1234/v1".to_string(),
            model: "gemma-3".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens: 512,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolveConfig {
    /// Wall-clock budget of one solve.
    pub time_limit_secs: u64,
    /// Guided local search rounds without a new best before stopping early.
    pub stagnation_rounds: usize,
    /// Length of the working day in minutes.
    pub horizon_minutes: i64,
    /// Visit cap applied when an agent has no configured maximum.
    pub default_max_visits: u32,
}

impl SolveConfig {
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 30,
            stagnation_rounds: 64,
            horizon_minutes: 24 * 60,
            default_max_visits: DEFAULT_MAX_VISITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_service_settings() {
        let config = PlannerConfig::default();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.generation.max_tokens, 512);
        assert!((config.generation.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.solve.time_limit(), Duration::from_secs(30));
        assert_eq!(config.solve.horizon_minutes, 1440);
    }

    #[test]
    fn offline_disables_capabilities() {
        let config = PlannerConfig::offline();
        assert!(!config.embedding.enabled);
        assert!(!config.generation.enabled);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"solve": {{"time_limit_secs": 5}}, "generation": {{"model": "qwen"}}}}"#)
            .unwrap();

        let config = PlannerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.solve.time_limit_secs, 5);
        assert_eq!(config.solve.stagnation_rounds, 64);
        assert_eq!(config.generation.model, "qwen");
        assert_eq!(config.generation.max_tokens, 512);
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = PlannerConfig::from_json_file(Path::new("/nonexistent/planner.json")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Io { .. }));
    }
}
