use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            history_capacity: default_history_capacity(),
            progress_tick_ms: default_progress_tick_ms(),
        }
    }
}

fn default_min_chars() -> usize {
    50
}
fn default_max_chars() -> usize {
    100_000
}
fn default_history_capacity() -> usize {
    20
}
fn default_progress_tick_ms() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Providers tried in order until one succeeds.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
    /// Language the report is written in, whatever the transcript language.
    #[serde(default = "default_report_language")]
    pub report_language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            report_language: default_report_language(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            gemini: GeminiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

fn default_providers() -> Vec<String> {
    vec![
        "gemini".to_string(),
        "ollama".to_string(),
        "offline".to_string(),
    ]
}
fn default_report_language() -> String {
    "Russian".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_gemini_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            api_key_env: default_gemini_api_key_env(),
            base_url: default_gemini_base_url(),
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_gemini_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: default_ollama_model(),
            url: default_ollama_url(),
        }
    }
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Provider names accepted in `analysis.providers`.
pub const KNOWN_PROVIDERS: &[&str] = &["gemini", "ollama", "offline"];

impl Config {
    /// Check the invariants that the session and history store rely on.
    pub fn validate(&self) -> Result<()> {
        if self.session.min_chars == 0 {
            anyhow::bail!("session.min_chars must be >= 1");
        }
        if self.session.max_chars < self.session.min_chars {
            anyhow::bail!("session.max_chars must be >= session.min_chars");
        }
        if self.session.history_capacity == 0 {
            anyhow::bail!("session.history_capacity must be >= 1");
        }
        if self.session.progress_tick_ms == 0 {
            anyhow::bail!("session.progress_tick_ms must be >= 1");
        }

        if self.analysis.providers.is_empty() {
            anyhow::bail!("analysis.providers must name at least one provider");
        }
        for provider in &self.analysis.providers {
            if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
                anyhow::bail!(
                    "Unknown analysis provider: '{}'. Must be one of: {}.",
                    provider,
                    KNOWN_PROVIDERS.join(", ")
                );
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
