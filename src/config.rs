use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TITLE: &str = "Cloud Pricing Assistant";

/// Built-in starter prompts shown while the transcript is empty.
pub const DEFAULT_PROMPTS: [&str; 3] = [
    "How much does an n2-standard-4 VM cost per month?",
    "Compare Cloud Run and GKE pricing for a small web service",
    "What does Cloud Storage egress to the internet cost?",
];

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub tool_ids: Vec<String>,
    pub title: String,
    pub prompts: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            tool_ids: Vec::new(),
            title: DEFAULT_TITLE.to_string(),
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load the config file, then let environment variables override it.
    /// Built once at startup and passed by reference from then on.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Ok(path) => Self::load_from(&path),
            Err(err) => {
                tracing::warn!(%err, "could not resolve config directory, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Read one config file. A missing file is simply defaults; anything
    /// else wrong with it is logged and answered with defaults. No value is
    /// ever rejected outright.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "could not read config file, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "malformed config file, using defaults");
                Self::default()
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("CLOUDCHAT_API_KEY") {
            self.api_key = key;
        }
        if let Ok(endpoint) = std::env::var("CLOUDCHAT_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("CLOUDCHAT_MODEL") {
            self.model = model;
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("cloudchat").join("config.json"))
    }

    pub fn log_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("cloudchat").join("cloudchat.log"))
    }
}

/// Parse a comma-separated tool id list. Blank entries are dropped rather
/// than rejected.
pub fn parse_tool_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a `|`-separated starter prompt list.
pub fn parse_prompts(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .map(String::from)
        .collect()
}
