// Configuration for the Marginalia server.
//
// File: `~/.marginalia/config.toml`; environment variables override the
// file. The provider credential is environment-only (`MARGINALIA_API_KEY`)
// and never written to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use marginalia_common::types::AiMode;

pub const API_KEY_ENV: &str = "MARGINALIA_API_KEY";
pub const MODEL_ENV: &str = "MARGINALIA_MODEL";
pub const PROVIDER_URL_ENV: &str = "MARGINALIA_PROVIDER_URL";
pub const LISTEN_ADDR_ENV: &str = "MARGINALIA_LISTEN_ADDR";
pub const TIMEOUT_SECS_ENV: &str = "MARGINALIA_AI_TIMEOUT_SECS";

const DEFAULT_MODEL: &str = "claude-haiku-4-5";
const DEFAULT_PROVIDER_URL: &str = "https://api.anthropic.com";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
/// Wall-clock budget for one provider call.
const DEFAULT_TIMEOUT_SECS: u64 = 45;
/// Critique answers are short feedback.
const DEFAULT_CRITIQUE_MAX_TOKENS: u32 = 1024;
/// Synthesize needs room for a full rewrite plus explanation.
const DEFAULT_SYNTHESIZE_MAX_TOKENS: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid provider URL `{url}`: {source}")]
    InvalidProviderUrl { url: String, source: url::ParseError },
}

/// Root directory for Marginalia global state: `~/.marginalia/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".marginalia"))
}

/// Path to the config file: `~/.marginalia/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("config.toml"))
}

/// The provider credential, from the environment only.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().map(|key| key.trim().to_string()).filter(|key| !key.is_empty())
}

/// On-disk shape of `config.toml`. Every field optional; defaults apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub model: Option<String>,
    pub provider_url: Option<String>,
    pub listen_addr: Option<String>,
    pub ai_timeout_secs: Option<u64>,
    pub critique_max_tokens: Option<u32>,
    pub synthesize_max_tokens: Option<u32>,
}

impl FileConfig {
    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load from `~/.marginalia/config.toml`, defaulting when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        config_path().and_then(|path| Self::load_from(&path).ok()).unwrap_or_default()
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub model: String,
    pub provider_url: Url,
    pub listen_addr: String,
    pub timeout: Duration,
    pub critique_max_tokens: u32,
    pub synthesize_max_tokens: u32,
}

impl ServerConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(FileConfig::load(), |name| std::env::var(name).ok())
    }

    /// Merge file values with environment overrides. Environment wins.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let model = env(MODEL_ENV)
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let raw_url = env(PROVIDER_URL_ENV)
            .or(file.provider_url)
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string());
        let provider_url = Url::parse(&raw_url)
            .map_err(|source| ConfigError::InvalidProviderUrl { url: raw_url, source })?;
        let listen_addr = env(LISTEN_ADDR_ENV)
            .or(file.listen_addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let timeout_secs = env(TIMEOUT_SECS_ENV)
            .and_then(|raw| raw.parse().ok())
            .or(file.ai_timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            model,
            provider_url,
            listen_addr,
            timeout: Duration::from_secs(timeout_secs),
            critique_max_tokens: file.critique_max_tokens.unwrap_or(DEFAULT_CRITIQUE_MAX_TOKENS),
            synthesize_max_tokens: file
                .synthesize_max_tokens
                .unwrap_or(DEFAULT_SYNTHESIZE_MAX_TOKENS),
        })
    }

    /// Mode-dependent output budget: critique small, synthesize several
    /// times larger.
    pub fn max_tokens_for(&self, mode: AiMode) -> u32 {
        match mode {
            AiMode::Critique => self.critique_max_tokens,
            AiMode::Synthesize => self.synthesize_max_tokens,
        }
    }
}
