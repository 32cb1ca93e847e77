use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Path to wayfarer.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

// ── Gateway ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Bind port (default: 8000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Origins allowed by the CORS layer (default: the local UI)
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            cors_allowed_origins: default_cors_origins(),
        }
    }
}

// ── Database ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file (default: wayfarer.db in the working directory)
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("wayfarer.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

// ── Completion API ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key; the OPENAI_API_KEY environment variable takes priority
    pub api_key: Option<String>,
    /// Chat-completions endpoint base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
    /// Seed system message inserted into every new thread
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_llm_temperature() -> f64 {
    0.7
}

fn default_system_prompt() -> String {
    "You are a helpful travel documentation assistant.".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            system_prompt: default_system_prompt(),
        }
    }
}

// ── Loading / validation ─────────────────────────────────────────

impl Config {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. The OPENAI_API_KEY environment variable
    /// overrides `[llm] api_key` either way.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path)?;
            toml::from_str::<Self>(&raw)
                .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?
        } else {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            Self::default()
        };

        config.config_path = path.to_path_buf();

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            let key = key.trim();
            if !key.is_empty() {
                config.llm.api_key = Some(key.to_owned());
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".into()));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.base_url must not be empty".into(),
            ));
        }
        Ok(())
    }
}
