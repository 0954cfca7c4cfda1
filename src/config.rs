use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default question-answering endpoint.
pub const DEFAULT_INFERENCE_URL: &str =
    "https://api-inference.huggingface.co/models/pierreguillou/bert-base-cased-squad-v1.1-portuguese";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_max_file_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    vec!["csv".to_string(), "pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

fn default_secret_env() -> String {
    "RECORDSIFT_TOKEN_SECRET".to_string()
}
fn default_token_ttl_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Request timeout; `None` leaves the transport default in place.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: default_inference_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: None,
        }
    }
}

fn default_inference_url() -> String {
    DEFAULT_INFERENCE_URL.to_string()
}
fn default_api_key_env() -> String {
    "HUGGINGFACE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.max_file_bytes == 0 {
            anyhow::bail!("server.max_file_bytes must be > 0");
        }
        if self.server.allowed_extensions.is_empty() {
            anyhow::bail!("server.allowed_extensions must not be empty");
        }

        if self.auth.token_ttl_secs == 0 {
            anyhow::bail!("auth.token_ttl_secs must be > 0");
        }
        if self.auth.secret_env.trim().is_empty() {
            anyhow::bail!("auth.secret_env must name an environment variable");
        }

        if !(self.inference.url.starts_with("http://") || self.inference.url.starts_with("https://"))
        {
            anyhow::bail!(
                "inference.url must start with http:// or https://, got '{}'",
                self.inference.url
            );
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!(
                "Unknown logging format: '{}'. Must be text or json.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml(&content)
}
