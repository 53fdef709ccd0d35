pub mod validation;

use serde::{Deserialize, Serialize};

pub use self::validation::validate_config;
use crate::protocol::prompt::{DEFAULT_ASSISTANT_SYSTEM_PROMPT, DEFAULT_REASONING_TEMPLATE};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Seconds allowed for one whole upstream exchange, streaming included.
    pub timeout: u64,
    pub http_pool_max_idle_per_host: usize,
    pub http_pool_idle_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_max_blocking_threads: Option<usize>,
    pub base_path: String,
    pub http_use_env_proxy: bool,
    pub max_request_body_bytes: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_max_request_body_bytes() -> usize {
    2 * 1024 * 1024
}

#[derive(Debug, Deserialize)]
struct ServerConfigWire {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    runtime_worker_threads: Option<RuntimeThreadsSetting>,
    #[serde(default)]
    runtime_max_blocking_threads: Option<RuntimeThreadsSetting>,
    #[serde(default)]
    base_path: String,
    #[serde(default)]
    http_use_env_proxy: bool,
    #[serde(default = "default_max_request_body_bytes")]
    max_request_body_bytes: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuntimeThreadsSetting {
    Fixed(usize),
    Auto(()),
}

fn runtime_threads_or_default(
    setting: Option<&RuntimeThreadsSetting>,
    default: Option<usize>,
) -> Option<usize> {
    match setting {
        None => default,
        Some(RuntimeThreadsSetting::Fixed(threads)) => Some(*threads),
        Some(RuntimeThreadsSetting::Auto(())) => None,
    }
}

impl<'de> Deserialize<'de> for ServerConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = ServerConfigWire::deserialize(deserializer)?;
        Ok(Self {
            port: wire.port,
            host: wire.host,
            timeout: wire.timeout,
            http_pool_max_idle_per_host: wire.http_pool_max_idle_per_host,
            http_pool_idle_timeout_secs: wire.http_pool_idle_timeout_secs,
            // missing => default, explicit null => runtime decides
            runtime_worker_threads: runtime_threads_or_default(
                wire.runtime_worker_threads.as_ref(),
                None,
            ),
            runtime_max_blocking_threads: runtime_threads_or_default(
                wire.runtime_max_blocking_threads.as_ref(),
                Some(8),
            ),
            base_path: normalize_base_path(&wire.base_path),
            http_use_env_proxy: wire.http_use_env_proxy,
            max_request_body_bytes: wire.max_request_body_bytes,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: Some(8),
            base_path: String::new(),
            http_use_env_proxy: false,
            max_request_body_bytes: default_max_request_body_bytes(),
        }
    }
}

/// `"/v1/"` -> `"/v1"`, `"v1"` -> `"/v1"`, `"/"` -> `""`.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Inline credential. When absent the value of `api_key_env` is used.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_base_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}
fn default_reasoning_model() -> String {
    "deepseek-reasoner".to_string()
}
fn default_chat_model() -> String {
    "deepseek-chat".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            reasoning_model: default_reasoning_model(),
            chat_model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            proxy: None,
        }
    }
}

impl UpstreamConfig {
    /// Fill `api_key` from the environment variable named by `api_key_env`
    /// unless an inline key is configured. Blank values count as absent.
    pub fn resolve_api_key(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let inline = self
            .api_key
            .take()
            .filter(|key| !key.trim().is_empty());
        self.api_key = inline.or_else(|| {
            lookup(&self.api_key_env).filter(|key| !key.trim().is_empty())
        });
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_assistant_system_prompt")]
    pub assistant_system_prompt: String,
    #[serde(default)]
    pub reasoning_prompt_template: Option<String>,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_assistant_system_prompt() -> String {
    DEFAULT_ASSISTANT_SYSTEM_PROMPT.to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            assistant_system_prompt: default_assistant_system_prompt(),
            reasoning_prompt_template: None,
        }
    }
}

impl FeaturesConfig {
    #[must_use]
    pub fn reasoning_template(&self) -> &str {
        self.reasoning_prompt_template
            .as_deref()
            .unwrap_or(DEFAULT_REASONING_TEMPLATE)
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Parse YAML text, resolve the credential and validate.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(
    contents: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let mut config: AppConfig = if contents.trim().is_empty() {
        AppConfig::default()
    } else {
        serde_yaml::from_str(contents)?
    };
    config.upstream.resolve_api_key(lookup);
    validate_config(&config)?;
    Ok(config)
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents, env_lookup)
}

/// Like [`load_config`], but a missing file yields the defaults.
///
/// # Errors
///
/// Same as [`load_config`] except for a missing file.
pub fn load_config_or_default(path: &str) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents, env_lookup),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path, "config file not found, using defaults");
            parse_config("", env_lookup)
        }
        Err(err) => Err(ConfigError::Io(err)),
    }
}
