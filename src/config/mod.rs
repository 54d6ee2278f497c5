pub mod validation;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

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
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Total timeout for non-streaming upstream calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Maximum gap between two upstream chunks once a stream has started.
    /// Unset means streams are only bounded by the upstream closing them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_idle_timeout_secs: Option<u64>,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_probe_timeout_secs() -> u64 {
    10
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout_secs: default_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            stream_idle_timeout_secs: None,
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
        }
    }
}

/// The single upstream provider requests are translated for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_name")]
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u64,
    /// Top-level fields merged into the upstream body when
    /// `features.enable_thinking` is on.
    #[serde(default = "default_reasoning_directive")]
    pub reasoning_directive: serde_json::Map<String, serde_json::Value>,
}

fn default_upstream_name() -> String {
    "upstream".to_string()
}
fn default_temperature() -> f64 {
    0.6
}
fn default_max_tokens() -> u64 {
    8192
}
fn default_reasoning_directive() -> serde_json::Map<String, serde_json::Value> {
    let mut directive = serde_json::Map::new();
    directive.insert("enable_thinking".to_string(), serde_json::Value::Bool(true));
    directive
}

impl UpstreamConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: default_upstream_name(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            reasoning_directive: default_reasoning_directive(),
        }
    }
}

/// One heuristic fallback tier: the upstream model to use and the
/// lowercase substrings of a caller model id that select it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackTier {
    pub model: String,
    #[serde(default)]
    pub markers: Vec<String>,
}

/// Fallback tiers checked in order large, medium; small is the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_large_tier")]
    pub large: FallbackTier,
    #[serde(default = "default_medium_tier")]
    pub medium: FallbackTier,
    #[serde(default = "default_small_tier")]
    pub small: FallbackTier,
}

fn markers(values: &[&str]) -> Vec<String> {
    values.iter().map(|marker| (*marker).to_string()).collect()
}

fn default_large_tier() -> FallbackTier {
    FallbackTier {
        model: "qwen3-235b-a22b".to_string(),
        markers: markers(&["405b", "opus", "ultra", "large", "-max"]),
    }
}
fn default_medium_tier() -> FallbackTier {
    FallbackTier {
        model: "qwen3-32b".to_string(),
        markers: markers(&["70b", "72b", "sonnet", "medium", "plus", "32b"]),
    }
}
fn default_small_tier() -> FallbackTier {
    FallbackTier {
        model: "qwen3-8b".to_string(),
        markers: Vec::new(),
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            large: default_large_tier(),
            medium: default_medium_tier(),
            small: default_small_tier(),
        }
    }
}

/// Model alias table and resolution fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Caller-facing model id -> upstream model id.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Most probe results remembered at once. Recording one more clears
    /// the memo.
    #[serde(default = "default_memo_capacity")]
    pub memo_capacity: usize,
}

fn default_memo_capacity() -> usize {
    crate::resolver::memo::DEFAULT_MEMO_CAPACITY
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            fallback: FallbackConfig::default(),
            memo_capacity: default_memo_capacity(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Fold `reasoning_content` into `<think>` delimited content. When off,
    /// reasoning is dropped and only answer content is returned.
    #[serde(default = "default_true")]
    pub show_reasoning: bool,
    /// Attach `upstream.reasoning_directive` to every upstream request.
    #[serde(default = "default_true")]
    pub enable_thinking: bool,
    /// Stream mode used when the caller omits `stream`.
    #[serde(default)]
    pub default_stream: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            show_reasoning: true,
            enable_thinking: true,
            default_stream: false,
            log_level: default_log_level(),
            log_format: LogFormat::Text,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Build a config with defaults everywhere except the upstream endpoint.
    #[must_use]
    pub fn with_upstream(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::new(base_url, api_key),
            models: ModelsConfig::default(),
            features: FeaturesConfig::default(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
