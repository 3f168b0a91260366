//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - civilex.toml (default configuration)
//! - civilex.local.toml (git-ignored local overrides)
//! - Environment variables (CIVILEX_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # civilex.toml
//! [llm]
//! backend = "ollama"
//! model = "llama3"
//!
//! [pipeline]
//! max_iters = 3
//! enable_judge = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! CIVILEX_LLM__BACKEND=dummy
//! CIVILEX_PIPELINE__MAX_ITERS=5
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend selector: "dummy" (offline, deterministic) or "ollama"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Model identifier for the real backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Ollama-compatible server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Maximum attempts per call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-call timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Hard cap on refinement iterations
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,

    /// Iterations summarized into the refinement prompt context
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Enable the judge metric
    #[serde(default)]
    pub enable_judge: bool,

    /// Cache canonicalizations by normalized question
    #[serde(default = "default_true")]
    pub enable_canonicalizer_cache: bool,

    /// TTL for cached canonicalizations (seconds; 0 disables expiry)
    #[serde(default = "default_cache_ttl_secs")]
    pub canonicalizer_cache_ttl_secs: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_backend() -> String { "dummy".to_string() }
fn default_model() -> String { "llama3".to_string() }
fn default_base_url() -> String { "http://127.0.0.1:11434".to_string() }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_timeout_secs() -> u64 { 300 }
fn default_max_iters() -> usize { 3 }
fn default_history_window() -> usize { 3 }
fn default_cache_ttl_secs() -> u64 { 600 }
fn default_bind_addr() -> String { "127.0.0.1:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
fn default_true() -> bool { true }

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            backend: default_backend(),
            model: default_model(),
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_iters: default_max_iters(),
            history_window: default_history_window(),
            enable_judge: false,
            enable_canonicalizer_cache: true,
            canonicalizer_cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig { bind_addr: default_bind_addr() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. civilex.toml (base configuration)
    /// 2. civilex.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (CIVILEX_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("civilex.toml"))
            .merge(Toml::file("civilex.local.toml"))
            .merge(Env::prefixed("CIVILEX_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CIVILEX_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.backend, "dummy");
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.pipeline.max_iters, 3);
        assert!(!config.pipeline.enable_judge);
        assert!(config.pipeline.enable_canonicalizer_cache);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        assert!(toml_str.contains("[llm]"));
        assert!(toml_str.contains("[pipeline]"));
        assert!(toml_str.contains("[http]"));
    }
}
