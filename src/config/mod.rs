//! Configuration module for cms-admin-core
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value (may be empty)
///
/// ```ignore
/// std::env::set_var("CMS_HOST", "cms.example.com");
/// let result = expand_env_vars("https://${CMS_HOST}/upload");
/// assert_eq!(result, "https://cms.example.com/upload");
///
/// let result = expand_env_vars("${MISSING:-fallback}");
/// assert_eq!(result, "fallback");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default, keep the placeholder as written.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Upper bound on automatic retries a config may ask for
pub const MAX_ALLOWED_RETRIES: u32 = 10;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upload: UploadQueueConfig,
    #[serde(default)]
    pub transport: Option<TransportConfig>,
    /// Widget registry manifests, in any order; priority comes from each file
    #[serde(default)]
    pub registries: Vec<PathBuf>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.max_retries > MAX_ALLOWED_RETRIES {
            return Err(ConfigError::ValidationError(format!(
                "upload.max_retries {} exceeds the maximum of {}",
                self.upload.max_retries, MAX_ALLOWED_RETRIES
            )));
        }

        if let Some(ref transport) = self.transport {
            if !is_valid_http_url(&transport.endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid transport endpoint '{}': must start with http:// or https://",
                    transport.endpoint
                )));
            }

            if transport.timeout_seconds == 0 {
                return Err(ConfigError::ValidationError(
                    "transport.timeout_seconds must be greater than 0".into(),
                ));
            }

            if transport.chunk_size == 0 {
                return Err(ConfigError::ValidationError(
                    "transport.chunk_size must be greater than 0".into(),
                ));
            }
        }

        if self.metrics.enabled && self.metrics.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "metrics.address cannot be empty when metrics are enabled".into(),
            ));
        }

        Ok(())
    }

    /// Resolve registry manifest paths relative to `base`
    pub fn registry_paths(&self, base: &Path) -> Vec<PathBuf> {
        self.registries
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { base.join(p) })
            .collect()
    }
}

/// Upload queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadQueueConfig {
    /// Automatic retries after a transport failure. Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between pump cycles in milliseconds. Default: 50
    #[serde(default = "default_pump_delay_ms")]
    pub pump_delay_ms: u64,
}

impl UploadQueueConfig {
    pub fn pump_delay(&self) -> Duration {
        Duration::from_millis(self.pump_delay_ms)
    }
}

impl Default for UploadQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            pump_delay_ms: default_pump_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_pump_delay_ms() -> u64 {
    50
}

/// HTTP upload transport configuration
///
/// ```yaml
/// transport:
///   endpoint: "https://${CMS_HOST}/api/media/upload"
///   timeout_seconds: 30
///   chunk_size: 65536
///   auth_token: "${CMS_TOKEN:-}"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub endpoint: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    65536 // 64KB
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}
