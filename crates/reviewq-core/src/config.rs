use crate::error::{Result, ReviewError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "reviewq.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RemoteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_token_env() -> String {
    "REVIEWQ_TOKEN".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The token from `token_env`, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_queue_poll")]
    pub queue_poll_secs: u64,
    #[serde(default = "default_queue_stale")]
    pub queue_stale_secs: u64,
    #[serde(default = "default_stats_poll")]
    pub stats_poll_secs: u64,
    #[serde(default = "default_stats_stale")]
    pub stats_stale_secs: u64,
    #[serde(default = "default_conversation_stale")]
    pub conversation_stale_secs: u64,
}

fn default_queue_poll() -> u64 {
    30
}

fn default_queue_stale() -> u64 {
    10
}

fn default_stats_poll() -> u64 {
    15
}

fn default_stats_stale() -> u64 {
    5
}

fn default_conversation_stale() -> u64 {
    10
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            queue_poll_secs: default_queue_poll(),
            queue_stale_secs: default_queue_stale(),
            stats_poll_secs: default_stats_poll(),
            stats_stale_secs: default_stats_stale(),
            conversation_stale_secs: default_conversation_stale(),
        }
    }
}

impl CacheConfig {
    pub fn queue_poll(&self) -> Duration {
        Duration::from_secs(self.queue_poll_secs)
    }

    pub fn stats_poll(&self) -> Duration {
        Duration::from_secs(self.stats_poll_secs)
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts for a read, including the first.
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Extra attempts for a mutation after a transient failure.
    #[serde(default = "default_mutation_retries")]
    pub mutation_retries: u32,
}

fn default_read_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    200
}

fn default_max_delay() -> u64 {
    2000
}

fn default_mutation_retries() -> u32 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            read_attempts: default_read_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            mutation_retries: default_mutation_retries(),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// `needs_decision` at or above this is reported as urgent.
    #[serde(default = "default_urgent_threshold")]
    pub urgent_threshold: u32,
    /// Confidence strictly below this is listed under `low_confidence`.
    #[serde(default = "default_low_confidence")]
    pub low_confidence_threshold: u8,
}

fn default_urgent_threshold() -> u32 {
    5
}

fn default_low_confidence() -> u8 {
    70
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            urgent_threshold: default_urgent_threshold(),
            low_confidence_threshold: default_low_confidence(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReviewError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ReviewError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "remote.base_url '{}' must start with http:// or https://",
                    self.remote.base_url
                ),
            });
        }

        for (name, secs) in [
            ("cache.queue_poll_secs", self.cache.queue_poll_secs),
            ("cache.stats_poll_secs", self.cache.stats_poll_secs),
        ] {
            if secs == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name} must be greater than zero"),
                });
            }
        }

        if self.cache.queue_stale_secs > self.cache.queue_poll_secs {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "cache.queue_stale_secs={} exceeds queue_poll_secs={}; polls will hit the cache",
                    self.cache.queue_stale_secs, self.cache.queue_poll_secs
                ),
            });
        }

        if self.retry.read_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "retry.read_attempts must be at least 1".to_string(),
            });
        }

        if self.retry.mutation_retries > 1 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "retry.mutation_retries={} is capped at 1",
                    self.retry.mutation_retries
                ),
            });
        }

        if self.policy.urgent_threshold == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "policy.urgent_threshold must be at least 1".to_string(),
            });
        }

        if self.policy.low_confidence_threshold > 100 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "policy.low_confidence_threshold={} is above 100; every card is low confidence",
                    self.policy.low_confidence_threshold
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
