//! Configuration for [`PromptEngine`](crate::engine::PromptEngine) and the
//! optimization loop.
//!
//! # Examples
//!
//! ```
//! use cinch_compose::config::{EngineConfig, OptimizerConfig};
//! use std::time::Duration;
//!
//! let config = EngineConfig::default()
//!     .with_cache_ttl(Duration::from_secs(30))
//!     .with_optimizer(OptimizerConfig::default().with_max_tokens(2048));
//! assert_eq!(config.optimizer.max_tokens, 2048);
//! ```

use crate::DEFAULT_MODEL;
use crate::overrides::DEFAULT_CACHE_TTL;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the JSON override store, relative to the working
/// directory.
pub const DEFAULT_STORE_PATH: &str = ".cinch/prompt-overrides.json";

/// Environment variable holding the OpenRouter API key.
pub const API_KEY_ENV: &str = "OPENROUTER_KEY";

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a fetched override snapshot is served before re-reading.
    pub cache_ttl: Duration,
    /// Where [`JsonFileStore`](crate::overrides::JsonFileStore) persists.
    pub store_path: PathBuf,
    pub optimizer: OptimizerConfig,
}

impl EngineConfig {
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            optimizer: OptimizerConfig::default(),
        }
    }
}

/// Settings for the analysis call.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// OpenRouter model id.
    pub model: String,
    pub max_tokens: u32,
    /// Low by default; suggestions should be stable across runs.
    pub temperature: f32,
    /// Upper bound on one provider call.
    pub timeout: Duration,
}

impl OptimizerConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.store_path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(config.optimizer.model, DEFAULT_MODEL);
        assert_eq!(config.optimizer.max_tokens, 4096);
        assert_eq!(config.optimizer.timeout, Duration::from_secs(60));
    }

    #[test]
    fn builders_override_fields() {
        let config = EngineConfig::default()
            .with_store_path("/tmp/overrides.json")
            .with_optimizer(
                OptimizerConfig::default()
                    .with_model("openai/gpt-4o")
                    .with_temperature(0.0)
                    .with_timeout(Duration::from_secs(5)),
            );
        assert_eq!(config.store_path, PathBuf::from("/tmp/overrides.json"));
        assert_eq!(config.optimizer.model, "openai/gpt-4o");
        assert_eq!(config.optimizer.temperature, 0.0);
        assert_eq!(config.optimizer.timeout, Duration::from_secs(5));
    }
}
