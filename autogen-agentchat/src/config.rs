//! Runtime configuration.
//!
//! Every section carries serde defaults, so an empty file is a valid
//! configuration. Files may be TOML, YAML or JSON; environment variables
//! prefixed with `AGENTCHAT__` override file values, using `__` between
//! nested keys (`AGENTCHAT__RETRY__MAX_ATTEMPTS=5`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::reasoning::LoopConfig;
use crate::service::ServiceConfig;
use crate::team::CoordinatorConfig;
use crate::tools::NormalizerConfig;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "AGENTCHAT";

/// Backoff and attempt limits for failed tool calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Attempts per tool, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Extra attempts granted to authentication failures
    pub auth_retries: u32,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2.0,
            auth_retries: 1,
        }
    }
}

/// Per-tool overrides of the retry policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicy {
    pub max_attempts: Option<u32>,
    /// Tools tried, in order, once this one is given up on
    pub fallbacks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentChatConfig {
    pub reasoning: LoopConfig,
    pub normalizer: NormalizerConfig,
    pub retry: RetryPolicyConfig,
    pub tools: HashMap<String, ToolPolicy>,
    pub coordinator: CoordinatorConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

impl AgentChatConfig {
    /// Load a configuration file and apply environment overrides.
    ///
    /// # Errors
    /// Returns `ConfigError::FileNotFound` for a missing file and
    /// `ConfigError::InvalidValue` when a bound is out of range.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let loaded: AgentChatConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(loaded)
    }

    /// Parse inline TOML, without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let parsed: AgentChatConfig = toml::from_str(content).map_err(ConfigError::from)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject bounds that would make the system unusable
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let positive = [
            ("reasoning.max_invocations", self.reasoning.max_invocations as u64),
            ("reasoning.tool_timeout_ms", self.reasoning.tool_timeout_ms),
            ("normalizer.max_text_chars", self.normalizer.max_text_chars as u64),
            ("normalizer.max_structured_chars", self.normalizer.max_structured_chars as u64),
            ("normalizer.max_fields", self.normalizer.max_fields as u64),
            ("retry.max_attempts", self.retry.max_attempts as u64),
            ("coordinator.max_history_turns", self.coordinator.max_history_turns as u64),
            ("service.max_advances_per_request", self.service.max_advances_per_request as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(invalid(key, "0", "a value of at least 1"));
            }
        }
        for (name, policy) in &self.tools {
            if policy.max_attempts == Some(0) {
                return Err(invalid(&format!("tools.{}.max_attempts", name), "0", "a value of at least 1"));
            }
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(invalid(
                "retry.multiplier",
                &self.retry.multiplier.to_string(),
                "a finite number >= 1.0",
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.initial_delay_ms",
                &self.retry.initial_delay_ms.to_string(),
                "a value no greater than retry.max_delay_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}
