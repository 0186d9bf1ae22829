//! Tool failure classification and recovery decisions.
//!
//! [`ErrorPolicy::classify`] maps whatever went wrong during a dispatch onto an
//! [`ErrorKind`]; [`ErrorPolicy::decide`] turns that kind plus the attempt
//! count into a [`PolicyDecision`]: retry after a delay, switch to a
//! configured fallback tool, or abort the call chain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::config::{AgentChatConfig, RetryPolicyConfig, ToolPolicy};
use crate::error::ValidationError;
use crate::tools::ToolDescriptor;

/// Concrete failure kinds seen while dispatching a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Timeout,
    RateLimited,
    Network,
    ServerError,
    AuthFailure,
    UnknownTool,
    Unsupported,
    MalformedOutput,
    Cancelled,
    Internal,
}

/// Taxonomy classes that drive recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad arguments; never retried, the model re-plans
    Malformed,
    /// Worth retrying with backoff
    Transient,
    /// Retrying the same tool will not help
    Permanent,
    /// External cancellation; terminal
    Cancelled,
}

impl ErrorKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::Validation => ErrorClass::Malformed,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::Network | ErrorKind::ServerError => {
                ErrorClass::Transient
            }
            ErrorKind::AuthFailure
            | ErrorKind::UnknownTool
            | ErrorKind::Unsupported
            | ErrorKind::MalformedOutput
            | ErrorKind::Internal => ErrorClass::Permanent,
            ErrorKind::Cancelled => ErrorClass::Cancelled,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Network => "network",
            ErrorKind::ServerError => "server_error",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::MalformedOutput => "malformed_output",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }

    /// Map a collaborator-reported kind string (`"timeout"`, `"429"`, `"http_503"`, ...)
    pub fn from_reported(kind: &str) -> ErrorKind {
        let normalized = kind.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let code = normalized.strip_prefix("http_").unwrap_or(&normalized);
        if let Ok(status) = code.parse::<u16>() {
            return Self::from_status(status);
        }
        match code {
            "validation" | "validation_error" | "invalid_arguments" | "invalid_argument" | "bad_request" => {
                ErrorKind::Validation
            }
            "timeout" | "timed_out" | "deadline_exceeded" => ErrorKind::Timeout,
            "rate_limit" | "rate_limited" | "too_many_requests" | "throttled" => ErrorKind::RateLimited,
            "network" | "connection" | "connection_reset" | "connection_refused" | "dns" => ErrorKind::Network,
            "5xx" | "server_error" | "internal_server_error" | "bad_gateway" | "service_unavailable"
            | "unavailable" => ErrorKind::ServerError,
            "auth" | "auth_failure" | "unauthorized" | "unauthenticated" | "forbidden" => {
                ErrorKind::AuthFailure
            }
            "unknown_tool" | "tool_not_found" => ErrorKind::UnknownTool,
            "unsupported" | "unsupported_operation" | "not_implemented" | "not_found" => ErrorKind::Unsupported,
            "malformed_output" | "invalid_response" => ErrorKind::MalformedOutput,
            "cancelled" | "canceled" => ErrorKind::Cancelled,
            _ => ErrorKind::Internal,
        }
    }

    fn from_status(status: u16) -> ErrorKind {
        match status {
            400 | 422 => ErrorKind::Validation,
            401 | 403 => ErrorKind::AuthFailure,
            404 | 405 | 501 => ErrorKind::Unsupported,
            408 | 504 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong during one dispatch, before classification
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchFailure {
    /// The collaborator answered `{status: "error", kind, detail}`
    Reported { kind: String, detail: String },
    /// The caller-supplied deadline expired
    TimedOut { timeout_ms: u64 },
    /// The session was cancelled mid-dispatch
    Cancelled,
    /// Arguments did not fit the tool's schema
    Invalid(ValidationError),
    /// The named tool is not registered
    UnknownTool(String),
    /// The payload did not match the declared result schema
    MalformedOutput(String),
}

impl DispatchFailure {
    pub fn detail(&self) -> String {
        match self {
            DispatchFailure::Reported { detail, .. } => detail.clone(),
            DispatchFailure::TimedOut { timeout_ms } => format!("no response within {} ms", timeout_ms),
            DispatchFailure::Cancelled => "dispatch cancelled".to_string(),
            DispatchFailure::Invalid(err) => err.to_string(),
            DispatchFailure::UnknownTool(name) => format!("tool '{}' is not registered", name),
            DispatchFailure::MalformedOutput(detail) => detail.clone(),
        }
    }
}

/// Recovery action for a failed dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Retry { delay: Duration },
    Fallback { tool: String },
    Abort,
}

/// Tracks which tools a logical call chain has already used
#[derive(Debug, Clone)]
pub struct FallbackChain {
    origin: String,
    tried: Vec<String>,
}

impl FallbackChain {
    pub fn new(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            tried: vec![origin.clone()],
            origin,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn mark_tried(&mut self, tool: &str) {
        if !self.has_tried(tool) {
            self.tried.push(tool.to_string());
        }
    }

    pub fn has_tried(&self, tool: &str) -> bool {
        self.tried.iter().any(|t| t == tool)
    }

    pub fn tried(&self) -> &[String] {
        &self.tried
    }
}

/// Retry/fallback policy, configured globally with per-tool overrides
#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
    config: RetryPolicyConfig,
    tools: HashMap<String, ToolPolicy>,
}

impl ErrorPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self {
            config,
            tools: HashMap::new(),
        }
    }

    pub fn from_config(config: &AgentChatConfig) -> Self {
        Self {
            config: config.retry.clone(),
            tools: config.tools.clone(),
        }
    }

    /// Override the retry bound and fallback list of one tool
    pub fn with_tool_policy(mut self, tool: impl Into<String>, policy: ToolPolicy) -> Self {
        self.tools.insert(tool.into(), policy);
        self
    }

    pub fn classify(&self, failure: &DispatchFailure) -> ErrorKind {
        match failure {
            DispatchFailure::Reported { kind, .. } => ErrorKind::from_reported(kind),
            DispatchFailure::TimedOut { .. } => ErrorKind::Timeout,
            DispatchFailure::Cancelled => ErrorKind::Cancelled,
            DispatchFailure::Invalid(_) => ErrorKind::Validation,
            DispatchFailure::UnknownTool(_) => ErrorKind::UnknownTool,
            DispatchFailure::MalformedOutput(_) => ErrorKind::MalformedOutput,
        }
    }

    /// Total attempts allowed for one tool within a chain, including the first
    pub fn max_attempts_for(&self, tool: &str) -> u32 {
        self.tools
            .get(tool)
            .and_then(|p| p.max_attempts)
            .unwrap_or(self.config.max_attempts)
            .max(1)
    }

    pub fn fallbacks_for(&self, tool: &str) -> &[String] {
        self.tools.get(tool).map_or(&[], |p| p.fallbacks.as_slice())
    }

    /// Delay before the retry that follows `attempt` (1-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = self.config.initial_delay_ms as f64 * self.config.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.config.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Decide how to recover from a failure of `descriptor` on its `attempt`-th try.
    ///
    /// `attempt` counts tries of this tool only; fallback candidates come from the
    /// chain's origin tool and skip anything the chain already used.
    pub fn decide(
        &self,
        kind: ErrorKind,
        attempt: u32,
        descriptor: &ToolDescriptor,
        chain: &FallbackChain,
    ) -> PolicyDecision {
        match kind.class() {
            ErrorClass::Malformed | ErrorClass::Cancelled => PolicyDecision::Abort,
            ErrorClass::Transient => {
                if attempt < self.max_attempts_for(descriptor.name()) {
                    PolicyDecision::Retry {
                        delay: self.delay_for_attempt(attempt),
                    }
                } else {
                    self.next_fallback(descriptor, chain)
                }
            }
            ErrorClass::Permanent => {
                if kind == ErrorKind::AuthFailure && attempt <= self.config.auth_retries {
                    PolicyDecision::Retry {
                        delay: self.delay_for_attempt(attempt),
                    }
                } else {
                    self.next_fallback(descriptor, chain)
                }
            }
        }
    }

    fn next_fallback(&self, descriptor: &ToolDescriptor, chain: &FallbackChain) -> PolicyDecision {
        self.fallbacks_for(chain.origin())
            .iter()
            .find(|name| name.as_str() != descriptor.name() && !chain.has_tried(name))
            .map_or(PolicyDecision::Abort, |tool| PolicyDecision::Fallback { tool: tool.clone() })
    }
}
