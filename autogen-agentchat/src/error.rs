//! Error handling for autogen-agentchat

use thiserror::Error;

use crate::policy::ErrorKind;
use crate::types::SessionState;

/// Result type alias for agentchat operations
pub type Result<T> = std::result::Result<T, AgentChatError>;

/// Main error type for the autogen-agentchat library
#[derive(Debug, Error)]
pub enum AgentChatError {
    /// Tool registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    /// Argument validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    /// A tool call chain failed and was not recovered
    #[error("Tool '{tool}' failed ({kind}): {detail}")]
    Tool {
        tool: String,
        kind: ErrorKind,
        detail: String,
    },
    /// The model client failed to produce a response
    #[error("Model error: {0}")]
    Model(String),
    /// Session and transcript errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The session was cancelled
    #[error("Session cancelled")]
    Cancelled,
    /// An operation exceeded its deadline
    #[error("Operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Tool registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
    /// No tool with this name is registered
    #[error("Tool '{0}' is not registered")]
    UnknownTool(String),
    /// The descriptor itself is malformed
    #[error("Invalid descriptor for tool '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

/// Argument validation errors raised by the parameter marshaler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Arguments were not a JSON object
    #[error("arguments must be a JSON object, got {found}")]
    NotAnObject { found: String },
    /// Required parameter missing
    #[error("required parameter '{field}' is missing")]
    MissingRequired { field: String },
    /// Parameter not declared by the tool
    #[error("unknown parameter '{field}'")]
    UnknownParameter { field: String },
    /// Value could not be converted to the declared type
    #[error("parameter '{field}' expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
    /// Value is outside the declared set of allowed values
    #[error("parameter '{field}' value {value} is not one of the allowed values")]
    NotAllowed { field: String, value: String },
}

impl ValidationError {
    /// Name of the offending field, if the error concerns a single field
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::NotAnObject { .. } => None,
            ValidationError::MissingRequired { field }
            | ValidationError::UnknownParameter { field }
            | ValidationError::TypeMismatch { field, .. }
            | ValidationError::NotAllowed { field, .. } => Some(field),
        }
    }
}

/// Session and transcript errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Session not found
    #[error("Session '{session_id}' not found")]
    NotFound { session_id: String },
    /// Session id already in use
    #[error("Session '{session_id}' already exists")]
    AlreadyExists { session_id: String },
    /// Session id contains characters that are not allowed
    #[error("Invalid session id '{session_id}'")]
    InvalidId { session_id: String },
    /// The session no longer accepts turns
    #[error("Session '{session_id}' has ended ({state})")]
    Ended {
        session_id: String,
        state: SessionState,
    },
    /// Appended turn does not continue the transcript
    #[error("Sequence gap in session '{session_id}': expected {expected}, found {found}")]
    SequenceGap {
        session_id: String,
        expected: u64,
        found: u64,
    },
    /// Illegal state transition
    #[error("Invalid state transition {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
    /// Participant set is not usable
    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),
    /// Stored data could not be read back
    #[error("Session '{session_id}' is corrupted: {details}")]
    Corrupted { session_id: String, details: String },
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration source could not be loaded or parsed
    #[error("Failed to load configuration: {0}")]
    Load(String),
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
    /// Invalid configuration value
    #[error("Invalid value for '{key}': '{value}' (expected: {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Load(err.to_string())
    }
}

impl From<config::ConfigError> for AgentChatError {
    fn from(err: config::ConfigError) -> Self {
        AgentChatError::Config(err.into())
    }
}

impl AgentChatError {
    /// Create a generic internal error with a message
    pub fn other<S: Into<String>>(message: S) -> Self {
        AgentChatError::Internal(message.into())
    }

    /// Check if this error was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentChatError::Cancelled)
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            AgentChatError::Timeout { .. } => true,
            AgentChatError::Model(_) => true,
            AgentChatError::Validation(_) => true,
            AgentChatError::Tool { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::TypeMismatch {
            field: "x".to_string(),
            expected: "number".to_string(),
            found: "boolean".to_string(),
        };
        assert_eq!(err.field(), Some("x"));
        assert!(err.to_string().contains("'x'"));

        let err = ValidationError::NotAnObject {
            found: "array".to_string(),
        };
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(AgentChatError::Timeout { timeout_ms: 10 }.is_recoverable());
        assert!(!AgentChatError::Cancelled.is_recoverable());
        assert!(AgentChatError::Cancelled.is_cancelled());
        assert!(!AgentChatError::other("boom").is_recoverable());
    }

    #[test]
    fn test_nested_display() {
        let err: AgentChatError = RegistryError::UnknownTool("search".to_string()).into();
        assert_eq!(err.to_string(), "Registry error: Tool 'search' is not registered");

        let err: AgentChatError = SessionError::Ended {
            session_id: "s1".to_string(),
            state: SessionState::Terminated,
        }
        .into();
        assert!(err.to_string().contains("terminated"));
    }
}
