//! Error types for the messageflow engine.
//!
//! Configuration mistakes (duplicate middleware ids, missing middlewares) and
//! pipeline-level failures are reported through [`PipelineError`]. Handler
//! failures are not errors of the pipeline itself: they are captured on the
//! message context and only surface here when a throw-on-fail middleware
//! converts them into a [`ProcessingError`].

use crate::core::{MessageKind, ProcessingStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No handler could be located or resolved for a message.
    #[error("Handler not found for message '{content_type}'")]
    HandlerNotFound {
        /// The content type of the message.
        content_type: String,
    },

    /// A middleware required by a configuration call is missing.
    #[error("Middleware not found: {id}")]
    MiddlewareNotFound {
        /// The missing middleware id.
        id: String,
    },

    /// A middleware with the same id already exists in the chain.
    #[error("Middleware with id '{id}' already exists in the pipeline")]
    DuplicateMiddlewareId {
        /// The conflicting id.
        id: String,
    },

    /// A failed message was converted into an error.
    #[error("{0}")]
    Processing(#[from] ProcessingError),

    /// The message payload broke one or more validation rules.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Processing was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A required context item is missing.
    #[error("Item '{key}' not found in message context")]
    KeyNotFound {
        /// The item key.
        key: String,
    },

    /// An invalid status transition was attempted.
    #[error("{0}")]
    Status(#[from] StatusTransitionError),

    /// The repository sink failed.
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// The pipeline does not accept messages of this kind.
    #[error("Pipeline '{pipeline}' does not accept {kind} messages")]
    UnsupportedKind {
        /// The pipeline name.
        pipeline: String,
        /// The rejected message kind.
        kind: MessageKind,
    },

    /// No query method is registered for a content type.
    #[error("Query method not found: {content_type}")]
    QueryNotFound {
        /// The `Type.Method` content type.
        content_type: String,
    },

    /// A query argument could not be converted to its parameter type.
    #[error("Cannot convert argument '{name}': {reason}")]
    ArgumentConversion {
        /// The parameter name.
        name: String,
        /// Why the conversion failed.
        reason: String,
    },

    /// The pipeline was configured incorrectly.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A middleware failed for a reason of its own.
    #[error("Middleware error: {0}")]
    Middleware(String),
}

impl PipelineError {
    /// Creates a handler not found error.
    #[must_use]
    pub fn handler_not_found(content_type: impl Into<String>) -> Self {
        Self::HandlerNotFound {
            content_type: content_type.into(),
        }
    }

    /// Creates a middleware not found error.
    #[must_use]
    pub fn middleware_not_found(id: impl Into<String>) -> Self {
        Self::MiddlewareNotFound { id: id.into() }
    }

    /// Creates a duplicate middleware id error.
    #[must_use]
    pub fn duplicate_middleware_id(id: impl Into<String>) -> Self {
        Self::DuplicateMiddlewareId { id: id.into() }
    }

    /// Creates a key not found error.
    #[must_use]
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates an argument conversion error.
    #[must_use]
    pub fn argument_conversion(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArgumentConversion {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns a stable, machine-readable name for the error kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::HandlerNotFound { .. } => "HandlerNotFound",
            Self::MiddlewareNotFound { .. } => "MiddlewareNotFound",
            Self::DuplicateMiddlewareId { .. } => "DuplicateMiddlewareId",
            Self::Processing(_) => "Processing",
            Self::Validation(_) => "Validation",
            Self::Cancelled(_) => "Cancelled",
            Self::KeyNotFound { .. } => "KeyNotFound",
            Self::Status(_) => "StatusTransition",
            Self::Repository(_) => "Repository",
            Self::UnsupportedKind { .. } => "UnsupportedKind",
            Self::QueryNotFound { .. } => "QueryNotFound",
            Self::ArgumentConversion { .. } => "ArgumentConversion",
            Self::Configuration(_) => "Configuration",
            Self::Middleware(_) => "Middleware",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind_name()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::HandlerNotFound { content_type } | Self::QueryNotFound { content_type } => {
                map.insert("content_type".to_string(), serde_json::json!(content_type));
            }
            Self::MiddlewareNotFound { id } | Self::DuplicateMiddlewareId { id } => {
                map.insert("id".to_string(), serde_json::json!(id));
            }
            Self::Validation(err) => {
                map.insert("broken_rules".to_string(), serde_json::json!(err.rules));
            }
            Self::Processing(err) => {
                map.insert("failure_count".to_string(), serde_json::json!(err.failure_count()));
            }
            _ => {}
        }

        map
    }
}

/// Error raised by the throw-on-fail middleware for a failed message.
///
/// When built with [`ProcessingError::with_source`], the original handler
/// error stays reachable through [`std::error::Error::source`].
#[derive(Debug, Clone)]
pub struct ProcessingError {
    /// The content type of the failed message.
    pub content_type: String,
    /// The status of the message when the error was raised.
    pub status: ProcessingStatus,
    /// Messages of every captured cause.
    pub causes: Vec<String>,
    source: Option<Arc<anyhow::Error>>,
}

impl ProcessingError {
    /// Creates a processing error from cause messages.
    #[must_use]
    pub fn new(
        content_type: impl Into<String>,
        status: ProcessingStatus,
        causes: Vec<String>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            status,
            causes,
            source: None,
        }
    }

    /// Attaches the original error as the source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<anyhow::Error>) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns the original error, if it was preserved.
    #[must_use]
    pub fn original(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Returns the number of captured causes.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.causes.len()
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.causes.as_slice() {
            [] => write!(f, "Processing of '{}' failed", self.content_type),
            [single] => write!(f, "Processing of '{}' failed: {}", self.content_type, single),
            many => write!(
                f,
                "Processing of '{}' failed with {} errors: {}",
                self.content_type,
                many.len(),
                many.join("; ")
            ),
        }
    }
}

impl std::error::Error for ProcessingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| -> &(dyn std::error::Error + 'static) { err.as_ref() })
    }
}

/// A single violated validation constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenRule {
    /// The field that failed validation.
    pub field: String,
    /// A short rule code (e.g. "required", "range").
    pub code: String,
    /// A human readable message.
    pub message: String,
}

impl BrokenRule {
    /// Creates a new broken rule.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a payload breaks validation rules.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Validation failed for '{content_type}' ({} broken rule(s))", .rules.len())]
pub struct ValidationError {
    /// The content type of the rejected message.
    pub content_type: String,
    /// One entry per violated constraint.
    pub rules: Vec<BrokenRule>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(content_type: impl Into<String>, rules: Vec<BrokenRule>) -> Self {
        Self {
            content_type: content_type.into(),
            rules,
        }
    }

    /// Returns true if the given field broke at least one rule.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.rules.iter().any(|r| r.field == field)
    }
}

/// Error raised when a status change would move a message backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid status transition: {from} -> {to}")]
pub struct StatusTransitionError {
    /// The current status.
    pub from: ProcessingStatus,
    /// The requested status.
    pub to: ProcessingStatus,
}

/// Error raised by a message repository sink.
#[derive(Debug, Clone, Error)]
#[error("Repository write failed: {message}")]
pub struct RepositoryError {
    /// The failure message.
    pub message: String,
}

impl RepositoryError {
    /// Creates a new repository error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised when a handler dependency cannot be resolved.
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    /// The resolver returned nothing for the type.
    #[error("Cannot resolve dependency of type '{type_name}'")]
    Unresolved {
        /// The requested type.
        type_name: String,
    },

    /// Parameter resolution is disabled on this executor.
    #[error("Parameter resolution is disabled; cannot resolve '{type_name}'")]
    Disabled {
        /// The requested type.
        type_name: String,
    },
}

/// Wrapper marking an error raised while invoking a handler.
///
/// The executor unwraps these to the inner cause before storing the failure,
/// so nested dispatch does not bury the original error.
#[derive(Debug)]
pub struct InvocationError {
    inner: anyhow::Error,
}

impl InvocationError {
    /// Wraps an inner error.
    #[must_use]
    pub fn new(inner: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: inner.into(),
        }
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler invocation failed: {}", self.inner)
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// A handler panicked; the panic payload is kept as the message.
#[derive(Debug, Clone, Error)]
#[error("Handler panicked: {message}")]
pub struct HandlerPanic {
    /// The panic message.
    pub message: String,
}
