//! The persisted shape of a processed message.

use crate::context::{Failure, MessageContext};
use crate::core::{MessageKind, ProcessingStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The failure attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// `single` or `aggregate`.
    pub kind: String,
    /// The rendered failure.
    pub message: String,
    /// One message per captured error.
    pub causes: Vec<String>,
}

impl From<&Failure> for ErrorRecord {
    fn from(failure: &Failure) -> Self {
        let kind = match failure {
            Failure::Single(_) => "single",
            Failure::Aggregate(_) => "aggregate",
        };
        Self {
            kind: kind.to_string(),
            message: failure.to_string(),
            causes: failure.messages(),
        }
    }
}

/// A snapshot of a message context, written to a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message id.
    pub id: Uuid,
    /// Message kind.
    pub kind: MessageKind,
    /// Content type string.
    pub content_type: String,
    /// Serialized message content.
    pub content: serde_json::Value,
    /// Terminal failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    /// When the context was created.
    pub created_at: DateTime<Utc>,
    /// Handler execution time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_duration_ms: Option<f64>,
    /// Processing status.
    pub status: ProcessingStatus,
    /// Numeric status code.
    pub status_code: u8,
    /// Additional typed data.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    /// Serialized handler result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Name of the pipeline that processed the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
}

impl MessageRecord {
    /// Captures the current state of a context.
    #[must_use]
    pub fn from_context(ctx: &MessageContext) -> Self {
        let status = ctx.status();
        Self {
            id: ctx.id(),
            kind: ctx.kind(),
            content_type: ctx.content_type().to_string(),
            content: ctx.content().to_json(),
            error: ctx.failure().map(ErrorRecord::from),
            created_at: ctx.created_at(),
            execution_duration_ms: ctx.execution_duration().map(|d| d.as_secs_f64() * 1000.0),
            status,
            status_code: status.code(),
            data: ctx.data().clone(),
            result: ctx.result().map(|r| r.to_json()),
            pipeline: ctx.pipeline_name().map(ToString::to_string),
        }
    }

    /// Returns true if the record carries a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
