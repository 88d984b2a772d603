//! The mutable record threaded through one pipeline run.

use super::Failure;
use crate::core::{MessageKind, Payload, ProcessingStatus, TypeKey};
use crate::errors::{PipelineError, StatusTransitionError};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// The context of one message as it travels through a pipeline.
///
/// A context is created at pipeline entry, mutated by every middleware in
/// sequence and handed back to the caller (or captured into a
/// [`MessageRecord`](crate::repository::MessageRecord)) when the run ends.
pub struct MessageContext {
    id: Uuid,
    kind: MessageKind,
    content: Box<dyn Payload>,
    content_type: String,
    status: ProcessingStatus,
    failure: Option<Failure>,
    created_at: DateTime<Utc>,
    execution_duration: Option<Duration>,
    data: BTreeMap<String, serde_json::Value>,
    items: HashMap<String, Box<dyn Any + Send + Sync>>,
    result: Option<Box<dyn Payload>>,
    pipeline_name: Option<String>,
}

impl MessageContext {
    /// Creates a context around boxed content.
    ///
    /// The content type defaults to the payload's type name.
    #[must_use]
    pub fn new(kind: MessageKind, content: Box<dyn Payload>) -> Self {
        let content_type = content.type_key().name().to_string();
        Self {
            id: Uuid::new_v4(),
            kind,
            content,
            content_type,
            status: ProcessingStatus::NotInitialized,
            failure: None,
            created_at: Utc::now(),
            execution_duration: None,
            data: BTreeMap::new(),
            items: HashMap::new(),
            result: None,
            pipeline_name: None,
        }
    }

    /// Creates a context around a message value.
    #[must_use]
    pub fn for_message<T: Payload>(kind: MessageKind, message: T) -> Self {
        Self::new(kind, Box::new(message))
    }

    /// Overrides the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Returns the message id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the content.
    #[must_use]
    pub fn content(&self) -> &dyn Payload {
        self.content.as_ref()
    }

    /// Returns the content mutably.
    pub fn content_mut(&mut self) -> &mut dyn Payload {
        self.content.as_mut()
    }

    /// Returns the content as a `T`, if it is one.
    #[must_use]
    pub fn content_as<T: Any>(&self) -> Option<&T> {
        self.content.downcast_ref::<T>()
    }

    /// Returns the content mutably as a `T`, if it is one.
    pub fn content_as_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.content.downcast_mut::<T>()
    }

    /// Returns the type key of the content.
    #[must_use]
    pub fn content_key(&self) -> TypeKey {
        self.content.type_key()
    }

    /// Returns the content type id.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Consumes the context and returns the content as a `T`.
    #[must_use]
    pub fn into_content<T: Any>(self) -> Option<T> {
        self.content.into_any().downcast::<T>().ok().map(|value| *value)
    }

    /// Returns the processing status.
    #[must_use]
    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    /// Moves the status forward.
    pub fn set_status(&mut self, status: ProcessingStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(status) {
            return Err(StatusTransitionError {
                from: self.status,
                to: status,
            });
        }
        if self.status != status {
            debug!(message_id = %self.id, from = %self.status, to = %status, "Status changed");
        }
        self.status = status;
        Ok(())
    }

    /// Returns true if the message was rejected.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.status == ProcessingStatus::Rejected
    }

    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the captured failure.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Attaches a failure.
    pub fn set_failure(&mut self, failure: Failure) {
        self.failure = Some(failure);
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the measured execution duration.
    #[must_use]
    pub fn execution_duration(&self) -> Option<Duration> {
        self.execution_duration
    }

    /// Records the execution duration.
    pub fn set_execution_duration(&mut self, duration: Duration) {
        self.execution_duration = Some(duration);
    }

    /// Returns the additional data map.
    #[must_use]
    pub fn data(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.data
    }

    /// Inserts additional data.
    pub fn insert_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Returns a required item.
    pub fn item<T: Any>(&self, key: &str) -> Result<&T, PipelineError> {
        self.items
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .ok_or_else(|| PipelineError::key_not_found(key))
    }

    /// Returns a required item mutably.
    pub fn item_mut<T: Any>(&mut self, key: &str) -> Result<&mut T, PipelineError> {
        self.items
            .get_mut(key)
            .and_then(|v| v.downcast_mut::<T>())
            .ok_or_else(|| PipelineError::key_not_found(key))
    }

    /// Returns an optional item, or the default when absent.
    #[must_use]
    pub fn item_or<T: Any + Clone>(&self, key: &str, default: T) -> T {
        self.item::<T>(key).map_or(default, Clone::clone)
    }

    /// Stores an item, replacing any previous value.
    pub fn set_item<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.items.insert(key.into(), Box::new(value));
    }

    /// Removes and returns an item.
    ///
    /// An item of another type is left in place.
    pub fn take_item<T: Any>(&mut self, key: &str) -> Option<T> {
        let boxed = self.items.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.items.insert(key.to_string(), other);
                None
            }
        }
    }

    /// Returns true if an item exists under the key.
    #[must_use]
    pub fn contains_item(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Returns the handler result.
    #[must_use]
    pub fn result(&self) -> Option<&dyn Payload> {
        self.result.as_deref()
    }

    /// Stores the handler result.
    pub fn set_result(&mut self, result: Box<dyn Payload>) {
        self.result = Some(result);
    }

    /// Removes the handler result as an `R`.
    pub fn take_result<R: Any>(&mut self) -> Option<R> {
        if !self.result.as_ref().is_some_and(|r| r.is::<R>()) {
            return None;
        }
        self.result
            .take()
            .and_then(|r| r.into_any().downcast::<R>().ok())
            .map(|r| *r)
    }

    /// Removes the handler result without knowing its type.
    pub fn take_boxed_result(&mut self) -> Option<Box<dyn Payload>> {
        self.result.take()
    }

    /// Returns the owning pipeline's name.
    #[must_use]
    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    /// Records the owning pipeline.
    pub fn set_pipeline_name(&mut self, name: impl Into<String>) {
        self.pipeline_name = Some(name.into());
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("content_type", &self.content_type)
            .field("status", &self.status)
            .field("failure", &self.failure)
            .field("execution_duration", &self.execution_duration)
            .field("items", &self.items.keys().collect::<Vec<_>>())
            .field("pipeline_name", &self.pipeline_name)
            .finish_non_exhaustive()
    }
}
