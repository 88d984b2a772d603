//! Fixtures for building contexts and repositories in tests.

use crate::cancellation::CancellationToken;
use crate::context::MessageContext;
use crate::core::{MessageKind, Payload, ProcessingStatus};
use crate::errors::RepositoryError;
use crate::repository::{MessageRecord, MessageRepository};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Builds message contexts in a chosen state.
#[derive(Debug)]
pub struct TestMessage {
    kind: MessageKind,
    status: ProcessingStatus,
    data: BTreeMap<String, serde_json::Value>,
    content_type: Option<String>,
}

impl TestMessage {
    /// Starts a message of the given kind.
    #[must_use]
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            status: ProcessingStatus::NotInitialized,
            data: BTreeMap::new(),
            content_type: None,
        }
    }

    /// Starts a command.
    #[must_use]
    pub fn command() -> Self {
        Self::new(MessageKind::Command)
    }

    /// Starts an event.
    #[must_use]
    pub fn event() -> Self {
        Self::new(MessageKind::Event)
    }

    /// Moves the context to `status` through valid transitions.
    #[must_use]
    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds additional data.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Overrides the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Builds the context around `content`.
    #[must_use]
    pub fn build<T: Payload>(self, content: T) -> MessageContext {
        let mut ctx = MessageContext::for_message(self.kind, content);
        if let Some(content_type) = self.content_type {
            ctx = ctx.with_content_type(content_type);
        }
        for (key, value) in self.data {
            ctx.insert_data(key, value);
        }
        if self.status != ProcessingStatus::NotInitialized {
            let _ = ctx.set_status(ProcessingStatus::Processing);
            let _ = ctx.set_status(self.status);
        }
        ctx
    }
}

/// A repository that fails a set number of writes before accepting.
#[derive(Debug, Default)]
pub struct FlakyRepository {
    failures_left: Mutex<usize>,
    records: Mutex<Vec<MessageRecord>>,
}

impl FlakyRepository {
    /// Creates a repository that fails the first `failures` writes.
    #[must_use]
    pub fn new(failures: usize) -> Self {
        Self {
            failures_left: Mutex::new(failures),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Returns the accepted records.
    #[must_use]
    pub fn records(&self) -> Vec<MessageRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl MessageRepository for FlakyRepository {
    async fn add(&self, record: MessageRecord, _token: &CancellationToken) -> Result<(), RepositoryError> {
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(RepositoryError::new("storage unavailable"));
            }
        }
        self.records.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_in_requested_state() {
        let ctx = TestMessage::event()
            .with_status(ProcessingStatus::Completed)
            .with_data("tenant", serde_json::json!("acme"))
            .with_content_type("OrderPlaced")
            .build(3_u32);

        assert_eq!(ctx.kind(), MessageKind::Event);
        assert_eq!(ctx.status(), ProcessingStatus::Completed);
        assert_eq!(ctx.content_type(), "OrderPlaced");
        assert_eq!(ctx.data()["tenant"], "acme");
    }

    #[tokio::test]
    async fn test_flaky_repository() {
        let repository = FlakyRepository::new(1);
        let record = MessageRecord::from_context(&TestMessage::command().build(1_u8));
        let token = CancellationToken::new();

        assert!(repository.add(record.clone(), &token).await.is_err());
        assert!(repository.add(record, &token).await.is_ok());
        assert_eq!(repository.records().len(), 1);
    }
}
