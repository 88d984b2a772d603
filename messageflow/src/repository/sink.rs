//! The repository trait and the built-in sinks.

use super::MessageRecord;
use crate::cancellation::CancellationToken;
use crate::core::ProcessingStatus;
use crate::errors::RepositoryError;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Destination for message records.
///
/// Implementations decide the storage format. Writes honour the token where
/// the backing store supports cancellation.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Writes one record.
    async fn add(&self, record: MessageRecord, token: &CancellationToken) -> Result<(), RepositoryError>;
}

/// Discards every record.
///
/// The default when no repository is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMessageRepository;

#[async_trait]
impl MessageRepository for NoOpMessageRepository {
    async fn add(&self, _record: MessageRecord, _token: &CancellationToken) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    records: RwLock<Vec<MessageRecord>>,
}

impl InMemoryMessageRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored record.
    #[must_use]
    pub fn records(&self) -> Vec<MessageRecord> {
        self.records.read().clone()
    }

    /// Returns the records with the given status.
    #[must_use]
    pub fn with_status(&self, status: ProcessingStatus) -> Vec<MessageRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drops every stored record.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn add(&self, record: MessageRecord, token: &CancellationToken) -> Result<(), RepositoryError> {
        if let Some(reason) = token.reason() {
            return Err(RepositoryError::new(format!("write cancelled: {reason}")));
        }
        self.records.write().push(record);
        Ok(())
    }
}

/// Emits every record as a tracing event.
#[derive(Debug, Clone)]
pub struct LoggingMessageRepository {
    level: Level,
}

impl Default for LoggingMessageRepository {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingMessageRepository {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_record(&self, record: &MessageRecord) {
        let error = record.error.as_ref().map(|e| e.message.as_str());
        if record.status == ProcessingStatus::Failed {
            warn!(
                message_id = %record.id,
                content_type = %record.content_type,
                status = %record.status,
                duration_ms = ?record.execution_duration_ms,
                error = ?error,
                "Message record"
            );
        } else if self.level == Level::DEBUG {
            debug!(
                message_id = %record.id,
                content_type = %record.content_type,
                status = %record.status,
                duration_ms = ?record.execution_duration_ms,
                "Message record"
            );
        } else {
            info!(
                message_id = %record.id,
                content_type = %record.content_type,
                status = %record.status,
                duration_ms = ?record.execution_duration_ms,
                "Message record"
            );
        }
    }
}

#[async_trait]
impl MessageRepository for LoggingMessageRepository {
    async fn add(&self, record: MessageRecord, _token: &CancellationToken) -> Result<(), RepositoryError> {
        self.log_record(&record);
        Ok(())
    }
}
