//! The middleware that writes message records.

use super::{MessageRecord, MessageRecordFilter, MessageRepository, NoOpMessageRepository};
use crate::cancellation::CancellationToken;
use crate::context::MessageContext;
use crate::errors::{PipelineError, RepositoryError};
use crate::middleware::{ids, Middleware};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{trace, warn};

/// Settings of the [`RepositoryMiddleware`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryOptions {
    /// Whether records are written at all.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Whether write errors abort the chain. Otherwise they are logged.
    #[serde(default = "default_true")]
    pub rethrow: bool,
    /// Which records are written.
    #[serde(default)]
    pub filter: MessageRecordFilter,
}

fn default_true() -> bool {
    true
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            active: default_true(),
            rethrow: default_true(),
            filter: MessageRecordFilter::default(),
        }
    }
}

impl RepositoryOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables writing.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Sets whether write errors propagate.
    #[must_use]
    pub fn with_rethrow(mut self, rethrow: bool) -> Self {
        self.rethrow = rethrow;
        self
    }

    /// Sets the record filter.
    #[must_use]
    pub fn with_filter(mut self, filter: MessageRecordFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Captures the context as a [`MessageRecord`] and writes it.
///
/// The synchronous path blocks the calling thread on the write, so
/// repositories that need a tokio runtime should be used through the async
/// pipeline entry points.
#[derive(Clone)]
pub struct RepositoryMiddleware {
    repository: Arc<dyn MessageRepository>,
    options: RepositoryOptions,
}

impl Default for RepositoryMiddleware {
    fn default() -> Self {
        Self::new(Arc::new(NoOpMessageRepository), RepositoryOptions::default())
    }
}

impl RepositoryMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(repository: Arc<dyn MessageRepository>, options: RepositoryOptions) -> Self {
        Self { repository, options }
    }

    /// Replaces the repository.
    pub fn set_repository(&mut self, repository: Arc<dyn MessageRepository>) {
        self.repository = repository;
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Returns the options for editing.
    pub fn options_mut(&mut self) -> &mut RepositoryOptions {
        &mut self.options
    }

    fn capture(&self, ctx: &MessageContext) -> Option<MessageRecord> {
        if !self.options.active {
            return None;
        }
        let record = MessageRecord::from_context(ctx);
        if self.options.filter.matches(&record) {
            Some(record)
        } else {
            trace!(message_id = %ctx.id(), "Record filtered out");
            None
        }
    }

    fn settle(&self, ctx: &MessageContext, outcome: Result<(), RepositoryError>) -> Result<(), PipelineError> {
        match outcome {
            Ok(()) => {
                trace!(message_id = %ctx.id(), "Record written");
                Ok(())
            }
            Err(e) if self.options.rethrow => Err(e.into()),
            Err(e) => {
                warn!(message_id = %ctx.id(), error = %e, "Repository write failed; continuing");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Middleware for RepositoryMiddleware {
    fn id(&self) -> &str {
        ids::REPOSITORY
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        let Some(record) = self.capture(ctx) else {
            return Ok(());
        };
        let token = CancellationToken::new();
        let outcome = futures::executor::block_on(self.repository.add(record, &token));
        self.settle(ctx, outcome)
    }

    async fn handle_async(
        &self,
        ctx: &mut MessageContext,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let Some(record) = self.capture(ctx) else {
            return Ok(());
        };
        let outcome = self.repository.add(record, token).await;
        self.settle(ctx, outcome)
    }
}

impl std::fmt::Debug for RepositoryMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryMiddleware")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MessageKind, ProcessingStatus};
    use crate::repository::InMemoryMessageRepository;
    use pretty_assertions::assert_eq;

    struct BrokenRepository;

    #[async_trait]
    impl MessageRepository for BrokenRepository {
        async fn add(&self, _record: MessageRecord, _token: &CancellationToken) -> Result<(), RepositoryError> {
            Err(RepositoryError::new("disk full"))
        }
    }

    fn completed() -> MessageContext {
        let mut ctx = MessageContext::for_message(MessageKind::Command, 5_u32);
        ctx.set_status(ProcessingStatus::Completed).unwrap();
        ctx
    }

    #[test]
    fn test_writes_record_on_sync_path() {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let middleware = RepositoryMiddleware::new(repo.clone(), RepositoryOptions::new());
        let mut ctx = completed();

        middleware.handle(&mut ctx).unwrap();

        let records = repo.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, ctx.id());
    }

    #[tokio::test]
    async fn test_writes_record_on_async_path() {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let middleware = RepositoryMiddleware::new(repo.clone(), RepositoryOptions::new());
        let mut ctx = completed();

        middleware.handle_async(&mut ctx, &CancellationToken::new()).await.unwrap();

        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_inactive_and_filtered_records_are_skipped() {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let inactive = RepositoryMiddleware::new(repo.clone(), RepositoryOptions::new().with_active(false));
        let failed_only = RepositoryMiddleware::new(
            repo.clone(),
            RepositoryOptions::new()
                .with_filter(MessageRecordFilter::new().with_statuses([ProcessingStatus::Failed])),
        );
        let mut ctx = completed();

        inactive.handle(&mut ctx).unwrap();
        failed_only.handle(&mut ctx).unwrap();

        assert!(repo.is_empty());
    }

    #[test]
    fn test_write_errors_propagate_when_rethrowing() {
        let middleware = RepositoryMiddleware::new(Arc::new(BrokenRepository), RepositoryOptions::new());
        let err = middleware.handle(&mut completed()).unwrap_err();
        assert!(matches!(err, PipelineError::Repository(_)));
    }

    #[test]
    fn test_write_errors_are_swallowed_without_rethrow() {
        let middleware = RepositoryMiddleware::new(
            Arc::new(BrokenRepository),
            RepositoryOptions::new().with_rethrow(false),
        );
        assert!(middleware.handle(&mut completed()).is_ok());
    }

    #[test]
    fn test_options_defaults_from_empty_config() {
        let options: RepositoryOptions = serde_json::from_str("{}").unwrap();
        assert!(options.active);
        assert!(options.rethrow);
    }
}
