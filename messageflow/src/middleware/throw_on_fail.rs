//! Converts captured handler failures into a returned error.

use super::{ids, Middleware};
use crate::context::{Failure, MessageContext};
use crate::core::ProcessingStatus;
use crate::errors::{PipelineError, ProcessingError};
use std::sync::Arc;
use tracing::warn;

/// Terminal middleware raising [`ProcessingError`] for failed messages.
///
/// A message counts as failed when its status is `Failed`, or when it is
/// `Completed` with a captured failure (an event whose handlers raised).
#[derive(Debug, Clone)]
pub struct ThrowOnFailMiddleware {
    preserve_error_source: bool,
}

impl ThrowOnFailMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(preserve_error_source: bool) -> Self {
        Self {
            preserve_error_source,
        }
    }

    /// Returns true if the original error is kept as the source.
    #[must_use]
    pub fn preserves_error_source(&self) -> bool {
        self.preserve_error_source
    }
}

impl Default for ThrowOnFailMiddleware {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Builds the error describing the failure captured on `ctx`.
pub(crate) fn processing_error(ctx: &MessageContext, preserve_source: bool) -> ProcessingError {
    let causes = ctx.failure().map(Failure::messages).unwrap_or_default();
    let error = ProcessingError::new(ctx.content_type(), ctx.status(), causes);
    match ctx.failure().and_then(Failure::primary) {
        Some(primary) if preserve_source => error.with_source(Arc::clone(primary)),
        _ => error,
    }
}

impl Middleware for ThrowOnFailMiddleware {
    fn id(&self) -> &str {
        ids::THROW_ON_FAIL
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        let has_failure = ctx.failure().is_some_and(|f| !f.is_empty());
        let failed = match ctx.status() {
            ProcessingStatus::Failed => true,
            ProcessingStatus::Completed => has_failure,
            _ => false,
        };
        if !failed {
            return Ok(());
        }

        let error = processing_error(ctx, self.preserve_error_source);
        warn!(
            message_id = %ctx.id(),
            content_type = ctx.content_type(),
            failures = error.failure_count(),
            "Raising processing error"
        );
        Err(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MessageKind;
    use std::error::Error as _;

    fn context(status: ProcessingStatus, failure: Option<Failure>) -> MessageContext {
        let mut ctx = MessageContext::for_message(MessageKind::Command, 1_u32);
        ctx.set_status(ProcessingStatus::Processing).unwrap();
        ctx.set_status(status).unwrap();
        if let Some(failure) = failure {
            ctx.set_failure(failure);
        }
        ctx
    }

    #[test]
    fn test_completed_passes() {
        let mut ctx = context(ProcessingStatus::Completed, None);
        assert!(ThrowOnFailMiddleware::default().handle(&mut ctx).is_ok());
    }

    #[test]
    fn test_rejected_passes() {
        let mut ctx = context(ProcessingStatus::Rejected, None);
        assert!(ThrowOnFailMiddleware::default().handle(&mut ctx).is_ok());
    }

    #[test]
    fn test_failed_raises_with_source() {
        let failure = Failure::single(anyhow::anyhow!("db down"));
        let mut ctx = context(ProcessingStatus::Failed, Some(failure));

        let err = ThrowOnFailMiddleware::new(true).handle(&mut ctx).unwrap_err();
        let PipelineError::Processing(processing) = err else {
            panic!("expected processing error");
        };
        assert_eq!(processing.causes, vec!["db down"]);
        assert_eq!(processing.source().unwrap().to_string(), "db down");
    }

    #[test]
    fn test_failed_without_source() {
        let failure = Failure::single(anyhow::anyhow!("db down"));
        let mut ctx = context(ProcessingStatus::Failed, Some(failure));

        let err = ThrowOnFailMiddleware::new(false).handle(&mut ctx).unwrap_err();
        let PipelineError::Processing(processing) = err else {
            panic!("expected processing error");
        };
        assert!(processing.source().is_none());
        assert!(processing.to_string().contains("db down"));
    }

    #[test]
    fn test_completed_event_with_failures_raises() {
        let failure = Failure::aggregate(vec![anyhow::anyhow!("a"), anyhow::anyhow!("b")]);
        let mut ctx = context(ProcessingStatus::Completed, Some(failure));

        let err = ThrowOnFailMiddleware::default().handle(&mut ctx).unwrap_err();
        assert!(matches!(err, PipelineError::Processing(ref p) if p.failure_count() == 2));
    }
}
