//! Mock middlewares for testing chains.

use crate::cancellation::CancellationToken;
use crate::context::MessageContext;
use crate::errors::PipelineError;
use crate::middleware::Middleware;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Shared log of middleware visits.
pub type Trail = Arc<Mutex<Vec<String>>>;

/// A middleware that records its visits into a shared trail.
///
/// `handle` pushes the id, `post_handle` pushes `"{id}:post"`.
#[derive(Debug, Clone)]
pub struct RecordingMiddleware {
    id: String,
    trail: Trail,
}

impl RecordingMiddleware {
    /// Creates a recorder writing to `trail`.
    #[must_use]
    pub fn new(id: impl Into<String>, trail: Trail) -> Self {
        Self { id: id.into(), trail }
    }

    /// Creates a boxed recorder.
    #[must_use]
    pub fn boxed(id: impl Into<String>, trail: &Trail) -> Box<dyn Middleware> {
        Box::new(Self::new(id, Arc::clone(trail)))
    }
}

impl Middleware for RecordingMiddleware {
    fn id(&self) -> &str {
        &self.id
    }

    fn handle(&self, _ctx: &mut MessageContext) -> Result<(), PipelineError> {
        self.trail.lock().push(self.id.clone());
        Ok(())
    }

    fn post_handle(&self, _ctx: &mut MessageContext) {
        self.trail.lock().push(format!("{}:post", self.id));
    }
}

/// A middleware that always fails with `PipelineError::Middleware`.
#[derive(Debug, Clone)]
pub struct FailingMiddleware {
    id: String,
    message: String,
    calls: Arc<Mutex<usize>>,
}

impl FailingMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns how many times it ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

impl Middleware for FailingMiddleware {
    fn id(&self) -> &str {
        &self.id
    }

    fn handle(&self, _ctx: &mut MessageContext) -> Result<(), PipelineError> {
        *self.calls.lock() += 1;
        Err(PipelineError::Middleware(self.message.clone()))
    }
}

/// A middleware whose async path sleeps, for cancellation tests.
#[derive(Debug, Clone)]
pub struct SlowMiddleware {
    id: String,
    delay: Duration,
}

impl SlowMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(id: impl Into<String>, delay: Duration) -> Self {
        Self { id: id.into(), delay }
    }
}

#[async_trait]
impl Middleware for SlowMiddleware {
    fn id(&self) -> &str {
        &self.id
    }

    fn handle(&self, _ctx: &mut MessageContext) -> Result<(), PipelineError> {
        std::thread::sleep(self.delay);
        Ok(())
    }

    async fn handle_async(
        &self,
        _ctx: &mut MessageContext,
        _token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MessageKind, MessageKinds};
    use crate::middleware::MiddlewareChain;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_recording_and_failing_middlewares() {
        let trail = Trail::default();
        let failing = FailingMiddleware::new("boom", "exploded");
        let mut chain = MiddlewareChain::new("test", MessageKinds::ALL);
        let middlewares: Vec<Box<dyn Middleware>> = vec![
            RecordingMiddleware::boxed("first", &trail),
            Box::new(failing.clone()),
            RecordingMiddleware::boxed("never", &trail),
        ];
        chain.append_middlewares(middlewares).unwrap();

        let mut ctx = MessageContext::for_message(MessageKind::Event, 0_u8);
        let err = chain.run(&mut ctx).unwrap_err();

        assert_eq!(err.to_string(), "Middleware error: exploded");
        assert_eq!(failing.call_count(), 1);
        assert_eq!(*trail.lock(), vec!["first", "first:post", "never:post"]);
    }
}
