//! Middleware chain for ordered message processing.

use crate::cancellation::CancellationToken;
use crate::context::MessageContext;
use crate::core::{MessageKind, MessageKinds, ProcessingStatus};
use crate::errors::PipelineError;
use crate::observability::message_span;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashSet;
use tracing::{debug, trace, Instrument};

/// Upcasting helper so chains can hand out typed middleware references.
pub trait AsAny: Any + Send + Sync {
    /// Borrows as `Any`.
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrows as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A step of a pipeline.
///
/// Returning `Err` from `handle` aborts the remaining middlewares. Handler
/// failures are not reported this way: executors record them on the context.
#[async_trait]
pub trait Middleware: AsAny {
    /// Returns the id, unique within a chain.
    fn id(&self) -> &str;

    /// Processes the context synchronously.
    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError>;

    /// Processes the context asynchronously.
    ///
    /// Defaults to the synchronous path.
    async fn handle_async(
        &self,
        ctx: &mut MessageContext,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let _ = token;
        self.handle(ctx)
    }

    /// Runs after the main pass, even when it failed.
    fn post_handle(&self, _ctx: &mut MessageContext) {}
}

/// An ordered chain of middlewares with unique ids.
///
/// Configuration goes through `&mut self`; once configured, the chain is
/// shared read-only between concurrent runs.
pub struct MiddlewareChain {
    name: String,
    accepts: MessageKinds,
    middlewares: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(name: impl Into<String>, accepts: MessageKinds) -> Self {
        Self {
            name: name.into(),
            accepts,
            middlewares: Vec::new(),
        }
    }

    /// Returns the chain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the accepted message kinds.
    #[must_use]
    pub fn accepts(&self) -> MessageKinds {
        self.accepts
    }

    /// Fails with `UnsupportedKind` if the kind is not accepted.
    pub fn ensure_accepts(&self, kind: MessageKind) -> Result<(), PipelineError> {
        if self.accepts.contains(kind) {
            Ok(())
        } else {
            Err(PipelineError::UnsupportedKind {
                pipeline: self.name.clone(),
                kind,
            })
        }
    }

    /// Returns the number of middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Returns the middleware ids in chain order.
    #[must_use]
    pub fn middleware_ids(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.id()).collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.middlewares.iter().position(|m| m.id() == id)
    }

    fn check_new_id(&self, id: &str) -> Result<(), PipelineError> {
        if id.is_empty() {
            return Err(PipelineError::configuration("middleware id must not be empty"));
        }
        if self.position(id).is_some() {
            return Err(PipelineError::duplicate_middleware_id(id));
        }
        Ok(())
    }

    /// Appends middlewares at the tail, preserving their order.
    ///
    /// Either all are appended or, on an id conflict, none.
    pub fn append_middlewares<I>(&mut self, middlewares: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = Box<dyn Middleware>>,
    {
        let batch: Vec<_> = middlewares.into_iter().collect();
        let mut seen = HashSet::new();
        for middleware in &batch {
            self.check_new_id(middleware.id())?;
            if !seen.insert(middleware.id()) {
                return Err(PipelineError::duplicate_middleware_id(middleware.id()));
            }
        }
        self.middlewares.extend(batch);
        Ok(())
    }

    /// Appends one middleware at the tail.
    pub fn append_middleware(&mut self, middleware: Box<dyn Middleware>) -> Result<(), PipelineError> {
        self.check_new_id(middleware.id())?;
        self.middlewares.push(middleware);
        Ok(())
    }

    /// Inserts before the anchor, or at the head if no anchor is given.
    pub fn insert_middleware_before(
        &mut self,
        middleware: Box<dyn Middleware>,
        before: Option<&str>,
    ) -> Result<(), PipelineError> {
        self.check_new_id(middleware.id())?;
        let index = match before {
            Some(anchor) => self
                .position(anchor)
                .ok_or_else(|| PipelineError::middleware_not_found(anchor))?,
            None => 0,
        };
        self.middlewares.insert(index, middleware);
        Ok(())
    }

    /// Inserts after the anchor, or at the tail if no anchor is given.
    pub fn insert_middleware_after(
        &mut self,
        middleware: Box<dyn Middleware>,
        after: Option<&str>,
    ) -> Result<(), PipelineError> {
        self.check_new_id(middleware.id())?;
        let index = match after {
            Some(anchor) => {
                self.position(anchor)
                    .ok_or_else(|| PipelineError::middleware_not_found(anchor))?
                    + 1
            }
            None => self.middlewares.len(),
        };
        self.middlewares.insert(index, middleware);
        Ok(())
    }

    /// Removes a middleware by id.
    pub fn remove_middleware(&mut self, id: &str) -> Option<Box<dyn Middleware>> {
        self.position(id).map(|index| self.middlewares.remove(index))
    }

    /// Returns a middleware by id.
    #[must_use]
    pub fn get_middleware_by_id(&self, id: &str) -> Option<&dyn Middleware> {
        self.middlewares
            .iter()
            .find(|m| m.id() == id)
            .map(|m| &**m)
    }

    /// Returns a middleware by id as a concrete type.
    pub fn get_middleware_mut<T: Middleware>(&mut self, id: &str) -> Option<&mut T> {
        self.middlewares
            .iter_mut()
            .find(|m| m.id() == id)
            .and_then(|m| (**m).as_any_mut().downcast_mut::<T>())
    }

    /// Like [`get_middleware_mut`](Self::get_middleware_mut) but fails with
    /// `MiddlewareNotFound`.
    pub fn require_middleware_mut<T: Middleware>(&mut self, id: &str) -> Result<&mut T, PipelineError> {
        self.get_middleware_mut::<T>(id)
            .ok_or_else(|| PipelineError::middleware_not_found(id))
    }

    /// Runs every middleware in order, then every post-handle step.
    pub fn process_middlewares(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        let mut outcome = Ok(());
        for middleware in &self.middlewares {
            trace!(pipeline = %self.name, middleware = middleware.id(), "Handling message");
            if let Err(e) = middleware.handle(ctx) {
                debug!(pipeline = %self.name, middleware = middleware.id(), error = %e, "Middleware aborted the chain");
                outcome = Err(e);
                break;
            }
        }
        self.post_handle(ctx);
        outcome
    }

    /// Async variant of [`process_middlewares`](Self::process_middlewares).
    ///
    /// Cancellation is checked before and after each middleware.
    pub async fn process_middlewares_async(
        &self,
        ctx: &mut MessageContext,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let mut outcome = Ok(());
        for middleware in &self.middlewares {
            trace!(pipeline = %self.name, middleware = middleware.id(), "Handling message");
            let step = match token.check() {
                Ok(()) => middleware.handle_async(ctx, token).await,
                Err(e) => Err(e),
            }
            .and_then(|()| token.check());
            if let Err(e) = step {
                debug!(pipeline = %self.name, middleware = middleware.id(), error = %e, "Middleware aborted the chain");
                outcome = Err(e);
                break;
            }
        }
        self.post_handle(ctx);
        outcome
    }

    /// Enters a context into the chain and drives it through.
    ///
    /// The kind must be accepted; the context is stamped with the chain name
    /// and moved to `Processing` before the first middleware runs.
    pub fn run(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        self.enter(ctx)?;
        let span = message_span(&self.name, ctx);
        let _guard = span.enter();
        self.process_middlewares(ctx)
    }

    /// Async variant of [`run`](Self::run).
    pub async fn run_async(
        &self,
        ctx: &mut MessageContext,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.enter(ctx)?;
        let span = message_span(&self.name, ctx);
        self.process_middlewares_async(ctx, token).instrument(span).await
    }

    fn enter(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        self.ensure_accepts(ctx.kind())?;
        ctx.set_pipeline_name(self.name.as_str());
        ctx.set_status(ProcessingStatus::Processing)?;
        Ok(())
    }

    fn post_handle(&self, ctx: &mut MessageContext) {
        for middleware in &self.middlewares {
            middleware.post_handle(ctx);
        }
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("name", &self.name)
            .field("accepts", &self.accepts)
            .field("middlewares", &self.middleware_ids())
            .finish()
    }
}
