//! Locator, resolver and executor middlewares for single-handler messages.

use super::{resolve_instance, run_async, run_sync, Dependencies, HandlerInstance, HandlerLocator, HandlerMethod, HandlerOutput};
use crate::cancellation::CancellationToken;
use crate::context::{keys, Failure, MessageContext};
use crate::core::ProcessingStatus;
use crate::errors::PipelineError;
use crate::middleware::{ids, Middleware};
use crate::resolver::Resolver;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Marks the context rejected and builds the not-found error.
pub(crate) fn reject_not_found(ctx: &mut MessageContext) -> PipelineError {
    if let Err(e) = ctx.set_status(ProcessingStatus::Rejected) {
        return e.into();
    }
    warn!(message_id = %ctx.id(), content_type = ctx.content_type(), "Handler not found");
    PipelineError::handler_not_found(ctx.content_type())
}

/// Finds the single handler of a command.
///
/// A method already present under [`keys::HANDLER_METHOD`] is kept.
#[derive(Debug, Clone)]
pub struct HandlerLocatorMiddleware {
    locator: Arc<HandlerLocator>,
}

impl HandlerLocatorMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(locator: Arc<HandlerLocator>) -> Self {
        Self { locator }
    }

    /// Returns the locator.
    #[must_use]
    pub fn locator(&self) -> &Arc<HandlerLocator> {
        &self.locator
    }
}

impl Middleware for HandlerLocatorMiddleware {
    fn id(&self) -> &str {
        ids::HANDLER_LOCATOR
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        if ctx.is_rejected() || ctx.contains_item(keys::HANDLER_METHOD) {
            return Ok(());
        }

        match self.locator.find_command_handler(&ctx.content_key()) {
            Some(method) => {
                debug!(message_id = %ctx.id(), handler = %method.qualified_name(), "Handler located");
                ctx.set_item(keys::HANDLER_METHOD, method);
                Ok(())
            }
            None => Err(reject_not_found(ctx)),
        }
    }
}

/// Produces the instance the located method is invoked on.
///
/// Self-handling methods need none. A pre-seeded instance is kept. Leftover
/// instances are released in `post_handle`.
#[derive(Clone)]
pub struct HandlerResolverMiddleware {
    resolver: Arc<dyn Resolver>,
}

impl HandlerResolverMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// Replaces the resolver.
    pub fn set_resolver(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolver = resolver;
    }
}

impl Middleware for HandlerResolverMiddleware {
    fn id(&self) -> &str {
        ids::HANDLER_RESOLVER
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        if ctx.is_rejected() || ctx.contains_item(keys::HANDLER_OBJECT) {
            return Ok(());
        }

        let method = Arc::clone(ctx.item::<Arc<HandlerMethod>>(keys::HANDLER_METHOD)?);
        if method.is_self_handling() {
            return Ok(());
        }

        match resolve_instance(&self.resolver, method.class()) {
            Some(instance) => {
                ctx.set_item(keys::HANDLER_OBJECT, instance);
                Ok(())
            }
            None => Err(reject_not_found(ctx)),
        }
    }

    fn post_handle(&self, ctx: &mut MessageContext) {
        if ctx.take_item::<HandlerInstance>(keys::HANDLER_OBJECT).is_some() {
            trace!(message_id = %ctx.id(), "Released unused handler instance");
        }
    }
}

impl std::fmt::Debug for HandlerResolverMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerResolverMiddleware").finish_non_exhaustive()
    }
}

/// Invokes the located method on the resolved instance.
///
/// Success completes the message, an error or panic fails it. Either way
/// the instance is released right after the call.
#[derive(Debug, Clone)]
pub struct HandlerExecutorMiddleware {
    deps: Dependencies,
    measure_duration: bool,
}

impl HandlerExecutorMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            deps: Dependencies::new(resolver),
            measure_duration: true,
        }
    }

    /// Enables or disables parameter resolution for handlers.
    #[must_use]
    pub fn with_resolve_parameters(mut self, enabled: bool) -> Self {
        self.deps = self.deps.with_enabled(enabled);
        self
    }

    /// Enables or disables execution time measurement.
    #[must_use]
    pub fn with_measure_duration(mut self, enabled: bool) -> Self {
        self.measure_duration = enabled;
        self
    }

    /// Replaces the resolver handlers pull dependencies from.
    pub fn set_resolver(&mut self, resolver: Arc<dyn Resolver>) {
        self.deps = Dependencies::new(resolver).with_enabled(self.deps.is_enabled());
    }

    /// Returns the dependencies passed to handlers.
    #[must_use]
    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    fn prepare(
        ctx: &mut MessageContext,
    ) -> Result<Option<(Arc<HandlerMethod>, Option<HandlerInstance>)>, PipelineError> {
        if ctx.is_terminal() {
            return Ok(None);
        }
        let method = Arc::clone(ctx.item::<Arc<HandlerMethod>>(keys::HANDLER_METHOD)?);
        let instance = ctx.take_item::<HandlerInstance>(keys::HANDLER_OBJECT);
        if instance.is_none() && !method.is_self_handling() {
            return Err(reject_not_found(ctx));
        }
        Ok(Some((method, instance)))
    }

    fn finish(
        &self,
        ctx: &mut MessageContext,
        method: &HandlerMethod,
        elapsed: Duration,
        output: HandlerOutput,
    ) -> Result<(), PipelineError> {
        record_duration(ctx, self.measure_duration, elapsed);
        match output {
            Ok(result) => {
                if let Some(result) = result {
                    ctx.set_result(result);
                }
                ctx.set_status(ProcessingStatus::Completed)?;
                debug!(message_id = %ctx.id(), handler = %method.qualified_name(), ?elapsed, "Handler completed");
            }
            Err(e) => {
                warn!(message_id = %ctx.id(), handler = %method.qualified_name(), error = %e, "Handler failed");
                ctx.set_failure(Failure::single(e));
                ctx.set_status(ProcessingStatus::Failed)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn record_duration(ctx: &mut MessageContext, enabled: bool, elapsed: Duration) {
    if enabled {
        ctx.set_item(keys::EXECUTION_DURATION, elapsed);
        ctx.set_execution_duration(elapsed);
    }
}

#[async_trait]
impl Middleware for HandlerExecutorMiddleware {
    fn id(&self) -> &str {
        ids::HANDLER_EXECUTOR
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        let Some((method, mut instance)) = Self::prepare(ctx)? else {
            return Ok(());
        };

        let started = Instant::now();
        let output = run_sync(&method, instance.as_mut(), ctx.content_mut(), &self.deps);
        let elapsed = started.elapsed();
        drop(instance);

        self.finish(ctx, &method, elapsed, output)
    }

    async fn handle_async(
        &self,
        ctx: &mut MessageContext,
        _token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let Some((method, mut instance)) = Self::prepare(ctx)? else {
            return Ok(());
        };

        let started = Instant::now();
        let output = run_async(&method, instance.as_mut(), ctx.content_mut(), &self.deps).await;
        let elapsed = started.elapsed();
        drop(instance);

        self.finish(ctx, &method, elapsed, output)
    }
}
