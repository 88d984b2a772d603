//! Locator, resolver and executor middlewares for fan-out messages.

use crate::cancellation::CancellationToken;
use crate::context::{keys, Failure, MessageContext};
use crate::core::ProcessingStatus;
use crate::errors::PipelineError;
use crate::handlers::{
    record_duration, resolve_instance, run_async, run_sync, Dependencies, HandlerInstance,
    HandlerLocator, HandlerMethod,
};
use crate::middleware::{ids, Middleware};
use crate::resolver::Resolver;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type Methods = Vec<Arc<HandlerMethod>>;
type Instances = Vec<Option<HandlerInstance>>;

/// Adds every handler of the event to [`keys::HANDLER_METHODS`].
///
/// Methods seeded by earlier middlewares are kept; located ones are
/// appended. An event without handlers is not an error.
#[derive(Debug, Clone)]
pub struct EventHandlerLocatorMiddleware {
    locator: Arc<HandlerLocator>,
}

impl EventHandlerLocatorMiddleware {
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

impl Middleware for EventHandlerLocatorMiddleware {
    fn id(&self) -> &str {
        ids::HANDLER_LOCATOR
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        if ctx.is_rejected() {
            return Ok(());
        }

        let found = self.locator.find_event_handlers(&ctx.content_key());
        let mut methods = ctx.take_item::<Methods>(keys::HANDLER_METHODS).unwrap_or_default();
        debug!(
            message_id = %ctx.id(),
            located = found.len(),
            seeded = methods.len(),
            "Event handlers located"
        );
        methods.extend(found);
        ctx.set_item(keys::HANDLER_METHODS, methods);
        Ok(())
    }
}

/// Resolves an instance per located method into [`keys::HANDLER_OBJECTS`].
///
/// The list is index-aligned with the methods. Self-handling methods and
/// unresolvable handlers get `None`; pre-seeded instances are kept.
#[derive(Clone)]
pub struct EventHandlerResolverMiddleware {
    resolver: Arc<dyn Resolver>,
}

impl EventHandlerResolverMiddleware {
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

impl Middleware for EventHandlerResolverMiddleware {
    fn id(&self) -> &str {
        ids::HANDLER_RESOLVER
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        if ctx.is_rejected() {
            return Ok(());
        }

        let methods: Methods = ctx.item_or(keys::HANDLER_METHODS, Vec::new());
        let mut instances = ctx.take_item::<Instances>(keys::HANDLER_OBJECTS).unwrap_or_default();
        if instances.len() < methods.len() {
            instances.resize_with(methods.len(), || None);
        }

        for (method, slot) in methods.iter().zip(instances.iter_mut()) {
            if slot.is_some() || method.is_self_handling() {
                continue;
            }
            *slot = resolve_instance(&self.resolver, method.class());
            if slot.is_none() {
                warn!(
                    message_id = %ctx.id(),
                    handler = %method.qualified_name(),
                    "Event handler could not be resolved"
                );
            }
        }

        ctx.set_item(keys::HANDLER_OBJECTS, instances);
        Ok(())
    }

    fn post_handle(&self, ctx: &mut MessageContext) {
        drop(ctx.take_item::<Instances>(keys::HANDLER_OBJECTS));
    }
}

impl std::fmt::Debug for EventHandlerResolverMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlerResolverMiddleware").finish_non_exhaustive()
    }
}

/// Invokes every located handler in order.
///
/// Unresolved handlers are skipped. Errors are collected into
/// [`Failure::Aggregate`] and the status is set to `Completed` once all
/// handlers were attempted, whatever their outcome.
#[derive(Debug, Clone)]
pub struct EventHandlerExecutorMiddleware {
    deps: Dependencies,
    measure_duration: bool,
}

impl EventHandlerExecutorMiddleware {
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

    fn prepare(ctx: &mut MessageContext) -> Option<(Methods, Instances)> {
        if ctx.is_terminal() {
            return None;
        }
        let methods: Methods = ctx.item_or(keys::HANDLER_METHODS, Vec::new());
        let mut instances = ctx.take_item::<Instances>(keys::HANDLER_OBJECTS).unwrap_or_default();
        if instances.len() < methods.len() {
            instances.resize_with(methods.len(), || None);
        }
        Some((methods, instances))
    }

    fn runnable(ctx: &MessageContext, method: &HandlerMethod, instance: Option<&HandlerInstance>) -> bool {
        if instance.is_none() && !method.is_self_handling() {
            warn!(
                message_id = %ctx.id(),
                handler = %method.qualified_name(),
                "Skipping unresolved event handler"
            );
            return false;
        }
        true
    }

    fn collect(ctx: &MessageContext, method: &HandlerMethod, outcome: anyhow::Result<()>, errors: &mut Vec<anyhow::Error>) {
        match outcome {
            Ok(()) => debug!(message_id = %ctx.id(), handler = %method.qualified_name(), "Event handler completed"),
            Err(e) => {
                warn!(message_id = %ctx.id(), handler = %method.qualified_name(), error = %e, "Event handler failed");
                errors.push(e);
            }
        }
    }

    fn finish(
        &self,
        ctx: &mut MessageContext,
        elapsed: Duration,
        errors: Vec<anyhow::Error>,
    ) -> Result<(), PipelineError> {
        record_duration(ctx, self.measure_duration, elapsed);
        if !errors.is_empty() {
            ctx.set_failure(Failure::aggregate(errors));
        }
        ctx.set_status(ProcessingStatus::Completed)?;
        Ok(())
    }
}

#[async_trait]
impl Middleware for EventHandlerExecutorMiddleware {
    fn id(&self) -> &str {
        ids::HANDLER_EXECUTOR
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        let Some((methods, mut instances)) = Self::prepare(ctx) else {
            return Ok(());
        };

        let started = Instant::now();
        let mut errors = Vec::new();
        for (method, slot) in methods.iter().zip(instances.iter_mut()) {
            if !Self::runnable(ctx, method, slot.as_ref()) {
                continue;
            }
            let mut instance = slot.take();
            let outcome = run_sync(method, instance.as_mut(), ctx.content_mut(), &self.deps);
            drop(instance);
            Self::collect(ctx, method, outcome.map(drop), &mut errors);
        }

        self.finish(ctx, started.elapsed(), errors)
    }

    async fn handle_async(
        &self,
        ctx: &mut MessageContext,
        _token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let Some((methods, mut instances)) = Self::prepare(ctx) else {
            return Ok(());
        };

        let started = Instant::now();
        let mut errors = Vec::new();
        for (method, slot) in methods.iter().zip(instances.iter_mut()) {
            if !Self::runnable(ctx, method, slot.as_ref()) {
                continue;
            }
            let mut instance = slot.take();
            let outcome = run_async(method, instance.as_mut(), ctx.content_mut(), &self.deps).await;
            drop(instance);
            Self::collect(ctx, method, outcome.map(drop), &mut errors);
        }

        self.finish(ctx, started.elapsed(), errors)
    }
}
