//! Event pipeline and its builder.

use super::{EventHandlerExecutorMiddleware, EventHandlerLocatorMiddleware, EventHandlerResolverMiddleware};
use crate::cancellation::CancellationToken;
use crate::context::MessageContext;
use crate::core::{MessageKind, MessageKinds, Payload};
use crate::errors::PipelineError;
use crate::handlers::{HandlerLocator, HandlerModule};
use crate::middleware::{ids, Middleware, MiddlewareChain};
use crate::options::EventPipelineOptions;
use crate::repository::{MessageRepository, NoOpMessageRepository, RepositoryMiddleware};
use crate::resolver::{NullResolver, Resolver};
use std::sync::Arc;
use tracing::debug;

/// Name of the event chain.
pub const EVENT_PIPELINE: &str = "events";

/// Fans each event out to all of its handlers.
#[derive(Debug)]
pub struct EventPipeline {
    chain: MiddlewareChain,
}

impl Default for EventPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPipeline {
    /// Creates a pipeline with an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: MiddlewareChain::new(EVENT_PIPELINE, MessageKinds::EVENT),
        }
    }

    /// Starts configuring a pipeline.
    #[must_use]
    pub fn builder() -> EventPipelineBuilder {
        EventPipelineBuilder::new()
    }

    /// Returns the chain.
    #[must_use]
    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Returns the chain for editing.
    pub fn chain_mut(&mut self) -> &mut MiddlewareChain {
        &mut self.chain
    }

    /// Wraps the event in a context and publishes it to every handler.
    ///
    /// # Errors
    ///
    /// Returns `Processing` when a handler failed and throw-on-fail is on.
    pub fn publish<E: Payload>(&self, event: E) -> Result<MessageContext, PipelineError> {
        let mut ctx = MessageContext::for_message(MessageKind::Event, event);
        self.process(&mut ctx)?;
        Ok(ctx)
    }

    /// Async variant of [`publish`](Self::publish).
    ///
    /// # Errors
    ///
    /// As [`publish`](Self::publish), plus `Cancelled` once the token fires.
    pub async fn publish_async<E: Payload>(
        &self,
        event: E,
        token: &CancellationToken,
    ) -> Result<MessageContext, PipelineError> {
        let mut ctx = MessageContext::for_message(MessageKind::Event, event);
        self.process_async(&mut ctx, token).await?;
        Ok(ctx)
    }

    /// Publishes an existing context, which may carry pre-seeded handlers.
    ///
    /// # Errors
    ///
    /// See [`publish`](Self::publish).
    pub fn process(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        self.chain.run(ctx)
    }

    /// Async variant of [`process`](Self::process).
    ///
    /// # Errors
    ///
    /// See [`publish_async`](Self::publish_async).
    pub async fn process_async(
        &self,
        ctx: &mut MessageContext,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.chain.run_async(ctx, token).await
    }

    /// Points the repository middleware at `repository`.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareNotFound` if the chain has no repository step.
    pub fn use_repository(&mut self, repository: Arc<dyn MessageRepository>) -> Result<&mut Self, PipelineError> {
        self.chain
            .require_middleware_mut::<RepositoryMiddleware>(ids::REPOSITORY)?
            .set_repository(repository);
        Ok(self)
    }

    /// Points the resolver and executor middlewares at `resolver`.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareNotFound` if the chain has no resolver step.
    pub fn use_resolver(&mut self, resolver: Arc<dyn Resolver>) -> Result<&mut Self, PipelineError> {
        self.chain
            .require_middleware_mut::<EventHandlerResolverMiddleware>(ids::HANDLER_RESOLVER)?
            .set_resolver(Arc::clone(&resolver));
        if let Some(executor) = self
            .chain
            .get_middleware_mut::<EventHandlerExecutorMiddleware>(ids::HANDLER_EXECUTOR)
        {
            executor.set_resolver(resolver);
        }
        Ok(self)
    }
}

/// Assembles an [`EventPipeline`] from options.
#[must_use]
pub struct EventPipelineBuilder {
    resolver: Arc<dyn Resolver>,
    modules: Vec<HandlerModule>,
    locator: Option<Arc<HandlerLocator>>,
    repository: Arc<dyn MessageRepository>,
    options: EventPipelineOptions,
}

impl Default for EventPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPipelineBuilder {
    /// Creates a builder with default options and no modules.
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(NullResolver),
            modules: Vec::new(),
            locator: None,
            repository: Arc::new(NoOpMessageRepository),
            options: EventPipelineOptions::default(),
        }
    }

    /// Sets the resolver handler instances come from.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Adds a module to scan.
    pub fn with_module(mut self, module: HandlerModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Adds several modules to scan.
    pub fn with_modules(mut self, modules: impl IntoIterator<Item = HandlerModule>) -> Self {
        self.modules.extend(modules);
        self
    }

    /// Reuses an existing locator instead of scanning the modules.
    pub fn with_locator(mut self, locator: Arc<HandlerLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Sets the repository records are written to.
    pub fn with_repository(mut self, repository: Arc<dyn MessageRepository>) -> Self {
        self.repository = repository;
        self
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: EventPipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the canonical chain for the configured options.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when neither a locator nor a module was given.
    pub fn default_pipeline(self) -> Result<EventPipeline, PipelineError> {
        let locator = match self.locator {
            Some(locator) => locator,
            None => Arc::new(HandlerLocator::new(self.modules, self.options.search_method)?),
        };
        let executor = EventHandlerExecutorMiddleware::new(Arc::clone(&self.resolver))
            .with_resolve_parameters(self.options.resolve_parameters)
            .with_measure_duration(self.options.measure_duration);

        let mut middlewares: Vec<Box<dyn Middleware>> = vec![
            Box::new(EventHandlerLocatorMiddleware::new(locator)),
            Box::new(EventHandlerResolverMiddleware::new(self.resolver)),
            Box::new(executor),
        ];
        middlewares.extend(self.options.tail(self.repository));

        let mut pipeline = EventPipeline::new();
        pipeline.chain.append_middlewares(middlewares)?;
        debug!(chain = ?pipeline.chain.middleware_ids(), "Event pipeline assembled");
        Ok(pipeline)
    }

    /// Builds a pipeline with an empty chain for manual assembly.
    pub fn empty(self) -> EventPipeline {
        EventPipeline::new()
    }
}
