//! Command pipeline and its builder.

use crate::cancellation::CancellationToken;
use crate::context::MessageContext;
use crate::core::{MessageKind, MessageKinds, Payload};
use crate::errors::PipelineError;
use crate::handlers::{
    HandlerExecutorMiddleware, HandlerLocator, HandlerLocatorMiddleware, HandlerModule,
    HandlerResolverMiddleware,
};
use crate::middleware::{ids, Middleware, MiddlewareChain};
use crate::options::CommandPipelineOptions;
use crate::repository::{MessageRepository, NoOpMessageRepository, RepositoryMiddleware};
use crate::resolver::{NullResolver, Resolver};
use crate::validation::{Validate, ValidationMiddleware};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Name of the command chain.
pub const COMMAND_PIPELINE: &str = "commands";

/// Routes each command to its single handler.
#[derive(Debug)]
pub struct CommandPipeline {
    chain: MiddlewareChain,
}

impl Default for CommandPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandPipeline {
    /// Creates a pipeline with an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: MiddlewareChain::new(COMMAND_PIPELINE, MessageKinds::COMMAND),
        }
    }

    /// Starts configuring a pipeline.
    #[must_use]
    pub fn builder() -> CommandPipelineBuilder {
        CommandPipelineBuilder::new()
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

    /// Wraps the command in a context and drives it through the chain.
    ///
    /// # Errors
    ///
    /// Returns `HandlerNotFound` when no handler exists, `Validation` for
    /// broken rules (if configured to throw) and `Processing` when the
    /// handler failed and throw-on-fail is enabled.
    pub fn handle<C: Payload>(&self, command: C) -> Result<MessageContext, PipelineError> {
        let mut ctx = MessageContext::for_message(MessageKind::Command, command);
        self.process(&mut ctx)?;
        Ok(ctx)
    }

    /// Async variant of [`handle`](Self::handle).
    ///
    /// # Errors
    ///
    /// As [`handle`](Self::handle), plus `Cancelled` once the token fires.
    pub async fn handle_async<C: Payload>(
        &self,
        command: C,
        token: &CancellationToken,
    ) -> Result<MessageContext, PipelineError> {
        let mut ctx = MessageContext::for_message(MessageKind::Command, command);
        self.process_async(&mut ctx, token).await?;
        Ok(ctx)
    }

    /// Drives an existing context through the chain.
    ///
    /// # Errors
    ///
    /// See [`handle`](Self::handle).
    pub fn process(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        self.chain.run(ctx)
    }

    /// Async variant of [`process`](Self::process).
    ///
    /// # Errors
    ///
    /// See [`handle_async`](Self::handle_async).
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
            .require_middleware_mut::<HandlerResolverMiddleware>(ids::HANDLER_RESOLVER)?
            .set_resolver(Arc::clone(&resolver));
        if let Some(executor) = self
            .chain
            .get_middleware_mut::<HandlerExecutorMiddleware>(ids::HANDLER_EXECUTOR)
        {
            executor.set_resolver(resolver);
        }
        Ok(self)
    }

    /// Registers `C`'s rules with the validation middleware.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareNotFound` if validation is not enabled.
    pub fn use_validator<C: Validate + Any>(&mut self) -> Result<&mut Self, PipelineError> {
        self.chain
            .require_middleware_mut::<ValidationMiddleware>(ids::VALIDATION)?
            .register::<C>();
        Ok(self)
    }
}

/// Assembles a [`CommandPipeline`] from options.
#[must_use]
pub struct CommandPipelineBuilder {
    resolver: Arc<dyn Resolver>,
    modules: Vec<HandlerModule>,
    locator: Option<Arc<HandlerLocator>>,
    repository: Arc<dyn MessageRepository>,
    validators: Vec<fn(&mut ValidationMiddleware)>,
    options: CommandPipelineOptions,
}

impl Default for CommandPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandPipelineBuilder {
    /// Creates a builder with default options and no modules.
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(NullResolver),
            modules: Vec::new(),
            locator: None,
            repository: Arc::new(NoOpMessageRepository),
            validators: Vec::new(),
            options: CommandPipelineOptions::default(),
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

    /// Validates `C` when validation is enabled.
    pub fn with_validator<C: Validate + Any>(mut self) -> Self {
        self.validators.push(ValidationMiddleware::register::<C>);
        self
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: CommandPipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the canonical chain for the configured options.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when neither a locator nor a module was given.
    pub fn default_pipeline(self) -> Result<CommandPipeline, PipelineError> {
        let locator = match self.locator {
            Some(locator) => locator,
            None => Arc::new(HandlerLocator::new(self.modules, self.options.search_method)?),
        };

        let mut middlewares: Vec<Box<dyn Middleware>> = Vec::new();
        if self.options.use_validation {
            let mut validation = ValidationMiddleware::new(self.options.throw_on_validation_fail);
            for register in &self.validators {
                register(&mut validation);
            }
            middlewares.push(Box::new(validation));
        }
        middlewares.push(Box::new(HandlerLocatorMiddleware::new(locator)));
        middlewares.push(Box::new(HandlerResolverMiddleware::new(Arc::clone(&self.resolver))));
        middlewares.push(Box::new(self.options.executor(self.resolver)));
        middlewares.extend(self.options.tail(self.repository));

        let mut pipeline = CommandPipeline::new();
        pipeline.chain.append_middlewares(middlewares)?;
        debug!(chain = ?pipeline.chain.middleware_ids(), "Command pipeline assembled");
        Ok(pipeline)
    }

    /// Builds a pipeline with an empty chain for manual assembly.
    pub fn empty(self) -> CommandPipeline {
        CommandPipeline::new()
    }
}
