//! Query pipeline, its builder and the raw invocation path.

use super::{QueryArguments, QueryBuilder, QueryRegistry};
use crate::cancellation::CancellationToken;
use crate::context::{keys, MessageContext};
use crate::core::{MessageKind, MessageKinds, Payload, ProcessingStatus};
use crate::errors::PipelineError;
use crate::handlers::{HandlerExecutorMiddleware, HandlerResolverMiddleware};
use crate::middleware::{ids, processing_error, Middleware, MiddlewareChain};
use crate::options::QueryPipelineOptions;
use crate::repository::{MessageRepository, NoOpMessageRepository, RepositoryMiddleware};
use crate::resolver::{NullResolver, Resolver};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Name of the query chain.
pub const QUERY_PIPELINE: &str = "queries";

/// Runs query methods registered in a [`QueryRegistry`].
#[derive(Debug)]
pub struct QueryPipeline {
    chain: MiddlewareChain,
    registry: Arc<QueryRegistry>,
    preserve_error_source: bool,
}

impl QueryPipeline {
    /// Creates a pipeline with an empty chain.
    #[must_use]
    pub fn new(registry: Arc<QueryRegistry>) -> Self {
        Self {
            chain: MiddlewareChain::new(QUERY_PIPELINE, MessageKinds::QUERY),
            registry,
            preserve_error_source: true,
        }
    }

    /// Starts configuring a pipeline over `registry`.
    pub fn builder(registry: Arc<QueryRegistry>) -> QueryPipelineBuilder {
        QueryPipelineBuilder::new(registry)
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

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    /// Starts a typed call of a method of `Q`.
    pub fn query<Q: Any + Send + Sync>(&self) -> QueryBuilder<'_, Q> {
        QueryBuilder::new(self)
    }

    /// Drives a prepared query context through the chain.
    ///
    /// The context must carry its method under [`keys::HANDLER_METHOD`].
    ///
    /// # Errors
    ///
    /// Returns `HandlerNotFound` when no query object can be produced and
    /// `Processing` when the method failed and throw-on-fail is on.
    pub fn process(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        self.chain.run(ctx)
    }

    /// Async variant of [`process`](Self::process).
    ///
    /// # Errors
    ///
    /// As [`process`](Self::process), plus `Cancelled` once the token fires.
    pub async fn process_async(
        &self,
        ctx: &mut MessageContext,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.chain.run_async(ctx, token).await
    }

    /// Calls a method given only its content type and named raw arguments.
    ///
    /// Each value is converted to its parameter type first. Returns the
    /// method's result.
    ///
    /// # Errors
    ///
    /// Returns `QueryNotFound` for an unknown content type,
    /// `ArgumentConversion` for an argument that does not fit and the
    /// errors of [`process`](Self::process).
    pub fn invoke_raw(&self, content_type: &str, args: &QueryArguments) -> Result<Option<Box<dyn Payload>>, PipelineError> {
        let mut ctx = self.raw_context(content_type, args)?;
        self.process(&mut ctx)?;
        self.ensure_succeeded(&ctx)?;
        Ok(ctx.take_boxed_result())
    }

    /// Async variant of [`invoke_raw`](Self::invoke_raw).
    ///
    /// # Errors
    ///
    /// As [`invoke_raw`](Self::invoke_raw), plus `Cancelled`.
    pub async fn invoke_raw_async(
        &self,
        content_type: &str,
        args: &QueryArguments,
        token: &CancellationToken,
    ) -> Result<Option<Box<dyn Payload>>, PipelineError> {
        let mut ctx = self.raw_context(content_type, args)?;
        self.process_async(&mut ctx, token).await?;
        self.ensure_succeeded(&ctx)?;
        Ok(ctx.take_boxed_result())
    }

    /// Like [`invoke_raw`](Self::invoke_raw), returning the result as JSON.
    ///
    /// # Errors
    ///
    /// See [`invoke_raw`](Self::invoke_raw).
    pub fn invoke_raw_json(&self, content_type: &str, args: &QueryArguments) -> Result<serde_json::Value, PipelineError> {
        Ok(self
            .invoke_raw(content_type, args)?
            .map_or(serde_json::Value::Null, |result| result.to_json()))
    }

    /// Async variant of [`invoke_raw_json`](Self::invoke_raw_json).
    ///
    /// # Errors
    ///
    /// See [`invoke_raw_async`](Self::invoke_raw_async).
    pub async fn invoke_raw_json_async(
        &self,
        content_type: &str,
        args: &QueryArguments,
        token: &CancellationToken,
    ) -> Result<serde_json::Value, PipelineError> {
        Ok(self
            .invoke_raw_async(content_type, args, token)
            .await?
            .map_or(serde_json::Value::Null, |result| result.to_json()))
    }

    fn raw_context(&self, content_type: &str, args: &QueryArguments) -> Result<MessageContext, PipelineError> {
        let entry = self
            .registry
            .lookup(content_type)
            .ok_or_else(|| PipelineError::QueryNotFound {
                content_type: content_type.to_string(),
            })?;
        let content = entry.normalize(args)?;
        let mut ctx = MessageContext::for_message(MessageKind::Query, content)
            .with_content_type(entry.content_type());
        ctx.set_item(keys::HANDLER_METHOD, Arc::clone(entry.method()));
        Ok(ctx)
    }

    /// A query has a result to hand back only if its method succeeded.
    pub(crate) fn ensure_succeeded(&self, ctx: &MessageContext) -> Result<(), PipelineError> {
        match ctx.status() {
            ProcessingStatus::Completed => Ok(()),
            ProcessingStatus::Failed => Err(processing_error(ctx, self.preserve_error_source).into()),
            _ => Err(PipelineError::handler_not_found(ctx.content_type())),
        }
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
}

/// Assembles a [`QueryPipeline`] from options.
#[must_use]
pub struct QueryPipelineBuilder {
    registry: Arc<QueryRegistry>,
    resolver: Arc<dyn Resolver>,
    repository: Arc<dyn MessageRepository>,
    options: QueryPipelineOptions,
}

impl QueryPipelineBuilder {
    /// Creates a builder with default options.
    pub fn new(registry: Arc<QueryRegistry>) -> Self {
        Self {
            registry,
            resolver: Arc::new(NullResolver),
            repository: Arc::new(NoOpMessageRepository),
            options: QueryPipelineOptions::default(),
        }
    }

    /// Sets the resolver query objects come from.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets the repository records are written to.
    pub fn with_repository(mut self, repository: Arc<dyn MessageRepository>) -> Self {
        self.repository = repository;
        self
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: QueryPipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds `resolver -> executor -> [repository] -> [throw-on-fail]`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMiddlewareId` only if the fixed chain is malformed.
    pub fn default_pipeline(self) -> Result<QueryPipeline, PipelineError> {
        let mut middlewares: Vec<Box<dyn Middleware>> = vec![
            Box::new(HandlerResolverMiddleware::new(Arc::clone(&self.resolver))),
            Box::new(self.options.executor(self.resolver)),
        ];
        middlewares.extend(self.options.tail(self.repository));

        let mut pipeline = QueryPipeline::new(self.registry);
        pipeline.preserve_error_source = self.options.preserve_error_source;
        pipeline.chain.append_middlewares(middlewares)?;
        debug!(chain = ?pipeline.chain.middleware_ids(), "Query pipeline assembled");
        Ok(pipeline)
    }

    /// Builds a pipeline with an empty chain for manual assembly.
    pub fn empty(self) -> QueryPipeline {
        QueryPipeline::new(self.registry)
    }
}
