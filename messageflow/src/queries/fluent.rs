//! The typed `query::<Q>().with(&method, args)` call.

use super::{Arguments, QueryMethod, QueryPipeline};
use crate::cancellation::CancellationToken;
use crate::context::{keys, MessageContext};
use crate::core::{MessageKind, Payload};
use crate::errors::PipelineError;
use crate::handlers::HandlerInstance;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Fluent call of one query method on `Q`.
///
/// ```rust,ignore
/// let sum: i64 = pipeline.query::<Calculator>().with(&add, (2, 3))?;
/// let skipped: i64 = pipeline.query::<Calculator>().without_execution().with(&add, (2, 3))?;
/// ```
#[must_use]
pub struct QueryBuilder<'p, Q> {
    pipeline: &'p QueryPipeline,
    instance: Option<HandlerInstance>,
    execute: bool,
    _type: PhantomData<fn() -> Q>,
}

impl<'p, Q: Any + Send + Sync> QueryBuilder<'p, Q> {
    pub(crate) fn new(pipeline: &'p QueryPipeline) -> Self {
        Self {
            pipeline,
            instance: None,
            execute: true,
            _type: PhantomData,
        }
    }

    /// Runs the query on `instance` instead of resolving one.
    ///
    /// The instance is dropped after the call without running dispose hooks.
    pub fn on(mut self, instance: Q) -> Self {
        self.instance = Some(HandlerInstance::supplied(instance));
        self
    }

    /// Builds the message but skips the pipeline.
    pub fn without_execution(mut self) -> Self {
        self.execute = false;
        self
    }

    /// Builds the query message without running it.
    ///
    /// # Errors
    ///
    /// Returns `ArgumentConversion` if an argument cannot be serialized.
    pub fn message<A: Arguments, R>(
        self,
        method: &QueryMethod<Q, A, R>,
        args: A,
    ) -> Result<MessageContext, PipelineError> {
        let content = args.into_named(method.parameter_names())?;
        let mut ctx = MessageContext::for_message(MessageKind::Query, content)
            .with_content_type(method.content_type());
        ctx.set_item(keys::HANDLER_METHOD, Arc::clone(method.handler_method()));
        if let Some(instance) = self.instance {
            ctx.set_item(keys::HANDLER_OBJECT, instance);
        }
        Ok(ctx)
    }

    /// Calls the method and returns its typed result.
    ///
    /// Without execution, `R::default()` is returned instead.
    ///
    /// # Errors
    ///
    /// Returns `HandlerNotFound` when no query object can be produced and
    /// `Processing` when the method failed.
    pub fn with<A: Arguments, R: Payload + Default>(
        self,
        method: &QueryMethod<Q, A, R>,
        args: A,
    ) -> Result<R, PipelineError> {
        let pipeline = self.pipeline;
        let execute = self.execute;
        let mut ctx = self.message(method, args)?;
        if !execute {
            debug!(content_type = ctx.content_type(), "Query built without execution");
            return Ok(R::default());
        }

        pipeline.process(&mut ctx)?;
        typed_result(pipeline, ctx)
    }

    /// Async variant of [`with`](Self::with).
    ///
    /// # Errors
    ///
    /// As [`with`](Self::with), plus `Cancelled` once the token fires.
    pub async fn with_async<A: Arguments, R: Payload + Default>(
        self,
        method: &QueryMethod<Q, A, R>,
        args: A,
        token: &CancellationToken,
    ) -> Result<R, PipelineError> {
        let pipeline = self.pipeline;
        let execute = self.execute;
        let mut ctx = self.message(method, args)?;
        if !execute {
            debug!(content_type = ctx.content_type(), "Query built without execution");
            return Ok(R::default());
        }

        pipeline.process_async(&mut ctx, token).await?;
        typed_result(pipeline, ctx)
    }
}

fn typed_result<R: Payload + Default>(pipeline: &QueryPipeline, mut ctx: MessageContext) -> Result<R, PipelineError> {
    pipeline.ensure_succeeded(&ctx)?;
    Ok(ctx.take_result::<R>().unwrap_or_default())
}
