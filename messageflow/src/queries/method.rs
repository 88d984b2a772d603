//! Query invokers and the typed handle returned on registration.

use super::{Arguments, QueryArguments};
use crate::core::Payload;
use crate::handlers::{boxed_output, Dependencies, HandlerMethod, Invocation, Invoke};
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

fn query_object<'a, Q: Any>(instance: Option<&'a mut (dyn Any + Send + Sync)>) -> anyhow::Result<&'a Q> {
    instance
        .and_then(|i| i.downcast_mut::<Q>())
        .map(|q| &*q)
        .ok_or_else(|| anyhow::anyhow!("query object is not a {}", std::any::type_name::<Q>()))
}

fn decode<A: Arguments>(message: &dyn Payload, params: &[&'static str]) -> anyhow::Result<A> {
    let args = message
        .downcast_ref::<QueryArguments>()
        .ok_or_else(|| anyhow::anyhow!("query content is not an argument map"))?;
    Ok(A::from_named(args, params)?)
}

/// Invokes `Fn(&Q, A) -> Result<R>`.
pub(crate) struct QueryInvoker<Q, A, R, F> {
    f: F,
    params: Arc<[&'static str]>,
    _types: PhantomData<fn() -> (Q, A, R)>,
}

impl<Q, A, R, F> QueryInvoker<Q, A, R, F> {
    pub(crate) fn new(f: F, params: Arc<[&'static str]>) -> Self {
        Self {
            f,
            params,
            _types: PhantomData,
        }
    }
}

impl<Q, A, R, F> Invoke for QueryInvoker<Q, A, R, F>
where
    Q: Any + Send + Sync,
    A: Arguments,
    R: Payload,
    F: Fn(&Q, A) -> anyhow::Result<R> + Send + Sync,
{
    fn invoke<'a>(
        &self,
        instance: Option<&'a mut (dyn Any + Send + Sync)>,
        message: &'a mut dyn Payload,
        _deps: &'a Dependencies,
    ) -> Invocation<'a> {
        let output = query_object::<Q>(instance)
            .and_then(|query| Ok((query, decode::<A>(message, &self.params)?)))
            .and_then(|(query, args)| (self.f)(query, args));
        Invocation::Ready(boxed_output(output))
    }
}

/// Invokes `Fn(&Q, A) -> BoxFuture<Result<R>>`.
pub(crate) struct AsyncQueryInvoker<Q, A, R, F> {
    f: F,
    params: Arc<[&'static str]>,
    _types: PhantomData<fn() -> (Q, A, R)>,
}

impl<Q, A, R, F> AsyncQueryInvoker<Q, A, R, F> {
    pub(crate) fn new(f: F, params: Arc<[&'static str]>) -> Self {
        Self {
            f,
            params,
            _types: PhantomData,
        }
    }
}

impl<Q, A, R, F> Invoke for AsyncQueryInvoker<Q, A, R, F>
where
    Q: Any + Send + Sync,
    A: Arguments,
    R: Payload,
    F: for<'a> Fn(&'a Q, A) -> BoxFuture<'a, anyhow::Result<R>> + Send + Sync,
{
    fn invoke<'a>(
        &self,
        instance: Option<&'a mut (dyn Any + Send + Sync)>,
        message: &'a mut dyn Payload,
        _deps: &'a Dependencies,
    ) -> Invocation<'a> {
        let query = match query_object::<Q>(instance) {
            Ok(query) => query,
            Err(e) => return Invocation::Ready(Err(e)),
        };
        let args = match decode::<A>(message, &self.params) {
            Ok(args) => args,
            Err(e) => return Invocation::Ready(Err(e)),
        };
        let future = (self.f)(query, args);
        Invocation::Pending(Box::pin(async move { boxed_output(future.await) }))
    }
}

/// Handle to a registered query method of `Q` taking `A` and returning `R`.
///
/// Obtained from [`QueryRegistry::register_method`](super::QueryRegistry::register_method)
/// and passed to [`QueryBuilder::with`](super::QueryBuilder::with).
pub struct QueryMethod<Q, A, R> {
    method: Arc<HandlerMethod>,
    content_type: Arc<str>,
    params: Arc<[&'static str]>,
    _types: PhantomData<fn() -> (Q, A, R)>,
}

impl<Q, A, R> QueryMethod<Q, A, R> {
    pub(crate) fn new(method: Arc<HandlerMethod>, content_type: Arc<str>, params: Arc<[&'static str]>) -> Self {
        Self {
            method,
            content_type,
            params,
            _types: PhantomData,
        }
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.method.name()
    }

    /// Returns the `Type.Method` content type of its messages.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the parameter names in declaration order.
    #[must_use]
    pub fn parameter_names(&self) -> &[&'static str] {
        &self.params
    }

    /// Returns the underlying handler method.
    #[must_use]
    pub fn handler_method(&self) -> &Arc<HandlerMethod> {
        &self.method
    }
}

impl<Q, A, R> Clone for QueryMethod<Q, A, R> {
    fn clone(&self) -> Self {
        Self {
            method: Arc::clone(&self.method),
            content_type: Arc::clone(&self.content_type),
            params: Arc::clone(&self.params),
            _types: PhantomData,
        }
    }
}

impl<Q, A, R> fmt::Debug for QueryMethod<Q, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryMethod")
            .field("content_type", &self.content_type)
            .field("params", &self.params)
            .finish()
    }
}
