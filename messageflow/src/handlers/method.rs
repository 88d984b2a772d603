//! Handler methods and the type-erased invokers behind them.

use super::{ClassDescriptor, Dependencies};
use crate::core::{Payload, TypeKey};
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// What a handler invocation produces: an optional result value.
pub type HandlerOutput = anyhow::Result<Option<Box<dyn Payload>>>;

/// The outcome of starting a handler call.
pub enum Invocation<'a> {
    /// A synchronous handler already finished.
    Ready(HandlerOutput),
    /// An asynchronous handler returned a future.
    Pending(BoxFuture<'a, HandlerOutput>),
}

/// Type-erased call into a handler.
pub trait Invoke: Send + Sync {
    /// Starts the call.
    ///
    /// `instance` is `None` for self-handling methods, where the message is
    /// the receiver.
    fn invoke<'a>(
        &self,
        instance: Option<&'a mut (dyn Any + Send + Sync)>,
        message: &'a mut dyn Payload,
        deps: &'a Dependencies,
    ) -> Invocation<'a>;
}

pub(crate) fn boxed_output<R: Payload>(result: anyhow::Result<R>) -> HandlerOutput {
    result.map(|value| Some(Box::new(value) as Box<dyn Payload>))
}

fn receiver<'a, H: Any>(
    instance: Option<&'a mut (dyn Any + Send + Sync)>,
) -> anyhow::Result<&'a mut H> {
    instance
        .and_then(|i| i.downcast_mut::<H>())
        .ok_or_else(|| anyhow::anyhow!("handler instance is not a {}", std::any::type_name::<H>()))
}

fn message_as<M: Any>(message: &mut dyn Payload) -> anyhow::Result<&mut M> {
    message
        .downcast_mut::<M>()
        .ok_or_else(|| anyhow::anyhow!("message is not a {}", std::any::type_name::<M>()))
}

/// Invokes `Fn(&mut H, &mut M, &Dependencies) -> Result<R>`.
pub(crate) struct SyncInvoker<H, M, R, F> {
    f: F,
    _types: PhantomData<fn() -> (H, M, R)>,
}

impl<H, M, R, F> SyncInvoker<H, M, R, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

impl<H, M, R, F> Invoke for SyncInvoker<H, M, R, F>
where
    H: Any + Send + Sync,
    M: Payload,
    R: Payload,
    F: Fn(&mut H, &mut M, &Dependencies) -> anyhow::Result<R> + Send + Sync,
{
    fn invoke<'a>(
        &self,
        instance: Option<&'a mut (dyn Any + Send + Sync)>,
        message: &'a mut dyn Payload,
        deps: &'a Dependencies,
    ) -> Invocation<'a> {
        let output = match (receiver::<H>(instance), message_as::<M>(message)) {
            (Ok(handler), Ok(message)) => (self.f)(handler, message, deps),
            (Err(e), _) | (_, Err(e)) => Err(e),
        };
        Invocation::Ready(boxed_output(output))
    }
}

/// Invokes an async handler method.
pub(crate) struct AsyncInvoker<H, M, R, F> {
    f: F,
    _types: PhantomData<fn() -> (H, M, R)>,
}

impl<H, M, R, F> AsyncInvoker<H, M, R, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

impl<H, M, R, F> Invoke for AsyncInvoker<H, M, R, F>
where
    H: Any + Send + Sync,
    M: Payload,
    R: Payload,
    F: for<'a> Fn(&'a mut H, &'a mut M, &'a Dependencies) -> BoxFuture<'a, anyhow::Result<R>>
        + Send
        + Sync,
{
    fn invoke<'a>(
        &self,
        instance: Option<&'a mut (dyn Any + Send + Sync)>,
        message: &'a mut dyn Payload,
        deps: &'a Dependencies,
    ) -> Invocation<'a> {
        let handler = match receiver::<H>(instance) {
            Ok(handler) => handler,
            Err(e) => return Invocation::Ready(Err(e)),
        };
        let message = match message_as::<M>(message) {
            Ok(message) => message,
            Err(e) => return Invocation::Ready(Err(e)),
        };
        let future = (self.f)(handler, message, deps);
        Invocation::Pending(Box::pin(async move { boxed_output(future.await) }))
    }
}

/// Invokes a method declared on the message itself.
pub(crate) struct SelfInvoker<M, R, F> {
    f: F,
    _types: PhantomData<fn() -> (M, R)>,
}

impl<M, R, F> SelfInvoker<M, R, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

impl<M, R, F> Invoke for SelfInvoker<M, R, F>
where
    M: Payload,
    R: Payload,
    F: Fn(&mut M, &Dependencies) -> anyhow::Result<R> + Send + Sync,
{
    fn invoke<'a>(
        &self,
        _instance: Option<&'a mut (dyn Any + Send + Sync)>,
        message: &'a mut dyn Payload,
        deps: &'a Dependencies,
    ) -> Invocation<'a> {
        let output = message_as::<M>(message).and_then(|message| (self.f)(message, deps));
        Invocation::Ready(boxed_output(output))
    }
}

/// Invokes an async method declared on the message itself.
pub(crate) struct SelfAsyncInvoker<M, R, F> {
    f: F,
    _types: PhantomData<fn() -> (M, R)>,
}

impl<M, R, F> SelfAsyncInvoker<M, R, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

impl<M, R, F> Invoke for SelfAsyncInvoker<M, R, F>
where
    M: Payload,
    R: Payload,
    F: for<'a> Fn(&'a mut M, &'a Dependencies) -> BoxFuture<'a, anyhow::Result<R>> + Send + Sync,
{
    fn invoke<'a>(
        &self,
        _instance: Option<&'a mut (dyn Any + Send + Sync)>,
        message: &'a mut dyn Payload,
        deps: &'a Dependencies,
    ) -> Invocation<'a> {
        match message_as::<M>(message) {
            Ok(message) => {
                let future = (self.f)(message, deps);
                Invocation::Pending(Box::pin(async move { boxed_output(future.await) }))
            }
            Err(e) => Invocation::Ready(Err(e)),
        }
    }
}

/// A method that handles one message type.
pub struct HandlerMethod {
    name: String,
    declaring: TypeKey,
    message: TypeKey,
    is_async: bool,
    self_handling: bool,
    class: Arc<ClassDescriptor>,
    invoker: Arc<dyn Invoke>,
}

impl HandlerMethod {
    pub(crate) fn new(
        name: impl Into<String>,
        message: TypeKey,
        is_async: bool,
        self_handling: bool,
        class: Arc<ClassDescriptor>,
        invoker: Arc<dyn Invoke>,
    ) -> Self {
        Self {
            name: name.into(),
            declaring: class.type_key(),
            message,
            is_async,
            self_handling,
            class,
            invoker,
        }
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type that declares the method.
    #[must_use]
    pub fn declaring_type(&self) -> TypeKey {
        self.declaring
    }

    /// Returns the handled message type.
    #[must_use]
    pub fn message_type(&self) -> TypeKey {
        self.message
    }

    /// Returns true if the method returns a future.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Returns true if the message is its own handler.
    #[must_use]
    pub fn is_self_handling(&self) -> bool {
        self.self_handling
    }

    /// Returns the declaring class.
    #[must_use]
    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    /// Returns `Type.Method` using the short type name.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring.short_name(), self.name)
    }

    /// Starts a call into the method.
    pub fn invoke<'a>(
        &self,
        instance: Option<&'a mut (dyn Any + Send + Sync)>,
        message: &'a mut dyn Payload,
        deps: &'a Dependencies,
    ) -> Invocation<'a> {
        self.invoker.invoke(instance, message, deps)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("declaring", &self.declaring.name())
            .field("message", &self.message.name())
            .field("is_async", &self.is_async)
            .field("self_handling", &self.self_handling)
            .finish()
    }
}
