//! Handler discovery, construction and invocation.
//!
//! This module provides:
//! - [`HandlerClass`] / [`HandlerModule`]: the explicit registration surface
//! - [`HandlerLocator`]: one-time scan plus a per-message-type cache
//! - [`resolve_instance`]: resolver first, then best-effort construction
//! - [`run_sync`] / [`run_async`]: invocation with error normalisation
//! - The locator, resolver and executor middlewares for single handlers

mod class;
mod dependencies;
mod execute;
mod instance;
mod locator;
mod method;
mod middlewares;

pub use class::{BoxedInstance, ClassDescriptor, Construction, HandlerClass, HandlerClassBuilder, HandlerModule};
pub use dependencies::Dependencies;
pub use execute::{run_async, run_sync};
pub use instance::{resolve_instance, HandlerInstance};
pub use locator::{HandlerLocator, HandlerSearchMethod, LocatedHandlers, HANDLERS_SUFFIX, HANDLE_PREFIX};
pub use method::{HandlerMethod, HandlerOutput, Invocation, Invoke};
pub(crate) use method::boxed_output;
pub use middlewares::{HandlerExecutorMiddleware, HandlerLocatorMiddleware, HandlerResolverMiddleware};
pub(crate) use middlewares::record_duration;
