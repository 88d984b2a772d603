//! Middleware and the ordered chain every pipeline is built on.
//!
//! A pipeline is a [`MiddlewareChain`]: an ordered list of uniquely
//! identified [`Middleware`]s that all receive the same
//! [`MessageContext`](crate::context::MessageContext) in turn.

mod chain;
mod throw_on_fail;

pub use chain::{AsAny, Middleware, MiddlewareChain};
pub use throw_on_fail::ThrowOnFailMiddleware;
pub(crate) use throw_on_fail::processing_error;

/// Well-known middleware ids.
pub mod ids {
    /// Payload validation.
    pub const VALIDATION: &str = "validation";
    /// Handler locator.
    pub const HANDLER_LOCATOR: &str = "handler-locator";
    /// Handler resolver.
    pub const HANDLER_RESOLVER: &str = "handler-resolver";
    /// Handler executor.
    pub const HANDLER_EXECUTOR: &str = "handler-executor";
    /// Message record persistence.
    pub const REPOSITORY: &str = "repository";
    /// Failure to error conversion.
    pub const THROW_ON_FAIL: &str = "throw-on-fail";
}
