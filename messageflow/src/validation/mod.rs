//! Payload validation.
//!
//! Message types describe their constraints by implementing [`Validate`],
//! usually with the [`Rules`] builder. The [`ValidationMiddleware`] runs the
//! registered validators before a handler is located.

mod middleware;
mod rules;

pub use middleware::ValidationMiddleware;
pub use rules::{Rules, Validate};
