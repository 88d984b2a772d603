//! Message context management.
//!
//! This module provides:
//! - The mutable [`MessageContext`] threaded through one pipeline run
//! - The [`Failure`] value captured from handlers
//! - Well-known item keys shared between middlewares

#[cfg(test)]
mod context_tests;
mod failure;
pub mod keys;
mod message;

pub use failure::Failure;
pub use message::MessageContext;
