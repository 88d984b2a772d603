//! The event pipeline: one message, any number of handlers.
//!
//! Every handler is attempted. Handler errors are collected into an
//! aggregate failure and the message still completes; a throw-on-fail step
//! decides whether that becomes an error for the publisher.

#[cfg(test)]
mod events_tests;
mod middlewares;
mod pipeline;

pub use middlewares::{
    EventHandlerExecutorMiddleware, EventHandlerLocatorMiddleware, EventHandlerResolverMiddleware,
};
pub use pipeline::{EventPipeline, EventPipelineBuilder, EVENT_PIPELINE};
