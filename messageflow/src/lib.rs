//! # Messageflow
//!
//! Command, query and event pipelines built from pluggable middleware.
//!
//! Every message is wrapped in a [`MessageContext`](context::MessageContext)
//! and handed through an ordered chain of middlewares:
//!
//! - **Validation**: payload rules checked before anything else runs
//! - **Location**: handler discovery over explicitly registered modules
//! - **Resolution**: handler instances from a resolver or their constructor
//! - **Execution**: sync or async handler invocation with failure capture
//! - **Persistence**: optional message records for every processed message
//! - **Failure propagation**: captured failures raised as errors on demand
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use messageflow::prelude::*;
//!
//! let orders = HandlerClass::builder::<OrderHandlers>()
//!     .marked()
//!     .construct_default()
//!     .handle("HandleCreate", |h: &mut OrderHandlers, cmd: &mut CreateOrder, _: &Dependencies| {
//!         h.create(cmd)
//!     })
//!     .build();
//!
//! let pipeline = CommandPipeline::builder()
//!     .with_module(HandlerModule::new("orders").with_class(orders))
//!     .default_pipeline()?;
//!
//! let ctx = pipeline.handle(CreateOrder { sku: "A-1".into() })?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod commands;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod options;
pub mod queries;
pub mod repository;
pub mod resolver;
pub mod testing;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::commands::{CommandPipeline, CommandPipelineBuilder};
    pub use crate::context::{keys, Failure, MessageContext};
    pub use crate::core::{MessageKind, MessageKinds, Payload, ProcessingStatus, TypeKey};
    pub use crate::errors::{BrokenRule, PipelineError, ProcessingError, ValidationError};
    pub use crate::events::{EventPipeline, EventPipelineBuilder};
    pub use crate::handlers::{
        Dependencies, HandlerClass, HandlerLocator, HandlerModule, HandlerSearchMethod,
    };
    pub use crate::middleware::{Middleware, MiddlewareChain};
    pub use crate::options::{
        CommandPipelineOptions, EventPipelineOptions, PipelineOptions, QueryPipelineOptions,
    };
    pub use crate::queries::{QueryArguments, QueryMethod, QueryPipeline, QueryRegistry};
    pub use crate::repository::{
        InMemoryMessageRepository, MessageRecord, MessageRecordFilter, MessageRepository,
        RepositoryOptions,
    };
    pub use crate::resolver::{NullResolver, Resolver, ServiceRegistry};
    pub use crate::validation::{Rules, Validate};
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    fn assert_shareable<T: Send + Sync>() {}

    #[test]
    fn pipelines_are_shareable() {
        assert_shareable::<CommandPipeline>();
        assert_shareable::<EventPipeline>();
        assert_shareable::<QueryPipeline>();
        assert_shareable::<HandlerLocator>();
    }
}
