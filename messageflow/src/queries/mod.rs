//! The query pipeline: typed calls of registered query methods.
//!
//! A query is a method on a query object `Q`, registered in a
//! [`QueryRegistry`]. Its message content is the [`QueryArguments`] map
//! keyed by parameter name and its content type is
//! `"{type_name::<Q>()}.{method}"`, so a recorded call can be replayed
//! through [`QueryPipeline::invoke_raw`].
//!
//! Default chain: `handler-resolver -> handler-executor -> [repository] ->
//! [throw-on-fail]`. The method is pre-seeded on the context, so no locator
//! is needed.

mod arguments;
mod fluent;
mod method;
mod pipeline;
mod registry;

pub use arguments::{convert_argument, Arguments, QueryArguments};
pub use fluent::QueryBuilder;
pub use method::QueryMethod;
pub use pipeline::{QueryPipeline, QueryPipelineBuilder, QUERY_PIPELINE};
pub use registry::{QueryEntry, QueryRegistry};
