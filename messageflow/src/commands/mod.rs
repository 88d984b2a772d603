//! The command pipeline: one message, exactly one handler.
//!
//! Default chain: `[validation] -> handler-locator -> handler-resolver ->
//! handler-executor -> [repository] -> [throw-on-fail]`.

mod pipeline;

pub use pipeline::{CommandPipeline, CommandPipelineBuilder, COMMAND_PIPELINE};
