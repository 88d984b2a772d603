//! Tracing setup and the spans pipelines open per message.
//!
//! The engine only emits `tracing` events; installing a subscriber is left to
//! the host. [`init_tracing`] is a convenience for binaries and tests.

use crate::context::MessageContext;
use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Subscriber settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directives, e.g. `info` or `messageflow=debug`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// Log span open and close events.
    #[serde(default)]
    pub span_events: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
            span_events: false,
        }
    }
}

impl LogConfig {
    /// Human-readable debug output with span events.
    #[must_use]
    pub fn development() -> Self {
        Self {
            filter: "debug".to_string(),
            json: false,
            span_events: true,
        }
    }

    /// Sets the filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Switches to JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Installs a global fmt subscriber.
///
/// # Errors
///
/// Returns `Configuration` if the filter is invalid or a global subscriber
/// is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| PipelineError::configuration(format!("invalid log filter: {e}")))?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| PipelineError::configuration(format!("cannot install subscriber: {e}")))
}

/// Opens the span one pipeline run executes in.
#[must_use]
pub fn message_span(pipeline: &str, ctx: &MessageContext) -> Span {
    info_span!(
        "message",
        pipeline = pipeline,
        message_id = %ctx.id(),
        kind = %ctx.kind(),
        content_type = ctx.content_type(),
    )
}
