//! Options that decide how the default pipelines are assembled.

use crate::handlers::{HandlerExecutorMiddleware, HandlerSearchMethod};
use crate::middleware::{Middleware, ThrowOnFailMiddleware};
use crate::repository::{MessageRepository, RepositoryMiddleware, RepositoryOptions};
use crate::resolver::Resolver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Flags driving `default_pipeline()` on every pipeline builder.
///
/// Flags that make no sense for a pipeline kind are ignored by its builder:
/// events and queries are never validated, and queries are not located.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Add the validation middleware at the head.
    #[serde(default)]
    pub use_validation: bool,
    /// Turn broken rules into a `Validation` error.
    #[serde(default = "default_true")]
    pub throw_on_validation_fail: bool,
    /// Add the repository middleware after the executor.
    #[serde(default)]
    pub use_repository: bool,
    /// Repository middleware settings.
    #[serde(default)]
    pub repository: RepositoryOptions,
    /// Add the throw-on-fail middleware at the tail.
    #[serde(default = "default_true")]
    pub throw_on_fail: bool,
    /// Keep the handler error as the `source()` of processing errors.
    #[serde(default = "default_true")]
    pub preserve_error_source: bool,
    /// Record handler execution time.
    #[serde(default = "default_true")]
    pub measure_duration: bool,
    /// Let handlers pull dependencies from the resolver.
    #[serde(default = "default_true")]
    pub resolve_parameters: bool,
    /// How handler classes are discovered.
    #[serde(default)]
    pub search_method: HandlerSearchMethod,
}

/// Options of the command pipeline.
pub type CommandPipelineOptions = PipelineOptions;
/// Options of the event pipeline.
pub type EventPipelineOptions = PipelineOptions;
/// Options of the query pipeline.
pub type QueryPipelineOptions = PipelineOptions;

fn default_true() -> bool {
    true
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            use_validation: false,
            throw_on_validation_fail: default_true(),
            use_repository: false,
            repository: RepositoryOptions::default(),
            throw_on_fail: default_true(),
            preserve_error_source: default_true(),
            measure_duration: default_true(),
            resolve_parameters: default_true(),
            search_method: HandlerSearchMethod::default(),
        }
    }
}

impl PipelineOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables validation.
    #[must_use]
    pub fn with_validation(mut self, throw_on_fail: bool) -> Self {
        self.use_validation = true;
        self.throw_on_validation_fail = throw_on_fail;
        self
    }

    /// Enables the repository middleware.
    #[must_use]
    pub fn with_repository(mut self, options: RepositoryOptions) -> Self {
        self.use_repository = true;
        self.repository = options;
        self
    }

    /// Sets whether failures become errors.
    #[must_use]
    pub fn with_throw_on_fail(mut self, enabled: bool) -> Self {
        self.throw_on_fail = enabled;
        self
    }

    /// Sets whether processing errors keep the handler error as source.
    #[must_use]
    pub fn with_preserve_error_source(mut self, enabled: bool) -> Self {
        self.preserve_error_source = enabled;
        self
    }

    /// Sets whether execution time is recorded.
    #[must_use]
    pub fn with_measure_duration(mut self, enabled: bool) -> Self {
        self.measure_duration = enabled;
        self
    }

    /// Sets whether handlers may resolve dependencies.
    #[must_use]
    pub fn with_resolve_parameters(mut self, enabled: bool) -> Self {
        self.resolve_parameters = enabled;
        self
    }

    /// Sets the discovery convention.
    #[must_use]
    pub fn with_search_method(mut self, method: HandlerSearchMethod) -> Self {
        self.search_method = method;
        self
    }

    pub(crate) fn executor(&self, resolver: Arc<dyn Resolver>) -> HandlerExecutorMiddleware {
        HandlerExecutorMiddleware::new(resolver)
            .with_resolve_parameters(self.resolve_parameters)
            .with_measure_duration(self.measure_duration)
    }

    /// The optional repository and throw-on-fail steps every chain ends with.
    pub(crate) fn tail(&self, repository: Arc<dyn MessageRepository>) -> Vec<Box<dyn Middleware>> {
        let mut tail: Vec<Box<dyn Middleware>> = Vec::new();
        if self.use_repository {
            tail.push(Box::new(RepositoryMiddleware::new(repository, self.repository.clone())));
        }
        if self.throw_on_fail {
            tail.push(Box::new(ThrowOnFailMiddleware::new(self.preserve_error_source)));
        }
        tail
    }
}
