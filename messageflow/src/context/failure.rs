//! Failures captured from handler execution.

use std::fmt;
use std::sync::Arc;

/// A terminal failure attached to a message context.
///
/// Commands and queries capture a single cause. Events collect every handler
/// error into an aggregate.
#[derive(Debug, Clone)]
pub enum Failure {
    /// One handler error.
    Single(Arc<anyhow::Error>),
    /// Every error raised by a fan-out.
    Aggregate(Vec<Arc<anyhow::Error>>),
}

impl Failure {
    /// Wraps a single error.
    #[must_use]
    pub fn single(error: anyhow::Error) -> Self {
        Self::Single(Arc::new(error))
    }

    /// Collects several errors.
    #[must_use]
    pub fn aggregate(errors: Vec<anyhow::Error>) -> Self {
        Self::Aggregate(errors.into_iter().map(Arc::new).collect())
    }

    /// Returns the number of captured errors.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Aggregate(errors) => errors.len(),
        }
    }

    /// Returns the captured errors.
    #[must_use]
    pub fn errors(&self) -> Vec<&Arc<anyhow::Error>> {
        match self {
            Self::Single(error) => vec![error],
            Self::Aggregate(errors) => errors.iter().collect(),
        }
    }

    /// Returns the first captured error.
    #[must_use]
    pub fn primary(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            Self::Single(error) => Some(error),
            Self::Aggregate(errors) => errors.first(),
        }
    }

    /// Returns the message of every captured error.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors().iter().map(|e| e.to_string()).collect()
    }

    /// Returns true if the failure carries no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(error) => write!(f, "{error}"),
            Self::Aggregate(errors) => {
                write!(f, "{} handler(s) failed: {}", errors.len(), self.messages().join("; "))
            }
        }
    }
}
