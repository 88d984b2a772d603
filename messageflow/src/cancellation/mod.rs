//! Cooperative cancellation for asynchronous pipeline runs.

mod token;

pub use token::{CancelCallback, CancellationToken};
