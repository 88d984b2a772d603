//! Testing utilities for messageflow pipelines.
//!
//! This module provides:
//! - Mock middlewares that record or fail
//! - Assertions on processed message contexts
//! - Context and repository fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_completed, assert_failed, assert_failure_count, assert_has_item, assert_rejected,
    assert_status,
};
pub use fixtures::{FlakyRepository, TestMessage};
pub use mocks::{FailingMiddleware, RecordingMiddleware, SlowMiddleware, Trail};
