//! Test assertions for processed message contexts.

use crate::context::MessageContext;
use crate::core::ProcessingStatus;

/// Asserts that the message completed without a captured failure.
pub fn assert_completed(ctx: &MessageContext) {
    assert_eq!(
        ctx.status(),
        ProcessingStatus::Completed,
        "Expected completed message, got status: {:?}",
        ctx.status()
    );
    assert!(
        ctx.failure().is_none(),
        "Expected no failure, got: {:?}",
        ctx.failure().map(crate::context::Failure::messages)
    );
}

/// Asserts that the message failed.
pub fn assert_failed(ctx: &MessageContext) {
    assert_eq!(
        ctx.status(),
        ProcessingStatus::Failed,
        "Expected failed message, got status: {:?}",
        ctx.status()
    );
}

/// Asserts that the message was rejected.
pub fn assert_rejected(ctx: &MessageContext) {
    assert!(
        ctx.is_rejected(),
        "Expected rejected message, got status: {:?}",
        ctx.status()
    );
}

/// Asserts that the message has the expected status.
pub fn assert_status(ctx: &MessageContext, expected: ProcessingStatus) {
    assert_eq!(
        ctx.status(),
        expected,
        "Expected status {:?}, got {:?}",
        expected,
        ctx.status()
    );
}

/// Asserts the number of captured handler failures.
pub fn assert_failure_count(ctx: &MessageContext, expected: usize) {
    let actual = ctx.failure().map_or(0, crate::context::Failure::count);
    assert_eq!(actual, expected, "Expected {expected} failures, got {actual}");
}

/// Asserts that the context carries an item under `key`.
pub fn assert_has_item(ctx: &MessageContext, key: &str) {
    assert!(
        ctx.contains_item(key),
        "Expected context to contain item '{key}', but it doesn't"
    );
}
