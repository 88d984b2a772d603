//! Well-known item keys used by the built-in middlewares.

/// The located handler method (commands and queries).
pub const HANDLER_METHOD: &str = "handler-method";
/// The located handler methods (events).
pub const HANDLER_METHODS: &str = "handler-methods";
/// The resolved handler instance (commands and queries).
pub const HANDLER_OBJECT: &str = "handler-object";
/// The resolved handler instances, index-aligned with the methods (events).
pub const HANDLER_OBJECTS: &str = "handler-objects";
/// The measured handler execution time.
pub const EXECUTION_DURATION: &str = "execution-duration";
