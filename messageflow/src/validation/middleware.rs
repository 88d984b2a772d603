//! Middleware rejecting messages that break their validation rules.

use super::Validate;
use crate::context::{Failure, MessageContext};
use crate::core::{Payload, ProcessingStatus, TypeKey};
use crate::errors::{BrokenRule, PipelineError, ValidationError};
use crate::middleware::{ids, Middleware};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use tracing::{debug, warn};

type Validator = Box<dyn Fn(&dyn Payload) -> Vec<BrokenRule> + Send + Sync>;

/// Runs registered validators against the message content.
///
/// Broken rules reject the message. With `throw_on_fail` the
/// [`ValidationError`] is also returned to the caller.
pub struct ValidationMiddleware {
    validators: HashMap<TypeId, (TypeKey, Validator)>,
    throw_on_fail: bool,
}

impl ValidationMiddleware {
    /// Creates the middleware without validators.
    #[must_use]
    pub fn new(throw_on_fail: bool) -> Self {
        Self {
            validators: HashMap::new(),
            throw_on_fail,
        }
    }

    /// Returns true if broken rules are returned as an error.
    #[must_use]
    pub fn throws_on_fail(&self) -> bool {
        self.throw_on_fail
    }

    /// Registers `T`'s own rules.
    pub fn register<T: Validate + Any>(&mut self) {
        self.register_fn::<T, _>(T::validate);
    }

    /// Registers a validation function for `T`.
    pub fn register_fn<T, F>(&mut self, validate: F)
    where
        T: Any,
        F: Fn(&T) -> Vec<BrokenRule> + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let validator: Validator = Box::new(move |payload: &dyn Payload| {
            payload.downcast_ref::<T>().map(&validate).unwrap_or_default()
        });
        self.validators.insert(key.id(), (key, validator));
    }

    /// Adds `T`'s rules, builder style.
    #[must_use]
    pub fn with<T: Validate + Any>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Returns true if `T` has a validator.
    #[must_use]
    pub fn validates<T: Any>(&self) -> bool {
        self.validators.contains_key(&TypeId::of::<T>())
    }
}

impl Middleware for ValidationMiddleware {
    fn id(&self) -> &str {
        ids::VALIDATION
    }

    fn handle(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        if ctx.is_terminal() {
            return Ok(());
        }
        let Some((key, validator)) = self.validators.get(&ctx.content_key().id()) else {
            return Ok(());
        };

        let rules = validator(ctx.content());
        if rules.is_empty() {
            debug!(message_id = %ctx.id(), content_type = key.name(), "Validation passed");
            return Ok(());
        }

        let error = ValidationError::new(ctx.content_type(), rules);
        warn!(
            message_id = %ctx.id(),
            content_type = ctx.content_type(),
            broken_rules = error.rules.len(),
            "Validation failed"
        );
        ctx.set_status(ProcessingStatus::Rejected)?;
        ctx.set_failure(Failure::single(error.clone().into()));

        if self.throw_on_fail {
            Err(PipelineError::Validation(error))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for ValidationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationMiddleware")
            .field(
                "validators",
                &self.validators.values().map(|(key, _)| key.name()).collect::<Vec<_>>(),
            )
            .field("throw_on_fail", &self.throw_on_fail)
            .finish()
    }
}
