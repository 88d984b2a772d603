//! Resolved handler instances and their release.

use super::{BoxedInstance, ClassDescriptor, Dependencies};
use crate::resolver::Resolver;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// A handler object owned by one pipeline run.
///
/// Dropping the instance runs the class's dispose hook exactly once.
pub struct HandlerInstance {
    value: BoxedInstance,
    class: Option<Arc<ClassDescriptor>>,
}

impl HandlerInstance {
    /// Wraps an instance whose class may define a dispose hook.
    #[must_use]
    pub fn new(value: BoxedInstance, class: Arc<ClassDescriptor>) -> Self {
        Self {
            value,
            class: Some(class),
        }
    }

    /// Wraps a caller-supplied instance that the pipeline must not dispose.
    #[must_use]
    pub fn supplied<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            class: None,
        }
    }

    /// Borrows the instance as `Any`.
    pub fn as_any_mut(&mut self) -> &mut (dyn Any + Send + Sync) {
        &mut *self.value
    }

    /// Downcasts to a `T` reference.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl Drop for HandlerInstance {
    fn drop(&mut self) {
        let Some(class) = &self.class else {
            return;
        };
        if !class.has_dispose() {
            return;
        }
        let value = &mut *self.value;
        if let Err(e) = catch_unwind(AssertUnwindSafe(|| class.dispose(value))) {
            warn!(handler = class.type_key().name(), "Dispose hook panicked: {:?}", e);
        }
    }
}

impl fmt::Debug for HandlerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInstance")
            .field("class", &self.class.as_ref().map(|c| c.type_key().name()))
            .finish_non_exhaustive()
    }
}

/// Produces an instance of the class: from the resolver first, then through
/// its construction strategy.
pub fn resolve_instance(
    resolver: &Arc<dyn Resolver>,
    class: &Arc<ClassDescriptor>,
) -> Option<HandlerInstance> {
    let key = class.type_key();

    if let Some(value) = resolver.resolve(&key) {
        let resolved: &(dyn Any + Send + Sync) = &*value;
        if resolved.type_id() == key.id() {
            debug!(handler = key.name(), "Resolved handler instance");
            return Some(HandlerInstance::new(value, Arc::clone(class)));
        }
        warn!(handler = key.name(), "Resolver returned a value of another type");
    }

    let deps = Dependencies::new(Arc::clone(resolver));
    class
        .construction()
        .construct(&key, &deps)
        .map(|value| {
            debug!(handler = key.name(), "Constructed handler instance");
            HandlerInstance::new(value, Arc::clone(class))
        })
}
