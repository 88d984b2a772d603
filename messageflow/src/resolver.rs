//! Object resolution used to build handler instances and their dependencies.
//!
//! The engine never constructs services on its own. Whatever the host
//! application uses for dependency injection is plugged in through the
//! [`Resolver`] trait.

use crate::core::TypeKey;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Produces an instance for a requested type, or nothing.
pub trait Resolver: Send + Sync {
    /// Resolves an instance of the keyed type.
    ///
    /// The returned box must hold a value of exactly that type.
    fn resolve(&self, key: &TypeKey) -> Option<Box<dyn Any + Send + Sync>>;
}

impl dyn Resolver {
    /// Resolves and downcasts a `T`.
    #[must_use]
    pub fn resolve_as<T: Any>(&self) -> Option<T> {
        self.resolve(&TypeKey::of::<T>())?
            .downcast::<T>()
            .ok()
            .map(|value| *value)
    }
}

/// A resolver that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl Resolver for NullResolver {
    fn resolve(&self, _key: &TypeKey) -> Option<Box<dyn Any + Send + Sync>> {
        None
    }
}

/// A resolver backed by a closure.
pub struct FnResolver<F> {
    resolve: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&TypeKey) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync,
{
    /// Wraps a resolution closure.
    #[must_use]
    pub fn new(resolve: F) -> Self {
        Self { resolve }
    }
}

impl<F> Resolver for FnResolver<F>
where
    F: Fn(&TypeKey) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync,
{
    fn resolve(&self, key: &TypeKey) -> Option<Box<dyn Any + Send + Sync>> {
        (self.resolve)(key)
    }
}

/// Factory function type for creating services.
pub type ServiceFactory = Box<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// Registry of service factories keyed by type.
#[derive(Default)]
pub struct ServiceRegistry {
    factories: RwLock<HashMap<TypeId, (TypeKey, ServiceFactory)>>,
}

impl ServiceRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory producing a fresh `T` per resolution.
    pub fn register<T, F>(&self, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let boxed: ServiceFactory =
            Box::new(move || Box::new(factory()) as Box<dyn Any + Send + Sync>);
        self.factories.write().insert(key.id(), (key, boxed));
    }

    /// Registers a value that is cloned on every resolution.
    ///
    /// Share state by registering an `Arc`.
    pub fn register_instance<T>(&self, instance: T)
    where
        T: Any + Clone + Send + Sync,
    {
        self.register(move || instance.clone());
    }

    /// Returns true if the type has a factory.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.factories.read().contains_key(&TypeId::of::<T>())
    }

    /// Lists the names of registered types.
    pub fn registered_types(&self) -> Vec<&'static str> {
        self.factories.read().values().map(|(key, _)| key.name()).collect()
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }

    /// Converts into a shared resolver.
    #[must_use]
    pub fn into_resolver(self) -> Arc<dyn Resolver> {
        Arc::new(self)
    }
}

impl Resolver for ServiceRegistry {
    fn resolve(&self, key: &TypeKey) -> Option<Box<dyn Any + Send + Sync>> {
        let factories = self.factories.read();
        let resolved = factories.get(&key.id()).map(|(_, factory)| factory());
        trace!(service = key.name(), resolved = resolved.is_some(), "Resolving service");
        resolved
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Clock(u64);

    #[test]
    fn test_null_resolver() {
        let resolver: &dyn Resolver = &NullResolver;
        assert!(resolver.resolve_as::<Clock>().is_none());
    }

    #[test]
    fn test_fn_resolver() {
        let resolver = FnResolver::new(|key: &TypeKey| {
            (*key == TypeKey::of::<Clock>())
                .then(|| Box::new(Clock(7)) as Box<dyn Any + Send + Sync>)
        });
        let resolver: &dyn Resolver = &resolver;

        assert_eq!(resolver.resolve_as::<Clock>(), Some(Clock(7)));
        assert!(resolver.resolve_as::<String>().is_none());
    }

    #[test]
    fn test_service_registry() {
        let registry = ServiceRegistry::new();
        assert!(registry.is_empty());

        registry.register(|| Clock(1));
        registry.register_instance("postgres://".to_string());

        assert!(registry.contains::<Clock>());
        assert_eq!(registry.len(), 2);

        let resolver = registry.into_resolver();
        assert_eq!(resolver.resolve_as::<Clock>(), Some(Clock(1)));
        assert_eq!(resolver.resolve_as::<String>().as_deref(), Some("postgres://"));
        assert!(resolver.resolve_as::<u8>().is_none());
    }

    #[test]
    fn test_registry_replaces_factory() {
        let registry = ServiceRegistry::new();
        registry.register(|| Clock(1));
        registry.register(|| Clock(2));

        let resolver: &dyn Resolver = &registry;
        assert_eq!(resolver.resolve_as::<Clock>(), Some(Clock(2)));
    }
}
