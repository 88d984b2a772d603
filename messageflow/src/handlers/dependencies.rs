//! Parameter resolution for handler methods and constructors.

use crate::errors::DependencyError;
use crate::resolver::Resolver;
use std::any::Any;
use std::sync::Arc;

/// Resolves the extra parameters a handler asks for.
///
/// Handlers receive their message plus a `Dependencies` handle and pull
/// anything else from it by type.
#[derive(Clone)]
pub struct Dependencies {
    resolver: Arc<dyn Resolver>,
    enabled: bool,
}

impl Dependencies {
    /// Creates an enabled handle over the resolver.
    #[must_use]
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            enabled: true,
        }
    }

    /// Enables or disables parameter resolution.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if parameters may be resolved.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the underlying resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    /// Resolves a `T`.
    pub fn get<T: Any>(&self) -> anyhow::Result<T> {
        let type_name = std::any::type_name::<T>().to_string();
        if !self.enabled {
            return Err(DependencyError::Disabled { type_name }.into());
        }
        self.resolver
            .resolve_as::<T>()
            .ok_or_else(|| DependencyError::Unresolved { type_name }.into())
    }

    /// Resolves a `T`, or nothing when unavailable.
    #[must_use]
    pub fn try_get<T: Any>(&self) -> Option<T> {
        if self.enabled {
            self.resolver.resolve_as::<T>()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ServiceRegistry;

    fn registry() -> Arc<dyn Resolver> {
        let registry = ServiceRegistry::new();
        registry.register_instance(42_u32);
        registry.into_resolver()
    }

    #[test]
    fn test_get_resolves() {
        let deps = Dependencies::new(registry());
        assert_eq!(deps.get::<u32>().unwrap(), 42);
        assert_eq!(deps.try_get::<u32>(), Some(42));
    }

    #[test]
    fn test_get_unresolved() {
        let deps = Dependencies::new(registry());
        let err = deps.get::<String>().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DependencyError>(),
            Some(DependencyError::Unresolved { .. })
        ));
    }

    #[test]
    fn test_disabled() {
        let deps = Dependencies::new(registry()).with_enabled(false);
        assert!(!deps.is_enabled());
        assert!(deps.try_get::<u32>().is_none());
        assert!(matches!(
            deps.get::<u32>().unwrap_err().downcast_ref::<DependencyError>(),
            Some(DependencyError::Disabled { .. })
        ));
    }
}
