//! Handler discovery over registered handler modules.
//!
//! Modules are scanned once, on first use, into a catalog keyed by message
//! type. Per-message-type lookups are then memoised.

use super::{HandlerClass, HandlerMethod, HandlerModule};
use crate::core::TypeKey;
use crate::errors::PipelineError;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Type names ending with this are handler classes under
/// [`HandlerSearchMethod::NameSuffix`].
pub const HANDLERS_SUFFIX: &str = "Handlers";

/// Handler method names start with this.
pub const HANDLE_PREFIX: &str = "Handle";

/// How handler classes are recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerSearchMethod {
    /// Classes built with [`marked`](super::HandlerClassBuilder::marked).
    #[default]
    Marker,
    /// Classes whose type name ends with [`HANDLERS_SUFFIX`].
    NameSuffix,
}

/// The handlers found for one message type.
#[derive(Debug, Clone, Default)]
pub struct LocatedHandlers {
    /// Methods of handler classes taking the message, in module order.
    pub matches: Vec<Arc<HandlerMethod>>,
    /// The message type's own handle method.
    pub self_handler: Option<Arc<HandlerMethod>>,
}

impl LocatedHandlers {
    /// Returns the command handler: first match, else the self handler.
    #[must_use]
    pub fn first(&self) -> Option<&Arc<HandlerMethod>> {
        self.matches.first().or(self.self_handler.as_ref())
    }

    /// Returns every match followed by the self handler.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<HandlerMethod>> {
        self.matches
            .iter()
            .chain(self.self_handler.iter())
            .cloned()
            .collect()
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.self_handler.is_none()
    }
}

#[derive(Debug, Default)]
struct HandlerCatalog {
    by_message: HashMap<TypeId, Vec<Arc<HandlerMethod>>>,
    self_handlers: HashMap<TypeId, Arc<HandlerMethod>>,
}

/// Finds handler methods for message types.
pub struct HandlerLocator {
    modules: Vec<HandlerModule>,
    search_method: HandlerSearchMethod,
    catalog: RwLock<Option<Arc<HandlerCatalog>>>,
    cache: DashMap<TypeId, Arc<LocatedHandlers>>,
    scan_count: AtomicUsize,
}

impl HandlerLocator {
    /// Creates a locator over the modules.
    ///
    /// Fails if no module is given.
    pub fn new(
        modules: Vec<HandlerModule>,
        search_method: HandlerSearchMethod,
    ) -> Result<Self, PipelineError> {
        if modules.is_empty() {
            return Err(PipelineError::configuration(
                "handler locator needs at least one module to scan",
            ));
        }
        Ok(Self {
            modules,
            search_method,
            catalog: RwLock::new(None),
            cache: DashMap::new(),
            scan_count: AtomicUsize::new(0),
        })
    }

    /// Returns the search method.
    #[must_use]
    pub fn search_method(&self) -> HandlerSearchMethod {
        self.search_method
    }

    /// Returns the scanned modules.
    #[must_use]
    pub fn modules(&self) -> &[HandlerModule] {
        &self.modules
    }

    /// Returns how many times the modules were scanned.
    #[must_use]
    pub fn scan_count(&self) -> usize {
        self.scan_count.load(Ordering::SeqCst)
    }

    /// Returns the number of memoised message types.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Returns the handlers for a message type.
    pub fn locate(&self, message: &TypeKey) -> Arc<LocatedHandlers> {
        if let Some(hit) = self.cache.get(&message.id()) {
            return Arc::clone(&hit);
        }

        let catalog = self.catalog();
        let located = Arc::new(LocatedHandlers {
            matches: catalog
                .by_message
                .get(&message.id())
                .cloned()
                .unwrap_or_default(),
            self_handler: catalog.self_handlers.get(&message.id()).cloned(),
        });
        debug!(
            message = message.name(),
            matches = located.matches.len(),
            self_handling = located.self_handler.is_some(),
            "Located handlers"
        );
        Arc::clone(self.cache.entry(message.id()).or_insert(located).value())
    }

    /// Returns the single handler of a command.
    pub fn find_command_handler(&self, message: &TypeKey) -> Option<Arc<HandlerMethod>> {
        self.locate(message).first().cloned()
    }

    /// Returns every handler of an event.
    pub fn find_event_handlers(&self, message: &TypeKey) -> Vec<Arc<HandlerMethod>> {
        self.locate(message).all()
    }

    fn catalog(&self) -> Arc<HandlerCatalog> {
        if let Some(catalog) = self.catalog.read().as_ref() {
            return Arc::clone(catalog);
        }

        let mut slot = self.catalog.write();
        if let Some(catalog) = slot.as_ref() {
            return Arc::clone(catalog);
        }
        let catalog = Arc::new(self.scan());
        *slot = Some(Arc::clone(&catalog));
        catalog
    }

    fn is_handler_class(&self, class: &HandlerClass) -> bool {
        match self.search_method {
            HandlerSearchMethod::Marker => class.descriptor().is_marked(),
            HandlerSearchMethod::NameSuffix => class.type_key().short_name().ends_with(HANDLERS_SUFFIX),
        }
    }

    fn scan(&self) -> HandlerCatalog {
        self.scan_count.fetch_add(1, Ordering::SeqCst);
        let mut catalog = HandlerCatalog::default();

        for module in &self.modules {
            for class in module.classes() {
                let handler_class = self.is_handler_class(class);
                for method in class.methods() {
                    if !method.name().starts_with(HANDLE_PREFIX) {
                        continue;
                    }
                    let message = method.message_type().id();
                    if method.is_self_handling() {
                        catalog
                            .self_handlers
                            .entry(message)
                            .or_insert_with(|| Arc::clone(method));
                    } else if handler_class {
                        catalog
                            .by_message
                            .entry(message)
                            .or_default()
                            .push(Arc::clone(method));
                    }
                }
            }
        }

        info!(
            modules = self.modules.len(),
            message_types = catalog.by_message.len(),
            self_handling = catalog.self_handlers.len(),
            "Scanned handler modules"
        );
        catalog
    }
}

impl std::fmt::Debug for HandlerLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerLocator")
            .field("modules", &self.modules.iter().map(HandlerModule::name).collect::<Vec<_>>())
            .field("search_method", &self.search_method)
            .field("scan_count", &self.scan_count())
            .field("cache_len", &self.cache_len())
            .finish()
    }
}
