//! Registration of query types and their methods.

use super::method::{AsyncQueryInvoker, QueryInvoker};
use super::{Arguments, QueryArguments, QueryMethod};
use crate::core::{Payload, TypeKey};
use crate::errors::PipelineError;
use crate::handlers::{ClassDescriptor, HandlerClass, HandlerClassBuilder, HandlerMethod, Invoke};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Normalize = Arc<dyn Fn(&QueryArguments) -> Result<QueryArguments, PipelineError> + Send + Sync>;

/// A registered method as seen by the raw invocation path.
#[derive(Clone)]
pub struct QueryEntry {
    method: Arc<HandlerMethod>,
    content_type: Arc<str>,
    params: Arc<[&'static str]>,
    normalize: Normalize,
}

impl QueryEntry {
    /// Returns the handler method.
    #[must_use]
    pub fn method(&self) -> &Arc<HandlerMethod> {
        &self.method
    }

    /// Returns the full content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the parameter names.
    #[must_use]
    pub fn parameter_names(&self) -> &[&'static str] {
        &self.params
    }

    /// Converts raw arguments to the canonical values of each parameter.
    ///
    /// # Errors
    ///
    /// Returns `ArgumentConversion` for a value that does not fit.
    pub fn normalize(&self, args: &QueryArguments) -> Result<QueryArguments, PipelineError> {
        (self.normalize)(args)
    }
}

impl fmt::Debug for QueryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEntry")
            .field("content_type", &self.content_type)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Query types and methods known to a query pipeline.
///
/// Methods are addressed by the content type
/// `"{type_name::<Q>()}.{method}"`. A short `"Type.Method"` alias is
/// accepted too, as long as it is unambiguous.
#[derive(Default)]
pub struct QueryRegistry {
    classes: RwLock<HashMap<TypeId, Arc<ClassDescriptor>>>,
    entries: RwLock<BTreeMap<String, QueryEntry>>,
    aliases: RwLock<HashMap<String, Option<String>>>,
}

impl QueryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers how instances of `Q` are constructed and disposed.
    ///
    /// Must be called before any method of `Q` is registered. The builder
    /// must not declare handler methods.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `Q` is already known or the builder
    /// declares methods.
    pub fn register_type<Q: Any + Send + Sync>(&self, class: HandlerClassBuilder<Q>) -> Result<(), PipelineError> {
        let class = class.build();
        if !class.methods().is_empty() {
            return Err(PipelineError::configuration(format!(
                "query type {} must register its methods through the registry",
                class.type_key().short_name()
            )));
        }

        let mut classes = self.classes.write();
        if classes.contains_key(&TypeId::of::<Q>()) {
            return Err(PipelineError::configuration(format!(
                "query type {} is already registered",
                class.type_key().short_name()
            )));
        }
        classes.insert(TypeId::of::<Q>(), Arc::clone(class.descriptor()));
        Ok(())
    }

    /// Registers `Q` with construction through `Default`.
    ///
    /// # Errors
    ///
    /// See [`register_type`](Self::register_type).
    pub fn register_default<Q: Any + Send + Sync + Default>(&self) -> Result<(), PipelineError> {
        self.register_type(HandlerClass::builder::<Q>().construct_default())
    }

    /// Registers a synchronous query method.
    ///
    /// `params` names the arguments in order; its length must match the
    /// arity of `A`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` on an arity mismatch or a duplicate method.
    pub fn register_method<Q, A, R, F>(
        &self,
        name: &str,
        params: &[&'static str],
        f: F,
    ) -> Result<QueryMethod<Q, A, R>, PipelineError>
    where
        Q: Any + Send + Sync,
        A: Arguments,
        R: Payload,
        F: Fn(&Q, A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let params: Arc<[&'static str]> = params.into();
        let invoker = Arc::new(QueryInvoker::<Q, A, R, F>::new(f, Arc::clone(&params)));
        self.insert::<Q, A, R>(name, params, false, invoker)
    }

    /// Registers an asynchronous query method.
    ///
    /// # Errors
    ///
    /// See [`register_method`](Self::register_method).
    pub fn register_async_method<Q, A, R, F>(
        &self,
        name: &str,
        params: &[&'static str],
        f: F,
    ) -> Result<QueryMethod<Q, A, R>, PipelineError>
    where
        Q: Any + Send + Sync,
        A: Arguments,
        R: Payload,
        F: for<'a> Fn(&'a Q, A) -> BoxFuture<'a, anyhow::Result<R>> + Send + Sync + 'static,
    {
        let params: Arc<[&'static str]> = params.into();
        let invoker = Arc::new(AsyncQueryInvoker::<Q, A, R, F>::new(f, Arc::clone(&params)));
        self.insert::<Q, A, R>(name, params, true, invoker)
    }

    fn insert<Q, A, R>(
        &self,
        name: &str,
        params: Arc<[&'static str]>,
        is_async: bool,
        invoker: Arc<dyn Invoke>,
    ) -> Result<QueryMethod<Q, A, R>, PipelineError>
    where
        Q: Any + Send + Sync,
        A: Arguments,
    {
        let key = TypeKey::of::<Q>();
        if params.len() != A::ARITY {
            return Err(PipelineError::configuration(format!(
                "{}.{name} declares {} parameter names for {} arguments",
                key.short_name(),
                params.len(),
                A::ARITY
            )));
        }
        if let Some(dup) = params.iter().enumerate().find(|&(i, p)| params[..i].contains(p)) {
            return Err(PipelineError::configuration(format!(
                "{}.{name} repeats parameter '{}'",
                key.short_name(),
                dup.1
            )));
        }

        let content_type = format!("{}.{name}", key.name());
        let mut entries = self.entries.write();
        if entries.contains_key(&content_type) {
            return Err(PipelineError::configuration(format!(
                "query method {content_type} is already registered"
            )));
        }

        let class = Arc::clone(
            self.classes
                .write()
                .entry(TypeId::of::<Q>())
                .or_insert_with(|| Arc::new(ClassDescriptor::new(key))),
        );
        let method = Arc::new(HandlerMethod::new(
            name,
            TypeKey::of::<QueryArguments>(),
            is_async,
            false,
            class,
            invoker,
        ));

        let normalize_params = Arc::clone(&params);
        let normalize: Normalize = Arc::new(move |args: &QueryArguments| {
            A::from_named(args, &normalize_params)?.into_named(&normalize_params)
        });

        let content_type: Arc<str> = content_type.into();
        entries.insert(
            content_type.to_string(),
            QueryEntry {
                method: Arc::clone(&method),
                content_type: Arc::clone(&content_type),
                params: Arc::clone(&params),
                normalize,
            },
        );
        drop(entries);

        self.aliases
            .write()
            .entry(format!("{}.{name}", key.short_name()))
            .and_modify(|existing| *existing = None)
            .or_insert_with(|| Some(content_type.to_string()));

        debug!(content_type = %content_type, arity = A::ARITY, is_async, "Query method registered");
        Ok(QueryMethod::new(method, content_type, params))
    }

    /// Looks a method up by full content type or unambiguous short alias.
    #[must_use]
    pub fn lookup(&self, content_type: &str) -> Option<QueryEntry> {
        let entries = self.entries.read();
        if let Some(entry) = entries.get(content_type) {
            return Some(entry.clone());
        }
        let aliases = self.aliases.read();
        let full = aliases.get(content_type)?.as_deref()?;
        entries.get(full).cloned()
    }

    /// Returns the registered content types in sorted order.
    #[must_use]
    pub fn content_types(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no method is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRegistry")
            .field("methods", &self.content_types())
            .finish()
    }
}
