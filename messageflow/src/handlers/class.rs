//! Handler classes, their construction strategy and the modules that group them.

use super::method::{AsyncInvoker, HandlerMethod, Invoke, SelfAsyncInvoker, SelfInvoker, SyncInvoker};
use super::Dependencies;
use crate::core::{Payload, TypeKey};
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// A type-erased handler object.
pub type BoxedInstance = Box<dyn Any + Send + Sync>;

type DefaultCtor = Box<dyn Fn() -> BoxedInstance + Send + Sync>;
type ParamCtor = Box<dyn Fn(&Dependencies) -> anyhow::Result<BoxedInstance> + Send + Sync>;
type FillFn = Box<dyn Fn(&mut (dyn Any + Send + Sync), &Dependencies) -> anyhow::Result<()> + Send + Sync>;
type DisposeFn = Box<dyn Fn(&mut (dyn Any + Send + Sync)) + Send + Sync>;

/// Best-effort construction used when the resolver has no instance.
///
/// The parameterless constructor wins over the parametrised one. A
/// constructed instance then gets its properties filled; fill failures are
/// logged and ignored.
#[derive(Default)]
pub struct Construction {
    default_ctor: Option<DefaultCtor>,
    param_ctor: Option<ParamCtor>,
    fill: Option<FillFn>,
}

impl Construction {
    /// Returns true if any constructor is available.
    #[must_use]
    pub fn can_construct(&self) -> bool {
        self.default_ctor.is_some() || self.param_ctor.is_some()
    }

    /// Builds an instance of the keyed type, or nothing.
    pub fn construct(&self, key: &TypeKey, deps: &Dependencies) -> Option<BoxedInstance> {
        let mut instance = if let Some(ctor) = &self.default_ctor {
            ctor()
        } else {
            let ctor = self.param_ctor.as_ref()?;
            match ctor(deps) {
                Ok(instance) => instance,
                Err(e) => {
                    warn!(handler = key.name(), error = %e, "Constructor parameters could not be resolved");
                    return None;
                }
            }
        };

        if let Some(fill) = &self.fill {
            if let Err(e) = fill(&mut *instance, deps) {
                warn!(handler = key.name(), error = %e, "Property fill failed");
            }
        }
        Some(instance)
    }
}

/// Metadata and lifecycle hooks of a handler type.
pub struct ClassDescriptor {
    type_key: TypeKey,
    marked: bool,
    construction: Construction,
    dispose: Option<DisposeFn>,
}

impl ClassDescriptor {
    pub(crate) fn new(type_key: TypeKey) -> Self {
        Self {
            type_key,
            marked: false,
            construction: Construction::default(),
            dispose: None,
        }
    }

    /// Returns the type key.
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// Returns true if the class carries the handlers marker.
    #[must_use]
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Returns the construction strategy.
    #[must_use]
    pub fn construction(&self) -> &Construction {
        &self.construction
    }

    pub(crate) fn dispose(&self, instance: &mut (dyn Any + Send + Sync)) {
        if let Some(dispose) = &self.dispose {
            dispose(instance);
        }
    }

    pub(crate) fn has_dispose(&self) -> bool {
        self.dispose.is_some()
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("type", &self.type_key.name())
            .field("marked", &self.marked)
            .field("constructible", &self.construction.can_construct())
            .field("disposable", &self.has_dispose())
            .finish()
    }
}

struct MethodDraft {
    name: String,
    message: TypeKey,
    is_async: bool,
    self_handling: bool,
    invoker: Arc<dyn Invoke>,
}

/// A registered handler type with its handler methods.
#[derive(Debug, Clone)]
pub struct HandlerClass {
    descriptor: Arc<ClassDescriptor>,
    methods: Vec<Arc<HandlerMethod>>,
}

impl HandlerClass {
    /// Starts describing the handler type `H`.
    #[must_use]
    pub fn builder<H: Any + Send + Sync>() -> HandlerClassBuilder<H> {
        HandlerClassBuilder::new()
    }

    /// Returns the class descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.descriptor
    }

    /// Returns the type key.
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        self.descriptor.type_key()
    }

    /// Returns the declared methods.
    #[must_use]
    pub fn methods(&self) -> &[Arc<HandlerMethod>] {
        &self.methods
    }
}

/// Builder describing one handler type.
///
/// ```rust,ignore
/// let class = HandlerClass::builder::<OrderHandlers>()
///     .marked()
///     .construct_default()
///     .handle("HandleCreate", |h: &mut OrderHandlers, cmd: &mut CreateOrder, _: &Dependencies| {
///         h.create(cmd)
///     })
///     .build();
/// ```
#[must_use]
pub struct HandlerClassBuilder<H> {
    descriptor: ClassDescriptor,
    methods: Vec<MethodDraft>,
    _type: PhantomData<fn() -> H>,
}

impl<H: Any + Send + Sync> HandlerClassBuilder<H> {
    fn new() -> Self {
        Self {
            descriptor: ClassDescriptor::new(TypeKey::of::<H>()),
            methods: Vec::new(),
            _type: PhantomData,
        }
    }

    /// Marks the type as a handler class.
    pub fn marked(mut self) -> Self {
        self.descriptor.marked = true;
        self
    }

    fn method(
        mut self,
        name: &str,
        message: TypeKey,
        is_async: bool,
        self_handling: bool,
        invoker: Arc<dyn Invoke>,
    ) -> Self {
        self.methods.push(MethodDraft {
            name: name.to_string(),
            message,
            is_async,
            self_handling,
            invoker,
        });
        self
    }

    /// Declares a synchronous handler method for `M`.
    pub fn handle<M, R, F>(self, name: &str, f: F) -> Self
    where
        M: Payload,
        R: Payload,
        F: Fn(&mut H, &mut M, &Dependencies) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let invoker = Arc::new(SyncInvoker::<H, M, R, F>::new(f));
        self.method(name, TypeKey::of::<M>(), false, false, invoker)
    }

    /// Declares an asynchronous handler method for `M`.
    pub fn handle_async<M, R, F>(self, name: &str, f: F) -> Self
    where
        M: Payload,
        R: Payload,
        F: for<'a> Fn(&'a mut H, &'a mut M, &'a Dependencies) -> BoxFuture<'a, anyhow::Result<R>>
            + Send
            + Sync
            + 'static,
    {
        let invoker = Arc::new(AsyncInvoker::<H, M, R, F>::new(f));
        self.method(name, TypeKey::of::<M>(), true, false, invoker)
    }

    /// Declares a synchronous method on the message type itself.
    pub fn handle_self<R, F>(self, name: &str, f: F) -> Self
    where
        H: Payload,
        R: Payload,
        F: Fn(&mut H, &Dependencies) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let invoker = Arc::new(SelfInvoker::<H, R, F>::new(f));
        self.method(name, TypeKey::of::<H>(), false, true, invoker)
    }

    /// Declares an asynchronous method on the message type itself.
    pub fn handle_self_async<R, F>(self, name: &str, f: F) -> Self
    where
        H: Payload,
        R: Payload,
        F: for<'a> Fn(&'a mut H, &'a Dependencies) -> BoxFuture<'a, anyhow::Result<R>>
            + Send
            + Sync
            + 'static,
    {
        let invoker = Arc::new(SelfAsyncInvoker::<H, R, F>::new(f));
        self.method(name, TypeKey::of::<H>(), true, true, invoker)
    }

    /// Allows construction through `Default`.
    pub fn construct_default(mut self) -> Self
    where
        H: Default,
    {
        self.descriptor.construction.default_ctor =
            Some(Box::new(|| Box::new(H::default()) as BoxedInstance));
        self
    }

    /// Allows construction from resolved dependencies.
    pub fn construct_with<F>(mut self, ctor: F) -> Self
    where
        F: Fn(&Dependencies) -> anyhow::Result<H> + Send + Sync + 'static,
    {
        self.descriptor.construction.param_ctor = Some(Box::new(move |deps: &Dependencies| {
            ctor(deps).map(|instance| Box::new(instance) as BoxedInstance)
        }));
        self
    }

    /// Fills properties of a constructed instance from dependencies.
    pub fn fill_properties<F>(mut self, fill: F) -> Self
    where
        F: Fn(&mut H, &Dependencies) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.descriptor.construction.fill = Some(Box::new(
            move |instance: &mut (dyn Any + Send + Sync), deps: &Dependencies| match instance.downcast_mut::<H>() {
                Some(instance) => fill(instance, deps),
                None => Ok(()),
            },
        ));
        self
    }

    /// Releases resources when an instance is dropped by the pipeline.
    pub fn dispose_with<F>(mut self, dispose: F) -> Self
    where
        F: Fn(&mut H) + Send + Sync + 'static,
    {
        self.descriptor.dispose = Some(Box::new(move |instance: &mut (dyn Any + Send + Sync)| {
            if let Some(instance) = instance.downcast_mut::<H>() {
                dispose(instance);
            }
        }));
        self
    }

    /// Finishes the class.
    pub fn build(self) -> HandlerClass {
        let descriptor = Arc::new(self.descriptor);
        let methods = self
            .methods
            .into_iter()
            .map(|draft| {
                Arc::new(HandlerMethod::new(
                    draft.name,
                    draft.message,
                    draft.is_async,
                    draft.self_handling,
                    Arc::clone(&descriptor),
                    draft.invoker,
                ))
            })
            .collect();
        HandlerClass { descriptor, methods }
    }
}

impl<H: Any + Send + Sync> From<HandlerClassBuilder<H>> for HandlerClass {
    fn from(builder: HandlerClassBuilder<H>) -> Self {
        builder.build()
    }
}

/// A named group of handler classes: the surface the locator scans.
#[derive(Debug, Clone)]
pub struct HandlerModule {
    name: String,
    classes: Vec<HandlerClass>,
}

impl HandlerModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    /// Adds a class.
    #[must_use]
    pub fn with_class(mut self, class: impl Into<HandlerClass>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Adds a class in place.
    pub fn add_class(&mut self, class: impl Into<HandlerClass>) {
        self.classes.push(class.into());
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the classes.
    #[must_use]
    pub fn classes(&self) -> &[HandlerClass] {
        &self.classes
    }
}
