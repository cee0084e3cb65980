//! Modules and the binding DSL
//!
//! A [`Module`] declares bindings on a [`Binder`]. The injector runs each
//! module's `configure` exactly once and merges the results, later modules
//! overwriting earlier ones.
//!
//! ```rust
//! use dependency_weaver::{Args, Binder, Component, Module, Result};
//!
//! struct Database;
//!
//! impl Component for Database {
//!     fn construct(_: Args) -> Result<Self> {
//!         Ok(Database)
//!     }
//! }
//!
//! struct StorageModule;
//!
//! impl Module for StorageModule {
//!     fn configure(&self, binder: &mut Binder) {
//!         binder.bind("database").to::<Database>().as_singleton();
//!         binder.bind("pool_size").to_instance(8usize);
//!     }
//! }
//!
//! let mut binder = Binder::new();
//! binder.mixin(&StorageModule);
//! assert!(binder.bindings().contains("database"));
//! ```

use crate::binding::{Binding, BindingMap, ClassRef, InterceptorBinding, Lifecycle};
use crate::component::{Component, Instance, Provider};
use crate::interceptor::Interceptor;
use crate::Marker;
use std::sync::Arc;

/// A unit of configuration
pub trait Module {
    /// Declare bindings, templates and interceptors
    fn configure(&self, binder: &mut Binder);
}

impl<F> Module for F
where
    F: Fn(&mut Binder),
{
    fn configure(&self, binder: &mut Binder) {
        self(binder)
    }
}

/// Registration target for one module's declarations
#[derive(Clone, Default)]
pub struct Binder {
    bindings: BindingMap,
    templates: BindingMap,
    interceptors: Vec<InterceptorBinding>,
}

impl Binder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a binding for `name`
    #[inline]
    pub fn bind(&mut self, name: impl Into<String>) -> BindingBuilder<'_> {
        BindingBuilder {
            bindings: &mut self.bindings,
            name: name.into(),
        }
    }

    /// Begin a template binding for `name`
    #[inline]
    pub fn template(&mut self, name: impl Into<String>) -> TemplateBuilder<'_> {
        TemplateBuilder {
            templates: &mut self.templates,
            name: name.into(),
        }
    }

    /// Begin an interceptor registration for `marker`
    #[inline]
    pub fn bind_interceptor(&mut self, marker: Marker) -> InterceptorBuilder<'_> {
        InterceptorBuilder {
            interceptors: &mut self.interceptors,
            marker,
        }
    }

    /// Run `module` and merge its declarations into this binder
    pub fn mixin(&mut self, module: &dyn Module) {
        let mut other = Binder::new();
        module.configure(&mut other);
        self.merge(other);
    }

    /// Shallow merge; entries of `other` win
    pub(crate) fn merge(&mut self, other: Binder) {
        self.bindings.extend(other.bindings);
        self.templates.extend(other.templates);
        for interceptor in other.interceptors {
            upsert_interceptor(&mut self.interceptors, interceptor);
        }
    }

    #[inline]
    pub fn bindings(&self) -> &BindingMap {
        &self.bindings
    }

    #[inline]
    pub fn templates(&self) -> &BindingMap {
        &self.templates
    }

    #[inline]
    pub fn interceptors(&self) -> &[InterceptorBinding] {
        &self.interceptors
    }

    pub(crate) fn into_parts(self) -> (BindingMap, BindingMap, Vec<InterceptorBinding>) {
        (self.bindings, self.templates, self.interceptors)
    }
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("bindings", &self.bindings)
            .field("templates", &self.templates)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

fn upsert_interceptor(interceptors: &mut Vec<InterceptorBinding>, binding: InterceptorBinding) {
    match interceptors.iter_mut().find(|i| i.marker == binding.marker) {
        Some(existing) => *existing = binding,
        None => interceptors.push(binding),
    }
}

/// Pending binding; pick how the value is produced
#[must_use = "a binding is only registered by one of its `to*` methods"]
pub struct BindingBuilder<'a> {
    bindings: &'a mut BindingMap,
    name: String,
}

impl<'a> BindingBuilder<'a> {
    /// Inject `T` on every resolution unless made a singleton
    pub fn to<T: Component>(self) -> ClassOptions<'a> {
        self.bindings.insert(self.name.clone(), Binding::class::<T>());
        ClassOptions {
            bindings: self.bindings,
            name: self.name,
        }
    }

    /// Hand out `value` as is
    pub fn to_instance<T: Send + Sync + 'static>(self, value: T) {
        self.bindings.insert(self.name, Binding::instance(value));
    }

    /// Hand out an already shared value
    pub fn to_arc<T: Send + Sync + 'static>(self, value: Arc<T>) {
        self.bindings
            .insert(self.name, Binding::Instance(value as Instance));
    }

    /// Inject provider `P` and hand out what it provides
    pub fn to_provider<P: Provider>(self) {
        self.bindings
            .insert(self.name, Binding::Provider(ClassRef::provider::<P>()));
    }
}

/// Lifecycle options of a class binding
pub struct ClassOptions<'a> {
    bindings: &'a mut BindingMap,
    name: String,
}

impl ClassOptions<'_> {
    /// Build once, on first resolution
    pub fn as_singleton(self) {
        self.set(Lifecycle::Singleton);
    }

    /// Build once, while the injector is constructed
    pub fn as_eager_singleton(self) {
        self.set(Lifecycle::EagerSingleton);
    }

    fn set(self, value: Lifecycle) {
        if let Some(Binding::Class { lifecycle, .. }) = self.bindings.get_mut(&self.name) {
            *lifecycle = value;
        }
    }
}

/// Pending template binding
#[must_use = "a template is only registered by `to`"]
pub struct TemplateBuilder<'a> {
    templates: &'a mut BindingMap,
    name: String,
}

impl TemplateBuilder<'_> {
    pub fn to<T: Component>(self) {
        self.templates
            .insert(self.name, Binding::Template(ClassRef::of::<T>()));
    }
}

/// Pending interceptor registration
#[must_use = "an interceptor is only registered by `to`"]
pub struct InterceptorBuilder<'a> {
    interceptors: &'a mut Vec<InterceptorBinding>,
    marker: Marker,
}

impl<'a> InterceptorBuilder<'a> {
    /// Weave `P` around every method a component exposes under the marker
    pub fn to<P: Component + Interceptor>(self) -> InterceptorOptions<'a> {
        upsert_interceptor(self.interceptors, InterceptorBinding::of::<P>(self.marker));
        InterceptorOptions {
            interceptors: self.interceptors,
            marker: self.marker,
        }
    }
}

/// Options of an interceptor registration
pub struct InterceptorOptions<'a> {
    interceptors: &'a mut Vec<InterceptorBinding>,
    marker: Marker,
}

impl InterceptorOptions<'_> {
    /// Share one proxy instance across all woven components of the injector
    pub fn as_singleton(self) {
        if let Some(binding) = self.interceptors.iter_mut().find(|i| i.marker == self.marker) {
            binding.singleton = true;
        }
    }
}
