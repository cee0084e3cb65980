//! Binding descriptors
//!
//! A binding describes how the injector produces the value registered under a
//! name. Bindings are plain data: the erased build functions are monomorphized
//! at registration time and only run when the injector resolves the name.

use crate::component::{Component, Instance, Provider};
use crate::interceptor::Interceptor;
use crate::{Injector, Marker, Result};
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle of a class binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    /// New instance created on every resolve
    #[default]
    Transient,

    /// Created on first resolve, then shared for the injector's lifetime
    Singleton,

    /// Like `Singleton`, but resolved while the injector is being built
    EagerSingleton,
}

impl Lifecycle {
    /// Whether resolved instances are cached by the owning injector
    #[inline]
    pub fn is_cached(self) -> bool {
        !matches!(self, Lifecycle::Transient)
    }
}

/// Discriminant of a [`Binding`], handy for `find` predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Class,
    Instance,
    Provider,
    Template,
    Injector,
}

type BuildFn = fn(&Injector, Option<&str>) -> Result<Instance>;

/// Type-erased reference to a component type
#[derive(Clone, Copy)]
pub struct ClassRef {
    type_name: &'static str,
    build: BuildFn,
}

impl ClassRef {
    /// Reference a component that is built by injecting it
    #[inline]
    pub fn of<T: Component>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            build: build_component::<T>,
        }
    }

    /// Reference a provider: injected, then asked to `provide()` the value
    #[inline]
    pub fn provider<P: Provider>() -> Self {
        Self {
            type_name: std::any::type_name::<P>(),
            build: build_provided::<P>,
        }
    }

    /// Name of the referenced type, for diagnostics
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Build a value under `binding_name` using `injector`
    #[inline]
    pub(crate) fn build(&self, injector: &Injector, binding_name: Option<&str>) -> Result<Instance> {
        (self.build)(injector, binding_name)
    }
}

impl std::fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClassRef").field(&self.type_name).finish()
    }
}

fn build_component<T: Component>(injector: &Injector, binding_name: Option<&str>) -> Result<Instance> {
    Ok(injector.inject_as_binding::<T>(binding_name)? as Instance)
}

fn build_provided<P: Provider>(injector: &Injector, binding_name: Option<&str>) -> Result<Instance> {
    let provider = injector.inject_as_binding::<P>(binding_name)?;
    Ok(Arc::new(provider.provide()?) as Instance)
}

/// How the injector produces the value bound to a name
#[derive(Clone)]
pub enum Binding {
    /// Inject the referenced component
    Class { class: ClassRef, lifecycle: Lifecycle },
    /// Hand out a pre-built value
    Instance(Instance),
    /// Inject the provider and return what it provides, uncached
    Provider(ClassRef),
    /// Inject the component, shared per dynamic alias
    Template(ClassRef),
    /// The owning injector itself
    Injector,
}

impl Binding {
    /// Transient class binding for `T`
    #[inline]
    pub fn class<T: Component>() -> Self {
        Binding::Class {
            class: ClassRef::of::<T>(),
            lifecycle: Lifecycle::Transient,
        }
    }

    /// Instance binding for an owned value
    #[inline]
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        Binding::Instance(Arc::new(value))
    }

    #[inline]
    pub fn kind(&self) -> BindingKind {
        match self {
            Binding::Class { .. } => BindingKind::Class,
            Binding::Instance(_) => BindingKind::Instance,
            Binding::Provider(_) => BindingKind::Provider,
            Binding::Template(_) => BindingKind::Template,
            Binding::Injector => BindingKind::Injector,
        }
    }

    /// Lifecycle of class bindings, `None` for every other kind
    #[inline]
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        match self {
            Binding::Class { lifecycle, .. } => Some(*lifecycle),
            _ => None,
        }
    }

    #[inline]
    pub fn is_eager(&self) -> bool {
        self.lifecycle() == Some(Lifecycle::EagerSingleton)
    }

    /// Name of the type this binding builds, if it builds one
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Binding::Class { class, .. } | Binding::Provider(class) | Binding::Template(class) => {
                Some(class.type_name())
            }
            Binding::Instance(_) | Binding::Injector => None,
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Class { class, lifecycle } => f
                .debug_struct("Class")
                .field("class", class)
                .field("lifecycle", lifecycle)
                .finish(),
            Binding::Instance(_) => f.write_str("Instance(..)"),
            Binding::Provider(class) => f.debug_tuple("Provider").field(class).finish(),
            Binding::Template(class) => f.debug_tuple("Template").field(class).finish(),
            Binding::Injector => f.write_str("Injector"),
        }
    }
}

type BuildInterceptorFn = fn(&Injector) -> Result<Arc<dyn Interceptor>>;

/// Registration of an interceptor under a capability marker
#[derive(Clone)]
pub struct InterceptorBinding {
    pub(crate) marker: Marker,
    pub(crate) type_name: &'static str,
    pub(crate) build: BuildInterceptorFn,
    pub(crate) singleton: bool,
}

impl InterceptorBinding {
    #[inline]
    pub(crate) fn of<P: Component + Interceptor>(marker: Marker) -> Self {
        Self {
            marker,
            type_name: std::any::type_name::<P>(),
            build: build_interceptor::<P>,
            singleton: false,
        }
    }

    #[inline]
    pub fn marker(&self) -> Marker {
        self.marker
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }
}

impl std::fmt::Debug for InterceptorBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorBinding")
            .field("marker", &self.marker)
            .field("proxy", &self.type_name)
            .field("singleton", &self.singleton)
            .finish()
    }
}

fn build_interceptor<P: Component + Interceptor>(injector: &Injector) -> Result<Arc<dyn Interceptor>> {
    Ok(injector.inject::<P>()? as Arc<dyn Interceptor>)
}

/// Insertion-ordered map from binding name to binding.
///
/// Re-inserting an existing name replaces the binding in place, so iteration
/// order is the order in which names were first registered.
#[derive(Clone, Default)]
pub struct BindingMap {
    entries: Vec<(String, Binding)>,
    index: HashMap<String, usize, RandomState>,
}

impl BindingMap {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a binding
    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&slot) => self.entries[slot].1 = binding,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, binding));
            }
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.index.get(name).map(|&slot| &self.entries[slot].1)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.index.get(name).map(|&slot| &mut self.entries[slot].1)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterate in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(name, binding)| (name.as_str(), binding))
    }

    /// Binding names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Shallow merge: entries of `other` overwrite entries of `self`
    pub fn extend(&mut self, other: BindingMap) {
        for (name, binding) in other.entries {
            self.insert(name, binding);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for BindingMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
