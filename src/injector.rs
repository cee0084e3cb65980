//! The injector
//!
//! An `Injector` merges the declarations of a set of modules and builds fully
//! wired object graphs from them. Injectors form a parent chain: a child sees
//! its ancestors' bindings through the chain-walking lookups, never through
//! the `*_self` ones.

use crate::binding::{Binding, BindingMap, ClassRef, InterceptorBinding};
use crate::component::{downcast, Args, Component, Instance, Params, Resolved};
use crate::descriptor::{Descriptor, Request, Target};
use crate::interceptor::Interceptor;
use crate::module::{Binder, Module};
use crate::{DiError, Marker, Result};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::any::TypeId;
use std::cell::RefCell;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Name of the self-reference binding every injector carries
pub const INJECTOR_BINDING: &str = "injector";

// =============================================================================
// Slots
// =============================================================================

/// A resolved-at-most-once cell
type Slot<V> = Arc<OnceCell<V>>;

/// Concurrent map of lazily filled slots
type SlotMap<K, V> = DashMap<K, Slot<V>, RandomState>;

#[inline]
fn new_slot_map<K: Eq + Hash, V>() -> SlotMap<K, V> {
    DashMap::with_hasher(RandomState::new())
}

/// Fetch (or create) the slot for `key`. The map guard is released before the
/// caller initializes the cell, so initialization may re-enter the map.
#[inline]
fn slot<K: Eq + Hash, V>(map: &SlotMap<K, V>, key: K) -> Slot<V> {
    Arc::clone(&*map.entry(key).or_default())
}

// =============================================================================
// Cycle detection
// =============================================================================

thread_local! {
    /// (injector id, binding name) pairs currently being built on this thread
    static RESOLVING: RefCell<Vec<(u64, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a binding as under construction for the current thread
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(injector: u64, name: &str) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(id, n)| *id == injector && n == name) {
                return Err(DiError::circular(name));
            }
            stack.push((injector, name.to_owned()));
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Which thread fills which slot, and which slot each thread blocks on.
///
/// The thread-local stack only sees cycles within one thread. Two threads
/// filling `x` and `y` that need each other would block on each other's cell;
/// walking the owner/waiter chain before blocking turns that into an error.
#[derive(Default)]
struct InitTracker {
    owners: DashMap<String, ThreadId, RandomState>,
    waiting: DashMap<ThreadId, String, RandomState>,
}

impl InitTracker {
    /// Record that this thread is about to block on `key`
    fn wait_for(&self, key: &str) -> Result<WaitGuard<'_>> {
        let me = thread::current().id();
        self.waiting.insert(me, key.to_owned());
        let guard = WaitGuard {
            tracker: self,
            thread: me,
        };

        let mut next = key.to_owned();
        for _ in 0..=self.owners.len() {
            let Some(owner) = self.owners.get(&next).map(|owner| *owner) else {
                break;
            };
            if owner == me {
                return Err(DiError::circular(key));
            }
            let Some(waited) = self.waiting.get(&owner).map(|waited| waited.clone()) else {
                break;
            };
            next = waited;
        }
        Ok(guard)
    }

    /// Record that this thread is filling `key`
    fn own<'a>(&'a self, key: &'a str) -> OwnerGuard<'a> {
        let me = thread::current().id();
        self.waiting.remove(&me);
        self.owners.insert(key.to_owned(), me);
        OwnerGuard { tracker: self, key }
    }
}

struct WaitGuard<'a> {
    tracker: &'a InitTracker,
    thread: ThreadId,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.tracker.waiting.remove(&self.thread);
    }
}

struct OwnerGuard<'a> {
    tracker: &'a InitTracker,
    key: &'a str,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.tracker.owners.remove(self.key);
    }
}

// =============================================================================
// Injector
// =============================================================================

struct InjectorInner {
    id: u64,
    depth: u32,
    parent: Option<Injector>,
    bindings: BindingMap,
    templates: BindingMap,
    interceptors: Vec<InterceptorBinding>,
    /// Singleton instances, by binding name
    singletons: SlotMap<String, Instance>,
    /// Template instances, by dynamic alias
    aliases: SlotMap<String, Instance>,
    /// Singleton interceptor proxies, by marker
    proxies: SlotMap<Marker, Arc<dyn Interceptor>>,
    /// `inject_once` instances, by type
    once: SlotMap<TypeId, Instance>,
    descriptors: DashMap<TypeId, Arc<Descriptor>, RandomState>,
    tracker: InitTracker,
}

/// Resolver over the merged bindings of a set of modules.
///
/// Cloning is cheap and yields a handle to the same injector.
///
/// # Examples
///
/// ```rust
/// use dependency_weaver::{Args, Binder, Component, Injector, Result};
///
/// struct Clock;
///
/// impl Component for Clock {
///     fn construct(_: Args) -> Result<Self> {
///         Ok(Clock)
///     }
/// }
///
/// # fn main() -> Result<()> {
/// let injector = Injector::new(&[&|b: &mut Binder| {
///     b.bind("clock").to::<Clock>().as_singleton();
///     b.bind("zone").to_instance("UTC");
/// }])?;
///
/// let a = injector.get_as::<Clock>("clock")?.unwrap();
/// let b = injector.get_as::<Clock>("clock")?.unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// assert_eq!(injector.get_as::<&str>("zone")?.as_deref(), Some(&"UTC"));
/// assert!(injector.get("missing")?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

impl Injector {
    /// Create a root injector over `modules`.
    ///
    /// Runs every module once, registers the `"injector"` self-binding, then
    /// resolves every eager singleton in registration order.
    pub fn new(modules: &[&dyn Module]) -> Result<Self> {
        Self::build(modules, None)
    }

    /// Create a child injector over `modules` whose parent is `self`.
    pub fn create_child_injector(&self, modules: &[&dyn Module]) -> Result<Self> {
        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_weaver",
            parent_depth = self.inner.depth,
            child_depth = self.inner.depth + 1,
            parent_bindings = self.inner.bindings.len(),
            "Creating child injector"
        );

        Self::build(modules, Some(self.clone()))
    }

    fn build(modules: &[&dyn Module], parent: Option<Injector>) -> Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let mut merged = Binder::new();
        for module in modules {
            merged.mixin(*module);
        }
        let (mut bindings, templates, interceptors) = merged.into_parts();
        bindings.insert(INJECTOR_BINDING, Binding::Injector);

        let depth = parent.as_ref().map_or(0, |p| p.inner.depth + 1);

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_weaver",
            depth,
            modules = modules.len(),
            bindings = bindings.len(),
            templates = templates.len(),
            interceptors = interceptors.len(),
            "Creating injector"
        );

        let injector = Self {
            inner: Arc::new(InjectorInner {
                id: COUNTER.fetch_add(1, Ordering::Relaxed),
                depth,
                parent,
                bindings,
                templates,
                interceptors,
                singletons: new_slot_map(),
                aliases: new_slot_map(),
                proxies: new_slot_map(),
                once: new_slot_map(),
                descriptors: DashMap::with_hasher(RandomState::new()),
                tracker: InitTracker::default(),
            }),
        };

        injector.resolve_eager_singletons()?;
        Ok(injector)
    }

    fn resolve_eager_singletons(&self) -> Result<()> {
        for (name, binding) in self.inner.bindings.iter().filter(|(_, b)| b.is_eager()) {
            #[cfg(feature = "logging")]
            debug!(
                target: "dependency_weaver",
                binding = name,
                depth = self.inner.depth,
                "Resolving eager singleton"
            );

            self.resolve_binding(name, binding, None)?;
        }
        Ok(())
    }

    // =========================================================================
    // Graph resolution
    // =========================================================================

    /// Build a fully wired `T`.
    #[inline]
    pub fn inject<T: Component>(&self) -> Result<Arc<T>> {
        self.inject_with::<T>(&Params::new())
    }

    /// Build a fully wired `T`, consulting `params` after the injector's own
    /// bindings and templates for `T`'s requests.
    pub fn inject_with<T: Component>(&self, params: &Params) -> Result<Arc<T>> {
        self.inject_inner::<T>(None, params)
    }

    /// Build `T` on behalf of a binding (used by erased class references)
    #[inline]
    pub(crate) fn inject_as_binding<T: Component>(&self, binding_name: Option<&str>) -> Result<Arc<T>> {
        self.inject_inner::<T>(binding_name, &Params::new())
    }

    fn inject_inner<T: Component>(&self, binding_name: Option<&str>, params: &Params) -> Result<Arc<T>> {
        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_weaver",
            component = std::any::type_name::<T>(),
            binding = binding_name,
            depth = self.inner.depth,
            "Injecting component"
        );

        let descriptor = self.descriptor::<T>()?;
        let args = descriptor
            .constructor_requests()
            .iter()
            .map(|request| self.resolve_request(request, params))
            .collect::<Result<Vec<_>>>()?;

        let mut instance = T::construct(Args::new(args))?;
        self.wire(&mut instance, &descriptor, binding_name, params)?;
        Ok(Arc::new(instance))
    }

    /// Inject field-level requests into an existing instance, weave it and run
    /// its post-init hook.
    #[inline]
    pub fn inject_to_instance<T: Component>(&self, instance: &mut T) -> Result<()> {
        self.inject_to_instance_with(instance, &Params::new())
    }

    /// [`inject_to_instance`](Injector::inject_to_instance) with extra parameters
    pub fn inject_to_instance_with<T: Component>(&self, instance: &mut T, params: &Params) -> Result<()> {
        let descriptor = self.descriptor::<T>()?;
        self.wire(instance, &descriptor, None, params)
    }

    /// Build `T` once per injector; later calls return the first instance
    #[inline]
    pub fn inject_once<T: Component>(&self) -> Result<Arc<T>> {
        self.inject_once_with::<T>(&Params::new())
    }

    /// [`inject_once`](Injector::inject_once); `params` only matter on the first call
    pub fn inject_once_with<T: Component>(&self, params: &Params) -> Result<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        let cell = slot(&self.inner.once, TypeId::of::<T>());
        let instance = self.fill(&cell, type_name, || {
            self.inject_with::<T>(params).map(|arc| arc as Instance)
        })?;
        downcast::<T>(type_name, instance)
    }

    /// Field injection, weaving and post-init for a constructed instance
    fn wire<T: Component>(
        &self,
        instance: &mut T,
        descriptor: &Descriptor,
        binding_name: Option<&str>,
        params: &Params,
    ) -> Result<()> {
        for request in descriptor.field_requests() {
            let value = self.resolve_request(request, params)?;
            instance.assign(request.key(), value)?;
        }

        if !self.inner.interceptors.is_empty() {
            self.weave(instance, descriptor, binding_name)?;
        }

        instance.post_init()
    }

    /// Static descriptor of `T`, cached per injector
    fn descriptor<T: Component>(&self) -> Result<Arc<Descriptor>> {
        let type_id = TypeId::of::<T>();
        if let Some(descriptor) = self.inner.descriptors.get(&type_id) {
            return Ok(Arc::clone(descriptor.value()));
        }

        let descriptor = Arc::new(T::descriptor()?);
        self.inner.descriptors.insert(type_id, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    fn resolve_request(&self, request: &Request, params: &Params) -> Result<Resolved> {
        match request.target() {
            Target::Name(name) => Ok(Resolved::One {
                name: name.clone(),
                value: self.resolve_name(name, request.alias(), params)?,
            }),
            Target::Pattern(regex) => Ok(Resolved::Many {
                pattern: regex.as_str().to_owned(),
                values: self.resolve_pattern(regex, params)?,
            }),
        }
    }

    /// Bindings, then templates, then params; then the same at each ancestor.
    /// The first level with a hit wins. Nothing anywhere is `None`.
    fn resolve_name(&self, name: &str, alias: Option<&str>, params: &Params) -> Result<Option<Instance>> {
        let mut current = Some(self);
        while let Some(injector) = current {
            let inner = &injector.inner;
            if let Some(binding) = inner.bindings.get(name).or_else(|| inner.templates.get(name)) {
                return injector.resolve_binding(name, binding, alias).map(Some);
            }
            if let Some(value) = params.get(name) {
                return Ok(Some(Arc::clone(value)));
            }
            current = injector.parent();
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_weaver",
            binding = name,
            depth = self.inner.depth,
            "Binding not found in injector chain, resolving to None"
        );

        Ok(None)
    }

    /// Every matching binding at every level, then every matching param
    fn resolve_pattern(&self, regex: &Regex, params: &Params) -> Result<Vec<Instance>> {
        let mut values = Vec::new();

        let mut current = Some(self);
        while let Some(injector) = current {
            for (name, binding) in injector.inner.bindings.iter() {
                if regex.is_match(name) {
                    values.push(injector.resolve_binding(name, binding, None)?);
                }
            }
            current = injector.parent();
        }

        values.extend(
            params
                .iter()
                .filter(|(name, _)| regex.is_match(name))
                .map(|(_, value)| Arc::clone(value)),
        );

        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_weaver",
            pattern = regex.as_str(),
            matches = values.len(),
            "Resolved pattern request"
        );

        Ok(values)
    }

    /// Produce the value of a binding owned by this injector
    fn resolve_binding(&self, name: &str, binding: &Binding, alias: Option<&str>) -> Result<Instance> {
        match binding {
            Binding::Instance(value) => Ok(Arc::clone(value)),
            Binding::Injector => Ok(Arc::new(self.clone()) as Instance),
            Binding::Class { class, lifecycle } if lifecycle.is_cached() => {
                self.resolve_cached(&self.inner.singletons, name.to_owned(), name.to_owned(), name, class)
            }
            Binding::Class { class, .. } | Binding::Provider(class) => self.construct(name, class),
            Binding::Template(class) => match alias {
                Some(alias) => self.resolve_cached(
                    &self.inner.aliases,
                    alias.to_owned(),
                    format!("{name} as {alias}"),
                    name,
                    class,
                ),
                None => self.construct(name, class),
            },
        }
    }

    fn resolve_cached(
        &self,
        slots: &SlotMap<String, Instance>,
        key: String,
        label: String,
        name: &str,
        class: &ClassRef,
    ) -> Result<Instance> {
        let cell = slot(slots, key);
        if let Some(instance) = cell.get() {
            #[cfg(feature = "logging")]
            trace!(
                target: "dependency_weaver",
                binding = name,
                depth = self.inner.depth,
                "Returning cached instance"
            );
            return Ok(Arc::clone(instance));
        }

        self.fill(&cell, &label, || class.build(self, Some(name)))
    }

    /// Fill `cell` at most once. `label` names the slot in cycle errors.
    fn fill<V: Clone>(
        &self,
        cell: &OnceCell<V>,
        label: &str,
        init: impl FnOnce() -> Result<V>,
    ) -> Result<V> {
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }

        // Both checks run before touching the cell: a cycle would block on it
        let _guard = ResolutionGuard::enter(self.inner.id, label)?;
        let _waiting = self.inner.tracker.wait_for(label)?;
        cell.get_or_try_init(|| {
            let _owner = self.inner.tracker.own(label);
            init()
        })
        .cloned()
    }

    fn construct(&self, name: &str, class: &ClassRef) -> Result<Instance> {
        let _guard = ResolutionGuard::enter(self.inner.id, name)?;
        class.build(self, Some(name))
    }

    // =========================================================================
    // Weaving
    // =========================================================================

    fn weave<T: Component>(
        &self,
        instance: &mut T,
        descriptor: &Descriptor,
        binding_name: Option<&str>,
    ) -> Result<()> {
        let type_name = std::any::type_name::<T>();

        let mut plan = Vec::new();
        for (marker, pointcut) in descriptor.pointcuts() {
            let Some(binding) = self.interceptor_for(*marker) else {
                continue;
            };
            let methods = descriptor.methods_for(pointcut, type_name)?;
            if !methods.is_empty() {
                plan.push((binding, methods));
            }
        }
        if plan.is_empty() {
            return Ok(());
        }

        let joinpoints = instance
            .joinpoints()
            .ok_or(DiError::NotInterceptable { type_name })?;
        if joinpoints.is_woven() {
            return Ok(());
        }

        for (binding, methods) in plan {
            let proxy = self.proxy(binding)?;
            for method in methods {
                joinpoints.attach(method, Arc::clone(&proxy));
            }

            #[cfg(feature = "logging")]
            debug!(
                target: "dependency_weaver",
                component = type_name,
                marker = %binding.marker(),
                proxy = binding.type_name(),
                "Woven interceptor"
            );
        }
        joinpoints.seal(binding_name);
        Ok(())
    }

    /// Interceptor bound to `marker`; the last registration wins
    fn interceptor_for(&self, marker: Marker) -> Option<&InterceptorBinding> {
        self.inner.interceptors.iter().rev().find(|i| i.marker() == marker)
    }

    fn proxy(&self, binding: &InterceptorBinding) -> Result<Arc<dyn Interceptor>> {
        if !binding.is_singleton() {
            return (binding.build)(self);
        }
        let cell = slot(&self.inner.proxies, binding.marker());
        self.fill(&cell, binding.type_name(), || (binding.build)(self))
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Resolve `name` here, then in each ancestor, until one has it
    pub fn get(&self, name: &str) -> Result<Option<Instance>> {
        let mut current = Some(self);
        while let Some(injector) = current {
            if let Some(instance) = injector.get_from_self(name)? {
                return Ok(Some(instance));
            }
            current = injector.parent();
        }
        Ok(None)
    }

    /// [`get`](Injector::get) downcast to `T`
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Option<Arc<T>>> {
        self.get(name)?.map(|v| downcast::<T>(name, v)).transpose()
    }

    /// Resolve `name` from this injector's own bindings and templates only
    pub fn get_from_self(&self, name: &str) -> Result<Option<Instance>> {
        let inner = &self.inner;
        inner
            .bindings
            .get(name)
            .or_else(|| inner.templates.get(name))
            .map(|binding| self.resolve_binding(name, binding, None))
            .transpose()
    }

    /// Bindings accepted by `predicate`, across the chain. A name collected
    /// from a nearer injector is not replaced by an ancestor's binding.
    pub fn find<P>(&self, predicate: P) -> BindingMap
    where
        P: Fn(&Binding, &str) -> bool,
    {
        let mut found = BindingMap::new();
        let mut current = Some(self);
        while let Some(injector) = current {
            for (name, binding) in injector.inner.bindings.iter() {
                if !found.contains(name) && predicate(binding, name) {
                    found.insert(name, binding.clone());
                }
            }
            current = injector.parent();
        }
        found
    }

    /// Own bindings accepted by `predicate`
    pub fn find_from_self<P>(&self, predicate: P) -> BindingMap
    where
        P: Fn(&Binding, &str) -> bool,
    {
        let mut found = BindingMap::new();
        for (name, binding) in self.inner.bindings.iter() {
            if predicate(binding, name) {
                found.insert(name, binding.clone());
            }
        }
        found
    }

    /// Every binding name visible through the chain, nearest first
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let mut current = Some(self);
        while let Some(injector) = current {
            for name in injector.inner.bindings.names() {
                if !keys.iter().any(|k| k == name) {
                    keys.push(name.to_owned());
                }
            }
            current = injector.parent();
        }
        keys
    }

    /// This injector's own binding names
    pub fn self_keys(&self) -> Vec<String> {
        self.inner.bindings.names().map(str::to_owned).collect()
    }

    /// Whether `name` is bound anywhere in the chain
    pub fn contains(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(injector) = current {
            if injector.contains_self(name) {
                return true;
            }
            current = injector.parent();
        }
        false
    }

    /// Whether `name` is bound (or templated) by this injector
    #[inline]
    pub fn contains_self(&self, name: &str) -> bool {
        self.inner.bindings.contains(name) || self.inner.templates.contains(name)
    }

    #[inline]
    pub fn parent(&self) -> Option<&Injector> {
        self.inner.parent.as_ref()
    }

    /// Distance from the root injector (0 = root)
    #[inline]
    pub fn depth(&self) -> u32 {
        self.inner.depth
    }

    /// Whether two handles refer to the same injector
    #[inline]
    pub fn ptr_eq(&self, other: &Injector) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("bindings", &self.inner.bindings.len())
            .field("templates", &self.inner.templates.len())
            .field("interceptors", &self.inner.interceptors.len())
            .field("depth", &self.inner.depth)
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}
