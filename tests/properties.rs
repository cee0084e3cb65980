//! End-to-end behavior of injectors, bindings and interceptors

use dependency_weaver::prelude::*;
use dependency_weaver::{BindingKind, INJECTOR_BINDING};
use once_cell::sync::Lazy;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// Singletons
// =============================================================================

static SERVICE_BUILT: AtomicU32 = AtomicU32::new(0);

struct SharedService;

impl Component for SharedService {
    fn construct(_: Args) -> Result<Self> {
        SERVICE_BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(SharedService)
    }
}

struct Consumer {
    service: Arc<SharedService>,
}

impl Component for Consumer {
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::new().param("service"))
    }

    fn construct(mut args: Args) -> Result<Self> {
        Ok(Self {
            service: args.required()?,
        })
    }
}

#[test]
fn singleton_is_shared_by_every_consumer() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind("service").to::<SharedService>().as_singleton();
    }])
    .unwrap();

    let consumers: Vec<_> = (0..4).map(|_| injector.inject::<Consumer>().unwrap()).collect();

    for consumer in &consumers[1..] {
        assert!(Arc::ptr_eq(&consumers[0].service, &consumer.service));
        assert!(!Arc::ptr_eq(&consumers[0], consumer));
    }
    assert_eq!(SERVICE_BUILT.load(Ordering::SeqCst), 1);
}

static EAGER_BUILT: AtomicU32 = AtomicU32::new(0);

struct EagerService;

impl Component for EagerService {
    fn construct(_: Args) -> Result<Self> {
        EAGER_BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(EagerService)
    }
}

#[test]
fn eager_singleton_is_built_by_the_injector() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind("eager").to::<EagerService>().as_eager_singleton();
    }])
    .unwrap();
    assert_eq!(EAGER_BUILT.load(Ordering::SeqCst), 1);

    let a = injector.get_as::<EagerService>("eager").unwrap().unwrap();
    let b = injector.get_as::<EagerService>("eager").unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(EAGER_BUILT.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Deep graph
// =============================================================================

/// A component whose three fields are injected integer bindings
macro_rules! leaf_holder {
    ($name:ident { $($field:ident),+ }) => {
        #[derive(Default)]
        struct $name {
            $($field: Option<Arc<i32>>,)+
        }

        impl Component for $name {
            fn descriptor() -> Result<Descriptor> {
                Ok(Descriptor::new()$(.inject(stringify!($field)))+)
            }

            fn construct(_: Args) -> Result<Self> {
                Ok(Self::default())
            }

            fn assign(&mut self, key: &str, value: Resolved) -> Result<()> {
                match key {
                    $(stringify!($field) => self.$field = value.one()?,)+
                    _ => {}
                }
                Ok(())
            }
        }
    };
}

leaf_holder!(Binded { target_b1, target_b2, target_b3 });
leaf_holder!(Binded2 { target_c1, target_c2, target_c3 });
leaf_holder!(Binded3 { target_d1, target_d2, target_d3 });
leaf_holder!(Binded4 { target_e1, target_e2, target_e3 });

#[derive(Default)]
struct Test1 {
    target_a1: Option<Arc<Binded>>,
    target_a2: Option<Arc<Binded2>>,
    target_a3: Option<Arc<Binded3>>,
    target_a4: Option<Arc<Binded4>>,
}

impl Component for Test1 {
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::new()
            .param("target_a1")
            .param("target_a2")
            .inject("target_a3")
            .inject("target_a4"))
    }

    fn construct(mut args: Args) -> Result<Self> {
        Ok(Self {
            target_a1: args.one()?,
            target_a2: args.one()?,
            ..Default::default()
        })
    }

    fn assign(&mut self, key: &str, value: Resolved) -> Result<()> {
        match key {
            "target_a3" => self.target_a3 = value.one()?,
            "target_a4" => self.target_a4 = value.one()?,
            _ => {}
        }
        Ok(())
    }
}

const LEAVES: [&str; 12] = [
    "target_b1", "target_b2", "target_b3",
    "target_c1", "target_c2", "target_c3",
    "target_d1", "target_d2", "target_d3",
    "target_e1", "target_e2", "target_e3",
];

fn leaf(value: &Option<Arc<i32>>) -> Option<i32> {
    value.as_deref().copied()
}

#[test]
fn deep_graph_is_fully_wired() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind("target_a1").to::<Binded>();
        b.bind("target_a2").to::<Binded2>();
        b.bind("target_a3").to::<Binded3>();
        b.bind("target_a4").to::<Binded4>();
        for (value, name) in (1i32..).zip(LEAVES) {
            b.bind(name).to_instance(value);
        }
    }])
    .unwrap();

    let test = injector.inject::<Test1>().unwrap();
    let a1 = test.target_a1.as_ref().unwrap();
    let a2 = test.target_a2.as_ref().unwrap();
    let a3 = test.target_a3.as_ref().unwrap();
    let a4 = test.target_a4.as_ref().unwrap();

    assert_eq!(leaf(&a1.target_b1), Some(1));
    assert_eq!(leaf(&a1.target_b2), Some(2));
    assert_eq!(leaf(&a1.target_b3), Some(3));
    assert_eq!(leaf(&a2.target_c1), Some(4));
    assert_eq!(leaf(&a2.target_c2), Some(5));
    assert_eq!(leaf(&a2.target_c3), Some(6));
    assert_eq!(leaf(&a3.target_d1), Some(7));
    assert_eq!(leaf(&a3.target_d2), Some(8));
    assert_eq!(leaf(&a3.target_d3), Some(9));
    assert_eq!(leaf(&a4.target_e1), Some(10));
    assert_eq!(leaf(&a4.target_e2), Some(11));
    assert_eq!(leaf(&a4.target_e3), Some(12));
}

// =============================================================================
// Interception
// =============================================================================

static PLUS_ONE: Lazy<Marker> = Lazy::new(|| Marker::new("plus-one"));
static SHORT_CIRCUIT: Lazy<Marker> = Lazy::new(|| Marker::new("short-circuit"));

struct AddOne;

impl Component for AddOne {
    fn construct(_: Args) -> Result<Self> {
        Ok(AddOne)
    }
}

impl Interceptor for AddOne {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Option<Instance>> {
        let value = invocation
            .proceed()?
            .and_then(|v| v.downcast_ref::<i32>().copied());
        Ok(value.map(|v| Arc::new(v + 1) as Instance))
    }
}

struct Swallow;

impl Component for Swallow {
    fn construct(_: Args) -> Result<Self> {
        Ok(Swallow)
    }
}

impl Interceptor for Swallow {
    fn invoke(&self, _: &MethodInvocation<'_>) -> Result<Option<Instance>> {
        Ok(None)
    }
}

#[derive(Default)]
struct Child {
    joinpoints: Joinpoints,
    calls: AtomicU32,
}

impl Child {
    fn test(&self) -> Result<Option<i32>> {
        self.joinpoints.call_as(self, "test", Vec::new(), |_| {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
    }
}

impl Component for Child {
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::new()
            .method("test")
            .intercept(*PLUS_ONE, ["test"])
            .intercept(*SHORT_CIRCUIT, ["test"]))
    }

    fn construct(_: Args) -> Result<Self> {
        Ok(Child::default())
    }

    fn joinpoints(&mut self) -> Option<&mut Joinpoints> {
        Some(&mut self.joinpoints)
    }
}

#[derive(Default)]
struct Parent {
    child: Option<Arc<Child>>,
}

impl Parent {
    fn test(&self) -> Result<Option<i32>> {
        match &self.child {
            Some(child) => child.test(),
            None => Ok(None),
        }
    }
}

impl Component for Parent {
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::new().inject("child"))
    }

    fn construct(_: Args) -> Result<Self> {
        Ok(Parent::default())
    }

    fn assign(&mut self, key: &str, value: Resolved) -> Result<()> {
        if key == "child" {
            self.child = value.one()?;
        }
        Ok(())
    }
}

#[test]
fn interceptor_wraps_the_method_result() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind_interceptor(*PLUS_ONE).to::<AddOne>();
    }])
    .unwrap();

    let child = injector.inject::<Child>().unwrap();
    assert_eq!(child.test().unwrap(), Some(2));
    assert_eq!(child.calls.load(Ordering::SeqCst), 1);
    assert_eq!(child.joinpoints.advice_count("test"), 1);
}

#[test]
fn interceptor_can_skip_the_method_body() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind_interceptor(*SHORT_CIRCUIT).to::<Swallow>();
    }])
    .unwrap();

    let child = injector.inject::<Child>().unwrap();
    assert_eq!(child.test().unwrap(), None);
    assert_eq!(child.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unmatched_markers_leave_the_instance_unwoven() {
    let injector = Injector::new(&[]).unwrap();

    let child = injector.inject::<Child>().unwrap();
    assert!(!child.joinpoints.is_woven());
    assert_eq!(child.test().unwrap(), Some(1));
}

#[test]
fn interceptor_applies_to_injected_dependencies() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind("child").to::<Child>();
        b.bind_interceptor(*PLUS_ONE).to::<AddOne>();
    }])
    .unwrap();

    let parent = injector.inject::<Parent>().unwrap();
    let child = parent.child.as_ref().unwrap();
    assert_eq!(child.test().unwrap(), Some(2));
    assert_eq!(child.joinpoints.binding_name(), Some("child"));
    assert_eq!(parent.test().unwrap(), Some(2));
    assert_eq!(child.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn weaving_an_instance_twice_keeps_one_advice() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind_interceptor(*PLUS_ONE).to::<AddOne>();
    }])
    .unwrap();

    let mut child = Child::default();
    injector.inject_to_instance(&mut child).unwrap();
    injector.inject_to_instance(&mut child).unwrap();

    assert!(child.joinpoints.is_woven());
    assert_eq!(child.joinpoints.advice_count("test"), 1);
    assert_eq!(child.test().unwrap(), Some(2));
}

#[test]
fn singleton_interceptor_is_built_once() {
    static BUILT: AtomicU32 = AtomicU32::new(0);

    struct Counting;

    impl Component for Counting {
        fn construct(_: Args) -> Result<Self> {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Ok(Counting)
        }
    }

    impl Interceptor for Counting {
        fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Option<Instance>> {
            invocation.proceed()
        }
    }

    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind_interceptor(*PLUS_ONE).to::<Counting>().as_singleton();
    }])
    .unwrap();

    injector.inject::<Child>().unwrap();
    injector.inject::<Child>().unwrap();
    assert_eq!(BUILT.load(Ordering::SeqCst), 1);
}

#[test]
fn interceptor_on_a_field_is_rejected() {
    static MARK: Lazy<Marker> = Lazy::new(|| Marker::new("mark"));

    #[derive(Debug)]
    struct Target;

    impl Component for Target {
        fn descriptor() -> Result<Descriptor> {
            Ok(Descriptor::new().inject("dep").intercept(*MARK, ["dep"]))
        }

        fn construct(_: Args) -> Result<Self> {
            Ok(Target)
        }
    }

    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind_interceptor(*MARK).to::<AddOne>();
    }])
    .unwrap();

    let err = injector.inject::<Target>().unwrap_err();
    assert!(matches!(err, DiError::NotAMethod { ref member, .. } if member == "dep"));
    assert!(err.to_string().contains("Interceptor only applicable to function"));
}

#[test]
fn pointcut_without_joinpoints_is_rejected() {
    static MARK: Lazy<Marker> = Lazy::new(|| Marker::new("mark"));

    #[derive(Debug)]
    struct Opaque;

    impl Component for Opaque {
        fn descriptor() -> Result<Descriptor> {
            Ok(Descriptor::new().method("run").intercept(*MARK, ["run"]))
        }

        fn construct(_: Args) -> Result<Self> {
            Ok(Opaque)
        }
    }

    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind_interceptor(*MARK).to::<AddOne>();
    }])
    .unwrap();

    let err = injector.inject::<Opaque>().unwrap_err();
    assert!(matches!(err, DiError::NotInterceptable { .. }));
}

// =============================================================================
// Parent / child injectors
// =============================================================================

#[test]
fn child_shadows_parent_bindings() {
    let parent = Injector::new(&[&|b: &mut Binder| {
        b.bind("a").to_instance("parent a");
        b.bind("b").to_instance("parent b");
    }])
    .unwrap();
    let child = parent
        .create_child_injector(&[&|b: &mut Binder| {
            b.bind("a").to_instance("child a");
        }])
        .unwrap();

    assert_eq!(child.get_as::<&str>("a").unwrap().as_deref(), Some(&"child a"));
    assert_eq!(child.get_as::<&str>("b").unwrap().as_deref(), Some(&"parent b"));
    assert!(child.get_from_self("b").unwrap().is_none());

    let self_keys = child.self_keys();
    assert!(self_keys.contains(&"a".to_owned()));
    assert!(!self_keys.contains(&"b".to_owned()));

    let keys = child.keys();
    assert!(keys.contains(&"a".to_owned()));
    assert!(keys.contains(&"b".to_owned()));
    assert_eq!(keys.iter().filter(|k| *k == INJECTOR_BINDING).count(), 1);

    assert_eq!(child.depth(), 1);
    assert!(child.parent().unwrap().ptr_eq(&parent));
}

#[test]
fn ancestor_singletons_live_in_the_ancestor() {
    struct Pool;

    impl Component for Pool {
        fn construct(_: Args) -> Result<Self> {
            Ok(Pool)
        }
    }

    let parent = Injector::new(&[&|b: &mut Binder| {
        b.bind("pool").to::<Pool>().as_singleton();
    }])
    .unwrap();
    let first = parent.create_child_injector(&[]).unwrap();
    let second = parent.create_child_injector(&[]).unwrap();

    let a = first.get_as::<Pool>("pool").unwrap().unwrap();
    let b = second.get_as::<Pool>("pool").unwrap().unwrap();
    let c = parent.get_as::<Pool>("pool").unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
}

#[test]
fn find_prefers_the_nearest_binding() {
    let parent = Injector::new(&[&|b: &mut Binder| {
        b.bind("repo.user").to::<SharedService>();
        b.bind("repo.order").to_instance(1u8);
    }])
    .unwrap();
    let child = parent
        .create_child_injector(&[&|b: &mut Binder| {
            b.bind("repo.user").to_instance(2u8);
        }])
        .unwrap();

    let repos = child.find(|_, name| name.starts_with("repo."));
    assert_eq!(repos.len(), 2);
    assert_eq!(repos.get("repo.user").map(|b| b.kind()), Some(BindingKind::Instance));

    let own = child.find_from_self(|_, name| name.starts_with("repo."));
    assert_eq!(own.names().collect::<Vec<_>>(), ["repo.user"]);
}

// =============================================================================
// Templates, providers, patterns and params
// =============================================================================

static SESSION_BUILT: AtomicU32 = AtomicU32::new(0);

struct Session;

impl Component for Session {
    fn construct(_: Args) -> Result<Self> {
        SESSION_BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(Session)
    }
}

struct Workspace {
    left: Arc<Session>,
    right: Arc<Session>,
    other: Arc<Session>,
    fresh: Arc<Session>,
}

impl Component for Workspace {
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::new()
            .param_aliased("session", "shared")
            .param_aliased("session", "shared")
            .param_aliased("session", "other")
            .param("session"))
    }

    fn construct(mut args: Args) -> Result<Self> {
        Ok(Self {
            left: args.required()?,
            right: args.required()?,
            other: args.required()?,
            fresh: args.required()?,
        })
    }
}

#[test]
fn templates_are_shared_per_alias() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.template("session").to::<Session>();
    }])
    .unwrap();

    let first = injector.inject::<Workspace>().unwrap();
    assert!(Arc::ptr_eq(&first.left, &first.right));
    assert!(!Arc::ptr_eq(&first.left, &first.other));
    assert!(!Arc::ptr_eq(&first.left, &first.fresh));

    // Aliases persist for the injector's lifetime
    let second = injector.inject::<Workspace>().unwrap();
    assert!(Arc::ptr_eq(&first.left, &second.left));
    assert!(!Arc::ptr_eq(&first.fresh, &second.fresh));

    // Two aliases, two fresh instances
    assert_eq!(SESSION_BUILT.load(Ordering::SeqCst), 4);
}

struct Port(u16);

struct PortProvider {
    base: Arc<u16>,
}

impl Component for PortProvider {
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::new().param("base_port"))
    }

    fn construct(mut args: Args) -> Result<Self> {
        Ok(Self {
            base: args.required()?,
        })
    }
}

impl Provider for PortProvider {
    type Output = Port;

    fn provide(&self) -> Result<Port> {
        Ok(Port(*self.base + 1))
    }
}

#[test]
fn provider_value_is_not_cached() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind("base_port").to_instance(8080u16);
        b.bind("port").to_provider::<PortProvider>();
    }])
    .unwrap();

    let a = injector.get_as::<Port>("port").unwrap().unwrap();
    let b = injector.get_as::<Port>("port").unwrap().unwrap();
    assert_eq!(a.0, 8081);
    assert!(!Arc::ptr_eq(&a, &b));
}

struct Plugins {
    names: Vec<Arc<&'static str>>,
}

impl Component for Plugins {
    fn descriptor() -> Result<Descriptor> {
        Descriptor::new().param_matching(r"^plugin\.")
    }

    fn construct(mut args: Args) -> Result<Self> {
        Ok(Self { names: args.many()? })
    }
}

#[test]
fn pattern_request_collects_every_level_then_params() {
    let parent = Injector::new(&[&|b: &mut Binder| {
        b.bind("plugin.auth").to_instance("auth");
        b.bind("other").to_instance("other");
    }])
    .unwrap();
    let child = parent
        .create_child_injector(&[&|b: &mut Binder| {
            b.bind("plugin.cache").to_instance("cache");
        }])
        .unwrap();

    let params = Params::new().with("plugin.extra", "extra");
    let plugins = child.inject_with::<Plugins>(&params).unwrap();
    let names: Vec<&str> = plugins.names.iter().map(|n| **n).collect();
    assert_eq!(names, ["cache", "auth", "extra"]);

    // No match is an empty list, not an error
    let empty = Injector::new(&[]).unwrap().inject::<Plugins>().unwrap();
    assert!(empty.names.is_empty());
}

struct Greeting {
    name: Option<Arc<String>>,
}

impl Component for Greeting {
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::new().param("name"))
    }

    fn construct(mut args: Args) -> Result<Self> {
        Ok(Self { name: args.one()? })
    }
}

#[test]
fn params_follow_bindings() {
    let bound = Injector::new(&[&|b: &mut Binder| {
        b.bind("name").to_instance(String::from("bound"));
    }])
    .unwrap();
    let empty = Injector::new(&[]).unwrap();
    let params = Params::new().with("name", String::from("param"));

    let greeting = bound.inject_with::<Greeting>(&params).unwrap();
    assert_eq!(greeting.name.as_deref().map(String::as_str), Some("bound"));

    let greeting = empty.inject_with::<Greeting>(&params).unwrap();
    assert_eq!(greeting.name.as_deref().map(String::as_str), Some("param"));

    let greeting = empty.inject::<Greeting>().unwrap();
    assert!(greeting.name.is_none());
}

#[test]
fn inject_once_ignores_later_params() {
    let injector = Injector::new(&[]).unwrap();

    let first = injector
        .inject_once_with::<Greeting>(&Params::new().with("name", String::from("first")))
        .unwrap();
    let second = injector
        .inject_once_with::<Greeting>(&Params::new().with("name", String::from("second")))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.name.as_deref().map(String::as_str), Some("first"));
}

// =============================================================================
// Existing instances and hooks
// =============================================================================

static EVENTS: Lazy<Mutex<Vec<&'static str>>> = Lazy::new(|| Mutex::new(Vec::new()));

#[derive(Default)]
struct Hooked {
    config: Option<Arc<u32>>,
    ready: bool,
}

impl Component for Hooked {
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::new().inject_named("config", "config"))
    }

    fn construct(_: Args) -> Result<Self> {
        Ok(Hooked::default())
    }

    fn assign(&mut self, key: &str, value: Resolved) -> Result<()> {
        if key == "config" {
            EVENTS.lock().unwrap().push("assign");
            self.config = value.one()?;
        }
        Ok(())
    }

    fn post_init(&mut self) -> Result<()> {
        EVENTS.lock().unwrap().push("post_init");
        self.ready = self.config.is_some();
        Ok(())
    }
}

#[test]
fn inject_to_instance_wires_fields_then_runs_hook() {
    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind("config").to_instance(7u32);
    }])
    .unwrap();

    let mut instance = Hooked::default();
    injector.inject_to_instance(&mut instance).unwrap();

    assert_eq!(instance.config.as_deref(), Some(&7));
    assert!(instance.ready);
    assert_eq!(*EVENTS.lock().unwrap(), ["assign", "post_init"]);
}

#[test]
fn self_binding_resolves_to_the_owner() {
    let parent = Injector::new(&[]).unwrap();
    let child = parent.create_child_injector(&[]).unwrap();

    let resolved = child.get_as::<Injector>(INJECTOR_BINDING).unwrap().unwrap();
    assert!(resolved.ptr_eq(&child));
    assert!(!resolved.ptr_eq(&parent));
}

#[test]
fn constructor_errors_propagate() {
    struct Broken;

    impl Component for Broken {
        fn construct(_: Args) -> Result<Self> {
            Err(DiError::creation_failed::<Broken>("no backend"))
        }
    }

    let injector = Injector::new(&[&|b: &mut Binder| {
        b.bind("broken").to::<Broken>().as_eager_singleton();
    }]);

    assert!(matches!(
        injector.unwrap_err(),
        DiError::CreationFailed { ref reason, .. } if reason == "no backend"
    ));
}
