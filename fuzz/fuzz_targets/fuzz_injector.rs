#![no_main]

//! Fuzz target for injector configuration and resolution
//!
//! Builds random module configurations, including self-referencing class
//! bindings and child injectors, then resolves random names and patterns.
//! Every path must return a value or an error, never panic or deadlock.

use arbitrary::Arbitrary;
use dependency_weaver::{Args, Binder, Component, Descriptor, DiError, Injector, Params, Result};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

const NAMES: [&str; 6] = ["a", "b", "c", "node", "plugin.x", "plugin.y"];

/// Requests `a` and every `plugin.*`, so binding it under `a` forms a cycle
struct Node {
    _next: Option<Arc<Node>>,
    _plugins: Vec<Arc<u32>>,
}

impl Component for Node {
    fn descriptor() -> Result<Descriptor> {
        Descriptor::new().param("a").param_matching(r"^plugin\.")
    }

    fn construct(mut args: Args) -> Result<Self> {
        // A non-Node value under `a` is a type mismatch, reported as an error
        Ok(Self {
            _next: args.one()?,
            _plugins: args.many()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Kind {
    Instance(u32),
    Class,
    Singleton,
    Eager,
    Template,
}

#[derive(Debug, Clone, Arbitrary)]
struct Bind {
    name: u8,
    kind: Kind,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Get(u8),
    GetFromSelf(u8),
    Inject,
    InjectWith(u8, u32),
    InjectOnce,
    Pattern(String),
    Child(Vec<Bind>),
    Parent,
    Keys,
}

fn name(index: u8) -> &'static str {
    NAMES[index as usize % NAMES.len()]
}

fn configure(binder: &mut Binder, binds: &[Bind]) {
    for bind in binds {
        let name = name(bind.name);
        match bind.kind {
            Kind::Instance(value) => binder.bind(name).to_instance(value),
            Kind::Class => {
                binder.bind(name).to::<Node>();
            }
            Kind::Singleton => binder.bind(name).to::<Node>().as_singleton(),
            Kind::Eager => binder.bind(name).to::<Node>().as_eager_singleton(),
            Kind::Template => binder.template(name).to::<Node>(),
        }
    }
}

fn build(parent: Option<&Injector>, binds: &[Bind]) -> Option<Injector> {
    let module = |binder: &mut Binder| configure(binder, binds);
    let result = match parent {
        Some(parent) => parent.create_child_injector(&[&module]),
        None => Injector::new(&[&module]),
    };
    match result {
        Ok(injector) => Some(injector),
        Err(DiError::CircularDependency { .. } | DiError::TypeMismatch { .. }) => None,
        Err(err) => panic!("unexpected construction error: {err}"),
    }
}

fuzz_target!(|input: (Vec<Bind>, Vec<Op>)| {
    let (binds, ops) = input;
    let Some(root) = build(None, &binds) else {
        return;
    };
    let mut current = root;

    for op in ops.into_iter().take(64) {
        match op {
            Op::Get(index) => {
                let _ = current.get(name(index));
            }
            Op::GetFromSelf(index) => {
                let found = current.get_from_self(name(index));
                if !current.contains_self(name(index)) {
                    assert!(matches!(found, Ok(None)));
                }
            }
            Op::Inject => {
                let _ = current.inject::<Node>();
            }
            Op::InjectWith(index, value) => {
                let params = Params::new().with(name(index), value);
                let _ = current.inject_with::<Node>(&params);
            }
            Op::InjectOnce => {
                if let (Ok(a), Ok(b)) = (current.inject_once::<Node>(), current.inject_once::<Node>()) {
                    assert!(Arc::ptr_eq(&a, &b));
                }
            }
            Op::Pattern(pattern) => {
                let _ = current.find(|_, name| name.contains(pattern.as_str()));
                if let Ok(descriptor) = Descriptor::new().param_matching(&pattern) {
                    assert_eq!(descriptor.constructor_requests().len(), 1);
                }
            }
            Op::Child(binds) => {
                if let Some(child) = build(Some(&current), &binds) {
                    assert_eq!(child.depth(), current.depth() + 1);
                    current = child;
                }
            }
            Op::Parent => {
                if let Some(parent) = current.parent().cloned() {
                    current = parent;
                }
            }
            Op::Keys => {
                let keys = current.keys();
                for key in current.self_keys() {
                    assert!(keys.contains(&key));
                }
            }
        }
    }
});
