//! # dependency-weaver
//!
//! Module-based dependency injection for Rust, with named bindings, child
//! injectors and method interception.
//!
//! ## Overview
//!
//! - **Modules** declare bindings on a [`Binder`]: names mapped to component
//!   types, ready-made values, providers or templates.
//! - An **[`Injector`]** merges a set of modules and builds fully wired object
//!   graphs from them. Injectors form a parent chain; lookups fall back to
//!   ancestors.
//! - A **[`Component`]** publishes a static [`Descriptor`] of what it needs,
//!   either through its constructor or through field injection, and is then
//!   built from an [`Args`] cursor.
//! - **Interceptors** are woven around methods a component marks as
//!   interceptable under a capability [`Marker`].
//!
//! ## Quick Start
//!
//! ```rust
//! use dependency_weaver::prelude::*;
//!
//! struct Database {
//!     url: Arc<String>,
//! }
//!
//! impl Component for Database {
//!     fn descriptor() -> Result<Descriptor> {
//!         Ok(Descriptor::new().param("database_url"))
//!     }
//!
//!     fn construct(mut args: Args) -> Result<Self> {
//!         Ok(Self { url: args.required()? })
//!     }
//! }
//!
//! struct UserService {
//!     db: Option<Arc<Database>>,
//! }
//!
//! impl Component for UserService {
//!     fn descriptor() -> Result<Descriptor> {
//!         Ok(Descriptor::new().inject_named("db", "database"))
//!     }
//!
//!     fn construct(_: Args) -> Result<Self> {
//!         Ok(Self { db: None })
//!     }
//!
//!     fn assign(&mut self, key: &str, value: Resolved) -> Result<()> {
//!         if key == "db" {
//!             self.db = value.one()?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let injector = Injector::new(&[&|b: &mut Binder| {
//!     b.bind("database_url").to_instance(String::from("postgres://localhost"));
//!     b.bind("database").to::<Database>().as_singleton();
//! }])?;
//!
//! let a = injector.inject::<UserService>()?;
//! let b = injector.inject::<UserService>()?;
//! assert_eq!(a.db.as_ref().unwrap().url.as_str(), "postgres://localhost");
//! assert!(Arc::ptr_eq(a.db.as_ref().unwrap(), b.db.as_ref().unwrap()));
//! # Ok(())
//! # }
//! ```
//!
//! ## Child Injectors
//!
//! ```rust
//! use dependency_weaver::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let root = Injector::new(&[&|b: &mut Binder| {
//!     b.bind("app").to_instance("MyApp");
//! }])?;
//! let request = root.create_child_injector(&[&|b: &mut Binder| {
//!     b.bind("request_id").to_instance(123u64);
//! }])?;
//!
//! assert!(request.contains("app"));
//! assert!(!request.contains_self("app"));
//! assert!(!root.contains("request_id"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): `tracing` events under the `dependency_weaver` target
//! - `logging-json` / `logging-pretty`: subscriber setup in [`logging`]
//! - `derive`: `#[derive(Component)]`

mod binding;
mod component;
mod descriptor;
mod error;
mod injector;
mod interceptor;
#[cfg(feature = "logging")]
pub mod logging;
mod marker;
mod module;

pub use binding::{Binding, BindingKind, BindingMap, ClassRef, InterceptorBinding, Lifecycle};
pub use component::{Args, Component, Instance, Params, Provider, Resolved};
pub use descriptor::{Descriptor, Member, MemberKind, Pointcut, Request, Target};
pub use error::*;
pub use injector::{INJECTOR_BINDING, Injector};
pub use interceptor::{Interceptor, Joinpoints, MethodBody, MethodInvocation};
pub use marker::Marker;
pub use module::{
    Binder, BindingBuilder, ClassOptions, InterceptorBuilder, InterceptorOptions, Module,
    TemplateBuilder,
};

#[cfg(feature = "derive")]
pub use dependency_weaver_derive::Component;

// Re-exported for `Lazy` marker statics in generated and user code
pub use once_cell;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Args, Binder, Component, Descriptor, DiError, Injector, Instance, Interceptor, Joinpoints,
        Marker, MethodInvocation, Module, Params, Provider, Resolved, Result,
    };
    pub use std::sync::Arc;
}
