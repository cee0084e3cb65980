//! Component traits for dependency injection
//!
//! These traits define what types the injector can build and how resolved
//! dependencies are handed back to them.

use crate::interceptor::Joinpoints;
use crate::{Descriptor, DiError, Result};
use std::any::Any;
use std::sync::Arc;

/// Type-erased value handed out by the injector
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A type the injector can construct and wire.
///
/// Only [`construct`](Component::construct) is required. Everything else has a
/// no-op default, so a leaf type without dependencies is a one-liner.
///
/// # Examples
///
/// ```rust
/// use dependency_weaver::{Args, Component, Descriptor, Injector, Binder, Resolved, Result};
/// use std::sync::Arc;
///
/// struct Greeter {
///     prefix: Option<Arc<String>>,
///     name: Option<Arc<String>>,
/// }
///
/// impl Component for Greeter {
///     fn descriptor() -> Result<Descriptor> {
///         Ok(Descriptor::new().param("prefix").inject("name"))
///     }
///
///     fn construct(mut args: Args) -> Result<Self> {
///         Ok(Self { prefix: args.one()?, name: None })
///     }
///
///     fn assign(&mut self, key: &str, value: Resolved) -> Result<()> {
///         if key == "name" {
///             self.name = value.one()?;
///         }
///         Ok(())
///     }
/// }
///
/// # fn main() -> Result<()> {
/// let injector = Injector::new(&[&|b: &mut Binder| {
///     b.bind("prefix").to_instance(String::from("Hello"));
///     b.bind("name").to_instance(String::from("world"));
/// }])?;
///
/// let greeter = injector.inject::<Greeter>()?;
/// assert_eq!(greeter.prefix.as_deref().map(String::as_str), Some("Hello"));
/// assert_eq!(greeter.name.as_deref().map(String::as_str), Some("world"));
/// # Ok(())
/// # }
/// ```
pub trait Component: Send + Sync + Sized + 'static {
    /// Static injection table of this type. Cached per injector.
    fn descriptor() -> Result<Descriptor> {
        Ok(Descriptor::default())
    }

    /// Build the instance from resolved constructor requests, in order
    fn construct(args: Args) -> Result<Self>;

    /// Receive a resolved field-level request
    fn assign(&mut self, key: &str, value: Resolved) -> Result<()> {
        let _ = (key, value);
        Ok(())
    }

    /// Joinpoint table used for method interception
    fn joinpoints(&mut self) -> Option<&mut Joinpoints> {
        None
    }

    /// Post-construction hook, run after injection and weaving
    fn post_init(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A component that produces the value of a provider binding.
///
/// The provider itself is injected on every resolution, then asked for its
/// value. The injector does not cache the result.
pub trait Provider: Component {
    type Output: Send + Sync + 'static;

    fn provide(&self) -> Result<Self::Output>;
}

#[inline]
pub(crate) fn downcast<T: Send + Sync + 'static>(name: &str, value: Instance) -> Result<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::type_mismatch::<T>(name))
}

/// Result of resolving one request
#[derive(Clone)]
pub enum Resolved {
    /// A name request; `None` when nothing in the chain is bound to the name
    One { name: String, value: Option<Instance> },
    /// A pattern request; every match, possibly none
    Many { pattern: String, values: Vec<Instance> },
}

impl Resolved {
    /// Downcast a single value. A pattern result is a type mismatch.
    pub fn one<T: Send + Sync + 'static>(self) -> Result<Option<Arc<T>>> {
        match self {
            Resolved::One { name, value } => value.map(|v| downcast::<T>(&name, v)).transpose(),
            Resolved::Many { pattern, .. } => Err(DiError::type_mismatch::<Option<Arc<T>>>(pattern)),
        }
    }

    /// Like [`one`](Resolved::one), but a missing binding is an error
    pub fn required<T: Send + Sync + 'static>(self) -> Result<Arc<T>> {
        let name = self.label().to_owned();
        self.one::<T>()?.ok_or_else(|| DiError::not_found(name))
    }

    /// Downcast every value. A name result yields zero or one element.
    pub fn many<T: Send + Sync + 'static>(self) -> Result<Vec<Arc<T>>> {
        match self {
            Resolved::One { name, value } => value
                .into_iter()
                .map(|v| downcast::<T>(&name, v))
                .collect(),
            Resolved::Many { pattern, values } => values
                .into_iter()
                .map(|v| downcast::<T>(&pattern, v))
                .collect(),
        }
    }

    /// Requested binding name or pattern source
    pub fn label(&self) -> &str {
        match self {
            Resolved::One { name, .. } => name,
            Resolved::Many { pattern, .. } => pattern,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Resolved::One { value, .. } => value.is_none(),
            Resolved::Many { values, .. } => values.is_empty(),
        }
    }
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolved::One { name, value } => f
                .debug_struct("One")
                .field("name", name)
                .field("found", &value.is_some())
                .finish(),
            Resolved::Many { pattern, values } => f
                .debug_struct("Many")
                .field("pattern", pattern)
                .field("count", &values.len())
                .finish(),
        }
    }
}

/// Positional constructor arguments.
///
/// Reading past the last declared request yields `None` / an empty list.
#[derive(Debug)]
pub struct Args {
    values: std::vec::IntoIter<Resolved>,
}

impl Args {
    #[inline]
    pub fn new(values: Vec<Resolved>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }

    /// Next raw argument
    #[inline]
    pub fn next_resolved(&mut self) -> Option<Resolved> {
        self.values.next()
    }

    /// Next argument as a single optional value
    pub fn one<T: Send + Sync + 'static>(&mut self) -> Result<Option<Arc<T>>> {
        self.values.next().map_or(Ok(None), Resolved::one::<T>)
    }

    /// Next argument as a required value
    pub fn required<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        match self.values.next() {
            Some(resolved) => resolved.required(),
            None => Err(DiError::not_found(format!(
                "constructor argument for {}",
                std::any::type_name::<T>()
            ))),
        }
    }

    /// Next argument as a list
    pub fn many<T: Send + Sync + 'static>(&mut self) -> Result<Vec<Arc<T>>> {
        self.values.next().map_or(Ok(Vec::new()), Resolved::many::<T>)
    }

    /// Number of arguments not yet read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// Extra parameters supplied to a single `inject_with` call.
///
/// Consulted after the injector's own bindings and templates.
#[derive(Clone, Default)]
pub struct Params {
    entries: Vec<(String, Instance)>,
}

impl Params {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a parameter value
    pub fn with<T: Send + Sync + 'static>(self, name: impl Into<String>, value: T) -> Self {
        self.with_instance(name, Arc::new(value))
    }

    /// Add (or replace) an already shared value
    pub fn with_instance(mut self, name: impl Into<String>, value: Instance) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
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

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(n, _)| n))
            .finish()
    }
}
