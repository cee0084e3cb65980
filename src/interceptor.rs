//! Method interception
//!
//! Rust methods cannot be swapped at runtime, so interceptable components
//! route their method bodies through a [`Joinpoints`] table. The injector fills
//! the table while weaving; an unwoven table calls the body directly.
//!
//! ```rust
//! use dependency_weaver::{
//!     Args, Binder, Component, Descriptor, Injector, Instance, Interceptor, Joinpoints, Marker,
//!     MethodInvocation, Result,
//! };
//! use once_cell::sync::Lazy;
//! use std::sync::Arc;
//!
//! static PLUS_ONE: Lazy<Marker> = Lazy::new(|| Marker::new("plus-one"));
//!
//! struct AddOne;
//!
//! impl Component for AddOne {
//!     fn construct(_: Args) -> Result<Self> {
//!         Ok(AddOne)
//!     }
//! }
//!
//! impl Interceptor for AddOne {
//!     fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Option<Instance>> {
//!         let value = invocation.proceed()?.and_then(|v| v.downcast_ref::<i64>().copied());
//!         Ok(value.map(|v| Arc::new(v + 1) as Instance))
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Counter {
//!     joinpoints: Joinpoints,
//! }
//!
//! impl Counter {
//!     fn value(&self) -> Result<Option<i64>> {
//!         self.joinpoints.call_as(self, "value", Vec::new(), |_| Ok(1i64))
//!     }
//! }
//!
//! impl Component for Counter {
//!     fn descriptor() -> Result<Descriptor> {
//!         Ok(Descriptor::new().method("value").intercept(*PLUS_ONE, ["value"]))
//!     }
//!
//!     fn construct(_: Args) -> Result<Self> {
//!         Ok(Counter::default())
//!     }
//!
//!     fn joinpoints(&mut self) -> Option<&mut Joinpoints> {
//!         Some(&mut self.joinpoints)
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let injector = Injector::new(&[&|b: &mut Binder| {
//!     b.bind_interceptor(*PLUS_ONE).to::<AddOne>();
//! }])?;
//!
//! assert_eq!(injector.inject::<Counter>()?.value()?, Some(2));
//! assert_eq!(Counter::default().value()?, Some(1));
//! # Ok(())
//! # }
//! ```

use crate::component::Instance;
use crate::{DiError, Result};
use ahash::RandomState;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Cross-cutting behavior wrapped around interceptable methods
pub trait Interceptor: Send + Sync + 'static {
    /// Handle a call. The returned value becomes the method's return value;
    /// `invocation.proceed()` may be called any number of times, or never.
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> Result<Option<Instance>>;
}

/// Erased method body: arguments in, optional value out
pub type MethodBody<'a> = dyn Fn(&[Instance]) -> Result<Option<Instance>> + 'a;

/// Snapshot of one intercepted call
pub struct MethodInvocation<'a> {
    original: &'a MethodBody<'a>,
    context: &'a (dyn Any + Send + Sync),
    args: &'a [Instance],
    binding_name: Option<&'a str>,
    method: &'a str,
}

impl<'a> MethodInvocation<'a> {
    /// Run the original body (or the next interceptor) with the captured arguments
    #[inline]
    pub fn proceed(&self) -> Result<Option<Instance>> {
        (self.original)(self.args)
    }

    /// The receiver of the call
    #[inline]
    pub fn context(&self) -> &'a (dyn Any + Send + Sync) {
        self.context
    }

    /// The receiver downcast to its concrete type
    #[inline]
    pub fn context_as<T: Any>(&self) -> Option<&'a T> {
        self.context.downcast_ref::<T>()
    }

    #[inline]
    pub fn args(&self) -> &'a [Instance] {
        self.args
    }

    /// Argument `index` downcast to `T`
    pub fn arg<T: Any>(&self, index: usize) -> Option<&'a T> {
        self.args.get(index).and_then(|arg| arg.downcast_ref::<T>())
    }

    /// Name of the binding the receiver was resolved under, if any
    #[inline]
    pub fn binding_name(&self) -> Option<&'a str> {
        self.binding_name
    }

    /// Name of the intercepted method
    #[inline]
    pub fn method(&self) -> &'a str {
        self.method
    }
}

impl std::fmt::Debug for MethodInvocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.method)
            .field("binding_name", &self.binding_name)
            .field("args", &self.args.len())
            .finish()
    }
}

/// Per-instance table of woven interceptors.
///
/// Embed one in an interceptable component, return it from
/// [`Component::joinpoints`](crate::Component::joinpoints), and route method
/// bodies through [`call`](Joinpoints::call) or [`call_as`](Joinpoints::call_as).
#[derive(Clone, Default)]
pub struct Joinpoints {
    woven: bool,
    binding_name: Option<String>,
    chains: HashMap<String, Vec<Arc<dyn Interceptor>>, RandomState>,
}

impl Joinpoints {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the injector already wove this table
    #[inline]
    pub fn is_woven(&self) -> bool {
        self.woven
    }

    /// Binding name recorded while weaving
    #[inline]
    pub fn binding_name(&self) -> Option<&str> {
        self.binding_name.as_deref()
    }

    /// Number of interceptors wrapped around `method`
    pub fn advice_count(&self, method: &str) -> usize {
        self.chains.get(method).map_or(0, Vec::len)
    }

    /// Wrap `method` with `interceptor`; the latest attached runs outermost
    pub(crate) fn attach(&mut self, method: &str, interceptor: Arc<dyn Interceptor>) {
        self.chains
            .entry(method.to_owned())
            .or_default()
            .push(interceptor);
    }

    /// Close the table; later weaving passes leave it untouched
    pub(crate) fn seal(&mut self, binding_name: Option<&str>) {
        self.woven = true;
        self.binding_name = binding_name.map(str::to_owned);
    }

    /// Invoke `method` on `context` through its interceptor chain
    pub fn call<C, F>(
        &self,
        context: &C,
        method: &str,
        args: Vec<Instance>,
        body: F,
    ) -> Result<Option<Instance>>
    where
        C: Any + Send + Sync,
        F: Fn(&[Instance]) -> Result<Option<Instance>>,
    {
        match self.chains.get(method) {
            Some(chain) => dispatch(
                chain,
                &body,
                context,
                &args,
                self.binding_name.as_deref(),
                method,
            ),
            None => body(&args),
        }
    }

    /// Typed variant of [`call`](Joinpoints::call).
    ///
    /// `None` means an interceptor returned no value. A value of another type
    /// than `R` is an invocation error.
    pub fn call_as<C, R, F>(
        &self,
        context: &C,
        method: &str,
        args: Vec<Instance>,
        body: F,
    ) -> Result<Option<R>>
    where
        C: Any + Send + Sync,
        R: Any + Send + Sync + Clone,
        F: Fn(&[Instance]) -> Result<R>,
    {
        let out = self.call(context, method, args, |args| {
            body(args).map(|value| Some(Arc::new(value) as Instance))
        })?;

        match out {
            None => Ok(None),
            Some(value) => value.downcast_ref::<R>().cloned().map(Some).ok_or_else(|| {
                DiError::invocation(
                    method,
                    format!("interceptor returned a value that is not {}", std::any::type_name::<R>()),
                )
            }),
        }
    }
}

fn dispatch(
    chain: &[Arc<dyn Interceptor>],
    body: &MethodBody<'_>,
    context: &(dyn Any + Send + Sync),
    args: &[Instance],
    binding_name: Option<&str>,
    method: &str,
) -> Result<Option<Instance>> {
    let Some((outer, inner)) = chain.split_last() else {
        return body(args);
    };

    let next = |args: &[Instance]| dispatch(inner, body, context, args, binding_name, method);
    let invocation = MethodInvocation {
        original: &next,
        context,
        args,
        binding_name,
        method,
    };
    outer.invoke(&invocation)
}

impl std::fmt::Debug for Joinpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joinpoints")
            .field("woven", &self.woven)
            .field("binding_name", &self.binding_name)
            .field("methods", &self.chains.keys().collect::<Vec<_>>())
            .finish()
    }
}
