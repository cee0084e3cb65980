//! Injection descriptors
//!
//! A [`Descriptor`] is the static table a component publishes about itself:
//! which bindings its constructor needs, which fields are injected after
//! construction, which members exist, and which members are interceptable
//! under which capability marker.
//!
//! ```rust
//! use dependency_weaver::{Descriptor, Marker};
//! use once_cell::sync::Lazy;
//!
//! static TIMED: Lazy<Marker> = Lazy::new(|| Marker::new("timed"));
//!
//! # fn main() -> dependency_weaver::Result<()> {
//! let descriptor = Descriptor::new()
//!     .param("http")
//!     .inject("cache")
//!     .inject_matching("plugins", r"^plugin\.")?
//!     .method("fetch")
//!     .intercept(*TIMED, ["fetch"]);
//!
//! assert_eq!(descriptor.constructor_requests().len(), 1);
//! assert_eq!(descriptor.field_requests().len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::{DiError, Marker, Result};
use regex::Regex;

/// What a request asks the injector for
#[derive(Debug, Clone)]
pub enum Target {
    /// A single binding by name
    Name(String),
    /// Every binding whose name matches
    Pattern(Regex),
}

/// A single dependency request
#[derive(Debug, Clone)]
pub struct Request {
    target: Target,
    alias: Option<String>,
    key: String,
}

impl Request {
    /// Request the binding `name`, delivered under `key`
    pub fn named(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: Target::Name(name.into()),
            alias: None,
            key: key.into(),
        }
    }

    /// Request every binding matching `pattern`, delivered under `key`
    pub fn matching(key: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| DiError::invalid_pattern(pattern, e))?;
        Ok(Self {
            target: Target::Pattern(regex),
            alias: None,
            key: key.into(),
        })
    }

    /// Share the resolved template instance under a dynamic alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[inline]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Field name, or parameter position for constructor requests
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Kind of a component member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Field,
}

/// A named member of a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
}

/// Which members a marker applies to
#[derive(Debug, Clone)]
pub enum Pointcut {
    /// Every method whose name matches
    Pattern(Regex),
    /// Exactly these members; each must be a method
    Members(Vec<String>),
}

/// Static injection table of a component type
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    constructor: Vec<Request>,
    fields: Vec<Request>,
    members: Vec<Member>,
    pointcuts: Vec<(Marker, Pointcut)>,
}

impl Descriptor {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Constructor-level requests
    // =========================================================================

    /// Next constructor parameter is the binding `name`
    pub fn param(self, name: impl Into<String>) -> Self {
        let key = self.constructor.len().to_string();
        self.with_param(Request::named(key, name))
    }

    /// Next constructor parameter is the template `name`, shared under `alias`
    pub fn param_aliased(self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        let key = self.constructor.len().to_string();
        self.with_param(Request::named(key, name).with_alias(alias))
    }

    /// Next constructor parameter is every binding matching `pattern`
    pub fn param_matching(self, pattern: &str) -> Result<Self> {
        let key = self.constructor.len().to_string();
        Ok(self.with_param(Request::matching(key, pattern)?))
    }

    /// Append a prepared constructor request
    pub fn with_param(mut self, request: Request) -> Self {
        self.constructor.push(request);
        self
    }

    // =========================================================================
    // Field-level requests
    // =========================================================================

    /// Inject the binding named like the field
    pub fn inject(self, field: &str) -> Self {
        self.with_field(Request::named(field, field))
    }

    /// Inject the binding `name` into `field`
    pub fn inject_named(self, field: &str, name: impl Into<String>) -> Self {
        self.with_field(Request::named(field, name))
    }

    /// Inject the template `name` into `field`, shared under `alias`
    pub fn inject_aliased(
        self,
        field: &str,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.with_field(Request::named(field, name).with_alias(alias))
    }

    /// Inject every binding matching `pattern` into `field`
    pub fn inject_matching(self, field: &str, pattern: &str) -> Result<Self> {
        Ok(self.with_field(Request::matching(field, pattern)?))
    }

    /// Append a prepared field request; the field is also recorded as a member
    pub fn with_field(mut self, request: Request) -> Self {
        if self.member(request.key()).is_none() {
            self.members.push(Member {
                name: request.key().to_owned(),
                kind: MemberKind::Field,
            });
        }
        self.fields.push(request);
        self
    }

    // =========================================================================
    // Members and pointcuts
    // =========================================================================

    /// Declare a method member
    pub fn method(self, name: impl Into<String>) -> Self {
        self.with_member(name, MemberKind::Method)
    }

    /// Declare a plain field member
    pub fn field(self, name: impl Into<String>) -> Self {
        self.with_member(name, MemberKind::Field)
    }

    fn with_member(mut self, name: impl Into<String>, kind: MemberKind) -> Self {
        let name = name.into();
        match self.members.iter_mut().find(|m| m.name == name) {
            Some(member) => member.kind = kind,
            None => self.members.push(Member { name, kind }),
        }
        self
    }

    /// Mark the listed members as interceptable under `marker`
    pub fn intercept<I, S>(mut self, marker: Marker, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = members.into_iter().map(Into::into).collect();
        self.pointcuts.push((marker, Pointcut::Members(members)));
        self
    }

    /// Mark every method matching `pattern` as interceptable under `marker`
    pub fn intercept_matching(mut self, marker: Marker, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| DiError::invalid_pattern(pattern, e))?;
        self.pointcuts.push((marker, Pointcut::Pattern(regex)));
        Ok(self)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn constructor_requests(&self) -> &[Request] {
        &self.constructor
    }

    #[inline]
    pub fn field_requests(&self) -> &[Request] {
        &self.fields
    }

    #[inline]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    #[inline]
    pub fn pointcuts(&self) -> &[(Marker, Pointcut)] {
        &self.pointcuts
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Method names selected by `pointcut`.
    ///
    /// Pattern pointcuts skip non-method members; an explicit member that is
    /// not a declared method is an error.
    pub fn methods_for<'a>(
        &'a self,
        pointcut: &'a Pointcut,
        type_name: &'static str,
    ) -> Result<Vec<&'a str>> {
        match pointcut {
            Pointcut::Pattern(regex) => Ok(self
                .members
                .iter()
                .filter(|m| m.kind == MemberKind::Method && regex.is_match(&m.name))
                .map(|m| m.name.as_str())
                .collect()),
            Pointcut::Members(names) => names
                .iter()
                .map(|name| match self.member(name) {
                    Some(member) if member.kind == MemberKind::Method => Ok(name.as_str()),
                    _ => Err(DiError::NotAMethod {
                        type_name,
                        member: name.clone(),
                    }),
                })
                .collect(),
        }
    }
}
