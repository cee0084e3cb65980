//! Error types for dependency injection

use thiserror::Error;

/// Errors that can occur while wiring an object graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiError {
    /// A required binding was not found anywhere in the injector chain
    #[error("Binding not found: {name}")]
    NotFound { name: String },

    /// A resolved value could not be downcast to the requested type
    #[error("Binding `{name}` does not hold a value of type {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// Circular dependency detected during resolution
    #[error("Circular dependency detected while resolving: {name}")]
    CircularDependency { name: String },

    /// A component constructor, provider or post-init hook failed
    #[error("Failed to create {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// A binding-name or member pattern is not a valid regular expression
    #[error("Invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A pointcut names a member that is not a method
    #[error("Interceptor only applicable to function: {type_name}::{member}")]
    NotAMethod {
        type_name: &'static str,
        member: String,
    },

    /// A component declares pointcuts for a bound marker but exposes no joinpoint table
    #[error("{type_name} declares pointcuts but has no joinpoint table")]
    NotInterceptable { type_name: &'static str },

    /// An interceptor or intercepted method failed
    #[error("Invocation of `{method}` failed: {reason}")]
    Invocation { method: String, reason: String },
}

impl DiError {
    /// Create a NotFound error for a binding name
    #[inline]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a TypeMismatch error for a binding name
    #[inline]
    pub fn type_mismatch<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create a CircularDependency error
    #[inline]
    pub fn circular(name: impl Into<String>) -> Self {
        Self::CircularDependency { name: name.into() }
    }

    /// Create an Invocation error
    #[inline]
    pub fn invocation(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invocation {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_pattern(pattern: &str, err: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: err.to_string(),
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
