//! Capability markers
//!
//! A marker correlates an interceptor registration with the methods a
//! component declares as interceptable. Markers are process-unique; share one
//! between the module and the component through a `Lazy` static.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique capability marker.
///
/// # Examples
///
/// ```rust
/// use dependency_weaver::Marker;
/// use once_cell::sync::Lazy;
///
/// static LOGGED: Lazy<Marker> = Lazy::new(|| Marker::new("logged"));
///
/// assert_eq!(LOGGED.label(), "logged");
/// assert_ne!(*LOGGED, Marker::new("logged"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker {
    id: u64,
    label: &'static str,
}

impl Marker {
    /// Generate a new unique marker. The label is only used for diagnostics.
    #[inline]
    pub fn new(label: &'static str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            label,
        }
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the diagnostic label.
    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.label, self.id)
    }
}
