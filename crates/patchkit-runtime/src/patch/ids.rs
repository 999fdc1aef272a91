#![forbid(unsafe_code)]

//! Identifiers for managers, patch records and scopes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_PATCH_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a [`PatchManager`](super::PatchManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

impl ManagerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manager#{}", self.0)
    }
}

/// Process-unique identifier of one applied patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(u64);

impl PatchId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PATCH_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch#{}", self.0)
    }
}

/// Opaque tag grouping a subset of a manager's patches.
///
/// Every call to [`Scope::new`] yields a distinct scope, even with the same
/// label, so unrelated features can never collide. The label only shows up
/// in logs and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    id: u64,
    label: &'static str,
}

impl Scope {
    /// Allocate a fresh scope.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            label,
        }
    }

    #[must_use]
    pub const fn id(self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        self.label
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_with_same_label_differ() {
        let a = Scope::new("overview");
        let b = Scope::new("overview");
        assert_ne!(a, b);
        assert_eq!(a, a);
        assert_eq!(a.label(), b.label());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ManagerId::next(), ManagerId::next());
        assert_ne!(PatchId::next(), PatchId::next());
    }

    #[test]
    fn display_formats() {
        let scope = Scope::new("panel");
        assert_eq!(scope.to_string(), format!("panel#{}", scope.id()));
        let id = PatchId::next();
        assert_eq!(id.to_string(), format!("patch#{}", id.raw()));
    }
}
