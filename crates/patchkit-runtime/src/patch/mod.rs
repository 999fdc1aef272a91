#![forbid(unsafe_code)]

//! The reversible-effect registry.
//!
//! - [`PatchManager`]: ordered record of active patches and child managers.
//! - [`Teardown`]: the owned "undo" half of a patch.
//! - [`Scope`]: opaque tag for selective reversal.
//!
//! # Invariants
//!
//! 1. A teardown is invoked exactly once, and only if its setup returned
//!    successfully.
//! 2. Teardown order is strict LIFO over the manager's entry list; a child
//!    manager is reverted as a whole at the position it was created.
//! 3. A failing setup leaves the manager unchanged.
//! 4. `destroy()` on an empty manager is a no-op, so a second call has no
//!    side effects.
//! 5. While a manager is destroying, new patches on it are rejected.

mod ids;
mod manager;
pub mod teardown;

pub use ids::{ManagerId, PatchId, Scope};
pub use manager::{
    PatchManager, PatchOptions, WeakPatchManager, patches_applied_total, patches_reverted_total,
    teardown_failures_total,
};
pub use teardown::Teardown;
