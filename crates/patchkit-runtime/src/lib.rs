#![forbid(unsafe_code)]

//! Reversible patch management for long-lived host processes.
//!
//! A host that is never restarted between extension reloads accumulates
//! every leaked signal connection and every un-reverted override. This crate
//! makes each mutation of host state an explicit, owned record that is
//! guaranteed to be undone exactly once, in reverse order of application.
//!
//! # Key Components
//!
//! - [`PatchManager`] - ordered registry of setup/teardown pairs, scoped
//!   partial teardown, nested sub-managers
//! - [`ExtensionFeature`] - feature tree node whose sub-features follow a
//!   reactive boolean source
//! - [`IntervalRunner`] / [`Scheduler`] - repeating timers on a cooperative
//!   main loop
//! - [`Extension`] - top-level enable/disable driver owning the root manager
//!
//! # Ordering
//!
//! Within a manager, records and child managers share one ordered entry
//! list. `destroy()` walks it from the newest entry to the oldest; a child
//! manager is torn down completely at the position it was created. Across a
//! feature tree, sub-features are torn down before their parent's own
//! records.

pub mod config;
pub mod error;
pub mod extension;
pub mod feature;
pub mod interval;
pub mod patch;
pub mod scheduler;

pub use config::{ExtensionConfig, ManagerConfig, SchedulerConfig, TeardownPolicy};
pub use error::{BoxError, ExtensionError, FeatureError, PatchError, TeardownError, TeardownFailure};
pub use extension::Extension;
pub use feature::{ExtensionFeature, Feature};
pub use interval::IntervalRunner;
pub use patch::{
    ManagerId, PatchId, PatchManager, PatchOptions, Scope, Teardown, WeakPatchManager,
    patches_applied_total, patches_reverted_total, teardown_failures_total,
};
pub use scheduler::{Scheduler, TimerId};

pub use patchkit_core as core;
