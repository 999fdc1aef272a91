#![forbid(unsafe_code)]

//! patchkit public facade crate.
//!
//! Reversible patches, feature trees and the reactive primitives they hang
//! off, behind one dependency.

pub use patchkit_core as core;
pub use patchkit_runtime as runtime;

pub mod prelude {
    pub use patchkit_core::{
        CHANGED, Clock, ConnectionId, EventEmitter, LabClock, Observable, ReactiveSource, Signal,
        SignalSource, SourceError,
    };
    pub use patchkit_runtime::patch::teardown::fallible;
    pub use patchkit_runtime::{
        BoxError, Extension, ExtensionConfig, ExtensionError, ExtensionFeature, Feature,
        FeatureError, IntervalRunner, ManagerConfig, PatchError, PatchId, PatchManager,
        PatchOptions, Scheduler, SchedulerConfig, Scope, Teardown, TeardownError, TeardownPolicy,
    };
}
