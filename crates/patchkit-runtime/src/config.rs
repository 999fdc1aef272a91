#![forbid(unsafe_code)]

//! Configuration for managers, schedulers and the extension driver.
//!
//! All structs implement `Default` and expose `#[must_use]` builder methods.
//! With the `serde` feature they (de)serialize, with missing fields taking
//! their defaults.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a manager does when a teardown fails during `destroy()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TeardownPolicy {
    /// Keep draining the remaining entries and report every failure at the
    /// end.
    #[default]
    BestEffort,
    /// Stop at the first failure. Entries not yet reached stay recorded and
    /// can be reverted by a later `destroy()`.
    Abort,
}

/// Per-manager settings. Child managers inherit everything except the label.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ManagerConfig {
    /// Name shown in logs.
    pub label: Option<String>,
    pub teardown_policy: TeardownPolicy,
    /// Run outstanding teardowns when the last handle to a manager is dropped.
    pub revert_on_drop: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            label: None,
            teardown_policy: TeardownPolicy::BestEffort,
            revert_on_drop: true,
        }
    }
}

impl ManagerConfig {
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_teardown_policy(mut self, policy: TeardownPolicy) -> Self {
        self.teardown_policy = policy;
        self
    }

    #[must_use]
    pub fn with_revert_on_drop(mut self, enabled: bool) -> Self {
        self.revert_on_drop = enabled;
        self
    }

    pub(crate) fn for_child(&self) -> Self {
        Self {
            label: None,
            ..self.clone()
        }
    }
}

/// Settings for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulerConfig {
    /// Upper bound on timer callbacks run by one `run_due()` call, so a burst
    /// of due timers cannot starve the rest of the main loop.
    pub max_dispatch_per_iteration: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_dispatch_per_iteration: 64,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn with_max_dispatch_per_iteration(mut self, max: usize) -> Self {
        self.max_dispatch_per_iteration = max.max(1);
        self
    }
}

/// Settings for the top-level [`Extension`](crate::Extension) driver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExtensionConfig {
    pub name: String,
    /// Config of the root manager; the label defaults to `name`.
    pub manager: ManagerConfig,
    /// After `disable()`, fail if the root manager still holds live patches.
    pub leak_check: bool,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            name: "extension".to_string(),
            manager: ManagerConfig::default(),
            leak_check: true,
        }
    }
}

impl ExtensionConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_manager(mut self, manager: ManagerConfig) -> Self {
        self.manager = manager;
        self
    }

    #[must_use]
    pub fn with_leak_check(mut self, enabled: bool) -> Self {
        self.leak_check = enabled;
        self
    }
}
