#![forbid(unsafe_code)]

//! Top-level enable/disable driver.
//!
//! An [`Extension`] owns the root [`PatchManager`] and is handed to call
//! sites explicitly instead of living in a global. `enable` builds the root
//! feature on a fresh child manager; `disable` tears it down and, with
//! `leak_check` on, verifies that nothing was left behind.
//!
//! ```
//! use patchkit_runtime::{Extension, ExtensionConfig, ExtensionFeature, PatchManager};
//!
//! let extension = Extension::new(ExtensionConfig::new("touchup"));
//! for _ in 0..3 {
//!     extension
//!         .enable(|manager: PatchManager| Ok::<_, std::io::Error>(ExtensionFeature::new(manager)))
//!         .unwrap();
//!     extension.disable().unwrap();
//! }
//! assert_eq!(extension.cycles(), 3);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;

use tracing::{error, info, warn};

use crate::config::ExtensionConfig;
use crate::error::{BoxError, ExtensionError, PatchError, merge_results};
use crate::feature::Feature;
use crate::patch::{PatchId, PatchManager, Scope, Teardown};

/// Owns the root manager and the root feature of one extension.
pub struct Extension {
    config: ExtensionConfig,
    manager: PatchManager,
    root: RefCell<Option<Box<dyn Feature>>>,
    cycles: Cell<u64>,
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.config.name)
            .field("enabled", &self.is_enabled())
            .field("cycles", &self.cycles.get())
            .field("manager", &self.manager)
            .finish()
    }
}

impl Extension {
    #[must_use]
    pub fn new(config: ExtensionConfig) -> Self {
        let mut manager_config = config.manager.clone();
        if manager_config.label.is_none() {
            manager_config.label = Some(config.name.clone());
        }
        Self {
            manager: PatchManager::with_config(manager_config),
            config,
            root: RefCell::new(None),
            cycles: Cell::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    /// The root manager. Patches applied here directly outlive individual
    /// enable/disable cycles only until the next `disable`.
    #[must_use]
    pub fn manager(&self) -> &PatchManager {
        &self.manager
    }

    /// Apply a patch to the root manager.
    ///
    /// # Errors
    ///
    /// As for [`PatchManager::patch`].
    pub fn patch<T, F>(&self, setup: F) -> Result<PatchId, PatchError>
    where
        T: Teardown,
        F: FnOnce() -> T,
    {
        self.manager.patch(setup)
    }

    /// Apply a scoped patch to the root manager.
    ///
    /// # Errors
    ///
    /// As for [`PatchManager::patch`].
    pub fn patch_scoped<T, F>(&self, scope: Scope, setup: F) -> Result<PatchId, PatchError>
    where
        T: Teardown,
        F: FnOnce() -> T,
    {
        self.manager.patch_scoped(scope, setup)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.root.borrow().is_some()
    }

    /// Completed enable/disable cycles.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.get()
    }

    /// Build the root feature.
    ///
    /// # Errors
    ///
    /// - [`ExtensionError::AlreadyEnabled`] if a root feature exists.
    /// - [`ExtensionError::Activation`] if `factory` fails; whatever it
    ///   recorded is rolled back first.
    pub fn enable<T, E, F>(&self, factory: F) -> Result<(), ExtensionError>
    where
        T: Feature,
        E: Into<BoxError>,
        F: FnOnce(PatchManager) -> Result<T, E>,
    {
        if self.is_enabled() {
            return Err(ExtensionError::AlreadyEnabled {
                name: self.config.name.clone(),
            });
        }
        let child = self.manager.create_sub_manager()?;
        match factory(child.clone()) {
            Ok(feature) => {
                *self.root.borrow_mut() = Some(Box::new(feature));
                info!(
                    message = "extension.enable",
                    name = %self.config.name,
                    live_patches = self.manager.live_patches(),
                );
                Ok(())
            }
            Err(err) => {
                let source = err.into();
                error!(
                    message = "extension.activation_failed",
                    name = %self.config.name,
                    error = %source,
                );
                child.destroy()?;
                Err(ExtensionError::Activation {
                    name: self.config.name.clone(),
                    source,
                })
            }
        }
    }

    /// Tear down the root feature, then everything left on the root
    /// manager. Disabling a disabled extension still drains the root
    /// manager.
    ///
    /// # Errors
    ///
    /// - [`ExtensionError::Teardown`] with every failed teardown.
    /// - [`ExtensionError::Leaked`] if `leak_check` is on and patches are
    ///   still live afterwards.
    pub fn disable(&self) -> Result<(), ExtensionError> {
        let root = self.root.borrow_mut().take();
        let was_enabled = root.is_some();
        let feature_result = root.map_or(Ok(()), |feature| feature.destroy());
        let result = merge_results([feature_result, self.manager.destroy()]);
        if was_enabled {
            self.cycles.set(self.cycles.get() + 1);
        }
        info!(
            message = "extension.disable",
            name = %self.config.name,
            cycles = self.cycles.get(),
        );
        result?;

        if self.config.leak_check {
            let live = self.manager.live_patches();
            if live > 0 {
                warn!(message = "extension.leaked", name = %self.config.name, live);
                return Err(ExtensionError::Leaked {
                    name: self.config.name.clone(),
                    live,
                });
            }
        }
        Ok(())
    }

    /// Run `f` against the root feature if it is enabled and is a `T`.
    pub fn with_root<T, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: Feature,
    {
        let root = self.root.borrow();
        let feature = root.as_ref()?.as_any().downcast_ref::<T>()?;
        Some(f(feature))
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        if self.is_enabled() || !self.manager.is_empty() {
            warn!(message = "extension.dropped_enabled", name = %self.config.name);
            if let Err(err) = self.disable() {
                error!(
                    message = "extension.disable_failed",
                    name = %self.config.name,
                    error = %err,
                );
            }
        }
    }
}
