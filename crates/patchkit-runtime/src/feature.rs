#![forbid(unsafe_code)]

//! Feature trees driven by reactive boolean sources.
//!
//! An [`ExtensionFeature`] wraps a [`PatchManager`]. Building a feature is
//! activating it: its constructor applies patches directly to the manager it
//! was given. Sub-features are registered with
//! [`ExtensionFeature::add_sub_feature`]; each one follows a reactive
//! `bool` source, built by its factory when the source turns `true` and
//! destroyed when it turns `false`.
//!
//! # Invariants
//!
//! 1. A sub-feature has a live instance only while its source is `true`
//!    (unless its factory failed, in which case it stays inactive).
//! 2. Every activation gets a fresh child manager, nested in the parent's
//!    manager at the point of activation.
//! 3. `destroy()` tears down live sub-features, newest registration first,
//!    before the feature's own records.
//!
//! # Failure Modes
//!
//! A factory error during `add_sub_feature` is returned to the caller and
//! nothing is registered. A factory error raised from a change notification
//! has no caller to return to: it is logged at `error`, the child manager is
//! rolled back, and the sub-feature stays inactive until the next change.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use patchkit_core::{CHANGED, ReactiveSource};
use tracing::{debug, error};

use crate::error::{BoxError, FeatureError, TeardownError, merge_results};
use crate::patch::{PatchManager, PatchOptions, WeakPatchManager};

/// A unit of functionality that can be torn down.
///
/// Anything a sub-feature factory returns implements this. The feature's
/// patches live in the manager handed to the factory, which is destroyed
/// right after [`Feature::destroy`]; implement `destroy` only for cleanup
/// that is not expressed as patches.
pub trait Feature: Any {
    /// Tear down state owned outside the feature's manager.
    ///
    /// # Errors
    ///
    /// Teardown failures, aggregated.
    fn destroy(&self) -> Result<(), TeardownError> {
        Ok(())
    }

    /// Downcast support for [`ExtensionFeature::with_sub_feature`].
    fn as_any(&self) -> &dyn Any;
}

/// A feature with nothing to clean up beyond its manager.
impl Feature for () {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Factory = Box<dyn FnMut(PatchManager) -> Result<Box<dyn Feature>, BoxError>>;

struct ActiveInstance {
    manager: PatchManager,
    feature: Box<dyn Feature>,
}

struct SubFeature {
    name: String,
    factory: RefCell<Factory>,
    instance: RefCell<Option<ActiveInstance>>,
    /// Reads the source's value at reconcile time. Notification payloads
    /// can be stale when a listener ahead of this one sets the source again.
    enabled: Box<dyn Fn() -> bool>,
    /// A reconcile loop is running; nested notifications return at once and
    /// the loop picks up their value on its next pass.
    transitioning: Cell<bool>,
    /// The owning feature was destroyed; late notifications are ignored.
    retired: Cell<bool>,
}

impl SubFeature {
    fn is_active(&self) -> bool {
        self.instance.borrow().is_some()
    }

    fn activate(&self, parent: &PatchManager) -> Result<(), FeatureError> {
        let child = parent.create_sub_manager()?;
        let built = {
            let mut factory = self.factory.borrow_mut();
            (*factory)(child.clone())
        };
        match built {
            Ok(feature) => {
                debug!(
                    message = "feature.sub_feature.activate",
                    name = %self.name,
                    manager = child.id().raw(),
                );
                *self.instance.borrow_mut() = Some(ActiveInstance {
                    manager: child,
                    feature,
                });
                Ok(())
            }
            Err(source) => {
                // The factory rolls back its own partial setup; anything it
                // did record is reverted here.
                if let Err(err) = child.destroy() {
                    error!(
                        message = "feature.sub_feature.rollback_failed",
                        name = %self.name,
                        error = %err,
                    );
                }
                Err(FeatureError::Activation {
                    name: self.name.clone(),
                    source,
                })
            }
        }
    }

    fn deactivate(&self) -> Result<(), TeardownError> {
        let Some(active) = self.instance.borrow_mut().take() else {
            return Ok(());
        };
        debug!(
            message = "feature.sub_feature.deactivate",
            name = %self.name,
            manager = active.manager.id().raw(),
        );
        let ActiveInstance { manager, feature } = active;
        let own = feature.destroy();
        drop(feature);
        merge_results([own, manager.destroy()])
    }

    /// Bring the instance in line with the source's current value, looping
    /// until a pass sees no change. Re-entrant calls return immediately.
    fn reconcile(&self, parent: &PatchManager) -> Result<(), FeatureError> {
        if self.transitioning.replace(true) {
            return Ok(());
        }
        let mut result = Ok(());
        loop {
            let want = !self.retired.get() && (self.enabled)();
            if want == self.is_active() {
                break;
            }
            if want {
                if let Err(err) = self.activate(parent) {
                    result = Err(err);
                    break;
                }
            } else if let Err(err) = self.deactivate() {
                result = Err(FeatureError::Teardown(err));
            }
        }
        self.transitioning.set(false);
        result
    }
}

/// A node of the feature tree.
///
/// # Example
///
/// ```
/// use patchkit_runtime::core::Observable;
/// use patchkit_runtime::{ExtensionFeature, Feature, PatchManager};
///
/// let setting = Observable::new(false);
/// let root = ExtensionFeature::new(PatchManager::new());
/// root.add_sub_feature("hot-corner", |_manager: PatchManager| Ok::<_, std::io::Error>(()), &setting)
///     .unwrap();
/// assert!(!root.is_active("hot-corner"));
/// setting.set(true);
/// assert!(root.is_active("hot-corner"));
/// root.destroy().unwrap();
/// assert!(!root.is_active("hot-corner"));
/// ```
pub struct ExtensionFeature {
    manager: PatchManager,
    sub_features: RefCell<Vec<Rc<SubFeature>>>,
}

impl fmt::Debug for ExtensionFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionFeature")
            .field("manager", &self.manager)
            .field("sub_features", &self.sub_feature_names())
            .finish()
    }
}

impl ExtensionFeature {
    /// Wrap `manager`. The feature owns the manager's contents from now on.
    #[must_use]
    pub fn new(manager: PatchManager) -> Self {
        Self {
            manager,
            sub_features: RefCell::new(Vec::new()),
        }
    }

    /// The manager this feature patches through.
    #[must_use]
    pub fn manager(&self) -> &PatchManager {
        &self.manager
    }

    /// Register a sub-feature that follows `enabled`.
    ///
    /// The change subscription is itself a patch on this feature's manager.
    /// If `enabled` is currently `true`, the factory runs before this call
    /// returns.
    ///
    /// # Errors
    ///
    /// - [`FeatureError::DuplicateSubFeature`] if `name` is taken.
    /// - [`FeatureError::Patch`] if subscribing fails.
    /// - [`FeatureError::Activation`] if the initial activation fails; the
    ///   subscription is reverted and nothing stays registered.
    pub fn add_sub_feature<T, E, F, S>(
        &self,
        name: impl Into<String>,
        mut factory: F,
        enabled: &S,
    ) -> Result<(), FeatureError>
    where
        T: Feature,
        E: Into<BoxError>,
        F: FnMut(PatchManager) -> Result<T, E> + 'static,
        S: ReactiveSource<Payload = bool> + Clone + 'static,
    {
        let name = name.into();
        if self.sub_features.borrow().iter().any(|s| s.name == name) {
            return Err(FeatureError::DuplicateSubFeature { name });
        }

        let slot = Rc::new(SubFeature {
            name: name.clone(),
            factory: RefCell::new(Box::new(move |manager| {
                factory(manager)
                    .map(|feature| Box::new(feature) as Box<dyn Feature>)
                    .map_err(Into::into)
            })),
            instance: RefCell::new(None),
            enabled: {
                let source = enabled.clone();
                Box::new(move || source.current())
            },
            transitioning: Cell::new(false),
            retired: Cell::new(false),
        });

        let subscription = {
            let weak_slot: Weak<SubFeature> = Rc::downgrade(&slot);
            let weak_manager: WeakPatchManager = self.manager.downgrade();
            self.manager.connect_to_with(
                PatchOptions::new().with_label(format!("sub_feature:{name}")),
                enabled,
                CHANGED,
                move |value: &bool| {
                    let (Some(slot), Some(parent)) = (weak_slot.upgrade(), weak_manager.upgrade())
                    else {
                        return;
                    };
                    if slot.retired.get() {
                        return;
                    }
                    if let Err(err) = slot.reconcile(&parent) {
                        error!(
                            message = "feature.sub_feature.transition_failed",
                            name = %slot.name,
                            enabled = *value,
                            error = %err,
                        );
                    }
                },
            )?
        };

        if let Err(err) = slot.reconcile(&self.manager) {
            slot.retired.set(true);
            if let Err(revert_err) = self.manager.revert(subscription) {
                error!(
                    message = "feature.sub_feature.unsubscribe_failed",
                    name = %name,
                    error = %revert_err,
                );
            }
            return Err(err);
        }

        self.sub_features.borrow_mut().push(slot);
        Ok(())
    }

    /// Whether the named sub-feature currently has a live instance.
    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.find(name).is_some_and(|slot| slot.is_active())
    }

    /// Registered sub-feature names, in registration order.
    #[must_use]
    pub fn sub_feature_names(&self) -> Vec<String> {
        self.sub_features
            .borrow()
            .iter()
            .map(|slot| slot.name.clone())
            .collect()
    }

    /// Run `f` against the live instance of `name`, if it exists and is a `T`.
    ///
    /// The instance stays borrowed while `f` runs, so `f` must not toggle
    /// that sub-feature's source.
    pub fn with_sub_feature<T, R>(&self, name: &str, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: Feature,
    {
        let slot = self.find(name)?;
        let instance = slot.instance.borrow();
        let feature = instance.as_ref()?.feature.as_any().downcast_ref::<T>()?;
        Some(f(feature))
    }

    fn find(&self, name: &str) -> Option<Rc<SubFeature>> {
        self.sub_features
            .borrow()
            .iter()
            .find(|slot| slot.name == name)
            .cloned()
    }

    /// Tear down every live sub-feature (newest registration first), then
    /// this feature's own records. The feature is inert afterwards.
    ///
    /// # Errors
    ///
    /// Every teardown failure across the subtree, in the order they ran.
    pub fn destroy(&self) -> Result<(), TeardownError> {
        let slots: Vec<Rc<SubFeature>> = self.sub_features.borrow().clone();
        let mut results = Vec::with_capacity(slots.len() + 1);
        for slot in slots.iter().rev() {
            slot.retired.set(true);
            results.push(slot.deactivate());
        }
        results.push(self.manager.destroy());
        self.sub_features.borrow_mut().clear();
        merge_results(results)
    }
}

impl Feature for ExtensionFeature {
    fn destroy(&self) -> Result<(), TeardownError> {
        ExtensionFeature::destroy(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
