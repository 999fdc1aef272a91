#![forbid(unsafe_code)]

//! [`PatchManager`]: ordered, nestable registry of reversible patches.
//!
//! # Design
//!
//! A manager is a cheap, clonable handle (`Rc<RefCell<..>>`) to one ordered
//! list of entries. An entry is either a patch record (teardown plus optional
//! scope and label) or a child manager. Applying a patch runs the setup
//! immediately and appends the returned teardown; `destroy()` pops entries
//! from the end until the list is empty.
//!
//! No borrow of the entry list is held while user code runs. Setups,
//! teardowns and child destroys all execute with the manager unlocked, so
//! they may freely inspect it; only adding new work to a manager that is
//! tearing down is rejected.
//!
//! # Failure Modes
//!
//! - **Setup fails**: nothing is recorded, the error is returned.
//! - **Teardown fails or panics**: recorded as a [`TeardownFailure`]; the
//!   manager keeps draining (or stops, under [`TeardownPolicy::Abort`]) and
//!   the failures are returned together.
//! - **Last handle dropped with live entries**: teardowns run from `Drop`
//!   (unless disabled in [`ManagerConfig`]) and a warning is logged.

use std::cell::RefCell;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use patchkit_core::SignalSource;
use patchkit_core::panic::describe_panic;
use tracing::{debug, debug_span, error, warn};

use super::ids::{ManagerId, PatchId, Scope};
use super::teardown::{Disconnect, Teardown};
use crate::config::{ManagerConfig, TeardownPolicy};
use crate::error::{BoxError, PatchError, TeardownError, TeardownFailure, into_result};

// ─── Metrics counters ────────────────────────────────────────────────────────

static PATCHES_APPLIED_TOTAL: AtomicU64 = AtomicU64::new(0);
static PATCHES_REVERTED_TOTAL: AtomicU64 = AtomicU64::new(0);
static TEARDOWN_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Patches successfully applied in this process.
#[must_use]
pub fn patches_applied_total() -> u64 {
    PATCHES_APPLIED_TOTAL.load(Ordering::Relaxed)
}

/// Teardowns that completed successfully in this process.
#[must_use]
pub fn patches_reverted_total() -> u64 {
    PATCHES_REVERTED_TOTAL.load(Ordering::Relaxed)
}

/// Teardowns that returned an error or panicked in this process.
#[must_use]
pub fn teardown_failures_total() -> u64 {
    TEARDOWN_FAILURES_TOTAL.load(Ordering::Relaxed)
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Optional metadata attached to a patch.
#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    pub scope: Option<Scope>,
    pub label: Option<String>,
}

impl PatchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options tagging the patch with `scope`.
    #[must_use]
    pub fn scoped(scope: Scope) -> Self {
        Self {
            scope: Some(scope),
            label: None,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ─── Inner state ─────────────────────────────────────────────────────────────

struct PatchRecord {
    id: PatchId,
    scope: Option<Scope>,
    label: Option<String>,
    teardown: Box<dyn Teardown>,
}

enum Entry {
    Patch(PatchRecord),
    Child { id: ManagerId, manager: PatchManager },
}

struct ManagerInner {
    id: ManagerId,
    config: ManagerConfig,
    entries: Vec<Entry>,
    /// Lookup only; never keeps the parent alive.
    parent: Weak<RefCell<ManagerInner>>,
    tearing_down: bool,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        if !self.config.revert_on_drop {
            warn!(
                message = "patch_manager.leaked",
                manager = self.id.raw(),
                entries = entries.len(),
            );
            return;
        }
        warn!(
            message = "patch_manager.dropped_live",
            manager = self.id.raw(),
            entries = entries.len(),
        );
        for entry in entries.into_iter().rev() {
            match entry {
                Entry::Patch(record) => {
                    // Failures are already logged by revert_record.
                    let _ = revert_record(self.id, record);
                }
                Entry::Child { manager, .. } => {
                    let _ = manager.destroy();
                }
            }
        }
    }
}

/// Remove the patch record at `index`; `None` if that slot is a child.
fn take_patch(entries: &mut Vec<Entry>, index: usize) -> Option<PatchRecord> {
    if !matches!(entries.get(index), Some(Entry::Patch(_))) {
        return None;
    }
    match entries.remove(index) {
        Entry::Patch(record) => Some(record),
        Entry::Child { .. } => None,
    }
}

/// Run one teardown, containing errors and panics.
fn revert_record(manager: ManagerId, record: PatchRecord) -> Result<(), TeardownFailure> {
    let PatchRecord {
        id,
        scope,
        label,
        teardown,
    } = record;
    let outcome = catch_unwind(AssertUnwindSafe(move || teardown.revert()));
    let (reason, panicked) = match outcome {
        Ok(Ok(())) => {
            PATCHES_REVERTED_TOTAL.fetch_add(1, Ordering::Relaxed);
            debug!(
                message = "patch.revert",
                manager = manager.raw(),
                patch = id.raw(),
                label = label.as_deref().unwrap_or(""),
            );
            return Ok(());
        }
        Ok(Err(err)) => (err.to_string(), false),
        Err(payload) => (describe_panic(&*payload), true),
    };
    TEARDOWN_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
    error!(
        message = "patch.teardown_failed",
        manager = manager.raw(),
        patch = id.raw(),
        label = label.as_deref().unwrap_or(""),
        panicked,
        reason = %reason,
    );
    Err(TeardownFailure {
        manager,
        patch: id,
        scope,
        label,
        reason,
        panicked,
    })
}

// ─── PatchManager ────────────────────────────────────────────────────────────

/// Ordered registry of reversible patches.
///
/// Cloning a `PatchManager` creates a new handle to the **same** registry.
///
/// # Example
///
/// ```
/// use patchkit_runtime::PatchManager;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let manager = PatchManager::new();
/// for n in [1, 2] {
///     let log = Rc::clone(&log);
///     manager
///         .patch(move || {
///             log.borrow_mut().push(n);
///             move || log.borrow_mut().push(-n)
///         })
///         .unwrap();
/// }
/// manager.destroy().unwrap();
/// assert_eq!(*log.borrow(), vec![1, 2, -2, -1]);
/// ```
pub struct PatchManager {
    inner: Rc<RefCell<ManagerInner>>,
}

impl Clone for PatchManager {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for PatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("PatchManager")
                .field("id", &inner.id)
                .field("label", &inner.config.label)
                .field("entries", &inner.entries.len())
                .field("tearing_down", &inner.tearing_down)
                .finish(),
            Err(_) => f.debug_struct("PatchManager").finish_non_exhaustive(),
        }
    }
}

impl Default for PatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PatchManager {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PatchManager {}

impl PatchManager {
    // ── Constructors ─────────────────────────────────────────────────

    /// Create a root manager with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Create a root manager.
    #[must_use]
    pub fn with_config(config: ManagerConfig) -> Self {
        Self::build(config, Weak::new())
    }

    fn build(config: ManagerConfig, parent: Weak<RefCell<ManagerInner>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ManagerInner {
                id: ManagerId::next(),
                config,
                entries: Vec::new(),
                parent,
                tearing_down: false,
            })),
        }
    }

    /// Allocate a child manager nested at the current end of this manager.
    ///
    /// The child is torn down, as a whole, when this manager's `destroy()`
    /// reaches its position, so later entries are reverted before it and
    /// earlier entries after it.
    ///
    /// Destroying the child directly detaches it from this manager once it
    /// is empty; patches applied to it afterwards are no longer reached by
    /// this manager's `destroy()`. Create a new sub-manager instead.
    ///
    /// # Errors
    ///
    /// [`PatchError::TearingDown`] while this manager is destroying.
    pub fn create_sub_manager(&self) -> Result<PatchManager, PatchError> {
        self.ensure_accepting()?;
        let config = self.inner.borrow().config.for_child();
        let child = Self::build(config, Rc::downgrade(&self.inner));
        let child_id = child.id();
        self.inner.borrow_mut().entries.push(Entry::Child {
            id: child_id,
            manager: child.clone(),
        });
        debug!(
            message = "patch_manager.sub_manager",
            manager = self.id().raw(),
            child = child_id.raw(),
        );
        Ok(child)
    }

    // ── Queries ──────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn id(&self) -> ManagerId {
        self.inner.borrow().id
    }

    #[must_use]
    pub fn label(&self) -> Option<String> {
        self.inner.borrow().config.label.clone()
    }

    #[must_use]
    pub fn config(&self) -> ManagerConfig {
        self.inner.borrow().config.clone()
    }

    /// Number of direct entries (patch records plus child managers).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// `true` when the manager is inert and can be discarded freely.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Patch records held by this manager and all of its descendants.
    #[must_use]
    pub fn live_patches(&self) -> usize {
        let (own, children) = {
            let inner = self.inner.borrow();
            let own = inner
                .entries
                .iter()
                .filter(|e| matches!(e, Entry::Patch(_)))
                .count();
            (own, Self::child_handles(&inner))
        };
        own + children.iter().map(PatchManager::live_patches).sum::<usize>()
    }

    /// Whether a `destroy()` on this manager is in progress.
    #[must_use]
    pub fn is_tearing_down(&self) -> bool {
        self.inner.borrow().tearing_down
    }

    /// The manager this one was created from, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<PatchManager> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| PatchManager { inner })
    }

    /// Direct child managers in creation order.
    #[must_use]
    pub fn children(&self) -> Vec<PatchManager> {
        Self::child_handles(&self.inner.borrow())
    }

    /// A handle that does not keep the manager alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakPatchManager {
        WeakPatchManager {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn child_handles(inner: &ManagerInner) -> Vec<PatchManager> {
        inner
            .entries
            .iter()
            .filter_map(|e| match e {
                Entry::Child { manager, .. } => Some(manager.clone()),
                Entry::Patch(_) => None,
            })
            .collect()
    }

    fn ensure_accepting(&self) -> Result<(), PatchError> {
        let inner = self.inner.borrow();
        if inner.tearing_down {
            warn!(message = "patch.rejected_during_teardown", manager = inner.id.raw());
            return Err(PatchError::TearingDown { manager: inner.id });
        }
        Ok(())
    }

    // ── Applying patches ─────────────────────────────────────────────

    /// Run `setup` now and record the teardown it returns.
    ///
    /// # Errors
    ///
    /// [`PatchError::TearingDown`] while this manager is destroying; `setup`
    /// is not run in that case.
    pub fn patch<T, F>(&self, setup: F) -> Result<PatchId, PatchError>
    where
        T: Teardown,
        F: FnOnce() -> T,
    {
        self.patch_with(PatchOptions::default(), setup)
    }

    /// [`patch`](Self::patch) tagged with `scope`.
    ///
    /// # Errors
    ///
    /// As for [`patch`](Self::patch).
    pub fn patch_scoped<T, F>(&self, scope: Scope, setup: F) -> Result<PatchId, PatchError>
    where
        T: Teardown,
        F: FnOnce() -> T,
    {
        self.patch_with(PatchOptions::scoped(scope), setup)
    }

    /// [`patch`](Self::patch) with explicit options.
    ///
    /// # Errors
    ///
    /// As for [`patch`](Self::patch).
    pub fn patch_with<T, F>(&self, options: PatchOptions, setup: F) -> Result<PatchId, PatchError>
    where
        T: Teardown,
        F: FnOnce() -> T,
    {
        self.ensure_accepting()?;
        let teardown = setup();
        Ok(self.push_record(options, Box::new(teardown)))
    }

    /// Run a fallible `setup`; record its teardown only if it succeeds.
    ///
    /// A setup that fails must roll back whatever it already changed before
    /// returning the error.
    ///
    /// # Errors
    ///
    /// [`PatchError::Setup`] wrapping the setup's error, or
    /// [`PatchError::TearingDown`].
    pub fn try_patch<T, E, F>(&self, setup: F) -> Result<PatchId, PatchError>
    where
        T: Teardown,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.try_patch_with(PatchOptions::default(), setup)
    }

    /// [`try_patch`](Self::try_patch) with explicit options.
    ///
    /// # Errors
    ///
    /// As for [`try_patch`](Self::try_patch).
    pub fn try_patch_with<T, E, F>(
        &self,
        options: PatchOptions,
        setup: F,
    ) -> Result<PatchId, PatchError>
    where
        T: Teardown,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.ensure_accepting()?;
        match setup() {
            Ok(teardown) => Ok(self.push_record(options, Box::new(teardown))),
            Err(err) => {
                let err = err.into();
                debug!(
                    message = "patch.setup_failed",
                    manager = self.id().raw(),
                    label = options.label.as_deref().unwrap_or(""),
                    error = %err,
                );
                Err(PatchError::Setup(err))
            }
        }
    }

    /// Connect `handler` to `source`'s `signal` and record the disconnect.
    ///
    /// # Errors
    ///
    /// [`PatchError::Source`] if the source rejects the signal name, or
    /// [`PatchError::TearingDown`].
    pub fn connect_to<S, H>(&self, source: &S, signal: &str, handler: H) -> Result<PatchId, PatchError>
    where
        S: SignalSource + Clone + 'static,
        H: Fn(&S::Payload) + 'static,
    {
        self.connect_to_with(PatchOptions::default(), source, signal, handler)
    }

    /// [`connect_to`](Self::connect_to) with explicit options. Without a
    /// label, the record is labelled `"<source kind>::<signal>"`.
    ///
    /// # Errors
    ///
    /// As for [`connect_to`](Self::connect_to).
    pub fn connect_to_with<S, H>(
        &self,
        mut options: PatchOptions,
        source: &S,
        signal: &str,
        handler: H,
    ) -> Result<PatchId, PatchError>
    where
        S: SignalSource + Clone + 'static,
        H: Fn(&S::Payload) + 'static,
    {
        self.ensure_accepting()?;
        let id = source.connect_signal(signal, Box::new(handler))?;
        if options.label.is_none() {
            options.label = Some(format!("{}::{signal}", source.source_kind()));
        }
        let teardown = Disconnect {
            source: source.clone(),
            signal: signal.to_string(),
            id,
        };
        Ok(self.push_record(options, Box::new(teardown)))
    }

    fn push_record(&self, options: PatchOptions, teardown: Box<dyn Teardown>) -> PatchId {
        let id = PatchId::next();
        let mut inner = self.inner.borrow_mut();
        debug!(
            message = "patch.apply",
            manager = inner.id.raw(),
            patch = id.raw(),
            scope = options.scope.map(Scope::id),
            label = options.label.as_deref().unwrap_or(""),
        );
        inner.entries.push(Entry::Patch(PatchRecord {
            id,
            scope: options.scope,
            label: options.label,
            teardown,
        }));
        PATCHES_APPLIED_TOTAL.fetch_add(1, Ordering::Relaxed);
        id
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Tear down every entry, newest first, recursing into children.
    ///
    /// Afterwards the manager is empty (unless [`TeardownPolicy::Abort`]
    /// stopped early) and may be reused. Calling it on an empty manager,
    /// or from inside one of its own teardowns, does nothing.
    ///
    /// # Errors
    ///
    /// A [`TeardownError`] listing every failed teardown, in the order they
    /// ran, including failures inside child managers.
    pub fn destroy(&self) -> Result<(), TeardownError> {
        let (id, policy, entries) = {
            let mut inner = self.inner.borrow_mut();
            if inner.tearing_down {
                return Ok(());
            }
            if inner.entries.is_empty() {
                drop(inner);
                self.unlink_from_parent();
                return Ok(());
            }
            inner.tearing_down = true;
            (inner.id, inner.config.teardown_policy, inner.entries.len())
        };
        let span = debug_span!("patch_manager.destroy", manager = id.raw(), entries);
        let _guard = span.enter();

        let mut failures = Vec::new();
        loop {
            let Some(entry) = self.inner.borrow_mut().entries.pop() else {
                break;
            };
            let failed = match entry {
                Entry::Patch(record) => match revert_record(id, record) {
                    Ok(()) => false,
                    Err(failure) => {
                        failures.push(failure);
                        true
                    }
                },
                Entry::Child {
                    id: child_id,
                    manager,
                } => {
                    let result = manager.destroy();
                    if !manager.is_empty() {
                        // Aborted part-way; keep it reachable.
                        self.inner.borrow_mut().entries.push(Entry::Child {
                            id: child_id,
                            manager,
                        });
                    }
                    match result {
                        Ok(()) => false,
                        Err(err) => {
                            failures.extend(err.into_failures());
                            true
                        }
                    }
                }
            };
            if failed && policy == TeardownPolicy::Abort {
                break;
            }
        }

        let now_empty = {
            let mut inner = self.inner.borrow_mut();
            inner.tearing_down = false;
            inner.entries.is_empty()
        };
        if now_empty {
            self.unlink_from_parent();
        }
        debug!(
            message = "patch_manager.destroyed",
            manager = id.raw(),
            failures = failures.len(),
        );
        into_result(failures)
    }

    /// Tear down only the records tagged `scope`, here and in every child,
    /// newest first. Untagged and differently tagged records stay in place.
    ///
    /// # Errors
    ///
    /// A [`TeardownError`] listing every failed teardown.
    pub fn destroy_scope(&self, scope: Scope) -> Result<(), TeardownError> {
        let (id, policy, mut index) = {
            let mut inner = self.inner.borrow_mut();
            if inner.tearing_down {
                return Ok(());
            }
            inner.tearing_down = true;
            (inner.id, inner.config.teardown_policy, inner.entries.len())
        };
        let span = debug_span!(
            "patch_manager.destroy_scope",
            manager = id.raw(),
            scope = scope.id()
        );
        let _guard = span.enter();

        enum Step {
            Revert(PatchRecord),
            Descend(PatchManager),
            Skip,
        }

        let mut failures = Vec::new();
        loop {
            let step = {
                let mut inner = self.inner.borrow_mut();
                // A teardown may have reverted records below the cursor.
                index = index.min(inner.entries.len());
                if index == 0 {
                    break;
                }
                index -= 1;
                let in_scope = matches!(
                    &inner.entries[index],
                    Entry::Patch(record) if record.scope == Some(scope)
                );
                if in_scope {
                    take_patch(&mut inner.entries, index).map_or(Step::Skip, Step::Revert)
                } else if let Entry::Child { manager, .. } = &inner.entries[index] {
                    Step::Descend(manager.clone())
                } else {
                    Step::Skip
                }
            };
            let failed = match step {
                Step::Revert(record) => match revert_record(id, record) {
                    Ok(()) => false,
                    Err(failure) => {
                        failures.push(failure);
                        true
                    }
                },
                Step::Descend(child) => match child.destroy_scope(scope) {
                    Ok(()) => false,
                    Err(err) => {
                        failures.extend(err.into_failures());
                        true
                    }
                },
                Step::Skip => false,
            };
            if failed && policy == TeardownPolicy::Abort {
                break;
            }
        }

        self.inner.borrow_mut().tearing_down = false;
        into_result(failures)
    }

    /// Tear down one patch now, wherever it lives in this manager's tree.
    ///
    /// Returns `Ok(false)` if no live record has this id.
    ///
    /// # Errors
    ///
    /// A [`TeardownError`] if the teardown fails; the record is gone either
    /// way.
    pub fn revert(&self, patch: PatchId) -> Result<bool, TeardownError> {
        let (id, record, children) = {
            let mut inner = self.inner.borrow_mut();
            let record = inner
                .entries
                .iter()
                .position(|e| matches!(e, Entry::Patch(r) if r.id == patch))
                .and_then(|pos| take_patch(&mut inner.entries, pos));
            let children = if record.is_none() {
                Self::child_handles(&inner)
            } else {
                Vec::new()
            };
            (inner.id, record, children)
        };
        if let Some(record) = record {
            let failures: Vec<_> = revert_record(id, record).err().into_iter().collect();
            return into_result(failures).map(|()| true);
        }
        for child in children {
            if child.revert(patch)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn unlink_from_parent(&self) {
        let (id, parent) = {
            let inner = self.inner.borrow();
            (inner.id, inner.parent.upgrade())
        };
        let Some(parent) = parent else {
            return;
        };
        // The parent may be mid-destroy with this child already popped, or
        // borrowed further up the stack; either way there is nothing to do.
        if let Ok(mut parent) = parent.try_borrow_mut() {
            parent
                .entries
                .retain(|e| !matches!(e, Entry::Child { id: child, .. } if *child == id));
        }
    }
}

/// Non-owning handle to a [`PatchManager`].
#[derive(Clone)]
pub struct WeakPatchManager {
    inner: Weak<RefCell<ManagerInner>>,
}

impl WeakPatchManager {
    #[must_use]
    pub fn upgrade(&self) -> Option<PatchManager> {
        self.inner.upgrade().map(|inner| PatchManager { inner })
    }
}

impl fmt::Debug for WeakPatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakPatchManager")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::teardown::fallible;
    use patchkit_core::{CHANGED, EventEmitter, Signal};
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<i32>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push_pair(manager: &PatchManager, log: &Log, n: i32) -> PatchId {
        let log = Rc::clone(log);
        manager
            .patch(move || {
                log.borrow_mut().push(n);
                move || log.borrow_mut().push(-n)
            })
            .expect("manager accepts patches")
    }

    #[test]
    fn destroy_reverts_in_reverse_order() {
        let log = log();
        let manager = PatchManager::new();
        push_pair(&manager, &log, 1);
        push_pair(&manager, &log, 2);
        assert_eq!(manager.len(), 2);
        manager.destroy().expect("clean teardown");
        assert_eq!(*log.borrow(), vec![1, 2, -2, -1]);
        assert!(manager.is_empty());
    }

    #[test]
    fn second_destroy_is_noop() {
        let log = log();
        let manager = PatchManager::new();
        push_pair(&manager, &log, 7);
        manager.destroy().expect("clean teardown");
        manager.destroy().expect("empty destroy");
        assert_eq!(*log.borrow(), vec![7, -7]);
    }

    #[test]
    fn manager_is_reusable_after_destroy() {
        let log = log();
        let manager = PatchManager::new();
        push_pair(&manager, &log, 1);
        manager.destroy().expect("clean teardown");
        push_pair(&manager, &log, 2);
        manager.destroy().expect("clean teardown");
        assert_eq!(*log.borrow(), vec![1, -1, 2, -2]);
    }

    #[test]
    fn failed_setup_records_nothing() {
        let manager = PatchManager::new();
        let err = manager
            .try_patch(|| Err::<fn(), _>("no such actor"))
            .unwrap_err();
        assert!(matches!(err, PatchError::Setup(_)));
        assert!(manager.is_empty());
    }

    #[test]
    fn successful_try_patch_records() {
        let hit = Rc::new(Cell::new(false));
        let hit_in = Rc::clone(&hit);
        let manager = PatchManager::new();
        manager
            .try_patch(|| Ok::<_, BoxError>(move || hit_in.set(true)))
            .expect("setup succeeds");
        manager.destroy().expect("clean teardown");
        assert!(hit.get());
    }

    #[test]
    fn scoped_destroy_leaves_other_records() {
        let log = log();
        let manager = PatchManager::new();
        let a = Scope::new("a");
        let b = Scope::new("b");
        for (n, scope) in [(1, a), (2, b), (3, a), (4, b)] {
            let log = Rc::clone(&log);
            manager
                .patch_scoped(scope, move || move || log.borrow_mut().push(n))
                .expect("accepts");
        }
        manager.destroy_scope(a).expect("clean");
        assert_eq!(*log.borrow(), vec![3, 1]);
        assert_eq!(manager.len(), 2);
        manager.destroy().expect("clean");
        assert_eq!(*log.borrow(), vec![3, 1, 4, 2]);
    }

    #[test]
    fn scoped_destroy_reaches_children() {
        let log = log();
        let scope = Scope::new("overview");
        let manager = PatchManager::new();
        let child = manager.create_sub_manager().expect("child");
        {
            let log = Rc::clone(&log);
            child
                .patch_scoped(scope, move || move || log.borrow_mut().push(1))
                .expect("accepts");
        }
        push_pair(&child, &log, 2);
        manager.destroy_scope(scope).expect("clean");
        assert_eq!(*log.borrow(), vec![2, 1]);
        assert_eq!(child.live_patches(), 1);
    }

    #[test]
    fn child_reverts_at_its_position() {
        let log = log();
        let manager = PatchManager::new();
        push_pair(&manager, &log, 1);
        let child = manager.create_sub_manager().expect("child");
        push_pair(&manager, &log, 3);
        push_pair(&child, &log, 2);
        manager.destroy().expect("clean");
        assert_eq!(*log.borrow(), vec![1, 3, 2, -3, -2, -1]);
    }

    #[test]
    fn child_destroy_unlinks_from_parent() {
        let manager = PatchManager::new();
        let child = manager.create_sub_manager().expect("child");
        assert_eq!(manager.children(), vec![child.clone()]);
        assert_eq!(child.parent(), Some(manager.clone()));
        child.destroy().expect("empty child");
        assert!(manager.children().is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn failing_teardowns_are_aggregated() {
        let log = log();
        let manager = PatchManager::new();
        push_pair(&manager, &log, 1);
        manager
            .patch_with(PatchOptions::new().with_label("panel chrome"), || {
                fallible(|| Err("actor disposed"))
            })
            .expect("accepts");
        manager
            .patch(|| {
                || {
                    if true {
                        panic!("style class missing");
                    }
                }
            })
            .expect("accepts");
        push_pair(&manager, &log, 2);

        let err = manager.destroy().unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.failures()[0].panicked);
        assert_eq!(err.failures()[1].label.as_deref(), Some("panel chrome"));
        assert_eq!(*log.borrow(), vec![1, 2, -2, -1]);
        assert!(manager.is_empty());
    }

    #[test]
    fn abort_policy_stops_at_first_failure() {
        let log = log();
        let manager = PatchManager::with_config(
            ManagerConfig::default().with_teardown_policy(TeardownPolicy::Abort),
        );
        push_pair(&manager, &log, 1);
        manager
            .patch(|| fallible(|| Err("boom")))
            .expect("accepts");
        push_pair(&manager, &log, 2);

        assert_eq!(manager.destroy().unwrap_err().len(), 1);
        assert_eq!(*log.borrow(), vec![1, 2, -2]);
        assert_eq!(manager.len(), 1);
        manager.destroy().expect("remaining record reverts");
        assert_eq!(*log.borrow(), vec![1, 2, -2, -1]);
    }

    #[test]
    fn patching_during_teardown_is_rejected() {
        let manager = PatchManager::new();
        let rejected = Rc::new(Cell::new(false));
        {
            let handle = manager.clone();
            let rejected = Rc::clone(&rejected);
            manager
                .patch(move || {
                    move || {
                        let result = handle.patch(|| || {});
                        rejected.set(matches!(result, Err(PatchError::TearingDown { .. })));
                        assert!(handle.is_tearing_down());
                    }
                })
                .expect("accepts");
        }
        manager.destroy().expect("clean");
        assert!(rejected.get());
        assert!(manager.is_empty());
    }

    #[test]
    fn revert_single_patch() {
        let log = log();
        let manager = PatchManager::new();
        push_pair(&manager, &log, 1);
        let child = manager.create_sub_manager().expect("child");
        let nested = push_pair(&child, &log, 2);
        assert!(manager.revert(nested).expect("clean"));
        assert!(!manager.revert(nested).expect("already gone"));
        assert_eq!(manager.live_patches(), 1);
        assert_eq!(*log.borrow(), vec![1, 2, -2]);
    }

    #[test]
    fn connect_to_disconnects_on_destroy() {
        let signal: Signal<u32> = Signal::new();
        let seen = Rc::new(Cell::new(0));
        let manager = PatchManager::new();
        {
            let seen = Rc::clone(&seen);
            manager
                .connect_to(&signal, CHANGED, move |v: &u32| seen.set(*v))
                .expect("changed exists");
        }
        signal.emit(&5);
        manager.destroy().expect("clean");
        signal.emit(&9);
        assert_eq!(seen.get(), 5);
        assert!(!signal.has_listeners());
    }

    #[test]
    fn connect_to_unknown_signal_records_nothing() {
        let signal: Signal<u32> = Signal::new();
        let manager = PatchManager::new();
        let err = manager
            .connect_to(&signal, "notify::visible", |_: &u32| {})
            .unwrap_err();
        assert!(matches!(err, PatchError::Source(_)));
        assert!(manager.is_empty());
    }

    #[test]
    fn connect_to_emitter_channel() {
        let emitter: EventEmitter<()> = EventEmitter::new();
        let manager = PatchManager::new();
        manager
            .connect_to(&emitter, "swipe-end", |_: &()| {})
            .expect("any channel");
        assert!(emitter.has_listeners_for("swipe-end"));
        manager.destroy().expect("clean");
        assert!(!emitter.has_listeners_for("swipe-end"));
    }

    #[test]
    fn dropping_last_handle_reverts() {
        let log = log();
        {
            let manager = PatchManager::new();
            push_pair(&manager, &log, 1);
            let child = manager.create_sub_manager().expect("child");
            push_pair(&child, &log, 2);
        }
        assert_eq!(*log.borrow(), vec![1, 2, -2, -1]);
    }

    #[test]
    fn drop_without_revert_leaks() {
        let log = log();
        {
            let manager =
                PatchManager::with_config(ManagerConfig::default().with_revert_on_drop(false));
            push_pair(&manager, &log, 1);
        }
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn weak_handle_does_not_keep_alive() {
        let manager = PatchManager::new();
        let weak = manager.downgrade();
        assert_eq!(weak.upgrade(), Some(manager.clone()));
        drop(manager);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn counters_advance() {
        let before_applied = patches_applied_total();
        let before_reverted = patches_reverted_total();
        let manager = PatchManager::new();
        manager.patch(|| || {}).expect("accepts");
        manager.destroy().expect("clean");
        assert!(patches_applied_total() > before_applied);
        assert!(patches_reverted_total() > before_reverted);
    }

    #[test]
    fn labels_flow_into_config() {
        let manager = PatchManager::with_config(ManagerConfig::default().with_label("root"));
        let child = manager.create_sub_manager().expect("child");
        assert_eq!(manager.label().as_deref(), Some("root"));
        assert!(child.label().is_none());
        assert!(format!("{manager:?}").contains("PatchManager"));
    }
}
