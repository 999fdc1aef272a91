#![forbid(unsafe_code)]

//! Version-tracked values with change notification.
//!
//! [`Observable<T>`] is the reactive source settings are exposed through: a
//! current value plus a [`Signal`] that fires whenever the value actually
//! changes. Features gate their sub-features on `Observable<bool>`.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. Subscribers observe the new value through [`get`](Observable::get) as
//!    well as through their argument; no borrow is held during notification.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::connection::ConnectionId;
use crate::signal::Signal;

struct ObservableInner<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    changed: Signal<T>,
}

/// A shared, version-tracked value.
///
/// Cloning an `Observable` creates a new handle to the **same** value.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create an observable holding `value` at version 0.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                version: Cell::new(0),
                changed: Signal::new(),
            }),
        }
    }

    /// Clone out the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value, notifying subscribers if it changed.
    ///
    /// Returns `true` when the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        self.inner.version.set(self.inner.version.get() + 1);
        self.inner.changed.emit(&value);
        true
    }

    /// Mutate a copy of the value in place and store it back with
    /// [`set`](Self::set) semantics.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    /// Number of effective changes since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// The change signal.
    #[must_use]
    pub fn changed(&self) -> &Signal<T> {
        &self.inner.changed
    }

    /// Shorthand for `changed().connect(handler)`.
    pub fn subscribe(&self, handler: impl Fn(&T) + 'static) -> ConnectionId {
        self.inner.changed.connect(handler)
    }

    /// Shorthand for `changed().disconnect(id)`.
    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        self.inner.changed.disconnect(id)
    }
}
