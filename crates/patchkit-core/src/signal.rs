#![forbid(unsafe_code)]

//! Single-channel typed publish/subscribe.
//!
//! [`Signal<T>`] is the smallest reactive primitive in the crate: one channel,
//! any number of listeners, synchronous delivery. It backs
//! [`Observable`](crate::Observable) change notification and is the type most
//! features connect to for "value changed" events.
//!
//! # Invariants
//!
//! 1. `emit` invokes listeners in connection order.
//! 2. `disconnect` is idempotent; disconnecting an unknown id returns `false`.
//! 3. A listener panicking does not prevent delivery to the listeners after it.
//! 4. Listeners may connect, disconnect, or emit again from inside a callback.
//!
//! # Example
//!
//! ```
//! use patchkit_core::Signal;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let signal = Signal::new();
//! let seen = Rc::new(Cell::new(0));
//! let seen_in = Rc::clone(&seen);
//! let id = signal.connect(move |v: &i32| seen_in.set(*v));
//! signal.emit(&5);
//! assert_eq!(seen.get(), 5);
//! assert!(signal.disconnect(id));
//! assert!(!signal.disconnect(id));
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::connection::ConnectionId;
use crate::error::SourceError;
use crate::listeners::{ListenerList, dispatch};

/// The only channel name a single-channel source accepts.
pub const CHANGED: &str = "changed";

struct SignalInner<T> {
    listeners: RefCell<ListenerList<T>>,
    next_id: Cell<u64>,
    emissions: Cell<u64>,
}

/// A single-channel signal carrying values of type `T`.
///
/// Cloning a `Signal` creates a new handle to the **same** listener list.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("emissions", &self.inner.emissions.get())
            .finish()
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SignalInner {
                listeners: RefCell::new(ListenerList::new()),
                next_id: Cell::new(1),
                emissions: Cell::new(0),
            }),
        }
    }

    fn allocate_id(&self) -> ConnectionId {
        let raw = self.inner.next_id.get();
        self.inner.next_id.set(raw + 1);
        ConnectionId::new(raw)
    }

    fn register(&self, once: bool, handler: Box<dyn Fn(&T)>) -> ConnectionId {
        let id = self.allocate_id();
        self.inner.listeners.borrow_mut().push(id, once, handler);
        id
    }

    /// Register `handler` for every future emission.
    pub fn connect(&self, handler: impl Fn(&T) + 'static) -> ConnectionId {
        self.register(false, Box::new(handler))
    }

    /// Register `handler` for the next emission only.
    pub fn connect_once(&self, handler: impl Fn(&T) + 'static) -> ConnectionId {
        self.register(true, Box::new(handler))
    }

    /// Channel-name overload of [`connect`](Self::connect).
    ///
    /// Only [`CHANGED`] is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownSignal`] for any other name.
    pub fn connect_named(
        &self,
        signal: &str,
        handler: impl Fn(&T) + 'static,
    ) -> Result<ConnectionId, SourceError> {
        self.connect_boxed(signal, Box::new(handler))
    }

    pub(crate) fn connect_boxed(
        &self,
        signal: &str,
        handler: Box<dyn Fn(&T)>,
    ) -> Result<ConnectionId, SourceError> {
        if signal != CHANGED {
            return Err(SourceError::unknown_signal("Signal", signal));
        }
        Ok(self.register(false, handler))
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.inner.listeners.borrow_mut().remove(id)
    }

    /// Synchronously deliver `value` to every listener in connection order.
    pub fn emit(&self, value: &T) {
        let snapshot = self.inner.listeners.borrow().snapshot();
        self.inner.emissions.set(self.inner.emissions.get() + 1);
        if snapshot.is_empty() {
            return;
        }
        let inner = &self.inner;
        dispatch("signal", &snapshot, value, |id| {
            inner.listeners.borrow_mut().remove(id);
        });
    }

    /// Number of connected listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Whether anyone is listening.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.inner.listeners.borrow().is_empty()
    }

    /// Total number of `emit` calls so far.
    #[must_use]
    pub fn emission_count(&self) -> u64 {
        self.inner.emissions.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn emit_reaches_listeners_in_order() {
        let signal = Signal::new();
        let seen = log();
        for name in ["h1", "h2", "h3"] {
            let seen = Rc::clone(&seen);
            signal.connect(move |v: &u32| seen.borrow_mut().push(format!("{name}:{v}")));
        }
        signal.emit(&7);
        assert_eq!(*seen.borrow(), vec!["h1:7", "h2:7", "h3:7"]);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let signal: Signal<()> = Signal::new();
        let id = signal.connect(|_| {});
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        assert!(!signal.has_listeners());
    }

    #[test]
    fn disconnect_unknown_id_is_false() {
        let signal: Signal<()> = Signal::new();
        assert!(!signal.disconnect(ConnectionId::new(99)));
    }

    #[test]
    fn connect_named_accepts_changed_only() {
        let signal: Signal<u8> = Signal::new();
        assert!(signal.connect_named(CHANGED, |_| {}).is_ok());
        let err = signal.connect_named("notify", |_| {}).unwrap_err();
        assert_eq!(err, SourceError::unknown_signal("Signal", "notify"));
        assert_eq!(signal.listener_count(), 1);
    }

    #[test]
    fn connect_once_fires_once() {
        let signal = Signal::new();
        let hits = Rc::new(Cell::new(0));
        let hits_in = Rc::clone(&hits);
        signal.connect_once(move |_: &()| hits_in.set(hits_in.get() + 1));
        signal.emit(&());
        signal.emit(&());
        assert_eq!(hits.get(), 1);
        assert_eq!(signal.listener_count(), 0);
    }

    #[test]
    fn ids_increase_monotonically() {
        let signal: Signal<()> = Signal::new();
        let a = signal.connect(|_| {});
        let b = signal.connect(|_| {});
        signal.disconnect(a);
        let c = signal.connect(|_| {});
        assert!(a < b && b < c);
    }

    #[test]
    fn listener_disconnecting_later_listener_skips_it() {
        let signal: Signal<()> = Signal::new();
        let seen = log();
        let victim = Rc::new(Cell::new(None));

        let signal_in = signal.clone();
        let victim_in = Rc::clone(&victim);
        let seen_a = Rc::clone(&seen);
        signal.connect(move |_| {
            seen_a.borrow_mut().push("a".into());
            if let Some(id) = victim_in.get() {
                signal_in.disconnect(id);
            }
        });
        let seen_b = Rc::clone(&seen);
        victim.set(Some(signal.connect(move |_| seen_b.borrow_mut().push("b".into()))));
        let seen_c = Rc::clone(&seen);
        signal.connect(move |_| seen_c.borrow_mut().push("c".into()));

        signal.emit(&());
        assert_eq!(*seen.borrow(), vec!["a", "c"]);
    }

    #[test]
    fn listener_connected_during_emit_waits_for_next_emit() {
        let signal: Signal<()> = Signal::new();
        let hits = Rc::new(Cell::new(0));
        let signal_in = signal.clone();
        let hits_in = Rc::clone(&hits);
        signal.connect_once(move |_| {
            let hits = Rc::clone(&hits_in);
            signal_in.connect(move |_| hits.set(hits.get() + 1));
        });
        signal.emit(&());
        assert_eq!(hits.get(), 0);
        signal.emit(&());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn nested_emit_is_allowed() {
        let signal: Signal<u32> = Signal::new();
        let seen = log();
        let signal_in = signal.clone();
        let seen_in = Rc::clone(&seen);
        signal.connect(move |v| {
            seen_in.borrow_mut().push(v.to_string());
            if *v < 2 {
                signal_in.emit(&(v + 1));
            }
        });
        signal.emit(&0);
        assert_eq!(*seen.borrow(), vec!["0", "1", "2"]);
    }

    #[test]
    fn clone_shares_listeners() {
        let a: Signal<()> = Signal::new();
        let b = a.clone();
        a.connect(|_| {});
        assert_eq!(b.listener_count(), 1);
        b.emit(&());
        assert_eq!(a.emission_count(), 1);
    }

    #[test]
    fn debug_format() {
        let signal: Signal<()> = Signal::new();
        signal.connect(|_| {});
        let dbg = format!("{signal:?}");
        assert!(dbg.contains("Signal"));
        assert!(dbg.contains("listeners: 1"));
    }
}
