#![forbid(unsafe_code)]

//! Ordered listener storage shared by [`Signal`](crate::Signal) and
//! [`EventEmitter`](crate::EventEmitter).
//!
//! # Invariants
//!
//! 1. Listeners are delivered in connection order.
//! 2. Every emission dispatches over a snapshot taken before the first
//!    callback runs; listeners connected during an emission only see later
//!    emissions.
//! 3. A listener removed during an emission is skipped if it has not been
//!    reached yet. Survivors are neither skipped nor invoked twice.
//! 4. A `once` listener is retired before its callback runs, so a nested
//!    emission from inside the callback cannot reach it again.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use tracing::{error, trace};

use crate::connection::ConnectionId;
use crate::panic::describe_panic;

pub(crate) type Callback<A> = Box<dyn Fn(&A)>;

pub(crate) struct Listener<A> {
    id: ConnectionId,
    once: bool,
    live: Cell<bool>,
    callback: Callback<A>,
}

pub(crate) struct ListenerList<A> {
    entries: Vec<Rc<Listener<A>>>,
}

impl<A> ListenerList<A> {
    pub(crate) const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, id: ConnectionId, once: bool, callback: Callback<A>) {
        self.entries.push(Rc::new(Listener {
            id,
            once,
            live: Cell::new(true),
            callback,
        }));
    }

    /// Remove a listener. Returns `false` when the id is not connected here.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> bool {
        let Some(pos) = self.entries.iter().position(|l| l.id == id) else {
            return false;
        };
        let listener = self.entries.remove(pos);
        listener.live.set(false);
        true
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<Listener<A>>> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Deliver `value` to every still-live listener of `snapshot`.
///
/// `retire` is called for `once` listeners so the owner can drop them from
/// its list; no borrow of the owner may be held while this runs. A panicking
/// callback is logged and delivery continues with the next listener.
///
/// Returns the number of callbacks invoked.
pub(crate) fn dispatch<A>(
    origin: &'static str,
    snapshot: &[Rc<Listener<A>>],
    value: &A,
    mut retire: impl FnMut(ConnectionId),
) -> usize {
    let mut delivered = 0;
    for listener in snapshot {
        if !listener.live.get() {
            continue;
        }
        if listener.once {
            listener.live.set(false);
            retire(listener.id);
        }
        trace!(message = "listener.dispatch", origin, connection = listener.id.raw());
        let outcome = catch_unwind(AssertUnwindSafe(|| (listener.callback)(value)));
        if let Err(payload) = outcome {
            error!(
                message = "listener.panicked",
                origin,
                connection = listener.id.raw(),
                panic = %describe_panic(&*payload),
            );
        }
        delivered += 1;
    }
    delivered
}
