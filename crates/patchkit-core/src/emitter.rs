#![forbid(unsafe_code)]

//! Multi-channel event emitter.
//!
//! [`EventEmitter<A>`] generalizes [`Signal`](crate::Signal) to any number of
//! named channels, each with its own ordered listener list. Components that
//! expose several independent event streams (e.g. `"begin"`, `"update"`,
//! `"end"`) use one emitter instead of one signal per stream. Events with
//! several arguments use a tuple payload.
//!
//! # Invariants
//!
//! 1. Within a channel, delivery follows registration order.
//! 2. Emitting on a channel nobody listens to is a silent no-op.
//! 3. Connection ids are unique across all channels of one emitter, so
//!    [`disconnect`](EventEmitter::disconnect) needs no channel argument.
//! 4. A channel whose last listener is removed is forgotten entirely.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::connection::ConnectionId;
use crate::listeners::{ListenerList, dispatch};

struct EmitterInner<A> {
    channels: RefCell<AHashMap<String, ListenerList<A>>>,
    next_id: Cell<u64>,
}

/// A set of named channels carrying payloads of type `A`.
///
/// Cloning an `EventEmitter` creates a new handle to the **same** channels.
pub struct EventEmitter<A> {
    inner: Rc<EmitterInner<A>>,
}

impl<A> Clone for EventEmitter<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for EventEmitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.inner.channels.borrow();
        let mut names: Vec<&str> = channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EventEmitter")
            .field("channels", &names)
            .finish()
    }
}

impl<A: 'static> Default for EventEmitter<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static> EventEmitter<A> {
    /// Create an emitter with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EmitterInner {
                channels: RefCell::new(AHashMap::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    pub(crate) fn register(
        &self,
        channel: &str,
        once: bool,
        callback: Box<dyn Fn(&A)>,
    ) -> ConnectionId {
        let raw = self.inner.next_id.get();
        self.inner.next_id.set(raw + 1);
        let id = ConnectionId::new(raw);
        self.inner
            .channels
            .borrow_mut()
            .entry(channel.to_string())
            .or_insert_with(ListenerList::new)
            .push(id, once, callback);
        id
    }

    /// Listen on `channel` until disconnected.
    pub fn connect(&self, channel: &str, callback: impl Fn(&A) + 'static) -> ConnectionId {
        self.register(channel, false, Box::new(callback))
    }

    /// Listen on `channel` for the next event only.
    pub fn connect_once(&self, channel: &str, callback: impl Fn(&A) + 'static) -> ConnectionId {
        self.register(channel, true, Box::new(callback))
    }

    /// Remove a listener from whichever channel holds it.
    ///
    /// Returns `true` if a listener was found and removed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut channels = self.inner.channels.borrow_mut();
        let mut emptied = None;
        let mut found = false;
        for (name, list) in channels.iter_mut() {
            if list.remove(id) {
                found = true;
                if list.is_empty() {
                    emptied = Some(name.clone());
                }
                break;
            }
        }
        if let Some(name) = emptied {
            channels.remove(&name);
        }
        found
    }

    fn retire(&self, channel: &str, id: ConnectionId) {
        let mut channels = self.inner.channels.borrow_mut();
        let now_empty = channels.get_mut(channel).is_some_and(|list| {
            list.remove(id);
            list.is_empty()
        });
        if now_empty {
            channels.remove(channel);
        }
    }

    /// Dispatch `args` to the listeners of `channel` in registration order.
    pub fn emit(&self, channel: &str, args: &A) {
        let snapshot = match self.inner.channels.borrow().get(channel) {
            Some(list) => list.snapshot(),
            None => return,
        };
        dispatch("event_emitter", &snapshot, args, |id| self.retire(channel, id));
    }

    /// Whether `channel` has at least one listener.
    ///
    /// Producers use this to skip building payloads nobody will see.
    #[must_use]
    pub fn has_listeners_for(&self, channel: &str) -> bool {
        self.inner
            .channels
            .borrow()
            .get(channel)
            .is_some_and(|list| !list.is_empty())
    }

    /// Number of listeners on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .borrow()
            .get(channel)
            .map_or(0, ListenerList::len)
    }

    /// Total listeners across all channels.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.inner
            .channels
            .borrow()
            .values()
            .map(ListenerList::len)
            .sum()
    }

    /// Drop every listener on every channel.
    pub fn disconnect_all(&self) {
        self.inner.channels.borrow_mut().clear();
    }
}
