#![forbid(unsafe_code)]

//! Capability traits for anything a patch manager can connect to.
//!
//! Host toolkit objects, [`Signal`], [`EventEmitter`] and [`Observable`] all
//! expose "connect a handler to a named signal, get an id back, disconnect
//! by id". [`SignalSource`] names that shape so one `connect_to` can serve
//! every family; each family gets its own adapter impl, chosen statically at
//! the call site.

use crate::connection::ConnectionId;
use crate::emitter::EventEmitter;
use crate::error::SourceError;
use crate::observable::Observable;
use crate::signal::{CHANGED, Signal};

/// A source of named signals.
pub trait SignalSource {
    /// Value passed to handlers.
    type Payload: 'static;

    /// Short name used in diagnostics and patch labels.
    fn source_kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Connect `handler` to the signal called `signal`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownSignal`] if the source has no such signal.
    fn connect_signal(
        &self,
        signal: &str,
        handler: Box<dyn Fn(&Self::Payload)>,
    ) -> Result<ConnectionId, SourceError>;

    /// Disconnect a handler. Unknown or already-removed ids return `false`.
    fn disconnect_signal(&self, id: ConnectionId) -> bool;
}

/// A [`SignalSource`] that also holds a current value.
///
/// Its [`CHANGED`] signal fires with the new value on every change.
pub trait ReactiveSource: SignalSource {
    /// The current value.
    fn current(&self) -> Self::Payload;
}

impl<T: 'static> SignalSource for Signal<T> {
    type Payload = T;

    fn source_kind(&self) -> &'static str {
        "Signal"
    }

    fn connect_signal(
        &self,
        signal: &str,
        handler: Box<dyn Fn(&T)>,
    ) -> Result<ConnectionId, SourceError> {
        self.connect_boxed(signal, handler)
    }

    fn disconnect_signal(&self, id: ConnectionId) -> bool {
        self.disconnect(id)
    }
}

impl<A: 'static> SignalSource for EventEmitter<A> {
    type Payload = A;

    fn source_kind(&self) -> &'static str {
        "EventEmitter"
    }

    fn connect_signal(
        &self,
        signal: &str,
        handler: Box<dyn Fn(&A)>,
    ) -> Result<ConnectionId, SourceError> {
        Ok(self.register(signal, false, handler))
    }

    fn disconnect_signal(&self, id: ConnectionId) -> bool {
        self.disconnect(id)
    }
}

impl<T: Clone + PartialEq + 'static> SignalSource for Observable<T> {
    type Payload = T;

    fn source_kind(&self) -> &'static str {
        "Observable"
    }

    fn connect_signal(
        &self,
        signal: &str,
        handler: Box<dyn Fn(&T)>,
    ) -> Result<ConnectionId, SourceError> {
        if signal != CHANGED {
            return Err(SourceError::unknown_signal("Observable", signal));
        }
        self.changed().connect_boxed(signal, handler)
    }

    fn disconnect_signal(&self, id: ConnectionId) -> bool {
        self.unsubscribe(id)
    }
}

impl<T: Clone + PartialEq + 'static> ReactiveSource for Observable<T> {
    fn current(&self) -> T {
        self.get()
    }
}
