#![forbid(unsafe_code)]

//! Core: reactive primitives and the capability traits patch managers consume.
//!
//! Everything in this crate is single-threaded (`Rc`-based) and carries no
//! lifecycle logic of its own. The runtime crate builds reversible patches
//! on top of these types.

pub mod clock;
pub mod connection;
pub mod emitter;
pub mod error;
mod listeners;
pub mod observable;
pub mod panic;
pub mod signal;
pub mod source;

pub use clock::{Clock, LabClock};
pub use connection::ConnectionId;
pub use emitter::EventEmitter;
pub use error::SourceError;
pub use observable::Observable;
pub use signal::{CHANGED, Signal};
pub use source::{ReactiveSource, SignalSource};
