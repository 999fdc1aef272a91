#![forbid(unsafe_code)]

//! The "undo" half of a patch.
//!
//! A patch's setup returns a [`Teardown`]: an owned value that knows how to
//! reverse exactly what the setup did. It is consumed when invoked
//! (`self: Box<Self>`), so it cannot run twice.
//!
//! Any `FnOnce()` closure is a teardown. State that would otherwise be
//! captured by a closure can instead live in a small struct:
//!
//! ```
//! use patchkit_runtime::{BoxError, Teardown};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! struct RestoreLabel {
//!     target: Rc<RefCell<String>>,
//!     previous: String,
//! }
//!
//! impl Teardown for RestoreLabel {
//!     fn revert(self: Box<Self>) -> Result<(), BoxError> {
//!         let Self { target, previous } = *self;
//!         *target.borrow_mut() = previous;
//!         Ok(())
//!     }
//! }
//! ```

use patchkit_core::{ConnectionId, SignalSource};
use tracing::debug;

use crate::error::BoxError;

/// Reverses one applied patch.
pub trait Teardown: 'static {
    /// Undo the patch.
    ///
    /// # Errors
    ///
    /// An error means the setup/teardown pair is asymmetric. The manager
    /// records the failure and keeps draining according to its
    /// [`TeardownPolicy`](crate::TeardownPolicy).
    fn revert(self: Box<Self>) -> Result<(), BoxError>;
}

impl<F> Teardown for F
where
    F: FnOnce() + 'static,
{
    fn revert(self: Box<Self>) -> Result<(), BoxError> {
        let undo = *self;
        undo();
        Ok(())
    }
}

/// A teardown closure that can report failure.
///
/// Built with [`fallible`].
pub struct Fallible<F>(F);

/// Wrap a `FnOnce() -> Result<(), E>` as a [`Teardown`].
pub fn fallible<F, E>(undo: F) -> Fallible<F>
where
    F: FnOnce() -> Result<(), E> + 'static,
    E: Into<BoxError>,
{
    Fallible(undo)
}

impl<F, E> Teardown for Fallible<F>
where
    F: FnOnce() -> Result<(), E> + 'static,
    E: Into<BoxError>,
{
    fn revert(self: Box<Self>) -> Result<(), BoxError> {
        let Fallible(undo) = *self;
        undo().map_err(Into::into)
    }
}

/// Teardown stored by `connect_to`: disconnects one handler.
pub(crate) struct Disconnect<S> {
    pub(crate) source: S,
    pub(crate) signal: String,
    pub(crate) id: ConnectionId,
}

impl<S> Teardown for Disconnect<S>
where
    S: SignalSource + 'static,
{
    fn revert(self: Box<Self>) -> Result<(), BoxError> {
        if !self.source.disconnect_signal(self.id) {
            // Already gone, e.g. the source was torn down first.
            debug!(
                message = "patch.disconnect_stale",
                source = self.source.source_kind(),
                signal = %self.signal,
                connection = self.id.raw(),
            );
        }
        Ok(())
    }
}
