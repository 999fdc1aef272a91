#![forbid(unsafe_code)]

//! Helpers for reporting caught panics.

use std::any::Any;

/// Render a panic payload as text.
///
/// `panic!` with a literal yields a `&'static str` payload, a formatted
/// message yields a `String`; anything else is reported generically.
#[must_use]
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
