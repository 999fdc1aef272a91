use thiserror::Error;

/// Errors raised by signal sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source does not expose a signal with this name.
    ///
    /// Single-channel sources only accept [`CHANGED`](crate::signal::CHANGED);
    /// anything else is a programming error at the call site.
    #[error("{source_kind} has no signal named '{signal}'")]
    UnknownSignal {
        source_kind: &'static str,
        signal: String,
    },
}

impl SourceError {
    #[must_use]
    pub fn unknown_signal(source_kind: &'static str, signal: impl Into<String>) -> Self {
        Self::UnknownSignal {
            source_kind,
            signal: signal.into(),
        }
    }
}
