use std::fmt;

use patchkit_core::SourceError;
use thiserror::Error;

use crate::patch::{ManagerId, PatchId, Scope};

/// Boxed error returned by setups, teardowns and feature factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from applying a patch.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The setup procedure failed; nothing was recorded.
    #[error("patch setup failed: {0}")]
    Setup(#[source] BoxError),

    /// The manager is in the middle of `destroy()`.
    #[error("{manager} is tearing down; new patches are rejected")]
    TearingDown { manager: ManagerId },

    /// Connecting to a signal source failed; nothing was recorded.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// One teardown that failed during a destroy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub manager: ManagerId,
    pub patch: PatchId,
    pub scope: Option<Scope>,
    pub label: Option<String>,
    pub reason: String,
    /// The teardown panicked rather than returning an error.
    pub panicked: bool,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.patch, self.manager)?;
        if let Some(label) = &self.label {
            write!(f, " '{label}'")?;
        }
        if let Some(scope) = &self.scope {
            write!(f, " (scope {scope})")?;
        }
        let verb = if self.panicked { "panicked" } else { "failed" };
        write!(f, " {verb}: {}", self.reason)
    }
}

/// Every teardown that failed during one destroy call, in the order they ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownError {
    failures: Vec<TeardownFailure>,
}

impl TeardownError {
    /// `None` when there is nothing to report.
    #[must_use]
    pub fn from_failures(failures: Vec<TeardownFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    #[must_use]
    pub fn failures(&self) -> &[TeardownFailure] {
        &self.failures
    }

    #[must_use]
    pub fn into_failures(self) -> Vec<TeardownFailure> {
        self.failures
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Append another error's failures after this one's.
    pub fn merge(&mut self, other: TeardownError) {
        self.failures.extend(other.failures);
    }
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.failures.len();
        write!(f, "{n} teardown{} failed", if n == 1 { "" } else { "s" })?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownError {}

/// Convert collected failures into a `Result`.
pub(crate) fn into_result(failures: Vec<TeardownFailure>) -> Result<(), TeardownError> {
    match TeardownError::from_failures(failures) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// Combine several teardown results, keeping failures in order.
pub(crate) fn merge_results(
    results: impl IntoIterator<Item = Result<(), TeardownError>>,
) -> Result<(), TeardownError> {
    into_result(
        results
            .into_iter()
            .filter_map(Result::err)
            .flat_map(TeardownError::into_failures)
            .collect(),
    )
}

/// Errors from feature trees.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("sub-feature '{name}' failed to activate: {source}")]
    Activation {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("sub-feature '{name}' is already registered")]
    DuplicateSubFeature { name: String },

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

/// Errors from the top-level [`Extension`](crate::Extension) driver.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("extension '{name}' is already enabled")]
    AlreadyEnabled { name: String },

    #[error("extension '{name}' failed to activate: {source}")]
    Activation {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("extension '{name}' left {live} live patches after disable")]
    Leaked { name: String, live: usize },

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Teardown(#[from] TeardownError),
}
