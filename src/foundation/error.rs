use crate::foundation::core::FrameIndex;

/// Convenience result type used across framescroll.
pub type FramescrollResult<T> = Result<T, FramescrollError>;

/// A single frame failed to fetch or decode.
///
/// `Clone` so one in-flight load can hand the same outcome to every waiter.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("failed to load frame {index}: {reason}")]
pub struct LoadFailure {
    /// Frame that was requested.
    pub index: FrameIndex,
    /// Human readable cause (IO or decode error chain).
    pub reason: String,
}

impl LoadFailure {
    /// Build a failure for `index`.
    pub fn new(index: FrameIndex, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

/// Top-level error taxonomy used by framescroll APIs.
#[derive(thiserror::Error, Debug)]
pub enum FramescrollError {
    /// Invalid sequence configuration (frame count, path template pieces, timeline options).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A frame failed to load. Recoverable: a later request retries.
    #[error(transparent)]
    Load(#[from] LoadFailure),

    /// The component was already torn down.
    #[error("image sequence disposed")]
    Disposed,

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramescrollError {
    /// Build a [`FramescrollError::Configuration`] value.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`FramescrollError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Whether a later retry of the same operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Load(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
