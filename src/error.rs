use thiserror::Error;

use crate::peer::Node;

/// Error taxonomy for the core, per the error-handling design in the spec.
///
/// `TransportError` and `TimeoutError` are absorbed by the shell and
/// translated into state-machine events; they never propagate to a
/// caller of the instance. `AssociationError` is surfaced to the
/// association continuation. `InvariantViolation` indicates a
/// programmer error and is fatal.
#[derive(Debug, Error)]
pub enum SwimError {
    #[error("transport error while contacting {node}: {message}")]
    Transport { node: Node, message: String },

    #[error("timed out waiting for a response from {node}")]
    Timeout { node: Node },

    #[error("failed to ensure association with {node}: {message}")]
    Association { node: Node, message: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl SwimError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SwimError::InvariantViolation(_))
    }
}

pub type SwimResult<T> = Result<T, SwimError>;
