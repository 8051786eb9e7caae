//! Error taxonomy shared by layouts, the operation engine, and backends.

use thiserror::Error;

/// Failure reported by any ragged-array operation.
///
/// Every error is surfaced synchronously to the caller of the operation that
/// detected it; nothing is retried internally and no operation returns a
/// partial result.
#[derive(Debug, Error)]
pub enum Error {
    /// A layout descriptor violated a structural invariant.
    #[error("structural invariant violated at {path}[{position}]: {reason}")]
    Structural {
        path: String,
        position: usize,
        reason: String,
    },

    /// A buffer allocation or copy could not reserve memory.
    #[error("allocation of {bytes} bytes failed")]
    OutOfMemory { bytes: usize },

    /// Operand shapes could not be aligned for an element-wise operation.
    #[error("cannot broadcast `{lhs}` with `{rhs}`: {reason}")]
    Broadcast {
        lhs: String,
        rhs: String,
        reason: String,
    },

    /// No common generalized type exists for the operand signatures.
    #[error("no common type for `{lhs}` and `{rhs}`")]
    Type { lhs: String, rhs: String },

    /// No registered backend can serve the requested kernel.
    #[error("no viable backend for {op}: {reason}")]
    BackendMismatch { op: &'static str, reason: String },

    /// A backend kernel failed while executing.
    #[error("kernel execution failure: {0}")]
    Execution(String),
}

impl Error {
    /// Builds a [`Error::Structural`] from a layout walk position.
    pub fn structural(
        path: impl Into<String>,
        position: usize,
        reason: impl Into<String>,
    ) -> Self {
        Error::Structural {
            path: path.into(),
            position,
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::Broadcast`] naming both operand signatures.
    pub fn broadcast(
        lhs: impl ToString,
        rhs: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::Broadcast {
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::Type`] naming both operand signatures.
    pub fn type_mismatch(lhs: impl ToString, rhs: impl ToString) -> Self {
        Error::Type {
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
        }
    }

    /// Builds a [`Error::BackendMismatch`] for a dispatch failure.
    pub fn backend_mismatch(op: &'static str, reason: impl Into<String>) -> Self {
        Error::BackendMismatch {
            op,
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::Execution`] from a kernel failure message.
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution(message.into())
    }
}

/// Convenience alias for results returned throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
