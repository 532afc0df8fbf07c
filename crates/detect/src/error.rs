use gorp_core::Method;
use gorp_rserve::RserveError;
use thiserror::Error;

/// Failure to materialize a batch as a scratch table.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("scratch table I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timestamp {0} cannot be rendered as a calendar date")]
    Timestamp(i64),
}

/// The engine answered, but not in a shape we understand.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unexpected {method} result shape: {reason}")]
    Shape { method: Method, reason: String },

    #[error("anomaly index {0} is not a whole number")]
    NonIntegralIndex(f64),

    #[error("anomaly position {0} is out of range")]
    PositionOutOfRange(f64),

    #[error("result has {positions} positions but {values} values")]
    LengthMismatch { positions: usize, values: usize },
}

/// Why a single method attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Eval(#[from] RserveError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Both methods failed. The `vec` failure is the one reported; the `ts`
    /// failure is kept for diagnostics.
    #[error("{vec}")]
    Exhausted {
        #[source]
        vec: AttemptError,
        ts: AttemptError,
    },

    #[error("detection queue is full ({capacity} requests pending)")]
    Saturated { capacity: usize },
}
