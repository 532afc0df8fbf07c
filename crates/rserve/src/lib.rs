//! Client for a local Rserve daemon speaking the QAP1 protocol.
//!
//! The gateway only needs one operation from the engine: evaluate a command
//! string and get back whatever R returned. [`RserveClient`] provides that
//! over a single TCP connection, [`RValue`] is the decoded result, and the
//! [`Evaluator`] trait is the seam the detection pipeline depends on.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod sexp;
pub mod traits;
pub mod value;

pub use client::{ClientOptions, RserveClient};
pub use endpoint::Endpoint;
pub use error::RserveError;
pub use traits::Evaluator;
pub use value::RValue;
