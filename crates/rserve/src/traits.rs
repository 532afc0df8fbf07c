use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RserveError;
use crate::value::RValue;

/// Evaluates a command on the remote engine.
///
/// A call resolves once the engine returns a value or an error. Malformed
/// commands, undefined functions and runtime faults all come back as
/// `Err`; implementations never retry.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, command: &str) -> Result<RValue, RserveError>;
}

/// Blanket implementation so `Arc<dyn Evaluator>` can be used directly.
#[async_trait]
impl<T: Evaluator + ?Sized> Evaluator for Arc<T> {
    async fn evaluate(&self, command: &str) -> Result<RValue, RserveError> {
        (**self).evaluate(command).await
    }
}
