use std::sync::Arc;

use async_trait::async_trait;

use crate::error::InferenceError;

use super::request::InferenceRequest;

/// Trait for backends that turn a request into reply text.
///
/// Retries, if any, belong to the implementation (see
/// [`ResilientBackend`](super::ResilientBackend)); evaluators call `invoke`
/// exactly once per request.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short name used in logs and as the rate-limit key.
    fn name(&self) -> &str;

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

#[async_trait]
impl<T: InferenceBackend + ?Sized> InferenceBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        (**self).invoke(request).await
    }
}

#[async_trait]
impl<T: InferenceBackend + ?Sized> InferenceBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        (**self).invoke(request).await
    }
}
