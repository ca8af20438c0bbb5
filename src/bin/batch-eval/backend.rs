use std::sync::Arc;

use batch_eval::config::{BackendKind, EvalConfig};
use batch_eval::inference::{InferenceBackend, OpenAICompatible, ResilientBackend};

/// Builds the configured backend wrapped in the retry layer.
pub fn build_backend(config: &EvalConfig) -> anyhow::Result<Arc<dyn InferenceBackend>> {
    let resilience = config.resilience.clone();
    let backend: Arc<dyn InferenceBackend> = match config.backend.kind {
        BackendKind::Openai => {
            let mut backend = OpenAICompatible::from_env(
                config.backend.base_url.clone(),
                &config.backend.api_key_env,
            );
            if let Some(timeout) = config.inference.timeout() {
                backend = backend.timeout(timeout)?;
            }
            Arc::new(ResilientBackend::new(backend, resilience))
        }
        #[cfg(feature = "bedrock")]
        BackendKind::Bedrock => {
            let backend = batch_eval::inference::BedrockBackend::new(config.backend.region.clone());
            Arc::new(ResilientBackend::new(backend, resilience))
        }
        #[cfg(not(feature = "bedrock"))]
        BackendKind::Bedrock => anyhow::bail!(
            "backend 'bedrock' is not compiled in; rebuild with `--features bedrock`"
        ),
    };
    log::debug!("using backend {}", backend.name());
    Ok(backend)
}
