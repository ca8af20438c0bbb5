//! Calling convention for the inference backend collaborator.

#[path = "inference/request.rs"]
mod request;

#[path = "inference/backend.rs"]
mod backend;

#[path = "inference/resilient.rs"]
mod resilient;

#[path = "inference/openai.rs"]
mod openai;

#[cfg(feature = "bedrock")]
#[path = "inference/bedrock.rs"]
mod bedrock;

pub use backend::InferenceBackend;
pub use openai::OpenAICompatible;
pub use request::{ChatMessage, ChatRole, InferenceConfig, InferenceRequest};
pub use resilient::{ResilienceConfig, ResilientBackend};

#[cfg(feature = "bedrock")]
pub use bedrock::BedrockBackend;
