//! AWS Bedrock backend over the Converse API.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::converse::ConverseError,
    types::{
        ContentBlock, ConversationRole, ConverseOutput, InferenceConfiguration, Message,
        SystemContentBlock,
    },
    Client as BedrockClient,
};
use tokio::sync::OnceCell;

use crate::error::{InferenceError, InferenceErrorKind};

use super::backend::InferenceBackend;
use super::request::{ChatRole, InferenceRequest};

/// Bedrock runtime client, created lazily from the default AWS credential chain.
#[derive(Debug)]
pub struct BedrockBackend {
    client: OnceCell<BedrockClient>,
    region: Option<String>,
}

impl BedrockBackend {
    pub fn new(region: Option<String>) -> Self {
        Self {
            client: OnceCell::new(),
            region,
        }
    }

    async fn client(&self) -> &BedrockClient {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.region {
                    loader = loader.region(aws_config::Region::new(region.clone()));
                }
                BedrockClient::new(&loader.load().await)
            })
            .await
    }
}

#[async_trait]
impl InferenceBackend for BedrockBackend {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let messages = request
            .messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    ChatRole::User => ConversationRole::User,
                    ChatRole::Assistant => ConversationRole::Assistant,
                };
                Message::builder()
                    .role(role)
                    .content(ContentBlock::Text(msg.content.clone()))
                    .build()
                    .map_err(|e| InferenceError::other(format!("invalid message: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut converse = self
            .client()
            .await
            .converse()
            .model_id(&request.model_id)
            .set_messages(Some(messages))
            .inference_config(
                InferenceConfiguration::builder()
                    .max_tokens(i32::try_from(request.config.max_tokens).unwrap_or(i32::MAX))
                    .temperature(request.config.temperature)
                    .top_p(request.config.top_p)
                    .build(),
            );
        if let Some(system) = &request.system_prompt {
            converse = converse.system(SystemContentBlock::Text(system.clone()));
        }

        let response = converse.send().await.map_err(classify_sdk_error)?;

        match response.output() {
            Some(ConverseOutput::Message(msg)) => {
                let text: Vec<&str> = msg
                    .content()
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text(text) => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if text.is_empty() {
                    return Err(InferenceError::other("no text content in response"));
                }
                Ok(text.join(""))
            }
            _ => Err(InferenceError::other("no output in response")),
        }
    }
}

fn classify_sdk_error(err: SdkError<ConverseError>) -> InferenceError {
    let code = err.code().map(str::to_string);
    let detail = DisplayErrorContext(&err).to_string();
    let kind = classify(code.as_deref(), &detail);
    InferenceError::new(kind, detail)
}

fn classify(code: Option<&str>, detail: &str) -> InferenceErrorKind {
    match code {
        Some("ExpiredTokenException" | "ExpiredToken" | "UnrecognizedClientException") => {
            InferenceErrorKind::CredentialsExpired
        }
        Some("AccessDeniedException") => InferenceErrorKind::AccessDenied,
        Some(_) => InferenceErrorKind::Other,
        None if detail.to_lowercase().contains("credentials") => {
            InferenceErrorKind::CredentialsMissing
        }
        None => InferenceErrorKind::Other,
    }
}
