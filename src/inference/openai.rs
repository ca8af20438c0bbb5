use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

use super::backend::InferenceBackend;
use super::request::{ChatRole, InferenceRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const BODY_SNIPPET_LEN: usize = 300;

/// Backend speaking the OpenAI-compatible chat completions API.
pub struct OpenAICompatible {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAICompatible {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key
                .filter(|key| !key.trim().is_empty())
                .map(SecretString::new),
        }
    }

    /// Reads the API key from the named environment variable.
    pub fn from_env(base_url: Option<String>, api_key_env: &str) -> Self {
        Self::new(base_url, std::env::var(api_key_env).ok())
    }

    /// Sets an HTTP timeout on the underlying client.
    pub fn timeout(mut self, timeout: Duration) -> Result<Self, InferenceError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl InferenceBackend for OpenAICompatible {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let Some(api_key) = &self.api_key else {
            return Err(InferenceError::credentials_missing("missing API key"));
        };

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|msg| WireMessage {
            role: match msg.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: &msg.content,
        }));
        let body = ChatCompletionRequest {
            model: &request.model_id,
            messages,
            max_tokens: request.config.max_tokens,
            temperature: request.config.temperature,
            top_p: request.config.top_p,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        log::debug!("openai HTTP status: {}", response.status());
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::other("no text content in response"))
    }
}

fn classify_status(status: StatusCode, body: &str) -> InferenceError {
    let snippet: String = body.chars().take(BODY_SNIPPET_LEN).collect();
    let message = format!("backend returned {status}: {snippet}");
    match status {
        StatusCode::UNAUTHORIZED if body.to_lowercase().contains("expired") => {
            InferenceError::credentials_expired(message)
        }
        StatusCode::UNAUTHORIZED => InferenceError::credentials_missing(message),
        StatusCode::FORBIDDEN => InferenceError::access_denied(message),
        _ => InferenceError::other(message),
    }
}
