//! OpenAI provider over rig-core.
//!
//! Bridges rig's `CompletionModel` to [`LlmProvider`]: system messages become
//! the preamble, the last message is the prompt and everything before it is
//! chat history. Streaming yields rig's text deltas and drops other events.

use async_trait::async_trait;
use futures::StreamExt;
use rig::client::CompletionClient;
use rig::completion::{AssistantContent, CompletionError, CompletionModel, CompletionRequestBuilder, Message};
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role, TextStream};
use crate::error::LlmError;

const PROVIDER: &str = "openai";

type OpenAiClient = rig::client::Client<openai::client::OpenAIResponsesExt>;

pub struct OpenAiProvider {
    client: OpenAiClient,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &SecretString, model: impl Into<String>) -> Result<Self, LlmError> {
        let client = openai::Client::new(api_key.expose_secret()).map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("Failed to create OpenAI client: {}", e),
        })?;
        Ok(Self {
            client,
            model: model.into(),
        })
    }

    /// Same as [`OpenAiProvider::new`] against another API root.
    pub fn with_base_url(
        api_key: &SecretString,
        base_url: &str,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let client = openai::Client::builder()
            .api_key(api_key.expose_secret())
            .base_url(base_url)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            })?;
        Ok(Self {
            client,
            model: model.into(),
        })
    }

    fn model_for<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.model)
    }
}

fn build_request<M: CompletionModel>(model: &M, request: CompletionRequest) -> CompletionRequestBuilder<M> {
    let prompt = split_messages(request.messages);
    debug!(history = prompt.history.len(), "Sending completion");

    let mut builder = model.completion_request(prompt.prompt).messages(prompt.history);
    if let Some(preamble) = prompt.preamble {
        builder = builder.preamble(preamble);
    }
    if let Some(temperature) = request.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        builder = builder.max_tokens(u64::from(max_tokens));
    }
    builder
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = self.client.completion_model(self.model_for(&request));
        let response = build_request(&model, request)
            .send()
            .await
            .map_err(completion_error)?;
        let content = response
            .choice
            .into_iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<String>();
        Ok(CompletionResponse {
            content,
            finish_reason: None,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
        let model = self.client.completion_model(self.model_for(&request));
        let response = build_request(&model, request)
            .stream()
            .await
            .map_err(completion_error)?;
        let deltas = response.filter_map(|item| async move {
            match item {
                Ok(StreamedAssistantContent::Text(text)) if !text.text.is_empty() => Some(Ok(text.text)),
                Ok(_) => None,
                Err(e) => Some(Err(completion_error(e))),
            }
        });
        Ok(Box::pin(deltas))
    }
}

/// A conversation laid out the way rig wants it.
#[derive(Debug)]
struct RigPrompt {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: Message,
}

fn split_messages(messages: Vec<ChatMessage>) -> RigPrompt {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system.push(message.content),
            Role::User => turns.push(Message::user(message.content)),
            Role::Assistant => turns.push(Message::assistant(message.content)),
        }
    }
    let prompt = turns.pop().unwrap_or_else(|| Message::user(""));
    RigPrompt {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history: turns,
        prompt,
    }
}

/// Map rig failures, recognising OpenAI's auth and rate-limit error codes.
fn completion_error(error: CompletionError) -> LlmError {
    match error {
        CompletionError::ProviderError(reason) => provider_error(reason),
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason,
        },
        CompletionError::JsonError(e) => LlmError::Json(e),
        other => LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: other.to_string(),
        },
    }
}

fn provider_error(reason: String) -> LlmError {
    if reason.contains("invalid_api_key") {
        LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        }
    } else if reason.contains("rate_limit_exceeded") {
        LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after: None,
        }
    } else {
        LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason,
        }
    }
}
