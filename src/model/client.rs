use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReviewError, Result};

use super::{ChatMessage, ModelCaller, Provider, ERROR_PREFIX};

/// Runtime configuration for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ModelClientConfig {
    pub provider: Provider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelClientConfig {
    /// Provider defaults for everything except the credential.
    pub fn for_provider(provider: Provider, api_key: Option<String>) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            endpoint: provider.default_endpoint().to_string(),
            api_key,
            timeout: provider.default_timeout(),
            temperature: provider.temperature(),
            max_tokens: provider.max_tokens(),
        }
    }
}

pub struct ChatCompletionsClient {
    config: ModelClientConfig,
    http: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(config: ModelClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReviewError::Model(format!("failed to build model http client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ModelClientConfig {
        &self.config
    }

    /// One chat-completions exchange. Empty reply content is returned as an
    /// empty string.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if messages.is_empty() {
            return Err(ReviewError::Model(
                "model completion requires at least one message".to_string(),
            ));
        }

        let url = self.chat_completions_url();
        let payload = ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            temperature: Some(self.config.temperature),
            max_tokens: self.config.max_tokens,
            stream: Some(false),
        };

        let (status, body) = self.post(&url, &payload).await?;

        if !status.is_success() {
            if self.config.provider.falls_back_to_completions() {
                debug!(
                    status = %status,
                    "Chat completions rejected, retrying on completions endpoint"
                );
                return self.complete_with_prompt(messages).await;
            }
            return Err(ReviewError::Model(format!(
                "model endpoint returned HTTP {}: {}",
                status,
                truncate_for_error(&body)
            )));
        }

        let parsed: ChatCompletionsResponse = serde_json::from_str(&body).map_err(|e| {
            ReviewError::Model(format!(
                "invalid JSON from model endpoint: {} (body={})",
                e,
                truncate_for_error(&body)
            ))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ReviewError::Model("model response had no choices".to_string()))?;

        Ok(choice
            .message
            .content
            .and_then(ChatContent::into_text)
            .unwrap_or_default())
    }

    /// Legacy completions call with the conversation flattened into one prompt.
    async fn complete_with_prompt(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = self.completions_url();
        let payload = CompletionsRequest {
            model: self.config.model.clone(),
            prompt: flatten_prompt(messages),
            temperature: Some(self.config.temperature),
            max_tokens: self.config.max_tokens,
        };

        let (status, body) = self.post(&url, &payload).await?;
        if !status.is_success() {
            return Err(ReviewError::Model(format!(
                "completions fallback returned HTTP {}: {}",
                status,
                truncate_for_error(&body)
            )));
        }

        let parsed: CompletionsResponse = serde_json::from_str(&body).map_err(|e| {
            ReviewError::Model(format!(
                "invalid JSON from completions fallback: {} (body={})",
                e,
                truncate_for_error(&body)
            ))
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            ReviewError::Model("completions fallback had no choices".to_string())
        })?;
        Ok(choice.text.unwrap_or_default().trim().to_string())
    }

    async fn post<T: Serialize>(&self, url: &str, payload: &T) -> Result<(reqwest::StatusCode, String)> {
        let mut request = self.http.post(url).json(payload);
        if let Some(api_key) = self.config.api_key.as_ref() {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ReviewError::Model(format!(
                    "model request timed out after {:?} (provider={}, model={})",
                    self.config.timeout, self.config.provider, self.config.model
                ))
            } else {
                ReviewError::Model(format!(
                    "model request failed (provider={}, model={}): {}",
                    self.config.provider, self.config.model, e
                ))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReviewError::Model(format!("failed to read model response body: {}", e)))?;
        Ok((status, body))
    }

    fn chat_completions_url(&self) -> String {
        let endpoint = self.config.endpoint.trim().trim_end_matches('/');
        if endpoint.ends_with("/chat/completions") {
            endpoint.to_string()
        } else if endpoint.ends_with("/v1") {
            format!("{}/chat/completions", endpoint)
        } else {
            format!("{}/v1/chat/completions", endpoint)
        }
    }

    fn completions_url(&self) -> String {
        let chat = self.chat_completions_url();
        let base = chat.trim_end_matches("/chat/completions");
        format!("{}/completions", base)
    }
}

#[async_trait]
impl ModelCaller for ChatCompletionsClient {
    async fn call(&self, messages: &[ChatMessage]) -> String {
        match self.complete(messages).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    provider = %self.config.provider,
                    model = %self.config.model,
                    error = %e,
                    "Model call failed"
                );
                format!("{}{}", ERROR_PREFIX, e)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn flatten_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = messages
        .iter()
        .map(|m| format!("[{}]\n{}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    prompt.push_str("\n\n[assistant]\n");
    prompt
}

fn truncate_for_error(value: &str) -> String {
    const LIMIT: usize = 400;
    match value.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct CompletionsRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<ChatContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ChatContentPart>),
}

impl ChatContent {
    fn into_text(self) -> Option<String> {
        let text = match self {
            ChatContent::Text(text) => text.trim().to_string(),
            ChatContent::Parts(parts) => parts
                .into_iter()
                .filter_map(|p| p.text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChatContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionsResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
}
