//! Language-model collaborator.
//!
//! The analysis core only sees [`ModelCaller`]: it hands over a list of chat
//! messages and gets text back. Transport failures never surface as errors;
//! they come back as text starting with [`ERROR_PREFIX`].

pub mod client;
pub mod provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{ChatCompletionsClient, ModelClientConfig};
pub use provider::Provider;

/// Prefix of every model-call failure result.
pub const ERROR_PREFIX: &str = "ERROR: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ModelCaller: Send + Sync {
    /// Sends one conversation and returns the reply text, or an
    /// `ERROR: `-prefixed description of what went wrong.
    async fn call(&self, messages: &[ChatMessage]) -> String;

    fn model_name(&self) -> &str;
}

/// True when a model result is a failure marker rather than real content.
pub fn is_error_result(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_with_lowercase_role() {
        let json = serde_json::to_value(ChatMessage::system("be brief")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be brief");
        assert_eq!(ChatMessage::assistant("ok").role.as_str(), "assistant");
    }

    #[test]
    fn test_is_error_result() {
        assert!(is_error_result("ERROR: request timed out"));
        assert!(is_error_result("ERROR:"));
        assert!(!is_error_result("No errors found"));
    }
}
