use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReviewError, Result};

/// Chat-completions service a run talks to. Selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Groq,
    GigaChat,
    /// KoboldCpp or any other local OpenAI-compatible server.
    #[default]
    #[serde(alias = "local")]
    Kobold,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
            Provider::GigaChat => "gigachat",
            Provider::Kobold => "kobold",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Groq => "https://api.groq.com/openai/v1/chat/completions",
            Provider::GigaChat => "https://gigachat.devices.sberbank.ru/api/v1/chat/completions",
            Provider::Kobold => "http://127.0.0.1:5001",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4",
            Provider::Groq => "llama-3.1-8b-instant",
            Provider::GigaChat => "GigaChat",
            Provider::Kobold => "phi",
        }
    }

    /// Environment variables consulted for the credential, in order.
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::OpenAi => &["OPENAI_API_KEY"],
            Provider::Groq => &["GROQ_API_KEY"],
            Provider::GigaChat => &["GIGACHAT_API_TOKEN", "GIGACHAT_TOKEN"],
            Provider::Kobold => &[],
        }
    }

    /// Environment variables that override the endpoint, in order.
    pub fn base_url_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::OpenAi => &["OPENAI_BASE_URL"],
            Provider::Groq => &["GROQ_BASE_URL"],
            Provider::GigaChat => &["GIGACHAT_BASE_URL"],
            Provider::Kobold => &["KOBOLD_BASE_URL", "OPENAI_BASE_URL"],
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !self.api_key_vars().is_empty()
    }

    pub fn temperature(&self) -> f32 {
        match self {
            Provider::Kobold => 0.1,
            _ => 0.0,
        }
    }

    pub fn max_tokens(&self) -> Option<u32> {
        match self {
            Provider::Kobold => Some(512),
            _ => None,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            Provider::Kobold => Duration::from_secs(600),
            _ => Duration::from_secs(120),
        }
    }

    /// Local servers that reject chat completions get a second try on the
    /// plain completions endpoint.
    pub fn falls_back_to_completions(&self) -> bool {
        matches!(self, Provider::Kobold)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "groq" => Ok(Provider::Groq),
            "gigachat" => Ok(Provider::GigaChat),
            "kobold" | "koboldcpp" | "local" => Ok(Provider::Kobold),
            other => Err(ReviewError::Config(format!(
                "unknown provider '{}' (expected openai, groq, gigachat or kobold)",
                other
            ))),
        }
    }
}
