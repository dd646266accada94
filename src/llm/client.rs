//! HTTP chat client for OpenAI-compatible and Ollama endpoints.

use super::{ChatClient, ChatMessage, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Wire protocol spoken by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// `POST {base}/chat/completions`
    #[default]
    Openai,
    /// `POST {base}/api/chat`
    Ollama,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Openai => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Connection and sampling settings for a chat client.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: Provider,
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Openai,
            api_base: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "qwen2.5:14b".to_string(),
            temperature: 0.7,
            max_tokens: Some(2048),
            timeout_seconds: 600,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    settings: LlmSettings,
    http_client: reqwest::Client,
}

impl HttpChatClient {
    /// Create a client; the timeout applies to each request.
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        Ok(Self {
            settings,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        let base = self.settings.api_base.trim_end_matches('/');
        match self.settings.provider {
            Provider::Openai => format!("{}/chat/completions", base),
            Provider::Ollama => format!("{}/api/chat", base),
        }
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let s = &self.settings;
        match s.provider {
            Provider::Openai => {
                let mut body = json!({
                    "model": s.model,
                    "messages": messages,
                    "temperature": s.temperature,
                    "stream": false,
                });
                if let Some(max_tokens) = s.max_tokens {
                    body["max_tokens"] = json!(max_tokens);
                }
                body
            }
            Provider::Ollama => {
                let mut options = json!({ "temperature": s.temperature });
                if let Some(max_tokens) = s.max_tokens {
                    options["num_predict"] = json!(max_tokens);
                }
                json!({
                    "model": s.model,
                    "messages": messages,
                    "stream": false,
                    "options": options,
                })
            }
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.settings.timeout_seconds)
        } else if e.is_connect() {
            LlmError::Connect(self.settings.api_base.clone())
        } else {
            LlmError::Http(e)
        }
    }
}

/// Extract the reply text from a raw response body.
fn parse_reply(provider: Provider, body: &str) -> Result<String, LlmError> {
    let content = match provider {
        Provider::Openai => {
            let response: OpenAiResponse =
                serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;
            response
                .choices
                .into_iter()
                .next()
                .ok_or(LlmError::EmptyResponse)?
                .message
                .content
        }
        Provider::Ollama => {
            let response: OllamaResponse =
                serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;
            response.message.content
        }
    };

    Ok(content.unwrap_or_default())
}

#[async_trait]
impl ChatClient for HttpChatClient {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let url = self.endpoint();
        debug!("Sending chat request with {} messages to {}", messages.len(), url);

        let mut request = self.http_client.post(&url).json(&self.request_body(&messages));
        if let Some(ref key) = self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_reply(self.settings.provider, &body)
    }
}
