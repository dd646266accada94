//! LLM chat clients.
//!
//! The analysis only needs one operation from a model provider: send a
//! list of chat messages, get the reply text back. [`ChatClient`] is that
//! seam; [`HttpChatClient`] talks to OpenAI-compatible and Ollama servers.

pub mod client;

pub use client::{HttpChatClient, LlmSettings, Provider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message in a chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Failure of a chat call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to LLM endpoint at {0}")]
    Connect(String),

    #[error("LLM API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode LLM response: {0}")]
    Decode(String),

    #[error("LLM response contained no choices")]
    EmptyResponse,

    #[error("failed to send request: {0}")]
    Http(#[from] reqwest::Error),
}

/// An asynchronous chat-completion provider.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Model name, for reports and logs.
    fn model_name(&self) -> &str;

    /// Send the messages and return the reply text.
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError>;
}
