//! Oracle port: the language-model capability used for selection and extraction

mod openai;

use api_catalog::FunctionSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use openai::OpenAiOracle;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message sent to the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
}

/// Chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Tool definitions; present only for argument extraction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionSpec>>,
}

/// Chat completion response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl CompletionResponse {
    /// Text content of the first choice
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }

    /// Structured function call of the first choice
    pub fn first_function_call(&self) -> Option<&FunctionCall> {
        self.choices.first()?.message.function_call.as_ref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
    pub function_call: Option<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: Option<String>,
    /// A JSON-encoded string from most providers, occasionally an object
    #[serde(default)]
    pub arguments: Value,
}

/// Failure talking to the oracle
#[derive(Error, Debug)]
pub enum OracleError {
    /// Could not reach the oracle or read its reply
    #[error("{0}")]
    Transport(String),

    /// The oracle answered with a non-success status
    #[error("status {status}: {payload}")]
    Api { status: u16, payload: Value },

    /// The reply did not have the expected shape
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),
}

/// A chat-completion capable language model
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, OracleError>;
}
