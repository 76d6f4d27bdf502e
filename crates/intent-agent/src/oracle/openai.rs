//! OpenAI chat-completions oracle

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{CompletionRequest, CompletionResponse, Oracle, OracleError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Oracle backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiOracle {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiOracle {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a compatible endpoint (proxy, Azure gateway, local server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl std::fmt::Debug for OpenAiOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiOracle")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, OracleError> {
        debug!(
            model = %request.model,
            functions = request.functions.as_ref().map_or(0, Vec::len),
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| OracleError::Transport(e.to_string()))?;
            let payload =
                serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            return Err(OracleError::Api {
                status: status.as_u16(),
                payload,
            });
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let oracle = OpenAiOracle::new("sk-test");
        assert_eq!(oracle.endpoint(), "https://api.openai.com/v1/chat/completions");

        let oracle = OpenAiOracle::new("sk-test").with_base_url("http://localhost:8080/v1/");
        assert_eq!(oracle.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let rendered = format!("{:?}", OpenAiOracle::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
    }
}
