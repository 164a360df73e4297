//! Extraction oracle transport
//!
//! Seam for the hosted language model used by the vision fallback. The
//! bundled transport speaks the OpenAI-compatible chat-completions
//! protocol; screenshots travel as base64 data URLs. The core never
//! interprets the reply here, it only carries the text back.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::domain::page::SiteType;
use crate::infrastructure::config::OracleConfig;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no oracle API key configured")]
    MissingApiKey,
    #[error("oracle returned status {status}")]
    Status { status: u16 },
    #[error("oracle reply carried no content")]
    EmptyReply,
    #[error("oracle transport error")]
    Transport(#[from] reqwest::Error),
}

/// What the oracle should look at.
#[derive(Debug, Clone)]
pub enum OraclePayload {
    Text(String),
    /// PNG screenshot bytes.
    Image(Vec<u8>),
}

/// One extraction request: a site-typed instruction plus the content.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub site_type: SiteType,
    pub instruction: String,
    pub payload: OraclePayload,
}

/// Hosted model seam. Returns free-form text expected, not guaranteed, to
/// contain a JSON array; the caller locates and parses it.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn extract(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl ChatCompletionsOracle {
    /// Fails fast when no API key can be resolved; a fallback that cannot
    /// run is a configuration error, not a runtime surprise.
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = config.resolve_api_key().ok_or(OracleError::MissingApiKey)?;
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn user_content(payload: &OraclePayload) -> serde_json::Value {
        match payload {
            OraclePayload::Text(text) => json!(text),
            OraclePayload::Image(png) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(png);
                json!([{
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/png;base64,{encoded}") }
                }])
            }
        }
    }
}

#[async_trait]
impl ExtractionOracle for ChatCompletionsOracle {
    async fn extract(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.instruction },
                { "role": "user", "content": Self::user_content(&request.payload) }
            ],
            "max_tokens": 4096
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status { status: status.as_u16() });
        }

        let completion: ChatCompletionBody = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(OracleError::EmptyReply)?;
        debug!("oracle replied with {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OracleConfig {
        OracleConfig {
            base_url: server.uri(),
            model: "test-model".into(),
            api_key: Some("key-123".into()),
            api_key_env: "AURORA_TEST_NO_SUCH_VAR".into(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn missing_api_key_is_a_constructor_error() {
        let config = OracleConfig {
            api_key: None,
            api_key_env: "AURORA_TEST_NO_SUCH_VAR".into(),
            ..Default::default()
        };
        assert!(matches!(
            ChatCompletionsOracle::new(&config),
            Err(OracleError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn text_payload_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "[{\"title\":\"X\"}]" } }]
            })))
            .mount(&server)
            .await;

        let oracle = ChatCompletionsOracle::new(&config(&server)).unwrap();
        let reply = oracle
            .extract(&OracleRequest {
                site_type: SiteType::Ecommerce,
                instruction: "extract the items".into(),
                payload: OraclePayload::Text("<html></html>".into()),
            })
            .await
            .unwrap();
        assert!(reply.contains("title"));
    }

    #[tokio::test]
    async fn http_failure_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let oracle = ChatCompletionsOracle::new(&config(&server)).unwrap();
        let err = oracle
            .extract(&OracleRequest {
                site_type: SiteType::Ecommerce,
                instruction: "extract".into(),
                payload: OraclePayload::Text("x".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Status { status: 429 }));
    }
}
