//! Chat-completions client for the field extractor.
//!
//! Talks to OpenAI, to Gemini through its OpenAI-compatible endpoint, or to
//! any server exposing `/chat/completions`. Extraction only needs single,
//! non-streaming answers; in JSON mode an answer cut off by the token limit
//! is reported as an error rather than handed on as broken JSON.

use async_trait::async_trait;
use compagent_core::error::ProviderError;
use compagent_core::message::{Message, Role};
use compagent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Upper bound for one HTTP exchange; the chain applies its own, tighter one.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key)
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::new("gemini", GEMINI_BASE_URL, api_key)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "no API key configured for {}",
                self.name
            )));
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            json_mode = request.json_mode,
            messages = request.messages.len(),
            "Requesting extraction"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&ChatBody::from(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(format!("{}: {e}", self.name))
                } else {
                    ProviderError::Network(format!("{}: {e}", self.name))
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            let error = status_error(status, retry_after, body);
            warn!(provider = %self.name, status, error = %error, "Extraction backend refused the request");
            return Err(error);
        }

        let completion: Completion = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("{} sent an unreadable completion: {e}", self.name),
        })?;
        completion.into_response(&request)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

/// Map a non-200 status to the error the chain decides on.
fn status_error(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(5),
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "the API key was rejected or lacks access to this model".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl<'a> From<&'a ProviderRequest> for ChatBody<'a> {
    fn from(request: &'a ProviderRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            stream: false,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: &message.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl Completion {
    fn into_response(self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: "completion had no choices".into(),
            });
        };
        if request.json_mode && choice.finish_reason.as_deref() == Some("length") {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: "JSON answer was cut off by the token limit".into(),
            });
        }

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: self.model.unwrap_or_else(|| request.model.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction_request() -> ProviderRequest {
        ProviderRequest::new(
            "gpt-4o",
            vec![
                Message::system("Extract candidate fields as JSON."),
                Message::user("CAND-001 is a P3 in Seattle"),
            ],
        )
        .json()
    }

    fn completion(raw: &str) -> Completion {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn constructors_point_at_known_endpoints() {
        let gemini = OpenAiCompatProvider::gemini("key");
        assert_eq!(gemini.name, "gemini");
        assert_eq!(gemini.base_url, GEMINI_BASE_URL);

        let custom = OpenAiCompatProvider::new("local", "http://localhost:8080/v1/", "k");
        assert_eq!(custom.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn json_mode_body() {
        let request = extraction_request();
        let body = serde_json::to_value(ChatBody::from(&request)).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "CAND-001 is a P3 in Seattle");
        assert_eq!(body["stream"], false);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn plain_body_omits_response_format() {
        let request = ProviderRequest::new("gpt-4o", vec![]).with_max_tokens(256);
        let body = serde_json::to_value(ChatBody::from(&request)).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["max_tokens"], 256);
    }

    #[test]
    fn completion_becomes_response() {
        let raw = r#"{
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "{\"intent\":\"compensation\"}"},
                         "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        }"#;
        let response = completion(raw).into_response(&extraction_request()).unwrap();
        assert_eq!(response.model, "gpt-4o-2024-08-06");
        assert!(response.message.content.contains("compensation"));
        assert_eq!(response.usage.unwrap().total_tokens, 17);
    }

    #[test]
    fn truncated_json_answer_is_an_error() {
        let raw = r#"{"choices": [{"message": {"content": "{\"intent\": \"compen"}, "finish_reason": "length"}]}"#;
        assert!(completion(raw).into_response(&extraction_request()).is_err());

        let plain = ProviderRequest::new("gpt-4o", vec![Message::user("hi")]);
        let response = completion(raw).into_response(&plain).unwrap();
        assert_eq!(response.model, "gpt-4o");
    }

    #[test]
    fn empty_choices_is_an_error() {
        assert!(completion(r#"{"choices": []}"#)
            .into_response(&extraction_request())
            .is_err());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(429, Some(12), String::new()),
            ProviderError::RateLimited { retry_after_secs: 12 }
        ));
        assert!(matches!(
            status_error(401, None, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(500, None, "boom".into()),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let err = OpenAiCompatProvider::openai("")
            .complete(extraction_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
