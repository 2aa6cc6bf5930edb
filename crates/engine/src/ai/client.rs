//! `OpenAI`-compatible chat completions client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use super::{AiError, CompletionProvider};
use crate::config::OpenAiConfig;

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Chat completions client.
///
/// Sampling is pinned (temperature 0) and the reply is forced into JSON
/// object mode.
#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

struct OpenAiClientInner {
    client: reqwest::Client,
    model: String,
    endpoint: Url,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl<'a> ChatRequest<'a> {
    const fn new(model: &'a str, system: &'a str, user: &'a str) -> Self {
        Self {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: DEFAULT_MAX_TOKENS,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

impl OpenAiClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AiError::InvalidConfig` if the API key is not a valid header
    /// value or the base URL cannot take a path, and `AiError::Http` if the
    /// HTTP client cannot be built.
    pub fn new(config: &OpenAiConfig) -> Result<Self, AiError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
            .map_err(|_| AiError::InvalidConfig("API key is not a valid header value".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            inner: Arc::new(OpenAiClientInner {
                client,
                model: config.model.clone(),
                endpoint: chat_completions_url(&config.base_url)?,
            }),
        })
    }

    async fn error_from(response: reqwest::Response) -> AiError {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return AiError::RateLimited(retry_after);
        }
        if status == StatusCode::UNAUTHORIZED {
            return AiError::Unauthorized;
        }

        match response.text().await {
            Ok(body) => AiError::Api {
                status: status.as_u16(),
                message: serde_json::from_str::<ApiErrorResponse>(&body)
                    .map_or(body, |e| e.error.message),
            },
            Err(e) => AiError::Http(e),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    fn model(&self) -> &str {
        &self.inner.model
    }

    #[instrument(skip(self, system, user), fields(model = %self.inner.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        let request = ChatRequest::new(&self.inner.model, system, user);

        let response = self
            .inner
            .client
            .post(self.inner.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        tracing::info!(status = %response.status(), "Chat completion returned");
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        message_content(response.json().await?)
    }
}

fn chat_completions_url(base: &Url) -> Result<Url, AiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| AiError::InvalidConfig(format!("base URL cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(["chat", "completions"]);
    Ok(url)
}

fn message_content(response: ChatResponse) -> Result<String, AiError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_owned())
        .filter(|content| !content.is_empty())
        .ok_or(AiError::EmptyResponse)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_payload_shape() {
        let request = ChatRequest::new("gpt-4.1-mini", "sys", "usr");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4.1-mini",
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "usr" }
                ],
                "temperature": 0.0,
                "top_p": 1.0,
                "frequency_penalty": 0.0,
                "presence_penalty": 0.0,
                "max_tokens": 4096,
                "response_format": { "type": "json_object" }
            })
        );
    }

    #[test]
    fn test_endpoint_appends_path() {
        let with_slash = chat_completions_url(&Url::parse("https://api.openai.com/v1/").unwrap());
        let without = chat_completions_url(&Url::parse("https://api.openai.com/v1").unwrap());
        assert_eq!(
            with_slash.unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            without.unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_message_content_is_trimmed() {
        let response: ChatResponse =
            serde_json::from_value(json!({ "choices": [{ "message": { "content": "  {} \n" } }] }))
                .unwrap();
        assert_eq!(message_content(response).unwrap(), "{}");
    }

    #[test]
    fn test_missing_content_is_empty_response() {
        let no_choices: ChatResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(message_content(no_choices), Err(AiError::EmptyResponse)));

        let blank: ChatResponse =
            serde_json::from_value(json!({ "choices": [{ "message": { "content": "   " } }] }))
                .unwrap();
        assert!(matches!(message_content(blank), Err(AiError::EmptyResponse)));
    }

    #[test]
    fn test_client_reports_model() {
        let client = OpenAiClient::new(&OpenAiConfig {
            api_key: SecretString::from("sk-test-key"),
            model: "gpt-4.1-mini".to_string(),
            base_url: Url::parse("https://api.openai.com/v1").unwrap(),
        })
        .unwrap();
        assert_eq!(client.model(), "gpt-4.1-mini");
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<OpenAiClient>();
    }
}
