use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Url,
};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::errors::LlmError;
use crate::model::{ChatAnswer, ChatInput, ChatUsage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/";
const DEFAULT_VERSION: &str = "v1beta";

pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: Url,
    pub api_version: String,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|err| LlmError::unknown(&format!("gemini base url parse failed: {err}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url,
            api_version: DEFAULT_VERSION.to_string(),
            request_timeout: Duration::from_secs(60),
            max_concurrent_requests: 8,
        })
    }

    pub fn with_base_url(mut self, base: impl AsRef<str>) -> Result<Self, LlmError> {
        self.base_url = Url::parse(base.as_ref())
            .map_err(|err| LlmError::unknown(&format!("gemini base url parse failed: {err}")))?;
        if !self.base_url.path().ends_with('/') {
            self.base_url
                .set_path(&format!("{}/", self.base_url.path().trim_end_matches('/')));
        }
        Ok(self)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit.max(1);
        self
    }
}

pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
    limiter: Arc<Semaphore>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| LlmError::unknown(&format!("gemini client build failed: {err}")))?;

        Ok(Self {
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            client,
            config,
        })
    }

    fn endpoint(&self, model: &str) -> Result<Url, LlmError> {
        let version = self.config.api_version.trim_end_matches('/');
        let joined = format!("{version}/models/{model}:generateContent");
        let mut url = self
            .config
            .base_url
            .join(&joined)
            .map_err(|err| LlmError::unknown(&format!("gemini endpoint build failed: {err}")))?;
        url.query_pairs_mut()
            .append_pair("key", &self.config.api_key);
        Ok(url)
    }

    pub async fn chat(&self, input: &ChatInput) -> Result<ChatAnswer, LlmError> {
        if input.messages.is_empty() {
            return Err(LlmError::schema("messages must be a non-empty array"));
        }

        let model = input.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL);
        let url = self.endpoint(model)?;

        let contents: Vec<Value> = input
            .messages
            .iter()
            .map(|message| {
                let role = match message.role.as_str() {
                    "assistant" | "model" => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": message.content}]})
            })
            .collect();

        let mut payload = json!({ "contents": contents });
        if let Some(temperature) = input.temperature {
            payload["generationConfig"] = json!({ "temperature": temperature });
        }

        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| LlmError::unknown(&format!("gemini limiter closed: {err}")))?;

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| LlmError::provider_unavailable(&format!("gemini request error: {err}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            LlmError::provider_unavailable(&format!("gemini body read error: {err}"))
        })?;

        debug!(status = status.as_u16(), body = %body, "gemini response");

        if !status.is_success() {
            return Err(LlmError::upstream(status.as_u16(), &body));
        }

        let value: Value = serde_json::from_str(&body).map_err(|err| {
            LlmError::provider_unavailable(&format!("gemini response decode: {err}"))
        })?;

        build_answer(model, &value)
    }
}

fn build_answer(model: &str, value: &Value) -> Result<ChatAnswer, LlmError> {
    let candidate = value
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| LlmError::unexpected_shape("gemini returned no candidates"))?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(LlmError::unexpected_shape(
            "gemini candidate has no text parts",
        ));
    }

    let usage = value.get("usageMetadata").map(|meta| ChatUsage {
        prompt_tokens: meta
            .get("promptTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        completion_tokens: meta
            .get("candidatesTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        total_tokens: meta
            .get("totalTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    });

    Ok(ChatAnswer {
        text,
        finish_reason: candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .map(str::to_string),
        usage,
        model: value
            .get("modelVersion")
            .and_then(Value::as_str)
            .unwrap_or(model)
            .to_string(),
        id: value
            .get("responseId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input() -> ChatInput {
        ChatInput {
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "Say hi".into(),
            }],
            model: None,
            temperature: Some(0.2),
        }
    }

    async fn client_for(server: &MockServer) -> GeminiClient {
        let config = GeminiConfig::new("g-key")
            .unwrap()
            .with_base_url(server.uri())
            .unwrap();
        GeminiClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn chat_joins_candidate_parts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!(
                "/v1beta/models/{DEFAULT_CHAT_MODEL}:generateContent"
            )))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "hello "}, {"text": "there"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6},
                "modelVersion": "gemini-1.5-flash-001"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let answer = client.chat(&input()).await.unwrap();
        assert_eq!(answer.text, "hello there");
        assert_eq!(answer.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(answer.usage.unwrap().total_tokens, 6);
        assert_eq!(answer.model, "gemini-1.5-flash-001");
    }

    #[tokio::test]
    async fn chat_fails_loudly_without_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.chat(&input()).await.expect_err("no candidates");
        assert_eq!(err.into_inner().code, "provider.unexpected_shape");
    }
}
