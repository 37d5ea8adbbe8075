use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Url,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::errors::LlmError;
use crate::extract::{image_source, Extracted};
use crate::model::{ChatAnswer, ChatInput, ChatMessage, ChatUsage, ImageAnswer, ImageInput};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const IMAGES_PATH: &str = "images/generations";

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
pub const DEFAULT_IMAGE_QUALITY: &str = "standard";

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: Url,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|err| LlmError::unknown(&format!("openai base url parse failed: {err}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url,
            request_timeout: Duration::from_secs(60),
            max_concurrent_requests: 8,
        })
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Result<Self, LlmError> {
        self.base_url = Url::parse(base_url.as_ref())
            .map_err(|err| LlmError::unknown(&format!("openai base url parse failed: {err}")))?;
        if !self.base_url.path().ends_with('/') {
            self.base_url
                .set_path(&format!("{}/", self.base_url.path().trim_end_matches('/')));
        }
        Ok(self)
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

pub struct OpenAiClient {
    client: Client,
    chat_url: Url,
    images_url: Url,
    limiter: Arc<Semaphore>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    id: String,
    model: String,
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: InboundMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct InboundMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'a str>,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = format!("Bearer {}", config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|err| LlmError::unknown(&format!("invalid openai api key: {err}")))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| LlmError::unknown(&format!("openai client build failed: {err}")))?;

        let chat_url = config
            .base_url
            .join(CHAT_COMPLETIONS_PATH)
            .map_err(|err| LlmError::unknown(&format!("openai chat url join failed: {err}")))?;
        let images_url = config
            .base_url
            .join(IMAGES_PATH)
            .map_err(|err| LlmError::unknown(&format!("openai images url join failed: {err}")))?;

        Ok(Self {
            client,
            chat_url,
            images_url,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
        })
    }

    pub async fn chat(&self, input: &ChatInput) -> Result<ChatAnswer, LlmError> {
        if input.messages.is_empty() {
            return Err(LlmError::schema("messages must be a non-empty array"));
        }

        let model = input.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL);
        let payload = ChatCompletionRequest {
            model,
            messages: &input.messages,
            temperature: input.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        };

        let value = self.post(&self.chat_url, &payload).await?;
        let response: ChatCompletionResponse = serde_json::from_value(value).map_err(|err| {
            LlmError::unexpected_shape(&format!("openai chat response decode: {err}"))
        })?;

        let mut choices = response.choices;
        if choices.is_empty() {
            return Err(LlmError::unexpected_shape("openai returned no choices"));
        }
        let choice = choices.remove(0);
        let text = choice
            .message
            .content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LlmError::unexpected_shape("openai choice has no text content"))?;

        Ok(ChatAnswer {
            text,
            finish_reason: choice.finish_reason,
            usage: response.usage,
            model: response.model,
            id: response.id,
        })
    }

    pub async fn generate_image(&self, input: &ImageInput) -> Result<ImageAnswer, LlmError> {
        if input.prompt.is_empty() {
            return Err(LlmError::schema("prompt is required"));
        }

        let model = input.model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL);
        // dall-e-2 rejects the quality parameter; the newer models accept it.
        let quality = if model == "dall-e-2" {
            None
        } else {
            Some(input.quality.as_deref().unwrap_or(DEFAULT_IMAGE_QUALITY))
        };
        let payload = ImageGenerationRequest {
            model,
            prompt: &input.prompt,
            n: 1,
            size: input.size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE),
            quality,
        };

        let value = self.post(&self.images_url, &payload).await?;

        let source = match image_source(&value) {
            Extracted::Found(source) => source,
            Extracted::NotFound => {
                return Err(LlmError::unexpected_shape(
                    "no image payload in generation response",
                ))
            }
        };
        let revised_prompt = value
            .get("data")
            .and_then(Value::as_array)
            .and_then(|parts| parts.first())
            .and_then(|part| part.get("revised_prompt"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(ImageAnswer {
            source,
            revised_prompt,
            model: model.to_string(),
        })
    }

    async fn post<B: Serialize>(&self, url: &Url, payload: &B) -> Result<Value, LlmError> {
        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| LlmError::unknown(&format!("openai limiter closed: {err}")))?;

        let response = self
            .client
            .post(url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|err| LlmError::provider_unavailable(&format!("openai request error: {err}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            LlmError::provider_unavailable(&format!("openai body read error: {err}"))
        })?;

        debug!(status = status.as_u16(), body = %body, "openai response");

        if !status.is_success() {
            return Err(LlmError::upstream(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|err| LlmError::provider_unavailable(&format!("openai response decode: {err}")))
    }
}
