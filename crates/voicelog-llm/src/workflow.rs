use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Url,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::errors::LlmError;
use crate::extract::{workflow_text, Extracted};

const DEFAULT_ENDPOINT: &str = "https://api.dify.ai/v1/workflows/run";

/// Configuration options for the workflow-run upstream.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub api_key: String,
    pub endpoint: Url,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
}

impl WorkflowConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let endpoint = Url::parse(DEFAULT_ENDPOINT)
            .map_err(|err| LlmError::unknown(&format!("workflow endpoint parse failed: {err}")))?;
        Ok(Self {
            api_key: api_key.into(),
            endpoint,
            request_timeout: Duration::from_secs(30),
            max_concurrent_requests: 8,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl AsRef<str>) -> Result<Self, LlmError> {
        self.endpoint = Url::parse(endpoint.as_ref())
            .map_err(|err| LlmError::unknown(&format!("workflow endpoint parse failed: {err}")))?;
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

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowRunInput {
    pub department: String,
    pub rating: String,
    pub details: String,
    /// Stable end-user identifier forwarded to the workflow for attribution.
    pub user: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowAnswer {
    pub text: String,
    pub conversation_id: String,
    pub message_id: String,
}

/// One blocking workflow run per invocation: no retry, no streaming. The
/// input key mapping (`department -> name`, `rating -> feeling`,
/// `details -> what`) matches the workflow's declared input variables and
/// must not drift.
pub struct WorkflowClient {
    client: Client,
    endpoint: Url,
    limiter: Arc<Semaphore>,
}

impl WorkflowClient {
    pub fn new(config: WorkflowConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = format!("Bearer {}", config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|err| LlmError::unknown(&format!("invalid workflow api key: {err}")))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| LlmError::unknown(&format!("workflow client build failed: {err}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
        })
    }

    pub async fn run(&self, input: &WorkflowRunInput) -> Result<WorkflowAnswer, LlmError> {
        if input.department.is_empty() {
            return Err(LlmError::schema("department is required"));
        }
        if input.rating.is_empty() {
            return Err(LlmError::schema("rating is required"));
        }
        if input.details.is_empty() {
            return Err(LlmError::schema("details is required"));
        }

        let payload = json!({
            "inputs": {
                "name": input.department,
                "feeling": input.rating,
                "what": input.details,
            },
            "response_mode": "blocking",
            "user": input.user,
        });

        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| LlmError::unknown(&format!("workflow limiter closed: {err}")))?;

        debug!(payload = %payload, "workflow request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| LlmError::provider_unavailable(&format!("workflow request error: {err}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            LlmError::provider_unavailable(&format!("workflow body read error: {err}"))
        })?;

        debug!(status = status.as_u16(), body = %body, "workflow response");

        if !status.is_success() {
            warn!(status = status.as_u16(), "workflow run failed");
            return Err(LlmError::upstream(status.as_u16(), &body));
        }

        let value: Value = serde_json::from_str(&body).map_err(|err| {
            LlmError::provider_unavailable(&format!("workflow response decode: {err}"))
        })?;

        let text = match workflow_text(&value) {
            Extracted::Found(text) => text,
            Extracted::NotFound => {
                return Err(LlmError::unexpected_shape(&format!(
                    "no answer field in workflow response: {value}"
                )))
            }
        };

        let conversation_id = id_field(&value, "conversation_id");
        let message_id = id_field(&value, "message_id");

        Ok(WorkflowAnswer {
            text,
            conversation_id,
            message_id,
        })
    }
}

fn id_field(value: &Value, field: &str) -> String {
    value
        .get("data")
        .and_then(|d| d.get(field))
        .or_else(|| value.get(field))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input() -> WorkflowRunInput {
        WorkflowRunInput {
            department: "Ops".into(),
            rating: "4".into(),
            details: "Shipped the release".into(),
            user: "uid-1".into(),
        }
    }

    async fn client_for(server: &MockServer) -> WorkflowClient {
        let config = WorkflowConfig::new("wf-key")
            .unwrap()
            .with_endpoint(format!("{}/v1/workflows/run", server.uri()))
            .unwrap();
        WorkflowClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn run_maps_inputs_and_extracts_answer() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/workflows/run"))
            .and(header("authorization", "Bearer wf-key"))
            .and(body_partial_json(serde_json::json!({
                "inputs": {"name": "Ops", "feeling": "4", "what": "Shipped the release"},
                "response_mode": "blocking",
                "user": "uid-1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "outputs": {"output": "Good work"},
                    "conversation_id": "c1",
                    "message_id": "m1",
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let answer = client.run(&input()).await.unwrap();
        assert_eq!(answer.text, "Good work");
        assert_eq!(answer.conversation_id, "c1");
        assert_eq!(answer.message_id, "m1");
    }

    #[tokio::test]
    async fn missing_field_issues_no_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let mut bad = input();
        bad.details = String::new();
        let err = client.run(&bad).await.expect_err("invalid input");
        assert!(err.to_string().contains("details is required"));
    }

    #[tokio::test]
    async fn upstream_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.run(&input()).await.expect_err("upstream failure");
        let obj = err.into_inner();
        assert_eq!(obj.code, "provider.unavailable");
        assert!(obj.dev_msg.contains("503"));
        assert!(obj.dev_msg.contains("overloaded"));
    }

    #[tokio::test]
    async fn unrecognized_shape_fails_loudly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"task_id": "t1"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.run(&input()).await.expect_err("shape miss");
        assert_eq!(err.into_inner().code, "provider.unexpected_shape");
    }
}
