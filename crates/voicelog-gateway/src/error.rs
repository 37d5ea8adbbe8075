use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};
use voicelog_auth::prelude::AuthError;
use voicelog_errors::prelude::*;
use voicelog_llm::prelude::LlmError;
use voicelog_storage::prelude::StorageError;

/// Handler-boundary error: any [`ErrorObj`] becomes a stable JSON body with
/// the code's HTTP status. Developer detail stays in the logs.
#[derive(Debug)]
pub struct ApiError(pub ErrorObj);

impl ApiError {
    pub fn invalid_argument(msg: &str) -> Self {
        ApiError(
            ErrorBuilder::new(codes::SCHEMA_VALIDATION)
                .user_msg(msg)
                .build(),
        )
    }

    pub fn unauthenticated(msg: &str) -> Self {
        ApiError(
            ErrorBuilder::new(codes::AUTH_UNAUTHENTICATED)
                .user_msg("Authentication required.")
                .dev_msg(msg)
                .build(),
        )
    }

    pub fn forbidden(user_msg: &str) -> Self {
        ApiError(
            ErrorBuilder::new(codes::AUTH_FORBIDDEN)
                .user_msg(user_msg)
                .build(),
        )
    }

    pub fn quota_exhausted(user_msg: &str) -> Self {
        ApiError(
            ErrorBuilder::new(codes::QUOTA_EXHAUSTED)
                .user_msg(user_msg)
                .build(),
        )
    }

    pub fn unavailable(user_msg: &str) -> Self {
        ApiError(
            ErrorBuilder::new(codes::PROVIDER_UNAVAILABLE)
                .user_msg(user_msg)
                .build(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.code, detail = %self.0.dev_msg, "request failed");
        } else {
            warn!(code = self.0.code, detail = %self.0.dev_msg, "request rejected");
        }
        let view = self.0.to_public();
        let body = json!({
            "success": false,
            "code": view.code,
            "message": view.message,
        });
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError(err.into_inner())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError(err.into_inner())
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        ApiError(err.into_inner())
    }
}
