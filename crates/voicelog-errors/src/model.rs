use crate::codes::ErrorCode;
use crate::retry::RetryClass;
use serde::{Deserialize, Serialize};

/// The single error vocabulary shared across crates. Crate-level wrappers
/// (`AuthError`, `StorageError`, `LlmError`) carry one of these and convert
/// back at the handler boundary.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{code} ({http_status}): {dev_msg}")]
pub struct ErrorObj {
    pub code: &'static str,
    pub http_status: u16,
    pub retry: RetryClass,
    /// Safe to show to the submitting user.
    pub user_msg: String,
    /// Operator-facing detail; never sent over the wire.
    pub dev_msg: String,
}

impl ErrorObj {
    pub fn to_public(&self) -> PublicErrorView {
        PublicErrorView {
            code: self.code.to_string(),
            message: self.user_msg.clone(),
        }
    }
}

/// The wire-visible subset of an [`ErrorObj`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicErrorView {
    pub code: String,
    pub message: String,
}

pub struct ErrorBuilder {
    code: ErrorCode,
    user_msg: Option<String>,
    dev_msg: Option<String>,
}

impl ErrorBuilder {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            user_msg: None,
            dev_msg: None,
        }
    }

    pub fn user_msg(mut self, msg: impl Into<String>) -> Self {
        self.user_msg = Some(msg.into());
        self
    }

    pub fn dev_msg(mut self, msg: impl Into<String>) -> Self {
        self.dev_msg = Some(msg.into());
        self
    }

    pub fn build(self) -> ErrorObj {
        let user_msg = self
            .user_msg
            .unwrap_or_else(|| "Request failed.".to_string());
        let dev_msg = self.dev_msg.unwrap_or_else(|| user_msg.clone());
        ErrorObj {
            code: self.code.code,
            http_status: self.code.http_status,
            retry: self.code.retry,
            user_msg,
            dev_msg,
        }
    }
}
