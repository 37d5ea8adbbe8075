use crate::retry::RetryClass;

/// A stable machine-readable error code with its canonical HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: &'static str,
    pub http_status: u16,
    pub retry: RetryClass,
}

pub const SCHEMA_VALIDATION: ErrorCode = ErrorCode {
    code: "schema.validation",
    http_status: 400,
    retry: RetryClass::Permanent,
};

pub const AUTH_UNAUTHENTICATED: ErrorCode = ErrorCode {
    code: "auth.unauthenticated",
    http_status: 401,
    retry: RetryClass::Permanent,
};

pub const AUTH_FORBIDDEN: ErrorCode = ErrorCode {
    code: "auth.forbidden",
    http_status: 403,
    retry: RetryClass::Permanent,
};

pub const QUOTA_EXHAUSTED: ErrorCode = ErrorCode {
    code: "quota.exhausted",
    http_status: 403,
    retry: RetryClass::None,
};

pub const STORAGE_NOT_FOUND: ErrorCode = ErrorCode {
    code: "storage.not_found",
    http_status: 404,
    retry: RetryClass::Permanent,
};

pub const STORAGE_CONFLICT: ErrorCode = ErrorCode {
    code: "storage.conflict",
    http_status: 409,
    retry: RetryClass::Permanent,
};

pub const PROVIDER_UNAVAILABLE: ErrorCode = ErrorCode {
    code: "provider.unavailable",
    http_status: 502,
    retry: RetryClass::Transient,
};

pub const PROVIDER_UNEXPECTED_SHAPE: ErrorCode = ErrorCode {
    code: "provider.unexpected_shape",
    http_status: 502,
    retry: RetryClass::Permanent,
};

pub const UNKNOWN_INTERNAL: ErrorCode = ErrorCode {
    code: "unknown.internal",
    http_status: 500,
    retry: RetryClass::None,
};
