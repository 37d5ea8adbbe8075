use voicelog_errors::prelude::*;

#[derive(Debug, thiserror::Error)]
#[error("{0:?}")]
pub struct LlmError(pub Box<ErrorObj>);

impl LlmError {
    pub fn into_inner(self) -> ErrorObj {
        *self.0
    }

    pub fn schema(msg: &str) -> Self {
        LlmError(Box::new(
            ErrorBuilder::new(codes::SCHEMA_VALIDATION)
                .user_msg("Request is missing required input.")
                .dev_msg(msg)
                .build(),
        ))
    }

    pub fn provider_unavailable(msg: &str) -> Self {
        LlmError(Box::new(
            ErrorBuilder::new(codes::PROVIDER_UNAVAILABLE)
                .user_msg("The language model service is unavailable.")
                .dev_msg(msg)
                .build(),
        ))
    }

    /// Non-2xx from the provider: the upstream status and raw body are
    /// preserved verbatim in the developer message.
    pub fn upstream(status: u16, body: &str) -> Self {
        LlmError(Box::new(
            ErrorBuilder::new(codes::PROVIDER_UNAVAILABLE)
                .user_msg("The language model service returned an error.")
                .dev_msg(format!("upstream status {status}: {body}"))
                .build(),
        ))
    }

    pub fn unexpected_shape(msg: &str) -> Self {
        LlmError(Box::new(
            ErrorBuilder::new(codes::PROVIDER_UNEXPECTED_SHAPE)
                .user_msg("The language model returned an unrecognized response.")
                .dev_msg(msg)
                .build(),
        ))
    }

    pub fn unknown(msg: &str) -> Self {
        LlmError(Box::new(
            ErrorBuilder::new(codes::UNKNOWN_INTERNAL)
                .user_msg("Language model call failed.")
                .dev_msg(msg)
                .build(),
        ))
    }
}
