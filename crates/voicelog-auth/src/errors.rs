use voicelog_errors::prelude::*;

#[derive(Debug, thiserror::Error)]
#[error("{0:?}")]
pub struct AuthError(pub Box<ErrorObj>);

impl AuthError {
    pub fn into_inner(self) -> ErrorObj {
        *self.0
    }
}

pub fn unauthenticated(msg: &str) -> AuthError {
    AuthError(Box::new(
        ErrorBuilder::new(codes::AUTH_UNAUTHENTICATED)
            .user_msg("Authentication required.")
            .dev_msg(msg)
            .build(),
    ))
}

pub fn forbidden(msg: &str) -> AuthError {
    AuthError(Box::new(
        ErrorBuilder::new(codes::AUTH_FORBIDDEN)
            .user_msg("Access denied.")
            .dev_msg(msg)
            .build(),
    ))
}

pub fn provider_unavailable(msg: &str) -> AuthError {
    AuthError(Box::new(
        ErrorBuilder::new(codes::PROVIDER_UNAVAILABLE)
            .user_msg("Identity provider is unavailable.")
            .dev_msg(msg)
            .build(),
    ))
}
