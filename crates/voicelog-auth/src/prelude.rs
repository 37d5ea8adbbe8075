pub use crate::authn::oidc::{JwkConfig, JwkSource, OidcAuthenticator, OidcConfig};
pub use crate::authn::Authenticator;
pub use crate::errors::AuthError;
pub use crate::model::AuthnInput;
