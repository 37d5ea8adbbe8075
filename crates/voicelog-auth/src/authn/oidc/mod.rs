mod provider;

pub use provider::{JwkConfig, JwkSource, OidcAuthenticator, OidcConfig, OidcConfigBuilder};
