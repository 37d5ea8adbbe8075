#![allow(clippy::result_large_err)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use voicelog_types::prelude::{Id, Subject, SubjectKind};

use crate::authn::Authenticator;
use crate::errors;
use crate::errors::AuthError;
use crate::model::AuthnInput;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JwkConfig {
    pub kid: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    #[serde(default)]
    pub k: Option<String>,
}

#[derive(Clone, Debug)]
pub enum JwkSource {
    Static(Vec<JwkConfig>),
    Http { uri: String, cache_ttl: Duration },
}

#[derive(Clone, Debug)]
pub struct OidcConfig {
    pub issuer: String,
    pub audience: Vec<String>,
    pub subject_claim: Option<String>,
    pub email_claim: String,
    pub name_claim: String,
    pub jwk_source: JwkSource,
    pub algorithms: Vec<jsonwebtoken::Algorithm>,
}

impl OidcConfig {
    pub fn builder(issuer: impl Into<String>) -> OidcConfigBuilder {
        OidcConfigBuilder {
            issuer: issuer.into(),
            audience: Vec::new(),
            subject_claim: None,
            email_claim: "email".into(),
            name_claim: "name".into(),
            jwk_source: JwkSource::Http {
                uri: String::new(),
                cache_ttl: DEFAULT_CACHE_TTL,
            },
            algorithms: vec![jsonwebtoken::Algorithm::RS256],
        }
    }
}

pub struct OidcConfigBuilder {
    issuer: String,
    audience: Vec<String>,
    subject_claim: Option<String>,
    email_claim: String,
    name_claim: String,
    jwk_source: JwkSource,
    algorithms: Vec<jsonwebtoken::Algorithm>,
}

impl OidcConfigBuilder {
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience.push(audience.into());
        self
    }

    pub fn subject_claim(mut self, claim: impl Into<String>) -> Self {
        self.subject_claim = Some(claim.into());
        self
    }

    pub fn email_claim(mut self, claim: impl Into<String>) -> Self {
        self.email_claim = claim.into();
        self
    }

    pub fn name_claim(mut self, claim: impl Into<String>) -> Self {
        self.name_claim = claim.into();
        self
    }

    pub fn static_keys(mut self, keys: Vec<JwkConfig>) -> Self {
        self.jwk_source = JwkSource::Static(keys);
        self
    }

    pub fn jwks_uri(mut self, uri: impl Into<String>) -> Self {
        self.jwk_source = JwkSource::Http {
            uri: uri.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
        };
        self
    }

    pub fn jwks_uri_with_ttl(mut self, uri: impl Into<String>, ttl: Duration) -> Self {
        self.jwk_source = JwkSource::Http {
            uri: uri.into(),
            cache_ttl: ttl,
        };
        self
    }

    pub fn algorithms(mut self, algs: Vec<jsonwebtoken::Algorithm>) -> Self {
        self.algorithms = algs;
        self
    }

    pub fn build(self) -> OidcConfig {
        OidcConfig {
            issuer: self.issuer,
            audience: self.audience,
            subject_claim: self.subject_claim,
            email_claim: self.email_claim,
            name_claim: self.name_claim,
            jwk_source: self.jwk_source,
            algorithms: self.algorithms,
        }
    }
}

#[derive(Clone)]
struct CachedKeys {
    keys: HashMap<String, JwkConfig>,
    expires_at: Option<Instant>,
}

/// Verifies bearer JWTs against the identity provider's published keys.
/// Every failure, including a JWKS fetch failure, reads as unauthenticated
/// to the caller; verification is never retried or partially trusted.
pub struct OidcAuthenticator {
    config: Arc<OidcConfig>,
    client: Option<reqwest::Client>,
    cache: Arc<RwLock<Option<CachedKeys>>>,
}

impl OidcAuthenticator {
    pub fn new(config: OidcConfig) -> Result<Self, AuthError> {
        let client = match &config.jwk_source {
            JwkSource::Http { .. } => {
                let builder = reqwest::Client::builder().use_rustls_tls();
                Some(builder.build().map_err(|err| {
                    errors::provider_unavailable(&format!("failed to build http client: {err}"))
                })?)
            }
            JwkSource::Static(_) => None,
        };
        Ok(Self {
            config: Arc::new(config),
            client,
            cache: Arc::new(RwLock::new(None)),
        })
    }

    async fn ensure_keys(&self) -> Result<(), AuthError> {
        let needs_refresh = {
            let guard = self.cache.read();
            match guard.as_ref() {
                Some(cache) => match cache.expires_at {
                    Some(expiry) => expiry <= Instant::now(),
                    None => false,
                },
                None => true,
            }
        };
        if !needs_refresh {
            return Ok(());
        }

        let cache = match &self.config.jwk_source {
            JwkSource::Static(keys) => CachedKeys {
                keys: keys.iter().map(|k| (k.kid.clone(), k.clone())).collect(),
                expires_at: None,
            },
            JwkSource::Http { uri, cache_ttl } => {
                let client = self
                    .client
                    .as_ref()
                    .ok_or_else(|| errors::provider_unavailable("http client not initialised"))?;
                let response = client.get(uri).send().await.map_err(|err| {
                    errors::unauthenticated(&format!("jwks fetch error: {err}"))
                })?;
                if response.status() != StatusCode::OK {
                    return Err(errors::unauthenticated(&format!(
                        "jwks fetch status: {}",
                        response.status()
                    )));
                }
                let body: JwkSet = response.json().await.map_err(|err| {
                    errors::unauthenticated(&format!("jwks decode error: {err}"))
                })?;
                CachedKeys {
                    keys: body.keys.into_iter().map(|k| (k.kid.clone(), k)).collect(),
                    expires_at: Some(Instant::now() + *cache_ttl),
                }
            }
        };

        let mut guard = self.cache.write();
        *guard = Some(cache);
        Ok(())
    }

    fn select_algorithm(&self, alg: Option<&str>) -> Result<jsonwebtoken::Algorithm, AuthError> {
        if let Some(alg) = alg {
            let parsed = jsonwebtoken::Algorithm::from_str(alg).map_err(|_| {
                errors::unauthenticated(&format!("unsupported jwk algorithm: {alg}"))
            })?;
            if self.config.algorithms.contains(&parsed) {
                return Ok(parsed);
            }
            return Err(errors::unauthenticated(&format!(
                "algorithm {alg} not allowed"
            )));
        }
        self.config
            .algorithms
            .first()
            .cloned()
            .ok_or_else(|| errors::unauthenticated("no algorithms configured"))
    }

    fn decoding_key(&self, jwk: &JwkConfig) -> Result<jsonwebtoken::DecodingKey, AuthError> {
        match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk
                    .n
                    .as_ref()
                    .ok_or_else(|| errors::unauthenticated("jwks rsa modulus missing"))?;
                let e = jwk
                    .e
                    .as_ref()
                    .ok_or_else(|| errors::unauthenticated("jwks rsa exponent missing"))?;
                jsonwebtoken::DecodingKey::from_rsa_components(n, e).map_err(|err| {
                    errors::unauthenticated(&format!("failed to build rsa key: {err}"))
                })
            }
            "oct" => {
                let secret = jwk
                    .k
                    .as_ref()
                    .ok_or_else(|| errors::unauthenticated("jwks secret missing"))?;
                let bytes = base64::engine::general_purpose::URL_SAFE
                    .decode(secret)
                    .map_err(|err| {
                        errors::unauthenticated(&format!("secret decode error: {err}"))
                    })?;
                Ok(jsonwebtoken::DecodingKey::from_secret(&bytes))
            }
            other => Err(errors::unauthenticated(&format!(
                "unsupported jwk key type: {other}"
            ))),
        }
    }

    async fn get_key(
        &self,
        kid: Option<&str>,
    ) -> Result<(jsonwebtoken::DecodingKey, jsonwebtoken::Algorithm), AuthError> {
        self.ensure_keys().await?;
        let guard = self.cache.read();
        let cache = guard
            .as_ref()
            .ok_or_else(|| errors::unauthenticated("jwks cache missing"))?;
        let kid = kid.ok_or_else(|| errors::unauthenticated("token missing kid header"))?;
        let jwk = cache
            .keys
            .get(kid)
            .ok_or_else(|| errors::unauthenticated("matching jwk not found"))?
            .clone();
        drop(guard);
        let alg = self.select_algorithm(jwk.alg.as_deref())?;
        let key = self.decoding_key(&jwk)?;
        Ok((key, alg))
    }

    fn build_validation(&self, alg: jsonwebtoken::Algorithm) -> jsonwebtoken::Validation {
        let mut validation = jsonwebtoken::Validation::new(alg);
        validation.set_required_spec_claims(&["exp", "iat"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(std::slice::from_ref(&self.config.issuer));
        if !self.config.audience.is_empty() {
            validation.set_audience(&self.config.audience);
        } else {
            validation.validate_aud = false;
        }
        validation
    }

    fn extract_required(&self, map: &Map<String, Value>, field: &str) -> Result<String, AuthError> {
        match map.get(field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(num)) => Ok(num.to_string()),
            Some(Value::Null) | None => {
                Err(errors::unauthenticated(&format!("claim {field} missing")))
            }
            _ => Err(errors::unauthenticated(&format!(
                "claim {field} must be string"
            ))),
        }
    }

    fn extract_optional(map: &Map<String, Value>, field: &str) -> Option<String> {
        match map.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl Authenticator for OidcAuthenticator {
    async fn authenticate(&self, input: AuthnInput) -> Result<Subject, AuthError> {
        let token = match input {
            AuthnInput::BearerJwt(token) => token,
            // Callable-style hosts hand over an identity their own runtime
            // already verified; the contract is the same either way.
            AuthnInput::PreVerified(subject) => return Ok(subject),
        };

        let header = jsonwebtoken::decode_header(&token)
            .map_err(|err| errors::unauthenticated(&format!("invalid token header: {err}")))?;
        let (key, alg) = self.get_key(header.kid.as_deref()).await?;
        let validation = self.build_validation(alg);

        let data = jsonwebtoken::decode::<serde_json::Value>(&token, &key, &validation)
            .map_err(|err| errors::unauthenticated(&format!("jwt verification failed: {err}")))?;

        let claims = match data.claims {
            Value::Object(map) => map,
            _ => return Err(errors::unauthenticated("jwt claims must be object")),
        };

        let subject_field = self.config.subject_claim.as_deref().unwrap_or("sub");
        let subject_id = self.extract_required(&claims, subject_field)?;
        let email = Self::extract_optional(&claims, &self.config.email_claim);
        let display_name = Self::extract_optional(&claims, &self.config.name_claim);

        Ok(Subject {
            kind: SubjectKind::User,
            subject_id: Id(subject_id),
            email,
            display_name,
            claims,
        })
    }
}

#[derive(Deserialize)]
struct JwkSet {
    keys: Vec<JwkConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn unix_now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn hs256_key() -> (&'static str, JwkConfig) {
        let secret = "super-secret";
        let encoded = base64::engine::general_purpose::URL_SAFE.encode(secret);
        (
            secret,
            JwkConfig {
                kid: "hs-test".into(),
                alg: Some("HS256".into()),
                kty: "oct".into(),
                n: None,
                e: None,
                k: Some(encoded),
            },
        )
    }

    fn mint(secret: &str, claims: &serde_json::Value) -> String {
        let header = Header {
            alg: Algorithm::HS256,
            kid: Some("hs-test".into()),
            ..Header::default()
        };
        encode(&header, claims, &EncodingKey::from_secret(secret.as_bytes())).expect("encode jwt")
    }

    fn static_config(jwk: JwkConfig) -> OidcConfig {
        OidcConfig::builder("https://issuer.example")
            .audience("voicelog")
            .static_keys(vec![jwk])
            .algorithms(vec![Algorithm::HS256])
            .build()
    }

    #[tokio::test]
    async fn authenticate_static_hs256_token() {
        let (secret, jwk) = hs256_key();
        let authenticator = OidcAuthenticator::new(static_config(jwk)).expect("build");

        let now = unix_now();
        let token = mint(
            secret,
            &json!({
                "sub": "user-123",
                "email": "alex@example.com",
                "name": "Alex",
                "iss": "https://issuer.example",
                "aud": "voicelog",
                "exp": now + 600,
                "iat": now,
            }),
        );

        let subject = authenticator
            .authenticate(AuthnInput::BearerJwt(token))
            .await
            .expect("authenticate");
        assert_eq!(subject.subject_id, Id("user-123".into()));
        assert_eq!(subject.email.as_deref(), Some("alex@example.com"));
        assert_eq!(subject.display_name.as_deref(), Some("Alex"));
    }

    #[tokio::test]
    async fn expired_token_is_unauthenticated() {
        let (secret, jwk) = hs256_key();
        let authenticator = OidcAuthenticator::new(static_config(jwk)).expect("build");

        let now = unix_now();
        let token = mint(
            secret,
            &json!({
                "sub": "user-123",
                "iss": "https://issuer.example",
                "aud": "voicelog",
                "exp": now - 600,
                "iat": now - 1200,
            }),
        );

        let err = authenticator
            .authenticate(AuthnInput::BearerJwt(token))
            .await
            .expect_err("expired");
        assert_eq!(err.into_inner().code, "auth.unauthenticated");
    }

    #[tokio::test]
    async fn wrong_issuer_is_unauthenticated() {
        let (secret, jwk) = hs256_key();
        let authenticator = OidcAuthenticator::new(static_config(jwk)).expect("build");

        let now = unix_now();
        let token = mint(
            secret,
            &json!({
                "sub": "user-123",
                "iss": "https://other.example",
                "aud": "voicelog",
                "exp": now + 600,
                "iat": now,
            }),
        );

        let err = authenticator
            .authenticate(AuthnInput::BearerJwt(token))
            .await
            .expect_err("wrong issuer");
        assert_eq!(err.into_inner().code, "auth.unauthenticated");
    }

    #[tokio::test]
    async fn pre_verified_subject_passes_through() {
        let (_, jwk) = hs256_key();
        let authenticator = OidcAuthenticator::new(static_config(jwk)).expect("build");

        let subject = Subject {
            kind: SubjectKind::User,
            subject_id: Id("uid".into()),
            email: None,
            display_name: None,
            claims: Map::new(),
        };
        let out = authenticator
            .authenticate(AuthnInput::PreVerified(subject.clone()))
            .await
            .unwrap();
        assert_eq!(out, subject);
    }

    #[tokio::test]
    async fn jwks_endpoint_serves_keys() {
        let server = MockServer::start().await;
        let (secret, jwk) = hs256_key();

        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [jwk] })))
            .expect(1)
            .mount(&server)
            .await;

        let config = OidcConfig::builder("https://issuer.example")
            .audience("voicelog")
            .jwks_uri(format!("{}/jwks.json", server.uri()))
            .algorithms(vec![Algorithm::HS256])
            .build();
        let authenticator = OidcAuthenticator::new(config).expect("build");

        let now = unix_now();
        let token = mint(
            secret,
            &json!({
                "sub": "user-9",
                "iss": "https://issuer.example",
                "aud": "voicelog",
                "exp": now + 600,
                "iat": now,
            }),
        );

        let subject = authenticator
            .authenticate(AuthnInput::BearerJwt(token.clone()))
            .await
            .expect("authenticate");
        assert_eq!(subject.subject_id, Id("user-9".into()));

        // Second call is served from the cache; the mock expects one fetch.
        authenticator
            .authenticate(AuthnInput::BearerJwt(token))
            .await
            .expect("cached authenticate");
    }

    #[tokio::test]
    async fn jwks_fetch_failure_is_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = OidcConfig::builder("https://issuer.example")
            .jwks_uri(format!("{}/jwks.json", server.uri()))
            .algorithms(vec![Algorithm::HS256])
            .build();
        let authenticator = OidcAuthenticator::new(config).expect("build");

        let (secret, _) = hs256_key();
        let token = mint(secret, &json!({"sub": "u", "exp": unix_now() + 600, "iat": unix_now()}));
        let err = authenticator
            .authenticate(AuthnInput::BearerJwt(token))
            .await
            .expect_err("fetch failed");
        assert_eq!(err.into_inner().code, "auth.unauthenticated");
    }
}
