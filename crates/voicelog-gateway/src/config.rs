use std::{env, fs, path::Path};

use anyhow::{anyhow, Context};
use config::Config;
use serde::{Deserialize, Serialize};
use voicelog_auth::prelude::{JwkConfig, OidcConfig};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub dify: UpstreamConfig,
    #[serde(default)]
    pub openai: UpstreamConfig,
    #[serde(default)]
    pub gemini: UpstreamConfig,
    #[serde(default)]
    pub time: TimeConfig,
}

impl GatewayConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_file = env::var("VOICELOG_CONFIG_FILE")
            .unwrap_or_else(|_| "config/voicelog.local.toml".to_string());

        let mut builder = Config::builder()
            .set_default("server.address", ServerConfig::default_address())?
            .set_default("server.port", ServerConfig::default_port())?;

        if Path::new(&config_file).exists() {
            builder = builder.add_source(config::File::from(Path::new(&config_file)));
        }

        builder = builder.add_source(config::Environment::with_prefix("VOICELOG").separator("__"));

        let mut config: GatewayConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config.apply_legacy_env();
        Ok(config)
    }

    /// The deployment variants configured everything through flat
    /// environment variables; honour them as fallbacks.
    fn apply_legacy_env(&mut self) {
        if self.dify.api_key.is_none() && self.dify.api_key_env.is_none() {
            self.dify.api_key_env = present("DIFY_API_KEY");
        }
        if self.dify.endpoint.is_none() {
            self.dify.endpoint = env::var("DIFY_API_ENDPOINT").ok().filter(|v| !v.is_empty());
        }
        if self.openai.api_key.is_none() && self.openai.api_key_env.is_none() {
            self.openai.api_key_env = present("OPENAI_API_KEY");
        }
        if self.gemini.api_key.is_none() && self.gemini.api_key_env.is_none() {
            self.gemini.api_key_env = present("GEMINI_API_KEY");
        }
        if let Ok(origins) = env::var("ALLOWED_ORIGINS") {
            for origin in origins.split(',') {
                let origin = origin.trim();
                if !origin.is_empty() && !self.cors.allowed_origins.iter().any(|o| o == origin) {
                    self.cors.allowed_origins.push(origin.to_string());
                }
            }
        }
        if let Ok(frontend) = env::var("FRONTEND_URL") {
            let frontend = frontend.trim().to_string();
            if !frontend.is_empty() && !self.cors.allowed_origins.contains(&frontend) {
                self.cors.allowed_origins.push(frontend);
            }
        }
    }
}

fn present(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .map(|_| key.to_string())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_address")]
    pub address: String,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_address() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        8080
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            port: Self::default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "CorsConfig::default_production_origin")]
    pub production_origin: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    fn default_production_origin() -> String {
        "https://voicelog.jp".to_string()
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            production_origin: Self::default_production_origin(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub audience: Vec<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub static_keys: Vec<JwkConfig>,
    #[serde(default)]
    pub algorithms: Vec<String>,
}

impl AuthConfig {
    pub fn to_oidc(&self) -> anyhow::Result<OidcConfig> {
        if self.issuer.is_empty() {
            return Err(anyhow!("auth.issuer must be configured"));
        }

        let mut builder = OidcConfig::builder(self.issuer.clone());
        for audience in &self.audience {
            builder = builder.audience(audience.clone());
        }
        if !self.static_keys.is_empty() {
            builder = builder.static_keys(self.static_keys.clone());
        } else if let Some(uri) = &self.jwks_uri {
            builder = builder.jwks_uri(uri.clone());
        } else {
            return Err(anyhow!("auth requires static_keys or jwks_uri"));
        }
        if !self.algorithms.is_empty() {
            let algorithms = self
                .algorithms
                .iter()
                .map(|alg| {
                    alg.parse::<jsonwebtoken::Algorithm>()
                        .map_err(|_| anyhow!("unsupported jwt algorithm: {alg}"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            builder = builder.algorithms(algorithms);
        }
        Ok(builder.build())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl UpstreamConfig {
    pub fn resolve_api_key(&self, field: &str) -> anyhow::Result<String> {
        resolve_secret_source(&self.api_key, &self.api_key_env, &self.api_key_file, field)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() || self.api_key_env.is_some() || self.api_key_file.is_some()
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeConfig {
    /// Hours east of UTC defining the calendar midnight boundary.
    #[serde(default = "TimeConfig::default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl TimeConfig {
    fn default_utc_offset_hours() -> i32 {
        9
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: Self::default_utc_offset_hours(),
        }
    }
}

pub fn resolve_secret_source(
    literal: &Option<String>,
    env_key: &Option<String>,
    file_path: &Option<String>,
    field: &str,
) -> anyhow::Result<String> {
    if let Some(env_var) = env_key.as_ref() {
        let value = env::var(env_var)
            .with_context(|| format!("environment variable {env_var} for {field} not set"))?;
        return Ok(value);
    }
    if let Some(path) = file_path.as_ref() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read secret file {path} for {field}"))?;
        return Ok(contents.trim().to_string());
    }
    if let Some(value) = literal.as_ref() {
        if value.is_empty() {
            return Err(anyhow!("{field} literal secret cannot be empty"));
        }
        return Ok(value.clone());
    }
    Err(anyhow!("{field} secret must be provided via literal/env/file"))
}
