use std::sync::Arc;

use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

use crate::codec::{JwtCodec, KeyMaterial, SigningAlgorithm, VerifyOptions};
use crate::domain_model::SessionError;
use crate::domain_port::TokenStore;
use crate::infra_memory::MemoryTokenStore;
use crate::infra_redis::RedisTokenStore;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub session: SessionSettings,
    pub store: StoreSettings,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_algorithm")]
    pub algorithm: SigningAlgorithm,
    /// Shared secret for the HMAC family.
    pub secret: Option<String>,
    /// PEM pair for the RSA family.
    pub private_key_pem: Option<String>,
    pub public_key_pem: Option<String>,
    #[serde(default = "default_access_exp_secs")]
    pub access_exp_secs: i64,
    #[serde(default = "default_refresh_exp_secs")]
    pub refresh_exp_secs: i64,
    #[serde(default = "default_access_header")]
    pub access_header: String,
    #[serde(default = "default_refresh_header")]
    pub refresh_header: String,
    #[serde(default = "default_csrf_header")]
    pub csrf_header: String,
    #[serde(default = "default_access_cookie")]
    pub access_cookie: String,
    #[serde(default = "default_refresh_cookie")]
    pub refresh_cookie: String,
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,
    #[serde(default)]
    pub verify: VerifyOptions,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreSettings {
    Memory,
    Redis { url: String },
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

/// Immutable runtime configuration handed to `Session` and `Authorizer`
/// constructors. Constructed once; no hidden global state.
#[derive(Debug, Clone)]
pub struct SessionsConfig {
    pub access_exp_secs: i64,
    pub refresh_exp_secs: i64,
    pub access_header: String,
    pub refresh_header: String,
    pub csrf_header: String,
    pub access_cookie: String,
    pub refresh_cookie: String,
    pub token_prefix: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            access_exp_secs: default_access_exp_secs(),
            refresh_exp_secs: default_refresh_exp_secs(),
            access_header: default_access_header(),
            refresh_header: default_refresh_header(),
            csrf_header: default_csrf_header(),
            access_cookie: default_access_cookie(),
            refresh_cookie: default_refresh_cookie(),
            token_prefix: default_token_prefix(),
        }
    }
}

impl SessionSettings {
    pub fn sessions_config(&self) -> SessionsConfig {
        SessionsConfig {
            access_exp_secs: self.access_exp_secs,
            refresh_exp_secs: self.refresh_exp_secs,
            access_header: self.access_header.clone(),
            refresh_header: self.refresh_header.clone(),
            csrf_header: self.csrf_header.clone(),
            access_cookie: self.access_cookie.clone(),
            refresh_cookie: self.refresh_cookie.clone(),
            token_prefix: self.token_prefix.clone(),
        }
    }

    pub fn build_codec(&self) -> Result<JwtCodec, SessionError> {
        let key = match self.algorithm {
            SigningAlgorithm::None => KeyMaterial::None,
            SigningAlgorithm::HS256 | SigningAlgorithm::HS384 | SigningAlgorithm::HS512 => {
                let secret = self.secret.as_ref().ok_or_else(|| {
                    SessionError::Malconfigured("secret is not specified".to_string())
                })?;
                KeyMaterial::Secret(secret.clone().into_bytes())
            }
            SigningAlgorithm::RS256 | SigningAlgorithm::RS512 => {
                let (Some(private_pem), Some(public_pem)) =
                    (&self.private_key_pem, &self.public_key_pem)
                else {
                    return Err(SessionError::Malconfigured(
                        "private/public key pair is not specified".to_string(),
                    ));
                };
                KeyMaterial::RsaPem {
                    private_pem: private_pem.clone().into_bytes(),
                    public_pem: public_pem.clone().into_bytes(),
                }
            }
        };
        JwtCodec::new(self.algorithm, key, self.verify.clone())
    }
}

/// Backend selection is a typed enum resolved once at startup, not a runtime
/// name string looked up per call.
pub async fn build_token_store(
    store: &StoreSettings,
    token_prefix: &str,
) -> Result<Arc<dyn TokenStore>, SessionError> {
    match store {
        StoreSettings::Memory => Ok(Arc::new(MemoryTokenStore::new())),
        StoreSettings::Redis { url } => {
            Ok(Arc::new(RedisTokenStore::connect(url, token_prefix).await?))
        }
    }
}

fn default_algorithm() -> SigningAlgorithm {
    SigningAlgorithm::HS256
}

fn default_access_exp_secs() -> i64 {
    3600
}

fn default_refresh_exp_secs() -> i64 {
    604_800
}

fn default_access_header() -> String {
    "Authorization".to_string()
}

fn default_refresh_header() -> String {
    "X-Refresh-Token".to_string()
}

fn default_csrf_header() -> String {
    "X-CSRF-Token".to_string()
}

fn default_access_cookie() -> String {
    "jwt_access".to_string()
}

fn default_refresh_cookie() -> String {
    "jwt_refresh".to_string()
}

fn default_token_prefix() -> String {
    "jwt_".to_string()
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
