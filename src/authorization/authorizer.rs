use std::sync::Arc;

use tracing::debug;

use crate::codec::JwtCodec;
use crate::domain_model::{Claims, SessionError, TokenType};
use crate::domain_port::TokenStore;
use crate::session::{Session, SessionOptions};
use crate::settings::SessionsConfig;

/// Safe methods never require a CSRF check.
const CSRF_SAFE_METHODS: [&str; 2] = ["GET", "HEAD"];

/// Minimal view of an incoming request. Integrating frameworks implement
/// this; the core never reaches into framework internals.
pub trait RequestAccessor {
    fn header(&self, name: &str) -> Option<String>;
    fn cookie(&self, name: &str) -> Option<String>;
    fn method(&self) -> &str;
}

/// A successfully authenticated request.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub token: String,
    pub claims: Claims,
}

/// Request-facing consumer: resolves a raw token from headers or cookies,
/// checks it still denotes a live credential and enforces CSRF on
/// state-changing requests.
///
/// Resolution tries the bearer header first and falls back to the cookie.
/// Only cookie-based resolution requires CSRF: a bearer header is not
/// something a browser replays automatically.
pub struct Authorizer {
    store: Arc<dyn TokenStore>,
    codec: Arc<JwtCodec>,
    config: Arc<SessionsConfig>,
}

impl Authorizer {
    pub fn new(
        store: Arc<dyn TokenStore>,
        codec: Arc<JwtCodec>,
        config: Arc<SessionsConfig>,
    ) -> Self {
        Self {
            store,
            codec,
            config,
        }
    }

    pub async fn authenticate_access_request(
        &self,
        request: &dyn RequestAccessor,
    ) -> Result<Authenticated, SessionError> {
        self.authenticate(request, TokenType::Access).await
    }

    pub async fn authenticate_refresh_request(
        &self,
        request: &dyn RequestAccessor,
    ) -> Result<Authenticated, SessionError> {
        self.authenticate(request, TokenType::Refresh).await
    }

    async fn authenticate(
        &self,
        request: &dyn RequestAccessor,
        token_type: TokenType,
    ) -> Result<Authenticated, SessionError> {
        let (token, csrf_required) = match self.cookieless(request, token_type) {
            Some(token) => (token, false),
            None => match self.cookie_based(request, token_type) {
                Some(token) => (token, true),
                None => {
                    return Err(SessionError::Unauthorized(format!(
                        "{token_type} token not found among headers or cookies"
                    )));
                }
            },
        };

        let claims = self.codec.decode(&token, None)?;

        let session = Session::new(
            self.store.clone(),
            self.codec.clone(),
            self.config.clone(),
            SessionOptions::default(),
        );
        if !session.session_exists(&token, token_type).await? {
            return Err(SessionError::Unauthorized(format!(
                "{token_type} token is revoked or expired"
            )));
        }

        if csrf_required && !CSRF_SAFE_METHODS.contains(&request.method()) {
            let csrf = request.header(&self.config.csrf_header).ok_or_else(|| {
                SessionError::Unauthorized("CSRF token not found".to_string())
            })?;
            if !session.valid_csrf(&token, &csrf, token_type).await? {
                debug!(%token_type, "csrf mismatch on cookie-based request");
                return Err(SessionError::Unauthorized("CSRF check failed".to_string()));
            }
        }

        Ok(Authenticated { token, claims })
    }

    /// Bearer-style header. The token is the last whitespace-separated part,
    /// so both `Bearer <token>` and a bare token are accepted.
    fn cookieless(&self, request: &dyn RequestAccessor, token_type: TokenType) -> Option<String> {
        let header = match token_type {
            TokenType::Access => &self.config.access_header,
            TokenType::Refresh => &self.config.refresh_header,
        };
        let value = request.header(header)?;
        value.split_whitespace().last().map(str::to_string)
    }

    fn cookie_based(&self, request: &dyn RequestAccessor, token_type: TokenType) -> Option<String> {
        let cookie = match token_type {
            TokenType::Access => &self.config.access_cookie,
            TokenType::Refresh => &self.config.refresh_cookie,
        };
        request.cookie(cookie)
    }
}
