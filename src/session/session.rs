use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::codec::{JwtCodec, VerifyOptions};
use crate::domain_model::{
    AccessToken, CLAIM_ID, CLAIM_RUID, Claims, CsrfToken, RefreshToken, SessionError, TokenType,
    now_epoch, required_claim,
};
use crate::domain_port::TokenStore;
use crate::settings::SessionsConfig;

/// Hook invoked when a rotation looks suspicious: an early refresh while the
/// previous access token is still valid, or a refresh-by-access carrying a
/// superseded access id. Receives the refresh id and the linked access
/// expiration; returning an error aborts the rotation.
pub type RotationGuard<'a> = &'a (dyn Fn(&str, i64) -> Result<(), SessionError> + Send + Sync);

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub payload: Claims,
    pub refresh_payload: Claims,
    /// Per-session claim checks overriding the codec-level ones.
    pub access_claims: Option<VerifyOptions>,
    pub refresh_claims: Option<VerifyOptions>,
    pub namespace: Option<String>,
    /// Embeds the refresh id into access tokens so they can self-describe
    /// their refresh counterpart (sliding renewal).
    pub refresh_by_access_allowed: bool,
    /// Lifetime overrides in seconds; configured defaults apply when unset.
    pub access_exp_secs: Option<i64>,
    pub refresh_exp_secs: Option<i64>,
}

/// Login response. Expirations are also embedded in the tokens themselves.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub csrf: String,
    pub access: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Refresh response. The refresh token string itself never changes on
/// rotation, so it is not returned.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshedTokens {
    pub csrf: String,
    pub access: String,
    pub access_expires_at: DateTime<Utc>,
}

/// Orchestrates the token pair lifecycle: login, rotation, revocation.
/// Transient; exists for the duration of one logical operation.
///
/// Rotation is not transactionally atomic across the destroy-old/create-new
/// steps. A crash or a concurrent duplicate refresh between reading the old
/// record and writing the new one can briefly leave two live access tokens
/// for one refresh token. This is an accepted bounded race window; callers
/// needing stricter guarantees can serialize refreshes per refresh id.
pub struct Session {
    store: Arc<dyn TokenStore>,
    codec: Arc<JwtCodec>,
    config: Arc<SessionsConfig>,
    options: SessionOptions,
}

impl Session {
    pub fn new(
        store: Arc<dyn TokenStore>,
        codec: Arc<JwtCodec>,
        config: Arc<SessionsConfig>,
        options: SessionOptions,
    ) -> Self {
        Self {
            store,
            codec,
            config,
            options,
        }
    }

    /// The current access payload; updated after login/rotation when sliding
    /// renewal re-renders the access token.
    pub fn payload(&self) -> &Claims {
        &self.options.payload
    }

    /// Feeds an externally decoded access payload into the session, e.g.
    /// before `refresh_by_access_payload` or `flush_by_access_payload`.
    pub fn set_payload(&mut self, payload: Claims) {
        self.options.payload = payload;
    }

    /// Issues a fresh CSRF secret, access token and linked refresh token.
    pub async fn login(&mut self) -> Result<SessionTokens, SessionError> {
        let csrf = CsrfToken::new();
        let now = now_epoch();
        let access_exp = now + self.access_lifetime();
        let refresh_exp = now + self.refresh_lifetime();

        // the access entry lives until the refresh token expires, so the
        // CSRF secret stays readable for refresh-by-access
        let mut access = AccessToken::create(
            &self.codec,
            self.store.as_ref(),
            csrf.encoded(),
            self.options.payload.clone(),
            access_exp,
            refresh_exp,
        )
        .await?;
        let refresh = RefreshToken::create(
            &self.codec,
            self.store.as_ref(),
            csrf.encoded(),
            access.id(),
            access_exp,
            self.options.refresh_payload.clone(),
            self.namespace(),
            refresh_exp,
        )
        .await?;
        if self.options.refresh_by_access_allowed {
            access.link_refresh(&self.codec, refresh.id())?;
            self.options.payload = access.payload().clone();
        }

        debug!(access_id = access.id(), refresh_id = refresh.id(), "session login");
        Ok(SessionTokens {
            csrf: csrf.token().to_string(),
            access: access.token().to_string(),
            access_expires_at: epoch_to_datetime(access_exp),
            refresh: refresh.token().to_string(),
            refresh_expires_at: epoch_to_datetime(refresh_exp),
        })
    }

    /// Rotates the access token for the given refresh token. The optional
    /// guard fires when the previous access token has not expired yet.
    pub async fn refresh(
        &mut self,
        refresh_token: &str,
        on_early_refresh: Option<RotationGuard<'_>>,
    ) -> Result<RefreshedTokens, SessionError> {
        let id = self.token_id(refresh_token, TokenType::Refresh)?;
        let refresh =
            RefreshToken::find(&id, self.store.as_ref(), self.namespace(), false).await?;
        self.rotate(refresh, on_early_refresh).await
    }

    /// Sliding renewal: reads the refresh id out of the current (possibly
    /// expired but structurally valid) access payload. The guard additionally
    /// fires when the payload carries an access id superseded by a newer
    /// rotation, which signals replay of an old token.
    pub async fn refresh_by_access_payload(
        &mut self,
        guard: Option<RotationGuard<'_>>,
    ) -> Result<RefreshedTokens, SessionError> {
        let payload = &self.options.payload;
        let ruid =
            required_claim(payload, TokenType::Access, CLAIM_RUID, "refresh id")?.to_string();
        let refresh =
            RefreshToken::find(&ruid, self.store.as_ref(), self.namespace(), false).await?;

        if let Some(guard) = guard {
            let access_id = required_claim(payload, TokenType::Access, CLAIM_ID, "token id")?;
            if refresh.is_linked() && refresh.access_id() != access_id {
                guard(refresh.id(), refresh.access_expiration())?;
            }
        }
        self.rotate(refresh, guard).await
    }

    /// Authorizes a refresh-by-access request without trusting the access
    /// token's signature validity alone: the payload's refresh id must point
    /// at a refresh token whose access link matches, and the external CSRF
    /// must unmask-validate against that refresh token's secret.
    pub async fn valid_access_request(
        &self,
        external_csrf: &str,
        external_payload: &Claims,
    ) -> Result<bool, SessionError> {
        let ruid = required_claim(external_payload, TokenType::Access, CLAIM_RUID, "refresh id")?;
        let id = required_claim(external_payload, TokenType::Access, CLAIM_ID, "token id")?;

        let refresh = RefreshToken::find(ruid, self.store.as_ref(), "", true).await?;
        if refresh.access_id() != id {
            return Ok(false);
        }
        Ok(CsrfToken::from_encoded(refresh.csrf())?.valid_authenticity_token(external_csrf))
    }

    pub async fn valid_csrf(
        &self,
        token: &str,
        csrf_token: &str,
        token_type: TokenType,
    ) -> Result<bool, SessionError> {
        let csrf = match token_type {
            TokenType::Access => self.access_csrf(token).await?,
            TokenType::Refresh => self.refresh_csrf(token).await?,
        };
        Ok(csrf.valid_authenticity_token(csrf_token))
    }

    /// Re-masks the stored CSRF secret of a live access token.
    pub async fn masked_csrf(&self, access_token: &str) -> Result<String, SessionError> {
        Ok(self.access_csrf(access_token).await?.token().to_string())
    }

    /// Storage presence is the source of truth for revocation; a token that
    /// still carries a valid signature but has no store entry is gone.
    pub async fn session_exists(
        &self,
        token: &str,
        token_type: TokenType,
    ) -> Result<bool, SessionError> {
        let outcome = match token_type {
            TokenType::Access => match self.token_id(token, TokenType::Access) {
                Ok(id) => AccessToken::find(&id, self.store.as_ref()).await.map(|_| ()),
                Err(e) => Err(e),
            },
            TokenType::Refresh => match self.token_id(token, TokenType::Refresh) {
                Ok(id) => RefreshToken::find(&id, self.store.as_ref(), self.namespace(), true)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            },
        };
        match outcome {
            Ok(()) => Ok(true),
            Err(e) if e.is_unauthorized() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Destroys the refresh token denoted by the given token string together
    /// with its linked access token.
    pub async fn flush_by_token(&self, token: &str) -> Result<(), SessionError> {
        let id = self.token_id(token, TokenType::Refresh)?;
        self.flush_by_id(&id).await
    }

    /// Idempotent: flushing an id that is already gone is a no-op.
    pub async fn flush_by_id(&self, id: &str) -> Result<(), SessionError> {
        let refresh =
            match RefreshToken::find(id, self.store.as_ref(), self.namespace(), false).await {
                Ok(refresh) => refresh,
                Err(e) if e.is_unauthorized() => return Ok(()),
                Err(e) => return Err(e),
            };
        if refresh.is_linked() {
            AccessToken::destroy(refresh.access_id(), self.store.as_ref()).await?;
        }
        refresh.destroy(self.store.as_ref()).await?;
        debug!(refresh_id = id, "session flushed");
        Ok(())
    }

    pub async fn flush_by_access_payload(&self) -> Result<(), SessionError> {
        let ruid = required_claim(
            &self.options.payload,
            TokenType::Access,
            CLAIM_RUID,
            "refresh id",
        )?
        .to_string();
        self.flush_by_id(&ruid).await
    }

    /// Destroys every session in this session's namespace. Returns the
    /// number of refresh tokens destroyed; 0 when no namespace is set.
    pub async fn flush_namespaced(&self) -> Result<usize, SessionError> {
        let Some(namespace) = self.options.namespace.as_deref() else {
            return Ok(0);
        };
        let tokens = RefreshToken::all(self.store.as_ref(), Some(namespace)).await?;
        let count = tokens.len();
        for token in tokens {
            if token.is_linked() {
                AccessToken::destroy(token.access_id(), self.store.as_ref()).await?;
            }
            token.destroy(self.store.as_ref()).await?;
        }
        Ok(count)
    }

    /// Destroys only the access tokens in this session's namespace and
    /// unlinks them from their refresh tokens, which stay alive.
    pub async fn flush_namespaced_access_tokens(&self) -> Result<usize, SessionError> {
        let Some(namespace) = self.options.namespace.as_deref() else {
            return Ok(0);
        };
        let mut tokens = RefreshToken::all(self.store.as_ref(), Some(namespace)).await?;
        let count = tokens.len();
        for token in &mut tokens {
            if token.is_linked() {
                AccessToken::destroy(token.access_id(), self.store.as_ref()).await?;
            }
            token.unlink_access(self.store.as_ref()).await?;
        }
        Ok(count)
    }

    /// Destroys every session pair system-wide, across all namespaces.
    pub async fn flush_all(store: &dyn TokenStore) -> Result<usize, SessionError> {
        let tokens = RefreshToken::all(store, None).await?;
        let count = tokens.len();
        for token in tokens {
            if token.is_linked() {
                AccessToken::destroy(token.access_id(), store).await?;
            }
            token.destroy(store).await?;
        }
        Ok(count)
    }

    async fn rotate(
        &mut self,
        mut refresh: RefreshToken,
        guard: Option<RotationGuard<'_>>,
    ) -> Result<RefreshedTokens, SessionError> {
        if let Some(guard) = guard {
            if refresh.is_linked() && refresh.access_expiration() > now_epoch() {
                guard(refresh.id(), refresh.access_expiration())?;
            }
        }
        if refresh.is_linked() {
            AccessToken::destroy(refresh.access_id(), self.store.as_ref()).await?;
        }

        let csrf = CsrfToken::new();
        let access_exp = now_epoch() + self.access_lifetime();
        let mut access = AccessToken::create(
            &self.codec,
            self.store.as_ref(),
            csrf.encoded(),
            self.options.payload.clone(),
            access_exp,
            refresh.expiration(),
        )
        .await?;
        refresh
            .update(self.store.as_ref(), access.id(), access_exp, csrf.encoded())
            .await?;
        if self.options.refresh_by_access_allowed {
            access.link_refresh(&self.codec, refresh.id())?;
            self.options.payload = access.payload().clone();
        }

        debug!(
            access_id = access.id(),
            refresh_id = refresh.id(),
            "access token rotated"
        );
        Ok(RefreshedTokens {
            csrf: csrf.token().to_string(),
            access: access.token().to_string(),
            access_expires_at: epoch_to_datetime(access_exp),
        })
    }

    async fn access_csrf(&self, token: &str) -> Result<CsrfToken, SessionError> {
        let id = self.token_id(token, TokenType::Access)?;
        let access = AccessToken::find(&id, self.store.as_ref()).await?;
        CsrfToken::from_encoded(access.csrf())
    }

    async fn refresh_csrf(&self, token: &str) -> Result<CsrfToken, SessionError> {
        let id = self.token_id(token, TokenType::Refresh)?;
        let refresh =
            RefreshToken::find(&id, self.store.as_ref(), self.namespace(), true).await?;
        CsrfToken::from_encoded(refresh.csrf())
    }

    fn token_id(&self, token: &str, token_type: TokenType) -> Result<String, SessionError> {
        let claims = match token_type {
            TokenType::Access => self.options.access_claims.as_ref(),
            TokenType::Refresh => self.options.refresh_claims.as_ref(),
        };
        let payload = self.codec.decode(token, claims)?;
        Ok(required_claim(&payload, token_type, CLAIM_ID, "token id")?.to_string())
    }

    fn namespace(&self) -> &str {
        self.options.namespace.as_deref().unwrap_or("")
    }

    fn access_lifetime(&self) -> i64 {
        self.options
            .access_exp_secs
            .unwrap_or(self.config.access_exp_secs)
    }

    fn refresh_lifetime(&self) -> i64 {
        self.options
            .refresh_exp_secs
            .unwrap_or(self.config.refresh_exp_secs)
    }
}

fn epoch_to_datetime(epoch: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(epoch, 0).unwrap_or_default()
}
