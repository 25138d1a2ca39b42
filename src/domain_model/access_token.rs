use serde_json::json;
use uuid::Uuid;

use super::{CLAIM_EXP, CLAIM_ID, CLAIM_RUID, Claims, SessionError};
use crate::codec::JwtCodec;
use crate::domain_port::TokenStore;

/// Short-lived credential carrying the caller's claims. The store holds only
/// `{id -> csrf}`; the claims live in the signed token itself.
#[derive(Debug, Clone)]
pub struct AccessToken {
    id: String,
    csrf: String,
    payload: Claims,
    expiration: i64,
    token: String,
}

impl AccessToken {
    /// `store_expiration` is deliberately the *refresh* token's expiration:
    /// the CSRF secret must stay readable for refresh-by-access after the
    /// access token's own `exp` has passed.
    pub async fn create(
        codec: &JwtCodec,
        store: &dyn TokenStore,
        csrf: &str,
        payload: Claims,
        expiration: i64,
        store_expiration: i64,
    ) -> Result<Self, SessionError> {
        let id = Uuid::new_v4().to_string();
        store.persist_access(&id, csrf, store_expiration).await?;

        let mut claims = payload;
        claims.insert(CLAIM_ID.to_string(), json!(id));
        claims.insert(CLAIM_EXP.to_string(), json!(expiration));
        let token = codec.encode(&claims)?;

        Ok(Self {
            id,
            csrf: csrf.to_string(),
            payload: claims,
            expiration,
            token,
        })
    }

    /// Partial instance: only existence and the CSRF secret are recoverable
    /// from the store, the original claims are not.
    pub async fn find(id: &str, store: &dyn TokenStore) -> Result<Self, SessionError> {
        let csrf = store
            .fetch_access(id)
            .await?
            .ok_or_else(|| SessionError::Unauthorized("access token not found".to_string()))?;
        Ok(Self {
            id: id.to_string(),
            csrf,
            payload: Claims::new(),
            expiration: 0,
            token: String::new(),
        })
    }

    /// Idempotent: destroying an absent id is a no-op.
    pub async fn destroy(id: &str, store: &dyn TokenStore) -> Result<(), SessionError> {
        store.destroy_access(id).await?;
        Ok(())
    }

    /// Embeds the refresh token's id into the claims and re-renders the
    /// signed token, so the access token can self-describe its refresh
    /// counterpart for sliding renewal.
    pub fn link_refresh(&mut self, codec: &JwtCodec, refresh_id: &str) -> Result<(), SessionError> {
        self.payload
            .insert(CLAIM_RUID.to_string(), json!(refresh_id));
        self.token = codec.encode(&self.payload)?;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn csrf(&self) -> &str {
        &self.csrf
    }

    pub fn payload(&self) -> &Claims {
        &self.payload
    }

    pub fn expiration(&self) -> i64 {
        self.expiration
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}
