use serde_json::json;
use uuid::Uuid;

use super::{CLAIM_EXP, CLAIM_ID, Claims, SessionError};
use crate::codec::JwtCodec;
use crate::domain_port::{RefreshRecord, TokenStore};

/// Longer-lived credential used solely to mint new access tokens. Persisted
/// fully under a namespace-scoped key; ids are unique per namespace.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    id: String,
    csrf: String,
    access_id: String,
    access_expiration: i64,
    namespace: String,
    expiration: i64,
    token: String,
}

impl RefreshToken {
    pub async fn create(
        codec: &JwtCodec,
        store: &dyn TokenStore,
        csrf: &str,
        access_id: &str,
        access_expiration: i64,
        payload: Claims,
        namespace: &str,
        expiration: i64,
    ) -> Result<Self, SessionError> {
        let id = Uuid::new_v4().to_string();
        let record = RefreshRecord {
            csrf: csrf.to_string(),
            access_id: access_id.to_string(),
            access_expiration,
            expiration,
        };
        store.persist_refresh(&id, &record, namespace).await?;

        let mut claims = payload;
        claims.insert(CLAIM_ID.to_string(), json!(id));
        claims.insert(CLAIM_EXP.to_string(), json!(expiration));
        let token = codec.encode(&claims)?;

        Ok(Self {
            id,
            csrf: record.csrf,
            access_id: record.access_id,
            access_expiration,
            namespace: namespace.to_string(),
            expiration,
            token,
        })
    }

    /// Looks up the namespaced key directly, or with `first_match` scans all
    /// namespaces and keeps the one the record was actually found in so a
    /// later destroy hits the right key.
    pub async fn find(
        id: &str,
        store: &dyn TokenStore,
        namespace: &str,
        first_match: bool,
    ) -> Result<Self, SessionError> {
        let (found_namespace, record) = store
            .fetch_refresh(id, namespace, first_match)
            .await?
            .ok_or_else(|| SessionError::Unauthorized("refresh token not found".to_string()))?;
        Ok(Self::from_record(id, found_namespace, record))
    }

    /// Every live refresh token in a namespace (or everywhere when `None`).
    /// Instances carry no token string; enumeration serves the flush flows.
    pub async fn all(
        store: &dyn TokenStore,
        namespace: Option<&str>,
    ) -> Result<Vec<Self>, SessionError> {
        let records = store.all_refresh(namespace).await?;
        Ok(records
            .into_iter()
            .map(|(namespace, id, record)| Self::from_record(&id, namespace, record))
            .collect())
    }

    /// Rotates the CSRF secret and access link in place, in memory and in
    /// the store. The token's own id and expiration never change.
    pub async fn update(
        &mut self,
        store: &dyn TokenStore,
        access_id: &str,
        access_expiration: i64,
        csrf: &str,
    ) -> Result<(), SessionError> {
        store
            .update_refresh(&self.id, access_id, access_expiration, csrf, &self.namespace)
            .await?;
        self.access_id = access_id.to_string();
        self.access_expiration = access_expiration;
        self.csrf = csrf.to_string();
        Ok(())
    }

    /// Drops the access link while keeping the refresh token alive
    /// (revoke-access-only flows).
    pub async fn unlink_access(&mut self, store: &dyn TokenStore) -> Result<(), SessionError> {
        let csrf = self.csrf.clone();
        self.update(store, "", 0, &csrf).await
    }

    pub async fn destroy(&self, store: &dyn TokenStore) -> Result<(), SessionError> {
        store.destroy_refresh(&self.id, &self.namespace).await?;
        Ok(())
    }

    fn from_record(id: &str, namespace: String, record: RefreshRecord) -> Self {
        Self {
            id: id.to_string(),
            csrf: record.csrf,
            access_id: record.access_id,
            access_expiration: record.access_expiration,
            namespace,
            expiration: record.expiration,
            token: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn csrf(&self) -> &str {
        &self.csrf
    }

    pub fn access_id(&self) -> &str {
        &self.access_id
    }

    pub fn access_expiration(&self) -> i64 {
        self.access_expiration
    }

    pub fn is_linked(&self) -> bool {
        !self.access_id.is_empty()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn expiration(&self) -> i64 {
        self.expiration
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}
