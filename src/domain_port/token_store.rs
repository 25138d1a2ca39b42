use crate::domain_model::StoreError;

/// Stored shape of a refresh token. `access_id`/`access_expiration` track the
/// most recently issued access token; both are emptied by an unlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub csrf: String,
    pub access_id: String,
    pub access_expiration: i64,
    pub expiration: i64,
}

impl RefreshRecord {
    pub fn is_linked(&self) -> bool {
        !self.access_id.is_empty()
    }
}

/// Namespace- and TTL-aware key/value persistence for the token pair.
/// Expirations are absolute epoch seconds; an entry whose expiration has
/// lapsed must read as absent even if not yet physically evicted. The handle
/// is created once at configuration time and shared across requests.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Access entries hold only the CSRF secret.
    async fn fetch_access(&self, id: &str) -> Result<Option<String>, StoreError>;

    async fn persist_access(&self, id: &str, csrf: &str, expiration: i64)
    -> Result<(), StoreError>;

    /// Returns the record together with the namespace it was found in. With
    /// `first_match` the given namespace is ignored and every namespace is
    /// searched in lexicographic order; the first hit wins.
    async fn fetch_refresh(
        &self,
        id: &str,
        namespace: &str,
        first_match: bool,
    ) -> Result<Option<(String, RefreshRecord)>, StoreError>;

    async fn persist_refresh(
        &self,
        id: &str,
        record: &RefreshRecord,
        namespace: &str,
    ) -> Result<(), StoreError>;

    /// Overwrites the CSRF secret and access link without touching the
    /// entry's TTL.
    async fn update_refresh(
        &self,
        id: &str,
        access_id: &str,
        access_expiration: i64,
        csrf: &str,
        namespace: &str,
    ) -> Result<(), StoreError>;

    /// Every live record in a namespace, or in all namespaces when `None`.
    /// Ordered by (namespace, id).
    async fn all_refresh(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<(String, String, RefreshRecord)>, StoreError>;

    async fn destroy_refresh(&self, id: &str, namespace: &str) -> Result<(), StoreError>;

    async fn destroy_access(&self, id: &str) -> Result<(), StoreError>;
}
