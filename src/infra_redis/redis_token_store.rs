use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::warn;

use crate::domain_model::{StoreError, now_epoch};
use crate::domain_port::{RefreshRecord, TokenStore};

const REFRESH_FIELDS: [&str; 4] = ["csrf", "access_id", "access_expiration", "expiration"];
const REFRESH_INFIX: &str = "_refresh_";
const SCAN_BATCH: usize = 100;

// HSET alone would resurrect an absent or lapsed key as a TTL-less partial
// hash; the existence check has to be atomic with the write.
const UPDATE_REFRESH_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  redis.call('HSET', KEYS[1], 'csrf', ARGV[1], 'access_id', ARGV[2], 'access_expiration', ARGV[3])
end";

/// Redis-backed store. Access tokens are plain string keys
/// (`<prefix>_access_<id>` -> csrf), refresh tokens are hashes
/// (`<prefix>_<namespace>_refresh_<id>`), both with an absolute `EXPIREAT`.
pub struct RedisTokenStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisTokenStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::from)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, prefix))
    }

    fn access_key(&self, id: &str) -> String {
        format!("{}_access_{}", self.prefix, id)
    }

    fn refresh_key(&self, namespace: &str, id: &str) -> String {
        format!("{}_{}{}{}", self.prefix, namespace, REFRESH_INFIX, id)
    }

    /// Splits `<prefix>_<namespace>_refresh_<id>` back into namespace and id.
    /// Namespaces may themselves contain underscores, so the split happens at
    /// the last `_refresh_` occurrence.
    fn parse_refresh_key(&self, key: &str) -> Option<(String, String)> {
        let rest = key.strip_prefix(&format!("{}_", self.prefix))?;
        let at = rest.rfind(REFRESH_INFIX)?;
        Some((
            rest[..at].to_string(),
            rest[at + REFRESH_INFIX.len()..].to_string(),
        ))
    }

    /// Cursor-based SCAN with a bounded batch size so enumeration never
    /// stalls the shared store.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn read_record(&self, key: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(&REFRESH_FIELDS)
            .query_async(&mut conn)
            .await?;

        let [Some(csrf), Some(access_id), Some(access_expiration), Some(expiration)] =
            values.as_slice()
        else {
            return Ok(None);
        };
        let (Ok(access_expiration), Ok(expiration)) =
            (access_expiration.parse::<i64>(), expiration.parse::<i64>())
        else {
            warn!(key, "refresh record holds non-numeric expirations, treating as absent");
            return Ok(None);
        };
        // lazy expiry check on read; EXPIREAT eviction may lag behind
        if expiration <= now_epoch() {
            return Ok(None);
        }
        Ok(Some(RefreshRecord {
            csrf: csrf.clone(),
            access_id: access_id.clone(),
            access_expiration,
            expiration,
        }))
    }
}

/// Escapes glob metacharacters so caller-supplied namespaces and ids match
/// literally inside a `SCAN MATCH` pattern.
fn glob_escape(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait::async_trait]
impl TokenStore for RedisTokenStore {
    async fn fetch_access(&self, id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let csrf: Option<String> = conn.get(self.access_key(id)).await?;
        Ok(csrf)
    }

    async fn persist_access(
        &self,
        id: &str,
        csrf: &str,
        expiration: i64,
    ) -> Result<(), StoreError> {
        let key = self.access_key(id);
        let mut conn = self.conn.clone();
        let _: () = conn.set(&key, csrf).await?;
        let _: () = conn.expire_at(&key, expiration).await?;
        Ok(())
    }

    async fn fetch_refresh(
        &self,
        id: &str,
        namespace: &str,
        first_match: bool,
    ) -> Result<Option<(String, RefreshRecord)>, StoreError> {
        if first_match {
            // raw key order and namespace order disagree for prefix-related
            // namespaces ("a-b" sorts before "a" as a key), so sort on the
            // parsed namespace instead
            let keys = self.scan_keys(&self.refresh_key("*", &glob_escape(id))).await?;
            let mut candidates: Vec<(String, String)> = keys
                .into_iter()
                .filter_map(|key| {
                    self.parse_refresh_key(&key)
                        .map(|(namespace, _)| (namespace, key))
                })
                .collect();
            candidates.sort();
            for (found_namespace, key) in candidates {
                if let Some(record) = self.read_record(&key).await? {
                    return Ok(Some((found_namespace, record)));
                }
            }
            Ok(None)
        } else {
            let key = self.refresh_key(namespace, id);
            Ok(self
                .read_record(&key)
                .await?
                .map(|record| (namespace.to_string(), record)))
        }
    }

    async fn persist_refresh(
        &self,
        id: &str,
        record: &RefreshRecord,
        namespace: &str,
    ) -> Result<(), StoreError> {
        let key = self.refresh_key(namespace, id);
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("csrf", record.csrf.clone()),
                    ("access_id", record.access_id.clone()),
                    ("access_expiration", record.access_expiration.to_string()),
                    ("expiration", record.expiration.to_string()),
                ],
            )
            .await?;
        let _: () = conn.expire_at(&key, record.expiration).await?;
        Ok(())
    }

    /// No-op when the record is absent or already expired, matching the
    /// in-memory backend. TTL deliberately untouched.
    async fn update_refresh(
        &self,
        id: &str,
        access_id: &str,
        access_expiration: i64,
        csrf: &str,
        namespace: &str,
    ) -> Result<(), StoreError> {
        let key = self.refresh_key(namespace, id);
        let mut conn = self.conn.clone();
        let _: () = redis::Script::new(UPDATE_REFRESH_SCRIPT)
            .key(&key)
            .arg(csrf)
            .arg(access_id)
            .arg(access_expiration)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn all_refresh(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<(String, String, RefreshRecord)>, StoreError> {
        let pattern = match namespace {
            Some(namespace) => self.refresh_key(&glob_escape(namespace), "*"),
            None => self.refresh_key("*", "*"),
        };
        let keys = self.scan_keys(&pattern).await?;
        // ordered by (namespace, id), not by raw key
        let mut entries: Vec<(String, String, String)> = keys
            .into_iter()
            .filter_map(|key| {
                self.parse_refresh_key(&key)
                    .map(|(namespace, id)| (namespace, id, key))
            })
            .collect();
        entries.sort();

        let mut out = Vec::new();
        for (found_namespace, id, key) in entries {
            if let Some(record) = self.read_record(&key).await? {
                out.push((found_namespace, id, record));
            }
        }
        Ok(out)
    }

    async fn destroy_refresh(&self, id: &str, namespace: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.refresh_key(namespace, id)).await?;
        Ok(())
    }

    async fn destroy_access(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.access_key(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::glob_escape;

    #[test]
    fn glob_escape_neutralizes_pattern_metacharacters() {
        assert_eq!(glob_escape("plain-ns"), "plain-ns");
        assert_eq!(glob_escape("ns-*"), "ns-\\*");
        assert_eq!(glob_escape("a?[b]\\c"), "a\\?\\[b\\]\\\\c");
    }
}
