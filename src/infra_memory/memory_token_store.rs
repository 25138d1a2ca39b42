use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::domain_model::{StoreError, now_epoch};
use crate::domain_port::{RefreshRecord, TokenStore};

struct AccessEntry {
    csrf: String,
    expiration: i64,
}

#[derive(Default)]
struct Shelves {
    access: HashMap<String, AccessEntry>,
    // namespace -> id -> record; BTreeMap gives lexicographic namespace
    // order, which is the first-match tie-break
    refresh: BTreeMap<String, HashMap<String, RefreshRecord>>,
}

impl Shelves {
    /// Lazy sweep: entries past their expiration are purged before every
    /// read so the store never returns stale data.
    fn purge_expired(&mut self, now: i64) {
        self.access.retain(|_, entry| entry.expiration > now);
        for records in self.refresh.values_mut() {
            records.retain(|_, record| record.expiration > now);
        }
    }
}

/// Process-local backend for tests, single-process and small deployments.
/// One mutex guards the whole structure; simplicity over throughput.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Shelves>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn fetch_access(&self, id: &str) -> Result<Option<String>, StoreError> {
        let mut shelves = self.inner.lock().expect("token store mutex poisoned");
        shelves.purge_expired(now_epoch());
        Ok(shelves.access.get(id).map(|entry| entry.csrf.clone()))
    }

    async fn persist_access(
        &self,
        id: &str,
        csrf: &str,
        expiration: i64,
    ) -> Result<(), StoreError> {
        let mut shelves = self.inner.lock().expect("token store mutex poisoned");
        shelves.access.insert(
            id.to_string(),
            AccessEntry {
                csrf: csrf.to_string(),
                expiration,
            },
        );
        Ok(())
    }

    async fn fetch_refresh(
        &self,
        id: &str,
        namespace: &str,
        first_match: bool,
    ) -> Result<Option<(String, RefreshRecord)>, StoreError> {
        let mut shelves = self.inner.lock().expect("token store mutex poisoned");
        shelves.purge_expired(now_epoch());

        if first_match {
            for (found_namespace, records) in &shelves.refresh {
                if let Some(record) = records.get(id) {
                    return Ok(Some((found_namespace.clone(), record.clone())));
                }
            }
            Ok(None)
        } else {
            Ok(shelves
                .refresh
                .get(namespace)
                .and_then(|records| records.get(id))
                .map(|record| (namespace.to_string(), record.clone())))
        }
    }

    async fn persist_refresh(
        &self,
        id: &str,
        record: &RefreshRecord,
        namespace: &str,
    ) -> Result<(), StoreError> {
        let mut shelves = self.inner.lock().expect("token store mutex poisoned");
        shelves
            .refresh
            .entry(namespace.to_string())
            .or_default()
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn update_refresh(
        &self,
        id: &str,
        access_id: &str,
        access_expiration: i64,
        csrf: &str,
        namespace: &str,
    ) -> Result<(), StoreError> {
        let mut shelves = self.inner.lock().expect("token store mutex poisoned");
        shelves.purge_expired(now_epoch());
        if let Some(record) = shelves
            .refresh
            .get_mut(namespace)
            .and_then(|records| records.get_mut(id))
        {
            record.access_id = access_id.to_string();
            record.access_expiration = access_expiration;
            record.csrf = csrf.to_string();
        }
        Ok(())
    }

    async fn all_refresh(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<(String, String, RefreshRecord)>, StoreError> {
        let mut shelves = self.inner.lock().expect("token store mutex poisoned");
        shelves.purge_expired(now_epoch());

        let mut out = Vec::new();
        for (found_namespace, records) in &shelves.refresh {
            if namespace.is_some_and(|wanted| wanted != found_namespace) {
                continue;
            }
            let mut ids: Vec<_> = records.keys().cloned().collect();
            ids.sort();
            for id in ids {
                out.push((found_namespace.clone(), id.clone(), records[&id].clone()));
            }
        }
        Ok(out)
    }

    async fn destroy_refresh(&self, id: &str, namespace: &str) -> Result<(), StoreError> {
        let mut shelves = self.inner.lock().expect("token store mutex poisoned");
        if let Some(records) = shelves.refresh.get_mut(namespace) {
            records.remove(id);
        }
        Ok(())
    }

    async fn destroy_access(&self, id: &str) -> Result<(), StoreError> {
        let mut shelves = self.inner.lock().expect("token store mutex poisoned");
        shelves.access.remove(id);
        Ok(())
    }
}
