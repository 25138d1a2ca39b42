//! Exercises the Redis backend against a live server. Ignored by default:
//!
//! ```
//! $ cargo test --test redis_store_tests -- --ignored
//! ```

use tessera::domain_model::now_epoch;
use tessera::domain_port::{RefreshRecord, TokenStore};
use tessera::infra_redis::RedisTokenStore;
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379/0";

async fn store() -> RedisTokenStore {
    RedisTokenStore::connect(REDIS_URL, format!("test_{}", Uuid::new_v4().simple()))
        .await
        .expect("redis server reachable")
}

fn record(csrf: &str, expiration: i64) -> RefreshRecord {
    RefreshRecord {
        csrf: csrf.to_string(),
        access_id: "access-1".to_string(),
        access_expiration: expiration,
        expiration,
    }
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn access_entries_round_trip_and_expire() {
    let store = store().await;
    let future = now_epoch() + 60;

    store.persist_access("a1", "csrf-secret", future).await.unwrap();
    assert_eq!(
        store.fetch_access("a1").await.unwrap(),
        Some("csrf-secret".to_string())
    );

    store.destroy_access("a1").await.unwrap();
    assert_eq!(store.fetch_access("a1").await.unwrap(), None);

    // an entry persisted already expired reads as absent
    store
        .persist_access("a2", "csrf-secret", now_epoch() - 1)
        .await
        .unwrap();
    assert_eq!(store.fetch_access("a2").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn refresh_records_are_namespace_scoped() {
    let store = store().await;
    let future = now_epoch() + 60;

    store
        .persist_refresh("r1", &record("ns-a-csrf", future), "ns-a")
        .await
        .unwrap();
    store
        .persist_refresh("r1", &record("ns-b-csrf", future), "ns-b")
        .await
        .unwrap();

    let (ns, rec) = store
        .fetch_refresh("r1", "ns-b", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((ns.as_str(), rec.csrf.as_str()), ("ns-b", "ns-b-csrf"));

    // first match scans namespaces and picks the lexicographically first
    let (ns, rec) = store.fetch_refresh("r1", "", true).await.unwrap().unwrap();
    assert_eq!((ns.as_str(), rec.csrf.as_str()), ("ns-a", "ns-a-csrf"));

    let all = store.all_refresh(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let scoped = store.all_refresh(Some("ns-a")).await.unwrap();
    assert_eq!(scoped.len(), 1);

    store.destroy_refresh("r1", "ns-a").await.unwrap();
    store.destroy_refresh("r1", "ns-b").await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn first_match_orders_by_namespace_even_when_key_order_differs() {
    let store = store().await;
    let future = now_epoch() + 60;

    // as raw keys, "a-b" sorts before "a" ('-' < '_'); as namespaces the
    // order is the other way around
    store
        .persist_refresh("r1", &record("plain", future), "a")
        .await
        .unwrap();
    store
        .persist_refresh("r1", &record("dashed", future), "a-b")
        .await
        .unwrap();

    let (ns, rec) = store.fetch_refresh("r1", "", true).await.unwrap().unwrap();
    assert_eq!((ns.as_str(), rec.csrf.as_str()), ("a", "plain"));

    let namespaces: Vec<String> = store
        .all_refresh(None)
        .await
        .unwrap()
        .into_iter()
        .map(|(ns, _, _)| ns)
        .collect();
    assert_eq!(namespaces, ["a", "a-b"]);

    store.destroy_refresh("r1", "a").await.unwrap();
    store.destroy_refresh("r1", "a-b").await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn glob_characters_in_a_namespace_match_literally() {
    let store = store().await;
    let future = now_epoch() + 60;

    store
        .persist_refresh("r1", &record("starred", future), "ns-*")
        .await
        .unwrap();
    store
        .persist_refresh("r1", &record("other", future), "ns-a")
        .await
        .unwrap();

    // an unescaped pattern would sweep up "ns-a" as well
    let scoped = store.all_refresh(Some("ns-*")).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].0, "ns-*");
    assert_eq!(scoped[0].2.csrf, "starred");

    store.destroy_refresh("r1", "ns-*").await.unwrap();
    store.destroy_refresh("r1", "ns-a").await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn update_refresh_on_a_missing_record_is_a_no_op() {
    let prefix = format!("test_{}", Uuid::new_v4().simple());
    let store = RedisTokenStore::connect(REDIS_URL, prefix.clone())
        .await
        .expect("redis server reachable");

    store
        .update_refresh("r-missing", "access-2", now_epoch() + 60, "csrf", "")
        .await
        .unwrap();

    assert_eq!(store.fetch_refresh("r-missing", "", false).await.unwrap(), None);

    // and no unreadable partial hash is left behind either
    let client = redis::Client::open(REDIS_URL).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let exists: bool = redis::cmd("EXISTS")
        .arg(format!("{prefix}__refresh_r-missing"))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(!exists);
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn update_refresh_leaves_the_ttl_alone() {
    let store = store().await;
    let future = now_epoch() + 60;

    store
        .persist_refresh("r1", &record("old-csrf", future), "")
        .await
        .unwrap();
    store
        .update_refresh("r1", "access-2", future + 10, "new-csrf", "")
        .await
        .unwrap();

    let (_, rec) = store.fetch_refresh("r1", "", false).await.unwrap().unwrap();
    assert_eq!(rec.access_id, "access-2");
    assert_eq!(rec.csrf, "new-csrf");
    assert_eq!(rec.expiration, future);

    store.destroy_refresh("r1", "").await.unwrap();
}
