//! Integration tests against a live Redis.
//!
//! Skipped unless `REDIS_URL` is set, e.g. `REDIS_URL=redis://127.0.0.1:6379`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ratekeeper::limiter::{Decision, LimiterOptions, ManualClock, Quota, RateLimiter};
use ratekeeper::store::{KeyValueStore, RedisStore};

fn redis_url() -> Option<String> {
    std::env::var("REDIS_URL").ok()
}

fn unique_prefix(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("ratekeeper_itest_{}_{}", name, nanos)
}

async fn connect(name: &str) -> Option<RedisStore> {
    let url = redis_url()?;
    Some(RedisStore::connect(&url, &unique_prefix(name)).await.unwrap())
}

#[tokio::test]
async fn redis_get_set_exists() {
    let Some(store) = connect("kv").await else {
        return;
    };

    assert_eq!(store.get("missing").await.unwrap(), None);
    assert!(!store.exists("missing").await.unwrap());

    store.set("k", "v").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    assert!(store.exists("k").await.unwrap());

    store.clear_all().await.unwrap();
}

#[tokio::test]
async fn redis_set_with_expiry() {
    let Some(store) = connect("ttl").await else {
        return;
    };

    store
        .set_with_expiry("k", "v", Duration::from_secs(1))
        .await
        .unwrap();
    assert!(store.exists("k").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!store.exists("k").await.unwrap());
}

#[tokio::test]
async fn redis_clear_all_only_touches_own_namespace() {
    let Some(url) = redis_url() else {
        return;
    };
    let ours = RedisStore::connect(&url, &unique_prefix("ours")).await.unwrap();
    let theirs = RedisStore::connect(&url, &unique_prefix("theirs")).await.unwrap();

    for i in 0..1_200 {
        ours.set(&format!("key{}", i), "1").await.unwrap();
    }
    theirs.set("keep", "1").await.unwrap();

    ours.clear_all().await.unwrap();

    assert!(!ours.exists("key0").await.unwrap());
    assert!(!ours.exists("key1199").await.unwrap());
    assert!(theirs.exists("keep").await.unwrap());

    theirs.clear_all().await.unwrap();
}

#[tokio::test]
async fn redis_rate_limiter_scenario() {
    let Some(store) = connect("limiter").await else {
        return;
    };
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(0));
    let limiter = RateLimiter::new(store.clone(), LimiterOptions::default())
        .with_clock(clock.clone());
    let quota = Quota::new(3, 60).unwrap();

    for t in 0..3 {
        clock.set(t);
        let decision = limiter.check_and_record("9.9.9.9", &quota).await.unwrap();
        assert!(decision.is_allowed());
    }

    clock.set(3);
    let decision = limiter.check_and_record("9.9.9.9", &quota).await.unwrap();
    assert!(matches!(&decision, Decision::Deny { payload, .. } if payload.additional_info.request_count == 4));

    clock.set(65);
    let decision = limiter.check_and_record("9.9.9.9", &quota).await.unwrap();
    assert_eq!(decision, Decision::Allow { request_count: 1 });

    limiter.clear_all().await.unwrap();
    assert_eq!(limiter.record("9.9.9.9").await.unwrap(), None);
}
