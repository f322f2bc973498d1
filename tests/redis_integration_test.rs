//! Integration tests against a live redis server
//!
//! Skipped unless `REDIS_URL` is set, e.g.
//! `REDIS_URL=redis://localhost:6379/15 cargo test --test redis_integration_test`.

use feedhaus::prelude::*;
use std::time::{SystemTime, UNIX_EPOCH};

fn redis_manager() -> Option<CacheManager> {
    let url = std::env::var("REDIS_URL").ok()?;
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let config = CacheConfig::new(url, 60, format!("feedhaus_test_{nonce}"));
    Some(CacheManager::new(config).expect("valid redis url"))
}

#[tokio::test]
async fn set_get_and_scoped_delete_against_redis() {
    let Some(cache) = redis_manager() else {
        eprintln!("REDIS_URL not set, skipping");
        return;
    };
    cache.ping().await.expect("redis reachable");

    assert!(cache.set("weather:berlin", &vec![21.5, 19.0], None, None).await);
    assert!(cache.set("weather:paris", &vec![23.0], None, None).await);
    assert!(cache.set("weather:berlin", &vec![1.0], None, Some("other_ns")).await);

    let berlin: Option<Vec<f64>> = cache.get("weather:berlin", None).await;
    assert_eq!(berlin, Some(vec![21.5, 19.0]));

    assert_eq!(cache.delete_pattern("weather:*", None).await, 2);
    assert!(!cache.exists("weather:paris", None).await);
    assert!(cache.exists("weather:berlin", Some("other_ns")).await);

    assert!(cache.delete("weather:berlin", Some("other_ns")).await);
}

#[tokio::test]
async fn get_or_compute_against_redis() {
    let Some(cache) = redis_manager() else {
        eprintln!("REDIS_URL not set, skipping");
        return;
    };

    let first: Option<String> = cache
        .get_or_compute("greeting", None, Some(30), || async { Ok::<_, String>(Some("hello".to_string())) })
        .await
        .unwrap();
    let second: Option<String> = cache
        .get_or_compute("greeting", None, Some(30), || async {
            Err::<Option<String>, _>("should not run".to_string())
        })
        .await
        .unwrap();

    assert_eq!(first, second);
    cache.delete_pattern("*", None).await;
}
