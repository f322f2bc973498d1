//! # Dashboard Demo
//!
//! This demo walks through one dashboard refresh:
//! - Loading configuration from `feedhaus.toml`, `.env` and the environment
//! - Falling back to an in-memory cache when redis is not running
//! - Serving repeated feed lookups from cache
//! - Throttling a simulated upstream that reports its rate budget
//! - Encrypting an access token before it is stored

use feedhaus::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Repository {
    name: String,
    stars: u32,
}

/// Pretend GitHub: every call costs one request from a 5000 budget
struct FakeGitHub {
    remaining: AtomicU64,
    reset_at: DateTime<Utc>,
}

impl FakeGitHub {
    async fn list_repos(&self, user: &str) -> Result<Observed<Option<Vec<Repository>>>, UpstreamError> {
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        let remaining = self.remaining.fetch_sub(1, Ordering::SeqCst) - 1;

        let repos = vec![
            Repository { name: format!("{user}/dotfiles"), stars: 4 },
            Repository { name: format!("{user}/dashboard"), stars: 27 },
        ];
        let headers = [
            ("x-ratelimit-remaining".to_string(), remaining.to_string()),
            ("x-ratelimit-reset".to_string(), self.reset_at.timestamp().to_string()),
        ];
        Ok(Observed::new(Some(repos)).with_headers(headers))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("🚀 Feedhaus Dashboard Demo");
    println!("==========================");

    // 1. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        println!("⚠️  Could not load configuration ({e}), using defaults");
        AppConfig::default()
    });

    // 2. Cache setup
    println!("\n🗄️  Setting up cache");
    println!("--------------------");

    let mut feedhaus = Feedhaus::new(config.clone())?;
    match feedhaus.health_check().await {
        Ok(()) => println!("✅ Redis connection healthy at {}", config.cache.redis_url),
        Err(e) => {
            println!("❌ Redis unavailable: {e}");
            println!("💡 Falling back to an in-memory store");
            feedhaus = Feedhaus::from_parts(
                CacheManager::in_memory(config.cache.clone()),
                SecretCodec::from_config(&config.secrets)?,
                config.rate.clone(),
            );
        }
    }

    // 3. Cached, governed lookups
    println!("\n📦 Fetching repositories");
    println!("------------------------");

    let github = FakeGitHub {
        remaining: AtomicU64::new(5000),
        reset_at: Utc::now() + chrono::Duration::hours(1),
    };
    let key = CacheKey::new("list_repos").arg(&"octocat")?.build();

    for attempt in 1..=3 {
        let started = Instant::now();
        let repos: Option<Vec<Repository>> = feedhaus
            .cached_upstream(&key, Some("github"), Some(ttl::REPOSITORIES), "github:octocat", || {
                github.list_repos("octocat")
            })
            .await?;
        println!(
            "  attempt {attempt}: {} repositories in {:?}",
            repos.map(|r| r.len()).unwrap_or_default(),
            started.elapsed()
        );
    }

    for status in feedhaus.rate_status() {
        println!(
            "📊 {}: {}/{} remaining, reset at {:?}",
            status.context, status.remaining, status.limit, status.reset_at
        );
    }

    // 4. Invalidation
    let removed = feedhaus.cache().delete_pattern("list_repos:*", Some("github")).await;
    println!("\n🧹 Invalidated {removed} cached entries");

    // 5. Secrets
    println!("\n🔐 Protecting access tokens");
    println!("---------------------------");

    let sealed = feedhaus.secrets().encrypt("ghp_exampletoken")?;
    println!("  stored form: {sealed}");
    println!("  decrypted:   {}", feedhaus.secrets().decrypt(&sealed));
    println!("  tampered:    {:?}", feedhaus.secrets().decrypt("tampered"));

    println!("\n🎉 Demo finished");
    Ok(())
}
