//! Redis-backed key-value store
//!
//! Holds one lazily opened multiplexed connection. A connection-level
//! failure drops it so the next command reconnects.

use crate::errors::CacheError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Redis store shared by every namespace in the process
#[derive(Clone)]
pub struct RedisStore {
    client: Arc<Client>,
    connection_timeout: Duration,
    connection_pool: Arc<RwLock<Option<MultiplexedConnection>>>,
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection_status = {
            match self.connection_pool.try_read() {
                Ok(pool) => {
                    if pool.is_some() {
                        "connected"
                    } else {
                        "no_connection"
                    }
                }
                Err(_) => "lock_busy",
            }
        };

        f.debug_struct("RedisStore")
            .field("connection_timeout", &self.connection_timeout)
            .field("connected", &connection_status)
            .finish()
    }
}

impl RedisStore {
    /// Create a store for `redis_url`; no connection is opened yet
    pub fn new(redis_url: &str, connection_timeout: Duration) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;

        Ok(Self {
            client: Arc::new(client),
            connection_timeout,
            connection_pool: Arc::new(RwLock::new(None)),
        })
    }

    /// Get or create Redis connection
    async fn get_connection(&self) -> Result<MultiplexedConnection, CacheError> {
        if let Some(connection) = self.connection_pool.read().await.as_ref() {
            return Ok(connection.clone());
        }

        let mut pool = self.connection_pool.write().await;
        if let Some(connection) = pool.as_ref() {
            return Ok(connection.clone());
        }

        let connection = tokio::time::timeout(
            self.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| CacheError::Timeout)??;

        *pool = Some(connection.clone());
        Ok(connection)
    }

    /// Run one command, discarding the cached connection if it broke
    async fn run<T, F, Fut>(&self, command: F) -> Result<T, CacheError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let connection = self.get_connection().await?;
        let result = command(connection).await;

        if let Err(e) = &result {
            if e.is_connection_failure() {
                tracing::warn!(error = %e, "dropping broken redis connection");
                *self.connection_pool.write().await = None;
            }
        }
        result
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.run(|mut conn| async move { Ok::<_, CacheError>(conn.get(key).await?) })
            .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        if ttl_seconds == 0 {
            return Err(CacheError::InvalidTtl(ttl_seconds));
        }
        self.run(|mut conn| async move {
            let _: () = conn.set_ex(key, value, ttl_seconds).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(|mut conn| async move { Ok::<_, CacheError>(conn.del(keys).await?) })
            .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.run(|mut conn| async move { Ok::<_, CacheError>(conn.keys(pattern).await?) })
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.run(|mut conn| async move { Ok::<_, CacheError>(conn.exists(key).await?) })
            .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.run(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }
}
