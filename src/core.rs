//! Core Feedhaus functionality
//!
//! This module contains the main Feedhaus struct and its implementation,
//! providing centralized coordination for the shared cache, the rate
//! governors of each upstream credential, and the secret codec.

use cache_system::{CacheManager, CacheParams};
use rate_governor::{Clock, Observed, RateGovernor, RateStatus, SystemClock, UpstreamError};
use secret_codec::SecretCodec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::errors::FeedhausError;
use crate::{debug_log, trace_log};
use config::{AppConfig, RateConfig};

/// Main Feedhaus coordinator, one per process
///
/// Construct it once at startup and share it by `Arc` with every provider
/// adapter that needs caching, throttling or secrets.
pub struct Feedhaus {
    cache: Arc<CacheManager>,
    secrets: Arc<SecretCodec>,
    rate_config: RateConfig,
    governors: RwLock<HashMap<String, Arc<RateGovernor>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Feedhaus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feedhaus")
            .field("cache", &self.cache)
            .field("rate_config", &self.rate_config)
            .field("governors", &self.governor_contexts())
            .finish_non_exhaustive()
    }
}

impl Feedhaus {
    /// Create Feedhaus from application configuration, using redis for the cache
    pub fn new(config: AppConfig) -> Result<Self, FeedhausError> {
        config.validate()?;
        let cache = CacheManager::new(config.cache)?;
        let secrets = SecretCodec::from_config(&config.secrets)?;
        Ok(Self::from_parts(cache, secrets, config.rate))
    }

    /// Assemble Feedhaus from already built components
    pub fn from_parts(cache: CacheManager, secrets: SecretCodec, rate_config: RateConfig) -> Self {
        Self {
            cache: Arc::new(cache),
            secrets: Arc::new(secrets),
            rate_config,
            governors: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for governors created from now on
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get the shared cache manager
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Get the secret codec
    pub fn secrets(&self) -> &Arc<SecretCodec> {
        &self.secrets
    }

    /// Cache view pinned to one namespace and TTL
    pub fn cache_params(&self, namespace: &str, ttl: u64) -> CacheParams {
        CacheParams::new(self.cache.clone(), ttl, namespace)
    }

    /// Get the governor for a credential context, creating it on first use
    pub fn governor(&self, context: &str) -> Arc<RateGovernor> {
        if let Some(governor) = self.read_governors().get(context) {
            return governor.clone();
        }

        let mut governors = self
            .governors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        governors
            .entry(context.to_string())
            .or_insert_with(|| {
                debug_log!("Creating rate governor for context {}", context);
                Arc::new(RateGovernor::with_clock(
                    context,
                    &self.rate_config,
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Register a governor built elsewhere, e.g. with a provider-specific limit
    pub fn register_governor(
        &self,
        governor: RateGovernor,
    ) -> Result<Arc<RateGovernor>, FeedhausError> {
        let mut governors = self
            .governors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let context = governor.context().to_string();

        if governors.contains_key(&context) {
            return Err(FeedhausError::GovernorAlreadyRegistered(context));
        }

        let governor = Arc::new(governor);
        governors.insert(context, governor.clone());
        Ok(governor)
    }

    /// List all credential contexts with a governor
    pub fn governor_contexts(&self) -> Vec<String> {
        let mut contexts: Vec<String> = self.read_governors().keys().cloned().collect();
        contexts.sort();
        contexts
    }

    /// Budget snapshot of every governor
    pub fn rate_status(&self) -> Vec<RateStatus> {
        let mut statuses: Vec<RateStatus> = self
            .read_governors()
            .values()
            .map(|governor| governor.status())
            .collect();
        statuses.sort_by(|a, b| a.context.cmp(&b.context));
        statuses
    }

    fn read_governors(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<RateGovernor>>> {
        self.governors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve from cache, or make one governed upstream call and cache its result.
    ///
    /// The upstream call only runs on a miss; it waits for budget first and
    /// is retried once after a budget rejection. `Ok(None)` from the upstream
    /// is passed through uncached.
    pub async fn cached_upstream<T, F, Fut>(
        &self,
        key: &str,
        namespace: Option<&str>,
        ttl: Option<u64>,
        context: &str,
        call: F,
    ) -> Result<Option<T>, UpstreamError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observed<Option<T>>, UpstreamError>>,
    {
        let governor = self.governor(context);
        trace_log!("cached_upstream key={} context={}", key, context);

        self.cache
            .get_or_compute(key, namespace, ttl, || async move { governor.call(call).await })
            .await
    }

    /// Check cache store connectivity
    pub async fn health_check(&self) -> Result<(), FeedhausError> {
        self.cache.ping().await?;
        Ok(())
    }
}
