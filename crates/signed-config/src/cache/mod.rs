//! Verified config cache.
//!
//! [`ConfigCache`] owns the active configuration and drives the
//! fetch, verify, persist and activate cycle. Accessors never block on I/O:
//! they read an immutable [`ActiveConfig`] snapshot that cycles replace
//! wholesale.
//!
//! # Activation
//!
//! A fetched payload becomes active only after its signature verified and
//! the durable record was written. Poll cycles follow the construction-time
//! [`ActivationPolicy`]; [`ConfigCache::fetch_and_apply`] always activates.

use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::Fetcher;
use crate::error::{ConfigError, ConfigResult};
use crate::keystore::KeyStore;
use crate::poller::{Poller, Scheduler, TokioScheduler};
use crate::types::{ActivationPolicy, ConfigMap, ConfigPayload};
use crate::verify::{EcdsaP256Verifier, SignatureVerifier};

mod cycle;
pub mod file;

pub use cycle::CycleOutcome;
pub use file::{CacheFile, CacheRecord};

use cycle::{CycleMode, KeyLookup};

/// Immutable snapshot of the configuration in effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveConfig {
    values: ConfigMap,
    key_id: Option<String>,
}

impl ActiveConfig {
    pub fn values(&self) -> &ConfigMap {
        &self.values
    }

    /// Key that signed this config; `None` when nothing is active.
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

struct Inner {
    fetcher: Arc<dyn Fetcher>,
    key_store: Arc<dyn KeyStore>,
    verifier: Arc<dyn SignatureVerifier>,
    file: CacheFile,
    poller: Poller,
    policy: ActivationPolicy,
    runtime: Handle,
    active: RwLock<Arc<ActiveConfig>>,
    persisted_etag: Mutex<Option<String>>,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    fn snapshot(&self) -> Arc<ActiveConfig> {
        match self.active.read() {
            Ok(active) => active.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn activate(&self, payload: &ConfigPayload) {
        let next = Arc::new(ActiveConfig {
            values: payload.values.clone(),
            key_id: payload.key_id.clone(),
        });
        match self.active.write() {
            Ok(mut active) => *active = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn persisted_etag(&self) -> Option<String> {
        self.persisted_etag.lock().ok().and_then(|etag| etag.clone())
    }

    fn set_persisted_etag(&self, etag: Option<String>) {
        if let Ok(mut current) = self.persisted_etag.lock() {
            *current = etag;
        }
    }
}

/// Builder for [`ConfigCache`].
pub struct ConfigCacheBuilder {
    fetcher: Arc<dyn Fetcher>,
    key_store: Arc<dyn KeyStore>,
    file: CacheFile,
    verifier: Arc<dyn SignatureVerifier>,
    policy: ActivationPolicy,
    poll_interval: Duration,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl ConfigCacheBuilder {
    /// Signature verifier (default: ECDSA P-256).
    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Activation policy for poll cycles.
    pub fn policy(mut self, policy: ActivationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Poll interval (clamped by the poller).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Timer used for polling (default: tokio timers).
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Build the cache. Must be called within a tokio runtime.
    pub fn build(self) -> ConfigResult<ConfigCache> {
        let runtime = Handle::try_current().map_err(|e| ConfigError::Config {
            message: format!("config cache requires a tokio runtime: {}", e),
        })?;

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler::new(runtime.clone())));

        Ok(ConfigCache {
            inner: Arc::new(Inner {
                fetcher: self.fetcher,
                key_store: self.key_store,
                verifier: self.verifier,
                file: self.file,
                poller: Poller::new(self.poll_interval, scheduler),
                policy: self.policy,
                runtime,
                active: RwLock::new(Arc::new(ActiveConfig::default())),
                persisted_etag: Mutex::new(None),
                cycle_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }
}

/// Last-verified configuration with typed accessors.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConfigCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("file", &self.inner.file)
            .field("policy", &self.inner.policy)
            .field("poller", &self.inner.poller)
            .finish()
    }
}

impl ConfigCache {
    pub fn builder(
        fetcher: Arc<dyn Fetcher>,
        key_store: Arc<dyn KeyStore>,
        file: CacheFile,
    ) -> ConfigCacheBuilder {
        ConfigCacheBuilder {
            fetcher,
            key_store,
            file,
            verifier: Arc::new(EcdsaP256Verifier),
            policy: ActivationPolicy::default(),
            poll_interval: Duration::from_secs(60 * 60),
            scheduler: None,
        }
    }

    /// Current snapshot.
    pub fn active_config(&self) -> Arc<ActiveConfig> {
        self.inner.snapshot()
    }

    /// Value for `key`, or `fallback`.
    pub fn get_string(&self, key: &str, fallback: &str) -> String {
        self.inner
            .snapshot()
            .get(key)
            .unwrap_or(fallback)
            .to_string()
    }

    /// `"true"`/`"false"` (any ASCII case) for `key`, otherwise `fallback`.
    pub fn get_bool(&self, key: &str, fallback: bool) -> bool {
        let active = self.inner.snapshot();
        match active.get(key) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            _ => fallback,
        }
    }

    /// Value for `key` parsed as `T`, otherwise `fallback`.
    pub fn get_number<T: FromStr>(&self, key: &str, fallback: T) -> T {
        self.inner
            .snapshot()
            .get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(fallback)
    }

    /// All active values (empty when nothing is active).
    pub fn get_config(&self) -> ConfigMap {
        self.inner.snapshot().values.clone()
    }

    /// Activate the durable record if it verifies with a stored key.
    ///
    /// Never touches the network. Returns whether a config was activated.
    pub async fn load_from_durable_cache(&self) -> bool {
        let inner = &self.inner;
        let _guard = inner.cycle_lock.lock().await;

        let record = match inner.file.read().await {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable cached config");
                return false;
            }
        };

        let payload = match record.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "ignoring malformed cached config");
                return false;
            }
        };

        match inner.verify_payload(&payload, KeyLookup::StoredOnly).await {
            Ok(()) => {
                inner.activate(&payload);
                inner.set_persisted_etag(payload.etag.clone());
                info!(
                    key_id = %record.key_id,
                    values = payload.values.len(),
                    "loaded cached config"
                );
                true
            }
            Err(e) => {
                error!(
                    key_id = %record.key_id,
                    error = %e,
                    "cached config not verified, not activated"
                );
                false
            }
        }
    }

    /// Run one cycle now and keep polling.
    ///
    /// Each tick spawns a cycle that follows the configured policy.
    pub fn fetch_and_poll(&self) {
        let weak = Arc::downgrade(&self.inner);
        let runtime = self.inner.runtime.clone();

        debug!(interval_secs = self.inner.poller.delay().as_secs(), "starting poll");
        self.inner.poller.start(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            runtime.spawn(async move {
                // Failures are logged by the cycle.
                let _ = inner.run_cycle(CycleMode::Poll).await;
            });
        });
    }

    /// Stop future poll ticks; a cycle already running completes.
    pub fn stop_polling(&self) {
        self.inner.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poller.is_running()
    }

    /// One unconditional cycle that activates on success.
    pub async fn try_fetch_and_apply(&self) -> ConfigResult<CycleOutcome> {
        self.inner.run_cycle(CycleMode::Apply).await
    }

    /// One unconditional cycle that activates on success.
    ///
    /// Returns the new config, or an empty map when the cycle failed.
    pub async fn fetch_and_apply(&self) -> ConfigMap {
        match self.try_fetch_and_apply().await {
            Ok(CycleOutcome::Applied(values)) => values,
            _ => ConfigMap::new(),
        }
    }

    /// Spawn [`fetch_and_apply`](Self::fetch_and_apply) and hand its result
    /// to `completion`.
    pub fn fetch_and_apply_with<F>(&self, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(ConfigMap) + Send + 'static,
    {
        let cache = self.clone();
        self.inner.runtime.spawn(async move {
            completion(cache.fetch_and_apply().await);
        })
    }
}
