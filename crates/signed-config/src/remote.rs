//! Context object wiring the client, key store, cache file and poller.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::{ActiveConfig, CacheFile, ConfigCache, CycleOutcome};
use crate::client::ConfigClient;
use crate::error::ConfigResult;
use crate::keystore::{reset_on_first_launch, FileKeyStore};
use crate::types::{ConfigMap, Settings};

const FIRST_LAUNCH_MARKER: &str = "first_launch";

/// Remote configuration for one application.
///
/// Construct once per process and share by reference or clone.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    cache: ConfigCache,
    settings: Arc<Settings>,
}

impl RemoteConfig {
    /// Open the context: reset keys on first launch, then activate the
    /// durable record if it verifies.
    ///
    /// Storage problems are logged and leave the context on its fallbacks;
    /// only an unusable client configuration or a missing runtime fails.
    /// Must be called within a tokio runtime. Does not touch the network.
    pub async fn open(settings: Settings) -> ConfigResult<Self> {
        let cache_dir = settings.resolve_cache_dir().unwrap_or_else(|e| {
            let dir = fallback_dir(&settings, "cache");
            error!(error = %e, fallback = %dir.display(), "no cache directory");
            dir
        });
        let key_dir = settings.resolve_key_dir().unwrap_or_else(|e| {
            let dir = fallback_dir(&settings, "keys");
            error!(error = %e, fallback = %dir.display(), "no key store directory");
            dir
        });

        let client = ConfigClient::new(&settings)?;
        let key_store = FileKeyStore::new(&key_dir, &settings.namespace());

        let marker = cache_dir.join(FIRST_LAUNCH_MARKER);
        if let Err(e) = reset_on_first_launch(&key_store, &marker).await {
            error!(error = %e, "first launch key reset failed");
        }

        let cache = ConfigCache::builder(
            Arc::new(client),
            Arc::new(key_store),
            CacheFile::in_dir(&cache_dir),
        )
        .policy(settings.activation_policy())
        .poll_interval(settings.poll_interval())
        .build()?;

        debug!(
            cache_dir = %cache_dir.display(),
            key_dir = %key_dir.display(),
            "opened remote config"
        );

        if cache.load_from_durable_cache().await {
            info!("using cached config");
        }

        Ok(Self {
            cache,
            settings: Arc::new(settings),
        })
    }

    /// Open from `SIGNED_CONFIG_*` environment variables.
    pub async fn from_env() -> ConfigResult<Self> {
        Self::open(Settings::from_env()).await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    pub fn get_string(&self, key: &str, fallback: &str) -> String {
        self.cache.get_string(key, fallback)
    }

    pub fn get_bool(&self, key: &str, fallback: bool) -> bool {
        self.cache.get_bool(key, fallback)
    }

    pub fn get_number<T: FromStr>(&self, key: &str, fallback: T) -> T {
        self.cache.get_number(key, fallback)
    }

    pub fn get_config(&self) -> ConfigMap {
        self.cache.get_config()
    }

    pub fn active_config(&self) -> Arc<ActiveConfig> {
        self.cache.active_config()
    }

    pub fn fetch_and_poll(&self) {
        self.cache.fetch_and_poll()
    }

    pub fn stop_polling(&self) {
        self.cache.stop_polling()
    }

    pub async fn fetch_and_apply(&self) -> ConfigMap {
        self.cache.fetch_and_apply().await
    }

    pub async fn try_fetch_and_apply(&self) -> ConfigResult<CycleOutcome> {
        self.cache.try_fetch_and_apply().await
    }

    pub fn fetch_and_apply_with<F>(&self, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(ConfigMap) + Send + 'static,
    {
        self.cache.fetch_and_apply_with(completion)
    }
}

/// Per-namespace directory under the system temp dir.
fn fallback_dir(settings: &Settings, kind: &str) -> PathBuf {
    std::env::temp_dir()
        .join("signed-config")
        .join(settings.namespace())
        .join(kind)
}
