//! Key store for signature verification keys.
//!
//! Maps key IDs to base64 public key material. Keys for a given ID are
//! immutable once issued, so concurrent `put`s may race with last-write-wins.
//!
//! # File layout
//!
//! ```text
//! {key_dir}/{namespace}/keys.json   # {"<key_id>": "<base64 key>", ...}
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};

const KEYS_FILE: &str = "keys.json";

/// Durable, namespaced key storage.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Get the key for `key_id`, if stored.
    async fn get(&self, key_id: &str) -> ConfigResult<Option<String>>;

    /// Insert or overwrite the key for `key_id`.
    async fn put(&self, key_id: &str, key: &str) -> ConfigResult<()>;

    /// Remove every stored key.
    async fn clear(&self) -> ConfigResult<()>;
}

/// In-memory key store.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    keys: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `(key_id, key)` pairs.
    pub fn with_keys<I, K, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            keys: Arc::new(RwLock::new(keys)),
        }
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, key_id: &str) -> ConfigResult<Option<String>> {
        Ok(self.keys.read().await.get(key_id).cloned())
    }

    async fn put(&self, key_id: &str, key: &str) -> ConfigResult<()> {
        self.keys
            .write()
            .await
            .insert(key_id.to_string(), key.to_string());
        Ok(())
    }

    async fn clear(&self) -> ConfigResult<()> {
        self.keys.write().await.clear();
        Ok(())
    }
}

/// File-backed key store.
///
/// Writes go through a temp file and rename; a mutex serializes
/// read-modify-write cycles within the process.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileKeyStore {
    /// Create a store under `{key_dir}/{namespace}`.
    pub fn new(key_dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            dir: key_dir.as_ref().join(namespace),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Directory holding the keys file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn keys_path(&self) -> PathBuf {
        self.dir.join(KEYS_FILE)
    }

    /// Keys on disk; a corrupt file reads as empty, an unreadable one fails.
    async fn read_keys(&self) -> ConfigResult<HashMap<String, String>> {
        let path = self.keys_path();
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(ConfigError::KeyStore {
                    message: format!("failed to read key store: {}", e),
                })
            }
        };

        match serde_json::from_slice(&content) {
            Ok(keys) => Ok(keys),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "key store is corrupt, treating as empty"
                );
                Ok(HashMap::new())
            }
        }
    }

    async fn load(&self) -> HashMap<String, String> {
        self.read_keys().await.unwrap_or_else(|e| {
            warn!(path = %self.keys_path().display(), error = %e, "key store unavailable");
            HashMap::new()
        })
    }

    async fn save(&self, keys: &HashMap<String, String>) -> ConfigResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ConfigError::KeyStore {
                message: format!("failed to create key store directory: {}", e),
            })?;

        let json = serde_json::to_vec(keys).map_err(|e| ConfigError::KeyStore {
            message: format!("failed to serialize keys: {}", e),
        })?;

        let path = self.keys_path();
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, &json)
            .await
            .map_err(|e| ConfigError::KeyStore {
                message: format!("failed to write temp file: {}", e),
            })?;
        restrict_permissions(&temp_path).await;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| ConfigError::KeyStore {
                message: format!("failed to rename temp file: {}", e),
            })
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await {
        warn!(path = %path.display(), error = %e, "failed to restrict key store permissions");
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get(&self, key_id: &str) -> ConfigResult<Option<String>> {
        let found = self.load().await.remove(key_id);
        debug!(key_id, found = found.is_some(), "key store lookup");
        Ok(found)
    }

    async fn put(&self, key_id: &str, key: &str) -> ConfigResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut keys = self.read_keys().await?;
        keys.insert(key_id.to_string(), key.to_string());
        self.save(&keys).await?;

        debug!(key_id, "stored key");
        Ok(())
    }

    async fn clear(&self) -> ConfigResult<()> {
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(self.keys_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::KeyStore {
                message: format!("failed to clear key store: {}", e),
            }),
        }
    }
}

/// Clear `store` if this is the first launch after install.
///
/// The marker lives in the app's cache directory, which is removed together
/// with the app, while the key store directory may survive a reinstall.
/// Returns `true` when the store was cleared.
pub async fn reset_on_first_launch(store: &dyn KeyStore, marker: &Path) -> ConfigResult<bool> {
    if fs::try_exists(marker).await.unwrap_or(false) {
        return Ok(false);
    }

    if let Some(parent) = marker.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ConfigError::Cache {
                message: format!("failed to create marker directory: {}", e),
            })?;
    }

    store.clear().await?;
    fs::write(marker, b"")
        .await
        .map_err(|e| ConfigError::Cache {
            message: format!("failed to write first launch marker: {}", e),
        })?;

    info!("first launch detected, cleared key store");
    Ok(true)
}
