//! Durable config record.
//!
//! ```text
//! {cache_dir}/config.json   # {"config": <base64>, "signature", "key_id", "etag", "stored_at"}
//! ```

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::ConfigPayload;

/// On-disk form of the last verified payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Base64 of the exact signed bytes.
    pub config: String,

    pub signature: String,

    pub key_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

impl CacheRecord {
    /// Build a record from a signed payload.
    ///
    /// Unsigned payloads have nothing to persist.
    pub fn from_payload(payload: &ConfigPayload) -> ConfigResult<Self> {
        let (Some(key_id), Some(signature)) = (&payload.key_id, &payload.signature) else {
            return Err(ConfigError::Unsigned {
                reason: "payload has no key id or signature".to_string(),
            });
        };

        Ok(Self {
            config: BASE64.encode(&payload.raw_bytes),
            signature: signature.clone(),
            key_id: key_id.clone(),
            etag: payload.etag.clone(),
            stored_at: Some(Utc::now()),
        })
    }

    /// Decode the record back into a payload.
    pub fn to_payload(&self) -> ConfigResult<ConfigPayload> {
        let raw = BASE64.decode(&self.config).map_err(|e| ConfigError::Cache {
            message: format!("cached config is not valid base64: {}", e),
        })?;

        let mut payload =
            ConfigPayload::from_body(&raw, Some(self.signature.clone()), self.etag.clone())
                .map_err(|e| ConfigError::Cache {
                    message: format!("cached config is malformed: {}", e),
                })?;

        // The signed bytes are stored verbatim; no newline trimming on reload.
        payload.raw_bytes = raw;
        Ok(payload)
    }
}

/// Single-record file store.
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{cache_dir}/config.json`
    pub fn in_dir(cache_dir: impl AsRef<Path>) -> Self {
        Self::new(cache_dir.as_ref().join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record; `Ok(None)` when no record exists.
    pub async fn read(&self) -> ConfigResult<Option<CacheRecord>> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cached config");
                return Ok(None);
            }
            Err(e) => {
                return Err(ConfigError::Cache {
                    message: format!("failed to read cached config: {}", e),
                })
            }
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| ConfigError::Cache {
                message: format!("failed to parse cached config: {}", e),
            })
    }

    /// Replace the record atomically.
    pub async fn write(&self, record: &CacheRecord) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::Cache {
                    message: format!("failed to create cache directory: {}", e),
                })?;
        }

        let json = serde_json::to_vec_pretty(record).map_err(|e| ConfigError::Cache {
            message: format!("failed to serialize cached config: {}", e),
        })?;

        write_atomic(&self.path, &json).await
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> ConfigResult<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, content)
        .await
        .map_err(|e| ConfigError::Cache {
            message: format!("failed to write temp file: {}", e),
        })?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| ConfigError::Cache {
            message: format!("failed to rename temp file: {}", e),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn signed_payload() -> ConfigPayload {
        ConfigPayload::from_body(
            br#"{"body":{"foo":"bar"},"keyId":"K1"}"#,
            Some("c2ln".to_string()),
            Some("\"e1\"".to_string()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp_dir.path().join("nested"));

        let record = CacheRecord::from_payload(&signed_payload()).unwrap();
        file.write(&record).await.unwrap();

        let loaded = file.read().await.unwrap().expect("record");
        assert_eq!(loaded, record);

        let payload = loaded.to_payload().unwrap();
        assert_eq!(payload, signed_payload());
        assert!(!file.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp_dir.path());
        assert!(file.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_cache_error() {
        let temp_dir = TempDir::new().unwrap();
        let file = CacheFile::in_dir(temp_dir.path());
        fs::write(file.path(), "{{{").await.unwrap();

        assert!(matches!(file.read().await, Err(ConfigError::Cache { .. })));
    }

    #[test]
    fn test_reload_keeps_bytes_verbatim() {
        let raw = b"{\"body\":{},\"keyId\":\"K1\"}\n".to_vec();
        let record = CacheRecord {
            config: BASE64.encode(&raw),
            signature: "c2ln".into(),
            key_id: "K1".into(),
            etag: None,
            stored_at: None,
        };
        assert_eq!(record.to_payload().unwrap().raw_bytes, raw);
    }

    #[test]
    fn test_unsigned_payload_has_no_record() {
        let payload = ConfigPayload::from_body(br#"{"body":{}}"#, None, None).unwrap();
        assert!(matches!(
            CacheRecord::from_payload(&payload),
            Err(ConfigError::Unsigned { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_fails_when_directory_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "").await.unwrap();

        let file = CacheFile::in_dir(&blocker);
        let record = CacheRecord::from_payload(&signed_payload()).unwrap();
        assert!(matches!(
            file.write(&record).await,
            Err(ConfigError::Cache { .. })
        ));
    }
}
