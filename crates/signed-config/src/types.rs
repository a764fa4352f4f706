//! Wire and configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Key/value configuration as served to the host application.
pub type ConfigMap = BTreeMap<String, String>;

/// Signed configuration payload received from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPayload {
    /// Body bytes exactly as signed (one trailing newline stripped).
    pub raw_bytes: Vec<u8>,

    /// Configuration values from the `body` member.
    pub values: ConfigMap,

    /// Key ID selecting the verification key.
    pub key_id: Option<String>,

    /// Base64 detached signature (`Signature` response header).
    pub signature: Option<String>,

    /// ETag of the response, if any.
    pub etag: Option<String>,
}

/// JSON document carried in the response body.
#[derive(Debug, Deserialize)]
struct WireDocument {
    body: ConfigMap,

    #[serde(rename = "keyId", default)]
    key_id: Option<String>,
}

impl ConfigPayload {
    /// Parse a response body into a payload.
    ///
    /// The signature and etag travel out-of-band and are attached here.
    pub fn from_body(
        body: &[u8],
        signature: Option<String>,
        etag: Option<String>,
    ) -> ConfigResult<Self> {
        let raw_bytes = trim_trailing_newline(body).to_vec();

        let doc: WireDocument =
            serde_json::from_slice(&raw_bytes).map_err(|e| ConfigError::InvalidResponse {
                message: format!("failed to parse config document: {}", e),
            })?;

        Ok(Self {
            raw_bytes,
            values: doc.body,
            key_id: doc.key_id.filter(|k| !k.is_empty()),
            signature: signature.filter(|s| !s.is_empty()),
            etag,
        })
    }
}

/// Strip a single trailing `\n` added by the transport.
pub(crate) fn trim_trailing_newline(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(b"\n").unwrap_or(bytes)
}

/// Public key record returned by `GET /keys/{keyId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Key ID.
    pub id: String,

    /// Base64 EC public key.
    pub key: String,

    /// When the key was issued (opaque string).
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
}

/// When a freshly verified config replaces the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// Swap the active config as soon as it is persisted.
    ApplyImmediately,

    /// Persist only; the config becomes active on the next start.
    #[default]
    StageForNextLaunch,
}

/// Client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the config service.
    #[serde(default)]
    pub url: Option<String>,

    /// Application identifier.
    #[serde(default)]
    pub app_id: Option<String>,

    /// Subscription key sent with every request.
    #[serde(default)]
    pub subscription_key: String,

    /// Host application name.
    #[serde(default)]
    pub app_name: Option<String>,

    /// Host application version.
    #[serde(default)]
    pub app_version: Option<String>,

    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Activate polled configs mid-session.
    #[serde(default)]
    pub apply_immediately: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Directory for the durable config record and install marker.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Directory for the key store.
    #[serde(default)]
    pub key_dir: Option<PathBuf>,

    /// Key store namespace (defaults to the app id).
    #[serde(default)]
    pub key_namespace: Option<String>,
}

fn default_poll_interval() -> u64 {
    60 * 60
}

fn default_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: None,
            app_id: None,
            subscription_key: String::new(),
            app_name: None,
            app_version: None,
            poll_interval_secs: default_poll_interval(),
            apply_immediately: false,
            timeout_secs: default_timeout(),
            cache_dir: None,
            key_dir: None,
            key_namespace: None,
        }
    }
}

impl Settings {
    /// Create settings from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SIGNED_CONFIG_URL` | Service base URL |
    /// | `SIGNED_CONFIG_APP_ID` | Application identifier |
    /// | `SIGNED_CONFIG_SUBSCRIPTION_KEY` | Subscription key |
    /// | `SIGNED_CONFIG_POLL_INTERVAL` | Poll interval in seconds |
    /// | `SIGNED_CONFIG_APPLY_IMMEDIATELY` | Activate polled configs mid-session |
    /// | `SIGNED_CONFIG_TIMEOUT` | Request timeout in seconds |
    /// | `SIGNED_CONFIG_CACHE_DIR` | Cache directory |
    /// | `SIGNED_CONFIG_KEY_DIR` | Key store directory |
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("SIGNED_CONFIG_URL").ok(),
            app_id: std::env::var("SIGNED_CONFIG_APP_ID").ok(),
            subscription_key: std::env::var("SIGNED_CONFIG_SUBSCRIPTION_KEY").unwrap_or_default(),
            app_name: None,
            app_version: None,
            poll_interval_secs: std::env::var("SIGNED_CONFIG_POLL_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_interval),
            apply_immediately: std::env::var("SIGNED_CONFIG_APPLY_IMMEDIATELY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            timeout_secs: std::env::var("SIGNED_CONFIG_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            cache_dir: std::env::var_os("SIGNED_CONFIG_CACHE_DIR").map(PathBuf::from),
            key_dir: std::env::var_os("SIGNED_CONFIG_KEY_DIR").map(PathBuf::from),
            key_namespace: None,
        }
    }

    /// Set the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the application identifier.
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Set the subscription key.
    pub fn with_subscription_key(mut self, key: impl Into<String>) -> Self {
        self.subscription_key = key.into();
        self
    }

    /// Set the host application name and version.
    pub fn with_app_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self.app_version = Some(version.into());
        self
    }

    /// Set the poll interval in seconds.
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Activate polled configs immediately.
    pub fn with_apply_immediately(mut self, apply: bool) -> Self {
        self.apply_immediately = apply;
        self
    }

    /// Set the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the key store directory.
    pub fn with_key_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.key_dir = Some(dir.into());
        self
    }

    /// Activation policy for polled configs.
    pub fn activation_policy(&self) -> ActivationPolicy {
        if self.apply_immediately {
            ActivationPolicy::ApplyImmediately
        } else {
            ActivationPolicy::StageForNextLaunch
        }
    }

    /// Poll interval as a duration (not yet clamped).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Namespace used for the key store.
    pub fn namespace(&self) -> String {
        self.key_namespace
            .clone()
            .or_else(|| self.app_id.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Resolve the cache directory.
    ///
    /// Default: `{cache_dir}/signed-config/{namespace}`
    pub fn resolve_cache_dir(&self) -> ConfigResult<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let base = dirs::cache_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| ConfigError::Cache {
                message: "could not determine cache directory".to_string(),
            })?;
        Ok(base.join("signed-config").join(self.namespace()))
    }

    /// Resolve the key store directory.
    ///
    /// Default: `{data_local_dir}/signed-config/keys`
    pub fn resolve_key_dir(&self) -> ConfigResult<PathBuf> {
        if let Some(dir) = &self.key_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| ConfigError::KeyStore {
                message: "could not determine key store directory".to_string(),
            })?;
        Ok(base.join("signed-config").join("keys"))
    }
}
