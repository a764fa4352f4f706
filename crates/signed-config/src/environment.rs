//! Device and application descriptors used to build requests.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Settings;

pub const SDK_NAME: &str = "signed-config";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request environment for the config service.
#[derive(Debug, Clone)]
pub struct Environment {
    base_url: Option<String>,
    app_id: Option<String>,
    subscription_key: String,
    app_name: String,
    app_version: String,
    device_model: String,
    os_version: String,
}

impl Environment {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings
                .url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            app_id: settings.app_id.clone().filter(|a| !a.is_empty()),
            subscription_key: settings.subscription_key.clone(),
            app_name: settings.app_name.clone().unwrap_or_default(),
            app_version: settings.app_version.clone().unwrap_or_default(),
            device_model: std::env::consts::ARCH.to_string(),
            os_version: std::env::consts::OS.to_string(),
        }
    }

    fn base_url(&self) -> ConfigResult<&str> {
        self.base_url.as_deref().ok_or_else(|| ConfigError::Config {
            message: "config service URL is not set (SIGNED_CONFIG_URL)".to_string(),
        })
    }

    fn app_id(&self) -> ConfigResult<&str> {
        self.app_id.as_deref().ok_or_else(|| ConfigError::Config {
            message: "application id is not set (SIGNED_CONFIG_APP_ID)".to_string(),
        })
    }

    /// `{base}/app/{app_id}/config`
    pub fn config_url(&self) -> ConfigResult<Url> {
        self.endpoint(&["app", self.app_id()?, "config"])
    }

    /// `{base}/keys/{key_id}`
    pub fn key_url(&self, key_id: &str) -> ConfigResult<Url> {
        self.endpoint(&["keys", key_id])
    }

    /// Base URL extended with escaped path segments.
    fn endpoint(&self, segments: &[&str]) -> ConfigResult<Url> {
        let mut url = parse_url(self.base_url()?)?;
        url.path_segments_mut()
            .map_err(|_| ConfigError::Config {
                message: "config service URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Descriptor headers; empty values are left out.
    pub fn headers(&self) -> HeaderMap {
        let api_key = if self.subscription_key.is_empty() {
            String::new()
        } else {
            format!("ras-{}", self.subscription_key)
        };

        let pairs = [
            ("x-app-id", self.app_id.as_deref().unwrap_or_default()),
            ("x-device-model", self.device_model.as_str()),
            ("x-device-os-version", self.os_version.as_str()),
            ("x-sdk-name", SDK_NAME),
            ("x-sdk-version", SDK_VERSION),
            ("x-app-name", self.app_name.as_str()),
            ("x-app-version", self.app_version.as_str()),
            ("apikey", api_key.as_str()),
        ];

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            if value.is_empty() {
                continue;
            }
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
        headers
    }
}

fn parse_url(url: &str) -> ConfigResult<Url> {
    Url::parse(url).map_err(|e| ConfigError::Config {
        message: format!("invalid config service URL {}: {}", url, e),
    })
}
