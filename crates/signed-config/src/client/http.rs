//! HTTP layer: status mapping and ConfigOutcome.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::environment::Environment;
use crate::error::{ConfigError, ConfigResult};

use super::helpers::parse_api_error;

/// Outcome of a config fetch (NotModified only for 304).
#[derive(Debug)]
pub(crate) enum ConfigOutcome {
    NotModified,
    Fetched(ConfigFetched),
}

#[derive(Debug)]
pub(crate) struct ConfigFetched {
    pub signature: Option<String>,
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

/// HTTP backend for making requests (holds reqwest client and environment).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) environment: Environment,
}

impl HttpBackend {
    /// Fetch the signed config document.
    pub(crate) async fn fetch_config(
        &self,
        url: Url,
        etag: Option<&str>,
    ) -> ConfigResult<ConfigOutcome> {
        let response = self.request(url, etag).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("config not modified (304)");
            return Ok(ConfigOutcome::NotModified);
        }

        let headers = response.headers();
        let signature = header_string(headers, "signature");
        let etag = header_string(headers, ETAG.as_str());

        let body = response.bytes().await.map_err(|e| ConfigError::Network {
            message: format!("failed to read response body: {}", e),
        })?;

        Ok(ConfigOutcome::Fetched(ConfigFetched {
            signature,
            etag,
            body: body.to_vec(),
        }))
    }

    /// Fetch a JSON document (key records).
    pub(crate) async fn fetch_json(&self, url: Url) -> ConfigResult<Vec<u8>> {
        let response = self.request(url, None).await?;
        let body = response.bytes().await.map_err(|e| ConfigError::Network {
            message: format!("failed to read response body: {}", e),
        })?;
        Ok(body.to_vec())
    }

    /// Make a single request. Retrying is left to the next poll tick.
    async fn request(&self, url: Url, etag: Option<&str>) -> ConfigResult<reqwest::Response> {
        let mut request = self
            .client
            .get(url.clone())
            .headers(self.environment.headers());

        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 | 304 => Ok(response),

            401 | 403 => Err(ConfigError::Unauthorized {
                message: "subscription key rejected".to_string(),
            }),

            404 => Err(ConfigError::NotFound {
                resource: url.path().to_string(),
            }),

            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(match parse_api_error(&body) {
                    Some((code, message)) => ConfigError::Server { code, message },
                    None => ConfigError::Network {
                        message: format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
                    },
                })
            }
        }
    }
}

fn header_string(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
