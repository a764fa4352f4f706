//! Config service client.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::environment::Environment;
use crate::error::{ConfigError, ConfigResult};
use crate::types::{ConfigPayload, KeyRecord, Settings};

mod helpers;
mod http;

use http::{ConfigOutcome, HttpBackend};

pub const CLIENT_USER_AGENT: &str = concat!("signed-config/", env!("CARGO_PKG_VERSION"));

/// Source of signed configs and verification keys.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the signed config.
    ///
    /// Returns `Ok(None)` only when `etag` matched (not modified).
    async fn fetch_config(&self, etag: Option<&str>) -> ConfigResult<Option<ConfigPayload>>;

    /// Fetch the public key record for `key_id`.
    ///
    /// Callers must check that the record's `id` matches.
    async fn fetch_key(&self, key_id: &str) -> ConfigResult<KeyRecord>;
}

/// HTTP client for the config service.
#[derive(Debug, Clone)]
pub struct ConfigClient {
    http: HttpBackend,
}

impl ConfigClient {
    pub fn new(settings: &Settings) -> ConfigResult<Self> {
        Self::with_environment(Environment::from_settings(settings), settings)
    }

    pub fn with_environment(environment: Environment, settings: &Settings) -> ConfigResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .default_headers(default_headers)
            .build()
            .map_err(|e| ConfigError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http: HttpBackend {
                client,
                environment,
            },
        })
    }

    pub fn from_env() -> ConfigResult<Self> {
        Self::new(&Settings::from_env())
    }

    pub fn environment(&self) -> &Environment {
        &self.http.environment
    }
}

#[async_trait]
impl Fetcher for ConfigClient {
    async fn fetch_config(&self, etag: Option<&str>) -> ConfigResult<Option<ConfigPayload>> {
        let url = self.http.environment.config_url()?;
        debug!(url = %url, conditional = etag.is_some(), "fetching config");

        match self.http.fetch_config(url, etag).await? {
            ConfigOutcome::NotModified => Ok(None),
            ConfigOutcome::Fetched(f) => {
                ConfigPayload::from_body(&f.body, f.signature, f.etag).map(Some)
            }
        }
    }

    async fn fetch_key(&self, key_id: &str) -> ConfigResult<KeyRecord> {
        let url = self.http.environment.key_url(key_id)?;
        debug!(url = %url, key_id, "fetching key");

        let body = self.http.fetch_json(url).await?;
        serde_json::from_slice(&body).map_err(|e| ConfigError::InvalidResponse {
            message: format!("failed to parse key record: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONFIG_BODY: &str = r#"{"body":{"foo":"bar"},"keyId":"K1"}"#;

    fn test_settings(mock_server: &MockServer) -> Settings {
        Settings::default()
            .with_url(mock_server.uri())
            .with_app_id("app-1")
            .with_subscription_key("sub")
            .with_app_info("Demo", "1.0.0")
    }

    fn create_test_client(mock_server: &MockServer) -> ConfigClient {
        ConfigClient::new(&test_settings(mock_server)).expect("failed to create client")
    }

    #[tokio::test]
    async fn test_fetch_config_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/app/app-1/config"))
            .and(header("apikey", "ras-sub"))
            .and(header("x-app-id", "app-1"))
            .and(header("x-app-version", "1.0.0"))
            .and(header("user-agent", CLIENT_USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("{}\n", CONFIG_BODY))
                    .insert_header("signature", "c2lnbmF0dXJl")
                    .insert_header("etag", "\"v1\""),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let payload = client
            .fetch_config(None)
            .await
            .expect("fetch failed")
            .expect("expected Some");

        assert_eq!(payload.raw_bytes, CONFIG_BODY.as_bytes());
        assert_eq!(payload.values.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(payload.key_id.as_deref(), Some("K1"));
        assert_eq!(payload.signature.as_deref(), Some("c2lnbmF0dXJl"));
        assert_eq!(payload.etag.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_fetch_config_304_not_modified() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/app/app-1/config"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.fetch_config(Some("\"v1\"")).await.expect("fetch failed");
        assert!(result.is_none(), "expected None for 304");
    }

    #[tokio::test]
    async fn test_fetch_config_unconditional_has_no_if_none_match() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/app/app-1/config"))
            .and(header_exists("if-none-match"))
            .respond_with(ResponseTemplate::new(304))
            .expect(0)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/app/app-1/config"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CONFIG_BODY))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let payload = client.fetch_config(None).await.unwrap().unwrap();
        assert!(payload.signature.is_none());
    }

    #[tokio::test]
    async fn test_fetch_config_unauthorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/app/app-1/config"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.fetch_config(None).await;
        assert!(matches!(result, Err(ConfigError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_fetch_config_structured_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/app/app-1/config"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string(r#"{"code":500,"message":"config store unavailable"}"#),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        match client.fetch_config(None).await {
            Err(ConfigError::Server { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "config store unavailable");
            }
            other => panic!("expected Server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_config_plain_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/app/app-1/config"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.fetch_config(None).await;
        assert!(matches!(result, Err(ConfigError::Network { .. })));
    }

    #[tokio::test]
    async fn test_fetch_config_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/app/app-1/config"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.fetch_config(None).await;
        assert!(matches!(result, Err(ConfigError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_fetch_key_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/keys/K1"))
            .and(header("apikey", "ras-sub"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id":"K1","key":"BASE64KEY","createdAt":"2024-05-01T00:00:00Z"}"#,
            ))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let record = client.fetch_key("K1").await.expect("fetch failed");
        assert_eq!(record.id, "K1");
        assert_eq!(record.key, "BASE64KEY");
    }

    #[tokio::test]
    async fn test_fetch_key_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/keys/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.fetch_key("missing").await;
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_missing_app_id_short_circuits() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let settings = Settings::default().with_url(mock_server.uri());
        let client = ConfigClient::new(&settings).unwrap();
        let result = client.fetch_config(None).await;
        assert!(matches!(result, Err(ConfigError::Config { .. })));
    }
}
