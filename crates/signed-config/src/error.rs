//! Error types for the signed config client.

/// Signed config errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Resource not found on the config service.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Subscription key rejected.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Structured error body returned by the service.
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Invalid response from the service.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Payload carries no key id or no signature.
    #[error("payload is unsigned: {reason}")]
    Unsigned { reason: String },

    /// Signature verification failed.
    #[error("signature verification failed for key {key_id}")]
    SignatureInvalid { key_id: String },

    /// No usable key for the payload's key id.
    #[error("key not trusted: {key_id}")]
    KeyNotTrusted { key_id: String },

    /// Key endpoint answered with a record for a different key id.
    #[error("key id mismatch: requested {requested}, received {received}")]
    KeyMismatch { requested: String, received: String },

    /// Durable config cache error.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Key store error.
    #[error("key store error: {message}")]
    KeyStore { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ConfigError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Config issues
            Self::Config { .. } => 1,
            Self::NotFound { .. } => 1,

            // Auth issues
            Self::Unauthorized { .. } => 2,

            // Security issues
            Self::Unsigned { .. } => 4,
            Self::SignatureInvalid { .. } => 4,
            Self::KeyNotTrusted { .. } => 4,
            Self::KeyMismatch { .. } => 4,

            // Network/transient
            Self::Network { .. } => 5,
            Self::Server { .. } => 5,

            // Local storage
            Self::InvalidResponse { .. } => 6,
            Self::Cache { .. } => 6,
            Self::KeyStore { .. } => 6,
        }
    }

    /// Whether the error means the payload was refused on trust grounds.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Unsigned { .. }
                | Self::SignatureInvalid { .. }
                | Self::KeyNotTrusted { .. }
                | Self::KeyMismatch { .. }
        )
    }
}

impl From<reqwest::Error> for ConfigError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for signed config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
