//! Client-side cache for signed remote configuration.
//!
//! This crate fetches a key/value configuration from a config service,
//! verifies its ECDSA P-256 signature against a locally stored public key,
//! persists it, and exposes the last verified config with typed accessors:
//!
//! - HTTP client with conditional (ETag) polling
//! - Key store with lazy key fetching and first-launch reset
//! - Durable, atomically written config record
//! - Fixed-interval poller with pluggable scheduler
//! - Apply-immediately or stage-for-next-launch activation
//!
//! # Quick Start
//!
//! ```no_run
//! use signed_config::{RemoteConfig, Settings};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::from_env().with_app_info("my-app", "1.4.0");
//! let remote = RemoteConfig::open(settings).await?;
//!
//! // Poll in the background; new configs activate on the next start
//! remote.fetch_and_poll();
//!
//! if remote.get_bool("new_checkout", false) {
//!     println!("timeout: {}", remote.get_number("timeout_ms", 500_u64));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Trust
//!
//! A config is activated only when its `keyId` resolves to a stored key
//! and the signature over the exact response bytes verifies. Unknown keys
//! are fetched once per cycle; a key record whose id differs from the
//! requested one is rejected. Rejected or failed cycles never change the
//! active config.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `SIGNED_CONFIG_URL` | Config service base URL |
//! | `SIGNED_CONFIG_APP_ID` | Application identifier |
//! | `SIGNED_CONFIG_SUBSCRIPTION_KEY` | Subscription key |
//! | `SIGNED_CONFIG_POLL_INTERVAL` | Poll interval in seconds (default: 3600, min: 60) |
//! | `SIGNED_CONFIG_APPLY_IMMEDIATELY` | Activate polled configs mid-session |
//! | `SIGNED_CONFIG_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `SIGNED_CONFIG_CACHE_DIR` | Directory for the cached config |
//! | `SIGNED_CONFIG_KEY_DIR` | Directory for the key store |

pub mod cache;
pub mod client;
pub mod environment;
pub mod error;
pub mod keystore;
pub mod poller;
pub mod remote;
pub mod types;
pub mod verify;

// Re-export main types
pub use cache::{
    ActiveConfig, CacheFile, CacheRecord, ConfigCache, ConfigCacheBuilder, CycleOutcome,
};
pub use client::{ConfigClient, Fetcher, CLIENT_USER_AGENT};
pub use environment::Environment;
pub use error::{ConfigError, ConfigResult};
pub use keystore::{reset_on_first_launch, FileKeyStore, KeyStore, MemoryKeyStore};
pub use poller::{CancelHandle, Poller, Scheduler, TokioScheduler, MIN_POLL_INTERVAL};
pub use remote::RemoteConfig;
pub use types::{ActivationPolicy, ConfigMap, ConfigPayload, KeyRecord, Settings};
pub use verify::{verify_signature, EcdsaP256Verifier, SignatureVerifier};
