//! Fetch cycle: fetch, resolve key, verify, persist, activate.

use tracing::{debug, error, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ActivationPolicy, ConfigMap, ConfigPayload};

use super::file::CacheRecord;
use super::Inner;

/// How a cycle was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleMode {
    /// Poll tick: conditional request, construction-time policy.
    Poll,
    /// Manual apply: unconditional request, always activates.
    Apply,
}

/// Result of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Verified, persisted and activated.
    Applied(ConfigMap),
    /// Verified and persisted; active from the next start.
    Staged(ConfigMap),
    /// Server reported no change.
    NotModified,
}

/// Whether a missing key may be fetched from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyLookup {
    StoredOnly,
    FetchIfMissing,
}

impl Inner {
    pub(super) async fn run_cycle(&self, mode: CycleMode) -> ConfigResult<CycleOutcome> {
        let _guard = self.cycle_lock.lock().await;

        let etag = match mode {
            CycleMode::Poll => self.persisted_etag(),
            CycleMode::Apply => None,
        };

        let payload = match self.fetcher.fetch_config(etag.as_deref()).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("config not modified");
                return Ok(CycleOutcome::NotModified);
            }
            Err(e) => {
                error!(error = %e, "config fetch failed");
                return Err(e);
            }
        };

        let key_id = payload.key_id.as_deref().unwrap_or("none");
        if let Err(e) = self.verify_payload(&payload, KeyLookup::FetchIfMissing).await {
            error!(
                key_id,
                values = payload.values.len(),
                error = %e,
                "config rejected"
            );
            return Err(e);
        }

        let record = CacheRecord::from_payload(&payload)?;
        if let Err(e) = self.file.write(&record).await {
            error!(key_id, error = %e, "failed to persist config, not activated");
            return Err(e);
        }
        self.set_persisted_etag(payload.etag.clone());

        let policy = match mode {
            CycleMode::Apply => ActivationPolicy::ApplyImmediately,
            CycleMode::Poll => self.policy,
        };

        match policy {
            ActivationPolicy::ApplyImmediately => {
                self.activate(&payload);
                info!(
                    key_id = %record.key_id,
                    values = payload.values.len(),
                    "applied new config"
                );
                Ok(CycleOutcome::Applied(payload.values))
            }
            ActivationPolicy::StageForNextLaunch => {
                info!(
                    key_id = %record.key_id,
                    values = payload.values.len(),
                    "staged new config for next launch"
                );
                Ok(CycleOutcome::Staged(payload.values))
            }
        }
    }

    /// Check the payload's signature against its key.
    pub(super) async fn verify_payload(
        &self,
        payload: &ConfigPayload,
        lookup: KeyLookup,
    ) -> ConfigResult<()> {
        let key_id = payload
            .key_id
            .as_deref()
            .ok_or_else(|| ConfigError::Unsigned {
                reason: "missing key id".to_string(),
            })?;
        let signature = payload
            .signature
            .as_deref()
            .ok_or_else(|| ConfigError::Unsigned {
                reason: "missing signature".to_string(),
            })?;

        let key = self.resolve_key(key_id, lookup).await?;

        if !self.verifier.verify(signature, &payload.raw_bytes, &key) {
            return Err(ConfigError::SignatureInvalid {
                key_id: key_id.to_string(),
            });
        }

        debug!(key_id, "config signature verified");
        Ok(())
    }

    /// Stored key for `key_id`, fetched once if absent and allowed.
    async fn resolve_key(&self, key_id: &str, lookup: KeyLookup) -> ConfigResult<String> {
        if let Some(key) = self.key_store.get(key_id).await? {
            return Ok(key);
        }

        if lookup == KeyLookup::StoredOnly {
            return Err(ConfigError::KeyNotTrusted {
                key_id: key_id.to_string(),
            });
        }

        debug!(key_id, "key not stored, fetching");
        let record = self.fetcher.fetch_key(key_id).await?;

        if record.id != key_id {
            error!(
                requested = key_id,
                received = %record.id,
                "key endpoint returned a different key id"
            );
            return Err(ConfigError::KeyMismatch {
                requested: key_id.to_string(),
                received: record.id,
            });
        }

        self.key_store.put(&record.id, &record.key).await?;
        info!(key_id, "stored new verification key");
        Ok(record.key)
    }
}
