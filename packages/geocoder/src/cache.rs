//! Memoization of resolution outcomes.
//!
//! Entries are keyed by a SHA-256 of the exact raw address string (no
//! trimming or case folding, so two spellings never share a key). Both
//! successes and failures are cached, with different TTLs, so repeated
//! listing syncs do not re-query addresses that already failed.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use listing_geocoder_models::CachedOutcome;
use sha2::{Digest as _, Sha256};
use tokio::time::Instant;

use crate::GeocodeError;

/// Prefix for every cache key.
const KEY_PREFIX: &str = "geocode_";

/// Derives the cache key for a raw address.
#[must_use]
pub fn cache_key(raw_address: &str) -> String {
    let digest = Sha256::digest(raw_address.as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(digest))
}

/// TTL-respecting key-value store for resolution outcomes.
///
/// Implementations derive their key with [`cache_key`].
pub trait GeocodeCache: Send + Sync {
    /// Returns the live entry for `raw_address`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Cache`] if the underlying store fails.
    fn get(&self, raw_address: &str) -> Result<Option<CachedOutcome>, GeocodeError>;

    /// Stores `outcome` for `raw_address`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Cache`] if the underlying store fails.
    fn set(
        &self,
        raw_address: &str,
        outcome: &CachedOutcome,
        ttl: Duration,
    ) -> Result<(), GeocodeError>;
}

/// In-process cache. Expired entries are dropped when read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, (Instant, CachedOutcome)>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet read.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Cache`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, GeocodeError> {
        Ok(self.lock()?.len())
    }

    /// Whether the cache holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Cache`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, GeocodeError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (Instant, CachedOutcome)>>, GeocodeError>
    {
        self.entries.lock().map_err(|e| GeocodeError::Cache {
            message: format!("Memory cache lock poisoned: {e}"),
        })
    }
}

impl GeocodeCache for MemoryCache {
    fn get(&self, raw_address: &str) -> Result<Option<CachedOutcome>, GeocodeError> {
        let key = cache_key(raw_address);
        let mut entries = self.lock()?;

        let expired = match entries.get(&key) {
            Some((expires_at, outcome)) if *expires_at > Instant::now() => {
                return Ok(Some(outcome.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(&key);
        }
        Ok(None)
    }

    fn set(
        &self,
        raw_address: &str,
        outcome: &CachedOutcome,
        ttl: Duration,
    ) -> Result<(), GeocodeError> {
        let expires_at = Instant::now() + ttl;
        self.lock()?
            .insert(cache_key(raw_address), (expires_at, outcome.clone()));
        Ok(())
    }
}
