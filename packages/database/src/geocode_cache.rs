//! Geocoding outcome cache stored in `DuckDB`.
//!
//! Caches both successful resolutions (with coordinates and the tier that
//! produced them) and failed ones (null coordinates) so repeated listing
//! syncs don't re-query the same addresses. Every row carries an absolute
//! expiry; expired rows read as absent and are removed lazily or by
//! [`DuckDbGeocodeCache::purge_expired`].

use std::path::Path;
use std::str::FromStr as _;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::{Connection, params};
use listing_geocoder::GeocodeError;
use listing_geocoder::cache::{GeocodeCache, cache_key};
use listing_geocoder_models::{CachedOutcome, GeocodeResult, ServiceUsed};

use crate::DbError;

/// `DuckDB` implementation of [`GeocodeCache`].
///
/// `DuckDB` connections are not `Sync`, so access goes through a mutex.
pub struct DuckDbGeocodeCache {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for DuckDbGeocodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbGeocodeCache").finish_non_exhaustive()
    }
}

/// One stored row, before conversion to a [`CachedOutcome`].
struct CacheRow {
    success: bool,
    lat: Option<f64>,
    lng: Option<f64>,
    service_used: Option<String>,
    address_used: Option<String>,
    display_name: Option<String>,
    expires_at: i64,
}

impl DuckDbGeocodeCache {
    /// Opens (or creates) the geocode cache `DuckDB`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the directory, connection, or schema creation
    /// fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        log::debug!("Opening geocode cache at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens the geocode cache at the default path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_default() -> Result<Self, DbError> {
        Self::open(&crate::paths::geocode_cache_db_path())
    }

    /// Opens a throwaway in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deletes every expired row, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    pub fn purge_expired(&self) -> Result<usize, DbError> {
        self.purge_expired_at(Utc::now())
    }

    /// Number of stored rows, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn count(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM geocode_cache", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| DbError::Conversion {
            message: format!("Invalid row count {count}: {e}"),
        })
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize, DbError> {
        let removed = self.conn().execute(
            "DELETE FROM geocode_cache WHERE expires_at <= ?",
            params![now.timestamp_millis()],
        )?;
        if removed > 0 {
            log::info!("Purged {removed} expired geocode cache entries");
        }
        Ok(removed)
    }

    fn lookup_at(
        &self,
        raw_address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedOutcome>, DbError> {
        let key = cache_key(raw_address);
        let conn = self.conn();

        let row = conn.query_row(
            "SELECT success, lat, lng, service_used, address_used, display_name, expires_at
             FROM geocode_cache
             WHERE address_key = ?",
            params![key],
            |row| {
                Ok(CacheRow {
                    success: row.get(0)?,
                    lat: row.get(1)?,
                    lng: row.get(2)?,
                    service_used: row.get(3)?,
                    address_used: row.get(4)?,
                    display_name: row.get(5)?,
                    expires_at: row.get(6)?,
                })
            },
        );
        let row = match row {
            Ok(row) => row,
            Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(DbError::DuckDb(e)),
        };

        if row.expires_at <= now.timestamp_millis() {
            conn.execute(
                "DELETE FROM geocode_cache WHERE address_key = ?",
                params![key],
            )?;
            return Ok(None);
        }

        to_outcome(row).map(Some)
    }

    fn store_at(
        &self,
        raw_address: &str,
        outcome: &CachedOutcome,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let now_ms = now.timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_ms.saturating_add(ttl_ms);

        let (success, result) = match outcome {
            CachedOutcome::Success(result) => (true, Some(result)),
            CachedOutcome::Failure => (false, None),
        };

        self.conn().execute(
            "INSERT OR REPLACE INTO geocode_cache
                (address_key, success, lat, lng, service_used, address_used, display_name,
                 expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                cache_key(raw_address),
                success,
                result.map(|r| r.lat),
                result.map(|r| r.lng),
                result.map(|r| r.service_used.as_ref()),
                result.map(|r| r.address_used.as_str()),
                result.and_then(|r| r.display_name.as_deref()),
                expires_at,
                now_ms,
            ],
        )?;
        Ok(())
    }
}

impl GeocodeCache for DuckDbGeocodeCache {
    fn get(&self, raw_address: &str) -> Result<Option<CachedOutcome>, GeocodeError> {
        Ok(self.lookup_at(raw_address, Utc::now())?)
    }

    fn set(
        &self,
        raw_address: &str,
        outcome: &CachedOutcome,
        ttl: Duration,
    ) -> Result<(), GeocodeError> {
        Ok(self.store_at(raw_address, outcome, ttl, Utc::now())?)
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS geocode_cache (
            address_key TEXT PRIMARY KEY,
            success BOOLEAN NOT NULL,
            lat DOUBLE,
            lng DOUBLE,
            service_used TEXT,
            address_used TEXT,
            display_name TEXT,
            expires_at BIGINT NOT NULL,
            created_at BIGINT NOT NULL
        );",
    )?;
    Ok(())
}

fn to_outcome(row: CacheRow) -> Result<CachedOutcome, DbError> {
    if !row.success {
        return Ok(CachedOutcome::Failure);
    }

    let (Some(lat), Some(lng)) = (row.lat, row.lng) else {
        return Err(DbError::Conversion {
            message: "Cached success has no coordinates".to_string(),
        });
    };

    let service = row.service_used.unwrap_or_default();
    let service_used = ServiceUsed::from_str(&service).map_err(|e| DbError::Conversion {
        message: format!("Unknown service_used '{service}': {e}"),
    })?;

    Ok(CachedOutcome::Success(GeocodeResult::matched(
        lat,
        lng,
        service_used,
        row.address_used.unwrap_or_default(),
        row.display_name,
    )))
}
