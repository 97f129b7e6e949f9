#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persistent storage for the listing geocoder.
//!
//! [`geocode_cache::DuckDbGeocodeCache`] keeps resolution outcomes in a
//! local `DuckDB` file so they survive restarts and are shared by every
//! process pointed at the same data directory. [`paths`] names that
//! directory.

pub mod geocode_cache;
pub mod paths;

pub use geocode_cache::DuckDbGeocodeCache;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query or connection error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

impl From<DbError> for listing_geocoder::GeocodeError {
    fn from(e: DbError) -> Self {
        Self::Cache {
            message: e.to_string(),
        }
    }
}
