#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding for real-estate listing addresses.
//!
//! Resolves unstructured, often malformed Canadian mailing addresses to
//! coordinates:
//!
//! 1. [`address`] parses the raw string into components, stripping unit,
//!    floor, and area-code noise using the lookup [`tables`].
//! 2. [`variants`] composes an ordered list of query strings.
//! 3. [`resolver`] walks a tiered cascade (direct → alternate/structured →
//!    degraded → fallback) against a [`backend::GeocodingBackend`],
//!    spacing calls through a shared [`rate_limit::RateLimiter`] and
//!    memoizing outcomes in a [`cache::GeocodeCache`].
//!
//! Backends are described by TOML files in `services/` (see
//! [`service_registry`]); resolver tuning lives in `config/resolver.toml`
//! (see [`config`]).

pub mod address;
pub mod backend;
pub mod cache;
pub mod config;
pub mod nominatim;
pub mod pelias;
pub mod rate_limit;
pub mod resolver;
pub mod service_registry;
pub mod tables;
pub mod variants;

pub use listing_geocoder_models::{
    AddressComponents, CachedOutcome, CountryBias, GeocodeResult, ServiceUsed,
};
pub use resolver::GeocodingResolver;

use thiserror::Error;

/// A single backend match.
#[derive(Debug, Clone)]
pub struct GeocodedAddress {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// The backend's label for the match.
    pub matched_address: Option<String>,
    /// Which provider answered.
    pub provider: GeocodingProvider,
}

/// Which geocoding provider answered a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodingProvider {
    /// Nominatim / OpenStreetMap.
    Nominatim,
    /// Self-hosted Pelias geocoder.
    Pelias,
    /// Test double or other in-process backend.
    Custom,
}

/// Errors from geocoding operations.
///
/// None of these escape [`GeocodingResolver::resolve`]; a failed backend
/// call only rejects the query that caused it.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed (connection, TLS, non-success status).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The request did not complete within its timeout.
    #[error("Request timed out")]
    Timeout,

    /// The backend has no structured query mode.
    #[error("Structured queries are not supported by this backend")]
    Unsupported,

    /// The cache store failed.
    #[error("Cache error: {message}")]
    Cache {
        /// Description of the cache failure.
        message: String,
    },

    /// Configuration could not be loaded.
    #[error("Config error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },
}
