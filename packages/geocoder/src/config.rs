//! Resolver tuning.
//!
//! Defaults live in `config/resolver.toml`, embedded at compile time. A
//! deployment can point `GEOCODER_CONFIG` at its own TOML file; any key
//! it omits keeps the built-in default.

use std::path::Path;
use std::time::Duration;

use listing_geocoder_models::CountryBias;
use serde::Deserialize;

use crate::GeocodeError;

/// Environment variable naming a resolver config file.
pub const CONFIG_ENV: &str = "GEOCODER_CONFIG";

const DEFAULT_TOML: &str = include_str!("../config/resolver.toml");

/// Knobs for [`crate::GeocodingResolver`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// ISO country code every query is restricted to.
    pub country_code: String,
    /// Country name appended to composed variants.
    pub country_name: String,
    /// Province assumed when an address has none.
    pub default_province: String,
    /// Latitude returned on fallback.
    pub default_latitude: f64,
    /// Longitude returned on fallback.
    pub default_longitude: f64,
    /// Degrees within which a backend answer counts as the default
    /// coordinate and is rejected.
    pub collision_tolerance: f64,
    /// Minimum spacing between backend calls.
    pub rate_limit_ms: u64,
    /// Extra wait after the backend signals rate limiting.
    pub rate_limit_cooldown_secs: u64,
    /// Timeout applied to every backend call.
    pub request_timeout_secs: u64,
    /// Upper bound on one whole resolution. `None` disables it.
    pub resolve_deadline_secs: Option<u64>,
    /// Lifetime of a cached success.
    pub success_ttl_secs: u64,
    /// Lifetime of a cached failure.
    pub failure_ttl_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            country_code: "ca".to_string(),
            country_name: "Canada".to_string(),
            default_province: "ON".to_string(),
            default_latitude: 43.6532,
            default_longitude: -79.3832,
            collision_tolerance: 0.01,
            rate_limit_ms: 1000,
            rate_limit_cooldown_secs: 60,
            request_timeout_secs: 10,
            resolve_deadline_secs: Some(120),
            success_ttl_secs: 7 * 24 * 60 * 60,
            failure_ttl_secs: 60 * 60,
        }
    }
}

impl ResolverConfig {
    /// Parses a TOML document; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Config`] if the document is not valid TOML
    /// or a value has the wrong type.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, GeocodeError> {
        toml::de::from_str(toml_str).map_err(|e| GeocodeError::Config {
            message: format!("Invalid resolver config: {e}"),
        })
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, GeocodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| GeocodeError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The embedded `config/resolver.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Config`] if the embedded file is malformed.
    pub fn embedded() -> Result<Self, GeocodeError> {
        Self::from_toml_str(DEFAULT_TOML)
    }

    /// Loads the file named by `GEOCODER_CONFIG`, or the embedded default.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Config`] if the chosen file cannot be read
    /// or parsed.
    pub fn from_env() -> Result<Self, GeocodeError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => {
                log::info!("Loading resolver config from {path}");
                Self::from_file(Path::new(&path))
            }
            _ => Self::embedded(),
        }
    }

    /// Country restriction, suffix, and default province for variant
    /// composition.
    #[must_use]
    pub fn bias(&self) -> CountryBias {
        CountryBias {
            code: self.country_code.clone(),
            name: self.country_name.clone(),
            province: self.default_province.to_uppercase(),
        }
    }

    /// Minimum spacing between backend calls.
    #[must_use]
    pub const fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    /// Wait imposed after a rate-limit signal.
    #[must_use]
    pub const fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whole-resolution deadline, if any.
    #[must_use]
    pub fn resolve_deadline(&self) -> Option<Duration> {
        self.resolve_deadline_secs.map(Duration::from_secs)
    }

    /// TTL for cached successes.
    #[must_use]
    pub const fn success_ttl(&self) -> Duration {
        Duration::from_secs(self.success_ttl_secs)
    }

    /// TTL for cached failures.
    #[must_use]
    pub const fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl_secs)
    }

    /// Whether `(lat, lng)` is within tolerance of the default coordinate.
    #[must_use]
    pub fn is_default_coordinate(&self, lat: f64, lng: f64) -> bool {
        (lat - self.default_latitude).abs() < self.collision_tolerance
            && (lng - self.default_longitude).abs() < self.collision_tolerance
    }
}
