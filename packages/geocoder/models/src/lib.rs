#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the listing geocoder.
//!
//! This crate contains only data types and simple accessors. It has no
//! heavyweight dependencies (no HTTP, no regex, no storage).

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Province used when an address does not name one.
pub const DEFAULT_PROVINCE: &str = "ON";

/// Country used when an address does not name one.
pub const DEFAULT_COUNTRY: &str = "Canada";

/// A raw mailing address decomposed into its parts.
///
/// `street_type` and `direction` hold the canonical abbreviation
/// (`"St"`, `"E"`); variant builders expand them as needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressComponents {
    /// Civic number, including a letter suffix (`"12A"`).
    pub house_number: Option<String>,
    /// Street name without type or direction (`"Queen"`).
    pub street_name: String,
    /// Street type abbreviation (`"St"`, `"Ave"`).
    pub street_type: Option<String>,
    /// Direction abbreviation (`"E"`, `"NW"`).
    pub direction: Option<String>,
    /// Unit / apartment / floor designator. Kept for display only.
    pub unit: Option<String>,
    /// Municipality.
    pub city: String,
    /// Two-letter province code.
    pub province: Option<String>,
    /// Postal code formatted as `"A1A 1A1"`.
    pub postal_code: Option<String>,
    /// Country name.
    pub country: Option<String>,
}

impl AddressComponents {
    /// Province code, defaulting to `fallback` when the address had none.
    #[must_use]
    pub fn province_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.province.as_deref().unwrap_or(fallback)
    }

    /// Country name, defaulting to `fallback` when the address had none.
    #[must_use]
    pub fn country_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.country.as_deref().unwrap_or(fallback)
    }

    /// Whether a building-level (house + street + city) query can be built.
    #[must_use]
    pub fn has_building(&self) -> bool {
        self.house_number.as_deref().is_some_and(|h| !h.is_empty())
            && !self.street_name.is_empty()
            && !self.city.is_empty()
    }

    /// Whether every field is empty (the parse of a blank string).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Country restriction applied to every backend query, plus the
/// defaults filled into addresses that omit their region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryBias {
    /// ISO 3166-1 alpha-2 code, lowercase (`"ca"`), sent with every query.
    pub code: String,
    /// Country name appended to composed variants (`"Canada"`).
    pub name: String,
    /// Province code assumed when an address names none (`"ON"`).
    pub province: String,
}

impl Default for CountryBias {
    fn default() -> Self {
        Self {
            code: "ca".to_string(),
            name: DEFAULT_COUNTRY.to_string(),
            province: DEFAULT_PROVINCE.to_string(),
        }
    }
}

/// Which cascade tier produced a [`GeocodeResult`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceUsed {
    /// Free-text query of a composed variant.
    Direct,
    /// Free-text query with the country suffix removed.
    Alternate,
    /// Field-decomposed query.
    Structured,
    /// Street and city only.
    StreetCity,
    /// Postal code only.
    PostalCode,
    /// City centroid. Lowest-confidence match.
    CityLevel,
    /// Nothing matched; default coordinate.
    Fallback,
}

impl ServiceUsed {
    /// Whether callers should treat a match from this tier as a hint
    /// rather than an authoritative building location.
    #[must_use]
    pub const fn is_low_confidence(self) -> bool {
        matches!(self, Self::PostalCode | Self::CityLevel | Self::Fallback)
    }
}

/// Outcome of a single `resolve()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    /// Whether a backend match was accepted.
    pub success: bool,
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lng: f64,
    /// Tier that produced the coordinate.
    pub service_used: ServiceUsed,
    /// Query string that matched, or a description of the fallback.
    pub address_used: String,
    /// Backend's label for the matched location.
    pub display_name: Option<String>,
}

impl GeocodeResult {
    /// A successful match.
    #[must_use]
    pub fn matched(
        lat: f64,
        lng: f64,
        service_used: ServiceUsed,
        address_used: impl Into<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            success: true,
            lat,
            lng,
            service_used,
            address_used: address_used.into(),
            display_name,
        }
    }

    /// The default-coordinate result returned once every tier failed.
    #[must_use]
    pub fn fallback(lat: f64, lng: f64, address_used: impl Into<String>) -> Self {
        Self {
            success: false,
            lat,
            lng,
            service_used: ServiceUsed::Fallback,
            address_used: address_used.into(),
            display_name: None,
        }
    }
}

/// A memoized resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CachedOutcome {
    /// A previously accepted match.
    Success(GeocodeResult),
    /// Every tier failed last time.
    Failure,
}
