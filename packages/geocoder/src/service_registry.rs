//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding provider is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`] and [`enabled_services`]; [`build_backend`] turns one
//! into a ready [`GeocodingBackend`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::GeocodeError;
use crate::backend::GeocodingBackend;
use crate::nominatim::NominatimBackend;
use crate::pelias::{PeliasBackend, cf_access_credentials_from_env};

/// Environment variable overriding the selected service's base URL.
pub const BASE_URL_ENV: &str = "GEOCODER_BASE_URL";

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"nominatim"`, `"pelias"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service may be selected by [`enabled_services`].
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Selection order, lower values first.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Nominatim / `OpenStreetMap` geocoder.
    Nominatim {
        /// Search endpoint (e.g., `"https://nominatim.openstreetmap.org/search"`).
        base_url: String,
        /// Identifying `User-Agent`, required by the public instance.
        user_agent: String,
        /// Contact address sent with each request.
        #[serde(default)]
        email: Option<String>,
    },
    /// Self-hosted Pelias geocoder.
    Pelias {
        /// API base URL (e.g., `"http://localhost:4000"`).
        base_url: String,
    },
}

const fn default_true() -> bool {
    true
}

impl GeocodingService {
    /// Returns the provider's base URL regardless of variant.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Nominatim { base_url, .. } | ProviderConfig::Pelias { base_url } => {
                base_url
            }
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("nominatim", include_str!("../services/nominatim.toml")),
    ("pelias", include_str!("../services/pelias.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 2;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Looks up a service by id, enabled or not.
#[must_use]
pub fn service_by_id(id: &str) -> Option<GeocodingService> {
    all_services().into_iter().find(|s| s.id == id)
}

/// Builds the backend for the highest-priority enabled service.
///
/// # Errors
///
/// Returns [`GeocodeError::Config`] if no service is enabled, or any error
/// from [`build_backend`].
pub fn default_backend(timeout: Duration) -> Result<Arc<dyn GeocodingBackend>, GeocodeError> {
    let service = enabled_services()
        .into_iter()
        .next()
        .ok_or_else(|| GeocodeError::Config {
            message: "No geocoding service is enabled".to_string(),
        })?;
    build_backend(&service, timeout)
}

/// Constructs the backend described by `service`.
///
/// `GEOCODER_BASE_URL`, when set and non-empty, replaces the configured
/// base URL.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP client cannot be built.
pub fn build_backend(
    service: &GeocodingService,
    timeout: Duration,
) -> Result<Arc<dyn GeocodingBackend>, GeocodeError> {
    let base_url = std::env::var(BASE_URL_ENV)
        .ok()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| service.base_url().to_string());

    log::debug!("Using geocoding service '{}' at {base_url}", service.id);

    Ok(match &service.provider {
        ProviderConfig::Nominatim {
            user_agent, email, ..
        } => Arc::new(NominatimBackend::new(
            base_url,
            user_agent,
            email.clone(),
            timeout,
        )?),
        ProviderConfig::Pelias { .. } => {
            let creds = cf_access_credentials_from_env();
            if creds.is_some() {
                log::info!("Pelias: using Cloudflare Access credentials");
            }
            Arc::new(PeliasBackend::new(base_url, timeout, creds.as_ref())?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn loads_all_services() {
        let services = all_services();
        assert_eq!(services.len(), EXPECTED_SERVICE_COUNT);
    }

    #[test]
    fn service_ids_are_unique() {
        let services = all_services();
        let mut seen = BTreeSet::new();
        for svc in &services {
            assert!(seen.insert(&svc.id), "Duplicate service ID: {}", svc.id);
        }
    }

    #[test]
    fn all_services_have_required_fields() {
        for svc in &all_services() {
            assert!(!svc.id.is_empty(), "Service has empty id");
            assert!(!svc.name.is_empty(), "Service {} has empty name", svc.id);
            assert!(
                !svc.base_url().is_empty(),
                "Service {} has empty base_url",
                svc.id
            );
        }
    }

    #[test]
    fn enabled_services_sorted_by_priority() {
        let services = enabled_services();
        for window in services.windows(2) {
            assert!(
                window[0].priority <= window[1].priority,
                "Services not sorted by priority: {} ({}) > {} ({})",
                window[0].id,
                window[0].priority,
                window[1].id,
                window[1].priority
            );
        }
    }

    #[test]
    fn nominatim_is_the_default_service() {
        let first = enabled_services().into_iter().next().unwrap();
        assert_eq!(first.id, "nominatim");
        let ProviderConfig::Nominatim { user_agent, .. } = &first.provider else {
            panic!("expected a nominatim provider");
        };
        assert!(!user_agent.is_empty());
    }

    #[test]
    fn builds_every_registered_backend() {
        for svc in &all_services() {
            let backend = build_backend(svc, Duration::from_secs(10)).unwrap();
            assert_eq!(backend.name(), svc.id);
        }
    }

    #[test]
    fn finds_disabled_service_by_id() {
        let pelias = service_by_id("pelias").unwrap();
        assert!(!pelias.enabled);
        assert!(service_by_id("mapbox").is_none());
    }
}
