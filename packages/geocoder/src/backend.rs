//! The seam between the resolver and a geocoding service.

use async_trait::async_trait;

use crate::{GeocodeError, GeocodedAddress};

/// A field-decomposed query for backends with a structured search mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredQuery {
    /// House number and street (`"123 Main Street East"`).
    pub street: String,
    /// Municipality.
    pub city: String,
    /// Province code or name.
    pub province: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
}

impl StructuredQuery {
    /// One-line description used in logs and `address_used`.
    #[must_use]
    pub fn describe(&self) -> String {
        [
            Some(self.street.as_str()),
            Some(self.city.as_str()),
            self.province.as_deref(),
            self.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// A geocoding service returning at most one best match per query.
///
/// Implementations do not rate limit; the resolver acquires its shared
/// limiter before every call.
#[async_trait]
pub trait GeocodingBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Free-text search restricted to `country_code`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails, the service signals
    /// rate limiting, or the response cannot be parsed.
    async fn search(
        &self,
        query: &str,
        country_code: &str,
    ) -> Result<Option<GeocodedAddress>, GeocodeError>;

    /// Whether [`GeocodingBackend::search_structured`] is implemented.
    fn supports_structured(&self) -> bool {
        false
    }

    /// Field-based search restricted to `country_code`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Unsupported`] unless overridden, otherwise
    /// the same errors as [`GeocodingBackend::search`].
    async fn search_structured(
        &self,
        query: &StructuredQuery,
        country_code: &str,
    ) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let _ = (query, country_code);
        Err(GeocodeError::Unsupported)
    }
}
