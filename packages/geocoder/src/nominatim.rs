//! Nominatim / OpenStreetMap geocoder client.
//!
//! The default backend. The public instance allows **1 request per
//! second** and requires an identifying `User-Agent`; the resolver's
//! shared rate limiter enforces the former, [`NominatimBackend::new`]
//! sets the latter.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{GeocodingBackend, StructuredQuery};
use crate::{GeocodeError, GeocodedAddress, GeocodingProvider};

/// Nominatim search endpoint client.
#[derive(Debug, Clone)]
pub struct NominatimBackend {
    client: reqwest::Client,
    base_url: String,
    email: Option<String>,
}

impl NominatimBackend {
    /// Builds a client with its own per-request timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        email: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, base_url, email))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        email: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            email,
        }
    }
}

#[async_trait]
impl GeocodingBackend for NominatimBackend {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn search(
        &self,
        query: &str,
        country_code: &str,
    ) -> Result<Option<GeocodedAddress>, GeocodeError> {
        geocode_freeform(
            &self.client,
            &self.base_url,
            query,
            country_code,
            self.email.as_deref(),
        )
        .await
    }

    fn supports_structured(&self) -> bool {
        true
    }

    async fn search_structured(
        &self,
        query: &StructuredQuery,
        country_code: &str,
    ) -> Result<Option<GeocodedAddress>, GeocodeError> {
        geocode_structured(
            &self.client,
            &self.base_url,
            query,
            country_code,
            self.email.as_deref(),
        )
        .await
    }
}

/// Geocodes a free-form query.
///
/// The caller is responsible for rate limiting.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP request or response parsing fails.
pub async fn geocode_freeform(
    client: &reqwest::Client,
    base_url: &str,
    query: &str,
    country_code: &str,
    email: Option<&str>,
) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let mut params = vec![
        ("q", query),
        ("countrycodes", country_code),
        ("format", "jsonv2"),
        ("limit", "1"),
    ];
    if let Some(email) = email {
        params.push(("email", email));
    }

    send(client.get(base_url).query(&params)).await
}

/// Geocodes a field-decomposed address using the structured parameters.
///
/// The caller is responsible for rate limiting.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP request or response parsing fails.
pub async fn geocode_structured(
    client: &reqwest::Client,
    base_url: &str,
    query: &StructuredQuery,
    country_code: &str,
    email: Option<&str>,
) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let mut params = vec![
        ("street", query.street.as_str()),
        ("city", query.city.as_str()),
        ("countrycodes", country_code),
        ("format", "jsonv2"),
        ("limit", "1"),
    ];
    if let Some(province) = query.province.as_deref() {
        params.push(("state", province));
    }
    if let Some(postal_code) = query.postal_code.as_deref() {
        params.push(("postalcode", postal_code));
    }
    if let Some(email) = email {
        params.push(("email", email));
    }
    params.retain(|(_, value)| !value.is_empty());

    send(client.get(base_url).query(&params)).await
}

async fn send(request: reqwest::RequestBuilder) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() {
            GeocodeError::Timeout
        } else {
            GeocodeError::Http(e)
        }
    })?;

    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GeocodeError::RateLimited);
    }

    let resp = resp.error_for_status()?;
    let body: serde_json::Value = resp.json().await?;
    parse_response(&body)
}

/// Parses Nominatim JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = first["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lat in Nominatim response".to_string(),
        })?;

    let lon = first["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lon in Nominatim response".to_string(),
        })?;

    let display_name = first["display_name"].as_str().map(String::from);

    Ok(Some(GeocodedAddress {
        latitude: lat,
        longitude: lon,
        matched_address: display_name,
        provider: GeocodingProvider::Nominatim,
    }))
}
