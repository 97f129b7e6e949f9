//! Pelias geocoder client for self-hosted instances.
//!
//! Pelias exposes `/v1/search` (free text) and `/v1/search/structured`
//! endpoints that return `GeoJSON` `FeatureCollection` responses. A
//! self-hosted instance has no external rate limit, but the resolver
//! still spaces calls through its shared limiter.
//!
//! When the instance sits behind Cloudflare Zero Trust Access, set
//! `CF_ACCESS_CLIENT_ID` and `CF_ACCESS_CLIENT_SECRET`; the client sends
//! the matching headers on every request.
//!
//! See <https://github.com/pelias/documentation/blob/master/search.md>

use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{GeocodingBackend, StructuredQuery};
use crate::{GeocodeError, GeocodedAddress, GeocodingProvider};

/// Cloudflare Access service-token credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfAccessCredentials {
    /// Value for the `CF-Access-Client-Id` header.
    pub client_id: String,
    /// Value for the `CF-Access-Client-Secret` header.
    pub client_secret: String,
}

/// Reads Cloudflare Access credentials from environment variables.
///
/// Returns `Some` only when both variables are set and non-empty.
#[must_use]
pub fn cf_access_credentials_from_env() -> Option<CfAccessCredentials> {
    let client_id = std::env::var("CF_ACCESS_CLIENT_ID").ok()?;
    let client_secret = std::env::var("CF_ACCESS_CLIENT_SECRET").ok()?;
    if client_id.is_empty() || client_secret.is_empty() {
        return None;
    }
    Some(CfAccessCredentials {
        client_id,
        client_secret,
    })
}

/// Pelias API client.
#[derive(Debug, Clone)]
pub struct PeliasBackend {
    client: reqwest::Client,
    base_url: String,
}

impl PeliasBackend {
    /// Builds a client with its own per-request timeout, attaching
    /// Cloudflare Access headers when `credentials` is given.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built,
    /// or [`GeocodeError::Config`] if a credential is not a valid header
    /// value.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Option<&CfAccessCredentials>,
    ) -> Result<Self, GeocodeError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(creds) = credentials {
            headers.insert("CF-Access-Client-Id", header_value(&creds.client_id)?);
            headers.insert("CF-Access-Client-Secret", header_value(&creds.client_secret)?);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl GeocodingBackend for PeliasBackend {
    fn name(&self) -> &str {
        "pelias"
    }

    async fn search(
        &self,
        query: &str,
        country_code: &str,
    ) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let url = format!("{}/v1/search", self.base_url);
        let req = self.client.get(&url).query(&[
            ("text", query),
            ("boundary.country", country_code),
            ("size", "1"),
        ]);
        send(req).await
    }

    fn supports_structured(&self) -> bool {
        true
    }

    async fn search_structured(
        &self,
        query: &StructuredQuery,
        country_code: &str,
    ) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let url = format!("{}/v1/search/structured", self.base_url);
        let mut params = vec![
            ("address", query.street.as_str()),
            ("locality", query.city.as_str()),
            ("country", country_code),
            ("size", "1"),
        ];
        if let Some(province) = query.province.as_deref() {
            params.push(("region", province));
        }
        if let Some(postal_code) = query.postal_code.as_deref() {
            params.push(("postalcode", postal_code));
        }
        params.retain(|(_, value)| !value.is_empty());

        send(self.client.get(&url).query(&params)).await
    }
}

fn header_value(value: &str) -> Result<reqwest::header::HeaderValue, GeocodeError> {
    reqwest::header::HeaderValue::from_str(value).map_err(|e| GeocodeError::Config {
        message: format!("Invalid Cloudflare Access header value: {e}"),
    })
}

async fn send(req: reqwest::RequestBuilder) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let resp = req.send().await.map_err(|e| {
        if e.is_timeout() {
            GeocodeError::Timeout
        } else {
            GeocodeError::Http(e)
        }
    })?;

    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GeocodeError::RateLimited);
    }

    if !resp.status().is_success() {
        return Err(GeocodeError::Parse {
            message: format!("Pelias returned status {}", resp.status()),
        });
    }

    let body: serde_json::Value = resp.json().await?;
    parse_response(&body)
}

/// Parses a Pelias `GeoJSON` `FeatureCollection` response.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let features = body
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Pelias response missing 'features' array".to_string(),
        })?;

    let Some(first) = features.first() else {
        return Ok(None);
    };

    let coords = first
        .pointer("/geometry/coordinates")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Feature missing geometry.coordinates".to_string(),
        })?;

    let [lng, lat, ..] = coords.as_slice() else {
        return Err(GeocodeError::Parse {
            message: "coordinates array has fewer than 2 elements".to_string(),
        });
    };

    let lng = lng.as_f64().ok_or_else(|| GeocodeError::Parse {
        message: "longitude is not a number".to_string(),
    })?;
    let lat = lat.as_f64().ok_or_else(|| GeocodeError::Parse {
        message: "latitude is not a number".to_string(),
    })?;

    let label = first
        .pointer("/properties/label")
        .and_then(serde_json::Value::as_str)
        .map(String::from);

    Ok(Some(GeocodedAddress {
        latitude: lat,
        longitude: lng,
        matched_address: label,
        provider: GeocodingProvider::Pelias,
    }))
}
