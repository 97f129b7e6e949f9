//! Tiered geocoding cascade.
//!
//! [`GeocodingResolver::resolve`] walks these tiers in order, stopping at
//! the first accepted match:
//!
//! | Tier | Queries | `service_used` |
//! | --- | --- | --- |
//! | cache | stored outcome for the exact raw string | as stored |
//! | direct | every variant from [`variants::normalize`] | `direct` |
//! | alternate | each variant with the country suffix removed | `alternate` |
//! | structured | street/city/province/postal fields, if supported | `structured` |
//! | degraded | street + city, postal code, city | `street_city`, `postal_code`, `city_level` |
//! | fallback | none; default coordinate | `fallback` |
//!
//! A backend error, timeout, empty answer, or an answer at the default
//! coordinate only rejects the query that produced it. Nothing escapes
//! `resolve`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use listing_geocoder_models::{
    AddressComponents, CachedOutcome, CountryBias, GeocodeResult, ServiceUsed,
};
use tokio::time::Instant;

use crate::backend::{GeocodingBackend, StructuredQuery};
use crate::cache::GeocodeCache;
use crate::config::ResolverConfig;
use crate::rate_limit::RateLimiter;
use crate::{GeocodeError, GeocodedAddress, address, service_registry, variants};

type KeyLocks = Mutex<BTreeMap<String, Weak<tokio::sync::Mutex<()>>>>;

/// Resolves raw listing addresses to coordinates.
///
/// Cloning is cheap; clones share the backend, cache, rate limiter, and
/// in-flight bookkeeping, so concurrent resolutions from many tasks still
/// respect one request budget.
#[derive(Clone)]
pub struct GeocodingResolver {
    backend: Arc<dyn GeocodingBackend>,
    cache: Arc<dyn GeocodeCache>,
    limiter: Arc<RateLimiter>,
    config: Arc<ResolverConfig>,
    bias: Arc<CountryBias>,
    in_flight: Arc<KeyLocks>,
}

impl std::fmt::Debug for GeocodingResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodingResolver")
            .field("backend", &self.backend.name())
            .field("limiter", &self.limiter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One query sent during a resolution.
#[derive(Debug, Clone, Copy)]
enum Query<'a> {
    Text(&'a str),
    Structured(&'a StructuredQuery),
}

impl Query<'_> {
    fn key(self) -> String {
        match self {
            Self::Text(q) => q.to_string(),
            Self::Structured(q) => format!("structured:{}", q.describe()),
        }
    }
}

/// Per-resolution bookkeeping.
#[derive(Debug)]
struct Attempt {
    deadline: Option<Instant>,
    tried: BTreeSet<String>,
    calls: usize,
}

impl Attempt {
    fn new(deadline: Option<Duration>) -> Self {
        Self {
            deadline: deadline.map(|d| Instant::now() + d),
            tried: BTreeSet::new(),
            calls: 0,
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

impl GeocodingResolver {
    /// Creates a resolver from its collaborators.
    #[must_use]
    pub fn new(
        backend: Arc<dyn GeocodingBackend>,
        cache: Arc<dyn GeocodeCache>,
        limiter: Arc<RateLimiter>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            limiter,
            bias: Arc::new(config.bias()),
            config: Arc::new(config),
            in_flight: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Creates a resolver for the highest-priority enabled service in the
    /// registry, with a rate limiter built from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if no service is enabled or its client
    /// cannot be built.
    pub fn from_registry(
        config: ResolverConfig,
        cache: Arc<dyn GeocodeCache>,
    ) -> Result<Self, GeocodeError> {
        let backend = service_registry::default_backend(config.request_timeout())?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_interval()));
        Ok(Self::new(backend, cache, limiter, config))
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves one raw address. Always returns a result; a failed
    /// resolution has `success == false` and the default coordinate.
    pub async fn resolve(&self, raw_address: &str) -> GeocodeResult {
        if raw_address.trim().is_empty() {
            log::debug!("Empty address, returning fallback");
            return self.fallback("Empty address");
        }

        // Serialize resolutions of the same address so the second caller
        // reads what the first one cached.
        let key_lock = self.key_lock(raw_address);
        let _guard = key_lock.lock().await;

        match self.cached(raw_address) {
            Some(CachedOutcome::Success(result)) => {
                log::debug!(
                    "Cache hit for '{raw_address}' ({})",
                    result.service_used.as_ref()
                );
                return result;
            }
            Some(CachedOutcome::Failure) => {
                log::debug!("Cached failure for '{raw_address}', skipping backend");
                return self.exhausted(raw_address);
            }
            None => {}
        }

        let mut attempt = Attempt::new(self.config.resolve_deadline());
        match self.cascade(raw_address, &mut attempt).await {
            Some(result) => {
                log::info!(
                    "Geocoded '{raw_address}' via {} ({:.5}, {:.5}) after {} call(s)",
                    result.service_used.as_ref(),
                    result.lat,
                    result.lng,
                    attempt.calls
                );
                self.store(
                    raw_address,
                    &CachedOutcome::Success(result.clone()),
                    self.config.success_ttl(),
                );
                result
            }
            None => {
                log::warn!(
                    "All geocoding strategies failed for '{raw_address}' after {} call(s)",
                    attempt.calls
                );
                self.store(
                    raw_address,
                    &CachedOutcome::Failure,
                    self.config.failure_ttl(),
                );
                self.exhausted(raw_address)
            }
        }
    }

    /// Resolves a batch in input order. Calls share the rate limiter and
    /// cache, so repeated addresses cost one lookup.
    pub async fn resolve_many<I, S>(&self, raw_addresses: I) -> Vec<GeocodeResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = Vec::new();
        for raw in raw_addresses {
            results.push(self.resolve(raw.as_ref()).await);
        }
        results
    }

    async fn cascade(&self, raw: &str, attempt: &mut Attempt) -> Option<GeocodeResult> {
        let bias = self.bias.as_ref();
        let components = address::parse(raw);
        let variants = variants::normalize(raw, bias);
        log::debug!(
            "Resolving '{raw}': {} variant(s), components {components:?}",
            variants.len()
        );

        for variant in &variants {
            if let Some(hit) = self.try_query(attempt, Query::Text(variant)).await {
                return Some(matched(hit, ServiceUsed::Direct, variant));
            }
        }

        for variant in &variants {
            let Some(stripped) = strip_country_suffix(variant, bias) else {
                continue;
            };
            if let Some(hit) = self.try_query(attempt, Query::Text(stripped)).await {
                return Some(matched(hit, ServiceUsed::Alternate, stripped));
            }
        }

        if self.backend.supports_structured() {
            for query in self.structured_queries(&components) {
                if let Some(hit) = self.try_query(attempt, Query::Structured(&query)).await {
                    return Some(matched(hit, ServiceUsed::Structured, &query.describe()));
                }
            }
        }

        for (service, query) in self.degraded_queries(raw, &components, bias) {
            if let Some(hit) = self.try_query(attempt, Query::Text(&query)).await {
                return Some(matched(hit, service, &query));
            }
        }

        None
    }

    /// Sends one query, returning the match only if it is acceptable.
    async fn try_query(&self, attempt: &mut Attempt, query: Query<'_>) -> Option<GeocodedAddress> {
        if !attempt.tried.insert(query.key()) {
            return None;
        }
        if attempt.expired() {
            log::debug!("Deadline passed, skipping {query:?}");
            return None;
        }

        self.limiter.acquire().await;
        if attempt.expired() {
            log::debug!("Deadline passed, skipping {query:?}");
            return None;
        }

        let timeout = attempt.remaining().map_or(self.config.request_timeout(), |r| {
            r.min(self.config.request_timeout())
        });
        attempt.calls += 1;

        let country_code = self.bias.code.as_str();
        let call = async {
            match query {
                Query::Text(q) => self.backend.search(q, country_code).await,
                Query::Structured(q) => self.backend.search_structured(q, country_code).await,
            }
        };
        let outcome = tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(GeocodeError::Timeout));

        match outcome {
            Ok(Some(hit)) if !hit.latitude.is_finite() || !hit.longitude.is_finite() => {
                log::debug!("Rejected {query:?}: non-finite coordinate");
                None
            }
            Ok(Some(hit)) if self.config.is_default_coordinate(hit.latitude, hit.longitude) => {
                log::debug!(
                    "Rejected {query:?}: default coordinate ({:.5}, {:.5})",
                    hit.latitude,
                    hit.longitude
                );
                None
            }
            Ok(Some(hit)) => {
                log::trace!("{:?} answered {query:?}", hit.provider);
                Some(hit)
            }
            Ok(None) => {
                log::debug!("No match for {query:?}");
                None
            }
            Err(GeocodeError::RateLimited) => {
                let cooldown = self.config.rate_limit_cooldown();
                log::warn!(
                    "{} rate limited {query:?}, cooling down {cooldown:?}",
                    self.backend.name()
                );
                self.limiter.penalize(cooldown).await;
                None
            }
            Err(e) => {
                log::warn!("{} failed for {query:?}: {e}", self.backend.name());
                None
            }
        }
    }

    /// Field queries: full city first, then with the subdivision removed.
    fn structured_queries(&self, components: &AddressComponents) -> Vec<StructuredQuery> {
        let Some(street) = variants::street_line(components) else {
            return Vec::new();
        };
        if components.city.is_empty() {
            return Vec::new();
        }

        let city = variants::proper_case(&components.city);
        let simplified = address::strip_city_subdivision(&city);
        let province = Some(self.province_of(components));

        let mut cities = vec![city];
        if !simplified.is_empty() && !cities.contains(&simplified) {
            cities.push(simplified);
        }

        cities
            .into_iter()
            .map(|city| StructuredQuery {
                street: street.clone(),
                city,
                province: province.clone(),
                postal_code: components.postal_code.clone(),
            })
            .collect()
    }

    /// Street + city, postal code only, then city only; least specific last.
    fn degraded_queries(
        &self,
        raw: &str,
        components: &AddressComponents,
        bias: &CountryBias,
    ) -> Vec<(ServiceUsed, String)> {
        let country = components.country_or(&bias.name);
        let city = variants::proper_case(&components.city);
        let mut queries = Vec::new();

        if !city.is_empty()
            && let Some(street) = variants::street_line(components)
        {
            queries.push((ServiceUsed::StreetCity, format!("{street}, {city}, {country}")));
        }

        if let Some(postal_code) = components
            .postal_code
            .clone()
            .or_else(|| address::find_postal_code(raw))
        {
            queries.push((ServiceUsed::PostalCode, format!("{postal_code}, {country}")));
        }

        if !city.is_empty() {
            let province = self.province_of(components);
            let simplified = address::strip_city_subdivision(&city);
            queries.push((
                ServiceUsed::CityLevel,
                format!("{city}, {province}, {country}"),
            ));
            if !simplified.is_empty() && simplified != city {
                queries.push((
                    ServiceUsed::CityLevel,
                    format!("{simplified}, {province}, {country}"),
                ));
            }
        }

        queries
    }

    fn province_of(&self, components: &AddressComponents) -> String {
        components.province_or(&self.bias.province).to_uppercase()
    }

    fn key_lock(&self, raw: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(raw).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(raw.to_string(), Arc::downgrade(&lock));
        lock
    }

    fn cached(&self, raw: &str) -> Option<CachedOutcome> {
        match self.cache.get(raw) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Cache read failed for '{raw}': {e}");
                None
            }
        }
    }

    fn store(&self, raw: &str, outcome: &CachedOutcome, ttl: Duration) {
        if let Err(e) = self.cache.set(raw, outcome, ttl) {
            log::error!("Cache write failed for '{raw}': {e}");
        }
    }

    fn fallback(&self, address_used: impl Into<String>) -> GeocodeResult {
        GeocodeResult::fallback(
            self.config.default_latitude,
            self.config.default_longitude,
            address_used,
        )
    }

    fn exhausted(&self, raw: &str) -> GeocodeResult {
        self.fallback(format!("All geocoding strategies exhausted for '{raw}'"))
    }
}

fn matched(hit: GeocodedAddress, service: ServiceUsed, query: &str) -> GeocodeResult {
    GeocodeResult::matched(
        hit.latitude,
        hit.longitude,
        service,
        query,
        hit.matched_address,
    )
}

/// `"…, Toronto, ON, Canada"` → `"…, Toronto, ON"`. `None` when the
/// variant does not end with the bias country.
fn strip_country_suffix<'a>(variant: &'a str, bias: &CountryBias) -> Option<&'a str> {
    let (head, tail) = variant.rsplit_once(',')?;
    tail.trim()
        .eq_ignore_ascii_case(&bias.name)
        .then(|| head.trim_end())
        .filter(|head| !head.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::GeocodingProvider;

    type Responder =
        Box<dyn Fn(usize, &str) -> Result<Option<GeocodedAddress>, GeocodeError> + Send + Sync>;

    /// Call-counting backend answering through a closure of
    /// `(call index, query)`.
    struct StubBackend {
        calls: AtomicUsize,
        queries: Mutex<Vec<String>>,
        called_at: Mutex<Vec<Instant>>,
        structured: bool,
        delay: Option<Duration>,
        respond: Responder,
    }

    impl StubBackend {
        fn new(
            respond: impl Fn(usize, &str) -> Result<Option<GeocodedAddress>, GeocodeError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
                called_at: Mutex::new(Vec::new()),
                structured: false,
                delay: None,
                respond: Box::new(respond),
            }
        }

        fn structured(mut self) -> Self {
            self.structured = true;
            self
        }

        fn first_call_delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }

        fn called_at(&self) -> Vec<Instant> {
            self.called_at.lock().unwrap().clone()
        }

        async fn answer(&self, query: String) -> Result<Option<GeocodedAddress>, GeocodeError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            self.called_at.lock().unwrap().push(Instant::now());
            if index == 0
                && let Some(delay) = self.delay
            {
                tokio::time::sleep(delay).await;
            }
            (self.respond)(index, &query)
        }
    }

    #[async_trait]
    impl GeocodingBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(
            &self,
            query: &str,
            _country_code: &str,
        ) -> Result<Option<GeocodedAddress>, GeocodeError> {
            self.answer(query.to_string()).await
        }

        fn supports_structured(&self) -> bool {
            self.structured
        }

        async fn search_structured(
            &self,
            query: &StructuredQuery,
            _country_code: &str,
        ) -> Result<Option<GeocodedAddress>, GeocodeError> {
            if !self.structured {
                return Err(GeocodeError::Unsupported);
            }
            self.answer(format!("structured:{}", query.describe())).await
        }
    }

    fn hit(lat: f64, lng: f64) -> Result<Option<GeocodedAddress>, GeocodeError> {
        Ok(Some(GeocodedAddress {
            latitude: lat,
            longitude: lng,
            matched_address: Some("stub match".to_string()),
            provider: GeocodingProvider::Custom,
        }))
    }

    fn leslieville() -> Result<Option<GeocodedAddress>, GeocodeError> {
        hit(43.6689, -79.3158)
    }

    fn resolver_with(
        backend: &Arc<StubBackend>,
        cache: Arc<MemoryCache>,
        config: ResolverConfig,
    ) -> GeocodingResolver {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_interval()));
        GeocodingResolver::new(backend.clone(), cache, limiter, config)
    }

    fn resolver(backend: &Arc<StubBackend>) -> GeocodingResolver {
        resolver_with(
            backend,
            Arc::new(MemoryCache::new()),
            ResolverConfig::default(),
        )
    }

    const MAIN_ST: &str = "123 Main Street, Toronto, ON M5V 1A1";

    #[tokio::test(start_paused = true)]
    async fn first_variant_match_is_direct() {
        let backend = Arc::new(StubBackend::new(|_, _| leslieville()));
        let result = resolver(&backend).resolve(MAIN_ST).await;

        assert!(result.success);
        assert_eq!(result.service_used, ServiceUsed::Direct);
        assert_eq!(
            result.address_used,
            "123 Main Street, Toronto, ON M5V 1A1, Canada"
        );
        assert_eq!(result.display_name.as_deref(), Some("stub match"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_suppresses_backend_calls() {
        let backend = Arc::new(StubBackend::new(|_, _| leslieville()));
        let resolver = resolver(&backend);

        let first = resolver.resolve(MAIN_ST).await;
        let second = resolver.resolve(MAIN_ST).await;

        assert_eq!(backend.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(second.service_used, ServiceUsed::Direct);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_success_is_resolved_again() {
        let backend = Arc::new(StubBackend::new(|_, _| leslieville()));
        let resolver = resolver(&backend);

        resolver.resolve(MAIN_ST).await;
        tokio::time::advance(ResolverConfig::default().success_ttl() + Duration::from_secs(1))
            .await;
        resolver.resolve(MAIN_ST).await;

        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_resolutions_respect_rate_limit() {
        let backend = Arc::new(StubBackend::new(|_, _| leslieville()));
        let resolver = resolver(&backend);
        let interval = resolver.config().rate_limit_interval();

        let addresses = [
            "1 Yonge Street, Toronto, ON",
            "2 Bay Street, Toronto, ON",
            "3 King Street West, Toronto, ON",
            "4 Queen Street East, Toronto, ON",
        ];
        let start = Instant::now();
        let results = resolver.resolve_many(addresses).await;
        let elapsed = start.elapsed();

        assert_eq!(results.len(), addresses.len());
        assert!(results.iter().all(|r| r.success));
        assert_eq!(backend.calls(), addresses.len());
        assert!(elapsed >= interval * 3, "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn default_coordinate_answers_exhaust_every_tier() {
        let config = ResolverConfig::default();
        let (lat, lng) = (config.default_latitude, config.default_longitude);
        let backend = Arc::new(StubBackend::new(move |_, _| hit(lat + 0.001, lng)).structured());
        let resolver = resolver(&backend);

        let result = resolver
            .resolve("1425 Gerrard Street E 2nd Flr, Toronto E01, ON M4L 1Z7")
            .await;

        assert!(!result.success);
        assert_eq!(result.service_used, ServiceUsed::Fallback);
        assert!((result.lat - lat).abs() < f64::EPSILON);
        assert!((result.lng - lng).abs() < f64::EPSILON);
        assert!(result.address_used.contains("exhausted"));

        let queries = backend.queries();
        assert!(queries.contains(&"1425 Gerrard Street East, Toronto, ON M4L 1Z7".to_string()));
        assert!(queries.iter().any(|q| q.starts_with("structured:")));
        assert!(queries.contains(&"M4L 1Z7, Canada".to_string()));
        assert_eq!(queries.last().map(String::as_str), Some("Toronto, ON, Canada"));

        let unique: BTreeSet<_> = queries.iter().collect();
        assert_eq!(unique.len(), queries.len(), "a query was sent twice");
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_cached_and_skips_backend() {
        let backend = Arc::new(StubBackend::new(|_, _| Ok(None)));
        let resolver = resolver(&backend);

        let first = resolver.resolve(MAIN_ST).await;
        let calls = backend.calls();
        let second = resolver.resolve(MAIN_ST).await;

        assert!(!first.success);
        assert!(!second.success);
        assert!(calls > 0);
        assert_eq!(backend.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn preexisting_cached_failure_returns_fallback() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set(MAIN_ST, &CachedOutcome::Failure, Duration::from_secs(60))
            .unwrap();
        let backend = Arc::new(StubBackend::new(|_, _| leslieville()));
        let resolver = resolver_with(&backend, cache, ResolverConfig::default());

        let result = resolver.resolve(MAIN_ST).await;

        assert!(!result.success);
        assert_eq!(result.service_used, ServiceUsed::Fallback);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_returns_fallback_without_calls() {
        let backend = Arc::new(StubBackend::new(|_, _| leslieville()));
        let cache = Arc::new(MemoryCache::new());
        let resolver = resolver_with(&backend, cache.clone(), ResolverConfig::default());

        for raw in ["", "   "] {
            let result = resolver.resolve(raw).await;
            assert!(!result.success);
            assert_eq!(result.service_used, ServiceUsed::Fallback);
            assert!((result.lat - 43.6532).abs() < f64::EPSILON);
        }
        assert_eq!(backend.calls(), 0);
        assert!(cache.is_empty().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_addresses_terminate() {
        let backend = Arc::new(StubBackend::new(|_, _| Ok(None)));
        let resolver = resolver(&backend);

        for raw in ["Main Street", "Toronto, ON", "123", ",,,", "Unit 4"] {
            let result = resolver.resolve(raw).await;
            assert!(!result.success, "{raw}");
            assert_eq!(result.service_used, ServiceUsed::Fallback);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn city_only_match_is_tagged_city_level() {
        let backend = Arc::new(StubBackend::new(|_, q| {
            if q == "Toronto, ON, Canada" {
                hit(43.7001, -79.4163)
            } else {
                Ok(None)
            }
        }));
        let result = resolver(&backend).resolve("Toronto, ON").await;

        assert!(result.success);
        assert_eq!(result.service_used, ServiceUsed::CityLevel);
        assert!(result.service_used.is_low_confidence());
        assert_eq!(result.address_used, "Toronto, ON, Canada");
    }

    #[tokio::test(start_paused = true)]
    async fn house_less_input_is_never_tagged_direct() {
        let backend = Arc::new(StubBackend::new(|_, _| hit(45.5, -73.6)));
        let resolver = resolver(&backend);

        let city = resolver.resolve("Toronto, ON").await;
        assert_eq!(city.service_used, ServiceUsed::CityLevel);
        assert_eq!(city.address_used, "Toronto, ON, Canada");
        assert!(city.service_used.is_low_confidence());

        let postal = resolver.resolve("M5V 1A1").await;
        assert_eq!(postal.service_used, ServiceUsed::PostalCode);
        assert_eq!(postal.address_used, "M5V 1A1, Canada");

        let town = resolver.resolve("Mississauga").await;
        assert_eq!(town.service_used, ServiceUsed::CityLevel);
        assert_eq!(town.address_used, "Mississauga, ON, Canada");

        let street = resolver.resolve("Queen Street, Toronto, ON").await;
        assert!(street.success);
        assert_ne!(street.service_used, ServiceUsed::Direct);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_province_fills_direct_queries() {
        let backend = Arc::new(StubBackend::new(|_, _| hit(45.5017, -73.5673)));
        let config = ResolverConfig {
            default_province: "QC".to_string(),
            ..ResolverConfig::default()
        };
        let resolver = resolver_with(&backend, Arc::new(MemoryCache::new()), config);

        let result = resolver.resolve("123 Rue Main, Montreal").await;

        assert_eq!(result.service_used, ServiceUsed::Direct);
        assert!(
            result.address_used.ends_with(", Montreal, QC, Canada"),
            "{}",
            result.address_used
        );
    }

    #[tokio::test(start_paused = true)]
    async fn postal_only_match_is_tagged_postal_code() {
        let backend = Arc::new(StubBackend::new(|_, q| {
            if q == "M5V 1A1, Canada" {
                hit(43.6426, -79.3871)
            } else {
                Ok(None)
            }
        }));
        let result = resolver(&backend).resolve(MAIN_ST).await;

        assert!(result.success);
        assert_eq!(result.service_used, ServiceUsed::PostalCode);
    }

    #[tokio::test(start_paused = true)]
    async fn country_stripped_match_is_alternate() {
        let backend = Arc::new(StubBackend::new(|_, q| {
            if q.contains("Canada") {
                Ok(None)
            } else {
                leslieville()
            }
        }));
        let result = resolver(&backend)
            .resolve("123 Main Street, Toronto, ON M5V 1A1, Canada")
            .await;

        assert!(result.success);
        assert_eq!(result.service_used, ServiceUsed::Alternate);
        assert!(!result.address_used.contains("Canada"));
    }

    #[tokio::test(start_paused = true)]
    async fn structured_match_is_tagged_structured() {
        let backend = Arc::new(
            StubBackend::new(|_, q| {
                if q.starts_with("structured:") {
                    leslieville()
                } else {
                    Ok(None)
                }
            })
            .structured(),
        );
        let result = resolver(&backend).resolve(MAIN_ST).await;

        assert!(result.success);
        assert_eq!(result.service_used, ServiceUsed::Structured);
        assert_eq!(result.address_used, "123 Main Street, Toronto, ON, M5V 1A1");
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_structured_queries_are_not_sent() {
        let backend = Arc::new(StubBackend::new(|_, _| Ok(None)));
        resolver(&backend).resolve(MAIN_ST).await;

        assert!(
            !backend
                .queries()
                .iter()
                .any(|q| q.starts_with("structured:"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backend_errors_reject_only_one_variant() {
        let backend = Arc::new(StubBackend::new(|i, _| match i {
            0 => Err(GeocodeError::Parse {
                message: "garbage".to_string(),
            }),
            _ => leslieville(),
        }));
        let result = resolver(&backend).resolve(MAIN_ST).await;

        assert!(result.success);
        assert_eq!(result.service_used, ServiceUsed::Direct);
        assert_eq!(backend.calls(), 2);
        assert_eq!(result.address_used, backend.queries()[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_signal_adds_cooldown() {
        let backend = Arc::new(StubBackend::new(|i, _| match i {
            0 => Err(GeocodeError::RateLimited),
            _ => leslieville(),
        }));
        let resolver = resolver(&backend);
        let cooldown = resolver.config().rate_limit_cooldown();

        let start = Instant::now();
        let result = resolver.resolve(MAIN_ST).await;

        assert!(result.success);
        assert_eq!(backend.calls(), 2);
        assert!(start.elapsed() >= cooldown, "elapsed {:?}", start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_signal_holds_back_queued_resolutions() {
        let backend = Arc::new(
            StubBackend::new(|i, _| match i {
                0 => Err(GeocodeError::RateLimited),
                _ => leslieville(),
            })
            .first_call_delayed(Duration::from_millis(100)),
        );
        let resolver = resolver(&backend);
        let cooldown = resolver.config().rate_limit_cooldown();

        let (a, b) = futures::join!(
            resolver.resolve(MAIN_ST),
            resolver.resolve("1 Yonge Street, Toronto, ON"),
        );

        assert!(a.success && b.success);
        let called_at = backend.called_at();
        assert_eq!(called_at.len(), 3);
        let gap = called_at[1] - called_at[0];
        assert!(gap >= cooldown, "second call {gap:?} after the 429");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_and_cascade_continues() {
        let backend = Arc::new(
            StubBackend::new(|_, _| leslieville()).first_call_delayed(Duration::from_secs(300)),
        );
        let resolver = resolver(&backend);
        let timeout = resolver.config().request_timeout();

        let start = Instant::now();
        let result = resolver.resolve(MAIN_ST).await;

        assert!(result.success);
        assert_eq!(backend.calls(), 2);
        assert!(start.elapsed() >= timeout);
        assert!(start.elapsed() < Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_cascade() {
        let backend = Arc::new(StubBackend::new(|_, _| Ok(None)).structured());
        let config = ResolverConfig {
            resolve_deadline_secs: Some(5),
            ..ResolverConfig::default()
        };
        let resolver = resolver_with(&backend, Arc::new(MemoryCache::new()), config);

        let start = Instant::now();
        let result = resolver
            .resolve("1425 Gerrard Street E 2nd Flr, Toronto E01, ON M4L 1Z7")
            .await;

        assert!(!result.success);
        assert!(backend.calls() <= 6, "calls {}", backend.calls());
        assert!(start.elapsed() <= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_resolutions_of_one_address_share_a_call() {
        let backend = Arc::new(StubBackend::new(|_, _| leslieville()));
        let resolver = resolver(&backend);

        let (a, b) = futures::join!(resolver.resolve(MAIN_ST), resolver.resolve(MAIN_ST));

        assert_eq!(a, b);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_distinct_addresses_are_spaced() {
        let backend = Arc::new(StubBackend::new(|_, _| leslieville()));
        let resolver = resolver(&backend);
        let interval = resolver.config().rate_limit_interval();

        let start = Instant::now();
        let (a, b, c) = futures::join!(
            resolver.resolve("1 Yonge Street, Toronto, ON"),
            resolver.resolve("2 Bay Street, Toronto, ON"),
            resolver.resolve("3 King Street West, Toronto, ON"),
        );

        assert!(a.success && b.success && c.success);
        assert_eq!(backend.calls(), 3);
        assert!(start.elapsed() >= interval * 2);
    }

    #[test]
    fn strips_only_the_bias_country() {
        let bias = CountryBias::default();
        assert_eq!(
            strip_country_suffix("1 Yonge Street, Toronto, ON, Canada", &bias),
            Some("1 Yonge Street, Toronto, ON")
        );
        assert_eq!(
            strip_country_suffix("1 Yonge Street, Toronto, ON", &bias),
            None
        );
        assert_eq!(strip_country_suffix("Canada", &bias), None);
    }
}
