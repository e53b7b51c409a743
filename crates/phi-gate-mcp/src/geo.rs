// crates/phi-gate-mcp/src/geo.rs
// ============================================================================
// Module: Geolocation
// Description: Best-effort IP geolocation with a bounded TTL cache.
// Purpose: Enrich audit records with caller location without blocking them.
// Dependencies: phi-gate-core, async-trait, reqwest, serde
// ============================================================================

//! ## Overview
//! [`GeoLocator`] resolves an address to a [`GeoLocation`]. The HTTP-backed
//! [`IpApiLocator`] is wrapped by [`CachedGeoLocator`] so repeated callers do
//! not re-query the service. Concurrent misses for one address may both
//! populate the cache; the last write wins. Callers bound every lookup with
//! their own timeout and treat any failure as "no location".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use phi_gate_core::GeoLocation;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GeolocationConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Geolocation failures.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The lookup service could not be reached.
    #[error("geolocation unavailable: {0}")]
    Unavailable(String),
    /// The lookup service answered without a usable location.
    #[error("geolocation lookup failed: {0}")]
    Lookup(String),
}

// ============================================================================
// SECTION: Interface
// ============================================================================

/// Resolves caller addresses to locations.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Looks up the location of `ip`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] when the lookup fails.
    async fn locate(&self, ip: IpAddr) -> Result<GeoLocation, GeoError>;
}

/// Locator used when enrichment is disabled.
pub struct NoopGeoLocator;

#[async_trait]
impl GeoLocator for NoopGeoLocator {
    async fn locate(&self, _ip: IpAddr) -> Result<GeoLocation, GeoError> {
        Ok(GeoLocation::default())
    }
}

/// Returns true for addresses that never leave the local network.
#[must_use]
pub fn is_local_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

// ============================================================================
// SECTION: HTTP Locator
// ============================================================================

/// Response body of the ip-api JSON endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    /// `success` or `fail`.
    status: String,
    /// Failure message.
    message: Option<String>,
    /// Country name.
    country: Option<String>,
    /// Region name.
    region_name: Option<String>,
    /// City name.
    city: Option<String>,
    /// Latitude.
    lat: Option<f64>,
    /// Longitude.
    lon: Option<f64>,
    /// Timezone.
    timezone: Option<String>,
}

/// Locator backed by an ip-api compatible HTTP endpoint.
pub struct IpApiLocator {
    /// Endpoint prefix; the address is appended.
    endpoint: String,
    /// HTTP client configured with timeouts.
    client: Client,
}

impl IpApiLocator {
    /// Builds a locator for `endpoint` with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::Unavailable`] when the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| GeoError::Unavailable(err.to_string()))?;
        let mut endpoint = endpoint.trim().to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        let url = format!("{}{ip}", self.endpoint);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| GeoError::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(GeoError::Unavailable(format!("status {}", response.status())));
        }
        let body: IpApiResponse =
            response.json().await.map_err(|err| GeoError::Lookup(err.to_string()))?;
        if body.status != "success" {
            return Err(GeoError::Lookup(body.message.unwrap_or_else(|| body.status.clone())));
        }
        Ok(GeoLocation {
            country: body.country,
            region: body.region_name,
            city: body.city,
            latitude: body.lat,
            longitude: body.lon,
            timezone: body.timezone,
        })
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Cached lookup result.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Resolved location.
    location: GeoLocation,
    /// Insertion time.
    inserted_at: Instant,
}

/// Bounded TTL cache in front of another locator.
pub struct CachedGeoLocator {
    /// Locator consulted on a miss.
    inner: Arc<dyn GeoLocator>,
    /// Entry lifetime.
    ttl: Duration,
    /// Maximum number of cached addresses.
    capacity: usize,
    /// Cached entries.
    entries: Mutex<HashMap<IpAddr, CacheEntry>>,
}

impl CachedGeoLocator {
    /// Wraps `inner` with a cache of `capacity` entries living for `ttl`.
    #[must_use]
    pub fn new(inner: Arc<dyn GeoLocator>, ttl: Duration, capacity: usize) -> Self {
        Self { inner, ttl, capacity: capacity.max(1), entries: Mutex::new(HashMap::new()) }
    }

    /// Builds the configured locator stack.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] when the HTTP client cannot be built.
    pub fn from_config(config: &GeolocationConfig) -> Result<Arc<dyn GeoLocator>, GeoError> {
        if !config.enabled {
            return Ok(Arc::new(NoopGeoLocator));
        }
        let http =
            IpApiLocator::new(&config.endpoint, Duration::from_millis(config.timeout_ms))?;
        Ok(Arc::new(Self::new(
            Arc::new(http),
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        )))
    }

    /// Returns the number of cached entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or_default()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a fresh cached entry for `ip`.
    fn cached(&self, ip: IpAddr) -> Option<GeoLocation> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&ip)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.location.clone())
    }

    /// Stores a lookup result, evicting expired then oldest entries.
    fn store(&self, ip: IpAddr, location: GeoLocation) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if !entries.contains_key(&ip) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
            while entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(key, _)| *key);
                match oldest {
                    Some(key) => {
                        entries.remove(&key);
                    }
                    None => break,
                }
            }
        }
        entries.insert(ip, CacheEntry { location, inserted_at: Instant::now() });
    }
}

#[async_trait]
impl GeoLocator for CachedGeoLocator {
    async fn locate(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        if let Some(location) = self.cached(ip) {
            return Ok(location);
        }
        let location = self.inner.locate(ip).await?;
        self.store(ip, location.clone());
        Ok(location)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only cache assertions."
    )]

    use std::net::IpAddr;
    use std::net::Ipv4Addr;
    use std::net::Ipv6Addr;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use async_trait::async_trait;
    use phi_gate_core::GeoLocation;

    use super::CachedGeoLocator;
    use super::GeoError;
    use super::GeoLocator;
    use super::is_local_address;

    /// Locator that counts lookups and names the country after the address.
    #[derive(Default)]
    struct CountingLocator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeoLocator for CountingLocator {
        async fn locate(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GeoLocation { country: Some(ip.to_string()), ..GeoLocation::default() })
        }
    }

    /// Locator that always fails.
    struct FailingLocator;

    #[async_trait]
    impl GeoLocator for FailingLocator {
        async fn locate(&self, _ip: IpAddr) -> Result<GeoLocation, GeoError> {
            Err(GeoError::Unavailable("offline".to_string()))
        }
    }

    fn public(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_cache() {
        let inner = Arc::new(CountingLocator::default());
        let cache = CachedGeoLocator::new(inner.clone(), Duration::from_secs(60), 8);
        let first = cache.locate(public(1)).await.unwrap();
        let second = cache.locate(public(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_refreshed() {
        let inner = Arc::new(CountingLocator::default());
        let cache = CachedGeoLocator::new(inner.clone(), Duration::ZERO, 8);
        cache.locate(public(1)).await.unwrap();
        cache.locate(public(1)).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_entry() {
        let inner = Arc::new(CountingLocator::default());
        let cache = CachedGeoLocator::new(inner.clone(), Duration::from_secs(60), 2);
        cache.locate(public(1)).await.unwrap();
        cache.locate(public(2)).await.unwrap();
        cache.locate(public(3)).await.unwrap();
        assert_eq!(cache.len(), 2);
        cache.locate(public(1)).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = CachedGeoLocator::new(Arc::new(FailingLocator), Duration::from_secs(60), 2);
        assert!(cache.locate(public(1)).await.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn local_addresses_are_recognized() {
        assert!(is_local_address(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(is_local_address(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
        assert!(is_local_address(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 9))));
        assert!(is_local_address(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_local_address("fd00::1".parse().unwrap()));
        assert!(!is_local_address(public(7)));
        assert!(!is_local_address("2001:4860::8888".parse().unwrap()));
    }
}
