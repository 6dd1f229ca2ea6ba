//! Time-bounded memoization of merged rate lookups.
//!
//! Keys are derived from the request shape only (origin, destination, parcel
//! shapes, requested service level) and never from a carrier, so one entry
//! holds the merged quotes of every carrier and a hit skips the whole fan-out.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::{RateQuote, RateRequest};

/// Default time-to-live of a cached rate lookup.
pub const DEFAULT_RATE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    quotes: Vec<RateQuote>,
    stored_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    ttl: Duration,
}

/// Thread-safe rate cache shared by every caller of the shipping service.
#[derive(Debug, Clone)]
pub struct RateCache {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_CACHE_TTL)
    }
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
            })),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Cache key for a request shape.
    ///
    /// `origin-postal:country|destination-postal:country|shapes#count|level`.
    /// Parcel shapes are orientation-normalized, sorted and deduplicated; the
    /// package count keeps one parcel and two identical parcels apart.
    pub fn signature(req: &RateRequest) -> String {
        let shapes = req
            .packages
            .iter()
            .map(|package| package.shape_key())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(",");
        let service = req
            .service_level
            .map(|level| level.as_str())
            .unwrap_or("all");

        format!(
            "{}:{}|{}:{}|{}#{}|{}",
            req.shipper.address.normalized_postal_code(),
            req.shipper.address.country,
            req.recipient.address.normalized_postal_code(),
            req.recipient.address.country,
            shapes,
            req.packages.len(),
            service
        )
    }

    /// Stores merged quotes for the request shape, stamped now.
    pub async fn cache_rates(&self, req: &RateRequest, quotes: Vec<RateQuote>) {
        let mut inner = self.inner.write().await;
        if inner.ttl == Duration::ZERO {
            return;
        }
        let key = Self::signature(req);
        debug!(signature = %key, quotes = quotes.len(), "rate cache store");
        inner.map.insert(
            key,
            CacheEntry {
                quotes,
                stored_at: Instant::now(),
            },
        );
    }

    /// Returns quotes younger than the TTL. An expired entry is deleted here.
    pub async fn get_cached_rates(&self, req: &RateRequest) -> Option<Vec<RateQuote>> {
        let key = Self::signature(req);
        {
            let inner = self.inner.read().await;
            match inner.map.get(&key) {
                None => {
                    debug!(signature = %key, "rate cache miss");
                    return None;
                }
                Some(entry) if entry.stored_at.elapsed() < inner.ttl => {
                    debug!(signature = %key, "rate cache hit");
                    return Some(entry.quotes.clone());
                }
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write().await;
        let ttl = inner.ttl;
        // Re-check: another writer may have refreshed the entry meanwhile.
        match inner.map.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < ttl => Some(entry.quotes.clone()),
            Some(_) => {
                inner.map.remove(&key);
                debug!(signature = %key, "rate cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Sweeps every expired entry; returns how many were removed.
    pub async fn cleanup_expired_items(&self) -> usize {
        let mut inner = self.inner.write().await;
        let ttl = inner.ttl;
        let before = inner.map.len();
        inner.map.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        before - inner.map.len()
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_disabled(&self) -> bool {
        self.inner.read().await.ttl == Duration::ZERO
    }
}
