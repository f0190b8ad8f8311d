//! # Caching Resolver
//!
//! Process-wide TTL cache in front of a [`DidResolver`], with single-flight
//! suppression of duplicate concurrent resolutions.
//!
//! ## Flow
//!
//! 1. Unless refreshing, a fresh entry (`now < fetched_at + ttl`) is returned
//!    without resolving.
//! 2. Otherwise the caller joins the per-identity flight. The first caller
//!    resolves and publishes its outcome in the flight slot; callers queued
//!    behind it take that outcome, whether active, deactivated or failed.
//! 3. An active result replaces the entry. A deactivated result removes it.
//!    A failure leaves the cache untouched.
//!
//! Flights are created on demand and dropped from the arena once no caller
//! holds them.

use crate::error::IdentityError;
use crate::resolver::DidResolver;
use dashmap::DashMap;
use hstp_types::{Did, ResolvedDid, SystemTimeSource, TimeSource, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Resolver cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl ResolverConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Clone)]
struct CacheEntry {
    result: ResolvedDid,
    fetched_at: Timestamp,
}

/// Per-identity exclusive section plus the outcome of its latest resolution.
#[derive(Default)]
struct Flight {
    /// Number of resolutions completed through this flight.
    completed: AtomicU64,
    outcome: Mutex<Option<(u64, Result<ResolvedDid, IdentityError>)>>,
}

/// Cache counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Calls into the underlying resolver.
    pub resolutions: AtomicU64,
    pub failures: AtomicU64,
    pub deactivations: AtomicU64,
}

pub struct CachingDidResolver {
    inner: Arc<dyn DidResolver>,
    entries: DashMap<Did, CacheEntry>,
    flights: DashMap<Did, Arc<Flight>>,
    ttl: Duration,
    clock: Arc<dyn TimeSource>,
    stats: CacheStats,
}

impl CachingDidResolver {
    /// Wrap `inner` with the system clock.
    pub fn new(inner: Arc<dyn DidResolver>, config: &ResolverConfig) -> Self {
        Self::with_clock(inner, config, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(
        inner: Arc<dyn DidResolver>,
        config: &ResolverConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            flights: DashMap::new(),
            ttl: config.ttl(),
            clock,
            stats: CacheStats::default(),
        }
    }

    /// Resolve `did`, serving from cache when fresh.
    ///
    /// Never fails: an unresolvable identity yields a deactivated-shaped
    /// result. Use [`try_resolve`](Self::try_resolve) to see the error.
    pub async fn resolve(&self, did: &Did, force_refresh: bool) -> ResolvedDid {
        match self.try_resolve(did, force_refresh).await {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(
                    did = %did,
                    error = %e,
                    "Identity unresolvable, returning deactivated result"
                );
                ResolvedDid::deactivated(did.clone(), self.clock.now())
            }
        }
    }

    /// Resolve bypassing the TTL check.
    pub async fn refresh(&self, did: &Did) -> ResolvedDid {
        self.resolve(did, true).await
    }

    /// Like [`resolve`](Self::resolve) but surfaces resolution failures.
    ///
    /// # Errors
    ///
    /// Whatever the underlying resolver fails with. The cache is not
    /// populated on failure.
    pub async fn try_resolve(
        &self,
        did: &Did,
        force_refresh: bool,
    ) -> Result<ResolvedDid, IdentityError> {
        if !force_refresh {
            if let Some(result) = self.fresh_entry(did) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(result);
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let flight = self.flights.entry(did.clone()).or_default().clone();
        let joined_at = flight.completed.load(Ordering::SeqCst);

        let result = {
            let mut outcome = flight.outcome.lock().await;
            let shared = match outcome.as_ref() {
                Some((seq, settled)) if *seq > joined_at => Some(settled.clone()),
                _ => None,
            };
            if let Some(settled) = shared {
                debug!(did = %did, "Reusing resolution from concurrent caller");
                settled
            } else if let Some(result) = self.fresh_entry(did).filter(|_| !force_refresh) {
                Ok(result)
            } else {
                let result = self.resolve_and_store(did).await;
                let seq = flight.completed.fetch_add(1, Ordering::SeqCst) + 1;
                *outcome = Some((seq, result.clone()));
                result
            }
        };

        drop(flight);
        self.flights
            .remove_if(did, |_, flight| Arc::strong_count(flight) == 1);

        result
    }

    /// Remove any entry for `did`. The next resolution is a cache miss.
    pub fn invalidate(&self, did: &Did) -> bool {
        let removed = self.entries.remove(did).is_some();
        if removed {
            debug!(did = %did, "Cache entry invalidated");
        }
        removed
    }

    /// Peek at the cached entry regardless of freshness.
    #[must_use]
    pub fn cached(&self, did: &Did) -> Option<ResolvedDid> {
        self.entries.get(did).map(|e| e.result.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities with a resolution currently held or awaited.
    #[must_use]
    pub fn flight_count(&self) -> usize {
        self.flights.len()
    }

    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn fresh_entry(&self, did: &Did) -> Option<ResolvedDid> {
        let entry = self.entries.get(did)?;
        let expires_at = entry.fetched_at.saturating_add(self.ttl);
        (self.clock.now() < expires_at).then(|| entry.result.clone())
    }

    async fn resolve_and_store(&self, did: &Did) -> Result<ResolvedDid, IdentityError> {
        self.stats.resolutions.fetch_add(1, Ordering::Relaxed);

        match self.inner.resolve(did).await {
            Ok(result) if result.is_deactivated() => {
                self.stats.deactivations.fetch_add(1, Ordering::Relaxed);
                self.entries.remove(did);
                info!(did = %did, "Identity deactivated, cache entry removed");
                Ok(result)
            }
            Ok(result) => {
                self.entries.insert(
                    did.clone(),
                    CacheEntry {
                        result: result.clone(),
                        fetched_at: self.clock.now(),
                    },
                );
                debug!(did = %did, "Identity resolved and cached");
                Ok(result)
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(did = %did, error = %e, "Identity resolution failed");
                Err(e)
            }
        }
    }
}
