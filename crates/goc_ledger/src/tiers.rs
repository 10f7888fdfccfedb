//! Subscription tier caps and a short-TTL cache in front of them.
//!
//! Spec.md §4.6: "Tier caps (rows/month, ε/month) are part of the user's
//! subscription snapshot and cached with a short TTL." The snapshot itself
//! lives outside this core (billing/subscription service); this crate only
//! defines the shape and the caching wrapper around whatever
//! [`TierCapsProvider`] the host plugs in.

use async_trait::async_trait;
use goc_ids::OwnerId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-owner monthly caps consulted by every [`crate::LedgerBackend::reserve`]
/// call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierCaps {
    pub rows_per_month: u64,
    pub epsilon_per_month: f64,
    pub max_custom_models: u32,
}

impl TierCaps {
    pub const FREE: TierCaps = TierCaps {
        rows_per_month: 1_000,
        epsilon_per_month: 5.0,
        max_custom_models: 0,
    };

    pub const PRO: TierCaps = TierCaps {
        rows_per_month: 100_000,
        epsilon_per_month: 50.0,
        max_custom_models: 3,
    };

    pub const ENTERPRISE: TierCaps = TierCaps {
        rows_per_month: 10_000_000,
        epsilon_per_month: 1_000.0,
        max_custom_models: 50,
    };
}

/// Resolves an owner's current tier caps. The host implements this against
/// its own subscription/billing store; a [`StaticTierCapsProvider`] is
/// provided for tests and single-tier deployments.
#[async_trait]
pub trait TierCapsProvider: Send + Sync {
    async fn caps(&self, owner_id: &OwnerId) -> TierCaps;
}

/// Returns the same [`TierCaps`] for every owner.
#[derive(Debug, Clone, Copy)]
pub struct StaticTierCapsProvider(pub TierCaps);

#[async_trait]
impl TierCapsProvider for StaticTierCapsProvider {
    async fn caps(&self, _owner_id: &OwnerId) -> TierCaps {
        self.0
    }
}

/// Wraps a [`TierCapsProvider`] with a short per-owner TTL cache, so a
/// quota reservation doesn't round-trip to the subscription service on
/// every row.
pub struct CachedTierCapsProvider<P> {
    inner: P,
    ttl: Duration,
    cache: Mutex<HashMap<String, (TierCaps, Instant)>>,
}

impl<P: TierCapsProvider> CachedTierCapsProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Spec.md §4.6 default: a "short TTL", fixed here at 30s to match the
    /// Provider Gateway health-check cache (§4.2) for a consistent feel.
    pub fn with_default_ttl(inner: P) -> Self {
        Self::new(inner, Duration::from_secs(30))
    }
}

#[async_trait]
impl<P: TierCapsProvider> TierCapsProvider for CachedTierCapsProvider<P> {
    async fn caps(&self, owner_id: &OwnerId) -> TierCaps {
        let key = owner_id.as_str().to_string();
        {
            let cache = self.cache.lock().expect("tier cache lock poisoned");
            if let Some((caps, fetched_at)) = cache.get(&key) {
                if fetched_at.elapsed() < self.ttl {
                    return *caps;
                }
            }
        }
        let caps = self.inner.caps(owner_id).await;
        let mut cache = self.cache.lock().expect("tier cache lock poisoned");
        cache.insert(key, (caps, Instant::now()));
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TierCapsProvider for CountingProvider {
        async fn caps(&self, _owner_id: &OwnerId) -> TierCaps {
            self.calls.fetch_add(1, Ordering::SeqCst);
            TierCaps::FREE
        }
    }

    #[tokio::test]
    async fn cache_avoids_repeated_lookups_within_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CachedTierCapsProvider::new(
            CountingProvider { calls: calls.clone() },
            Duration::from_secs(60),
        );
        let owner = OwnerId::new();
        provider.caps(&owner).await;
        provider.caps(&owner).await;
        provider.caps(&owner).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_expires_after_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CachedTierCapsProvider::new(
            CountingProvider { calls: calls.clone() },
            Duration::from_millis(1),
        );
        let owner = OwnerId::new();
        provider.caps(&owner).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        provider.caps(&owner).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
