use std::collections::HashMap;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

/// Plan-gated features the pipeline asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    AiTagging,
}

/// Read-only view of the billing/plan collaborator: "does this tenant's plan
/// allow feature X". The pipeline never writes through this interface.
#[async_trait]
pub trait PlanService: Send + Sync {
    async fn allows(&self, tenant_id: &str, feature: Feature) -> bool;
}

/// Plan service backed by static configuration.
pub struct StaticPlanService {
    allow_ai_tagging: bool,
    /// Per-tenant overrides of the default.
    tenant_overrides: HashMap<String, bool>,
}

impl StaticPlanService {
    pub fn new(allow_ai_tagging: bool, tenant_overrides: HashMap<String, bool>) -> Self {
        Self {
            allow_ai_tagging,
            tenant_overrides,
        }
    }
}

#[async_trait]
impl PlanService for StaticPlanService {
    async fn allows(&self, tenant_id: &str, feature: Feature) -> bool {
        match feature {
            Feature::AiTagging => self
                .tenant_overrides
                .get(tenant_id)
                .copied()
                .unwrap_or(self.allow_ai_tagging),
        }
    }
}

/// Caching wrapper so hot pipeline paths don't hit the plan backend on every
/// stage dispatch.
pub struct CachedPlanService<S> {
    inner: S,
    cache: Mutex<LruCache<(String, Feature), bool>>,
}

impl<S: PlanService> CachedPlanService<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl<S: PlanService> PlanService for CachedPlanService<S> {
    async fn allows(&self, tenant_id: &str, feature: Feature) -> bool {
        let key = (tenant_id.to_string(), feature);
        {
            let mut cache = self.cache.lock().await;
            if let Some(allowed) = cache.get(&key) {
                return *allowed;
            }
        }

        let allowed = self.inner.allows(tenant_id, feature).await;

        let mut cache = self.cache.lock().await;
        cache.put(key, allowed);
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPlans {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlanService for CountingPlans {
        async fn allows(&self, _tenant_id: &str, _feature: Feature) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn overrides_beat_default() {
        let plans = StaticPlanService::new(
            true,
            HashMap::from([("t-denied".to_string(), false)]),
        );
        assert!(plans.allows("t-any", Feature::AiTagging).await);
        assert!(!plans.allows("t-denied", Feature::AiTagging).await);
    }

    #[tokio::test]
    async fn cache_avoids_repeat_lookups() {
        let cached = CachedPlanService::new(
            CountingPlans {
                calls: AtomicUsize::new(0),
            },
            16,
        );
        assert!(cached.allows("t-1", Feature::AiTagging).await);
        assert!(cached.allows("t-1", Feature::AiTagging).await);
        assert!(cached.allows("t-1", Feature::AiTagging).await);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
    }
}
