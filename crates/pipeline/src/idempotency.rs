//! Idempotency cache (§5): `(tenant, Idempotency-Key)` -> a cached
//! [`crate::orchestrator::AlignmentResult`] with TTL, so a retried
//! request (client timeout, at-least-once delivery) returns the
//! original turn's result instead of running the pipeline twice and
//! producing a second turn record.
//!
//! Grounded in the same `parking_lot::Mutex`-guarded map shape as
//! [`crate::locking::SessionLockRegistry`]; no `dashmap` dependency is
//! carried by this crate, so a single mutex around the whole map is
//! used rather than a sharded concurrent map.

use crate::orchestrator::AlignmentResult;
use align_config::IdempotencyConfig;
use align_core::ids::TenantId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    result: AlignmentResult,
    stored_at: Instant,
}

#[derive(Default)]
pub struct IdempotencyCache {
    entries: Mutex<HashMap<(TenantId, String), Entry>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached result if `key` was stored within `config.ttl_seconds`;
    /// prunes the entry (and returns `None`) once it has expired.
    pub fn get(&self, tenant_id: TenantId, key: &str, config: &IdempotencyConfig) -> Option<AlignmentResult> {
        if !config.enabled {
            return None;
        }
        let map_key = (tenant_id, key.to_string());
        let ttl = Duration::from_secs(config.ttl_seconds);
        let mut entries = self.entries.lock();
        match entries.get(&map_key) {
            Some(entry) if entry.stored_at.elapsed() <= ttl => Some(entry.result.clone()),
            Some(_) => {
                entries.remove(&map_key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, tenant_id: TenantId, key: String, result: AlignmentResult, config: &IdempotencyConfig) {
        if !config.enabled {
            return;
        }
        self.entries.lock().insert((tenant_id, key), Entry { result, stored_at: Instant::now() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::StageTiming;
    use align_core::ids::{SessionId, TurnId};

    fn sample_result() -> AlignmentResult {
        AlignmentResult {
            session_id: SessionId::new(),
            turn_id: TurnId::new(),
            response_text: "hi".into(),
            matched_rule_ids: vec![],
            tool_calls: vec![],
            violations: vec![],
            stage_timings: vec![StageTiming { stage: "generation".into(), duration_ms: 1 }],
        }
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = IdempotencyCache::new();
        let config = IdempotencyConfig { enabled: false, ttl_seconds: 300 };
        let tenant_id = TenantId::new();
        cache.put(tenant_id, "k1".into(), sample_result(), &config);
        assert!(cache.get(tenant_id, "k1", &config).is_none());
    }

    #[test]
    fn stores_and_returns_within_ttl() {
        let cache = IdempotencyCache::new();
        let config = IdempotencyConfig { enabled: true, ttl_seconds: 300 };
        let tenant_id = TenantId::new();
        let result = sample_result();
        cache.put(tenant_id, "k1".into(), result.clone(), &config);
        let cached = cache.get(tenant_id, "k1", &config).unwrap();
        assert_eq!(cached.turn_id, result.turn_id);
    }

    #[test]
    fn expired_entry_is_pruned() {
        let cache = IdempotencyCache::new();
        let config = IdempotencyConfig { enabled: true, ttl_seconds: 0 };
        let tenant_id = TenantId::new();
        cache.put(tenant_id, "k1".into(), sample_result(), &config);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(tenant_id, "k1", &config).is_none());
    }

    #[test]
    fn different_tenants_with_same_key_do_not_collide() {
        let cache = IdempotencyCache::new();
        let config = IdempotencyConfig { enabled: true, ttl_seconds: 300 };
        let a = TenantId::new();
        let b = TenantId::new();
        cache.put(a, "k1".into(), sample_result(), &config);
        assert!(cache.get(b, "k1", &config).is_none());
    }
}
