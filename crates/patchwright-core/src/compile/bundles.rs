//! Expiring caches: runtime bundles and compile results.
//!
//! Both are [`TtlCache`]s keyed by content digests. Entries older than the
//! TTL are never returned; they are physically removed by a sweep that runs
//! on access, at most once per sweep interval.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use patchwright_state::ContentDigest;

use super::CompileOutput;
use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    pub ttl: Duration,
    /// Minimum time between two sweeps.
    pub sweep_interval: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct Slot<V> {
    value: V,
    inserted: Instant,
}

struct Slots<V> {
    entries: HashMap<String, Slot<V>>,
    last_sweep: Option<Instant>,
}

/// String-keyed cache whose entries expire after a TTL.
///
/// Every operation takes an explicit `now`; the `*_now` conveniences pass
/// `Instant::now()`.
pub struct TtlCache<V> {
    policy: TtlPolicy,
    slots: Mutex<Slots<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(policy: TtlPolicy) -> Self {
        Self {
            policy,
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                last_sweep: None,
            }),
        }
    }

    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Slots<V>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn expired(&self, inserted: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted) > self.policy.ttl
    }

    /// Insert or replace; the entry's age restarts at `now`.
    pub fn insert_at(&self, key: &str, value: V, now: Instant) {
        self.sweep_at(now);
        self.lock().entries.insert(
            key.to_string(),
            Slot {
                value,
                inserted: now,
            },
        );
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        self.sweep_at(now);
        let slots = self.lock();
        let slot = slots.entries.get(key)?;
        (!self.expired(slot.inserted, now)).then(|| slot.value.clone())
    }

    /// Remove expired entries unless a sweep ran within the sweep interval.
    /// Returns the number removed, or `None` when throttled.
    pub fn sweep_at(&self, now: Instant) -> Option<usize> {
        let mut slots = self.lock();
        if let Some(last) = slots.last_sweep {
            if now.saturating_duration_since(last) < self.policy.sweep_interval {
                return None;
            }
        }
        slots.last_sweep = Some(now);
        let before = slots.entries.len();
        let ttl = self.policy.ttl;
        slots
            .entries
            .retain(|_, slot| now.saturating_duration_since(slot.inserted) <= ttl);
        Some(before - slots.entries.len())
    }

    pub fn insert(&self, key: &str, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything and forget the last sweep.
    pub fn reset(&self) {
        let mut slots = self.lock();
        slots.entries.clear();
        slots.last_sweep = None;
    }
}

/// Interactive module registered for retrieval by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeBundle {
    /// SHA-256 hex digest of `code`.
    pub id: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// Process-wide store of runtime bundles.
pub struct RuntimeBundleRegistry {
    cache: TtlCache<RuntimeBundle>,
}

impl Default for RuntimeBundleRegistry {
    fn default() -> Self {
        Self::new(TtlPolicy::default())
    }
}

impl RuntimeBundleRegistry {
    pub fn new(policy: TtlPolicy) -> Self {
        Self {
            cache: TtlCache::new(policy),
        }
    }

    /// Register `code` and return its id. Identical code maps to the same id.
    pub fn register_at(&self, code: &str, now: Instant) -> String {
        let id = ContentDigest::from_bytes(code.as_bytes()).to_string();
        let bundle = RuntimeBundle {
            id: id.clone(),
            code: code.to_string(),
            created_at: Utc::now(),
        };
        self.sweep_at(now);
        self.cache.insert_at(&id, bundle, now);
        METRICS.inc_bundles_registered();
        id
    }

    pub fn get_at(&self, id: &str, now: Instant) -> Option<RuntimeBundle> {
        self.sweep_at(now);
        self.cache.get_at(id, now)
    }

    /// Throttled sweep, reported through metrics and logs.
    pub fn sweep_at(&self, now: Instant) -> Option<usize> {
        let removed = self.cache.sweep_at(now)?;
        if removed > 0 {
            METRICS.add_bundles_expired(removed as u64);
            obs::emit_bundle_swept(removed, self.cache.len());
        }
        Some(removed)
    }

    pub fn register(&self, code: &str) -> String {
        self.register_at(code, Instant::now())
    }

    pub fn policy(&self) -> TtlPolicy {
        self.cache.policy()
    }

    pub fn get(&self, id: &str) -> Option<RuntimeBundle> {
        self.get_at(id, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn reset(&self) {
        self.cache.reset();
    }
}

/// Compile results keyed by request digest.
pub type CompileCache = TtlCache<CompileOutput>;
