//! Global atomic counters for Patchwright observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at daemon shutdown or after a batch).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters with no allocation or locking.
pub struct Metrics {
    repairs_started: AtomicU64,
    patch_calls: AtomicU64,
    patches_applied: AtomicU64,
    catalog_substitutions: AtomicU64,
    bundles_registered: AtomicU64,
    bundles_expired: AtomicU64,
    extraction_failures: AtomicU64,
    sandbox_fallbacks: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! counter {
    ($inc:ident, $read:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = stringify!($field), "counter incremented");
        }

        pub fn $read(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            repairs_started: AtomicU64::new(0),
            patch_calls: AtomicU64::new(0),
            patches_applied: AtomicU64::new(0),
            catalog_substitutions: AtomicU64::new(0),
            bundles_registered: AtomicU64::new(0),
            bundles_expired: AtomicU64::new(0),
            extraction_failures: AtomicU64::new(0),
            sandbox_fallbacks: AtomicU64::new(0),
        }
    }

    counter!(inc_repairs, repairs_started, repairs_started);
    counter!(inc_patch_calls, patch_calls, patch_calls);
    counter!(inc_patches_applied, patches_applied, patches_applied);
    counter!(
        inc_catalog_substitutions,
        catalog_substitutions,
        catalog_substitutions
    );
    counter!(inc_bundles_registered, bundles_registered, bundles_registered);
    counter!(inc_extraction_failures, extraction_failures, extraction_failures);
    counter!(inc_sandbox_fallbacks, sandbox_fallbacks, sandbox_fallbacks);

    /// Add `n` expired bundles (sweeps remove several at once).
    pub fn add_bundles_expired(&self, n: u64) {
        self.bundles_expired.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bundles_expired(&self) -> u64 {
        self.bundles_expired.load(Ordering::Relaxed)
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            repairs_started = self.repairs_started(),
            patch_calls = self.patch_calls(),
            patches_applied = self.patches_applied(),
            catalog_substitutions = self.catalog_substitutions(),
            bundles_registered = self.bundles_registered(),
            bundles_expired = self.bundles_expired(),
            extraction_failures = self.extraction_failures(),
            sandbox_fallbacks = self.sandbox_fallbacks(),
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.repairs_started,
            &self.patch_calls,
            &self.patches_applied,
            &self.catalog_substitutions,
            &self.bundles_registered,
            &self.bundles_expired,
            &self.extraction_failures,
            &self.sandbox_fallbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_patch_calls();
        m.inc_patch_calls();
        m.inc_catalog_substitutions();
        m.add_bundles_expired(3);
        assert_eq!(m.patch_calls(), 2);
        assert_eq!(m.catalog_substitutions(), 1);
        assert_eq!(m.bundles_expired(), 3);
        assert_eq!(m.patches_applied(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_repairs();
        m.inc_sandbox_fallbacks();
        m.add_bundles_expired(2);
        m.reset();
        assert_eq!(m.repairs_started(), 0);
        assert_eq!(m.sandbox_fallbacks(), 0);
        assert_eq!(m.bundles_expired(), 0);
    }
}
