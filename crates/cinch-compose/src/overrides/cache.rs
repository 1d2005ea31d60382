//! Time-boxed snapshot cache for override records.
//!
//! Holds at most one [`OverrideSnapshot`] with an expiry instant behind an
//! [`ArcSwapOption`]. Readers load the pointer without taking a lock; writers
//! swap or clear it. A slow store never blocks readers of a fresh snapshot.
//!
//! Invalidation bumps a generation counter and every entry records the
//! generation it was loaded under. Entries from an older generation read as
//! misses, so a load that raced a write can never serve stale records after
//! the write returned.

use super::OverrideSnapshot;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live for a cached snapshot.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CachedSnapshot {
    snapshot: Arc<OverrideSnapshot>,
    expires_at: Instant,
    generation: u64,
}

/// Single-slot snapshot cache with a fixed TTL.
#[derive(Debug)]
pub struct OverrideCache {
    ttl: Duration,
    slot: ArcSwapOption<CachedSnapshot>,
    generation: AtomicU64,
    /// Hits counter for diagnostics.
    hits: AtomicU64,
    /// Misses counter for diagnostics.
    misses: AtomicU64,
}

impl OverrideCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached snapshot, if one is present, unexpired, and current.
    pub fn get(&self) -> Option<Arc<OverrideSnapshot>> {
        self.get_at(Instant::now())
    }

    /// [`get`](Self::get) evaluated at an explicit instant.
    pub fn get_at(&self, now: Instant) -> Option<Arc<OverrideSnapshot>> {
        let entry = self.slot.load();
        let generation = self.generation();
        match &*entry {
            Some(entry) if now < entry.expires_at && entry.generation == generation => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.snapshot.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Publish a snapshot, valid for one TTL from now.
    pub fn put(&self, snapshot: Arc<OverrideSnapshot>) {
        self.put_at(snapshot, Instant::now());
    }

    /// [`put`](Self::put) with an explicit population instant.
    pub fn put_at(&self, snapshot: Arc<OverrideSnapshot>, now: Instant) {
        self.slot.store(Some(self.entry(snapshot, now, self.generation())));
    }

    fn entry(
        &self,
        snapshot: Arc<OverrideSnapshot>,
        now: Instant,
        generation: u64,
    ) -> Arc<CachedSnapshot> {
        Arc::new(CachedSnapshot {
            snapshot,
            expires_at: now + self.ttl,
            generation,
        })
    }

    /// Current invalidation generation. Capture before a store load and pass
    /// to [`put_if_current`](Self::put_if_current).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publish `snapshot` unless the cache was invalidated after
    /// `generation` was captured. Returns whether it was stored.
    pub fn put_if_current(&self, snapshot: Arc<OverrideSnapshot>, generation: u64) -> bool {
        let entry = self.entry(snapshot, Instant::now(), generation);
        let mut published = false;
        self.slot.rcu(|current| {
            published = self.generation() == generation;
            if published {
                Some(entry.clone())
            } else {
                current.clone()
            }
        });
        if !published {
            debug!("Discarding override snapshot loaded before an invalidation");
        }
        published
    }

    /// Clear the slot so the next read goes to the store.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.slot.store(None);
    }

    /// Cache hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = (self.hits(), self.misses());
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl Default for OverrideCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
