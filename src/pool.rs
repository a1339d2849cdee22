//  Copyright 2024 The Multipool Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    hash::Hash,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};

use crate::{
    cache::{self, CacheSlot, RemovalReason, Weigher},
    error::PoolError,
    handle::Handle,
    key::{ResourceId, ResourceKey, Status},
    lifecycle::{Lifecycle, Loader},
    queue::TransferQueues,
    stats::PoolStats,
};

/// A resource parked by `release(delay)`, waiting out its window on
/// the maintenance thread unless a concurrent `borrow` claims it first
/// through the category's handoff slot (§4.5 of the crate's top-level
/// docs).
struct DeferredEntry<K, R> {
    deadline: Instant,
    category: K,
    key: ResourceKey<K>,
    resource: Arc<R>,
    gate: Arc<AtomicBool>,
}

impl<K, R> PartialEq for DeferredEntry<K, R> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl<K, R> Eq for DeferredEntry<K, R> {}
impl<K, R> PartialOrd for DeferredEntry<K, R> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<K, R> Ord for DeferredEntry<K, R> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

/// Shared state between a `Pool` and its maintenance thread. Kept out
/// of `PoolInner` so the thread can hold a strong reference to exactly
/// this and nothing else, while `PoolInner` only ever needs a `Weak`
/// back into itself for the thread's finalization callback --
/// breaking the cycle the crate's design notes call out.
struct Maintenance<K, R> {
    deferred: Mutex<BinaryHeap<Reverse<DeferredEntry<K, R>>>>,
    cv: Condvar,
    shutdown: AtomicBool,
}

impl<K, R> Default for Maintenance<K, R> {
    fn default() -> Self {
        Self {
            deferred: Mutex::new(BinaryHeap::new()),
            cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }
}

pub(crate) struct PoolInner<K, R> {
    cache: moka::sync::Cache<ResourceId, CacheSlot<K, R>>,
    queues: TransferQueues<K>,
    loader: Arc<dyn Loader<K, R>>,
    lifecycle: Arc<dyn Lifecycle<K, R>>,
    ticker: Arc<dyn Fn() -> i64 + Send + Sync>,
    expire_after_access: Option<i64>,
    expire_after_write: Option<i64>,
    stats: PoolStats,
    maintenance: Arc<Maintenance<K, R>>,
    maintenance_thread: Mutex<Option<JoinHandle<()>>>,
    /// Resources retired by [`Self::on_cache_removal`] while `InFlight`,
    /// keyed by resource id, so whichever side completes the terminal
    /// path -- a real `Handle`'s `release`/`invalidate`, or a `borrow`
    /// that dequeued the key but lost it to this same eviction before
    /// ever handing out a `Handle` -- can still fire `on_removal` with
    /// the actual resource. Entries are removed by whichever side
    /// consumes them; see `complete_release` and `borrow`.
    orphaned: Mutex<HashMap<ResourceId, Arc<R>, RandomState>>,
}

impl<K, R> Drop for PoolInner<K, R> {
    fn drop(&mut self) {
        self.maintenance.shutdown.store(true, Ordering::Release);
        self.maintenance.cv.notify_all();
        if let Some(handle) = self.maintenance_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl<K, R> PoolInner<K, R>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        maximum_size: Option<u64>,
        maximum_weight: Option<u64>,
        weigher: Option<Weigher<K, R>>,
        expire_after_access: Option<Duration>,
        expire_after_write: Option<Duration>,
        ticker: Arc<dyn Fn() -> i64 + Send + Sync>,
        loader: Arc<dyn Loader<K, R>>,
        lifecycle: Arc<dyn Lifecycle<K, R>>,
    ) -> Arc<Self> {
        let pool = Arc::new_cyclic(|weak: &Weak<PoolInner<K, R>>| {
            let listener_pool = weak.clone();
            let cache = cache::build_cache(maximum_size, maximum_weight, weigher, move |key, resource, cause| {
                if let Some(pool) = listener_pool.upgrade() {
                    pool.on_cache_removal(key, resource, cause);
                }
            });
            PoolInner {
                cache,
                queues: TransferQueues::default(),
                loader,
                lifecycle,
                ticker,
                expire_after_access: expire_after_access.map(|d| d.as_nanos() as i64),
                expire_after_write: expire_after_write.map(|d| d.as_nanos() as i64),
                stats: PoolStats::default(),
                maintenance: Arc::new(Maintenance::default()),
                maintenance_thread: Mutex::new(None),
                orphaned: Mutex::new(HashMap::default()),
            }
        });

        let maintenance = pool.maintenance.clone();
        let weak_pool = Arc::downgrade(&pool);
        let thread = std::thread::Builder::new()
            .name("multipool-maintenance".into())
            .spawn(move || Self::maintenance_loop(maintenance, weak_pool))
            .expect("failed to spawn multipool maintenance thread");
        *pool.maintenance_thread.lock() = Some(thread);

        pool
    }

    fn maintenance_loop(maintenance: Arc<Maintenance<K, R>>, pool: Weak<Self>) {
        loop {
            let mut heap = maintenance.deferred.lock();
            if maintenance.shutdown.load(Ordering::Acquire) {
                return;
            }
            match heap.peek() {
                Some(Reverse(entry)) => {
                    let now = Instant::now();
                    if entry.deadline <= now {
                        let Reverse(entry) = heap.pop().expect("just peeked");
                        drop(heap);
                        if let Some(pool) = pool.upgrade() {
                            pool.finalize_deferred(entry);
                        }
                    } else {
                        let wait = entry.deadline - now;
                        maintenance.cv.wait_for(&mut heap, wait);
                    }
                }
                None => {
                    maintenance.cv.wait(&mut heap);
                }
            }
        }
    }

    fn now(&self) -> i64 {
        (self.ticker)()
    }

    fn call_hook(&self, name: &'static str, f: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
            tracing::error!(hook = name, "lifecycle hook panicked; pool state transition continues");
        }
    }

    fn fire_on_create(&self, category: &K, resource: &R) {
        self.stats.record_create();
        metrics::counter!("multipool_created_total").increment(1);
        self.call_hook("on_create", || self.lifecycle.on_create(category, resource));
    }

    fn fire_on_borrow(&self, category: &K, resource: &R) {
        self.stats.record_borrow();
        metrics::counter!("multipool_borrowed_total").increment(1);
        self.call_hook("on_borrow", || self.lifecycle.on_borrow(category, resource));
    }

    fn fire_on_release(&self, category: &K, resource: &R) {
        self.stats.record_release();
        metrics::counter!("multipool_released_total").increment(1);
        self.call_hook("on_release", || self.lifecycle.on_release(category, resource));
    }

    fn fire_on_removal(&self, category: &K, resource: &R) {
        self.stats.record_removal();
        metrics::counter!("multipool_removed_total").increment(1);
        self.call_hook("on_removal", || self.lifecycle.on_removal(category, resource));
    }

    /// §4.2: borrow loop. Returns the `ResourceKey` and resource for a
    /// fresh `Handle`; never blocks waiting for availability, only
    /// inside the loader (or, if hit, the handoff slot, which is a
    /// non-blocking `try`).
    pub(crate) fn borrow(&self, category: K) -> Result<(ResourceKey<K>, Arc<R>), PoolError> {
        loop {
            if let Some(key) = self.queues.claim_handoff(&category) {
                match self.cache.get(&key.id()) {
                    Some(slot) => {
                        self.fire_on_borrow(&category, &slot.resource);
                        return Ok((key, slot.resource));
                    }
                    None => {
                        // Evicted despite the still-pending handoff. Winning the
                        // handoff's gate made this the sole owner of the key's
                        // fate -- `finalize_deferred` will see the gate already
                        // taken and no-op -- so if the listener got to it first
                        // (InFlight -> Retired, stashing the resource), complete
                        // the terminal path here before falling through to a
                        // fresh attempt.
                        if key.cas(Status::Retired, Status::Dead) {
                            if let Some(resource) = self.orphaned.lock().remove(&key.id()) {
                                self.fire_on_removal(&category, &resource);
                            }
                        }
                        self.queues.release_ref(&category);
                        continue;
                    }
                }
            }

            if let Some(key) = self.queues.pop_idle(&category) {
                if !key.cas(Status::Idle, Status::InFlight) {
                    // Stale: the evictor already retired this key while it sat
                    // in the queue. Discard and keep polling (§4.2/§4.4).
                    continue;
                }
                match self.cache.get(&key.id()) {
                    Some(slot) => {
                        key.touch(self.now());
                        self.queues.acquire(&category);
                        self.fire_on_borrow(&category, &slot.resource);
                        return Ok((key, slot.resource));
                    }
                    None => {
                        // Evicted between poll and lookup.
                        if !key.cas(Status::InFlight, Status::Dead) {
                            // Lost the race to the removal listener, which
                            // already drove this key to `Retired`. No `Handle`
                            // was ever handed out for this attempt, so there is
                            // no release left to complete the terminal path --
                            // do it here, using the resource the listener
                            // stashed for exactly this case.
                            if key.cas(Status::Retired, Status::Dead) {
                                if let Some(resource) = self.orphaned.lock().remove(&key.id()) {
                                    self.fire_on_removal(&category, &resource);
                                }
                            }
                        }
                        continue;
                    }
                }
            }

            let now = self.now();
            let key = ResourceKey::new(category.clone(), now);
            let resource = Arc::new(self.loader.load(&category)?);
            self.cache.insert(key.id(), CacheSlot {
                key: key.clone(),
                resource: resource.clone(),
            });
            self.cache.run_pending_tasks();
            self.fire_on_create(&category, &resource);
            self.queues.acquire(&category);
            self.fire_on_borrow(&category, &resource);
            return Ok((key, resource));
        }
    }

    /// Shared `InFlight -> Idle` / `Retired -> Dead` transition, used
    /// by an immediate `release()`, by `invalidate()`'s retired branch,
    /// and by a deferred release once its handoff gate is won.
    fn complete_release(&self, key: &ResourceKey<K>, resource: &Arc<R>, category: &K) {
        loop {
            match key.status() {
                Status::InFlight => {
                    if key.cas(Status::InFlight, Status::Idle) {
                        key.touch(self.now());
                        self.queues.push_idle(category, key.clone());
                        self.fire_on_release(category, resource);
                        return;
                    }
                    // Lost the race to the removal listener; reread and retry
                    // -- the only other legal destination is `Retired`.
                }
                Status::Retired => {
                    if key.cas(Status::Retired, Status::Dead) {
                        self.orphaned.lock().remove(&key.id());
                        self.fire_on_release(category, resource);
                        self.fire_on_removal(category, resource);
                    }
                    return;
                }
                Status::Idle | Status::Dead => return,
            }
        }
    }

    pub(crate) fn release(&self, key: &ResourceKey<K>, resource: &Arc<R>, category: &K) {
        self.complete_release(key, resource, category);
        self.queues.release_ref(category);
    }

    pub(crate) fn invalidate(&self, key: &ResourceKey<K>, resource: &Arc<R>, category: &K) {
        if key.status() == Status::InFlight {
            self.cache.invalidate(&key.id());
            self.cache.run_pending_tasks();
        }
        self.complete_release(key, resource, category);
        self.queues.release_ref(category);
    }

    pub(crate) fn release_after(&self, key: &ResourceKey<K>, resource: &Arc<R>, category: &K, delay: Duration) {
        if key.status() != Status::InFlight {
            self.complete_release(key, resource, category);
            self.queues.release_ref(category);
            return;
        }

        // Pin the category queue for the life of the handoff; whichever
        // side wins the gate -- a claiming borrow or this deadline --
        // inherits the pin and is responsible for releasing it.
        self.queues.acquire(category);
        let gate = Arc::new(AtomicBool::new(false));
        self.queues.publish_handoff(category, key.clone(), gate.clone());

        let entry = DeferredEntry {
            deadline: Instant::now() + delay,
            category: category.clone(),
            key: key.clone(),
            resource: resource.clone(),
            gate,
        };
        self.maintenance.deferred.lock().push(Reverse(entry));
        self.maintenance.cv.notify_all();

        // The Handle's own reference ends here; the pin above lives on
        // independently until the handoff resolves.
        self.queues.release_ref(category);
    }

    fn finalize_deferred(&self, entry: DeferredEntry<K, R>) {
        if entry
            .gate
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A borrow already claimed this handoff; its handle now owns
            // the pin registered in `release_after`.
            return;
        }
        self.complete_release(&entry.key, &entry.resource, &entry.category);
        self.queues.release_ref(&entry.category);
    }

    /// The cache's removal listener (§4.4), invoked by `moka` for any
    /// reason -- size, weight, expiry, or an explicit invalidation.
    fn on_cache_removal(&self, key: ResourceKey<K>, resource: Arc<R>, _cause: RemovalReason) {
        match key.status() {
            Status::Idle => {
                if key.cas(Status::Idle, Status::Retired) {
                    // No live Handle is waiting on this key -- it was sitting
                    // idle, so the terminal path runs to completion right
                    // here instead of waiting on a `release()` that will
                    // never come.
                    if key.cas(Status::Retired, Status::Dead) {
                        self.fire_on_removal(key.category(), &resource);
                    }
                } else {
                    // Lost the race: a concurrent `borrow` already dequeued
                    // and CAS'd this key to `InFlight`. Fall through to the
                    // in-flight path -- the same race the comment on
                    // `retire_in_flight` describes.
                    self.retire_in_flight(&key, resource);
                }
            }
            Status::InFlight => self.retire_in_flight(&key, resource),
            Status::Retired | Status::Dead => {}
        }
    }

    /// `InFlight -> Retired`, stashing `resource` first so whichever side
    /// completes the terminal path can still fire `on_removal` with it.
    ///
    /// Ordinarily that side is the outstanding `Handle`'s eventual
    /// `release()`/`invalidate()`, which already carries its own clone of
    /// the resource and removes the stash entry once it finishes (see
    /// `complete_release`) -- the stash goes unused in that common case.
    /// But a `borrow` can also dequeue a key from the idle queue, CAS it
    /// `Idle -> InFlight`, and lose the resource to this exact eviction
    /// before ever constructing a `Handle`; that caller has no resource
    /// of its own to fire `on_removal` with, so it reads the stash
    /// instead (see the idle-reuse branch of `borrow`).
    ///
    /// If the `InFlight -> Retired` CAS itself loses -- a concurrent
    /// `invalidate()` or another removal got there first -- the stash
    /// entry is rolled back; that other transition owns the resource.
    fn retire_in_flight(&self, key: &ResourceKey<K>, resource: Arc<R>) {
        self.orphaned.lock().insert(key.id(), resource);
        if !key.cas(Status::InFlight, Status::Retired) {
            self.orphaned.lock().remove(&key.id());
        }
    }

    pub(crate) fn size(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub(crate) fn clean_up(&self) {
        let now = self.now();
        let mut expired = Vec::new();
        for (_id, slot) in self.cache.iter() {
            let key = &slot.key;
            if key.status() == Status::Dead {
                continue;
            }
            let write_expired = self
                .expire_after_write
                .is_some_and(|dur| now.saturating_sub(key.created_at()) >= dur);
            let access_expired = key.status() == Status::Idle
                && self
                    .expire_after_access
                    .is_some_and(|dur| now.saturating_sub(key.last_access()) >= dur);
            if write_expired || access_expired {
                expired.push(key.id());
            }
        }
        if !expired.is_empty() {
            for id in expired {
                self.cache.invalidate(&id);
            }
            self.cache.run_pending_tasks();
        }
        self.drain_due_deferred();
        self.queues.reap_unreferenced();
    }

    fn drain_due_deferred(&self) {
        loop {
            let due = {
                let mut heap = self.maintenance.deferred.lock();
                match heap.peek() {
                    Some(Reverse(entry)) if entry.deadline <= Instant::now() => heap.pop().map(|Reverse(e)| e),
                    _ => None,
                }
            };
            match due {
                Some(entry) => self.finalize_deferred(entry),
                None => break,
            }
        }
    }

    pub(crate) fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        self.queues.reap_unreferenced();
    }

    pub(crate) fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

/// A multiway keyed resource pool: the public entry point described in
/// the crate's top-level docs.
///
/// Cloning a `Pool` is cheap (an `Arc` bump); every clone shares the
/// same cache, transfer queues, and maintenance thread.
pub struct Pool<K, R> {
    pub(crate) inner: Arc<PoolInner<K, R>>,
}

impl<K, R> Clone for Pool<K, R> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<K, R> Pool<K, R>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub(crate) fn from_inner(inner: Arc<PoolInner<K, R>>) -> Self {
        Self { inner }
    }

    /// Borrows a resource for `category`, creating one via the
    /// configured loader on a cache miss. Never returns a "null"
    /// handle; loader errors propagate unchanged.
    pub fn borrow(&self, category: K) -> Result<Handle<K, R>, PoolError> {
        let (key, resource) = self.inner.borrow(category.clone())?;
        Ok(Handle::new(Arc::downgrade(&self.inner), key, resource, category))
    }

    /// Number of resources currently held by the cache.
    pub fn size(&self) -> u64 {
        self.inner.size()
    }

    /// Synchronously drains pending eviction work: TTL sweeps, capacity
    /// housekeeping, due deferred releases, and unreferenced transfer
    /// queues. Required for deterministic tests that drive time with
    /// an injected `ticker`.
    pub fn clean_up(&self) {
        self.inner.clean_up();
    }

    /// Evicts every cached resource.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// In-process lifecycle-hook invocation counters.
    pub fn stats(&self) -> &PoolStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;

    use rand::{rngs::SmallRng, RngCore, SeedableRng};

    use super::*;
    use crate::{builder::PoolBuilder, key::Status};

    fn string_loader(category: &u64) -> anyhow::Result<String> {
        Ok(format!("resource-for-{category}"))
    }

    #[test_log::test]
    fn reuse_returns_the_same_resource_identity() {
        let pool = PoolBuilder::<u64, String>::new().loader(string_loader).build();

        let h1 = pool.borrow(1).unwrap();
        let id1 = h1.id();
        h1.release();

        let h2 = pool.borrow(1).unwrap();
        assert_eq!(h2.id(), id1);
        h2.release();

        assert_eq!(pool.stats().created(), 1);
        assert_eq!(pool.stats().borrowed(), 2);
        assert_eq!(pool.stats().released(), 2);
        assert_eq!(pool.stats().removed(), 0);
    }

    #[test_log::test]
    fn zero_capacity_evicts_every_release() {
        let pool = PoolBuilder::<u64, String>::new().maximum_size(0).loader(string_loader).build();

        let h1 = pool.borrow(1).unwrap();
        let id1 = h1.id();
        h1.release();

        let h2 = pool.borrow(1).unwrap();
        let id2 = h2.id();
        h2.release();

        assert_ne!(id1, id2);
        assert_eq!(pool.stats().created(), 2);
        assert_eq!(pool.stats().removed(), 2);
        assert_eq!(pool.size(), 0);
    }

    #[test_log::test]
    fn eviction_while_in_flight_completes_on_release() {
        let pool = PoolBuilder::<u64, String>::new().loader(string_loader).build();

        let h = pool.borrow(1).unwrap();
        assert_eq!(h.status(), Status::InFlight);

        pool.invalidate_all();
        assert_eq!(h.status(), Status::Retired);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.stats().released(), 0);
        assert_eq!(pool.stats().removed(), 0);

        h.release();
        assert_eq!(h.status(), Status::Dead);
        assert_eq!(pool.stats().released(), 1);
        assert_eq!(pool.stats().removed(), 1);
    }

    #[test_log::test]
    fn weighted_capacity_bounds_concurrent_holders() {
        let pool = PoolBuilder::<u64, String>::new()
            .maximum_weight(10, |_category: &u64, _resource: &String| 5)
            .loader(string_loader)
            .build();

        let handles: Vec<_> = (0..100).map(|_| pool.borrow(1).unwrap()).collect();
        assert_eq!(pool.stats().created(), 100);

        for h in handles {
            h.release();
        }
        pool.clean_up();

        assert_eq!(pool.size(), 2);
        assert_eq!(pool.stats().removed(), 98);
    }

    #[test_log::test]
    fn access_ttl_expires_idle_resources() {
        let now = Arc::new(AtomicI64::new(0));
        let ticker_now = now.clone();

        let pool = PoolBuilder::<u64, String>::new()
            .expire_after_access(Duration::from_secs(60))
            .ticker(move || ticker_now.load(Ordering::Relaxed))
            .loader(string_loader)
            .build();

        for category in 0..100 {
            pool.borrow(category).unwrap().release();
        }
        assert_eq!(pool.size(), 100);

        now.store(Duration::from_secs(600).as_nanos() as i64, Ordering::Relaxed);
        pool.clean_up();

        assert_eq!(pool.size(), 0);
        assert_eq!(pool.stats().removed(), 100);
    }

    #[test_log::test]
    fn handoff_beats_delay() {
        let pool = PoolBuilder::<u64, String>::new().loader(string_loader).build();

        let h = pool.borrow(1).unwrap();
        let original_id = h.id();

        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                let start = Instant::now();
                let handed_off = pool.borrow(1).unwrap();
                (handed_off.id(), start.elapsed())
            })
        };

        h.release_after(Duration::from_secs(60));
        let (claimed_id, elapsed) = waiter.join().unwrap();

        assert_eq!(claimed_id, original_id);
        assert!(elapsed < Duration::from_secs(1), "handoff should beat the delay, took {elapsed:?}");
        assert_eq!(pool.stats().created(), 1);
    }

    #[test_log::test]
    fn concurrent_storm_preserves_invariants() {
        let pool = PoolBuilder::<u64, String>::new()
            .maximum_size(16)
            .loader(string_loader)
            .build();

        std::thread::scope(|scope| {
            for t in 0..8u64 {
                let pool = pool.clone();
                scope.spawn(move || {
                    let mut rng = SmallRng::seed_from_u64(t + 1);
                    for _ in 0..2000 {
                        let category = rng.next_u64() % 32;
                        let handle = pool.borrow(category).unwrap();
                        if rng.next_u32() % 7 == 0 {
                            std::thread::yield_now();
                        }
                        handle.release();
                    }
                });
            }
        });
        pool.clean_up();

        let stats = pool.stats();
        assert_eq!(stats.borrowed(), stats.released());
        assert!(pool.size() <= 16);
        assert_eq!(stats.created(), pool.size() + stats.removed());
    }

    #[test_log::test]
    fn invalidate_on_idle_resource_is_terminal() {
        let pool = PoolBuilder::<u64, String>::new().loader(string_loader).build();

        let h = pool.borrow(1).unwrap();
        h.release();
        assert_eq!(pool.size(), 1);

        let h2 = pool.borrow(1).unwrap();
        h2.invalidate();

        assert_eq!(h2.status(), Status::Dead);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.stats().removed(), 1);
        assert_eq!(pool.stats().released(), 2);
    }

    #[test_log::test]
    fn get_fails_after_release() {
        let pool = PoolBuilder::<u64, String>::new().loader(string_loader).build();
        let h = pool.borrow(1).unwrap();
        h.release();
        assert!(matches!(h.get(), Err(PoolError::HandleConsumed)));
    }

    #[test_log::test]
    fn dropping_a_handle_releases_it() {
        let pool = PoolBuilder::<u64, String>::new().loader(string_loader).build();
        {
            let _h = pool.borrow(1).unwrap();
        }
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.stats().released(), 1);
    }

    #[test_log::test]
    fn loader_error_propagates_without_mutating_state() {
        let pool = PoolBuilder::<u64, String>::new()
            .loader(|_: &u64| anyhow::bail!("connection refused"))
            .build();

        let err = pool.borrow(1).unwrap_err();
        assert!(matches!(err, PoolError::Loader(_)));
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.stats().created(), 0);
    }
}
