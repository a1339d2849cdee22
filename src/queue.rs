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
    hash::Hash,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use ahash::RandomState;
use crossbeam::queue::SegQueue;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::key::ResourceKey;

/// A resource parked by a deferred `release(delay)`, awaiting either a
/// claiming `borrow` or the delay's natural expiry.
///
/// `gate` is the single point of truth for which side -- a claiming
/// `borrow` or the deadline firing in maintenance -- gets to act on
/// this specific handoff. Both race a CAS on it; exactly one wins.
/// See the crate's top-level docs, §4.5, for the race this resolves:
/// most-recent-wins among overlapping delay windows. Superseding a
/// still-unclaimed handoff (by publishing a newer one for the same
/// category) simply drops it from the slot; its own deadline still
/// fires later and wins its own gate, so the resource is never lost,
/// only no longer directly reachable by a claiming `borrow`.
pub(crate) struct Handoff<K> {
    pub(crate) key: ResourceKey<K>,
    pub(crate) gate: Arc<AtomicBool>,
}

/// Per-category state: the FIFO of idle keys plus the single-slot
/// handoff used by `release(delay)`.
pub(crate) struct CategoryQueue<K> {
    idle: SegQueue<ResourceKey<K>>,
    handoff: Mutex<Option<Handoff<K>>>,
    /// Count of idle entries plus live (unconsumed) `Handle`s touching
    /// this category. When it drops to zero during maintenance the
    /// entry is eligible for removal from the parent map (§4.6).
    refs: AtomicUsize,
}

impl<K> Default for CategoryQueue<K> {
    fn default() -> Self {
        Self {
            idle: SegQueue::new(),
            handoff: Mutex::new(None),
            refs: AtomicUsize::new(0),
        }
    }
}

impl<K> CategoryQueue<K> {
    fn inc_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    fn dec_ref(&self) {
        self.refs.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn is_unreferenced(&self) -> bool {
        self.refs.load(Ordering::Acquire) == 0 && self.idle.is_empty()
    }

    /// Publishes a key for direct transfer, superseding any earlier
    /// unclaimed handoff (most-recent-wins, per the crate's open
    /// questions note on overlapping delay windows).
    fn publish_handoff(&self, key: ResourceKey<K>, gate: Arc<AtomicBool>) {
        *self.handoff.lock() = Some(Handoff { key, gate });
    }

    /// Attempts to claim whatever is currently parked in the handoff
    /// slot. Pops the slot unconditionally, then races the deadline
    /// for ownership of the entry via its gate; losing that race just
    /// means the deadline got there first, so the caller falls back to
    /// the idle queue or a fresh `load`.
    fn claim_handoff(&self) -> Option<ResourceKey<K>> {
        let handoff = self.handoff.lock().take()?;
        handoff
            .gate
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(handoff.key)
    }
}

/// The mapping from category key to its [`CategoryQueue`], created
/// lazily on first use and discardable once empty and unreferenced
/// (§4.6 of the crate's top-level docs).
pub(crate) struct TransferQueues<K> {
    categories: RwLock<HashMap<K, Arc<CategoryQueue<K>>, RandomState>>,
}

impl<K> Default for TransferQueues<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self {
            categories: RwLock::new(HashMap::default()),
        }
    }
}

impl<K> TransferQueues<K>
where
    K: Hash + Eq + Clone,
{
    /// Fetches the queue for `category`, allocating it if this is the
    /// first reference to that category since the last time it was
    /// reaped by maintenance.
    pub(crate) fn get_or_create(&self, category: &K) -> Arc<CategoryQueue<K>> {
        if let Some(q) = self.categories.read().get(category) {
            return q.clone();
        }
        self.categories
            .write()
            .entry(category.clone())
            .or_default()
            .clone()
    }

    pub(crate) fn get(&self, category: &K) -> Option<Arc<CategoryQueue<K>>> {
        self.categories.read().get(category).cloned()
    }

    /// Registers one live `Handle` against `category`'s queue,
    /// creating the queue if needed. Call when a `borrow` hands out a
    /// fresh or reused `ResourceKey`.
    pub(crate) fn acquire(&self, category: &K) -> Arc<CategoryQueue<K>> {
        let q = self.get_or_create(category);
        q.inc_ref();
        q
    }

    /// Releases the reference registered by [`Self::acquire`].
    pub(crate) fn release_ref(&self, category: &K) {
        if let Some(q) = self.get(category) {
            q.dec_ref();
        }
    }

    /// Enqueues an idle key for reuse.
    pub(crate) fn push_idle(&self, category: &K, key: ResourceKey<K>) {
        let q = self.get_or_create(category);
        q.idle.push(key);
    }

    /// Pops the next candidate idle key, if any. The caller is
    /// responsible for CAS-ing it `Idle -> InFlight`; a key that lost
    /// that race (already `Retired`/`Dead` by eviction) must simply be
    /// dropped and polling retried, per §4.2/§4.4.
    pub(crate) fn pop_idle(&self, category: &K) -> Option<ResourceKey<K>> {
        self.get(category).and_then(|q| q.idle.pop())
    }

    /// Publishes `key` to `category`'s handoff slot, guarded by
    /// `gate`, superseding any earlier unclaimed handoff for that
    /// category.
    pub(crate) fn publish_handoff(&self, category: &K, key: ResourceKey<K>, gate: Arc<AtomicBool>) {
        let q = self.get_or_create(category);
        q.publish_handoff(key, gate);
    }

    /// Attempts to claim a pending handoff for `category` before
    /// falling back to the idle queue, per §4.5.
    pub(crate) fn claim_handoff(&self, category: &K) -> Option<ResourceKey<K>> {
        self.get(category).and_then(|q| q.claim_handoff())
    }

    /// Drops category entries that are empty and hold no live
    /// `Handle` references. Best-effort: a category racing a fresh
    /// `borrow` may simply be re-allocated on next use.
    pub(crate) fn reap_unreferenced(&self) {
        self.categories.write().retain(|_, q| !q.is_unreferenced());
    }
}
