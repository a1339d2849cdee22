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
    fmt,
    hash::Hash,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use crate::{error::PoolError, key::ResourceKey, pool::PoolInner};

/// A single-use ownership token over one borrowed resource.
///
/// A `Handle` is exclusive: the `ResourceKey` it wraps is `InFlight`
/// for exactly as long as this handle (or whichever handle a
/// `release(delay)` handoff transfers it to) has not yet released or
/// invalidated it. Dropping a `Handle` without an explicit call is
/// equivalent to `release()`, run deterministically at scope exit.
///
/// Not thread-safe against itself: calling `release`/`invalidate`
/// concurrently with `get` on the same `Handle` from another thread is
/// caller misuse, per the crate's top-level docs §4.3.
pub struct Handle<K, R> {
    pool: Weak<PoolInner<K, R>>,
    key: ResourceKey<K>,
    resource: Arc<R>,
    category: K,
    consumed: AtomicBool,
}

impl<K, R> fmt::Debug for Handle<K, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("consumed", &self.consumed.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, R> Handle<K, R>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub(crate) fn new(pool: Weak<PoolInner<K, R>>, key: ResourceKey<K>, resource: Arc<R>, category: K) -> Self {
        Self {
            pool,
            key,
            resource,
            category,
            consumed: AtomicBool::new(false),
        }
    }

    /// Returns the borrowed resource, failing once this handle has
    /// been released or invalidated.
    pub fn get(&self) -> Result<&R, PoolError> {
        if self.consumed.load(Ordering::Acquire) {
            return Err(PoolError::HandleConsumed);
        }
        Ok(&self.resource)
    }

    /// The category this resource was borrowed for.
    pub fn category(&self) -> &K {
        &self.category
    }

    /// Identity of the underlying physical resource. Two handles
    /// borrowed for the same category but backed by different
    /// resources always have different ids; two handles observing the
    /// same reused or handed-off resource share one.
    pub fn id(&self) -> crate::key::ResourceId {
        self.key.id()
    }

    /// The resource's current position in the state machine described
    /// in the crate's top-level docs §4.1. Exposed mainly for tests
    /// asserting on races between release and eviction.
    pub fn status(&self) -> crate::key::Status {
        self.key.status()
    }

    /// Releases the resource back to the pool immediately, making it
    /// available to the next `borrow` of the same category. Idempotent:
    /// a second call on an already-consumed handle is a silent no-op.
    pub fn release(&self) {
        if self.consumed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.release(&self.key, &self.resource, &self.category);
        }
    }

    /// Schedules the release to take effect after `delay`. The handle
    /// is consumed immediately -- a subsequent `get` fails right away
    /// -- but the resource is reserved for direct transfer to any
    /// `borrow` of the same category during the delay window (§4.5).
    pub fn release_after(&self, delay: Duration) {
        if self.consumed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.release_after(&self.key, &self.resource, &self.category, delay);
        }
    }

    /// Forces the resource out of the pool permanently. Idempotent,
    /// like [`Self::release`].
    pub fn invalidate(&self) {
        if self.consumed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.invalidate(&self.key, &self.resource, &self.category);
        }
    }
}

impl<K, R> Drop for Handle<K, R>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.release();
    }
}
