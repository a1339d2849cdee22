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

//! The black-box weighted/expiring cache the crate's top-level docs
//! describe as an external collaborator (§1: "assumed to be a
//! black-box weighted cache ... e.g. Caffeine/Guava-cache-
//! equivalent"). `moka::sync::Cache` is the cache backend: a
//! Caffeine-equivalent weighted/TTL cache for Rust with a synchronous
//! eviction listener, which is exactly the contract the pool's removal
//! path (§4.4) needs.
//!
//! `expireAfterAccess`/`expireAfterWrite` are deliberately *not*
//! delegated to moka's own wall-clock TTL support: the builder's
//! `ticker` must be injectable for deterministic tests, so expiry is
//! instead evaluated against ticker-stamped timestamps carried on each
//! [`ResourceKey`] and swept by [`crate::pool::Pool::clean_up`].

use std::{fmt, hash::Hash, sync::Arc};

use moka::{notification::RemovalCause, sync::Cache};

use crate::key::{ResourceId, ResourceKey};

/// One physical resource as stored in the cache: its identity/status
/// token plus the user object, shared so the cache and a live
/// [`crate::Handle`] can each hold a reference without the resource
/// ever being cloned.
pub(crate) struct CacheSlot<K, R> {
    pub(crate) key: ResourceKey<K>,
    pub(crate) resource: Arc<R>,
}

impl<K, R> Clone for CacheSlot<K, R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            resource: self.resource.clone(),
        }
    }
}

impl<K, R> fmt::Debug for CacheSlot<K, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSlot").field("key", &self.key).finish()
    }
}

/// Why an entry left the cache. Mirrors `moka`'s own
/// [`RemovalCause`] so the removal listener in `pool.rs` does not leak
/// a third-party type through its own public surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Evicted by size or weight capacity.
    Capacity,
    /// Expired per `expireAfterAccess`/`expireAfterWrite`, or any
    /// other explicit `invalidate`/`invalidate_all` call.
    Explicit,
}

impl From<RemovalCause> for RemovalReason {
    fn from(cause: RemovalCause) -> Self {
        match cause {
            RemovalCause::Size => RemovalReason::Capacity,
            RemovalCause::Expired | RemovalCause::Explicit | RemovalCause::Replaced => RemovalReason::Explicit,
        }
    }
}

pub(crate) type Weigher<K, R> = Arc<dyn Fn(&K, &R) -> u32 + Send + Sync>;

/// Builds the `moka` cache with the capacity policy and removal
/// listener the pool needs. Kept free-standing (rather than a method
/// on `PoolInner`) because it must run inside `Arc::new_cyclic`'s
/// constructor closure, before `PoolInner` itself exists.
pub(crate) fn build_cache<K, R>(
    maximum_size: Option<u64>,
    maximum_weight: Option<u64>,
    weigher: Option<Weigher<K, R>>,
    listener: impl Fn(ResourceKey<K>, Arc<R>, RemovalReason) + Send + Sync + 'static,
) -> Cache<ResourceId, CacheSlot<K, R>>
where
    K: Hash + Eq + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    let capacity = maximum_weight.or(maximum_size).unwrap_or(u64::MAX);
    let mut builder = Cache::builder().max_capacity(capacity);

    if let Some(weigher) = weigher {
        builder = builder.weigher(move |_id, slot: &CacheSlot<K, R>| weigher(slot.key.category(), &slot.resource).max(1));
    }

    let builder = builder.eviction_listener(move |_id, slot: CacheSlot<K, R>, cause| {
        listener(slot.key, slot.resource, cause.into());
    });

    builder.build()
}
