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
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
};

/// The four states a [`ResourceKey`] moves through over its lifetime.
///
/// Transitions are CAS-only -- see the table in the crate's top-level
/// docs for the full set of legal `from -> to` pairs. `Dead` is
/// terminal: a dead key is never revived.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle = 0,
    InFlight = 1,
    Retired = 2,
    Dead = 3,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Status::Idle,
            1 => Status::InFlight,
            2 => Status::Retired,
            3 => Status::Dead,
            _ => unreachable!("invalid ResourceKey status byte: {v}"),
        }
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of one physical resource instance.
///
/// Two `ResourceId`s are never equal even when minted for the same
/// category -- identity, not category, is what the cache and transfer
/// queues index on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Inner<K> {
    id: ResourceId,
    category: K,
    status: AtomicU8,
    created_at: i64,
    last_access: AtomicI64,
}

/// The per-instance identity/status token described in the crate's
/// data model: the cache, a transfer queue, and a live [`Handle`] each
/// hold their own clone of the same `ResourceKey`, and its `status`
/// field is the single source of truth the whole state machine CASes
/// on.
///
/// [`Handle`]: crate::Handle
pub struct ResourceKey<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for ResourceKey<K> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<K> PartialEq for ResourceKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<K> Eq for ResourceKey<K> {}

impl<K> Hash for ResourceKey<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<K> fmt::Debug for ResourceKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceKey")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<K> ResourceKey<K> {
    /// Mints a fresh key, already in `InFlight` -- a `ResourceKey` is
    /// never observed by anyone before its resource exists.
    pub(crate) fn new(category: K, now: i64) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ResourceId::next(),
                category,
                status: AtomicU8::new(Status::InFlight as u8),
                created_at: now,
                last_access: AtomicI64::new(now),
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    pub fn category(&self) -> &K {
        &self.inner.category
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub(crate) fn created_at(&self) -> i64 {
        self.inner.created_at
    }

    pub(crate) fn last_access(&self) -> i64 {
        self.inner.last_access.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self, now: i64) {
        self.inner.last_access.store(now, Ordering::Relaxed);
    }

    /// Attempts the CAS `from -> to`. Returns `true` on success; on
    /// failure another thread has already moved the key on and the
    /// caller is expected to re-read `status()` and act accordingly.
    pub(crate) fn cas(&self, from: Status, to: Status) -> bool {
        self.inner
            .status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
