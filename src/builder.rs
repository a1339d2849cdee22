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
    marker::PhantomData,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use crate::{
    cache::Weigher,
    lifecycle::{DefaultLifecycle, Lifecycle, Loader},
    pool::{Pool, PoolInner},
};

/// The instant the process's first pool was built, lazily pinned as the
/// origin for [`default_ticker`]'s nanosecond offsets.
fn ticker_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Default time source: a monotonic clock, per the crate's top-level
/// docs §6 ("defaults to monotonic clock"). `Instant` never steps
/// backwards the way a wall clock can, so `expireAfterWrite`'s
/// `now - created_at` math can't go negative across a clock
/// adjustment.
fn default_ticker() -> i64 {
    ticker_origin().elapsed().as_nanos() as i64
}

/// Builds a [`Pool`].
///
/// `loader` is the only required option. `maximum_size` and
/// `maximum_weight` are mutually exclusive, mirroring the same
/// constraint on the black-box cache the crate's top-level docs
/// describe (§6).
pub struct PoolBuilder<K, R> {
    maximum_size: Option<u64>,
    maximum_weight: Option<u64>,
    weigher: Option<Weigher<K, R>>,
    expire_after_access: Option<Duration>,
    expire_after_write: Option<Duration>,
    ticker: Arc<dyn Fn() -> i64 + Send + Sync>,
    lifecycle: Arc<dyn Lifecycle<K, R>>,
    loader: Option<Arc<dyn Loader<K, R>>>,
    _marker: PhantomData<fn() -> (K, R)>,
}

impl<K, R> Default for PoolBuilder<K, R>
where
    K: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            maximum_size: None,
            maximum_weight: None,
            weigher: None,
            expire_after_access: None,
            expire_after_write: None,
            ticker: Arc::new(default_ticker),
            lifecycle: Arc::new(DefaultLifecycle),
            loader: None,
            _marker: PhantomData,
        }
    }
}

impl<K, R> PoolBuilder<K, R>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound on the number of cached resources. Mutually
    /// exclusive with [`Self::maximum_weight`].
    pub fn maximum_size(mut self, maximum_size: u64) -> Self {
        assert!(self.maximum_weight.is_none(), "maximum_size and maximum_weight are mutually exclusive");
        self.maximum_size = Some(maximum_size);
        self
    }

    /// Upper bound on summed weight, with `weigher` computing each
    /// resource's weight. Weights are clamped to at least 1 (the
    /// spec's open question (b): a zero-weight resource would defeat
    /// the size bound). Mutually exclusive with [`Self::maximum_size`].
    pub fn maximum_weight(mut self, maximum_weight: u64, weigher: impl Fn(&K, &R) -> u32 + Send + Sync + 'static) -> Self {
        assert!(self.maximum_size.is_none(), "maximum_size and maximum_weight are mutually exclusive");
        self.maximum_weight = Some(maximum_weight);
        self.weigher = Some(Arc::new(weigher));
        self
    }

    /// Idle resources unused for this long are evicted.
    pub fn expire_after_access(mut self, duration: Duration) -> Self {
        self.expire_after_access = Some(duration);
        self
    }

    /// Resources older than this (since creation) are evicted
    /// regardless of use.
    pub fn expire_after_write(mut self, duration: Duration) -> Self {
        self.expire_after_write = Some(duration);
        self
    }

    /// Overrides the time source. Defaults to the system's monotonic-
    /// ish wall clock; tests should inject a deterministic ticker and
    /// drive it alongside [`Pool::clean_up`].
    pub fn ticker(mut self, ticker: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.ticker = Arc::new(ticker);
        self
    }

    /// Installs user lifecycle hooks.
    pub fn lifecycle(mut self, lifecycle: impl Lifecycle<K, R>) -> Self {
        self.lifecycle = Arc::new(lifecycle);
        self
    }

    /// Supplies new resources on demand. Required.
    pub fn loader(mut self, loader: impl Loader<K, R>) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Builds the pool. Panics if no loader was configured, or if a
    /// `maximum_weight` was set without a weigher.
    pub fn build(self) -> Pool<K, R> {
        let loader = self.loader.expect("PoolBuilder::loader is required");
        if self.maximum_weight.is_some() {
            assert!(self.weigher.is_some(), "maximum_weight requires a weigher");
        }
        let inner = PoolInner::new(
            self.maximum_size,
            self.maximum_weight,
            self.weigher,
            self.expire_after_access,
            self.expire_after_write,
            self.ticker,
            loader,
            self.lifecycle,
        );
        Pool::from_inner(inner)
    }
}
