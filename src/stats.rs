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

use std::sync::atomic::{AtomicU64, Ordering};

/// In-process snapshot of lifecycle-hook invocation counts.
///
/// The `metrics` crate's recorder is a write-only sink from a test's
/// point of view, so the testable properties in the crate's top-level
/// docs (e.g. "`#onBorrow == #onRelease` at quiescence") are asserted
/// against this struct instead.
#[derive(Debug, Default)]
pub struct PoolStats {
    created: AtomicU64,
    borrowed: AtomicU64,
    released: AtomicU64,
    removed: AtomicU64,
}

impl PoolStats {
    pub(crate) fn record_create(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_borrow(&self) {
        self.borrowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of resources ever handed to a [`Loader`](crate::Loader).
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of times `on_borrow` has fired.
    pub fn borrowed(&self) -> u64 {
        self.borrowed.load(Ordering::Relaxed)
    }

    /// Number of times `on_release` has fired.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Number of times `on_removal` has fired.
    pub fn removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }
}
