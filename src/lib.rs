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

//! `multipool` is a multiway keyed resource pool: it amortizes the
//! cost of expensive per-category resources (database sessions,
//! network connections, compiled templates) by reusing idle instances
//! across borrowers, while a single global weighted/expiring cache
//! bounds the total footprint by size, weight, and TTL.
//!
//! Callers [`Pool::borrow`] a resource for a category, use it
//! exclusively through the returned [`Handle`], and release it --
//! explicitly, after a delay, or implicitly on drop -- making it
//! available to the next borrower of the same category.
//!
//! # Example
//!
//! ```
//! use multipool::PoolBuilder;
//!
//! let pool = PoolBuilder::<String, String>::new()
//!     .maximum_size(1_000)
//!     .loader(|category: &String| Ok(format!("connection to {category}")))
//!     .build();
//!
//! let handle = pool.borrow("db-primary".to_string()).unwrap();
//! assert_eq!(handle.get().unwrap().as_str(), "connection to db-primary");
//! handle.release();
//! ```
//!
//! # Concurrency
//!
//! There is no coarse lock guarding the pool. Per-resource state moves
//! through a four-state machine (`Idle`, `InFlight`, `Retired`, `Dead`)
//! using single-word CAS, so the race between a borrower, a releaser,
//! and the cache's own eviction thread can never corrupt reference
//! counts or double-invoke a lifecycle hook. See the `pool` module's
//! docs for the full transition table.

mod builder;
mod cache;
mod error;
mod handle;
mod key;
mod lifecycle;
mod pool;
mod queue;
mod stats;

pub use builder::PoolBuilder;
pub use error::PoolError;
pub use handle::Handle;
pub use key::{ResourceId, Status};
pub use lifecycle::{DefaultLifecycle, Lifecycle, Loader};
pub use pool::Pool;
pub use stats::PoolStats;
