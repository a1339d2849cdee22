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

use thiserror::Error;

/// Errors surfaced by [`crate::Pool`] and [`crate::Handle`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configured [`Loader`](crate::Loader) failed to produce a
    /// resource. The inner error is whatever the loader returned,
    /// unchanged.
    #[error("loader failed: {0}")]
    Loader(#[from] anyhow::Error),

    /// The handle has already been released or invalidated.
    #[error("handle has already been released or invalidated")]
    HandleConsumed,

    /// A status-CAS chain reached a pre-state the state machine proves
    /// unreachable during correct operation. Indicates a bug in the
    /// pool itself rather than caller misuse.
    #[error("pool invariant violated: {0}")]
    InvariantViolation(&'static str),
}
