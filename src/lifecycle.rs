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

/// Hooks into a resource's lifecycle.
///
/// Every method has a no-op default, so implementors only override the
/// hooks they care about. `on_borrow` pairs with exactly one later
/// `on_release`; `on_removal`, if it fires at all, always comes after
/// that pairing has completed and fires exactly once per resource.
///
/// A panic inside any hook is caught at the call site and logged; it
/// never corrupts the pool's own state transitions.
pub trait Lifecycle<K, R>: Send + Sync + 'static {
    /// Called once, right after the loader produces a new resource.
    #[allow(unused_variables)]
    fn on_create(&self, category: &K, resource: &R) {}

    /// Called every time a resource is handed out by `borrow`, whether
    /// freshly created, reused from idle, or recovered from a pending
    /// handoff.
    #[allow(unused_variables)]
    fn on_borrow(&self, category: &K, resource: &R) {}

    /// Called when a `Handle` is released (explicitly or via `Drop`)
    /// and the resource goes back to idle, or when release discovers
    /// the resource was retired out from under it.
    #[allow(unused_variables)]
    fn on_release(&self, category: &K, resource: &R) {}

    /// Called exactly once, when a resource is permanently discarded
    /// -- evicted by capacity or TTL, or explicitly invalidated.
    #[allow(unused_variables)]
    fn on_removal(&self, category: &K, resource: &R) {}
}

/// No-op [`Lifecycle`], used when a pool is built without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLifecycle;

impl<K, R> Lifecycle<K, R> for DefaultLifecycle {}

/// Produces a resource for a category on a cache miss.
///
/// Blanket-implemented for any `Fn(&K) -> anyhow::Result<R>` closure,
/// so most callers never need to name the trait.
pub trait Loader<K, R>: Send + Sync + 'static {
    fn load(&self, category: &K) -> anyhow::Result<R>;
}

impl<K, R, F> Loader<K, R> for F
where
    F: Fn(&K) -> anyhow::Result<R> + Send + Sync + 'static,
{
    fn load(&self, category: &K) -> anyhow::Result<R> {
        self(category)
    }
}
