//! Generic Resource Manager
//!
//! A [`ResourceManager`] maps value-equal keys to one shared GPU resource.
//! Entries live in a generation-checked slot arena, so a released handle can
//! never alias a newer entry that reused its slot.
//!
//! Lifecycle of an entry:
//!
//! 1. [`acquire`](ResourceManager::acquire) (update phase): returns the
//!    existing entry for an equal key (ref count + 1), otherwise prepares
//!    the key, which may acquire dependency entries from other managers,
//!    and inserts it with a ref count of 1.
//! 2. [`resolve`](ResourceManager::resolve) (render phase): builds the GPU
//!    resource on first use. Failures leave the entry empty and are
//!    retried by the next resolve or by
//!    [`create_missing`](ResourceManager::create_missing).
//! 3. [`release`](ResourceManager::release) (update phase): at ref count
//!    zero the entry is removed and its dependencies are released.
//!
//! The internal lock is never held while a key prepares or creates, so keys
//! are free to call into other managers.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slotmap::{DefaultKey, SlotMap};

use super::{CacheKey, Handle};
use crate::context::GraphicsDeviceContext;
use crate::errors::{Result, RhiError};

struct Entry<K: CacheKey> {
    key: K,
    deps: Arc<K::Deps>,
    resource: Option<Arc<K::Resource>>,
    ref_count: u32,
}

struct ManagerInner<K: CacheKey> {
    slots: SlotMap<DefaultKey, Entry<K>>,
    lookup: FxHashMap<K, DefaultKey>,
}

impl<K: CacheKey> Default for ManagerInner<K> {
    fn default() -> Self {
        Self {
            slots: SlotMap::default(),
            lookup: FxHashMap::default(),
        }
    }
}

/// Two-phase, reference-counted cache of one resource kind.
pub struct ResourceManager<K: CacheKey> {
    inner: Mutex<ManagerInner<K>>,
}

impl<K: CacheKey> Default for ResourceManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CacheKey> ResourceManager<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::default(),
        }
    }

    fn bump(inner: &mut ManagerInner<K>, slot: DefaultKey) -> Option<Handle<K>> {
        let entry = inner.slots.get_mut(slot)?;
        entry.ref_count += 1;
        Some(Handle::new(slot))
    }

    /// Returns the entry equal to `key`, preparing and inserting it if needed.
    ///
    /// A failed prepare allocates nothing and is logged with the key's label.
    pub fn acquire(
        &self,
        ctx: &GraphicsDeviceContext,
        mut key: K,
        args: K::Args<'_>,
    ) -> Result<Handle<K>> {
        {
            let mut inner = self.inner.lock();
            if let Some(&slot) = inner.lookup.get(&key)
                && let Some(handle) = Self::bump(&mut inner, slot)
            {
                return Ok(handle);
            }
        }

        let deps = match key.prepare(ctx, args) {
            Ok(deps) => deps,
            Err(e) => {
                log::error!("Failed to prepare {} '{}': {e}", K::KIND, key.label());
                return Err(e);
            }
        };

        let mut inner = self.inner.lock();
        // Preparing may have normalized the key onto an existing entry.
        if let Some(&slot) = inner.lookup.get(&key) {
            if cfg!(debug_assertions)
                && let Some(entry) = inner.slots.get(slot)
                && key.collides(&entry.deps, &deps)
            {
                log::error!(
                    "{} '{}' collides with an existing entry of different layout; sharing it",
                    K::KIND,
                    key.label()
                );
            }
            if let Some(handle) = Self::bump(&mut inner, slot) {
                drop(inner);
                key.release_dependencies(&deps, ctx);
                return Ok(handle);
            }
        }

        let slot = inner.slots.insert(Entry {
            key: key.clone(),
            deps: Arc::new(deps),
            resource: None,
            ref_count: 1,
        });
        inner.lookup.insert(key, slot);
        log::debug!("{} cache: {} entries", K::KIND, inner.slots.len());
        Ok(Handle::new(slot))
    }

    /// Returns the GPU resource of `handle`, creating it on first use.
    ///
    /// `None` when the handle is stale or creation failed; failures are
    /// logged and retried on the next call.
    pub fn resolve(&self, ctx: &GraphicsDeviceContext, handle: Handle<K>) -> Option<Arc<K::Resource>> {
        let (key, deps) = {
            let inner = self.inner.lock();
            let Some(entry) = inner.slots.get(handle.slot()) else {
                log::debug!("Stale {} handle", K::KIND);
                return None;
            };
            if let Some(resource) = &entry.resource {
                return Some(Arc::clone(resource));
            }
            (entry.key.clone(), Arc::clone(&entry.deps))
        };

        match key.create(&deps, ctx) {
            Ok(resource) => {
                let mut inner = self.inner.lock();
                let entry = inner.slots.get_mut(handle.slot())?;
                Some(Arc::clone(entry.resource.get_or_insert(resource)))
            }
            Err(e @ (RhiError::NotReady(_) | RhiError::PassNotAvailable(_))) => {
                log::debug!("{} '{}' not built yet: {e}", K::KIND, key.label());
                None
            }
            Err(e) => {
                log::error!("Failed to create {} '{}': {e}", K::KIND, key.label());
                None
            }
        }
    }

    /// Attempts creation of every live entry without a resource.
    ///
    /// Returns the number of entries still missing afterwards.
    pub fn create_missing(&self, ctx: &GraphicsDeviceContext) -> usize {
        let missing: Vec<Handle<K>> = {
            let inner = self.inner.lock();
            inner
                .slots
                .iter()
                .filter(|(_, entry)| entry.resource.is_none())
                .map(|(slot, _)| Handle::new(slot))
                .collect()
        };
        missing
            .into_iter()
            .filter(|&handle| self.resolve(ctx, handle).is_none())
            .count()
    }

    /// Drops one reference; the last one removes the entry and releases its
    /// dependencies. Returns whether the entry was removed.
    pub fn release(&self, ctx: &GraphicsDeviceContext, handle: Handle<K>) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.slots.get_mut(handle.slot()) else {
                log::warn!("Release of a stale {} handle", K::KIND);
                return false;
            };
            entry.ref_count -= 1;
            if entry.ref_count > 0 {
                return false;
            }
            let Some(entry) = inner.slots.remove(handle.slot()) else {
                return false;
            };
            inner.lookup.remove(&entry.key);
            entry
        };
        removed.key.release_dependencies(&removed.deps, ctx);
        true
    }

    #[must_use]
    pub fn key(&self, handle: Handle<K>) -> Option<K> {
        self.inner.lock().slots.get(handle.slot()).map(|e| e.key.clone())
    }

    /// Dependencies produced when the key was prepared.
    #[must_use]
    pub fn deps(&self, handle: Handle<K>) -> Option<Arc<K::Deps>> {
        self.inner
            .lock()
            .slots
            .get(handle.slot())
            .map(|e| Arc::clone(&e.deps))
    }

    #[must_use]
    pub fn ref_count(&self, handle: Handle<K>) -> u32 {
        self.inner
            .lock()
            .slots
            .get(handle.slot())
            .map_or(0, |e| e.ref_count)
    }

    /// Already-built resource, without attempting creation.
    #[must_use]
    pub fn resource(&self, handle: Handle<K>) -> Option<Arc<K::Resource>> {
        self.inner
            .lock()
            .slots
            .get(handle.slot())
            .and_then(|e| e.resource.clone())
    }

    #[must_use]
    pub fn contains(&self, handle: Handle<K>) -> bool {
        self.inner.lock().slots.contains_key(handle.slot())
    }

    #[must_use]
    pub fn handles(&self) -> Vec<Handle<K>> {
        self.inner.lock().slots.keys().map(Handle::new).collect()
    }

    /// Drops every GPU resource while keeping keys and ref counts, e.g.
    /// after the render passes they were baked against were rebuilt.
    pub fn clear_gpu_resources(&self) {
        for entry in self.inner.lock().slots.values_mut() {
            entry.resource = None;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
