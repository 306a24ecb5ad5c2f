//! Resource Caches
//!
//! Value-keyed caches of GPU objects with a two-phase creation protocol:
//! keys are *prepared* on the update side (pure CPU work, may acquire
//! dependency entries) and *created* on the render side (device calls).
//!
//! Dependency chain:
//!
//! ```text
//! RendererCacheInstance ─► RendererCache ─► RenderState ─► ShaderProgram ─► ShaderModule
//!          │                    └─────────► ComputeState ─┘
//!          ├─► Texture, Sampler
//!          ├─► Atlas
//!          └─► Geometry
//! ```

pub mod instance;
pub mod keys;
pub mod manager;
pub mod renderer_cache;

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use slotmap::DefaultKey;

use crate::context::GraphicsDeviceContext;
use crate::errors::Result;

pub use instance::{
    RendererCacheInstance, RendererCacheInstanceKey, RendererCacheInstanceUpdate, RendererFlags,
    material_sampler,
};
pub use keys::{
    AtlasKey, AtlasResource, ComputeStateKey, GeometryBuffers, GeometryKey, MaterialShaders,
    RenderStateKey, SamplerKey, ShaderModuleKey, ShaderProgramKey, StateDeps, TextureKey,
};
pub use manager::ResourceManager;
pub use renderer_cache::{
    GpuStorageLayouts, RenderStateEntry, RendererCache, RendererCacheKey, registered_permutations,
};

/// Key of a [`ResourceManager`].
///
/// Equality decides sharing: two equal keys always map to one entry.
pub trait CacheKey: Clone + Eq + Hash + Send + Sync + 'static {
    type Resource: Send + Sync + 'static;
    /// What prepare produced: dependency handles, generated layouts.
    type Deps: Send + Sync + 'static;
    /// Extra update-side input of prepare.
    type Args<'a>;

    /// Resource kind, for logs.
    const KIND: &'static str;

    /// Short human-readable identity, for logs.
    fn label(&self) -> String;

    /// CPU-side preparation. May normalize the key and acquire dependencies;
    /// on error it must release whatever it acquired.
    fn prepare(&mut self, ctx: &GraphicsDeviceContext, args: Self::Args<'_>) -> Result<Self::Deps>;

    /// Render-side creation.
    fn create(&self, deps: &Self::Deps, ctx: &GraphicsDeviceContext) -> Result<Arc<Self::Resource>>;

    fn release_dependencies(&self, _deps: &Self::Deps, _ctx: &GraphicsDeviceContext) {}

    /// Debug builds only: called when a freshly prepared key equals an
    /// existing one. `true` means the two keys prepared different
    /// dependencies, i.e. their identity digest collided.
    fn collides(&self, _existing: &Self::Deps, _prepared: &Self::Deps) -> bool {
        false
    }
}

/// Generation-checked handle to a [`ResourceManager`] entry.
pub struct Handle<K> {
    slot: DefaultKey,
    _marker: PhantomData<fn() -> K>,
}

impl<K> Handle<K> {
    #[inline]
    pub(crate) fn new(slot: DefaultKey) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn slot(self) -> DefaultKey {
        self.slot
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
    }
}

impl<K> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:?})", self.slot)
    }
}
