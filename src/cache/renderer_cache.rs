//! Renderer Cache
//!
//! Per-renderer aggregate of every render state and compute state a
//! renderer of its class could need on this device. All permutations are
//! registered up front so draws never trigger a synchronous shader build;
//! the device objects themselves are only baked on first lookup.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::keys::{ComputeStateKey, RenderStateKey};
use super::{CacheKey, Handle};
use crate::binding::{
    ComputeShaderType, NeededConstants, ParticlePass, PassList, SetRole, ShaderOptions,
    find_render_passes,
};
use crate::context::GraphicsDeviceContext;
use crate::errors::{Result, RhiError};
use crate::material::{RendererClass, RendererDescriptor};
use crate::rhi::{ComputeState, ConstantSetLayout, GpuCaps, RenderState};

// ============================================================================
// Registration
// ============================================================================

/// Appends `options[from..] | flag` after the existing entries.
fn mult(options: &mut Vec<ShaderOptions>, flag: ShaderOptions, from: usize) {
    let doubled: Vec<ShaderOptions> = options[from..].iter().map(|&o| o | flag).collect();
    options.extend(doubled);
}

const BILLBOARD_GEOM: [ShaderOptions; 4] = [
    ShaderOptions::GEOM_BILLBOARDING,
    ShaderOptions::GEOM_BILLBOARDING.union(ShaderOptions::AXIS_C1),
    ShaderOptions::GEOM_BILLBOARDING
        .union(ShaderOptions::AXIS_C1)
        .union(ShaderOptions::CAPSULE),
    ShaderOptions::GEOM_BILLBOARDING.union(ShaderOptions::AXIS_C2),
];

const BILLBOARD_VERTEX: [ShaderOptions; 4] = [
    ShaderOptions::VERTEX_BILLBOARDING,
    ShaderOptions::VERTEX_BILLBOARDING.union(ShaderOptions::AXIS_C1),
    ShaderOptions::VERTEX_BILLBOARDING
        .union(ShaderOptions::AXIS_C1)
        .union(ShaderOptions::CAPSULE),
    ShaderOptions::VERTEX_BILLBOARDING.union(ShaderOptions::AXIS_C2),
];

const GPU_SORT_COMPUTES: [ComputeShaderType; 5] = [
    ComputeShaderType::SortKeys,
    ComputeShaderType::SortKeysCameraDistance,
    ComputeShaderType::SortUpSweep,
    ComputeShaderType::SortPrefixSum,
    ComputeShaderType::SortDownSweep,
];

const RIBBON_COMPUTES: [ComputeShaderType; 8] = [
    ComputeShaderType::SortKeysRibbonIndirection,
    ComputeShaderType::SortKeysCameraDistanceRibbonIndirection,
    ComputeShaderType::SortUpSweep,
    ComputeShaderType::SortPrefixSum,
    ComputeShaderType::SortDownSweep,
    ComputeShaderType::SortUpSweepKeyStride64,
    ComputeShaderType::SortDownSweepKeyStride64,
    ComputeShaderType::RibbonSortKeys,
];

const MESH_COMPUTES: [ComputeShaderType; 11] = [
    ComputeShaderType::CountPerMesh,
    ComputeShaderType::CountPerMeshMeshAtlas,
    ComputeShaderType::CountPerMeshLod,
    ComputeShaderType::CountPerMeshLodMeshAtlas,
    ComputeShaderType::InitIndirectionOffsets,
    ComputeShaderType::InitIndirectionOffsetsLodNoAtlas,
    ComputeShaderType::MeshIndirection,
    ComputeShaderType::MeshIndirectionMeshAtlas,
    ComputeShaderType::MeshIndirectionLod,
    ComputeShaderType::MeshIndirectionLodMeshAtlas,
    ComputeShaderType::MeshMatrices,
];

/// Every shader option a renderer of `class` may be drawn with on a device
/// with `caps`, plus the compute shaders its GPU simulation needs.
///
/// The plain vertex pass-through permutation is always registered last;
/// every other permutation also carries the pass-through bit.
#[must_use]
pub fn registered_permutations(class: RendererClass, caps: GpuCaps) -> (Vec<ShaderOptions>, Vec<ComputeShaderType>) {
    let gpu = caps.supports_gpu_particles;
    let mut options = Vec::new();
    let mut computes = Vec::new();

    match class {
        RendererClass::Billboard => {
            if caps.supports_geometry_shaders {
                options.extend(BILLBOARD_GEOM);
                if gpu {
                    mult(&mut options, ShaderOptions::GPU_STORAGE, 0);
                }
                mult(&mut options, ShaderOptions::BILLBOARD_SIZE_FLOAT2, 0);
            }
            if caps.supports_shader_resource_views {
                let from = options.len();
                options.extend(BILLBOARD_VERTEX);
                if gpu {
                    mult(&mut options, ShaderOptions::GPU_STORAGE, from);
                    mult(&mut options, ShaderOptions::GPU_SORT, from);
                    computes.extend(GPU_SORT_COMPUTES);
                }
                mult(&mut options, ShaderOptions::BILLBOARD_SIZE_FLOAT2, from);
            }
        }
        RendererClass::Triangle => {
            if caps.supports_shader_resource_views {
                options.push(ShaderOptions::TRIANGLE_VERTEX_BILLBOARDING);
                if gpu {
                    let from = options.len();
                    options.push(ShaderOptions::TRIANGLE_VERTEX_BILLBOARDING | ShaderOptions::GPU_STORAGE);
                    mult(&mut options, ShaderOptions::GPU_SORT, from);
                    computes.extend(GPU_SORT_COMPUTES);
                }
            }
        }
        RendererClass::Mesh => {
            options.push(ShaderOptions::GPU_MESH);
            if gpu {
                computes.extend(MESH_COMPUTES);
            }
        }
        RendererClass::Ribbon => {
            if caps.supports_shader_resource_views && gpu {
                let base = ShaderOptions::RIBBON_VERTEX_BILLBOARDING | ShaderOptions::GPU_STORAGE;
                options.push(base);
                options.push(base | ShaderOptions::AXIS_C1);
                mult(&mut options, ShaderOptions::GPU_SORT, 0);
                computes.extend(RIBBON_COMPUTES);
            }
        }
        RendererClass::Light | RendererClass::Decal | RendererClass::Sound => {}
    }

    for option in &mut options {
        *option |= ShaderOptions::VERTEX_PASS_THROUGH;
    }
    options.push(ShaderOptions::VERTEX_PASS_THROUGH);
    (options, computes)
}

// ============================================================================
// Key
// ============================================================================

/// Registered render state of one (options, pass) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderStateEntry {
    pub options: ShaderOptions,
    pub pass: ParticlePass,
    pub state: Handle<RenderStateKey>,
}

/// Identity of a renderer cache: the render and compute states it holds.
///
/// Empty until prepared. Two renderers whose permutations resolve to the
/// same states share one cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RendererCacheKey {
    pub render_states: Vec<RenderStateEntry>,
    pub compute_states: Vec<(ComputeShaderType, Handle<ComputeStateKey>)>,
}

impl RendererCacheKey {
    fn release_acquired(&self, ctx: &GraphicsDeviceContext) {
        for entry in &self.render_states {
            ctx.render_states.release(ctx, entry.state);
        }
        for &(_, handle) in &self.compute_states {
            ctx.compute_states.release(ctx, handle);
        }
    }

    fn push_states(&mut self, ctx: &GraphicsDeviceContext, renderer: &RendererDescriptor) -> Result<()> {
        let (options, computes) = registered_permutations(renderer.class, ctx.caps());
        let passes = find_render_passes(renderer.class, |name| renderer.has_feature(name));

        for options in options {
            for &pass in &passes {
                let state = ctx
                    .render_states
                    .acquire(ctx, RenderStateKey::new(renderer, options, pass), ())?;
                self.render_states.push(RenderStateEntry { options, pass, state });
            }
        }
        for ty in computes {
            let handle = ctx.compute_states.acquire(ctx, ComputeStateKey { ty }, ())?;
            self.compute_states.push((ty, handle));
        }
        Ok(())
    }
}

/// Prepared data of a renderer cache key.
#[derive(Debug)]
pub struct RendererCacheDeps {
    pub passes: PassList,
}

impl CacheKey for RendererCacheKey {
    type Resource = RendererCache;
    type Deps = RendererCacheDeps;
    type Args<'a> = &'a RendererDescriptor;
    const KIND: &'static str = "renderer cache";

    fn label(&self) -> String {
        format!(
            "{} render states, {} compute states",
            self.render_states.len(),
            self.compute_states.len()
        )
    }

    fn prepare(&mut self, ctx: &GraphicsDeviceContext, renderer: &RendererDescriptor) -> Result<RendererCacheDeps> {
        if renderer.class == RendererClass::Sound {
            return Err(RhiError::UnsupportedRenderer(renderer.class.name()));
        }
        self.render_states.clear();
        self.compute_states.clear();

        if let Err(e) = self.push_states(ctx, renderer) {
            log::error!(
                "Push render state failed for '{}': {e}",
                renderer.material.material_name
            );
            self.release_acquired(ctx);
            self.render_states.clear();
            self.compute_states.clear();
            return Err(e);
        }
        Ok(RendererCacheDeps {
            passes: find_render_passes(renderer.class, |name| renderer.has_feature(name)),
        })
    }

    fn create(&self, deps: &RendererCacheDeps, ctx: &GraphicsDeviceContext) -> Result<Arc<RendererCache>> {
        let render_states = self
            .render_states
            .iter()
            .map(|entry| {
                let compiled = ctx.render_states.deps(entry.state);
                let needed = compiled.as_ref().map(|d| d.bindings.needed).unwrap_or_default();
                let set_roles = compiled
                    .as_ref()
                    .map(|d| d.bindings.set_roles.clone())
                    .unwrap_or_default();
                let gpu_layouts = compiled
                    .as_ref()
                    .map(|d| GpuStorageLayouts {
                        sim_data: d.bindings.set_layout(SetRole::SimData).cloned(),
                        stream_offsets: d.bindings.set_layout(SetRole::StreamOffsets).cloned(),
                    })
                    .unwrap_or_default();
                CachedRenderState {
                    options: entry.options,
                    pass: entry.pass,
                    handle: entry.state,
                    needed,
                    set_roles,
                    gpu_layouts,
                    slot: Mutex::new(LazySlot::default()),
                }
            })
            .collect();
        let compute_states = self
            .compute_states
            .iter()
            .map(|&(ty, handle)| CachedComputeState {
                ty,
                handle,
                slot: Mutex::new(LazySlot::default()),
            })
            .collect();

        Ok(Arc::new(RendererCache {
            passes: deps.passes.clone(),
            render_states,
            compute_states,
        }))
    }

    fn release_dependencies(&self, _deps: &RendererCacheDeps, ctx: &GraphicsDeviceContext) {
        self.release_acquired(ctx);
    }
}

// ============================================================================
// Resource
// ============================================================================

/// Lazily baked device object. `expected` is set by the first lookup and
/// stays set, so a state that failed to bake is retried by
/// [`RendererCache::create_missing`] rather than on every lookup.
#[derive(Debug)]
struct LazySlot<T> {
    value: Option<Arc<T>>,
    expected: bool,
}

impl<T> Default for LazySlot<T> {
    fn default() -> Self {
        Self {
            value: None,
            expected: false,
        }
    }
}

/// Constant-set layouts a GPU-storage draw fills per draw call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuStorageLayouts {
    pub sim_data: Option<ConstantSetLayout>,
    pub stream_offsets: Option<ConstantSetLayout>,
}

#[derive(Debug)]
struct CachedRenderState {
    options: ShaderOptions,
    pass: ParticlePass,
    handle: Handle<RenderStateKey>,
    needed: NeededConstants,
    set_roles: Vec<SetRole>,
    gpu_layouts: GpuStorageLayouts,
    slot: Mutex<LazySlot<RenderState>>,
}

#[derive(Debug)]
struct CachedComputeState {
    ty: ComputeShaderType,
    handle: Handle<ComputeStateKey>,
    slot: Mutex<LazySlot<ComputeState>>,
}

/// Every permutation of one renderer class, baked on demand.
#[derive(Debug)]
pub struct RendererCache {
    passes: PassList,
    render_states: Vec<CachedRenderState>,
    compute_states: Vec<CachedComputeState>,
}

impl RendererCache {
    /// Particle passes the renderer draws in.
    #[must_use]
    pub fn passes(&self) -> &[ParticlePass] {
        &self.passes
    }

    #[must_use]
    pub fn registered(&self) -> Vec<(ShaderOptions, ParticlePass)> {
        self.render_states.iter().map(|s| (s.options, s.pass)).collect()
    }

    #[must_use]
    pub fn registered_compute(&self) -> Vec<ComputeShaderType> {
        self.compute_states.iter().map(|s| s.ty).collect()
    }

    fn find(&self, options: ShaderOptions, pass: ParticlePass) -> Option<&CachedRenderState> {
        self.render_states
            .iter()
            .find(|s| s.options == options && s.pass == pass)
    }

    /// Scene resources the (options, pass) permutation reads.
    #[must_use]
    pub fn needed_constants(&self, options: ShaderOptions, pass: ParticlePass) -> Option<NeededConstants> {
        self.find(options, pass).map(|s| s.needed)
    }

    /// Role of each constant set of the (options, pass) permutation, in
    /// set-index order.
    #[must_use]
    pub fn set_roles(&self, options: ShaderOptions, pass: ParticlePass) -> Option<&[SetRole]> {
        self.find(options, pass).map(|s| s.set_roles.as_slice())
    }

    /// Baked render state of (options, pass).
    ///
    /// `None` when the pair was never registered or the state cannot be
    /// baked yet; either way the draw is skipped. The first lookup of a
    /// pair marks it expected and bakes every expected state.
    pub fn render_state(
        &self,
        ctx: &GraphicsDeviceContext,
        options: ShaderOptions,
        pass: ParticlePass,
    ) -> Option<Arc<RenderState>> {
        let entry = self.find(options, pass)?;
        {
            let mut slot = entry.slot.lock();
            if slot.value.is_some() || slot.expected {
                return slot.value.clone();
            }
            slot.expected = true;
        }
        self.create_missing(ctx);
        entry.slot.lock().value.clone()
    }

    /// Compute state of `ty`, same lazy protocol as [`render_state`](Self::render_state).
    pub fn compute_state(&self, ctx: &GraphicsDeviceContext, ty: ComputeShaderType) -> Option<Arc<ComputeState>> {
        let entry = self.compute_states.iter().find(|s| s.ty == ty)?;
        {
            let mut slot = entry.slot.lock();
            if slot.value.is_some() || slot.expected {
                return slot.value.clone();
            }
            slot.expected = true;
        }
        self.create_missing(ctx);
        entry.slot.lock().value.clone()
    }

    /// GPU-storage layouts of the first permutation with `options`.
    #[must_use]
    pub fn gpu_storage_layouts(&self, options: ShaderOptions) -> Option<&GpuStorageLayouts> {
        self.render_states
            .iter()
            .find(|s| s.options == options)
            .map(|s| &s.gpu_layouts)
    }

    /// Some expected state is still missing.
    #[must_use]
    pub fn is_partially_built(&self) -> bool {
        self.render_states.iter().any(|s| {
            let slot = s.slot.lock();
            slot.expected && slot.value.is_none()
        }) || self.compute_states.iter().any(|s| {
            let slot = s.slot.lock();
            slot.expected && slot.value.is_none()
        })
    }

    /// Bakes every expected state still missing. Returns how many remain.
    pub fn create_missing(&self, ctx: &GraphicsDeviceContext) -> usize {
        let mut missing = 0;
        for entry in &self.render_states {
            let mut slot = entry.slot.lock();
            if !slot.expected || slot.value.is_some() {
                continue;
            }
            slot.value = ctx.render_states.resolve(ctx, entry.handle);
            if slot.value.is_none() {
                log::info!(
                    "Could not create render state {} for {}",
                    entry.options.shader_name(crate::rhi::ShaderStage::Vertex),
                    entry.pass.name()
                );
                missing += 1;
            }
        }
        for entry in &self.compute_states {
            let mut slot = entry.slot.lock();
            if !slot.expected || slot.value.is_some() {
                continue;
            }
            slot.value = ctx.compute_states.resolve(ctx, entry.handle);
            if slot.value.is_none() {
                log::info!("Could not create compute state {}", entry.ty.stem());
                missing += 1;
            }
        }
        missing
    }

    /// Forgets baked render states, e.g. after the render passes changed.
    /// Expected flags are kept so the next lookup rebakes them.
    pub fn reset_render_states(&self) {
        for entry in &self.render_states {
            entry.slot.lock().value = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(geometry: bool, srv: bool, gpu: bool) -> GpuCaps {
        GpuCaps {
            supports_geometry_shaders: geometry,
            supports_shader_resource_views: srv,
            supports_gpu_particles: gpu,
            ..GpuCaps::default()
        }
    }

    #[test]
    fn test_billboard_geometry_permutations() {
        let (options, computes) = registered_permutations(RendererClass::Billboard, caps(true, false, false));
        assert_eq!(options.len(), 9);
        assert!(computes.is_empty());
        assert_eq!(options.last(), Some(&ShaderOptions::VERTEX_PASS_THROUGH));
        assert!(
            options[..8]
                .iter()
                .all(|o| o.contains(ShaderOptions::GEOM_BILLBOARDING | ShaderOptions::VERTEX_PASS_THROUGH))
        );
        assert_eq!(
            options[..8]
                .iter()
                .filter(|o| o.contains(ShaderOptions::BILLBOARD_SIZE_FLOAT2))
                .count(),
            4
        );
    }

    #[test]
    fn test_gpu_particles_gate_storage_permutations() {
        let (cpu, _) = registered_permutations(RendererClass::Billboard, caps(false, true, false));
        assert!(cpu.iter().all(|o| !o.gpu_storage()));
        assert_eq!(cpu.len(), 9);

        let (gpu, computes) = registered_permutations(RendererClass::Billboard, caps(false, true, true));
        assert_eq!(gpu.len(), 4 * 2 * 2 * 2 + 1);
        assert_eq!(computes, GPU_SORT_COMPUTES);

        let (ribbon, _) = registered_permutations(RendererClass::Ribbon, caps(false, true, false));
        assert_eq!(ribbon, vec![ShaderOptions::VERTEX_PASS_THROUGH]);
        let (ribbon, computes) = registered_permutations(RendererClass::Ribbon, caps(false, true, true));
        assert_eq!(ribbon.len(), 5);
        assert_eq!(computes.len(), 8);
    }

    #[test]
    fn test_mesh_and_light_permutations() {
        let (mesh, computes) = registered_permutations(RendererClass::Mesh, GpuCaps::default());
        assert_eq!(
            mesh,
            vec![
                ShaderOptions::GPU_MESH | ShaderOptions::VERTEX_PASS_THROUGH,
                ShaderOptions::VERTEX_PASS_THROUGH
            ]
        );
        assert!(computes.is_empty());

        let (light, _) = registered_permutations(RendererClass::Light, GpuCaps::default());
        assert_eq!(light, vec![ShaderOptions::VERTEX_PASS_THROUGH]);
    }
}
