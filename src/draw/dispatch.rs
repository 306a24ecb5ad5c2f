//! Per-Pass Draw Dispatch
//!
//! Records the draws of one or more particle passes into a command buffer.
//! For each (pass, draw) the renderer cache supplies the render state and
//! the role of every constant set the permutation declares; only those sets
//! are bound, in set-index order. GBuffer samplers fall back to the dummy
//! sets when the graph has no GBuffer.
//!
//! A draw is skipped, never failed, when its instance, cache, render state
//! or one of its sets is not available this frame.

use std::ops::AddAssign;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::call::{BatchKey, DrawCall, DrawType};
use super::scene::SceneResources;
use crate::binding::layout::draw_requests_layout;
use crate::binding::{ParticlePass, SetRole};
use crate::cache::RendererCacheInstance;
use crate::context::GraphicsDeviceContext;
use crate::graph::GBufferSets;
use crate::material::RendererClass;
use crate::rhi::{Buffer, Command, CommandBuffer, ConstantBinding, ConstantSet, IndexSize, ResourceId};

/// Frame-wide sets the dispatch binds from.
#[derive(Debug, Clone, Copy)]
pub struct FrameBindings<'a> {
    pub scene: &'a SceneResources,
    pub gbuffer: Option<&'a GBufferSets>,
    /// Replaces the scene info set, e.g. for a shadow cascade camera.
    pub scene_info_override: Option<&'a Arc<ConstantSet>>,
    pub draw_requests: &'a DrawRequestSets,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub draws: usize,
    pub skipped: usize,
}

impl AddAssign for DispatchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.draws += rhs.draws;
        self.skipped += rhs.skipped;
    }
}

fn resolve_set(
    ctx: &GraphicsDeviceContext,
    frame: &FrameBindings<'_>,
    role: SetRole,
    pass: ParticlePass,
    instance: &RendererCacheInstance,
    draw: &DrawCall,
    draw_requests: Option<&Arc<ConstantSet>>,
) -> Option<Arc<ConstantSet>> {
    let scene = frame.scene;
    let set = match role {
        SetRole::DepthSampler => frame.gbuffer.map_or(&scene.dummy_depth, |g| &g.depth),
        SetRole::NormalRoughMetalSampler => {
            frame.gbuffer.map_or(&scene.dummy_normal_rough_metal, |g| &g.normal_rough_metal)
        }
        SetRole::DiffuseSampler => frame.gbuffer.map_or(&scene.dummy_diffuse, |g| &g.diffuse),
        SetRole::LightInfo => &scene.light_info,
        SetRole::ShadowsInfo if pass == ParticlePass::OpaqueShadow => &scene.dummy_shadows_info,
        SetRole::ShadowsInfo => &scene.shadows_info,
        SetRole::BrdfLut => &scene.brdf_lut,
        SetRole::EnvironmentMap => &scene.environment_map,
        SetRole::Atlas => match &instance.atlas {
            Some(atlas) if instance.has_atlas => &atlas.constant_set,
            _ => &ctx.defaults().atlas.constant_set,
        },
        SetRole::Dithering => &scene.dithering,
        SetRole::SceneInfo => frame.scene_info_override.unwrap_or(&scene.scene_info),
        SetRole::Material => instance.constant_set.as_ref()?,
        SetRole::DrawRequests => draw_requests?,
        SetRole::StreamOffsets => draw.stream_offsets.as_ref()?,
        SetRole::SimData => draw.sim_data.as_ref()?,
        SetRole::Compute => return None,
    };
    Some(set.clone())
}

struct PooledSet {
    set: Arc<ConstantSet>,
    used: bool,
}

/// Draw-request constant sets of CPU-simulated billboards, one per
/// (class, buffer), kept across frames.
///
/// The simulation rewrites the buffer in place, so a set stays valid as
/// long as its buffer is drawn. Sets not drawn since the last
/// [`trim`](Self::trim) are dropped by it.
#[derive(Default)]
pub struct DrawRequestSets {
    sets: Mutex<FxHashMap<(RendererClass, ResourceId), PooledSet>>,
}

impl std::fmt::Debug for DrawRequestSets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawRequestSets")
            .field("len", &self.len())
            .finish()
    }
}

impl DrawRequestSets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set binding the draw-requests buffer of `draw`, created on first use.
    pub fn get(&self, ctx: &GraphicsDeviceContext, draw: &DrawCall) -> Option<Arc<ConstantSet>> {
        let buffer = draw.draw_requests.as_ref()?;
        let mut sets = self.sets.lock();
        if let Some(pooled) = sets.get_mut(&(draw.class, buffer.id)) {
            pooled.used = true;
            return Some(pooled.set.clone());
        }
        let set = ctx
            .api()
            .create_constant_set(
                "Draw Requests Constant Set",
                &draw_requests_layout(draw.class),
                vec![ConstantBinding::Buffer(buffer.clone())],
            )
            .inspect_err(|e| log::error!("{e}"))
            .ok()?;
        sets.insert(
            (draw.class, buffer.id),
            PooledSet {
                set: set.clone(),
                used: true,
            },
        );
        Some(set)
    }

    /// Drops the sets not drawn since the previous call.
    pub fn trim(&self) -> usize {
        let mut sets = self.sets.lock();
        let before = sets.len();
        sets.retain(|_, pooled| std::mem::take(&mut pooled.used));
        before - sets.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.lock().is_empty()
    }
}

/// Geometry bound for a draw: instance mesh buffers first for meshes,
/// then the draw's own streams.
struct BoundGeometry<'a> {
    vertex: SmallVec<[&'a Buffer; 4]>,
    offsets: SmallVec<[u64; 4]>,
    index: Option<(&'a Buffer, IndexSize)>,
    index_count: u32,
    vertex_count: u32,
}

impl<'a> BoundGeometry<'a> {
    fn new(draw: &'a DrawCall, instance: &'a RendererCacheInstance) -> Self {
        let mut vertex = SmallVec::new();
        let mut offsets = SmallVec::new();
        let mut index = draw.index_buffer.as_deref().map(|b| (b, draw.index_size));
        let mut index_count = draw.index_count;
        let mut vertex_count = draw.vertex_count;

        if let (RendererClass::Mesh, Some(geometry)) = (draw.class, &instance.geometry) {
            vertex.extend(geometry.vertex_buffers.iter().map(Arc::as_ref));
            offsets.extend(std::iter::repeat_n(0, geometry.vertex_buffers.len()));
            if index.is_none() {
                index = Some((geometry.index_buffer.as_ref(), geometry.index_size));
                index_count = geometry.index_count;
            }
            if vertex_count == 0 {
                vertex_count = geometry.vertex_count;
            }
        }
        vertex.extend(draw.vertex_buffers.iter().map(Arc::as_ref));
        offsets.extend(
            (0..draw.vertex_buffers.len()).map(|i| draw.vertex_offsets.get(i).copied().unwrap_or(0)),
        );

        Self {
            vertex,
            offsets,
            index,
            index_count,
            vertex_count,
        }
    }

    fn key(&self) -> BatchKey {
        BatchKey::new(&self.vertex, &self.offsets, self.index.map(|(b, _)| (b, 0)))
    }
}

fn draw_command(draw: &DrawCall, geometry: &BoundGeometry<'_>) -> Option<Command> {
    let indirect = || draw.indirect_buffer.as_ref().map(|b| (b.id, draw.indirect_offset));
    Some(match draw.ty {
        DrawType::Regular if geometry.index.is_some() => Command::DrawIndexed {
            index_offset: draw.index_offset,
            vertex_offset: draw.vertex_offset,
            index_count: geometry.index_count,
        },
        DrawType::Regular => Command::Draw {
            vertex_offset: draw.vertex_offset,
            vertex_count: geometry.vertex_count,
        },
        DrawType::IndexedInstanced => Command::DrawIndexedInstanced {
            index_offset: draw.index_offset,
            vertex_offset: draw.vertex_offset,
            index_count: geometry.index_count,
            instance_count: draw.instance_count,
        },
        DrawType::InstancedIndirect => {
            let (buffer, offset): (ResourceId, u64) = indirect()?;
            Command::DrawInstancedIndirect { buffer, offset }
        }
        DrawType::IndexedInstancedIndirect => {
            let (buffer, offset) = indirect()?;
            Command::DrawIndexedInstancedIndirect { buffer, offset }
        }
    })
}

/// Records every draw of `passes` into `cmd`, pass by pass.
pub fn render_particles(
    ctx: &GraphicsDeviceContext,
    frame: &FrameBindings<'_>,
    passes: &[ParticlePass],
    draw_calls: &[DrawCall],
    cmd: &mut CommandBuffer,
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    for &pass in passes {
        let mut bound_state = None;
        let mut bound_batch: Option<BatchKey> = None;

        for draw in draw_calls {
            if pass == ParticlePass::OpaqueShadow && !draw.cast_shadows {
                continue;
            }
            let Some(instance) = draw
                .instance
                .and_then(|h| ctx.renderer_cache_instances.resolve(ctx, h))
            else {
                stats.skipped += 1;
                continue;
            };
            let Some(cache) = instance.cache.as_ref() else {
                stats.skipped += 1;
                continue;
            };
            if !cache.passes().contains(&pass) {
                continue;
            }
            let (Some(state), Some(roles)) = (
                cache.render_state(ctx, draw.options, pass),
                cache.set_roles(draw.options, pass),
            ) else {
                log::debug!("No render state for {:?} in {}", draw.options, pass.name());
                stats.skipped += 1;
                continue;
            };

            let draw_requests = if roles.contains(&SetRole::DrawRequests) {
                frame.draw_requests.get(ctx, draw)
            } else {
                None
            };
            let sets: Option<Vec<Arc<ConstantSet>>> = roles
                .iter()
                .map(|&role| resolve_set(ctx, frame, role, pass, &instance, draw, draw_requests.as_ref()))
                .collect();
            let Some(sets) = sets else {
                log::debug!("Missing constant set for {:?} in {}", draw.options, pass.name());
                stats.skipped += 1;
                continue;
            };
            let geometry = BoundGeometry::new(draw, &instance);
            let Some(command) = draw_command(draw, &geometry) else {
                log::error!("{:?} draw without indirect buffer", draw.ty);
                stats.skipped += 1;
                continue;
            };

            if bound_state != Some(state.id) {
                cmd.bind_render_state(&state);
                bound_state = Some(state.id);
            }
            if !sets.is_empty() {
                let refs: SmallVec<[&ConstantSet; 16]> = sets.iter().map(Arc::as_ref).collect();
                cmd.bind_constant_sets(&refs);
            }
            for (index, data) in (0u32..).zip(&draw.push_constants) {
                cmd.push_constant(index, data);
            }

            let key = geometry.key();
            if bound_batch.as_ref() != Some(&key) {
                if let Some((buffer, size)) = geometry.index {
                    cmd.bind_index_buffer(buffer, 0, size);
                }
                if !geometry.vertex.is_empty() {
                    cmd.bind_vertex_buffers(&geometry.vertex, &geometry.offsets);
                }
                bound_batch = Some(key);
            }

            cmd.push(command);
            stats.draws += 1;
        }
    }
    stats
}
