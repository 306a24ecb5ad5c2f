//! Particle Scene Renderer
//!
//! Owns a [`RenderGraph`] and the shared [`SceneResources`] and records a
//! frame: shadow cascades first, then every baked render pass with its
//! particle sub-passes and the full-screen post steps in between.
//!
//! The full-screen shaders of the post stages (distortion blur, bloom, tone
//! mapping, ...) belong to the host; they are recorded through
//! [`PostEffects`].

use std::sync::Arc;

use glam::Mat4;

use super::call::DrawCall;
use super::dispatch::{DispatchStats, DrawRequestSets, FrameBindings, render_particles};
use super::scene::{BackdropInfo, SceneInfo, SceneResources};
use crate::binding::ParticlePass;
use crate::context::GraphicsDeviceContext;
use crate::errors::{Result, RhiError};
use crate::graph::{RenderGraph, RenderPassSlot, RenderTargetDebug, SceneOptions, Stage};
use crate::rhi::{Buffer, BufferDesc, BufferKind, CommandBuffer, ConstantBinding, ConstantSet, PipelineStage, RenderTarget};

/// Full-screen step recorded between particle sub-passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStep {
    DistortionPost,
    DistortionBlurH,
    DistortionBlurV,
    BloomExtract,
    BloomComposite,
    ToneMapping,
    ColorRemap,
    Fxaa,
    DebugView(RenderTargetDebug),
}

/// Host hook recording the full-screen draws of post steps.
pub trait PostEffects: Send + Sync {
    fn record(&self, step: PostStep, cmd: &mut CommandBuffer);
}

/// Records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPostEffects;

impl PostEffects for NoPostEffects {
    fn record(&self, _step: PostStep, _cmd: &mut CommandBuffer) {}
}

/// Full-screen step following sub-pass `local` of `stage`.
fn post_step(stage: Stage, local: u32, debug: RenderTargetDebug) -> Option<PostStep> {
    match (stage, local) {
        (Stage::Distortion, 1) => Some(PostStep::DistortionPost),
        (Stage::Distortion, 2) => Some(PostStep::DistortionBlurH),
        (Stage::Distortion, 3) => Some(PostStep::DistortionBlurV),
        (Stage::Bloom, 0) => Some(PostStep::BloomExtract),
        (Stage::Bloom, 1) => Some(PostStep::BloomComposite),
        (Stage::ToneMapping, 0) => Some(PostStep::ToneMapping),
        (Stage::ColorRemap, 0) => Some(PostStep::ColorRemap),
        (Stage::Fxaa, 0) => Some(PostStep::Fxaa),
        (Stage::Debug, 0) if debug != RenderTargetDebug::NoDebug => Some(PostStep::DebugView(debug)),
        _ => None,
    }
}

/// Camera of one shadow cascade.
struct CascadeCamera {
    buffer: Arc<Buffer>,
    set: Arc<ConstantSet>,
}

fn cascade_info(world_to_shadow: Mat4) -> SceneInfo {
    SceneInfo {
        view_proj: world_to_shadow,
        view: world_to_shadow,
        proj: Mat4::IDENTITY,
        ..SceneInfo::default()
    }
}

pub struct ParticleSceneRenderer {
    options: SceneOptions,
    graph: RenderGraph,
    scene: SceneResources,
    post: Box<dyn PostEffects>,
    backdrop: BackdropInfo,
    cascades: Vec<CascadeCamera>,
    draw_requests: DrawRequestSets,
}

impl std::fmt::Debug for ParticleSceneRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleSceneRenderer")
            .field("options", &self.options)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

impl ParticleSceneRenderer {
    /// Builds the graph for `swap_chain` and the shared scene sets.
    pub fn init(
        ctx: &GraphicsDeviceContext,
        options: SceneOptions,
        gbuffer: bool,
        swap_chain: &[Arc<RenderTarget>],
    ) -> Result<Self> {
        let init = options.init_render_passes(gbuffer);
        let graph = RenderGraph::build_with_shadows(ctx, init, swap_chain, options.shadows_for(init))?;
        let mut scene = SceneResources::create(ctx)?;
        scene.bind_shadow_maps(ctx, graph.shadow_pass())?;

        let backdrop = BackdropInfo::default();
        scene.set_backdrop_info(ctx, &backdrop, graph.shadow_pass().map(|_| &options.shadows))?;

        let cascades = if graph.shadow_pass().is_some() {
            Self::create_cascade_cameras(ctx, &backdrop)?
        } else {
            Vec::new()
        };

        Ok(Self {
            options,
            graph,
            scene,
            post: Box::new(NoPostEffects),
            backdrop,
            cascades,
            draw_requests: DrawRequestSets::new(),
        })
    }

    #[must_use]
    pub fn with_post_effects(mut self, post: Box<dyn PostEffects>) -> Self {
        self.post = post;
        self
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &SceneOptions {
        &self.options
    }

    #[inline]
    #[must_use]
    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    #[inline]
    #[must_use]
    pub fn scene(&self) -> &SceneResources {
        &self.scene
    }

    fn create_cascade_cameras(ctx: &GraphicsDeviceContext, backdrop: &BackdropInfo) -> Result<Vec<CascadeCamera>> {
        let api = ctx.api();
        backdrop
            .cascade_world_to_shadow
            .iter()
            .enumerate()
            .map(|(i, &world_to_shadow)| {
                let bytes = cascade_info(world_to_shadow).to_bytes();
                let buffer = api.create_buffer(&BufferDesc::new(
                    format!("Shadow Cascade {i} Scene Info Buffer"),
                    BufferKind::Constant,
                    bytes.len() as u64,
                ))?;
                api.map_write(&buffer, 0, &bytes)?;
                let set = api.create_constant_set(
                    &format!("Shadow Cascade {i} Scene Info Constant Set"),
                    &ctx.layouts().scene_info,
                    vec![ConstantBinding::Buffer(buffer.clone())],
                )?;
                Ok(CascadeCamera { buffer, set })
            })
            .collect()
    }

    /// Recreates the size-dependent targets for a new swap chain.
    pub fn resize(&mut self, ctx: &GraphicsDeviceContext, swap_chain: &[Arc<RenderTarget>]) -> Result<()> {
        self.graph.resize(ctx, swap_chain)?;
        self.scene.bind_shadow_maps(ctx, self.graph.shadow_pass())
    }

    pub fn set_scene_info(&self, ctx: &GraphicsDeviceContext, info: &SceneInfo) -> Result<()> {
        self.scene.set_scene_info(ctx, info)
    }

    /// Uploads lights and shadow cascades, and the cascade cameras.
    pub fn set_backdrop_info(&mut self, ctx: &GraphicsDeviceContext, backdrop: BackdropInfo) -> Result<()> {
        let shadows = self.graph.shadow_pass().map(|_| &self.options.shadows);
        self.scene.set_backdrop_info(ctx, &backdrop, shadows)?;
        for (camera, &world_to_shadow) in self.cascades.iter().zip(&backdrop.cascade_world_to_shadow) {
            ctx.api().map_write(&camera.buffer, 0, &cascade_info(world_to_shadow).to_bytes())?;
        }
        self.backdrop = backdrop;
        Ok(())
    }

    #[must_use]
    pub fn draw_request_sets(&self) -> &DrawRequestSets {
        &self.draw_requests
    }

    #[must_use]
    pub fn backdrop(&self) -> &BackdropInfo {
        &self.backdrop
    }

    /// Records `passes` for every draw into `cmd`.
    pub fn render_particles(
        &self,
        ctx: &GraphicsDeviceContext,
        passes: &[ParticlePass],
        draw_calls: &[DrawCall],
        cmd: &mut CommandBuffer,
        scene_info_override: Option<&Arc<ConstantSet>>,
    ) -> DispatchStats {
        let frame = FrameBindings {
            scene: &self.scene,
            gbuffer: self.graph.gbuffer_sets(),
            scene_info_override,
            draw_requests: &self.draw_requests,
        };
        render_particles(ctx, &frame, passes, draw_calls, cmd)
    }

    fn render_shadows(&self, ctx: &GraphicsDeviceContext, draw_calls: &[DrawCall], cmd: &mut CommandBuffer) -> DispatchStats {
        let mut stats = DispatchStats::default();
        let Some(shadow) = self.graph.shadow_pass() else {
            return stats;
        };
        if !draw_calls.iter().any(|d| d.cast_shadows) {
            return stats;
        }
        for (frame_buffer, camera) in shadow.frame_buffers.iter().zip(&self.cascades) {
            cmd.begin_render_pass(&shadow.render_pass, frame_buffer, &shadow.clear_values);
            cmd.set_viewport_and_scissor(shadow.resolution);
            stats += self.render_particles(ctx, &[ParticlePass::OpaqueShadow], draw_calls, cmd, Some(&camera.set));
            cmd.end_render_pass();
        }
        cmd.sync_previous_render_pass(PipelineStage::OutputColor, PipelineStage::TopOfPipe);
        stats
    }

    /// Records and submits one frame into swap-chain image `final_index`.
    pub fn render_scene(
        &self,
        ctx: &GraphicsDeviceContext,
        debug_target: RenderTargetDebug,
        draw_calls: &[DrawCall],
        final_index: usize,
    ) -> Result<DispatchStats> {
        for handle in ctx.renderer_caches.handles() {
            let Some(cache) = ctx.renderer_caches.resource(handle) else {
                continue;
            };
            if cache.is_partially_built() {
                let created = cache.create_missing(ctx);
                log::debug!("Created {created} missing render state(s)");
            }
        }

        let mut pre = CommandBuffer::new("Particles Pre-Opaque");
        let mut stats = self.render_shadows(ctx, draw_calls, &mut pre);

        let mut cmd = CommandBuffer::new("Particles Scene");
        for (index, pass) in self.graph.passes().iter().enumerate() {
            let frame_buffer = pass.frame_buffer(final_index).ok_or_else(|| {
                RhiError::RenderGraph(format!("no frame buffer {final_index} for {}", pass.slot.name()))
            })?;
            if pass.slot == RenderPassSlot::Bloom {
                cmd.sync_previous_render_pass(PipelineStage::Fragment, PipelineStage::Fragment);
            }

            cmd.begin_render_pass(&pass.render_pass, frame_buffer, &pass.clear_values);
            cmd.set_viewport_and_scissor(self.graph.size());

            let mut cursor = 0;
            for stage in &pass.stages {
                for local in 0..stage.count {
                    let sub_pass = stage.first + local;
                    while cursor < sub_pass {
                        cmd.next_sub_pass();
                        cursor += 1;
                    }
                    let passes: Vec<ParticlePass> = self.graph.passes_at(index, sub_pass).collect();
                    if !passes.is_empty() {
                        stats += self.render_particles(ctx, &passes, draw_calls, &mut cmd, None);
                    }
                    if let Some(step) = post_step(stage.stage, local, debug_target) {
                        self.post.record(step, &mut cmd);
                    }
                }
            }
            cmd.end_render_pass();

            if pass.slot == RenderPassSlot::Bloom {
                cmd.sync_previous_render_pass(PipelineStage::Fragment, PipelineStage::Fragment);
            }
        }

        if !pre.is_empty() {
            ctx.api().submit(pre)?;
        }
        let dropped = self.draw_requests.trim();
        if dropped > 0 {
            log::debug!("Dropped {dropped} unused draw-request set(s)");
        }
        log::trace!("Particle scene: {} draw(s), {} skipped", stats.draws, stats.skipped);
        ctx.api().submit(cmd)?;
        Ok(stats)
    }
}
