//! Render Graph Builder
//!
//! Turns the wiring of [`wire`] into baked render passes:
//!
//! - one render pass per [`RenderPassSlot`] in use, each stage appending its
//!   sub-passes to the pass of its slot;
//! - off-screen targets allocated per [`TargetRole`] on first use;
//! - one frame buffer per swap-chain image for every pass writing the swap
//!   chain, a single one otherwise;
//! - the table of [`PassDescription`]s published to the device context,
//!   which render states are baked against.
//!
//! A pass that writes the swap chain always holds it at attachment 0.
//!
//! Resizing recreates targets and frame buffers but keeps the render passes
//! whenever their layout is unchanged, so baked render states survive.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::options::ShadowOptions;
use super::stages::{InitRenderPasses, RenderPassSlot, Stage, StageWiring, TargetRole, wire};
use crate::binding::ParticlePass;
use crate::context::{GraphicsDeviceContext, PassDescription};
use crate::errors::{Result, RhiError};
use crate::rhi::{
    AttachmentLayout, ClearValue, ConstantBinding, ConstantSet, ConstantSetLayout, FrameBuffer, FrameBufferDesc,
    LoadOp, RenderApi, RenderPass, RenderPassDesc, RenderTarget, SubPassDefinition,
};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
const LINEAR_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Float;
const SHADOW_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub const SHADOW_CASCADE_COUNT: usize = 4;

const DEPTH_CLEAR: ClearValue = ClearValue::DepthStencil(1.0, 0);
const FAR_CLEAR: ClearValue = ClearValue::Color([1.0; 4]);

// ============================================================================
// Baked passes
// ============================================================================

/// Sub-passes one stage occupies inside its render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSubPasses {
    pub stage: Stage,
    pub first: u32,
    pub count: u32,
}

#[derive(Debug)]
pub struct BakedPass {
    pub slot: RenderPassSlot,
    pub render_pass: Arc<RenderPass>,
    /// One per swap-chain image when the pass writes the swap chain.
    pub frame_buffers: Vec<Arc<FrameBuffer>>,
    /// Parallel to the render pass attachments.
    pub clear_values: Vec<ClearValue>,
    pub stages: Vec<StageSubPasses>,
}

impl BakedPass {
    /// Frame buffer for swap-chain image `index`.
    #[must_use]
    pub fn frame_buffer(&self, index: usize) -> Option<&Arc<FrameBuffer>> {
        if self.frame_buffers.len() == 1 {
            self.frame_buffers.first()
        } else {
            self.frame_buffers.get(index)
        }
    }
}

/// Shadow-map render pass, one frame buffer per cascade.
#[derive(Debug)]
pub struct ShadowPass {
    pub render_pass: Arc<RenderPass>,
    pub cascades: Vec<Arc<RenderTarget>>,
    pub depth: Arc<RenderTarget>,
    pub frame_buffers: Vec<Arc<FrameBuffer>>,
    pub clear_values: Vec<ClearValue>,
    pub resolution: [u32; 2],
}

#[derive(Debug, Clone)]
pub struct GBufferTargets {
    pub diffuse: Arc<RenderTarget>,
    /// Linear depth written by opaque particles.
    pub depth: Arc<RenderTarget>,
    pub emissive: Arc<RenderTarget>,
    pub normal_rough_metal: Arc<RenderTarget>,
    pub light_accu: Arc<RenderTarget>,
}

impl GBufferTargets {
    fn create(api: &dyn RenderApi, size: [u32; 2]) -> Result<Self> {
        Ok(Self {
            diffuse: api.create_render_target("GBuffer Diffuse Render Target", COLOR_FORMAT, size, true)?,
            depth: api.create_render_target("GBuffer Depth Render Target", LINEAR_DEPTH_FORMAT, size, true)?,
            emissive: api.create_render_target("GBuffer Emissive Render Target", COLOR_FORMAT, size, true)?,
            normal_rough_metal: api.create_render_target(
                "NormalRoughMetal Render Target",
                COLOR_FORMAT,
                size,
                true,
            )?,
            light_accu: api.create_render_target("LightAccu Render Target", COLOR_FORMAT, size, true)?,
        })
    }
}

/// GBuffer samplers bound by particles reading the scene.
#[derive(Debug, Clone)]
pub struct GBufferSets {
    pub depth: Arc<ConstantSet>,
    pub normal_rough_metal: Arc<ConstantSet>,
    pub diffuse: Arc<ConstantSet>,
}

impl GBufferSets {
    fn create(ctx: &GraphicsDeviceContext, gbuffer: &GBufferTargets) -> Result<Self> {
        let sampler = &ctx.defaults().nearest_sampler;
        let set = |name: &str, layout: &ConstantSetLayout, target: &Arc<RenderTarget>| {
            ctx.api().create_constant_set(
                name,
                layout,
                vec![ConstantBinding::RenderTarget(target.clone(), sampler.clone())],
            )
        };
        let layouts = ctx.layouts();
        Ok(Self {
            depth: set("Depth Sampler Constant Set", &layouts.depth, &gbuffer.depth)?,
            normal_rough_metal: set(
                "NormalRoughMetal Sampler Constant Set",
                &layouts.normal_rough_metal,
                &gbuffer.normal_rough_metal,
            )?,
            diffuse: set("Diffuse Sampler Constant Set", &layouts.diffuse, &gbuffer.diffuse)?,
        })
    }
}

// ============================================================================
// Pass assembly
// ============================================================================

#[derive(Debug, Clone)]
enum AttachmentSource {
    SwapChain,
    Target(Arc<RenderTarget>),
}

/// Render pass under construction.
struct PassAssembly {
    slot: RenderPassSlot,
    attachments: Vec<AttachmentLayout>,
    sources: Vec<AttachmentSource>,
    clear_values: Vec<ClearValue>,
    sub_passes: Vec<SubPassDefinition>,
    stages: Vec<StageSubPasses>,
}

impl PassAssembly {
    fn new(slot: RenderPassSlot) -> Self {
        Self {
            slot,
            attachments: Vec::new(),
            sources: Vec::new(),
            clear_values: Vec::new(),
            sub_passes: Vec::new(),
            stages: Vec::new(),
        }
    }

    fn push(&mut self, source: AttachmentSource, format: wgpu::TextureFormat, load_op: LoadOp, clear: ClearValue) -> u32 {
        self.attachments.push(AttachmentLayout { format, load_op });
        self.sources.push(source);
        self.clear_values.push(clear);
        (self.attachments.len() - 1) as u32
    }

    fn attach_swap_chain(&mut self, format: wgpu::TextureFormat, load_op: LoadOp) -> u32 {
        match self.sources.iter().position(|s| matches!(s, AttachmentSource::SwapChain)) {
            Some(index) => index as u32,
            None => self.push(AttachmentSource::SwapChain, format, load_op, ClearValue::TRANSPARENT),
        }
    }

    fn find(&self, target: &RenderTarget) -> Option<u32> {
        self.sources
            .iter()
            .position(|s| matches!(s, AttachmentSource::Target(t) if t.id == target.id))
            .map(|i| i as u32)
    }

    fn attach(&mut self, target: &Arc<RenderTarget>, load_op: LoadOp, clear: ClearValue) -> u32 {
        self.find(target).unwrap_or_else(|| {
            self.push(AttachmentSource::Target(target.clone()), target.format, load_op, clear)
        })
    }

    fn add_sub_pass(&mut self, inputs: &[u32], outputs: &[u32], depth_stencil: Option<u32>) -> u32 {
        self.sub_passes.push(SubPassDefinition::new(inputs, outputs, depth_stencil));
        (self.sub_passes.len() - 1) as u32
    }

    fn writes_swap_chain(&self) -> bool {
        self.sources.iter().any(|s| matches!(s, AttachmentSource::SwapChain))
    }

    fn bake(
        self,
        api: &dyn RenderApi,
        swap_chain: &[Arc<RenderTarget>],
        size: [u32; 2],
        reuse: Option<&Arc<RenderPass>>,
    ) -> Result<BakedPass> {
        let name = self.slot.name();
        let render_pass = match reuse {
            Some(rp) if rp.attachments == self.attachments && rp.sub_passes == self.sub_passes => rp.clone(),
            _ => api.create_render_pass(&RenderPassDesc {
                name: name.to_owned(),
                attachments: self.attachments.clone(),
                sub_passes: self.sub_passes.clone(),
            })?,
        };

        let images: &[Arc<RenderTarget>] = if self.writes_swap_chain() {
            swap_chain
        } else {
            &swap_chain[..1]
        };
        let frame_buffers = images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                let targets = self
                    .sources
                    .iter()
                    .map(|s| match s {
                        AttachmentSource::SwapChain => image.clone(),
                        AttachmentSource::Target(t) => t.clone(),
                    })
                    .collect();
                api.create_frame_buffer(
                    FrameBufferDesc {
                        name: format!("{name} Frame Buffer {i}"),
                        size,
                        targets,
                    },
                    &render_pass,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BakedPass {
            slot: self.slot,
            render_pass,
            frame_buffers,
            clear_values: self.clear_values,
            stages: self.stages,
        })
    }
}

/// Where a particle pass landed: index into the baked passes, and sub-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassLocation {
    pub pass: ParticlePass,
    pub render_pass: usize,
    pub sub_pass: u32,
}

// ============================================================================
// Assembler
// ============================================================================

/// Build-time state shared by the stage builders.
struct Assembler<'a> {
    api: &'a dyn RenderApi,
    init: InitRenderPasses,
    size: [u32; 2],
    swap_chain_format: wgpu::TextureFormat,
    targets: FxHashMap<TargetRole, Arc<RenderTarget>>,
    gbuffer: Option<GBufferTargets>,
    depth_stencil: Option<Arc<RenderTarget>>,
    distortion: Option<Arc<RenderTarget>>,
    bloom: Option<Arc<RenderTarget>>,
    locations: Vec<PassLocation>,
}

impl Assembler<'_> {
    fn target_name(&self, role: TargetRole) -> &'static str {
        match role {
            TargetRole::SwapChain => "Swap Chain",
            TargetRole::SceneColor if self.init.contains(InitRenderPasses::GBUFFER) => "Merge Render Target",
            TargetRole::SceneColor => "BasicRendering Render Target",
            TargetRole::DistortionOutput => "Distortion Output Render Target",
            TargetRole::ToneMappingOutput => "ToneMapping Output Render Target",
            TargetRole::ColorRemapOutput => "Color Remap Output Render Target",
            TargetRole::FxaaOutput => "FXAA Output Render Target",
        }
    }

    fn role_target(&mut self, role: TargetRole) -> Result<Arc<RenderTarget>> {
        if role == TargetRole::SwapChain {
            return Err(RhiError::RenderGraph("the swap chain has no off-screen target".into()));
        }
        if let Some(target) = self.targets.get(&role) {
            return Ok(target.clone());
        }
        let target = self.api.create_render_target(self.target_name(role), COLOR_FORMAT, self.size, true)?;
        self.targets.insert(role, target.clone());
        Ok(target)
    }

    fn output(&mut self, asm: &mut PassAssembly, role: TargetRole, load_op: LoadOp) -> Result<u32> {
        if role == TargetRole::SwapChain {
            return Ok(asm.attach_swap_chain(self.swap_chain_format, LoadOp::DontCare));
        }
        let target = self.role_target(role)?;
        Ok(asm.attach(&target, load_op, ClearValue::TRANSPARENT))
    }

    /// Attachment index of `role` when it was written earlier in `asm`.
    fn input(&self, asm: &PassAssembly, role: Option<TargetRole>) -> Option<u32> {
        role.and_then(|r| self.targets.get(&r)).and_then(|t| asm.find(t))
    }

    fn depth_stencil(&mut self) -> Result<Arc<RenderTarget>> {
        if let Some(ds) = &self.depth_stencil {
            return Ok(ds.clone());
        }
        let ds = self.api.create_render_target("Depth Render Target", DEPTH_STENCIL_FORMAT, self.size, false)?;
        self.depth_stencil = Some(ds.clone());
        Ok(ds)
    }

    fn locate(&mut self, render_pass: usize, sub_pass: u32, passes: &[ParticlePass]) {
        self.locations.extend(passes.iter().map(|&pass| PassLocation {
            pass,
            render_pass,
            sub_pass,
        }));
    }

    /// GBuffer attachments sampled by later scene sub-passes.
    fn gbuffer_inputs(&self, asm: &PassAssembly) -> Vec<u32> {
        self.gbuffer
            .as_ref()
            .map(|gb| {
                [&gb.diffuse, &gb.depth, &gb.normal_rough_metal]
                    .into_iter()
                    .filter_map(|t| asm.find(t))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn scene(&mut self, asm: &mut PassAssembly, index: usize, wiring: &StageWiring) -> Result<()> {
        if self.init.contains(InitRenderPasses::GBUFFER) {
            let gb = GBufferTargets::create(self.api, self.size)?;
            let diffuse = asm.attach(&gb.diffuse, LoadOp::Clear, ClearValue::TRANSPARENT);
            let depth = asm.attach(&gb.depth, LoadOp::Clear, FAR_CLEAR);
            let emissive = asm.attach(&gb.emissive, LoadOp::Clear, ClearValue::TRANSPARENT);
            let merge = self.output(asm, wiring.output, LoadOp::Load)?;
            let ds = asm.attach(&self.depth_stencil()?, LoadOp::Clear, DEPTH_CLEAR);
            let light = asm.attach(&gb.light_accu, LoadOp::Clear, ClearValue::TRANSPARENT);
            let nrm = asm.attach(&gb.normal_rough_metal, LoadOp::Clear, ClearValue::TRANSPARENT);

            let opaque = asm.add_sub_pass(&[], &[diffuse, depth, emissive, nrm], Some(ds));
            let decal = asm.add_sub_pass(&[depth], &[diffuse, emissive, nrm], Some(ds));
            let lighting = asm.add_sub_pass(&[nrm, depth, diffuse], &[light], Some(ds));
            let merge_pass = asm.add_sub_pass(&[light, diffuse, depth, emissive], &[merge], Some(ds));

            self.locate(index, opaque, &[ParticlePass::Opaque]);
            self.locate(index, decal, &[ParticlePass::Decal]);
            self.locate(index, lighting, &[ParticlePass::Lighting]);
            self.locate(index, merge_pass, &[ParticlePass::Transparent]);
            self.gbuffer = Some(gb);
        } else {
            let out = self.output(asm, wiring.output, LoadOp::Clear)?;
            let ds = asm.attach(&self.depth_stencil()?, LoadOp::Clear, DEPTH_CLEAR);
            let basic = asm.add_sub_pass(&[], &[out], Some(ds));
            self.locate(index, basic, &[ParticlePass::Transparent]);
        }
        Ok(())
    }

    fn distortion(&mut self, asm: &mut PassAssembly, index: usize, wiring: &StageWiring) -> Result<()> {
        let to_distord = self
            .input(asm, wiring.input)
            .ok_or_else(|| RhiError::RenderGraph("distortion input is not in its render pass".into()))?;
        let ds = asm.attach(&self.depth_stencil()?, LoadOp::Load, DEPTH_CLEAR);

        let disto_target = self.api.create_render_target("Distortion Render Target", COLOR_FORMAT, self.size, true)?;
        let disto = asm.attach(&disto_target, LoadOp::Clear, ClearValue::TRANSPARENT);
        let scratch = self.output(asm, TargetRole::DistortionOutput, LoadOp::Clear)?;
        let out = self.output(asm, wiring.output, LoadOp::Clear)?;
        let gbuffer = self.gbuffer_inputs(asm);

        let draw = asm.add_sub_pass(&gbuffer, &[disto], Some(ds));
        asm.add_sub_pass(&[to_distord, disto], &[scratch], None);
        asm.add_sub_pass(&[scratch, disto], &[to_distord], None);
        asm.add_sub_pass(&[to_distord, disto], &[out], None);
        let post = asm.add_sub_pass(&gbuffer, &[out], Some(ds));

        self.locate(index, draw, &[ParticlePass::Distortion]);
        self.locate(index, post, &[ParticlePass::Tint, ParticlePass::TransparentPostDisto]);
        self.distortion = Some(disto_target);
        Ok(())
    }

    fn bloom(&mut self, asm: &mut PassAssembly, wiring: &StageWiring) -> Result<()> {
        let destination = match wiring.output {
            TargetRole::SwapChain => asm.attach_swap_chain(self.swap_chain_format, LoadOp::DontCare),
            role => {
                let target = self.role_target(role)?;
                asm.attach(&target, LoadOp::Load, ClearValue::TRANSPARENT)
            }
        };
        let bloom_target = self.api.create_render_target("Bloom Render Target", COLOR_FORMAT, self.size, true)?;
        let bloom = asm.attach(&bloom_target, LoadOp::Clear, ClearValue::TRANSPARENT);

        asm.add_sub_pass(&[], &[bloom], None);
        asm.add_sub_pass(&[bloom], &[destination], None);
        self.bloom = Some(bloom_target);
        Ok(())
    }

    /// Tone mapping, color remap and FXAA: one full-screen sub-pass each.
    fn post_effect(&mut self, asm: &mut PassAssembly, wiring: &StageWiring) -> Result<()> {
        let input = self.input(asm, wiring.input);
        let out = self.output(asm, wiring.output, LoadOp::DontCare)?;
        asm.add_sub_pass(input.as_slice(), &[out], None);
        Ok(())
    }

    fn debug(&mut self, asm: &mut PassAssembly, index: usize, wiring: &StageWiring) -> Result<()> {
        let role = wiring
            .input
            .ok_or_else(|| RhiError::RenderGraph("debug stage without input".into()))?;
        let before = self.role_target(role)?;
        let before = asm.attach(&before, LoadOp::Load, ClearValue::TRANSPARENT);
        let ds = asm.attach(&self.depth_stencil()?, LoadOp::Load, DEPTH_CLEAR);
        let swap_chain = asm.attach_swap_chain(self.swap_chain_format, LoadOp::DontCare);

        let debug = asm.add_sub_pass(&[], &[before], Some(ds));
        let compositing = asm.add_sub_pass(&[before], &[swap_chain], Some(ds));
        self.locate(index, debug, &[ParticlePass::Debug]);
        self.locate(index, compositing, &[ParticlePass::Compositing]);
        Ok(())
    }
}

fn build_shadow_pass(
    api: &dyn RenderApi,
    options: &ShadowOptions,
    reuse: Option<&Arc<RenderPass>>,
) -> Result<ShadowPass> {
    let resolution = [options.resolution.x.max(1), options.resolution.y.max(1)];
    let attachments = vec![
        AttachmentLayout {
            format: SHADOW_FORMAT,
            load_op: LoadOp::Clear,
        },
        AttachmentLayout {
            format: SHADOW_DEPTH_FORMAT,
            load_op: LoadOp::Clear,
        },
    ];
    let sub_passes = vec![SubPassDefinition::new(&[], &[0], Some(1))];
    let render_pass = match reuse {
        Some(rp) if rp.attachments == attachments && rp.sub_passes == sub_passes => rp.clone(),
        _ => api.create_render_pass(&RenderPassDesc {
            name: "Shadow Render Pass".to_owned(),
            attachments,
            sub_passes,
        })?,
    };

    let depth = api.create_render_target("Shadow Depth Render Target", SHADOW_DEPTH_FORMAT, resolution, false)?;
    let cascades = (0..SHADOW_CASCADE_COUNT)
        .map(|i| api.create_render_target(&format!("Shadow Cascade {i} Render Target"), SHADOW_FORMAT, resolution, true))
        .collect::<Result<Vec<_>>>()?;
    let frame_buffers = cascades
        .iter()
        .enumerate()
        .map(|(i, cascade)| {
            api.create_frame_buffer(
                FrameBufferDesc {
                    name: format!("Shadow Cascade {i} Frame Buffer"),
                    size: resolution,
                    targets: vec![cascade.clone(), depth.clone()],
                },
                &render_pass,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ShadowPass {
        render_pass,
        cascades,
        depth,
        frame_buffers,
        clear_values: vec![FAR_CLEAR, DEPTH_CLEAR],
        resolution,
    })
}

// ============================================================================
// RenderGraph
// ============================================================================

/// Baked particle scene pipeline for one swap chain.
#[derive(Debug)]
pub struct RenderGraph {
    init: InitRenderPasses,
    shadows: Option<ShadowOptions>,
    size: [u32; 2],
    swap_chain_format: wgpu::TextureFormat,
    wiring: Vec<StageWiring>,
    passes: Vec<BakedPass>,
    shadow_pass: Option<ShadowPass>,
    gbuffer: Option<GBufferTargets>,
    gbuffer_sets: Option<GBufferSets>,
    depth_stencil: Option<Arc<RenderTarget>>,
    targets: FxHashMap<TargetRole, Arc<RenderTarget>>,
    distortion_target: Option<Arc<RenderTarget>>,
    bloom_target: Option<Arc<RenderTarget>>,
    locations: Vec<PassLocation>,
    descriptions: Vec<PassDescription>,
}

impl RenderGraph {
    /// Builds the graph without shadows and publishes its pass table.
    pub fn build(
        ctx: &GraphicsDeviceContext,
        init: InitRenderPasses,
        swap_chain: &[Arc<RenderTarget>],
    ) -> Result<Self> {
        Self::build_with_shadows(ctx, init, swap_chain, None)
    }

    /// Builds the graph and publishes its pass table. Shadows are only
    /// built together with the GBuffer.
    pub fn build_with_shadows(
        ctx: &GraphicsDeviceContext,
        init: InitRenderPasses,
        swap_chain: &[Arc<RenderTarget>],
        shadows: Option<ShadowOptions>,
    ) -> Result<Self> {
        let shadows = shadows.filter(|s| s.enable && init.contains(InitRenderPasses::GBUFFER));
        let graph = Self::assemble(ctx, init, shadows, swap_chain, None).inspect_err(|e| {
            log::error!("Particle render graph build failed ({init:?}): {e}");
        })?;
        graph.publish(ctx);
        log::info!(
            "Particle render graph built: {} render pass(es), stages [{}]",
            graph.passes.len(),
            graph.wiring.iter().map(|w| w.stage.name()).collect::<Vec<_>>().join(", ")
        );
        Ok(graph)
    }

    /// Recreates targets and frame buffers for a new swap chain. The pass
    /// table is only republished when a render pass had to be recreated.
    pub fn resize(&mut self, ctx: &GraphicsDeviceContext, swap_chain: &[Arc<RenderTarget>]) -> Result<()> {
        let rebuilt = Self::assemble(ctx, self.init, self.shadows, swap_chain, Some(self)).inspect_err(|e| {
            log::error!("Particle render graph resize failed: {e}");
        })?;

        let same_passes = rebuilt.passes.len() == self.passes.len()
            && rebuilt
                .passes
                .iter()
                .zip(&self.passes)
                .all(|(a, b)| a.render_pass.id == b.render_pass.id)
            && rebuilt.shadow_pass.as_ref().map(|s| s.render_pass.id)
                == self.shadow_pass.as_ref().map(|s| s.render_pass.id);

        *self = rebuilt;
        if same_passes {
            log::debug!("Particle render graph resized to {:?}", self.size);
        } else {
            log::info!("Particle render graph resized to {:?} with new render passes", self.size);
            self.publish(ctx);
        }
        Ok(())
    }

    fn assemble(
        ctx: &GraphicsDeviceContext,
        init: InitRenderPasses,
        shadows: Option<ShadowOptions>,
        swap_chain: &[Arc<RenderTarget>],
        previous: Option<&Self>,
    ) -> Result<Self> {
        let first = swap_chain.first().ok_or(RhiError::MissingSwapChain)?;
        let wiring = wire(init);
        let mut assembler = Assembler {
            api: ctx.api(),
            init,
            size: first.size,
            swap_chain_format: first.format,
            targets: FxHashMap::default(),
            gbuffer: None,
            depth_stencil: None,
            distortion: None,
            bloom: None,
            locations: Vec::new(),
        };

        let mut assemblies: Vec<PassAssembly> = Vec::new();
        for w in &wiring {
            if assemblies.last().is_none_or(|a| a.slot != w.slot) {
                let mut asm = PassAssembly::new(w.slot);
                let writes_swap_chain = wiring.iter().any(|x| x.slot == w.slot && x.output == TargetRole::SwapChain);
                if writes_swap_chain {
                    // Nothing after the scene: it draws straight into the image.
                    let load_op = if init.is_empty() { LoadOp::Clear } else { LoadOp::DontCare };
                    asm.attach_swap_chain(assembler.swap_chain_format, load_op);
                }
                assemblies.push(asm);
            }
            let index = assemblies.len() - 1;
            let asm = &mut assemblies[index];
            let first_sub_pass = asm.sub_passes.len() as u32;

            match w.stage {
                Stage::Scene => assembler.scene(asm, index, w)?,
                Stage::Distortion => assembler.distortion(asm, index, w)?,
                Stage::Bloom => assembler.bloom(asm, w)?,
                Stage::ToneMapping | Stage::ColorRemap | Stage::Fxaa => assembler.post_effect(asm, w)?,
                Stage::Debug => assembler.debug(asm, index, w)?,
            }

            let count = asm.sub_passes.len() as u32 - first_sub_pass;
            asm.stages.push(StageSubPasses {
                stage: w.stage,
                first: first_sub_pass,
                count,
            });
        }

        let passes = assemblies
            .into_iter()
            .enumerate()
            .map(|(i, asm)| {
                let reuse = previous
                    .filter(|p| p.swap_chain_format == assembler.swap_chain_format)
                    .and_then(|p| p.passes.get(i))
                    .map(|p| &p.render_pass);
                asm.bake(ctx.api(), swap_chain, assembler.size, reuse)
            })
            .collect::<Result<Vec<_>>>()?;

        let shadow_pass = shadows
            .as_ref()
            .map(|options| {
                let reuse = previous.and_then(|p| p.shadow_pass.as_ref()).map(|s| &s.render_pass);
                build_shadow_pass(ctx.api(), options, reuse)
            })
            .transpose()?;

        let gbuffer_sets = assembler
            .gbuffer
            .as_ref()
            .map(|gb| GBufferSets::create(ctx, gb))
            .transpose()?;

        let mut descriptions: Vec<PassDescription> = assembler
            .locations
            .iter()
            .map(|loc| PassDescription {
                pass: loc.pass,
                render_pass: passes[loc.render_pass].render_pass.clone(),
                sub_pass: loc.sub_pass,
            })
            .collect();
        if let Some(shadow) = &shadow_pass {
            descriptions.push(PassDescription {
                pass: ParticlePass::OpaqueShadow,
                render_pass: shadow.render_pass.clone(),
                sub_pass: 0,
            });
        }

        Ok(Self {
            init,
            shadows,
            size: assembler.size,
            swap_chain_format: assembler.swap_chain_format,
            wiring,
            passes,
            shadow_pass,
            gbuffer: assembler.gbuffer,
            gbuffer_sets,
            depth_stencil: assembler.depth_stencil,
            targets: assembler.targets,
            distortion_target: assembler.distortion,
            bloom_target: assembler.bloom,
            locations: assembler.locations,
            descriptions,
        })
    }

    /// Publishes the pass table to the device context, invalidating render
    /// states baked against the previous one.
    pub fn publish(&self, ctx: &GraphicsDeviceContext) {
        ctx.set_pass_descriptions(self.descriptions.clone());
    }

    #[inline]
    #[must_use]
    pub fn init(&self) -> InitRenderPasses {
        self.init
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn wiring(&self) -> &[StageWiring] {
        &self.wiring
    }

    /// Baked render passes in execution order.
    #[inline]
    #[must_use]
    pub fn passes(&self) -> &[BakedPass] {
        &self.passes
    }

    #[must_use]
    pub fn pass(&self, slot: RenderPassSlot) -> Option<&BakedPass> {
        self.passes.iter().find(|p| p.slot == slot)
    }

    #[inline]
    #[must_use]
    pub fn shadow_pass(&self) -> Option<&ShadowPass> {
        self.shadow_pass.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn gbuffer(&self) -> Option<&GBufferTargets> {
        self.gbuffer.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn gbuffer_sets(&self) -> Option<&GBufferSets> {
        self.gbuffer_sets.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn depth_stencil(&self) -> Option<&Arc<RenderTarget>> {
        self.depth_stencil.as_ref()
    }

    /// Off-screen target backing `role`, if the graph allocated one.
    #[must_use]
    pub fn target(&self, role: TargetRole) -> Option<&Arc<RenderTarget>> {
        self.targets.get(&role)
    }

    #[inline]
    #[must_use]
    pub fn distortion_target(&self) -> Option<&Arc<RenderTarget>> {
        self.distortion_target.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn bloom_target(&self) -> Option<&Arc<RenderTarget>> {
        self.bloom_target.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn descriptions(&self) -> &[PassDescription] {
        &self.descriptions
    }

    #[must_use]
    pub fn description(&self, pass: ParticlePass) -> Option<&PassDescription> {
        self.descriptions.iter().find(|d| d.pass == pass)
    }

    /// Particle passes drawn in sub-pass `sub_pass` of baked pass
    /// `render_pass`, in pass table order.
    pub fn passes_at(&self, render_pass: usize, sub_pass: u32) -> impl Iterator<Item = ParticlePass> + '_ {
        ParticlePass::ALL.into_iter().filter(move |&pass| {
            self.locations
                .iter()
                .any(|l| l.pass == pass && l.render_pass == render_pass && l.sub_pass == sub_pass)
        })
    }
}
