//! Render Graph Tests
//!
//! Tests for:
//! - Resize reusing render passes when the swap chain format is unchanged
//! - Pass table republication and render state rebuild on a format change
//! - Shadow pass construction
//! - Render pass split around bloom
//! - Scene options persistence

use std::sync::Arc;

use particle_rhi::binding::{ParticlePass, ShaderOptions};
use particle_rhi::cache::RendererCacheInstanceUpdate;
use particle_rhi::graph::{
    InitRenderPasses, RenderGraph, RenderPassSlot, SHADOW_CASCADE_COUNT, SceneOptions, ShadowOptions, TargetRole,
};
use particle_rhi::material::{FeatureDesc, FeatureNeeds, FeatureProperty, MaterialSettings, RendererClass, RendererDescriptor, names};
use particle_rhi::rhi::{GpuCaps, HeadlessApi, MemoryProvider, RenderApi, RenderTarget};
use particle_rhi::{GraphicsDeviceContext, RhiError};

fn context() -> anyhow::Result<(Arc<HeadlessApi>, GraphicsDeviceContext)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let api = Arc::new(HeadlessApi::new(GpuCaps::default()));
    let ctx = GraphicsDeviceContext::new(api.clone(), Arc::new(MemoryProvider::permissive()), "Shaders")?;
    Ok((api, ctx))
}

fn swap_chain(
    api: &HeadlessApi,
    format: wgpu::TextureFormat,
    size: [u32; 2],
    count: usize,
) -> anyhow::Result<Vec<Arc<RenderTarget>>> {
    (0..count)
        .map(|i| Ok(api.create_render_target(&format!("Swap Chain {i}"), format, size, false)?))
        .collect()
}

fn render_pass_ids(graph: &RenderGraph) -> Vec<particle_rhi::rhi::ResourceId> {
    graph.passes().iter().map(|p| p.render_pass.id).collect()
}

// ============================================================================
// Resize
// ============================================================================

#[test]
fn resize_keeps_render_passes_for_the_same_format() -> anyhow::Result<()> {
    let (api, ctx) = context()?;
    let init = InitRenderPasses::GBUFFER | InitRenderPasses::DISTORTION | InitRenderPasses::TONE_MAPPING;
    let mut graph = RenderGraph::build(&ctx, init, &swap_chain(&api, wgpu::TextureFormat::Bgra8Unorm, [1280, 720], 2)?)?;
    let before = render_pass_ids(&graph);
    let old_frame_buffer = graph.passes()[0].frame_buffer(0).map(|f| f.id);
    let merge = ctx.pass_description(ParticlePass::Transparent).expect("published");

    graph.resize(&ctx, &swap_chain(&api, wgpu::TextureFormat::Bgra8Unorm, [1920, 1080], 2)?)?;

    assert_eq!(graph.size(), [1920, 1080]);
    assert_eq!(render_pass_ids(&graph), before);
    let frame_buffer = graph.passes()[0].frame_buffer(0).expect("frame buffer");
    assert_eq!(frame_buffer.size, [1920, 1080]);
    assert_ne!(Some(frame_buffer.id), old_frame_buffer);
    let after = ctx.pass_description(ParticlePass::Transparent).expect("still published");
    assert_eq!(after.render_pass.id, merge.render_pass.id);
    assert_eq!(after.sub_pass, merge.sub_pass);
    Ok(())
}

#[test]
fn format_change_republishes_and_rebuilds_render_states() -> anyhow::Result<()> {
    let (api, ctx) = context()?;
    let mut graph = RenderGraph::build(
        &ctx,
        InitRenderPasses::GBUFFER,
        &swap_chain(&api, wgpu::TextureFormat::Bgra8Unorm, [640, 480], 1)?,
    )?;

    let material = MaterialSettings {
        material_name: "Sparks".to_owned(),
        features: vec![
            FeatureDesc::new(names::DIFFUSE)
                .mandatory()
                .needs(FeatureNeeds::UV)
                .property(FeatureProperty::texture("DiffuseMap")),
        ],
        ..MaterialSettings::default()
    };
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &RendererDescriptor::new(RendererClass::Billboard, material))?;
    let instance = update.cache_instance(&ctx).expect("instance");
    let cache = instance.cache.as_ref().expect("renderer cache");
    let options = ShaderOptions::VERTEX_PASS_THROUGH;
    let first = cache
        .render_state(&ctx, options, ParticlePass::Transparent)
        .expect("render state");

    // A pure resize keeps the baked state.
    graph.resize(&ctx, &swap_chain(&api, wgpu::TextureFormat::Bgra8Unorm, [800, 600], 1)?)?;
    let resized = cache
        .render_state(&ctx, options, ParticlePass::Transparent)
        .expect("render state");
    assert_eq!(resized.id, first.id);

    let before = render_pass_ids(&graph);
    let states_before = api.creation_count("render state");
    graph.resize(&ctx, &swap_chain(&api, wgpu::TextureFormat::Rgba8Unorm, [800, 600], 1)?)?;
    assert_ne!(render_pass_ids(&graph), before);

    let merge = ctx.pass_description(ParticlePass::Transparent).expect("republished");
    assert_eq!(merge.render_pass.id, graph.passes()[0].render_pass.id);
    let rebuilt = cache
        .render_state(&ctx, options, ParticlePass::Transparent)
        .expect("rebuilt render state");
    assert_ne!(rebuilt.id, first.id);
    assert_eq!(api.creation_count("render state"), states_before + 1);

    update.release(&ctx);
    Ok(())
}

#[test]
fn empty_swap_chain_is_rejected() -> anyhow::Result<()> {
    let (_, ctx) = context()?;
    let result = RenderGraph::build(&ctx, InitRenderPasses::GBUFFER, &[]);
    assert!(matches!(result, Err(RhiError::MissingSwapChain)));
    assert!(ctx.pass_description(ParticlePass::Transparent).is_none());
    Ok(())
}

// ============================================================================
// Shadows
// ============================================================================

#[test]
fn shadow_pass_has_one_frame_buffer_per_cascade() -> anyhow::Result<()> {
    let (api, ctx) = context()?;
    let chain = swap_chain(&api, wgpu::TextureFormat::Bgra8Unorm, [1280, 720], 2)?;
    let shadows = ShadowOptions {
        resolution: glam::UVec2::new(512, 256),
        ..ShadowOptions::default()
    };
    let graph = RenderGraph::build_with_shadows(&ctx, InitRenderPasses::GBUFFER, &chain, Some(shadows))?;

    let shadow = graph.shadow_pass().expect("shadow pass");
    assert_eq!(shadow.frame_buffers.len(), SHADOW_CASCADE_COUNT);
    assert_eq!(shadow.cascades.len(), SHADOW_CASCADE_COUNT);
    assert_eq!(shadow.resolution, [512, 256]);
    assert_eq!(shadow.clear_values.len(), shadow.render_pass.attachments.len());

    let description = graph.description(ParticlePass::OpaqueShadow).expect("shadow pass published");
    assert_eq!(description.render_pass.id, shadow.render_pass.id);
    assert_eq!(description.sub_pass, 0);
    assert!(ctx.pass_description(ParticlePass::OpaqueShadow).is_some());
    Ok(())
}

#[test]
fn disabled_shadows_build_no_shadow_pass() -> anyhow::Result<()> {
    let (api, ctx) = context()?;
    let chain = swap_chain(&api, wgpu::TextureFormat::Bgra8Unorm, [1280, 720], 1)?;
    let disabled = ShadowOptions {
        enable: false,
        ..ShadowOptions::default()
    };
    let graph = RenderGraph::build_with_shadows(&ctx, InitRenderPasses::GBUFFER, &chain, Some(disabled))?;
    assert!(graph.shadow_pass().is_none());
    assert!(ctx.pass_description(ParticlePass::OpaqueShadow).is_none());

    // Without a GBuffer there is nothing to shadow.
    let graph = RenderGraph::build_with_shadows(&ctx, InitRenderPasses::TONE_MAPPING, &chain, Some(ShadowOptions::default()))?;
    assert!(graph.shadow_pass().is_none());
    assert!(graph.gbuffer().is_none());
    assert!(graph.gbuffer_sets().is_none());
    Ok(())
}

// ============================================================================
// Bloom split
// ============================================================================

#[test]
fn bloom_splits_the_pipeline_into_three_render_passes() -> anyhow::Result<()> {
    let (api, ctx) = context()?;
    let init = InitRenderPasses::GBUFFER | InitRenderPasses::BLOOM | InitRenderPasses::TONE_MAPPING;
    let graph = RenderGraph::build(&ctx, init, &swap_chain(&api, wgpu::TextureFormat::Bgra8Unorm, [1280, 720], 3)?)?;

    let slots: Vec<_> = graph.passes().iter().map(|p| p.slot).collect();
    assert_eq!(
        slots,
        vec![RenderPassSlot::BeforeBloom, RenderPassSlot::Bloom, RenderPassSlot::Final]
    );
    assert!(graph.bloom_target().is_some());

    // Particles render before bloom; only the last pass writes the swap chain.
    let merge = graph.description(ParticlePass::Transparent).expect("merge pass");
    assert_eq!(merge.render_pass.id, graph.passes()[0].render_pass.id);
    assert_eq!(graph.passes()[0].frame_buffers.len(), 1);
    assert_eq!(graph.passes()[2].frame_buffers.len(), 3);
    assert_eq!(graph.wiring().last().map(|w| w.output), Some(TargetRole::SwapChain));
    Ok(())
}

// ============================================================================
// Options
// ============================================================================

#[test]
fn scene_options_survive_json() -> anyhow::Result<()> {
    let mut options = SceneOptions::default();
    options.bloom.enable = true;
    options.fxaa.enable = true;
    options.shadows.enable = false;
    options.debug_views = true;

    let restored = SceneOptions::from_json_str(&options.to_json_string()?)?;
    assert_eq!(restored, options);

    let init = restored.init_render_passes(true);
    assert!(init.contains(InitRenderPasses::GBUFFER | InitRenderPasses::BLOOM | InitRenderPasses::FXAA));
    assert!(init.contains(InitRenderPasses::DEBUG));
    assert!(restored.shadows_for(init).is_none());
    Ok(())
}
