//! Draw Dispatch Tests
//!
//! Tests for:
//! - Headless end-to-end frame: graph, renderer cache, instance, dispatch
//! - Render state and geometry binding deduplication
//! - Push constants and skipped draws
//! - Mesh geometry substitution and failed geometry
//! - Shadow cascades recorded before the scene
//! - GBuffer sampler sets and their dummy stand-ins
//! - Dummy shadows info while rendering shadow maps
//! - Draw-request sets reused across frames

use std::sync::Arc;

use glam::{Vec2, Vec3};

use particle_rhi::binding::{ParticlePass, ShaderOptions};
use particle_rhi::cache::RendererCacheInstanceUpdate;
use particle_rhi::draw::{DrawCall, DrawType, ParticleSceneRenderer};
use particle_rhi::graph::{RenderTargetDebug, SceneOptions};
use particle_rhi::material::{
    FeatureDesc, FeatureNeeds, FeatureProperty, MaterialSettings, PropertyValue, RendererClass,
    RendererDescriptor, names,
};
use particle_rhi::rhi::{
    Buffer, BufferDesc, BufferKind, Command, CommandBuffer, GpuCaps, HeadlessApi, MemoryProvider, MeshData,
    RenderApi, RenderTarget, ResourceId,
};
use particle_rhi::GraphicsDeviceContext;

// ============================================================================
// Fixtures
// ============================================================================

fn context() -> anyhow::Result<(Arc<HeadlessApi>, GraphicsDeviceContext, Arc<MemoryProvider>)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let api = Arc::new(HeadlessApi::new(GpuCaps::default()));
    let provider = Arc::new(MemoryProvider::permissive());
    let ctx = GraphicsDeviceContext::new(api.clone(), provider.clone(), "Shaders")?;
    Ok((api, ctx, provider))
}

fn swap_chain(api: &HeadlessApi, count: usize) -> anyhow::Result<Vec<Arc<RenderTarget>>> {
    (0..count)
        .map(|i| {
            Ok(api.create_render_target(
                &format!("Swap Chain {i}"),
                wgpu::TextureFormat::Bgra8Unorm,
                [640, 360],
                false,
            )?)
        })
        .collect()
}

fn diffuse_material(extra: Vec<FeatureDesc>) -> MaterialSettings {
    let mut features = vec![
        FeatureDesc::new(names::DIFFUSE)
            .mandatory()
            .needs(FeatureNeeds::UV)
            .property(FeatureProperty::texture("DiffuseMap")),
    ];
    features.extend(extra);
    MaterialSettings {
        material_name: "Default".to_owned(),
        features,
        ..MaterialSettings::default()
    }
}

fn vertex_buffer(api: &HeadlessApi, name: &str) -> anyhow::Result<Arc<Buffer>> {
    Ok(api.create_buffer(&BufferDesc::new(name, BufferKind::Vertex, 6 * 32))?)
}

fn draws_in(cmd: &CommandBuffer) -> Vec<&Command> {
    cmd.commands
        .iter()
        .filter(|c| {
            matches!(
                c,
                Command::Draw { .. }
                    | Command::DrawIndexed { .. }
                    | Command::DrawIndexedInstanced { .. }
                    | Command::DrawInstancedIndirect { .. }
                    | Command::DrawIndexedInstancedIndirect { .. }
            )
        })
        .collect()
}

fn count(cmd: &CommandBuffer, pred: impl Fn(&Command) -> bool) -> usize {
    cmd.commands.iter().filter(|c| pred(c)).count()
}

fn bound_sets(cmd: &CommandBuffer) -> Vec<ResourceId> {
    cmd.commands
        .iter()
        .filter_map(|c| match c {
            Command::BindConstantSets(sets) => Some(sets.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn headless_frame_draws_transparent_billboard() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let chain = swap_chain(&api, 2)?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &chain)?;

    let descriptor = RendererDescriptor::new(RendererClass::Billboard, diffuse_material(Vec::new()));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;
    let vertices = vertex_buffer(&api, "Billboard Vertices")?;
    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH)
        .with_vertices(vec![vertices.clone()], 6);

    let stats = renderer.render_scene(&ctx, RenderTargetDebug::NoDebug, &[draw], 1)?;
    assert_eq!(stats.draws, 1);
    assert_eq!(stats.skipped, 0);

    // Nothing casts shadows: only the scene buffer is submitted.
    let submitted = api.take_submitted();
    assert_eq!(submitted.len(), 1);
    let scene = &submitted[0];
    assert_eq!(scene.draw_count(), 1);
    assert_eq!(
        draws_in(scene),
        vec![&Command::Draw {
            vertex_offset: 0,
            vertex_count: 6
        }]
    );
    assert!(scene.commands.contains(&Command::BindVertexBuffers {
        buffers: vec![vertices.id],
        offsets: vec![0],
    }));
    assert_eq!(
        count(scene, |c| matches!(c, Command::BeginRenderPass { .. })),
        count(scene, |c| matches!(c, Command::EndRenderPass))
    );

    // The material has no diffuse texture path: the white default is bound.
    let instance = update.cache_instance(&ctx).expect("instance resolves after a frame");
    assert_eq!(instance.textures.len(), 1);
    assert!(Arc::ptr_eq(&instance.textures[0], &ctx.defaults().white));
    assert!(instance.constant_set.is_some());

    update.release(&ctx);
    assert!(ctx.renderer_cache_instances.is_empty());
    assert!(ctx.renderer_caches.is_empty());
    assert!(ctx.render_states.is_empty());
    Ok(())
}

#[test]
fn scene_info_set_is_bound_with_the_draw() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, diffuse_material(Vec::new()));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;
    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH)
        .with_vertices(vec![vertex_buffer(&api, "Vertices")?], 6);

    let mut cmd = CommandBuffer::new("Test");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Transparent], &[draw], &mut cmd, None);
    assert_eq!(stats.draws, 1);

    let scene_info = renderer.scene().scene_info.id;
    let bound = cmd.commands.iter().find_map(|c| match c {
        Command::BindConstantSets(sets) => Some(sets.clone()),
        _ => None,
    });
    assert!(bound.is_some_and(|sets| sets.contains(&scene_info)));

    update.release(&ctx);
    Ok(())
}

#[test]
fn repeated_draws_share_render_state_and_buffers() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, diffuse_material(Vec::new()));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;

    let shared = vertex_buffer(&api, "Shared Vertices")?;
    let other = vertex_buffer(&api, "Other Vertices")?;
    let first = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH).with_vertices(vec![shared.clone()], 6);
    let second = first.clone();
    let third = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH).with_vertices(vec![other], 12);

    let mut cmd = CommandBuffer::new("Test");
    let stats = renderer.render_particles(
        &ctx,
        &[ParticlePass::Transparent],
        &[first, second, third],
        &mut cmd,
        None,
    );
    assert_eq!(stats.draws, 3);
    assert_eq!(count(&cmd, |c| matches!(c, Command::BindRenderState(_))), 1);
    assert_eq!(count(&cmd, |c| matches!(c, Command::BindVertexBuffers { .. })), 2);
    assert_eq!(count(&cmd, |c| matches!(c, Command::BindConstantSets(_))), 3);

    update.release(&ctx);
    Ok(())
}

#[test]
fn push_constants_are_indexed_in_order() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, diffuse_material(Vec::new()));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;
    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH)
        .with_vertices(vec![vertex_buffer(&api, "Vertices")?], 6)
        .with_push_constant(vec![1, 2, 3, 4])
        .with_push_constant(vec![5, 6, 7, 8]);

    let mut cmd = CommandBuffer::new("Test");
    renderer.render_particles(&ctx, &[ParticlePass::Transparent], &[draw], &mut cmd, None);

    let pushed: Vec<_> = cmd
        .commands
        .iter()
        .filter_map(|c| match c {
            Command::PushConstant { index, data } => Some((*index, data.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(pushed, vec![(0, vec![1, 2, 3, 4]), (1, vec![5, 6, 7, 8])]);

    update.release(&ctx);
    Ok(())
}

// ============================================================================
// Skipped draws
// ============================================================================

#[test]
fn draw_without_instance_is_skipped() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let orphan = DrawCall::new(RendererClass::Billboard, ShaderOptions::VERTEX_PASS_THROUGH);

    let mut cmd = CommandBuffer::new("Test");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Transparent], &[orphan], &mut cmd, None);
    assert_eq!(stats.draws, 0);
    assert_eq!(stats.skipped, 1);
    assert!(cmd.is_empty());
    Ok(())
}

#[test]
fn draws_follow_registered_passes_and_options() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, diffuse_material(Vec::new()));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;
    let vertices = vertex_buffer(&api, "Vertices")?;

    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH).with_vertices(vec![vertices.clone()], 6);
    let triangle = DrawCall::from_update(
        &update,
        ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::TRIANGLE_VERTEX_BILLBOARDING,
    )
    .with_vertices(vec![vertices], 6);

    let mut cmd = CommandBuffer::new("Test");
    // Transparent-only material: the opaque pass ignores it.
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Opaque], &[draw], &mut cmd, None);
    assert_eq!((stats.draws, stats.skipped), (0, 0));
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Transparent], &[triangle], &mut cmd, None);
    assert_eq!((stats.draws, stats.skipped), (0, 1));
    assert_eq!(cmd.draw_count(), 0);

    update.release(&ctx);
    Ok(())
}

#[test]
fn indirect_draw_without_buffer_is_skipped() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, diffuse_material(Vec::new()));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;

    let mut broken = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH);
    broken.ty = DrawType::InstancedIndirect;
    let args = api.create_buffer(&BufferDesc::new("Indirect Args", BufferKind::Indirect, 16))?;
    let indirect = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH).with_indirect(args.clone(), 0, false);

    let mut cmd = CommandBuffer::new("Test");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Transparent], &[broken, indirect], &mut cmd, None);
    assert_eq!((stats.draws, stats.skipped), (1, 1));
    assert_eq!(
        draws_in(&cmd),
        vec![&Command::DrawInstancedIndirect {
            buffer: args.id,
            offset: 0
        }]
    );

    update.release(&ctx);
    Ok(())
}

// ============================================================================
// Meshes
// ============================================================================

fn mesh_descriptor(path: &str) -> RendererDescriptor {
    RendererDescriptor::new(RendererClass::Mesh, diffuse_material(Vec::new()))
        .with_property(names::MESH, PropertyValue::Path(path.to_owned()))
}

#[test]
fn mesh_draw_uses_instance_geometry() -> anyhow::Result<()> {
    let (api, ctx, provider) = context()?;
    provider.insert_mesh(
        "Meshes/Quad.mesh",
        MeshData {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
            normals: vec![Vec3::Z; 4],
            uvs: vec![Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::ONE],
            indices: vec![0, 1, 2, 2, 1, 3],
        },
    );
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &mesh_descriptor("Meshes/Quad.mesh"))?;
    let transforms = vertex_buffer(&api, "Mesh Transforms")?;
    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH)
        .with_vertices(vec![transforms.clone()], 0)
        .with_instances(3);

    let mut cmd = CommandBuffer::new("Test");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Transparent], &[draw], &mut cmd, None);
    assert_eq!(stats.draws, 1);
    assert_eq!(
        draws_in(&cmd),
        vec![&Command::DrawIndexedInstanced {
            index_offset: 0,
            vertex_offset: 0,
            index_count: 6,
            instance_count: 3
        }]
    );

    let instance = update.cache_instance(&ctx).expect("mesh instance");
    let geometry = instance.geometry.as_ref().expect("mesh geometry");
    let bound = cmd.commands.iter().find_map(|c| match c {
        Command::BindVertexBuffers { buffers, .. } => Some(buffers.clone()),
        _ => None,
    });
    let mut expected: Vec<_> = geometry.vertex_buffers.iter().map(|b| b.id).collect();
    expected.push(transforms.id);
    assert_eq!(bound, Some(expected));

    update.release(&ctx);
    assert!(ctx.geometries.is_empty());
    Ok(())
}

#[test]
fn mesh_with_missing_geometry_is_not_drawn() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &mesh_descriptor("Meshes/Missing.mesh"))?;

    let instance = update.cache_instance(&ctx).expect("instance still resolves");
    assert!(instance.cache.is_none());
    assert!(instance.geometry.is_some());

    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH).with_instances(1);
    let mut cmd = CommandBuffer::new("Test");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Transparent], &[draw], &mut cmd, None);
    assert_eq!((stats.draws, stats.skipped), (0, 1));

    update.release(&ctx);
    Ok(())
}

// ============================================================================
// Shadows
// ============================================================================

#[test]
fn shadow_casters_render_once_per_cascade() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let mut options = SceneOptions::default();
    options.shadows.enable = true;
    let renderer = ParticleSceneRenderer::init(&ctx, options, true, &swap_chain(&api, 1)?)?;
    let cascades = renderer.graph().shadow_pass().expect("shadow pass").frame_buffers.len();

    let material = diffuse_material(vec![FeatureDesc::new(names::OPAQUE).mandatory()]);
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, material)
        .with_property(format!("{}.{}", names::OPAQUE, names::CAST_SHADOWS), PropertyValue::Bool(true));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;
    assert!(update.cast_shadows());

    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH)
        .with_vertices(vec![vertex_buffer(&api, "Vertices")?], 6);
    let stats = renderer.render_scene(&ctx, RenderTargetDebug::NoDebug, &[draw], 0)?;
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.draws, cascades + 1);

    let submitted = api.take_submitted();
    assert_eq!(submitted.len(), 2);
    let (pre, scene) = (&submitted[0], &submitted[1]);
    assert_eq!(pre.draw_count(), cascades);
    assert_eq!(count(pre, |c| matches!(c, Command::BeginRenderPass { .. })), cascades);
    assert!(matches!(
        pre.commands.last(),
        Some(Command::SyncPreviousRenderPass { .. })
    ));
    assert_eq!(scene.draw_count(), 1);

    update.release(&ctx);
    Ok(())
}

#[test]
fn shadow_pass_skips_non_casters() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let material = diffuse_material(vec![FeatureDesc::new(names::OPAQUE).mandatory()]);
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, material);
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;
    assert!(!update.cast_shadows());

    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH)
        .with_vertices(vec![vertex_buffer(&api, "Vertices")?], 6);
    let mut cmd = CommandBuffer::new("Test");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::OpaqueShadow], &[draw], &mut cmd, None);
    assert_eq!(stats, Default::default());
    assert!(cmd.is_empty());

    update.release(&ctx);
    Ok(())
}

#[test]
fn shadow_maps_bind_the_dummy_shadows_info() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let mut options = SceneOptions::default();
    options.shadows.enable = true;
    let renderer = ParticleSceneRenderer::init(&ctx, options, true, &swap_chain(&api, 1)?)?;
    let scene = renderer.scene();

    let material = diffuse_material(vec![
        FeatureDesc::new(names::OPAQUE).mandatory(),
        FeatureDesc::new(names::LIT)
            .mandatory()
            .needs(FeatureNeeds::NORMAL | FeatureNeeds::LIGHTING),
    ]);
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, material)
        .with_property(format!("{}.{}", names::OPAQUE, names::CAST_SHADOWS), PropertyValue::Bool(true));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;
    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH)
        .with_vertices(vec![vertex_buffer(&api, "Vertices")?], 6);
    assert!(draw.cast_shadows);

    let mut shadow = CommandBuffer::new("Shadow");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::OpaqueShadow], &[draw.clone()], &mut shadow, None);
    assert_eq!((stats.draws, stats.skipped), (1, 0));
    let bound = bound_sets(&shadow);
    assert!(bound.contains(&scene.dummy_shadows_info.id));
    assert!(!bound.contains(&scene.shadows_info.id));
    assert!(bound.contains(&scene.light_info.id));

    let mut opaque = CommandBuffer::new("Opaque");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Opaque], &[draw], &mut opaque, None);
    assert_eq!((stats.draws, stats.skipped), (1, 0));
    let bound = bound_sets(&opaque);
    assert!(bound.contains(&scene.shadows_info.id));
    assert!(!bound.contains(&scene.dummy_shadows_info.id));

    update.release(&ctx);
    Ok(())
}

// ============================================================================
// GBuffer samplers
// ============================================================================

fn gbuffer_sampling_material() -> MaterialSettings {
    diffuse_material(vec![
        FeatureDesc::new("SoftParticles").mandatory().needs(
            FeatureNeeds::SAMPLE_DEPTH | FeatureNeeds::SAMPLE_NORMAL_ROUGH_METAL | FeatureNeeds::SAMPLE_DIFFUSE,
        ),
    ])
}

fn draw_gbuffer_sampler(gbuffer: bool) -> anyhow::Result<(ParticleSceneRenderer, Vec<ResourceId>)> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), gbuffer, &swap_chain(&api, 1)?)?;
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, gbuffer_sampling_material());
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;
    let draw = DrawCall::from_update(&update, ShaderOptions::VERTEX_PASS_THROUGH)
        .with_vertices(vec![vertex_buffer(&api, "Vertices")?], 6);

    let mut cmd = CommandBuffer::new("Test");
    let stats = renderer.render_particles(&ctx, &[ParticlePass::Transparent], &[draw], &mut cmd, None);
    assert_eq!((stats.draws, stats.skipped), (1, 0));

    update.release(&ctx);
    Ok((renderer, bound_sets(&cmd)))
}

#[test]
fn gbuffer_samplers_fall_back_to_dummy_sets() -> anyhow::Result<()> {
    let (renderer, bound) = draw_gbuffer_sampler(false)?;
    assert!(renderer.graph().gbuffer_sets().is_none());

    let scene = renderer.scene();
    for dummy in [&scene.dummy_depth, &scene.dummy_normal_rough_metal, &scene.dummy_diffuse] {
        assert!(bound.contains(&dummy.id), "{} not bound", dummy.name);
    }
    Ok(())
}

#[test]
fn gbuffer_samplers_bind_the_graph_sets() -> anyhow::Result<()> {
    let (renderer, bound) = draw_gbuffer_sampler(true)?;
    let gbuffer = renderer.graph().gbuffer_sets().expect("gbuffer sets");
    for set in [&gbuffer.depth, &gbuffer.normal_rough_metal, &gbuffer.diffuse] {
        assert!(bound.contains(&set.id), "{} not bound", set.name);
    }

    let scene = renderer.scene();
    for dummy in [&scene.dummy_depth, &scene.dummy_normal_rough_metal, &scene.dummy_diffuse] {
        assert!(!bound.contains(&dummy.id));
    }
    Ok(())
}

// ============================================================================
// Draw requests
// ============================================================================

#[test]
fn draw_request_sets_are_reused_across_frames() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let renderer = ParticleSceneRenderer::init(&ctx, SceneOptions::default(), true, &swap_chain(&api, 1)?)?;
    let descriptor = RendererDescriptor::new(RendererClass::Billboard, diffuse_material(Vec::new()));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &descriptor)?;

    let requests = api.create_buffer(&BufferDesc::new("Draw Requests", BufferKind::Constant, 256))?;
    let draw = DrawCall::from_update(
        &update,
        ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::VERTEX_BILLBOARDING,
    )
    .with_vertices(vec![vertex_buffer(&api, "Vertices")?], 6)
    .with_draw_requests(requests);

    let frame = |draws: &[DrawCall]| {
        let mut cmd = CommandBuffer::new("Test");
        let stats = renderer.render_particles(&ctx, &[ParticlePass::Transparent], draws, &mut cmd, None);
        (stats, bound_sets(&cmd))
    };

    let before = api.creation_count("constant set");
    let (stats, first) = frame(&[draw.clone(), draw.clone()]);
    assert_eq!((stats.draws, stats.skipped), (2, 0));
    assert_eq!(api.creation_count("constant set"), before + 1);
    assert_eq!(renderer.draw_request_sets().len(), 1);

    let (stats, second) = frame(&[draw]);
    assert_eq!(stats.draws, 1);
    assert_eq!(api.creation_count("constant set"), before + 1);
    assert!(second.iter().all(|id| first.contains(id)));

    // Kept while drawn, dropped after a scene that no longer draws it.
    renderer.render_scene(&ctx, RenderTargetDebug::NoDebug, &[], 0)?;
    assert_eq!(renderer.draw_request_sets().len(), 1);
    renderer.render_scene(&ctx, RenderTargetDebug::NoDebug, &[], 0)?;
    assert!(renderer.draw_request_sets().is_empty());

    update.release(&ctx);
    Ok(())
}
