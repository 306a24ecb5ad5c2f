//! Resource Cache Tests
//!
//! Tests for:
//! - Sharing of equal keys and single creation per entry
//! - Renderer cache sharing across renderers that only differ by values
//! - Texture fallback on missing or refused textures
//! - Retry after a failed creation
//! - Dependency release when the last reference goes away
//! - Render state identity through the content hash

use std::sync::Arc;

use particle_rhi::binding::{ParticlePass, ShaderOptions};
use particle_rhi::cache::{CacheKey, RenderStateKey, RendererCacheInstanceUpdate, TextureKey};
use particle_rhi::material::{
    FeatureDesc, FeatureNeeds, FeatureProperty, MaterialSettings, PropertyValue, RendererClass,
    RendererDescriptor, names,
};
use particle_rhi::rhi::{GpuCaps, HeadlessApi, MemoryProvider, TextureData};
use particle_rhi::{GraphicsDeviceContext, RhiError};

const SMOKE: &str = "Textures/Smoke.dds";

fn context() -> anyhow::Result<(Arc<HeadlessApi>, GraphicsDeviceContext, Arc<MemoryProvider>)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let api = Arc::new(HeadlessApi::new(GpuCaps::default()));
    let provider = Arc::new(MemoryProvider::permissive());
    provider.insert_texture(
        SMOKE,
        TextureData {
            width: 2,
            height: 2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            pixels: vec![255; 16],
        },
    );
    let ctx = GraphicsDeviceContext::new(api.clone(), provider.clone(), "Shaders")?;
    Ok((api, ctx, provider))
}

fn smoke_material() -> MaterialSettings {
    MaterialSettings {
        material_name: "Smoke".to_owned(),
        features: vec![
            FeatureDesc::new(names::DIFFUSE)
                .mandatory()
                .needs(FeatureNeeds::UV)
                .property(FeatureProperty::texture("DiffuseMap"))
                .property(FeatureProperty::constant("Intensity", particle_rhi::rhi::ValueType::Float)),
        ],
        ..MaterialSettings::default()
    }
}

fn smoke_renderer(texture: &str, intensity: f32) -> RendererDescriptor {
    RendererDescriptor::new(RendererClass::Billboard, smoke_material())
        .with_property("Diffuse.DiffuseMap", PropertyValue::Path(texture.to_owned()))
        .with_property("Diffuse.Intensity", PropertyValue::Float(intensity))
}

// ============================================================================
// Generic manager
// ============================================================================

#[test]
fn equal_keys_share_one_entry_and_one_creation() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let before = api.creation_count("texture");

    let handles = (0..4)
        .map(|_| ctx.textures.acquire(&ctx, TextureKey::new(SMOKE, true), ()))
        .collect::<Result<Vec<_>, RhiError>>()?;
    assert!(handles.windows(2).all(|pair| pair[0] == pair[1]));
    let handle = handles[0];
    assert_eq!(ctx.textures.ref_count(handle), 4);
    assert_eq!(ctx.textures.len(), 1);

    for _ in 0..3 {
        assert!(ctx.textures.resolve(&ctx, handle).is_some());
    }
    assert_eq!(api.creation_count("texture"), before + 1);

    // sRGB is part of the identity.
    let linear = ctx.textures.acquire(&ctx, TextureKey::new(SMOKE, false), ())?;
    assert_ne!(linear, handle);
    assert!(ctx.textures.release(&ctx, linear));

    for remaining in (1..4).rev() {
        assert!(!ctx.textures.release(&ctx, handle));
        assert_eq!(ctx.textures.ref_count(handle), remaining);
    }
    assert!(ctx.textures.release(&ctx, handle));
    assert!(!ctx.textures.contains(handle));
    assert!(ctx.textures.resolve(&ctx, handle).is_none());
    assert!(ctx.textures.is_empty());
    Ok(())
}

#[test]
fn empty_texture_path_fails_to_prepare() -> anyhow::Result<()> {
    let (_, ctx, _) = context()?;
    let result = ctx.textures.acquire(&ctx, TextureKey::new("", true), ());
    assert!(matches!(result, Err(RhiError::ResourceNotFound(_))));
    assert!(ctx.textures.is_empty());
    Ok(())
}

#[test]
fn cleared_resources_are_recreated_on_resolve() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let handle = ctx.textures.acquire(&ctx, TextureKey::new(SMOKE, true), ())?;
    let first = ctx.textures.resolve(&ctx, handle).expect("texture");

    ctx.textures.clear_gpu_resources();
    assert!(ctx.textures.resource(handle).is_none());
    assert_eq!(ctx.textures.ref_count(handle), 1);

    let before = api.creation_count("texture");
    let second = ctx.textures.resolve(&ctx, handle).expect("texture");
    assert_ne!(first.id, second.id);
    assert_eq!(api.creation_count("texture"), before + 1);
    ctx.textures.release(&ctx, handle);
    Ok(())
}

// ============================================================================
// Renderer caches and instances
// ============================================================================

#[test]
fn renderers_differing_by_values_share_a_renderer_cache() -> anyhow::Result<()> {
    let (_, ctx, _) = context()?;
    let mut a = RendererCacheInstanceUpdate::build(&ctx, &smoke_renderer(SMOKE, 1.0))?;
    let mut b = RendererCacheInstanceUpdate::build(&ctx, &smoke_renderer(SMOKE, 2.0))?;
    let mut c = RendererCacheInstanceUpdate::build(&ctx, &smoke_renderer(SMOKE, 1.0))?;

    assert_eq!(ctx.renderer_caches.len(), 1);
    // Different constant values make different instances, equal ones share.
    assert_ne!(a.handle(), b.handle());
    assert_eq!(a.handle(), c.handle());
    assert_eq!(ctx.renderer_cache_instances.len(), 2);

    let instance_a = a.cache_instance(&ctx).expect("instance a");
    let instance_b = b.cache_instance(&ctx).expect("instance b");
    let (cache_a, cache_b) = (
        instance_a.cache.as_ref().expect("cache a"),
        instance_b.cache.as_ref().expect("cache b"),
    );
    assert!(Arc::ptr_eq(cache_a, cache_b));
    assert!(Arc::ptr_eq(&instance_a.textures[0], &instance_b.textures[0]));
    assert_eq!(instance_a.textures[0].name, SMOKE);

    for update in [&mut a, &mut b, &mut c] {
        update.release(&ctx);
    }
    assert!(ctx.renderer_cache_instances.is_empty());
    assert!(ctx.renderer_caches.is_empty());
    assert!(ctx.render_states.is_empty());
    assert!(ctx.shader_programs.is_empty());
    assert!(ctx.shader_modules.is_empty());
    assert!(ctx.textures.is_empty());
    assert!(ctx.samplers.is_empty());
    Ok(())
}

#[test]
fn material_constants_are_uploaded() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &smoke_renderer(SMOKE, 0.5))?;
    let instance = update.cache_instance(&ctx).expect("instance");
    let buffer = instance.constant_buffer.as_ref().expect("material constants");
    assert_eq!(api.buffer_contents(buffer.id), Some(0.5f32.to_le_bytes().to_vec()));
    update.release(&ctx);
    Ok(())
}

#[test]
fn missing_texture_binds_the_white_default() -> anyhow::Result<()> {
    let (_, ctx, _) = context()?;
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &smoke_renderer("Textures/Missing.dds", 1.0))?;
    let instance = update.cache_instance(&ctx).expect("instance despite the missing texture");
    assert!(Arc::ptr_eq(&instance.textures[0], &ctx.defaults().white));
    assert!(instance.cache.is_some());
    assert!(instance.constant_set.is_some());
    update.release(&ctx);
    Ok(())
}

#[test]
fn refused_texture_creation_falls_back() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    api.fail_on(SMOKE);
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &smoke_renderer(SMOKE, 1.0))?;
    let instance = update.cache_instance(&ctx).expect("instance");
    assert!(Arc::ptr_eq(&instance.textures[0], &ctx.defaults().white));
    update.release(&ctx);
    Ok(())
}

#[test]
fn failed_instance_creation_is_retried() -> anyhow::Result<()> {
    let (api, ctx, _) = context()?;
    api.fail_on("Material Constant Set");
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &smoke_renderer(SMOKE, 1.0))?;
    assert!(update.cache_instance(&ctx).is_none());
    assert!(update.cache_instance(&ctx).is_none());
    assert_eq!(ctx.renderer_cache_instances.create_missing(&ctx), 1);

    api.clear_failure("Material Constant Set");
    assert_eq!(ctx.renderer_cache_instances.create_missing(&ctx), 0);
    assert!(update.cache_instance(&ctx).is_some());
    update.release(&ctx);
    Ok(())
}

#[test]
fn sound_renderers_are_rejected() -> anyhow::Result<()> {
    let (_, ctx, _) = context()?;
    let sound = RendererDescriptor::new(RendererClass::Sound, MaterialSettings::default());
    let result = RendererCacheInstanceUpdate::build(&ctx, &sound);
    assert!(matches!(result, Err(RhiError::UnsupportedRenderer(_))));
    assert!(ctx.renderer_cache_instances.is_empty());
    assert!(ctx.renderer_caches.is_empty());
    Ok(())
}

#[test]
fn atlas_renderers_acquire_their_atlas() -> anyhow::Result<()> {
    let (_, ctx, provider) = context()?;
    provider.insert_atlas("Atlases/Sparks.pkat", vec![[0.5, 0.5, 0.0, 0.0], [0.5, 0.5, 0.5, 0.0]]);

    let mut material = smoke_material();
    material.features.push(FeatureDesc::new(names::ATLAS));
    let renderer = RendererDescriptor::new(RendererClass::Billboard, material)
        .enable(names::ATLAS)
        .with_property(names::ATLAS_DEFINITION, PropertyValue::Path("Atlases/Sparks.pkat".to_owned()));
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &renderer)?;

    let instance = update.cache_instance(&ctx).expect("instance");
    assert!(instance.has_atlas);
    assert!(instance.atlas.is_some());
    assert_eq!(ctx.atlases.len(), 1);

    update.release(&ctx);
    assert!(ctx.atlases.is_empty());
    Ok(())
}

// ============================================================================
// Render states
// ============================================================================

#[test]
fn render_states_with_equal_digests_share_an_entry() -> anyhow::Result<()> {
    let (_, ctx, _) = context()?;
    let mut material = smoke_material();
    material
        .features
        .push(FeatureDesc::new(names::LIT).needs(FeatureNeeds::NORMAL | FeatureNeeds::LIGHTING));
    let options = ShaderOptions::VERTEX_PASS_THROUGH;
    let pass = ParticlePass::Transparent;

    let plain = RendererDescriptor::new(RendererClass::Billboard, material.clone());
    let lit = RendererDescriptor::new(RendererClass::Billboard, material).enable(names::LIT);
    let a = RenderStateKey::new(&plain, options, pass);
    let mut b = RenderStateKey::new(&lit, options, pass);
    assert_ne!(a, b);

    // Same digest over different feature lists: the keys are one identity.
    b.content_hash = a.content_hash;
    b.pipeline = a.pipeline;
    assert_ne!(a.features, b.features);
    assert_eq!(a, b);

    let first = ctx.render_states.acquire(&ctx, a.clone(), ())?;
    let second = ctx.render_states.acquire(&ctx, b.clone(), ())?;
    assert_eq!(first, second);
    assert_eq!(ctx.render_states.len(), 1);
    assert_eq!(ctx.render_states.ref_count(first), 2);

    // The shared entry kept the first layout; the second one differs.
    let existing = ctx.render_states.deps(first).expect("prepared deps");
    let prepared = b.clone().prepare(&ctx, ())?;
    assert!(b.collides(&existing, &prepared));
    assert!(!a.collides(&existing, &existing));
    b.release_dependencies(&prepared, &ctx);

    assert!(!ctx.render_states.release(&ctx, second));
    assert!(ctx.render_states.release(&ctx, first));
    assert!(ctx.render_states.is_empty());
    assert!(ctx.shader_programs.is_empty());
    Ok(())
}
