//! Binding Compiler Tests
//!
//! Tests for:
//! - Determinism of the binding builder
//! - Plan ordering contract (buffers before attributes, sets in role order)
//! - Content hash equivalence across property values
//! - Runtime and offline binding agreement
//! - Hashed shader paths shared by the runtime and the offline enumerator
//! - Declaration stubs validating against their own bindings

use std::sync::Arc;

use particle_rhi::binding::{
    BindingInput, BindingStep, ComputeShaderType, ParticlePass, ShaderOptions, build_bindings, build_plan,
    feature_fields, render_stub, validate_stub,
};
use particle_rhi::cache::{MaterialShaders, RendererCacheInstanceUpdate, ShaderModuleKey, ShaderProgramKey};
use particle_rhi::content_hash;
use particle_rhi::hash::compute_shader_file;
use particle_rhi::material::{
    FeatureDesc, FeatureNeeds, FeatureProperty, MaterialSettings, PropertyValue, RendererClass,
    RendererDescriptor, ToggledFeature, names,
};
use particle_rhi::offline::OfflineCompileArgs;
use particle_rhi::rhi::{GpuCaps, GraphicsApi, HeadlessApi, MemoryProvider, ShaderStage, ValueType};
use particle_rhi::GraphicsDeviceContext;

fn material() -> MaterialSettings {
    MaterialSettings {
        material_name: "Fire".to_owned(),
        features: vec![
            FeatureDesc::new(names::DIFFUSE)
                .mandatory()
                .needs(FeatureNeeds::UV)
                .property(FeatureProperty::texture("DiffuseMap"))
                .field("Color", ValueType::Float4),
            FeatureDesc::new(names::EMISSIVE)
                .property(FeatureProperty::constant("Intensity", ValueType::Float))
                .field("EmissiveColor", ValueType::Float3),
            FeatureDesc::new(names::ATLAS),
            FeatureDesc::new(names::LIT).needs(FeatureNeeds::NORMAL | FeatureNeeds::LIGHTING),
        ],
        ..MaterialSettings::default()
    }
}

fn renderer() -> RendererDescriptor {
    RendererDescriptor::new(RendererClass::Billboard, material())
        .enable(names::EMISSIVE)
        .enable(names::ATLAS)
        .with_field("Diffuse.Color", ValueType::Float4)
        .with_field("Emissive.EmissiveColor", ValueType::Float3)
}

fn enabled(renderer: &RendererDescriptor) -> Vec<ToggledFeature> {
    renderer.toggled_features().into_iter().filter(|t| t.enabled).collect()
}

// ============================================================================
// Determinism and plan order
// ============================================================================

#[test]
fn builder_is_deterministic() -> anyhow::Result<()> {
    let renderer = renderer();
    let features = renderer.toggled_features();
    for options in [
        ShaderOptions::VERTEX_PASS_THROUGH,
        ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::GEOM_BILLBOARDING | ShaderOptions::AXIS_C1,
        ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::VERTEX_BILLBOARDING | ShaderOptions::CAPSULE,
    ] {
        let input = BindingInput::new(renderer.class, options, &features, &renderer.fields);
        let a = build_bindings(&input)?;
        let b = build_bindings(&input)?;
        assert_eq!(a, b);
        assert_eq!(a.bindings.layout_hash(), b.bindings.layout_hash());
        assert_eq!(build_plan(&input)?, build_plan(&input)?);
    }
    Ok(())
}

#[test]
fn plan_opens_buffers_before_attributes_and_orders_sets() -> anyhow::Result<()> {
    let renderer = renderer();
    let features = renderer.toggled_features();
    let options = ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::VERTEX_BILLBOARDING;
    let input = BindingInput::new(renderer.class, options, &features, &renderer.fields);
    let plan = build_plan(&input)?;

    let first_buffer = plan
        .steps()
        .iter()
        .position(|s| matches!(s, BindingStep::VertexBuffer { .. }));
    let first_attribute = plan
        .steps()
        .iter()
        .position(|s| matches!(s, BindingStep::Attribute { .. }));
    if let Some(attribute) = first_attribute {
        assert!(first_buffer.is_some_and(|buffer| buffer < attribute));
    }

    let roles_in_plan: Vec<_> = plan
        .steps()
        .iter()
        .filter_map(|s| match s {
            BindingStep::ConstantSet { role, .. } => Some(*role),
            _ => None,
        })
        .collect();
    let compiled = plan.fold()?;
    assert_eq!(compiled.set_roles, roles_in_plan);
    assert_eq!(compiled.set_roles.len(), compiled.bindings.constant_sets.len());
    assert_eq!(compiled.needed, plan.needed());

    // Locations are dense and strictly increasing.
    for pair in compiled.bindings.attributes.windows(2) {
        assert_eq!(pair[1].location, pair[0].location + pair[0].ty.rows());
    }
    Ok(())
}

// ============================================================================
// Content hash
// ============================================================================

#[test]
fn content_hash_ignores_property_values() {
    let a = renderer().with_property("Emissive.Intensity", PropertyValue::Float(1.0));
    let b = renderer().with_property("Emissive.Intensity", PropertyValue::Float(8.0));
    let options = ShaderOptions::VERTEX_PASS_THROUGH;
    assert_eq!(
        content_hash(options, a.class, &a.toggled_features()),
        content_hash(options, b.class, &b.toggled_features())
    );
}

#[test]
fn content_hash_follows_enabled_features() {
    let base = renderer();
    let options = ShaderOptions::VERTEX_PASS_THROUGH;
    let hash = content_hash(options, base.class, &base.toggled_features());

    // Disabled features never participate.
    assert_eq!(hash, content_hash(options, base.class, &enabled(&base)));

    let lit = renderer().enable(names::LIT);
    assert_ne!(hash, content_hash(options, lit.class, &lit.toggled_features()));
    let no_atlas = renderer().with_property(names::ATLAS, PropertyValue::Bool(false));
    assert_ne!(hash, content_hash(options, no_atlas.class, &no_atlas.toggled_features()));

    assert_ne!(
        hash,
        content_hash(options | ShaderOptions::CAPSULE, base.class, &base.toggled_features())
    );
    assert_ne!(hash, content_hash(options, RendererClass::Triangle, &base.toggled_features()));
}

// ============================================================================
// Runtime and offline agreement
// ============================================================================

fn context() -> anyhow::Result<GraphicsDeviceContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    Ok(GraphicsDeviceContext::new(
        Arc::new(HeadlessApi::new(GpuCaps::default())),
        Arc::new(MemoryProvider::permissive()),
        "Shaders",
    )?)
}

#[test]
fn runtime_and_offline_bindings_agree() -> anyhow::Result<()> {
    let ctx = context()?;
    let renderer = renderer();
    let mut update = RendererCacheInstanceUpdate::build(&ctx, &renderer)?;
    let instance = update.cache_instance(&ctx).expect("instance");
    let cache = instance.cache.as_ref().expect("renderer cache");

    let args = OfflineCompileArgs::from_renderer(&renderer, "Shaders", ctx.caps())?;
    assert_eq!(args.passes.as_slice(), cache.passes());

    for (options, pass) in cache.registered() {
        let offline = args.bindings(options)?;
        assert_eq!(cache.set_roles(options, pass), Some(offline.set_roles.as_slice()), "{options:?}");
        assert_eq!(cache.needed_constants(options, pass), Some(offline.needed), "{options:?}");
    }

    update.release(&ctx);
    Ok(())
}

#[test]
fn runtime_modules_match_offline_files() -> anyhow::Result<()> {
    let renderer = renderer();
    let args = OfflineCompileArgs::from_renderer(&renderer, "Shaders", GpuCaps::default())?;
    let shaders = MaterialShaders::of(&renderer);
    let features = enabled(&renderer);
    let api = GraphicsApi::Headless;

    let files = args.shader_files(api);
    assert!(!files.is_empty());
    for file in &files {
        let program = ShaderProgramKey::graphics("Shaders", &shaders, renderer.class, file.options, &features, file.pass);
        let path = file
            .output_path
            .strip_suffix(api.shader_extension())
            .expect("api extension");
        assert!(
            program.modules.contains(&ShaderModuleKey {
                path: path.to_owned(),
                stage: file.stage,
            }),
            "{}",
            file.permutation
        );
    }
    Ok(())
}

#[test]
fn offline_material_walk_covers_every_combination() -> anyhow::Result<()> {
    let mut args = OfflineCompileArgs::from_material(RendererClass::Billboard, material(), "Shaders", GpuCaps::default())?;
    assert_eq!(args.optional_feature_count(), 3);
    assert_eq!(args.combination_count(), 8);

    let mut seen = Vec::new();
    for combination in 0..args.combination_count() {
        args.set_feature_combination(combination);
        assert_eq!(args.fields, feature_fields(&args.features));
        let hash = content_hash(ShaderOptions::VERTEX_PASS_THROUGH, args.class, &args.features);
        assert!(!seen.contains(&hash));
        seen.push(hash);
        for options in args.shader_options() {
            args.bindings(options)?;
        }
    }
    Ok(())
}

// ============================================================================
// Stubs and compute shaders
// ============================================================================

#[test]
fn rendered_stubs_validate_for_every_stage() -> anyhow::Result<()> {
    let renderer = renderer();
    let features = renderer.toggled_features();
    let options = ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::GEOM_BILLBOARDING;
    let compiled = build_bindings(&BindingInput::new(renderer.class, options, &features, &renderer.fields))?;

    for stage in options.stage_pipeline().stages() {
        let stub = render_stub(&compiled.bindings, *stage, "Fire")?;
        validate_stub(&stub, &compiled.bindings, *stage)?;
    }

    // A stub of another permutation does not validate.
    let other = build_bindings(&BindingInput::new(
        renderer.class,
        ShaderOptions::VERTEX_PASS_THROUGH,
        &features,
        &renderer.fields,
    ))?;
    let stub = render_stub(&other.bindings, ShaderStage::Vertex, "Fire")?;
    assert!(validate_stub(&stub, &compiled.bindings, ShaderStage::Vertex).is_err());
    Ok(())
}

#[test]
fn compute_shader_files_are_stable() -> anyhow::Result<()> {
    for ty in [ComputeShaderType::SortKeys, ComputeShaderType::MeshMatrices] {
        let vulkan = compute_shader_file("Shaders", ty, GraphicsApi::Vulkan)?;
        assert_eq!(vulkan, compute_shader_file("Shaders", ty, GraphicsApi::Vulkan)?);
        assert!(vulkan.starts_with("Shaders/"));
        assert!(vulkan.ends_with(".spv"));
        assert!(vulkan.contains(ty.stem()));
        assert_eq!(ty.bindings()?, ty.bindings()?);
    }
    Ok(())
}

#[test]
fn diffuse_renderer_renders_in_transparent_only() {
    let args = OfflineCompileArgs::from_renderer(&renderer(), "Shaders", GpuCaps::default());
    assert!(args.is_ok_and(|a| a.passes.as_slice() == [ParticlePass::Transparent]));
}
