//! Renderer Cache Instance
//!
//! Binds one renderer's concrete resources (material constants, textures,
//! samplers, atlas, extra geometry) on top of the [`RendererCache`] shared
//! by every renderer with the same permutations.

use std::sync::Arc;

use bitflags::bitflags;

use super::keys::{AtlasKey, AtlasResource, GeometryBuffers, GeometryKey, SamplerKey, TextureKey};
use super::renderer_cache::{RendererCache, RendererCacheKey};
use super::{CacheKey, Handle};
use crate::binding::{MaterialLayout, TextureProperty};
use crate::context::GraphicsDeviceContext;
use crate::errors::{Result, RhiError};
use crate::material::{FeatureNeeds, RendererClass, RendererDescriptor, combined_needs, names};
use crate::rhi::{
    Buffer, BufferDesc, BufferKind, ConstantBinding, ConstantSet, ConstantSetLayout, Sampler,
    SamplerDesc, Texture,
};

// ============================================================================
// Sampler selection
// ============================================================================

/// Lookup textures, always clamped.
const LUT_TEXTURES: [&str; 2] = ["AlphaRemap.AlphaMap", "DiffuseRamp.RampMap"];

/// Scrolled textures, always repeated.
const SCROLLING_TEXTURES: [&str; 4] = [
    "UVDistortions.Distortion1Map",
    "UVDistortions.Distortion2Map",
    "AlphaMasks.Mask1Map",
    "AlphaMasks.Mask2Map",
];

const VERTEX_ANIMATION_MODES: [&str; 3] = [
    "VertexAnimation.Fluid",
    "VertexAnimation.Soft",
    "VertexAnimation.Rigid",
];

/// Sampler of one material texture.
///
/// Trilinear and clamped by default. Textures repeat when the renderer
/// asks for it (except lookup tables) or when they scroll; vertex
/// animation textures are point-sampled.
#[must_use]
pub fn material_sampler(renderer: &RendererDescriptor, texture: &TextureProperty) -> SamplerDesc {
    let mut desc = SamplerDesc {
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        address_mode: [wgpu::AddressMode::ClampToEdge; 3],
        max_mips: 16,
    };

    let is_lut = LUT_TEXTURES.contains(&texture.property.as_str());
    let wants_repeat = renderer.property_bool(names::TEXTURE_CLAMP) == Some(false)
        || renderer.property_bool(names::TEXTURE_REPEAT) == Some(true);
    let mut repeat = (wants_repeat && !is_lut) || SCROLLING_TEXTURES.contains(&texture.property.as_str());

    let vertex_animation = VERTEX_ANIMATION_MODES
        .iter()
        .any(|mode| renderer.property(mode).is_some());
    if vertex_animation && texture.property.contains(names::VERTEX_ANIMATION) {
        desc.mag_filter = wgpu::FilterMode::Nearest;
        desc.min_filter = wgpu::FilterMode::Nearest;
        desc.mipmap_filter = wgpu::FilterMode::Nearest;
        repeat = true;
    }

    if repeat {
        desc.address_mode = [wgpu::AddressMode::Repeat; 3];
    }
    desc
}

// ============================================================================
// Key
// ============================================================================

/// Identity of one renderer's bound resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RendererCacheInstanceKey {
    pub cache: Option<Handle<RendererCacheKey>>,
    /// `None` for textures the renderer leaves unset; they bind the
    /// default white texture.
    pub textures: Vec<Option<Handle<TextureKey>>>,
    pub samplers: Vec<Handle<SamplerKey>>,
    /// The renderer draws extra geometry (mesh, light sphere, decal box).
    pub wants_geometry: bool,
    pub geometry: Option<Handle<GeometryKey>>,
    pub atlas: Option<Handle<AtlasKey>>,
    pub has_atlas: bool,
    pub has_raw_uv0: bool,
    /// Digest of the material constant values.
    pub content_hash: u64,
    pub layout: ConstantSetLayout,
}

/// Prepared data of an instance key.
#[derive(Debug)]
pub struct InstanceDeps {
    pub textures: Vec<TextureProperty>,
    /// Packed material constants.
    pub constants: Vec<u8>,
}

/// Path of the renderer's atlas definition, or of its procedural grid.
fn atlas_key(renderer: &RendererDescriptor) -> AtlasKey {
    const ATLAS_SOURCE_EXTERNAL: i32 = 0;
    let source = renderer
        .property_int(names::ATLAS_SOURCE)
        .unwrap_or(ATLAS_SOURCE_EXTERNAL);
    if source == ATLAS_SOURCE_EXTERNAL {
        AtlasKey::new(renderer.property_path(names::ATLAS_DEFINITION).unwrap_or_default())
    } else {
        let [x, y] = match renderer.property(names::ATLAS_SUBDIV) {
            Some(crate::material::PropertyValue::Int2(v)) => *v,
            _ => [0, 0],
        };
        AtlasKey::procedural(x.max(0) as u32, y.max(0) as u32)
    }
}

impl RendererCacheInstanceKey {
    fn release_acquired(&self, ctx: &GraphicsDeviceContext) {
        if let Some(cache) = self.cache {
            ctx.renderer_caches.release(ctx, cache);
        }
        for texture in self.textures.iter().flatten() {
            ctx.textures.release(ctx, *texture);
        }
        for &sampler in &self.samplers {
            ctx.samplers.release(ctx, sampler);
        }
        if let Some(geometry) = self.geometry {
            ctx.geometries.release(ctx, geometry);
        }
        if let Some(atlas) = self.atlas {
            ctx.atlases.release(ctx, atlas);
        }
    }

    fn acquire_all(&mut self, ctx: &GraphicsDeviceContext, renderer: &RendererDescriptor) -> Result<InstanceDeps> {
        let toggles = renderer.toggled_features();
        let material = MaterialLayout::build(&toggles, |path| renderer.property(path));
        self.layout = material.layout;
        self.content_hash = material.content_hash;

        self.cache = Some(ctx.renderer_caches.acquire(ctx, RendererCacheKey::default(), renderer)?);

        for texture in &material.textures {
            let handle = if texture.path.is_empty() {
                log::debug!("'{}' has no texture, binding the default", texture.property);
                None
            } else {
                ctx.textures
                    .acquire(ctx, TextureKey::new(texture.path.clone(), texture.srgb), ())
                    .ok()
            };
            self.textures.push(handle);

            let sampler = material_sampler(renderer, texture);
            self.samplers
                .push(ctx.samplers.acquire(ctx, SamplerKey { desc: sampler }, ())?);
        }

        let class = renderer.class;
        self.has_atlas = renderer.has_feature(names::ATLAS);
        self.has_raw_uv0 = self.has_atlas
            && matches!(class, RendererClass::Billboard | RendererClass::Ribbon)
            && (renderer.has_feature(names::ALPHA_MASKS) || renderer.has_feature(names::UV_DISTORTIONS));

        if self.has_atlas
            && matches!(
                class,
                RendererClass::Billboard | RendererClass::Ribbon | RendererClass::Decal | RendererClass::Mesh
            )
        {
            self.atlas = ctx.atlases.acquire(ctx, atlas_key(renderer), ()).ok();
        }

        let geometry = match class {
            RendererClass::Mesh => Some(GeometryKey::Mesh(
                renderer.property_path(names::MESH).unwrap_or_default().to_owned(),
            )),
            RendererClass::Light => Some(GeometryKey::Sphere),
            RendererClass::Decal => Some(GeometryKey::Cube),
            _ => None,
        };
        if let Some(geometry) = geometry {
            self.wants_geometry = true;
            self.geometry = ctx.geometries.acquire(ctx, geometry, ()).ok();
        }

        Ok(InstanceDeps {
            textures: material.textures,
            constants: material.constants,
        })
    }
}

impl CacheKey for RendererCacheInstanceKey {
    type Resource = RendererCacheInstance;
    type Deps = InstanceDeps;
    type Args<'a> = &'a RendererDescriptor;
    const KIND: &'static str = "renderer cache instance";

    fn label(&self) -> String {
        format!("{:016x}", self.content_hash)
    }

    fn prepare(&mut self, ctx: &GraphicsDeviceContext, renderer: &RendererDescriptor) -> Result<InstanceDeps> {
        if renderer.class == RendererClass::Sound {
            return Err(RhiError::UnsupportedRenderer(renderer.class.name()));
        }
        *self = Self::default();
        self.acquire_all(ctx, renderer).inspect_err(|_| {
            self.release_acquired(ctx);
            *self = Self::default();
        })
    }

    fn create(&self, deps: &InstanceDeps, ctx: &GraphicsDeviceContext) -> Result<Arc<RendererCacheInstance>> {
        let mut cache = match self.cache {
            Some(handle) => Some(
                ctx.renderer_caches
                    .resolve(ctx, handle)
                    .ok_or_else(|| RhiError::NotReady("renderer cache".into()))?,
            ),
            None => None,
        };

        let textures: Vec<Arc<Texture>> = self
            .textures
            .iter()
            .zip(&deps.textures)
            .map(|(handle, property)| {
                handle
                    .and_then(|h| ctx.textures.resolve(ctx, h))
                    .unwrap_or_else(|| {
                        if !property.path.is_empty() {
                            log::error!("Could not create texture '{}', using the default", property.path);
                        }
                        Arc::clone(&ctx.defaults().white)
                    })
            })
            .collect();

        let samplers = self
            .samplers
            .iter()
            .map(|&h| {
                ctx.samplers
                    .resolve(ctx, h)
                    .ok_or_else(|| RhiError::creation("sampler", "Material Sampler", "not created"))
            })
            .collect::<Result<Vec<Arc<Sampler>>>>()?;

        let (constant_set, constant_buffer) = if self.layout.is_empty() {
            (None, None)
        } else {
            let buffer = if deps.constants.is_empty() {
                None
            } else {
                let buffer = ctx.api().create_buffer(&BufferDesc::new(
                    "Material Constant Values Buffer",
                    BufferKind::Constant,
                    deps.constants.len() as u64,
                ))?;
                ctx.api().map_write(&buffer, 0, &deps.constants)?;
                Some(buffer)
            };

            let mut bindings: Vec<ConstantBinding> = textures
                .iter()
                .zip(&samplers)
                .map(|(t, s)| ConstantBinding::Texture(Arc::clone(t), Arc::clone(s)))
                .collect();
            bindings.extend(buffer.iter().map(|b| ConstantBinding::Buffer(Arc::clone(b))));
            let set = ctx
                .api()
                .create_constant_set("Material Constant Set", &self.layout, bindings)?;
            (Some(set), buffer)
        };

        let geometry = if self.wants_geometry {
            match self.geometry.and_then(|h| ctx.geometries.resolve(ctx, h)) {
                Some(geometry) => Some(geometry),
                None => {
                    log::error!("Could not create the geometry of the renderer, it will not be drawn");
                    cache = None;
                    Some(Arc::clone(&ctx.defaults().geometry))
                }
            }
        } else {
            None
        };

        let atlas = self.atlas.and_then(|h| ctx.atlases.resolve(ctx, h));

        Ok(Arc::new(RendererCacheInstance {
            cache,
            constant_set,
            constant_buffer,
            textures,
            samplers,
            geometry,
            atlas,
            has_atlas: self.has_atlas,
            has_raw_uv0: self.has_raw_uv0,
        }))
    }

    fn release_dependencies(&self, _deps: &InstanceDeps, ctx: &GraphicsDeviceContext) {
        self.release_acquired(ctx);
    }
}

// ============================================================================
// Resource
// ============================================================================

/// One renderer's resources, bound by the dispatcher next to the shared cache.
#[derive(Debug)]
pub struct RendererCacheInstance {
    /// `None` when the renderer must not be drawn (its geometry failed).
    pub cache: Option<Arc<RendererCache>>,
    /// Material set: samplers first, constant buffer last.
    pub constant_set: Option<Arc<ConstantSet>>,
    pub constant_buffer: Option<Arc<Buffer>>,
    pub textures: Vec<Arc<Texture>>,
    pub samplers: Vec<Arc<Sampler>>,
    pub geometry: Option<Arc<GeometryBuffers>>,
    pub atlas: Option<Arc<AtlasResource>>,
    pub has_atlas: bool,
    pub has_raw_uv0: bool,
}

// ============================================================================
// Update side
// ============================================================================

bitflags! {
    /// Per-renderer switches read by the billboarding and sorting code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RendererFlags: u32 {
        const HAS_UV              = 1 << 0;
        const HAS_NORMAL          = 1 << 1;
        const HAS_TANGENT         = 1 << 2;
        const FLIP_U              = 1 << 3;
        const FLIP_V              = 1 << 4;
        const ROTATE_TEXTURE      = 1 << 5;
        const HAS_ATLAS_BLENDING  = 1 << 6;
        const HAS_RAW_UV0         = 1 << 7;
        const CORRECT_DEFORMATION = 1 << 8;
        const NEEDS_SORT          = 1 << 9;
        const SLICABLE            = 1 << 10;
        const CAST_SHADOWS        = 1 << 11;
    }
}

impl RendererFlags {
    /// Flags derived from a renderer's enabled features and property values.
    #[must_use]
    pub fn from_renderer(renderer: &RendererDescriptor) -> Self {
        let mut flags = Self::empty();
        let on = |name: &str| renderer.property_bool(name).unwrap_or(false);

        let cast_shadows = names::CAST_SHADOWS_FEATURES.iter().any(|feature| {
            renderer.has_feature(feature) && on(&format!("{feature}.{}", names::CAST_SHADOWS))
        });
        flags.set(Self::CAST_SHADOWS, cast_shadows);

        if on(names::TEXTURE_UVS) {
            flags.set(Self::FLIP_U, on(names::TEXTURE_UVS_FLIP_U));
            flags.set(Self::FLIP_V, on(names::TEXTURE_UVS_FLIP_V));
            flags.set(Self::ROTATE_TEXTURE, on(names::TEXTURE_UVS_ROTATE));
        }
        if on(names::FLIP_UVS) {
            flags.remove(Self::FLIP_U);
            flags.insert(Self::FLIP_V);
        }
        if on(names::BASIC_TRANSFORM_UVS) {
            flags.set(Self::FLIP_U, on(names::BASIC_TRANSFORM_UVS_FLIP_U));
            flags.set(Self::FLIP_V, on(names::BASIC_TRANSFORM_UVS_FLIP_V));
            flags.set(Self::ROTATE_TEXTURE, on(names::BASIC_TRANSFORM_UVS_ROTATE));
        }

        let has_atlas = on(names::ATLAS);
        if has_atlas && (on(names::UV_DISTORTIONS) || on(names::ALPHA_MASKS)) {
            flags.insert(Self::HAS_RAW_UV0);
        }
        if has_atlas && renderer.property_int(names::ATLAS_BLENDING).unwrap_or(0) >= 1 {
            flags.insert(Self::HAS_ATLAS_BLENDING);
        }

        let toggles = renderer.toggled_features();
        let needs = combined_needs(&toggles);
        flags.set(Self::HAS_UV, needs.contains(FeatureNeeds::UV));
        flags.set(Self::HAS_NORMAL, needs.contains(FeatureNeeds::NORMAL));
        flags.set(Self::HAS_TANGENT, needs.contains(FeatureNeeds::TANGENT));
        flags.set(
            Self::CORRECT_DEFORMATION,
            toggles
                .iter()
                .any(|t| t.enabled && t.name() == names::CORRECT_DEFORMATION),
        );

        let transparent = renderer.property(names::TRANSPARENT).is_some();
        let transparent_type = renderer.property_int(names::TRANSPARENT_TYPE);
        let diffuse = on(names::DIFFUSE);
        let needs_sort = transparent_type.is_some_and(|t| t >= 2)
            || (on(names::DISTORTION) && diffuse)
            || (transparent_type.is_none() && transparent && diffuse);
        flags.set(Self::NEEDS_SORT, needs_sort);
        flags.set(Self::SLICABLE, transparent);
        flags
    }
}

/// Update-side owner of one renderer's cache instance.
///
/// Must be handed back through [`release`](Self::release); the context is
/// not reachable from a destructor.
#[derive(Debug)]
pub struct RendererCacheInstanceUpdate {
    pub flags: RendererFlags,
    pub class: RendererClass,
    instance: Option<Handle<RendererCacheInstanceKey>>,
    last_resolve_succeeded: bool,
}

impl RendererCacheInstanceUpdate {
    /// Prepares the instance and everything it depends on.
    pub fn build(ctx: &GraphicsDeviceContext, renderer: &RendererDescriptor) -> Result<Self> {
        let instance = ctx
            .renderer_cache_instances
            .acquire(ctx, RendererCacheInstanceKey::default(), renderer)?;
        Ok(Self {
            flags: RendererFlags::from_renderer(renderer),
            class: renderer.class,
            instance: Some(instance),
            last_resolve_succeeded: true,
        })
    }

    #[must_use]
    pub fn handle(&self) -> Option<Handle<RendererCacheInstanceKey>> {
        self.instance
    }

    #[must_use]
    pub fn cast_shadows(&self) -> bool {
        self.flags.contains(RendererFlags::CAST_SHADOWS)
    }

    /// Render-side instance. Warns once per failure streak.
    pub fn cache_instance(&mut self, ctx: &GraphicsDeviceContext) -> Option<Arc<RendererCacheInstance>> {
        let resolved = self
            .instance
            .and_then(|h| ctx.renderer_cache_instances.resolve(ctx, h));
        if resolved.is_some() {
            self.last_resolve_succeeded = true;
        } else if self.last_resolve_succeeded {
            log::warn!(
                "The renderer cache instance could not be resolved: it might not be created yet or its creation has failed"
            );
            self.last_resolve_succeeded = false;
        }
        resolved
    }

    /// Drops the instance reference.
    pub fn release(&mut self, ctx: &GraphicsDeviceContext) {
        if let Some(handle) = self.instance.take() {
            ctx.renderer_cache_instances.release(ctx, handle);
        }
    }
}
