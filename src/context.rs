//! Graphics Device Context
//!
//! Everything tied to the lifetime of one graphics device: the device and
//! resource provider, every resource cache, the particle pass table
//! published by the render graph, and the default resources draws fall back
//! on. Created once by the application root and passed by reference.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::binding::ParticlePass;
use crate::binding::layout::{
    LightingLayouts, atlas_layout, depth_sampler_layout, diffuse_sampler_layout, dithering_layout,
    normal_rough_metal_sampler_layout, scene_info_layout,
};
use crate::cache::keys::{AtlasResource, GeometryBuffers, procedural_cube};
use crate::cache::{
    AtlasKey, ComputeStateKey, GeometryKey, RendererCacheInstanceKey, RendererCacheKey,
    RenderStateKey, ResourceManager, SamplerKey, ShaderModuleKey, ShaderProgramKey, TextureKey,
};
use crate::errors::Result;
use crate::rhi::{
    ConstantSetLayout, GpuCaps, RenderApi, RenderPass, ResourceProvider, Sampler, SamplerDesc,
    Texture, TextureDesc,
};

/// Where a particle pass renders: a baked render pass and one of its sub-passes.
#[derive(Debug, Clone)]
pub struct PassDescription {
    pub pass: ParticlePass,
    pub render_pass: Arc<RenderPass>,
    pub sub_pass: u32,
}

impl PassDescription {
    /// Color formats the pass writes.
    #[must_use]
    pub fn output_formats(&self) -> Vec<wgpu::TextureFormat> {
        self.render_pass.output_formats(self.sub_pass)
    }
}

/// Constant-set layouts shared by every renderer.
#[derive(Debug, Clone)]
pub struct SharedLayouts {
    pub scene_info: ConstantSetLayout,
    pub depth: ConstantSetLayout,
    pub normal_rough_metal: ConstantSetLayout,
    pub diffuse: ConstantSetLayout,
    pub atlas: ConstantSetLayout,
    pub dithering: ConstantSetLayout,
    pub lighting: LightingLayouts,
}

impl SharedLayouts {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scene_info: scene_info_layout(),
            depth: depth_sampler_layout(),
            normal_rough_metal: normal_rough_metal_sampler_layout(),
            diffuse: diffuse_sampler_layout(),
            atlas: atlas_layout(),
            dithering: dithering_layout(),
            lighting: LightingLayouts::new(),
        }
    }
}

impl Default for SharedLayouts {
    fn default() -> Self {
        Self::new()
    }
}

/// Side of the BRDF lookup table.
pub const BRDF_LUT_SIZE: u32 = 64;

/// Placeholder resources bound when the real ones are missing.
#[derive(Debug)]
pub struct DefaultResources {
    pub white: Arc<Texture>,
    pub black: Arc<Texture>,
    /// Flat tangent-space normal.
    pub normal: Arc<Texture>,
    pub linear_sampler: Arc<Sampler>,
    pub nearest_sampler: Arc<Sampler>,
    /// Single full-texture rect.
    pub atlas: Arc<AtlasResource>,
    /// Unit cube, substituted for geometry that failed to load.
    pub geometry: Arc<GeometryBuffers>,
    pub brdf_lut: Arc<Texture>,
}

impl DefaultResources {
    fn create(api: &dyn RenderApi, layouts: &SharedLayouts) -> Result<Self> {
        let pixel = |name: &str, rgba: [u8; 4]| {
            api.create_texture(
                &TextureDesc {
                    name: name.to_owned(),
                    size: [1, 1],
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    srgb: false,
                    mip_count: 1,
                },
                &rgba,
            )
        };

        Ok(Self {
            white: pixel("Dummy White", [255; 4])?,
            black: pixel("Dummy Black", [0, 0, 0, 255])?,
            normal: pixel("Dummy Normal", [128, 128, 255, 255])?,
            linear_sampler: api.create_sampler("Default Linear Sampler", &SamplerDesc::LINEAR_REPEAT)?,
            nearest_sampler: api.create_sampler("Default Nearest Sampler", &SamplerDesc::NEAREST_CLAMP)?,
            atlas: Arc::new(AtlasResource::upload(api, &layouts.atlas, &[[1.0, 1.0, 0.0, 0.0]])?),
            geometry: Arc::new(GeometryBuffers::upload(api, "Default Geometry", &procedural_cube())?),
            brdf_lut: api.create_texture(
                &TextureDesc {
                    name: "BRDF LUT".to_owned(),
                    size: [BRDF_LUT_SIZE; 2],
                    format: wgpu::TextureFormat::Rg16Float,
                    srgb: false,
                    mip_count: 1,
                },
                &brdf_lut_pixels(BRDF_LUT_SIZE),
            )?,
        })
    }
}

/// Split-sum environment BRDF, analytic fit over (N.V, roughness).
fn brdf_lut_pixels(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        let roughness = (y as f32 + 0.5) / size as f32;
        for x in 0..size {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            let c0 = [-1.0, -0.0275, -0.572, 0.022];
            let c1 = [1.0, 0.0425, 1.04, -0.04];
            let r = [
                roughness * c0[0] + c1[0],
                roughness * c0[1] + c1[1],
                roughness * c0[2] + c1[2],
                roughness * c0[3] + c1[3],
            ];
            let a004 = (r[0] * r[0]).min((-9.28 * n_dot_v).exp2()) * r[0] + r[1];
            let scale = a004 * -1.04 + r[2];
            let bias = a004 * 1.04 + r[3];
            pixels.extend_from_slice(&half::f16::from_f32(scale).to_le_bytes());
            pixels.extend_from_slice(&half::f16::from_f32(bias).to_le_bytes());
        }
    }
    pixels
}

/// Device-lifetime state shared by every component of the particle renderer.
pub struct GraphicsDeviceContext {
    api: Arc<dyn RenderApi>,
    provider: Arc<dyn ResourceProvider>,
    caps: GpuCaps,
    shader_root: String,
    passes: RwLock<[Option<PassDescription>; ParticlePass::COUNT]>,
    defaults: DefaultResources,
    layouts: SharedLayouts,

    pub textures: ResourceManager<TextureKey>,
    pub samplers: ResourceManager<SamplerKey>,
    pub shader_modules: ResourceManager<ShaderModuleKey>,
    pub shader_programs: ResourceManager<ShaderProgramKey>,
    pub render_states: ResourceManager<RenderStateKey>,
    pub compute_states: ResourceManager<ComputeStateKey>,
    pub geometries: ResourceManager<GeometryKey>,
    pub atlases: ResourceManager<AtlasKey>,
    pub renderer_caches: ResourceManager<RendererCacheKey>,
    pub renderer_cache_instances: ResourceManager<RendererCacheInstanceKey>,
}

impl GraphicsDeviceContext {
    /// Creates the default resources on `api`; fails if any of them fails.
    pub fn new(
        api: Arc<dyn RenderApi>,
        provider: Arc<dyn ResourceProvider>,
        shader_root: impl Into<String>,
    ) -> Result<Self> {
        let caps = api.caps();
        let layouts = SharedLayouts::new();
        let defaults = DefaultResources::create(api.as_ref(), &layouts)?;
        let shader_root = shader_root.into();
        log::info!("Particle device context on {:?}, shaders in '{shader_root}'", caps.graphics_api);

        Ok(Self {
            api,
            provider,
            caps,
            shader_root,
            passes: RwLock::new(std::array::from_fn(|_| None)),
            defaults,
            layouts,
            textures: ResourceManager::new(),
            samplers: ResourceManager::new(),
            shader_modules: ResourceManager::new(),
            shader_programs: ResourceManager::new(),
            render_states: ResourceManager::new(),
            compute_states: ResourceManager::new(),
            geometries: ResourceManager::new(),
            atlases: ResourceManager::new(),
            renderer_caches: ResourceManager::new(),
            renderer_cache_instances: ResourceManager::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn api(&self) -> &dyn RenderApi {
        self.api.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn provider(&self) -> &dyn ResourceProvider {
        self.provider.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn caps(&self) -> GpuCaps {
        self.caps
    }

    #[inline]
    #[must_use]
    pub fn shader_root(&self) -> &str {
        &self.shader_root
    }

    #[inline]
    #[must_use]
    pub fn defaults(&self) -> &DefaultResources {
        &self.defaults
    }

    #[inline]
    #[must_use]
    pub fn layouts(&self) -> &SharedLayouts {
        &self.layouts
    }

    /// `None` while the pass is disabled or the graph is not built.
    #[must_use]
    pub fn pass_description(&self, pass: ParticlePass) -> Option<PassDescription> {
        self.passes.read()[pass.index()].clone()
    }

    /// Replaces the whole pass table. Render states baked against the
    /// previous table are dropped and rebuilt lazily.
    pub fn set_pass_descriptions(&self, descriptions: Vec<PassDescription>) {
        {
            let mut table = self.passes.write();
            *table = std::array::from_fn(|_| None);
            for description in descriptions {
                let index = description.pass.index();
                table[index] = Some(description);
            }
        }
        self.invalidate_render_states();
    }

    pub fn clear_pass_descriptions(&self) {
        *self.passes.write() = std::array::from_fn(|_| None);
        self.invalidate_render_states();
    }

    /// Drops every baked render state, keeping the cache entries.
    pub fn invalidate_render_states(&self) {
        self.render_states.clear_gpu_resources();
        for handle in self.renderer_caches.handles() {
            if let Some(cache) = self.renderer_caches.resource(handle) {
                cache.reset_render_states();
            }
        }
    }
}
