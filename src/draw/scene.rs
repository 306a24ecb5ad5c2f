//! Scene Constants
//!
//! Per-frame camera constants ([`SceneInfo`]), the backdrop the particles
//! are lit by ([`BackdropInfo`]) and the constant sets built from them.
//! Every set here is shared by all draws of a frame.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::binding::layout::scene_info_buffer;
use crate::context::GraphicsDeviceContext;
use crate::errors::Result;
use crate::graph::{SHADOW_CASCADE_COUNT, ShadowOptions, ShadowPass};
use crate::rhi::{
    Buffer, BufferDesc, BufferKind, ConstantBinding, ConstantSet, ConstantSetLayout, RenderApi, Texture, TextureDesc,
};

// ============================================================================
// Scene info
// ============================================================================

/// Camera constants, laid out as the `SceneInfo` buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneInfo {
    pub view_proj: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
    pub inv_view: Mat4,
    pub inv_view_proj: Mat4,
    pub user_to_lhz: Mat4,
    pub lhz_to_user: Mat4,
    pub billboarding_view: Mat4,
    pub pack_normal_view: Mat4,
    pub unpack_normal_view: Mat4,
    pub side_vector: Vec4,
    pub depth_vector: Vec4,
    /// Near and far planes.
    pub z_buffer_limits: Vec2,
    pub viewport_size: Vec2,
    /// `1.0` right-handed, `-1.0` left-handed.
    pub handedness: f32,
}

impl Default for SceneInfo {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            user_to_lhz: Mat4::IDENTITY,
            lhz_to_user: Mat4::IDENTITY,
            billboarding_view: Mat4::IDENTITY,
            pack_normal_view: Mat4::IDENTITY,
            unpack_normal_view: Mat4::IDENTITY,
            side_vector: Vec4::X,
            depth_vector: Vec4::NEG_Z,
            z_buffer_limits: Vec2::new(0.1, 1000.0),
            viewport_size: Vec2::ONE,
            handedness: 1.0,
        }
    }
}

impl SceneInfo {
    /// Derives every matrix from a right-handed camera.
    #[must_use]
    pub fn from_camera(view: Mat4, proj: Mat4, z_limits: Vec2, viewport: Vec2) -> Self {
        let inv_view = view.inverse();
        let view_proj = proj * view;
        Self {
            view_proj,
            view,
            proj,
            inv_view,
            inv_view_proj: view_proj.inverse(),
            billboarding_view: inv_view,
            pack_normal_view: view,
            unpack_normal_view: inv_view,
            side_vector: inv_view.x_axis,
            depth_vector: -inv_view.z_axis,
            z_buffer_limits: z_limits,
            viewport_size: viewport,
            ..Self::default()
        }
    }

    /// Packed bytes in `SceneInfo` field order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(scene_info_buffer().size() as usize);
        for m in [
            self.view_proj,
            self.view,
            self.proj,
            self.inv_view,
            self.inv_view_proj,
            self.user_to_lhz,
            self.lhz_to_user,
            self.billboarding_view,
            self.pack_normal_view,
            self.unpack_normal_view,
        ] {
            bytes.extend_from_slice(bytemuck::cast_slice(&m.to_cols_array()));
        }
        bytes.extend_from_slice(bytemuck::cast_slice(&self.side_vector.to_array()));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.depth_vector.to_array()));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.z_buffer_limits.to_array()));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.viewport_size.to_array()));
        bytes.extend_from_slice(&self.handedness.to_le_bytes());
        bytes
    }
}

// ============================================================================
// Backdrop
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    /// Cosine of the cone half angle.
    pub cone_angle: f32,
    pub angle_falloff: f32,
    pub color: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
}

/// Lights and environment of the scene behind the particles.
#[derive(Debug, Clone, PartialEq)]
pub struct BackdropInfo {
    pub ambient: Vec3,
    pub directional_lights: Vec<DirectionalLight>,
    pub spot_lights: Vec<SpotLight>,
    pub point_lights: Vec<PointLight>,
    pub environment_rotation: Mat4,
    /// World-to-shadow matrix of each cascade.
    pub cascade_world_to_shadow: [Mat4; SHADOW_CASCADE_COUNT],
    /// Far plane of each cascade.
    pub cascade_ranges: Vec4,
    pub cascade_aspect_ratios: [Vec2; SHADOW_CASCADE_COUNT],
}

impl Default for BackdropInfo {
    fn default() -> Self {
        Self {
            ambient: Vec3::ZERO,
            directional_lights: Vec::new(),
            spot_lights: Vec::new(),
            point_lights: Vec::new(),
            environment_rotation: Mat4::IDENTITY,
            cascade_world_to_shadow: [Mat4::IDENTITY; SHADOW_CASCADE_COUNT],
            cascade_ranges: Vec4::ZERO,
            cascade_aspect_ratios: [Vec2::ONE; SHADOW_CASCADE_COUNT],
        }
    }
}

fn push_vec3(bytes: &mut Vec<u8>, v: Vec3, w: f32) {
    bytes.extend_from_slice(bytemuck::cast_slice(&v.extend(w).to_array()));
}

impl BackdropInfo {
    /// `LightInfo` buffer contents.
    fn light_info_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(24);
        for count in [self.directional_lights.len(), self.spot_lights.len(), self.point_lights.len()] {
            bytes.extend_from_slice(&(count as i32).to_le_bytes());
        }
        bytes.extend_from_slice(bytemuck::cast_slice(&self.ambient.to_array()));
        bytes
    }

    fn directional_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for light in &self.directional_lights {
            push_vec3(&mut bytes, light.direction, 0.0);
            push_vec3(&mut bytes, light.color, 1.0);
        }
        bytes
    }

    fn spot_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for light in &self.spot_lights {
            push_vec3(&mut bytes, light.position, light.cone_angle);
            push_vec3(&mut bytes, light.direction, light.angle_falloff);
            push_vec3(&mut bytes, light.color, 1.0);
        }
        bytes
    }

    fn point_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for light in &self.point_lights {
            push_vec3(&mut bytes, light.position, 1.0);
            push_vec3(&mut bytes, light.color, 1.0);
        }
        bytes
    }

    /// `ShadowsInfo` buffer contents.
    fn shadows_bytes(&self, options: Option<&ShadowOptions>) -> Vec<u8> {
        let mut bytes = Vec::new();
        for m in &self.cascade_world_to_shadow {
            bytes.extend_from_slice(bytemuck::cast_slice(&m.to_cols_array()));
        }
        bytes.extend_from_slice(bytemuck::cast_slice(&self.cascade_ranges.to_array()));
        for ratio in &self.cascade_aspect_ratios {
            bytes.extend_from_slice(bytemuck::cast_slice(&ratio.to_array()));
        }
        let (constants, flags) = options.map_or((Vec4::ZERO, 0_i32), |o| {
            let flags = 1 | (i32::from(o.variance) << 1) | (i32::from(o.debug) << 2);
            (Vec4::new(o.bias, o.exponent, 0.0, 0.0), flags)
        });
        bytes.extend_from_slice(bytemuck::cast_slice(&constants.to_array()));
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes
    }
}

// ============================================================================
// Scene resources
// ============================================================================

const DITHERING_SIZE: u32 = 8;

/// Ordered 8x8 Bayer matrix scaled to `u8`.
fn bayer_pixels() -> Vec<u8> {
    let mut pixels = Vec::with_capacity((DITHERING_SIZE * DITHERING_SIZE) as usize);
    for y in 0..DITHERING_SIZE {
        for x in 0..DITHERING_SIZE {
            let xy = x ^ y;
            let mut value = 0;
            for bit in 0..3 {
                value |= ((xy >> bit) & 1) << (5 - 2 * bit);
                value |= ((y >> bit) & 1) << (4 - 2 * bit);
            }
            pixels.push((value * 4) as u8);
        }
    }
    pixels
}

fn buffer(api: &dyn RenderApi, name: &str, kind: BufferKind, size: usize) -> Result<Arc<Buffer>> {
    api.create_buffer(&BufferDesc::new(name, kind, size.max(16) as u64))
}

/// Writes `bytes` into `buffer`, recreating it when it is too small.
fn write_or_grow(api: &dyn RenderApi, buffer: &mut Arc<Buffer>, bytes: &[u8]) -> Result<bool> {
    let grown = bytes.len() as u64 > buffer.size;
    if grown {
        *buffer = api.create_buffer(&BufferDesc::new(buffer.name.clone(), buffer.kind, bytes.len() as u64))?;
    }
    if !bytes.is_empty() {
        api.map_write(buffer.as_ref(), 0, bytes)?;
    }
    Ok(grown)
}

/// Constant sets shared by every draw of the scene.
#[derive(Debug)]
pub struct SceneResources {
    scene_info_buffer: Arc<Buffer>,
    pub scene_info: Arc<ConstantSet>,

    light_info_buffer: Arc<Buffer>,
    light_buffers: [Arc<Buffer>; 3],
    pub light_info: Arc<ConstantSet>,
    shadows_info_buffer: Arc<Buffer>,
    shadow_maps: Vec<ConstantBinding>,
    pub shadows_info: Arc<ConstantSet>,
    /// Bound while rendering the shadow maps themselves.
    pub dummy_shadows_info: Arc<ConstantSet>,
    pub brdf_lut: Arc<ConstantSet>,
    environment_buffer: Arc<Buffer>,
    pub environment_map: Arc<ConstantSet>,
    pub dithering: Arc<ConstantSet>,

    /// Stand-ins for the GBuffer samplers when there is no GBuffer.
    pub dummy_depth: Arc<ConstantSet>,
    pub dummy_normal_rough_metal: Arc<ConstantSet>,
    pub dummy_diffuse: Arc<ConstantSet>,
}

impl SceneResources {
    pub fn create(ctx: &GraphicsDeviceContext) -> Result<Self> {
        let api = ctx.api();
        let layouts = ctx.layouts();
        let defaults = ctx.defaults();
        let linear = &defaults.linear_sampler;
        let texture = |t: &Arc<Texture>| ConstantBinding::Texture(t.clone(), linear.clone());

        let scene_info_buffer = buffer(api, "Scene Info Buffer", BufferKind::Constant, scene_info_buffer().size() as usize)?;
        api.map_write(&scene_info_buffer, 0, &SceneInfo::default().to_bytes())?;
        let scene_info = api.create_constant_set(
            "Scene Info Constant Set",
            &layouts.scene_info,
            vec![ConstantBinding::Buffer(scene_info_buffer.clone())],
        )?;

        let backdrop = BackdropInfo::default();
        let light_info_buffer = buffer(api, "Light Info Buffer", BufferKind::Constant, 24)?;
        api.map_write(&light_info_buffer, 0, &backdrop.light_info_bytes())?;
        let light_buffers = [
            buffer(api, "Directional Lights Buffer", BufferKind::Raw, 0)?,
            buffer(api, "Spot Lights Buffer", BufferKind::Raw, 0)?,
            buffer(api, "Point Lights Buffer", BufferKind::Raw, 0)?,
        ];
        let light_info = Self::light_set(api, ctx, &light_info_buffer, &light_buffers)?;

        let shadows_bytes = backdrop.shadows_bytes(None);
        let shadows_info_buffer = buffer(api, "Shadows Info Buffer", BufferKind::Constant, shadows_bytes.len())?;
        api.map_write(&shadows_info_buffer, 0, &shadows_bytes)?;
        let shadow_maps = vec![texture(&defaults.white); SHADOW_CASCADE_COUNT];
        let shadows_info = Self::shadows_set(api, ctx, "Shadows Info Constant Set", &shadows_info_buffer, &shadow_maps)?;
        let dummy_shadows_info =
            Self::shadows_set(api, ctx, "Dummy Shadows Info Constant Set", &shadows_info_buffer, &shadow_maps)?;

        let brdf_lut = api.create_constant_set(
            "BRDF LUT Constant Set",
            &layouts.lighting.brdf_lut,
            vec![texture(&defaults.brdf_lut)],
        )?;

        let environment_buffer = buffer(api, "Environment Map Info Buffer", BufferKind::Constant, 64)?;
        api.map_write(&environment_buffer, 0, bytemuck::cast_slice(&Mat4::IDENTITY.to_cols_array()))?;
        let environment_map = api.create_constant_set(
            "Environment Map Constant Set",
            &layouts.lighting.environment_map,
            vec![texture(&defaults.white), ConstantBinding::Buffer(environment_buffer.clone())],
        )?;

        let dithering_texture = api.create_texture(
            &TextureDesc {
                name: "Dithering Patterns".to_owned(),
                size: [DITHERING_SIZE; 2],
                format: wgpu::TextureFormat::R8Unorm,
                srgb: false,
                mip_count: 1,
            },
            &bayer_pixels(),
        )?;
        let dithering = api.create_constant_set(
            "Dithering Constant Set",
            &layouts.dithering,
            vec![ConstantBinding::Texture(dithering_texture, defaults.nearest_sampler.clone())],
        )?;

        let dummy = |name: &str, layout: &ConstantSetLayout, t: &Arc<Texture>| {
            api.create_constant_set(name, layout, vec![ConstantBinding::Texture(t.clone(), defaults.nearest_sampler.clone())])
        };

        Ok(Self {
            scene_info_buffer,
            scene_info,
            light_info_buffer,
            light_buffers,
            light_info,
            shadows_info_buffer,
            shadow_maps,
            shadows_info,
            dummy_shadows_info,
            brdf_lut,
            environment_buffer,
            environment_map,
            dithering,
            dummy_depth: dummy("Dummy Depth Constant Set", &layouts.depth, &defaults.white)?,
            dummy_normal_rough_metal: dummy(
                "Dummy NormalRoughMetal Constant Set",
                &layouts.normal_rough_metal,
                &defaults.black,
            )?,
            dummy_diffuse: dummy("Dummy Diffuse Constant Set", &layouts.diffuse, &defaults.black)?,
        })
    }

    fn light_set(
        api: &dyn RenderApi,
        ctx: &GraphicsDeviceContext,
        info: &Arc<Buffer>,
        lights: &[Arc<Buffer>; 3],
    ) -> Result<Arc<ConstantSet>> {
        let mut bindings = vec![ConstantBinding::Buffer(info.clone())];
        bindings.extend(lights.iter().map(|b| ConstantBinding::Buffer(b.clone())));
        api.create_constant_set("Light Info Constant Set", &ctx.layouts().lighting.light_info, bindings)
    }

    fn shadows_set(
        api: &dyn RenderApi,
        ctx: &GraphicsDeviceContext,
        name: &str,
        info: &Arc<Buffer>,
        shadow_maps: &[ConstantBinding],
    ) -> Result<Arc<ConstantSet>> {
        let mut bindings = vec![ConstantBinding::Buffer(info.clone())];
        bindings.extend_from_slice(shadow_maps);
        api.create_constant_set(name, &ctx.layouts().lighting.shadows_info, bindings)
    }

    pub fn set_scene_info(&self, ctx: &GraphicsDeviceContext, info: &SceneInfo) -> Result<()> {
        ctx.api().map_write(&self.scene_info_buffer, 0, &info.to_bytes())
    }

    /// Uploads lights, shadow constants and the environment rotation.
    pub fn set_backdrop_info(
        &mut self,
        ctx: &GraphicsDeviceContext,
        backdrop: &BackdropInfo,
        shadows: Option<&ShadowOptions>,
    ) -> Result<()> {
        let api = ctx.api();
        api.map_write(&self.light_info_buffer, 0, &backdrop.light_info_bytes())?;

        let mut grown = false;
        let contents = [backdrop.directional_bytes(), backdrop.spot_bytes(), backdrop.point_bytes()];
        for (buffer, bytes) in self.light_buffers.iter_mut().zip(&contents) {
            grown |= write_or_grow(api, buffer, bytes)?;
        }
        if grown {
            self.light_info = Self::light_set(api, ctx, &self.light_info_buffer, &self.light_buffers)?;
        }

        api.map_write(&self.shadows_info_buffer, 0, &backdrop.shadows_bytes(shadows))?;
        api.map_write(
            &self.environment_buffer,
            0,
            bytemuck::cast_slice(&backdrop.environment_rotation.to_cols_array()),
        )?;
        Ok(())
    }

    /// Points the shadows set at the cascades of `shadow`, or back at the
    /// white placeholder.
    pub fn bind_shadow_maps(&mut self, ctx: &GraphicsDeviceContext, shadow: Option<&ShadowPass>) -> Result<()> {
        let defaults = ctx.defaults();
        self.shadow_maps = match shadow {
            Some(pass) => pass
                .cascades
                .iter()
                .map(|rt| ConstantBinding::RenderTarget(rt.clone(), defaults.linear_sampler.clone()))
                .collect(),
            None => vec![ConstantBinding::Texture(defaults.white.clone(), defaults.linear_sampler.clone()); SHADOW_CASCADE_COUNT],
        };
        self.shadows_info = Self::shadows_set(
            ctx.api(),
            ctx,
            "Shadows Info Constant Set",
            &self.shadows_info_buffer,
            &self.shadow_maps,
        )?;
        Ok(())
    }

    #[must_use]
    pub fn scene_info_buffer(&self) -> &Arc<Buffer> {
        &self.scene_info_buffer
    }
}
