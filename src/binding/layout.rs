//! Shared Constant-Set Layouts
//!
//! Layouts every particle shader agrees on (scene info, GBuffer samplers,
//! lighting, atlas, dithering, draw requests) and the per-material constant
//! set built from a renderer's enabled features.
//!
//! Binding names here are the names the shader sources declare; renaming
//! any of them breaks every precompiled shader.

use xxhash_rust::xxh3::Xxh3;

use crate::material::{PropertyKind, PropertyValue, RendererClass, ToggledFeature, enabled_features};
use crate::rhi::{ConstantBufferDesc, ConstantSetLayout, PushConstantDesc, ShaderStageMask, ValueType};

/// Draw requests batched in one draw-request constant buffer.
pub const MAX_DRAW_REQUESTS: u32 = 0x100;

pub const SCENE_INFO_BUFFER: &str = "SceneInfo";
pub const MATERIAL_BUFFER: &str = "Material";
pub const ATLAS_BUFFER: &str = "Atlas";
pub const DEPTH_SAMPLER: &str = "DepthSampler";
pub const NORMAL_ROUGH_METAL_SAMPLER: &str = "NormalRoughMetalSampler";
pub const DIFFUSE_SAMPLER: &str = "DiffuseSampler";
pub const DITHERING_SAMPLER: &str = "DitheringPatterns";
pub const BRDF_LUT_SAMPLER: &str = "BRDFLUTSampler";
pub const ENVIRONMENT_MAP_SAMPLER: &str = "EnvironmentMapSampler";

// ============================================================================
// Scene
// ============================================================================

/// Per-view constants shared by every particle draw.
#[must_use]
pub fn scene_info_buffer() -> ConstantBufferDesc {
    ConstantBufferDesc::new(SCENE_INFO_BUFFER)
        .with("ViewProj", ValueType::Float4x4)
        .with("View", ValueType::Float4x4)
        .with("Proj", ValueType::Float4x4)
        .with("InvView", ValueType::Float4x4)
        .with("InvViewProj", ValueType::Float4x4)
        .with("UserToLHZ", ValueType::Float4x4)
        .with("LHZToUser", ValueType::Float4x4)
        .with("BillboardingView", ValueType::Float4x4)
        .with("PackNormalView", ValueType::Float4x4)
        .with("UnpackNormalView", ValueType::Float4x4)
        .with("SideVector", ValueType::Float4)
        .with("DepthVector", ValueType::Float4)
        .with("ZBufferLimits", ValueType::Float2)
        .with("ViewportSize", ValueType::Float2)
        .with("Handedness", ValueType::Float)
}

#[must_use]
pub fn scene_info_layout() -> ConstantSetLayout {
    ConstantSetLayout::new(ShaderStageMask::ALL_GRAPHICS).buffer(scene_info_buffer())
}

// ============================================================================
// GBuffer samplers
// ============================================================================

#[must_use]
pub fn depth_sampler_layout() -> ConstantSetLayout {
    ConstantSetLayout::new(ShaderStageMask::FRAGMENT).sampler(DEPTH_SAMPLER)
}

#[must_use]
pub fn normal_rough_metal_sampler_layout() -> ConstantSetLayout {
    ConstantSetLayout::new(ShaderStageMask::FRAGMENT).sampler(NORMAL_ROUGH_METAL_SAMPLER)
}

#[must_use]
pub fn diffuse_sampler_layout() -> ConstantSetLayout {
    ConstantSetLayout::new(ShaderStageMask::FRAGMENT).sampler(DIFFUSE_SAMPLER)
}

#[must_use]
pub fn dithering_layout() -> ConstantSetLayout {
    ConstantSetLayout::new(ShaderStageMask::FRAGMENT).sampler(DITHERING_SAMPLER)
}

// ============================================================================
// Lighting
// ============================================================================

/// The four lighting sets, bound together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightingLayouts {
    pub light_info: ConstantSetLayout,
    pub shadows_info: ConstantSetLayout,
    pub brdf_lut: ConstantSetLayout,
    pub environment_map: ConstantSetLayout,
}

impl LightingLayouts {
    #[must_use]
    pub fn new() -> Self {
        let light_info = ConstantSetLayout::new(ShaderStageMask::FRAGMENT)
            .buffer(
                ConstantBufferDesc::new("LightInfo")
                    .with("DirectionalLightsCount", ValueType::Int)
                    .with("SpotLightsCount", ValueType::Int)
                    .with("PointLightsCount", ValueType::Int)
                    .with("AmbientColor", ValueType::Float3),
            )
            .raw("DirectionalLightsInfo")
            .raw("SpotLightsInfo")
            .raw("PointLightsInfo");

        let mut shadows = ConstantBufferDesc::new("ShadowsInfo");
        for cascade in 0..4 {
            shadows.add(format!("Cascade{cascade}_WorldToShadow"), ValueType::Float4x4, 1);
        }
        shadows.add("ShadowsRanges", ValueType::Float4, 1);
        for cascade in 0..4 {
            shadows.add(format!("m_ShadowsAspectRatio{cascade}"), ValueType::Float2, 1);
        }
        shadows.add("ShadowsConstants", ValueType::Float4, 1);
        shadows.add("ShadowsFlags", ValueType::Int, 1);

        let mut shadows_info = ConstantSetLayout::new(ShaderStageMask::FRAGMENT).buffer(shadows);
        for cascade in 0..4 {
            shadows_info.add_sampler(format!("Cascade{cascade}_ShadowMap"));
        }

        let brdf_lut = ConstantSetLayout::new(ShaderStageMask::FRAGMENT).sampler(BRDF_LUT_SAMPLER);

        let environment_map = ConstantSetLayout::new(ShaderStageMask::FRAGMENT)
            .cube_sampler(ENVIRONMENT_MAP_SAMPLER)
            .buffer(ConstantBufferDesc::new("EnvironmentMapInfo").with("Rotation", ValueType::Float4x4));

        Self {
            light_info,
            shadows_info,
            brdf_lut,
            environment_map,
        }
    }

    /// Sets in binding order.
    #[must_use]
    pub fn into_array(self) -> [ConstantSetLayout; 4] {
        [self.light_info, self.shadows_info, self.brdf_lut, self.environment_map]
    }
}

impl Default for LightingLayouts {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Atlas
// ============================================================================

/// Raw buffer: `u32` rect count followed by one `Float4` rect per entry.
#[must_use]
pub fn atlas_layout() -> ConstantSetLayout {
    ConstantSetLayout::new(ShaderStageMask::ALL_GRAPHICS).raw(ATLAS_BUFFER)
}

// ============================================================================
// Draw requests
// ============================================================================

/// Per-draw-request constant buffer for `count` batched requests.
#[must_use]
pub fn draw_request_buffer(class: RendererClass, count: u32) -> ConstantBufferDesc {
    match class {
        RendererClass::Triangle => ConstantBufferDesc::new("TriangleInfo").with_array(
            "DrawRequest",
            ValueType::Float2,
            count,
        ),
        RendererClass::Mesh => ConstantBufferDesc::new("GPUMeshPushConstants")
            .with("DrawRequest", ValueType::Uint)
            .with("IndirectionOffsetsIndex", ValueType::Uint),
        _ => ConstantBufferDesc::new("BillboardInfo").with_array(
            "DrawRequest",
            ValueType::Float4,
            count,
        ),
    }
}

#[must_use]
pub fn draw_requests_layout(class: RendererClass) -> ConstantSetLayout {
    let stages = if class == RendererClass::Triangle {
        ShaderStageMask::VERTEX
    } else {
        ShaderStageMask::VERTEX_GEOMETRY
    };
    ConstantSetLayout::new(stages).buffer(draw_request_buffer(class, MAX_DRAW_REQUESTS))
}

/// Single draw request pushed as constants, used with GPU storage.
#[must_use]
pub fn draw_request_push_constant(class: RendererClass) -> PushConstantDesc {
    let buffer = draw_request_buffer(class, 1);
    PushConstantDesc {
        name: buffer.name,
        stages: ShaderStageMask::VERTEX_GEOMETRY,
        fields: buffer.fields,
    }
}

#[must_use]
pub fn vertex_billboarding_push_constant(gpu_storage: bool) -> PushConstantDesc {
    let desc = PushConstantDesc::new("GPUBillboardPushConstants", ShaderStageMask::VERTEX)
        .with("IndicesOffset", ValueType::Uint);
    if gpu_storage {
        desc.with("StreamOffsetsIndex", ValueType::Uint)
    } else {
        desc
    }
}

// ============================================================================
// Material
// ============================================================================

/// Texture bound by the material constant set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureProperty {
    /// `Feature.Property` path.
    pub property: String,
    /// Texture path, empty when the renderer leaves it unset.
    pub path: String,
    pub srgb: bool,
}

/// Material constant set of one renderer: samplers first, then one
/// `Material` buffer holding every constant property.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialLayout {
    pub layout: ConstantSetLayout,
    pub textures: Vec<TextureProperty>,
    /// Packed constant buffer contents, in field order.
    pub constants: Vec<u8>,
    /// Digest of the constant values.
    pub content_hash: u64,
}

impl MaterialLayout {
    /// Builds the material set from the enabled features.
    ///
    /// `lookup` resolves a `Feature.Property` path to the renderer's value.
    /// Unset constants are zero and unset textures have an empty path, so
    /// the layout itself depends only on the enabled feature set.
    pub fn build<'a>(
        toggles: &[ToggledFeature],
        lookup: impl Fn(&str) -> Option<&'a PropertyValue>,
    ) -> Self {
        let mut layout = ConstantSetLayout::new(ShaderStageMask::ALL_GRAPHICS);
        let mut buffer = ConstantBufferDesc::new(MATERIAL_BUFFER);
        let mut textures = Vec::new();
        let mut constants = Vec::new();
        let mut digest = Xxh3::new();

        for feature in enabled_features(toggles) {
            for property in &feature.properties {
                let path = feature.property_path(&property.name);
                let shader_name = format!("{}_{}", feature.name, property.name);
                let value = lookup(&path);
                match property.kind {
                    PropertyKind::Texture { lookup } => {
                        layout.add_sampler(shader_name);
                        textures.push(TextureProperty {
                            property: path,
                            path: value
                                .and_then(PropertyValue::as_path)
                                .unwrap_or_default()
                                .to_owned(),
                            srgb: !lookup,
                        });
                    }
                    PropertyKind::Constant(ty) => {
                        let bytes = value.map_or_else(
                            || vec![0; ty.size() as usize],
                            |v| v.to_constant_bytes(ty),
                        );
                        buffer.add(shader_name, ty, 1);
                        digest.update(&bytes);
                        constants.extend_from_slice(&bytes);
                    }
                }
            }
        }

        if !buffer.is_empty() {
            layout = layout.buffer(buffer);
        }

        Self {
            layout,
            textures,
            constants,
            content_hash: digest.digest(),
        }
    }

    /// Layout only, for call sites without property values.
    #[must_use]
    pub fn layout_for(toggles: &[ToggledFeature]) -> ConstantSetLayout {
        Self::build(toggles, |_| None).layout
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }
}

/// Replaces every character a shader identifier cannot hold with `_`.
#[must_use]
pub fn sanitize_shader_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
