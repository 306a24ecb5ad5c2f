//! Feature Declarations
//!
//! A material is a list of [`FeatureDesc`]s. Each feature states which
//! per-vertex data and which scene resources its shader code reads
//! ([`FeatureNeeds`]) and which of its properties are visible to shaders.
//! The binding builder only ever looks at features; property values live
//! on the renderer descriptor.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::FieldDecl;
use crate::rhi::ValueType;

bitflags! {
    /// Inputs a feature's shader code reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FeatureNeeds: u32 {
        const UV                        = 1 << 0;
        const NORMAL                    = 1 << 1;
        const TANGENT                   = 1 << 2;
        const UV1                       = 1 << 3;
        const VERTEX_COLOR0             = 1 << 4;
        const VERTEX_COLOR1             = 1 << 5;
        const BONES                     = 1 << 6;
        const SAMPLE_DEPTH              = 1 << 7;
        const SAMPLE_NORMAL_ROUGH_METAL = 1 << 8;
        const SAMPLE_DIFFUSE            = 1 << 9;
        const LIGHTING                  = 1 << 10;
    }
}

/// How a shader-visible property is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Sampled texture. Lookup textures hold data, not colors, and are
    /// loaded linear; every other texture is loaded as sRGB.
    Texture { lookup: bool },
    /// Field of the material constant buffer.
    Constant(ValueType),
}

/// Property exported by a feature to the shaders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureProperty {
    /// Short name, the full path is `Feature.Name`.
    pub name: String,
    pub kind: PropertyKind,
}

impl FeatureProperty {
    #[must_use]
    pub fn texture(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Texture { lookup: false },
        }
    }

    #[must_use]
    pub fn lookup_texture(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Texture { lookup: true },
        }
    }

    #[must_use]
    pub fn constant(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Constant(ty),
        }
    }
}

/// One feature of a material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureDesc {
    pub name: String,
    #[serde(default)]
    pub needs: FeatureNeeds,
    /// Mandatory features are always on; optional ones follow the
    /// renderer's boolean property of the same name.
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub properties: Vec<FeatureProperty>,
    /// Per-particle streams the feature reads, bound as additional fields.
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl FeatureDesc {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            needs: FeatureNeeds::empty(),
            mandatory: false,
            properties: Vec::new(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    #[must_use]
    pub fn needs(mut self, needs: FeatureNeeds) -> Self {
        self.needs |= needs;
        self
    }

    #[must_use]
    pub fn property(mut self, property: FeatureProperty) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.push(FieldDecl::new(name, ty));
        self
    }

    /// Geometry generation and mesh atlas features drive hardcoded shader
    /// code; their fields are never bound directly.
    #[must_use]
    pub fn is_generation_feature(&self) -> bool {
        self.name.starts_with("Geometry") || self.name == "MeshAtlas" || self.name == "MeshLOD"
    }

    /// Full dotted path of one of this feature's properties.
    #[must_use]
    pub fn property_path(&self, property: &str) -> String {
        format!("{}.{property}", self.name)
    }
}

/// Well-known feature names and property paths the pipeline reacts to.
pub mod names {
    pub const DIFFUSE: &str = "Diffuse";
    pub const EMISSIVE: &str = "Emissive";
    pub const OPAQUE: &str = "Opaque";
    pub const LIT: &str = "Lit";
    pub const LEGACY_LIT: &str = "LegacyLit";
    pub const LEGACY_LIT_OPAQUE: &str = "LegacyLitOpaque";
    pub const TINT: &str = "Tint";
    pub const DISTORTION: &str = "Distortion";
    pub const TRANSPARENT: &str = "Transparent";
    pub const ATLAS: &str = "Atlas";
    pub const CORRECT_DEFORMATION: &str = "CorrectDeformation";
    pub const CUSTOM_TEXTURE_U: &str = "CustomTextureU";
    pub const ALPHA_REMAP: &str = "AlphaRemap";
    pub const DIFFUSE_RAMP: &str = "DiffuseRamp";
    pub const UV_DISTORTIONS: &str = "UVDistortions";
    pub const ALPHA_MASKS: &str = "AlphaMasks";
    pub const VERTEX_ANIMATION: &str = "VertexAnimation";
    pub const TEXTURE_UVS: &str = "TextureUVs";
    pub const FLIP_UVS: &str = "FlipUVs";
    pub const BASIC_TRANSFORM_UVS: &str = "BasicTransformUVs";
    pub const CULLING: &str = "Culling";
    pub const TEXTURE_REPEAT: &str = "TextureRepeat";
    pub const TEXTURE_CLAMP: &str = "TextureClamp";

    pub const TRANSPARENT_TYPE: &str = "Transparent.Type";
    pub const CULLING_DOUBLE_SIDED: &str = "Culling.DoubleSided";
    pub const ATLAS_BLENDING: &str = "Atlas.Blending";
    pub const ATLAS_SOURCE: &str = "Atlas.Source";
    pub const ATLAS_DEFINITION: &str = "Atlas.Definition";
    pub const ATLAS_SUBDIV: &str = "Atlas.SubDiv";
    pub const MESH: &str = "Mesh";
    pub const BILLBOARDING_MODE: &str = "BillboardingMode";
    pub const ENABLE_SIZE2: &str = "EnableSize2D";
    pub const CAST_SHADOWS_FEATURES: [&str; 4] = [LIT, LEGACY_LIT, LEGACY_LIT_OPAQUE, OPAQUE];
    pub const CAST_SHADOWS: &str = "CastShadows";

    pub const TEXTURE_UVS_FLIP_U: &str = "TextureUVs.FlipU";
    pub const TEXTURE_UVS_FLIP_V: &str = "TextureUVs.FlipV";
    pub const TEXTURE_UVS_ROTATE: &str = "TextureUVs.RotateTexture";
    pub const BASIC_TRANSFORM_UVS_FLIP_U: &str = "BasicTransformUVs.FlipU";
    pub const BASIC_TRANSFORM_UVS_FLIP_V: &str = "BasicTransformUVs.FlipV";
    pub const BASIC_TRANSFORM_UVS_ROTATE: &str = "BasicTransformUVs.RotateUV";

    /// Fields consumed by the hardcoded geometry generation, never bound directly.
    pub const TRIANGLE_CUSTOM_FIELDS: [&str; 6] = [
        "TriangleCustomNormals_Normal1",
        "TriangleCustomNormals_Normal2",
        "TriangleCustomNormals_Normal3",
        "TriangleCustomUVs_UV1",
        "TriangleCustomUVs_UV2",
        "TriangleCustomUVs_UV3",
    ];
    pub const MESH_LOD_FIELD: &str = "MeshLOD_LOD";
}
