//! Renderer Descriptors and Materials
//!
//! The read-only description of a particle renderer as this crate sees it:
//! a [`RendererClass`], the additional per-particle fields it streams, the
//! property values set by the effect author, and the [`MaterialSettings`]
//! (shader paths + feature list) it renders with.
//!
//! [`RendererDescriptor::toggled_features`] resolves which features are
//! enabled for a given renderer; everything downstream (binding builder,
//! content hash, pipeline state, renderer cache) works from that list.

pub mod features;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::rhi::ValueType;

pub use features::{FeatureDesc, FeatureNeeds, FeatureProperty, PropertyKind, names};

/// Topology family of a particle renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum RendererClass {
    Billboard = 0,
    Ribbon = 1,
    Mesh = 2,
    Triangle = 3,
    Light = 4,
    Decal = 5,
    /// Never reaches the RHI path.
    Sound = 6,
}

impl RendererClass {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Billboard => "Billboard",
            Self::Ribbon => "Ribbon",
            Self::Mesh => "Mesh",
            Self::Triangle => "Triangle",
            Self::Light => "Light",
            Self::Decal => "Decal",
            Self::Sound => "Sound",
        }
    }

    /// Classes drawn with one instance per particle and per-instance vertex data.
    #[inline]
    #[must_use]
    pub const fn is_instanced(self) -> bool {
        matches!(self, Self::Mesh | Self::Light | Self::Decal)
    }
}

/// Additional per-particle stream declared by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: ValueType,
}

impl FieldDecl {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Value of one renderer property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Int2([i32; 2]),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    /// Resource path (texture, mesh, atlas).
    Path(String),
}

impl PropertyValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i32::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&str> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Packs the value as it appears in a constant buffer of field type `ty`.
    ///
    /// Booleans are stored as a 32-bit integer. Missing trailing components
    /// are zero-filled.
    #[must_use]
    pub fn to_constant_bytes(&self, ty: ValueType) -> Vec<u8> {
        let mut out = match self {
            Self::Bool(b) => bytemuck::bytes_of(&i32::from(*b)).to_vec(),
            Self::Int(i) => bytemuck::bytes_of(i).to_vec(),
            Self::Int2(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Float(f) => bytemuck::bytes_of(f).to_vec(),
            Self::Float2(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Float3(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Float4(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Path(_) => Vec::new(),
        };
        out.resize(ty.size() as usize, 0);
        out
    }
}

/// One named property set on a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererProperty {
    /// Dotted path (`Feature.Property`), or the bare feature name for toggles.
    pub name: String,
    pub value: PropertyValue,
}

/// Shader sources and feature list of a material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialSettings {
    pub material_name: String,
    /// Empty when the vertex stage is generated.
    pub vertex_shader_path: String,
    /// Empty means `<material_name>.frag`.
    pub fragment_shader_path: String,
    pub features: Vec<FeatureDesc>,
}

impl MaterialSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn feature(&self, name: &str) -> Option<&FeatureDesc> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Fragment source path, defaulted from the material name.
    #[must_use]
    pub fn fragment_path(&self) -> String {
        if self.fragment_shader_path.is_empty() {
            format!("{}.frag", self.material_name)
        } else {
            self.fragment_shader_path.clone()
        }
    }

    /// Feature list with optional features off, as seen without a renderer.
    #[must_use]
    pub fn default_toggles(&self) -> Vec<ToggledFeature> {
        self.features
            .iter()
            .map(|f| ToggledFeature {
                feature: f.clone(),
                enabled: f.mandatory,
            })
            .collect()
    }
}

/// A material feature and whether it is on for one renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToggledFeature {
    pub feature: FeatureDesc,
    pub enabled: bool,
}

impl ToggledFeature {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.feature.name
    }
}

/// Iterates the enabled features of a toggle list, in declaration order.
pub fn enabled_features(toggles: &[ToggledFeature]) -> impl Iterator<Item = &FeatureDesc> {
    toggles.iter().filter(|t| t.enabled).map(|t| &t.feature)
}

/// Whether `name` is an enabled feature of the toggle list.
#[must_use]
pub fn is_enabled(toggles: &[ToggledFeature], name: &str) -> bool {
    toggles.iter().any(|t| t.enabled && t.feature.name == name)
}

/// Union of the needs of every enabled feature.
#[must_use]
pub fn combined_needs(toggles: &[ToggledFeature]) -> FeatureNeeds {
    enabled_features(toggles).fold(FeatureNeeds::empty(), |acc, f| acc | f.needs)
}

/// Billboard orientation modes, in property-value order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BillboardMode {
    #[default]
    ScreenAligned,
    ViewposAligned,
    AxisAligned,
    AxisAlignedSpheroid,
    AxisAlignedCapsule,
    PlaneAligned,
}

impl BillboardMode {
    #[must_use]
    pub const fn from_property(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::ScreenAligned,
            1 => Self::ViewposAligned,
            2 => Self::AxisAligned,
            3 => Self::AxisAlignedSpheroid,
            4 => Self::AxisAlignedCapsule,
            5 => Self::PlaneAligned,
            _ => return None,
        })
    }
}

/// Ribbon orientation modes, in property-value order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RibbonMode {
    #[default]
    ViewposAligned,
    NormalAxisAligned,
    SideAxisAligned,
    SideAxisAlignedTube,
    SideAxisAlignedMultiPlane,
}

impl RibbonMode {
    #[must_use]
    pub const fn from_property(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::ViewposAligned,
            1 => Self::NormalAxisAligned,
            2 => Self::SideAxisAligned,
            3 => Self::SideAxisAlignedTube,
            4 => Self::SideAxisAlignedMultiPlane,
            _ => return None,
        })
    }

    /// Every mode but view-position aligned constrains one axis.
    #[must_use]
    pub const fn has_axis(self) -> bool {
        !matches!(self, Self::ViewposAligned)
    }
}

/// Immutable declaration of one particle renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererDescriptor {
    pub class: RendererClass,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub properties: Vec<RendererProperty>,
    #[serde(default)]
    pub material: MaterialSettings,
}

impl RendererDescriptor {
    #[must_use]
    pub fn new(class: RendererClass, material: MaterialSettings) -> Self {
        Self {
            class,
            fields: Vec::new(),
            properties: Vec::new(),
            material,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.push(FieldDecl::new(name, ty));
        self
    }

    /// Sets a property, replacing any previous value.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        let name = name.into();
        self.properties.retain(|p| p.name != name);
        self.properties.push(RendererProperty { name, value });
        self
    }

    /// Turns an optional feature on.
    #[must_use]
    pub fn enable(self, feature: &str) -> Self {
        self.with_property(feature, PropertyValue::Bool(true))
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    #[must_use]
    pub fn property_bool(&self, name: &str) -> Option<bool> {
        self.property(name).and_then(PropertyValue::as_bool)
    }

    #[must_use]
    pub fn property_int(&self, name: &str) -> Option<i32> {
        self.property(name).and_then(PropertyValue::as_int)
    }

    #[must_use]
    pub fn property_path(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(PropertyValue::as_path)
    }

    /// Mandatory features are always on; optional ones need their toggle property set.
    #[must_use]
    pub fn toggled_features(&self) -> Vec<ToggledFeature> {
        self.material
            .features
            .iter()
            .map(|f| ToggledFeature {
                feature: f.clone(),
                enabled: f.mandatory || self.property_bool(&f.name).unwrap_or(false),
            })
            .collect()
    }

    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        self.material
            .feature(name)
            .is_some_and(|f| f.mandatory || self.property_bool(name).unwrap_or(false))
    }

    #[must_use]
    pub fn billboard_mode(&self) -> BillboardMode {
        self.property_int(names::BILLBOARDING_MODE)
            .and_then(BillboardMode::from_property)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn ribbon_mode(&self) -> RibbonMode {
        self.property_int(names::BILLBOARDING_MODE)
            .and_then(RibbonMode::from_property)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn size2_enabled(&self) -> bool {
        self.property_bool(names::ENABLE_SIZE2).unwrap_or(false)
    }
}
