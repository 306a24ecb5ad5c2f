//! RHI Vocabulary Types
//!
//! Scalar enums shared by every descriptor: value types, shader stages,
//! load operations and clear values. Formats, blending, depth comparison,
//! culling and sampling reuse the `wgpu` vocabulary directly.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Type of a vertex attribute, uniform field or push-constant field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    Bool,
    Int,
    Int2,
    Int3,
    Int4,
    Uint,
    Uint2,
    Uint3,
    Uint4,
    Float,
    Float2,
    Float3,
    Float4,
    Float4x4,
}

impl ValueType {
    /// Size in bytes of one element.
    #[inline]
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Bool | Self::Int | Self::Uint | Self::Float => 4,
            Self::Int2 | Self::Uint2 | Self::Float2 => 8,
            Self::Int3 | Self::Uint3 | Self::Float3 => 12,
            Self::Int4 | Self::Uint4 | Self::Float4 => 16,
            Self::Float4x4 => 64,
        }
    }

    /// Number of shader locations consumed as a vertex attribute.
    #[inline]
    #[must_use]
    pub const fn rows(self) -> u32 {
        match self {
            Self::Float4x4 => 4,
            _ => 1,
        }
    }

    /// Number of scalar components.
    #[inline]
    #[must_use]
    pub const fn components(self) -> u32 {
        match self {
            Self::Float4x4 => 16,
            _ => self.size() / 4,
        }
    }

    /// WGSL spelling, used by the generated declaration stubs.
    #[must_use]
    pub const fn wgsl_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "i32",
            Self::Int2 => "vec2<i32>",
            Self::Int3 => "vec3<i32>",
            Self::Int4 => "vec4<i32>",
            Self::Uint => "u32",
            Self::Uint2 => "vec2<u32>",
            Self::Uint3 => "vec3<u32>",
            Self::Uint4 => "vec4<u32>",
            Self::Float => "f32",
            Self::Float2 => "vec2<f32>",
            Self::Float3 => "vec3<f32>",
            Self::Float4 => "vec4<f32>",
            Self::Float4x4 => "mat4x4<f32>",
        }
    }

    /// Vertex fetch format, `None` for types that cannot be a vertex input.
    #[must_use]
    pub const fn vertex_format(self) -> Option<wgpu::VertexFormat> {
        match self {
            Self::Bool => None,
            Self::Int => Some(wgpu::VertexFormat::Sint32),
            Self::Int2 => Some(wgpu::VertexFormat::Sint32x2),
            Self::Int3 => Some(wgpu::VertexFormat::Sint32x3),
            Self::Int4 => Some(wgpu::VertexFormat::Sint32x4),
            Self::Uint => Some(wgpu::VertexFormat::Uint32),
            Self::Uint2 => Some(wgpu::VertexFormat::Uint32x2),
            Self::Uint3 => Some(wgpu::VertexFormat::Uint32x3),
            Self::Uint4 => Some(wgpu::VertexFormat::Uint32x4),
            Self::Float => Some(wgpu::VertexFormat::Float32),
            Self::Float2 => Some(wgpu::VertexFormat::Float32x2),
            Self::Float3 => Some(wgpu::VertexFormat::Float32x3),
            // Matrices are fetched row by row.
            Self::Float4 | Self::Float4x4 => Some(wgpu::VertexFormat::Float32x4),
        }
    }
}

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShaderStage {
    Vertex = 0,
    Geometry = 1,
    Fragment = 2,
    Compute = 3,
}

impl ShaderStage {
    /// All graphics stages in pipeline order.
    pub const GRAPHICS: [ShaderStage; 3] = [Self::Vertex, Self::Geometry, Self::Fragment];

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }

    /// File extension of generated sources for this stage.
    #[inline]
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Geometry => "geom",
            Self::Fragment => "frag",
            Self::Compute => "comp",
        }
    }

    #[inline]
    #[must_use]
    pub const fn mask(self) -> ShaderStageMask {
        match self {
            Self::Vertex => ShaderStageMask::VERTEX,
            Self::Geometry => ShaderStageMask::GEOMETRY,
            Self::Fragment => ShaderStageMask::FRAGMENT,
            Self::Compute => ShaderStageMask::COMPUTE,
        }
    }
}

bitflags! {
    /// Set of stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageMask: u8 {
        const VERTEX   = 1 << 0;
        const GEOMETRY = 1 << 1;
        const FRAGMENT = 1 << 2;
        const COMPUTE  = 1 << 3;

        const VERTEX_GEOMETRY = Self::VERTEX.bits() | Self::GEOMETRY.bits();
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::GEOMETRY.bits() | Self::FRAGMENT.bits();
    }
}

/// Ordered set of stages making up one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagePipeline {
    VertexFragment,
    VertexGeometryFragment,
    Compute,
}

impl StagePipeline {
    #[must_use]
    pub const fn stages(self) -> &'static [ShaderStage] {
        match self {
            Self::VertexFragment => &[ShaderStage::Vertex, ShaderStage::Fragment],
            Self::VertexGeometryFragment => {
                &[ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Fragment]
            }
            Self::Compute => &[ShaderStage::Compute],
        }
    }

    #[inline]
    #[must_use]
    pub fn contains(self, stage: ShaderStage) -> bool {
        self.stages().contains(&stage)
    }
}

/// What happens to an attachment when a render pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Clear,
    Load,
    DontCare,
}

/// Clear value of one frame-buffer attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil(f32, u32),
}

impl ClearValue {
    pub const TRANSPARENT: Self = Self::Color([0.0; 4]);
}

/// Size in bytes of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexSize {
    U16,
    #[default]
    U32,
}

impl IndexSize {
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Pipeline stage referenced by synchronization barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    TopOfPipe,
    Fragment,
    OutputColor,
    Compute,
}

/// How primitives are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    #[default]
    Triangles,
    Points,
    Lines,
}

impl DrawMode {
    #[must_use]
    pub const fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            Self::Triangles => wgpu::PrimitiveTopology::TriangleList,
            Self::Points => wgpu::PrimitiveTopology::PointList,
            Self::Lines => wgpu::PrimitiveTopology::LineList,
        }
    }
}

/// Graphics API a device runs on; drives shader file extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GraphicsApi {
    Vulkan,
    D3D11,
    D3D12,
    Metal,
    OpenGL,
    #[default]
    Headless,
}

impl GraphicsApi {
    /// Extension appended to hashed shader paths.
    #[must_use]
    pub const fn shader_extension(self) -> &'static str {
        match self {
            Self::Vulkan => ".spv",
            Self::D3D11 => ".d3d11",
            Self::D3D12 => ".d3d12",
            Self::Metal => ".metal",
            Self::OpenGL => ".glsl",
            Self::Headless => ".null",
        }
    }

    /// Whether the API has a geometry stage at all.
    #[must_use]
    pub const fn has_geometry_stage(self) -> bool {
        !matches!(self, Self::Metal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_layout() {
        assert_eq!(ValueType::Float3.size(), 12);
        assert_eq!(ValueType::Float4x4.size(), 64);
        assert_eq!(ValueType::Float4x4.rows(), 4);
        assert_eq!(ValueType::Float2.rows(), 1);
        assert_eq!(ValueType::Uint4.components(), 4);
        assert!(ValueType::Bool.vertex_format().is_none());
    }

    #[test]
    fn test_stage_pipeline() {
        assert!(StagePipeline::VertexGeometryFragment.contains(ShaderStage::Geometry));
        assert!(!StagePipeline::VertexFragment.contains(ShaderStage::Geometry));
        assert_eq!(StagePipeline::Compute.stages(), &[ShaderStage::Compute]);
    }
}
