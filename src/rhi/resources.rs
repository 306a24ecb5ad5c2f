//! RHI Resources and Descriptors
//!
//! Immutable device objects handed out by a [`RenderApi`](super::RenderApi)
//! as `Arc`s, plus the descriptors used to create them. Every resource
//! carries a [`ResourceId`] unique for the device lifetime; recorded
//! commands reference resources by id.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use smallvec::SmallVec;

use super::bindings::{ConstantSetLayout, ShaderBindings};
use super::types::{DrawMode, LoadOp, ShaderStage, StagePipeline};

/// Device-unique resource identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

// ============================================================================
// Buffers, textures, samplers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Constant,
    Raw,
    Indirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub name: String,
    pub kind: BufferKind,
    pub size: u64,
}

impl BufferDesc {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: BufferKind, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
        }
    }
}

#[derive(Debug)]
pub struct Buffer {
    pub id: ResourceId,
    pub name: String,
    pub kind: BufferKind,
    pub size: u64,
}

/// Decoded texture data returned by a resource provider.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub name: String,
    pub size: [u32; 2],
    pub format: wgpu::TextureFormat,
    pub srgb: bool,
    pub mip_count: u32,
}

#[derive(Debug)]
pub struct Texture {
    pub id: ResourceId,
    pub name: String,
    pub size: [u32; 2],
    pub format: wgpu::TextureFormat,
    pub srgb: bool,
    pub mip_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
    pub address_mode: [wgpu::AddressMode; 3],
    pub max_mips: u32,
}

impl SamplerDesc {
    /// Linear filtering, repeat addressing.
    pub const LINEAR_REPEAT: Self = Self {
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        address_mode: [wgpu::AddressMode::Repeat; 3],
        max_mips: 16,
    };

    /// Point filtering, clamp addressing (render-target reads).
    pub const NEAREST_CLAMP: Self = Self {
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        address_mode: [wgpu::AddressMode::ClampToEdge; 3],
        max_mips: 1,
    };
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self::LINEAR_REPEAT
    }
}

#[derive(Debug)]
pub struct Sampler {
    pub id: ResourceId,
    pub name: String,
    pub desc: SamplerDesc,
}

#[derive(Debug)]
pub struct RenderTarget {
    pub id: ResourceId,
    pub name: String,
    pub format: wgpu::TextureFormat,
    pub size: [u32; 2],
    /// Whether later sub-passes may sample it as a texture.
    pub samplable: bool,
}

// ============================================================================
// Constant sets
// ============================================================================

/// Resource bound to one slot of a [`ConstantSet`].
#[derive(Debug, Clone)]
pub enum ConstantBinding {
    Texture(Arc<Texture>, Arc<Sampler>),
    RenderTarget(Arc<RenderTarget>, Arc<Sampler>),
    Buffer(Arc<Buffer>),
}

#[derive(Debug)]
pub struct ConstantSet {
    pub id: ResourceId,
    pub name: String,
    pub layout: ConstantSetLayout,
    pub bindings: Vec<ConstantBinding>,
}

// ============================================================================
// Shaders and pipeline states
// ============================================================================

#[derive(Debug)]
pub struct ShaderModule {
    pub id: ResourceId,
    pub path: String,
    pub stage: ShaderStage,
    pub byte_len: usize,
}

#[derive(Debug)]
pub struct ShaderProgram {
    pub id: ResourceId,
    pub name: String,
    pub modules: Vec<Arc<ShaderModule>>,
}

impl ShaderProgram {
    /// Stage pipeline implied by the linked modules.
    #[must_use]
    pub fn pipeline(&self) -> StagePipeline {
        if self.modules.iter().any(|m| m.stage == ShaderStage::Compute) {
            StagePipeline::Compute
        } else if self.modules.iter().any(|m| m.stage == ShaderStage::Geometry) {
            StagePipeline::VertexGeometryFragment
        } else {
            StagePipeline::VertexFragment
        }
    }
}

/// Fixed-function state baked into a render state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub dynamic_viewport: bool,
    pub dynamic_scissor: bool,
    pub blend: Option<wgpu::BlendState>,
    /// `None` disables the depth test.
    pub depth_compare: Option<wgpu::CompareFunction>,
    pub depth_write: bool,
    pub depth_clamp: bool,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub draw_mode: DrawMode,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            dynamic_viewport: true,
            dynamic_scissor: true,
            blend: None,
            depth_compare: Some(wgpu::CompareFunction::Less),
            depth_write: true,
            depth_clamp: false,
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
            draw_mode: DrawMode::Triangles,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderStateDesc {
    pub name: String,
    pub bindings: ShaderBindings,
    pub pipeline: PipelineState,
    pub program: Arc<ShaderProgram>,
    pub render_pass: Arc<RenderPass>,
    pub sub_pass: u32,
}

#[derive(Debug)]
pub struct RenderState {
    pub id: ResourceId,
    pub name: String,
    pub desc: RenderStateDesc,
}

#[derive(Debug, Clone)]
pub struct ComputeStateDesc {
    pub name: String,
    pub bindings: ShaderBindings,
    pub program: Arc<ShaderProgram>,
}

#[derive(Debug)]
pub struct ComputeState {
    pub id: ResourceId,
    pub name: String,
    pub desc: ComputeStateDesc,
}

// ============================================================================
// Render passes and frame buffers
// ============================================================================

/// Attachment indices read and written by one sub-pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubPassDefinition {
    pub inputs: SmallVec<[u32; 4]>,
    pub outputs: SmallVec<[u32; 4]>,
    pub depth_stencil: Option<u32>,
}

impl SubPassDefinition {
    #[must_use]
    pub fn new(inputs: &[u32], outputs: &[u32], depth_stencil: Option<u32>) -> Self {
        Self {
            inputs: inputs.iter().copied().collect(),
            outputs: outputs.iter().copied().collect(),
            depth_stencil,
        }
    }
}

/// Format and load behaviour of one frame-buffer attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentLayout {
    pub format: wgpu::TextureFormat,
    pub load_op: LoadOp,
}

#[derive(Debug, Clone)]
pub struct RenderPassDesc {
    pub name: String,
    pub attachments: Vec<AttachmentLayout>,
    pub sub_passes: Vec<SubPassDefinition>,
}

#[derive(Debug)]
pub struct RenderPass {
    pub id: ResourceId,
    pub name: String,
    pub attachments: Vec<AttachmentLayout>,
    pub sub_passes: Vec<SubPassDefinition>,
}

impl RenderPass {
    /// Formats written by `sub_pass`, in output order.
    #[must_use]
    pub fn output_formats(&self, sub_pass: u32) -> Vec<wgpu::TextureFormat> {
        self.sub_passes
            .get(sub_pass as usize)
            .map(|sp| {
                sp.outputs
                    .iter()
                    .filter_map(|&i| self.attachments.get(i as usize).map(|a| a.format))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct FrameBufferDesc {
    pub name: String,
    pub size: [u32; 2],
    pub targets: Vec<Arc<RenderTarget>>,
}

#[derive(Debug)]
pub struct FrameBuffer {
    pub id: ResourceId,
    pub name: String,
    pub size: [u32; 2],
    pub targets: Vec<Arc<RenderTarget>>,
}

// ============================================================================
// Provider data
// ============================================================================

/// Triangle mesh returned by a resource provider.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl MeshData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }
}
