//! Rendering Hardware Interface
//!
//! The abstract device this crate renders through. Backends implement
//! [`RenderApi`]; asset loading sits behind [`ResourceProvider`]. Neither
//! trait knows about particles, materials or passes.
//!
//! | Module | Contents |
//! |---|---|
//! | [`types`] | value types, stages, load ops, graphics API |
//! | [`bindings`] | shader binding descriptors |
//! | [`resources`] | device objects and their descriptors |
//! | [`command`] | recorded command buffers |
//! | [`headless`] | GPU-less backend and in-memory provider |

pub mod bindings;
pub mod command;
pub mod headless;
pub mod resources;
pub mod types;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub use bindings::{
    BufferField, ConstantBufferDesc, ConstantDesc, ConstantSetLayout, InputRate,
    PushConstantDesc, SamplerKind, ShaderBindings, ShaderDefine, VertexAttribute,
    VertexBufferLayout,
};
pub use command::{Command, CommandBuffer};
pub use headless::{HeadlessApi, MemoryProvider};
pub use resources::*;
pub use types::*;

/// Capability flags of the device, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuCaps {
    pub supports_geometry_shaders: bool,
    pub supports_shader_resource_views: bool,
    /// Enables the GPU-storage shader permutations.
    pub supports_gpu_particles: bool,
    pub graphics_api: GraphicsApi,
}

impl Default for GpuCaps {
    fn default() -> Self {
        Self {
            supports_geometry_shaders: false,
            supports_shader_resource_views: true,
            supports_gpu_particles: false,
            graphics_api: GraphicsApi::default(),
        }
    }
}

/// Abstract graphics device.
///
/// Creation calls are only made from the render-thread phase. Every call
/// returns a shared immutable resource or a [`RhiError`](crate::errors::RhiError)
/// carrying the backend's message.
pub trait RenderApi: Send + Sync {
    fn caps(&self) -> GpuCaps;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<Buffer>>;

    /// Synchronous map, copy and unmap.
    fn map_write(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<()>;

    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> Result<Arc<Texture>>;

    fn create_sampler(&self, name: &str, desc: &SamplerDesc) -> Result<Arc<Sampler>>;

    fn create_render_target(
        &self,
        name: &str,
        format: wgpu::TextureFormat,
        size: [u32; 2],
        samplable: bool,
    ) -> Result<Arc<RenderTarget>>;

    fn create_constant_set(
        &self,
        name: &str,
        layout: &ConstantSetLayout,
        bindings: Vec<ConstantBinding>,
    ) -> Result<Arc<ConstantSet>>;

    fn create_shader_module(
        &self,
        path: &str,
        stage: ShaderStage,
        bytes: &[u8],
    ) -> Result<Arc<ShaderModule>>;

    fn create_shader_program(
        &self,
        name: &str,
        modules: Vec<Arc<ShaderModule>>,
    ) -> Result<Arc<ShaderProgram>>;

    fn create_render_state(&self, desc: RenderStateDesc) -> Result<Arc<RenderState>>;

    fn create_compute_state(&self, desc: ComputeStateDesc) -> Result<Arc<ComputeState>>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<RenderPass>>;

    fn create_frame_buffer(
        &self,
        desc: FrameBufferDesc,
        render_pass: &RenderPass,
    ) -> Result<Arc<FrameBuffer>>;

    fn submit(&self, commands: CommandBuffer) -> Result<()>;
}

/// Black-box source of shader binaries, textures and meshes.
///
/// `None` means "missing"; callers fall back to default resources.
pub trait ResourceProvider: Send + Sync {
    fn load_shader(&self, path: &str) -> Option<Vec<u8>>;

    fn load_texture(&self, path: &str, srgb: bool) -> Option<TextureData>;

    fn load_mesh(&self, path: &str) -> Option<MeshData>;

    /// Atlas rectangles, `[scale_u, scale_v, offset_u, offset_v]` per sub-image.
    fn load_atlas(&self, _path: &str) -> Option<Vec<[f32; 4]>> {
        None
    }
}
