//! Headless Backend
//!
//! [`HeadlessApi`] implements [`RenderApi`] without a GPU: resources are ids
//! plus their descriptors, buffer writes land in host memory and submitted
//! command buffers are kept for inspection. It validates what a real driver
//! would reject (sub-pass indices out of range, frame buffers not matching
//! their render pass, constant sets not matching their layout).
//!
//! [`MemoryProvider`] implements [`ResourceProvider`] over in-memory maps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::bindings::{ConstantDesc, ConstantSetLayout};
use super::command::CommandBuffer;
use super::resources::{
    Buffer, BufferDesc, ComputeState, ComputeStateDesc, ConstantBinding, ConstantSet,
    FrameBuffer, FrameBufferDesc, MeshData, RenderPass, RenderPassDesc, RenderState,
    RenderStateDesc, RenderTarget, ResourceId, Sampler, SamplerDesc, ShaderModule,
    ShaderProgram, Texture, TextureData, TextureDesc,
};
use super::types::ShaderStage;
use super::{GpuCaps, RenderApi, ResourceProvider};
use crate::errors::{Result, RhiError};

#[derive(Default)]
struct HeadlessState {
    created: FxHashMap<&'static str, usize>,
    fail_names: FxHashSet<String>,
    submitted: Vec<CommandBuffer>,
    buffer_contents: FxHashMap<ResourceId, Vec<u8>>,
}

/// GPU-less [`RenderApi`] used by tests, tools and offline runs.
pub struct HeadlessApi {
    caps: GpuCaps,
    next_id: AtomicU64,
    state: Mutex<HeadlessState>,
}

impl HeadlessApi {
    #[must_use]
    pub fn new(caps: GpuCaps) -> Self {
        Self {
            caps,
            next_id: AtomicU64::new(1),
            state: Mutex::default(),
        }
    }

    /// Makes every later creation of a resource named `name` fail.
    pub fn fail_on(&self, name: impl Into<String>) {
        self.state.lock().fail_names.insert(name.into());
    }

    /// Lifts a previous [`fail_on`](Self::fail_on).
    pub fn clear_failure(&self, name: &str) {
        self.state.lock().fail_names.remove(name);
    }

    /// Number of successful creations of a resource kind ("render state", ...).
    #[must_use]
    pub fn creation_count(&self, kind: &str) -> usize {
        self.state.lock().created.get(kind).copied().unwrap_or(0)
    }

    /// Drains the submitted command buffers.
    pub fn take_submitted(&self) -> Vec<CommandBuffer> {
        std::mem::take(&mut self.state.lock().submitted)
    }

    /// Host copy of a buffer's contents, if it was ever written.
    #[must_use]
    pub fn buffer_contents(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.state.lock().buffer_contents.get(&id).cloned()
    }

    fn begin(&self, kind: &'static str, name: &str) -> Result<ResourceId> {
        let mut state = self.state.lock();
        if state.fail_names.contains(name) {
            return Err(RhiError::creation(kind, name, "creation refused by headless device"));
        }
        *state.created.entry(kind).or_default() += 1;
        Ok(ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }
}

impl Default for HeadlessApi {
    fn default() -> Self {
        Self::new(GpuCaps::default())
    }
}

fn binding_matches(desc: &ConstantDesc, binding: &ConstantBinding) -> bool {
    matches!(
        (desc, binding),
        (
            ConstantDesc::Sampler { .. },
            ConstantBinding::Texture(..) | ConstantBinding::RenderTarget(..)
        ) | (
            ConstantDesc::Buffer(_) | ConstantDesc::RawBuffer { .. },
            ConstantBinding::Buffer(_)
        )
    )
}

impl RenderApi for HeadlessApi {
    fn caps(&self) -> GpuCaps {
        self.caps
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<Buffer>> {
        let id = self.begin("buffer", &desc.name)?;
        Ok(Arc::new(Buffer {
            id,
            name: desc.name.clone(),
            kind: desc.kind,
            size: desc.size,
        }))
    }

    fn map_write(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset + data.len() as u64;
        if end > buffer.size {
            return Err(RhiError::creation(
                "buffer",
                &buffer.name,
                format!("write of {} bytes at {offset} overflows size {}", data.len(), buffer.size),
            ));
        }
        let mut state = self.state.lock();
        let contents = state
            .buffer_contents
            .entry(buffer.id)
            .or_insert_with(|| vec![0; buffer.size as usize]);
        contents[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> Result<Arc<Texture>> {
        if desc.size[0] == 0 || desc.size[1] == 0 {
            return Err(RhiError::creation("texture", &desc.name, "zero-sized texture"));
        }
        let expected = desc
            .format
            .block_copy_size(None)
            .map(|bpp| u64::from(bpp) * u64::from(desc.size[0]) * u64::from(desc.size[1]));
        if let Some(expected) = expected
            && !pixels.is_empty()
            && (pixels.len() as u64) < expected
        {
            return Err(RhiError::creation(
                "texture",
                &desc.name,
                format!("{} bytes provided, {expected} expected", pixels.len()),
            ));
        }
        let id = self.begin("texture", &desc.name)?;
        Ok(Arc::new(Texture {
            id,
            name: desc.name.clone(),
            size: desc.size,
            format: desc.format,
            srgb: desc.srgb,
            mip_count: desc.mip_count,
        }))
    }

    fn create_sampler(&self, name: &str, desc: &SamplerDesc) -> Result<Arc<Sampler>> {
        let id = self.begin("sampler", name)?;
        Ok(Arc::new(Sampler {
            id,
            name: name.to_owned(),
            desc: *desc,
        }))
    }

    fn create_render_target(
        &self,
        name: &str,
        format: wgpu::TextureFormat,
        size: [u32; 2],
        samplable: bool,
    ) -> Result<Arc<RenderTarget>> {
        let id = self.begin("render target", name)?;
        Ok(Arc::new(RenderTarget {
            id,
            name: name.to_owned(),
            format,
            size,
            samplable,
        }))
    }

    fn create_constant_set(
        &self,
        name: &str,
        layout: &ConstantSetLayout,
        bindings: Vec<ConstantBinding>,
    ) -> Result<Arc<ConstantSet>> {
        if bindings.len() != layout.constants.len() {
            return Err(RhiError::creation(
                "constant set",
                name,
                format!("{} bindings for {} layout slots", bindings.len(), layout.constants.len()),
            ));
        }
        if let Some(slot) = layout
            .constants
            .iter()
            .zip(&bindings)
            .position(|(desc, binding)| !binding_matches(desc, binding))
        {
            return Err(RhiError::creation(
                "constant set",
                name,
                format!("binding {slot} does not match slot `{}`", layout.constants[slot].name()),
            ));
        }
        let id = self.begin("constant set", name)?;
        Ok(Arc::new(ConstantSet {
            id,
            name: name.to_owned(),
            layout: layout.clone(),
            bindings,
        }))
    }

    fn create_shader_module(
        &self,
        path: &str,
        stage: ShaderStage,
        bytes: &[u8],
    ) -> Result<Arc<ShaderModule>> {
        if bytes.is_empty() {
            return Err(RhiError::creation("shader module", path, "empty shader binary"));
        }
        let id = self.begin("shader module", path)?;
        Ok(Arc::new(ShaderModule {
            id,
            path: path.to_owned(),
            stage,
            byte_len: bytes.len(),
        }))
    }

    fn create_shader_program(
        &self,
        name: &str,
        modules: Vec<Arc<ShaderModule>>,
    ) -> Result<Arc<ShaderProgram>> {
        let has = |stage| modules.iter().any(|m: &Arc<ShaderModule>| m.stage == stage);
        let valid = if has(ShaderStage::Compute) {
            modules.len() == 1
        } else {
            has(ShaderStage::Vertex) && has(ShaderStage::Fragment)
        };
        if !valid {
            return Err(RhiError::creation("shader program", name, "incomplete stage set"));
        }
        if has(ShaderStage::Geometry) && !self.caps.supports_geometry_shaders {
            return Err(RhiError::creation("shader program", name, "geometry stage unsupported"));
        }
        let id = self.begin("shader program", name)?;
        Ok(Arc::new(ShaderProgram {
            id,
            name: name.to_owned(),
            modules,
        }))
    }

    fn create_render_state(&self, desc: RenderStateDesc) -> Result<Arc<RenderState>> {
        if desc.sub_pass as usize >= desc.render_pass.sub_passes.len() {
            return Err(RhiError::creation(
                "render state",
                &desc.name,
                format!(
                    "sub-pass {} out of range for '{}' ({} sub-passes)",
                    desc.sub_pass,
                    desc.render_pass.name,
                    desc.render_pass.sub_passes.len()
                ),
            ));
        }
        let id = self.begin("render state", &desc.name)?;
        Ok(Arc::new(RenderState {
            id,
            name: desc.name.clone(),
            desc,
        }))
    }

    fn create_compute_state(&self, desc: ComputeStateDesc) -> Result<Arc<ComputeState>> {
        let id = self.begin("compute state", &desc.name)?;
        Ok(Arc::new(ComputeState {
            id,
            name: desc.name.clone(),
            desc,
        }))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<RenderPass>> {
        let count = desc.attachments.len() as u32;
        for (i, sp) in desc.sub_passes.iter().enumerate() {
            let out_of_range = sp
                .inputs
                .iter()
                .chain(sp.outputs.iter())
                .chain(sp.depth_stencil.iter())
                .any(|&a| a >= count);
            if out_of_range {
                return Err(RhiError::creation(
                    "render pass",
                    &desc.name,
                    format!("sub-pass {i} references an attachment out of range ({count})"),
                ));
            }
        }
        let id = self.begin("render pass", &desc.name)?;
        Ok(Arc::new(RenderPass {
            id,
            name: desc.name.clone(),
            attachments: desc.attachments.clone(),
            sub_passes: desc.sub_passes.clone(),
        }))
    }

    fn create_frame_buffer(
        &self,
        desc: FrameBufferDesc,
        render_pass: &RenderPass,
    ) -> Result<Arc<FrameBuffer>> {
        if desc.targets.len() != render_pass.attachments.len() {
            return Err(RhiError::creation(
                "frame buffer",
                &desc.name,
                format!(
                    "{} targets for {} attachments of '{}'",
                    desc.targets.len(),
                    render_pass.attachments.len(),
                    render_pass.name
                ),
            ));
        }
        let id = self.begin("frame buffer", &desc.name)?;
        Ok(Arc::new(FrameBuffer {
            id,
            name: desc.name,
            size: desc.size,
            targets: desc.targets,
        }))
    }

    fn submit(&self, commands: CommandBuffer) -> Result<()> {
        self.state.lock().submitted.push(commands);
        Ok(())
    }
}

// ============================================================================
// MemoryProvider
// ============================================================================

/// [`ResourceProvider`] backed by in-memory maps.
#[derive(Default)]
pub struct MemoryProvider {
    shaders: Mutex<FxHashMap<String, Vec<u8>>>,
    textures: Mutex<FxHashMap<String, TextureData>>,
    meshes: Mutex<FxHashMap<String, MeshData>>,
    atlases: Mutex<FxHashMap<String, Vec<[f32; 4]>>>,
    /// Serve a placeholder binary for any shader path.
    any_shader: bool,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider answering every shader request with a placeholder binary.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            any_shader: true,
            ..Self::default()
        }
    }

    pub fn insert_shader(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.shaders.lock().insert(path.into(), bytes);
    }

    pub fn insert_texture(&self, path: impl Into<String>, data: TextureData) {
        self.textures.lock().insert(path.into(), data);
    }

    pub fn insert_mesh(&self, path: impl Into<String>, mesh: MeshData) {
        self.meshes.lock().insert(path.into(), mesh);
    }

    pub fn insert_atlas(&self, path: impl Into<String>, rects: Vec<[f32; 4]>) {
        self.atlases.lock().insert(path.into(), rects);
    }
}

impl ResourceProvider for MemoryProvider {
    fn load_shader(&self, path: &str) -> Option<Vec<u8>> {
        if let Some(bytes) = self.shaders.lock().get(path) {
            return Some(bytes.clone());
        }
        self.any_shader.then(|| path.as_bytes().to_vec())
    }

    fn load_texture(&self, path: &str, _srgb: bool) -> Option<TextureData> {
        self.textures.lock().get(path).cloned()
    }

    fn load_mesh(&self, path: &str) -> Option<MeshData> {
        self.meshes.lock().get(path).cloned()
    }

    fn load_atlas(&self, path: &str) -> Option<Vec<[f32; 4]>> {
        self.atlases.lock().get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::bindings::ConstantBufferDesc;
    use crate::rhi::resources::{AttachmentLayout, BufferKind, SubPassDefinition};
    use crate::rhi::types::{LoadOp, ShaderStageMask, ValueType};

    #[test]
    fn test_fail_on_named_resource() {
        let api = HeadlessApi::default();
        api.fail_on("Broken");
        assert!(api.create_sampler("Broken", &SamplerDesc::default()).is_err());
        assert!(api.create_sampler("Fine", &SamplerDesc::default()).is_ok());
        assert_eq!(api.creation_count("sampler"), 1);
    }

    #[test]
    fn test_map_write_bounds() {
        let api = HeadlessApi::default();
        let buffer = api
            .create_buffer(&BufferDesc::new("Constants", BufferKind::Constant, 8))
            .unwrap();
        api.map_write(&buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(api.buffer_contents(buffer.id).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(api.map_write(&buffer, 6, &[0; 4]).is_err());
    }

    #[test]
    fn test_constant_set_must_match_layout() {
        let api = HeadlessApi::default();
        let layout = ConstantSetLayout::new(ShaderStageMask::FRAGMENT)
            .buffer(ConstantBufferDesc::new("Material").with("Color", ValueType::Float4));
        let buffer = api
            .create_buffer(&BufferDesc::new("Material", BufferKind::Constant, 16))
            .unwrap();
        assert!(api.create_constant_set("Empty", &layout, Vec::new()).is_err());
        assert!(
            api.create_constant_set("Material", &layout, vec![ConstantBinding::Buffer(buffer)])
                .is_ok()
        );
    }

    #[test]
    fn test_frame_buffer_must_match_render_pass() {
        let api = HeadlessApi::default();
        let pass = api
            .create_render_pass(&RenderPassDesc {
                name: "Pass".into(),
                attachments: vec![AttachmentLayout {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    load_op: LoadOp::Clear,
                }],
                sub_passes: vec![SubPassDefinition::new(&[], &[0], None)],
            })
            .unwrap();
        let err = api.create_frame_buffer(
            FrameBufferDesc {
                name: "FB".into(),
                size: [4, 4],
                targets: Vec::new(),
            },
            &pass,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_permissive_provider_serves_any_shader() {
        let provider = MemoryProvider::permissive();
        assert!(provider.load_shader("Shaders/anything.spv").is_some());
        assert!(MemoryProvider::new().load_shader("Shaders/anything.spv").is_none());
    }
}
