//! Draw-Call Records
//!
//! A [`DrawCall`] is what the update side queues for one renderer: its
//! shader options, its cache instance and the buffers of the frame. The
//! render side only reads it.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::binding::ShaderOptions;
use crate::cache::{Handle, RendererCacheInstanceKey, RendererCacheInstanceUpdate};
use crate::material::RendererClass;
use crate::rhi::{Buffer, ConstantSet, IndexSize, ResourceId};

/// How the GPU draw is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawType {
    /// `DrawIndexed` with an index buffer, `Draw` without.
    #[default]
    Regular,
    IndexedInstanced,
    InstancedIndirect,
    IndexedInstancedIndirect,
}

#[derive(Debug, Clone)]
pub struct DrawCall {
    pub class: RendererClass,
    pub options: ShaderOptions,
    /// `None` skips the draw.
    pub instance: Option<Handle<RendererCacheInstanceKey>>,
    pub cast_shadows: bool,

    pub vertex_buffers: Vec<Arc<Buffer>>,
    /// Parallel to `vertex_buffers`.
    pub vertex_offsets: Vec<u64>,
    pub index_buffer: Option<Arc<Buffer>>,
    pub index_size: IndexSize,
    pub index_offset: u32,
    pub vertex_offset: u32,
    pub index_count: u32,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub indirect_buffer: Option<Arc<Buffer>>,
    pub indirect_offset: u64,

    /// One payload per push constant of the permutation, in binding order.
    pub push_constants: Vec<Vec<u8>>,
    /// Draw-request constants of CPU-simulated billboards.
    pub draw_requests: Option<Arc<Buffer>>,
    /// Stream-offsets set of GPU-simulated particles.
    pub stream_offsets: Option<Arc<ConstantSet>>,
    /// Simulation-data set of GPU-simulated particles.
    pub sim_data: Option<Arc<ConstantSet>>,
    pub ty: DrawType,
}

impl DrawCall {
    #[must_use]
    pub fn new(class: RendererClass, options: ShaderOptions) -> Self {
        Self {
            class,
            options,
            instance: None,
            cast_shadows: false,
            vertex_buffers: Vec::new(),
            vertex_offsets: Vec::new(),
            index_buffer: None,
            index_size: IndexSize::U32,
            index_offset: 0,
            vertex_offset: 0,
            index_count: 0,
            vertex_count: 0,
            instance_count: 1,
            indirect_buffer: None,
            indirect_offset: 0,
            push_constants: Vec::new(),
            draw_requests: None,
            stream_offsets: None,
            sim_data: None,
            ty: DrawType::Regular,
        }
    }

    /// Draw call of the renderer owning `update`.
    #[must_use]
    pub fn from_update(update: &RendererCacheInstanceUpdate, options: ShaderOptions) -> Self {
        Self {
            instance: update.handle(),
            cast_shadows: update.cast_shadows(),
            ..Self::new(update.class, options)
        }
    }

    #[must_use]
    pub fn with_vertices(mut self, buffers: Vec<Arc<Buffer>>, vertex_count: u32) -> Self {
        self.vertex_offsets = vec![0; buffers.len()];
        self.vertex_buffers = buffers;
        self.vertex_count = vertex_count;
        self
    }

    #[must_use]
    pub fn with_indices(mut self, buffer: Arc<Buffer>, index_size: IndexSize, index_count: u32) -> Self {
        self.index_buffer = Some(buffer);
        self.index_size = index_size;
        self.index_count = index_count;
        self
    }

    #[must_use]
    pub fn with_instances(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self.ty = DrawType::IndexedInstanced;
        self
    }

    #[must_use]
    pub fn with_indirect(mut self, buffer: Arc<Buffer>, offset: u64, indexed: bool) -> Self {
        self.indirect_buffer = Some(buffer);
        self.indirect_offset = offset;
        self.ty = if indexed {
            DrawType::IndexedInstancedIndirect
        } else {
            DrawType::InstancedIndirect
        };
        self
    }

    #[must_use]
    pub fn with_push_constant(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.push_constants.push(data.into());
        self
    }

    #[must_use]
    pub fn with_draw_requests(mut self, buffer: Arc<Buffer>) -> Self {
        self.draw_requests = Some(buffer);
        self
    }

    #[must_use]
    pub fn with_gpu_storage(mut self, stream_offsets: Arc<ConstantSet>, sim_data: Arc<ConstantSet>) -> Self {
        self.stream_offsets = Some(stream_offsets);
        self.sim_data = Some(sim_data);
        self
    }
}

/// Identity of the geometry buffers bound for a draw.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct BatchKey {
    vertex: SmallVec<[(ResourceId, u64); 4]>,
    index: Option<(ResourceId, u32)>,
}

impl BatchKey {
    pub(crate) fn new(vertex: &[&Buffer], offsets: &[u64], index: Option<(&Buffer, u32)>) -> Self {
        Self {
            vertex: vertex
                .iter()
                .zip(offsets.iter().copied().chain(std::iter::repeat(0)))
                .map(|(b, o)| (b.id, o))
                .collect(),
            index: index.map(|(b, o)| (b.id, o)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::{BufferDesc, BufferKind, GpuCaps, HeadlessApi, RenderApi};

    #[test]
    fn test_builders_pick_draw_type() {
        let api = HeadlessApi::new(GpuCaps::default());
        let vertices = api.create_buffer(&BufferDesc::new("Positions", BufferKind::Vertex, 48)).unwrap();
        let indirect = api.create_buffer(&BufferDesc::new("Args", BufferKind::Indirect, 20)).unwrap();

        let call = DrawCall::new(RendererClass::Billboard, ShaderOptions::VERTEX_BILLBOARDING)
            .with_vertices(vec![vertices.clone()], 4);
        assert_eq!(call.ty, DrawType::Regular);
        assert_eq!(call.vertex_offsets, [0]);

        let call = call.with_indirect(indirect, 0, false);
        assert_eq!(call.ty, DrawType::InstancedIndirect);
        assert!(call.instance.is_none());
    }

    #[test]
    fn test_batch_key_compares_ids() {
        let api = HeadlessApi::new(GpuCaps::default());
        let a = api.create_buffer(&BufferDesc::new("A", BufferKind::Vertex, 16)).unwrap();
        let b = api.create_buffer(&BufferDesc::new("B", BufferKind::Vertex, 16)).unwrap();

        assert_eq!(BatchKey::new(&[&a], &[0], None), BatchKey::new(&[&a], &[], None));
        assert_ne!(BatchKey::new(&[&a], &[0], None), BatchKey::new(&[&b], &[0], None));
        assert_ne!(BatchKey::new(&[&a], &[0], None), BatchKey::new(&[&a], &[16], None));
    }
}
