//! Recorded Command Buffers
//!
//! A [`CommandBuffer`] is a plain list of [`Command`]s referencing resources
//! by [`ResourceId`]. Recording never touches the device; the buffer is
//! handed to [`RenderApi::submit`](super::RenderApi::submit) as a whole.

use super::resources::{
    Buffer, ComputeState, ConstantSet, FrameBuffer, RenderPass, RenderState, ResourceId,
};
use super::types::{ClearValue, IndexSize, PipelineStage};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        render_pass: ResourceId,
        frame_buffer: ResourceId,
        clear_values: Vec<ClearValue>,
    },
    NextSubPass,
    EndRenderPass,
    SetViewport {
        origin: [u32; 2],
        size: [u32; 2],
    },
    SetScissor {
        origin: [u32; 2],
        size: [u32; 2],
    },
    BindRenderState(ResourceId),
    BindComputeState(ResourceId),
    /// Constant sets in set-index order.
    BindConstantSets(Vec<ResourceId>),
    PushConstant {
        index: u32,
        data: Vec<u8>,
    },
    BindVertexBuffers {
        buffers: Vec<ResourceId>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: ResourceId,
        offset: u64,
        index_size: IndexSize,
    },
    Draw {
        vertex_offset: u32,
        vertex_count: u32,
    },
    DrawIndexed {
        index_offset: u32,
        vertex_offset: u32,
        index_count: u32,
    },
    DrawIndexedInstanced {
        index_offset: u32,
        vertex_offset: u32,
        index_count: u32,
        instance_count: u32,
    },
    DrawInstancedIndirect {
        buffer: ResourceId,
        offset: u64,
    },
    DrawIndexedInstancedIndirect {
        buffer: ResourceId,
        offset: u64,
    },
    Dispatch([u32; 3]),
    /// Barrier making `src` writes visible to `dst` reads.
    SyncPreviousRenderPass {
        src: PipelineStage,
        dst: PipelineStage,
    },
}

/// Ordered list of recorded commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBuffer {
    pub name: String,
    pub commands: Vec<Command>,
}

impl CommandBuffer {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn begin_render_pass(
        &mut self,
        render_pass: &RenderPass,
        frame_buffer: &FrameBuffer,
        clear_values: &[ClearValue],
    ) {
        self.push(Command::BeginRenderPass {
            render_pass: render_pass.id,
            frame_buffer: frame_buffer.id,
            clear_values: clear_values.to_vec(),
        });
    }

    pub fn next_sub_pass(&mut self) {
        self.push(Command::NextSubPass);
    }

    pub fn end_render_pass(&mut self) {
        self.push(Command::EndRenderPass);
    }

    /// Full-frame viewport and scissor.
    pub fn set_viewport_and_scissor(&mut self, size: [u32; 2]) {
        self.push(Command::SetViewport { origin: [0, 0], size });
        self.push(Command::SetScissor { origin: [0, 0], size });
    }

    pub fn bind_render_state(&mut self, state: &RenderState) {
        self.push(Command::BindRenderState(state.id));
    }

    pub fn bind_compute_state(&mut self, state: &ComputeState) {
        self.push(Command::BindComputeState(state.id));
    }

    pub fn bind_constant_sets(&mut self, sets: &[&ConstantSet]) {
        self.push(Command::BindConstantSets(sets.iter().map(|s| s.id).collect()));
    }

    pub fn push_constant(&mut self, index: u32, data: &[u8]) {
        self.push(Command::PushConstant {
            index,
            data: data.to_vec(),
        });
    }

    pub fn bind_vertex_buffers(&mut self, buffers: &[&Buffer], offsets: &[u64]) {
        self.push(Command::BindVertexBuffers {
            buffers: buffers.iter().map(|b| b.id).collect(),
            offsets: offsets.to_vec(),
        });
    }

    pub fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64, index_size: IndexSize) {
        self.push(Command::BindIndexBuffer {
            buffer: buffer.id,
            offset,
            index_size,
        });
    }

    pub fn sync_previous_render_pass(&mut self, src: PipelineStage, dst: PipelineStage) {
        self.push(Command::SyncPreviousRenderPass { src, dst });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw commands of any kind.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Command::Draw { .. }
                        | Command::DrawIndexed { .. }
                        | Command::DrawIndexedInstanced { .. }
                        | Command::DrawInstancedIndirect { .. }
                        | Command::DrawIndexedInstancedIndirect { .. }
                )
            })
            .count()
    }
}
