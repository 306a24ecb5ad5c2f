//! Shader Binding Descriptors
//!
//! The value types describing how a shader program sees its inputs:
//! vertex attributes, vertex buffers, constant-set layouts, push constants
//! and preprocessor defines. [`ShaderBindings`] is the output of the binding
//! builder and the input of every render-state and compute-state bake.
//!
//! All descriptors compare by value; two equal [`ShaderBindings`] produce
//! interchangeable pipelines.

use super::types::{ShaderStageMask, ValueType};

/// Whether a vertex buffer advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputRate {
    #[default]
    PerVertex,
    PerInstance,
}

impl InputRate {
    #[must_use]
    pub const fn step_mode(self) -> wgpu::VertexStepMode {
        match self {
            Self::PerVertex => wgpu::VertexStepMode::Vertex,
            Self::PerInstance => wgpu::VertexStepMode::Instance,
        }
    }
}

/// One named field of a uniform buffer or push constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferField {
    pub name: String,
    pub ty: ValueType,
    /// Array length, 1 for scalars.
    pub count: u32,
}

impl BufferField {
    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.ty.size() * self.count
    }
}

/// Named uniform buffer made of typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConstantBufferDesc {
    pub name: String,
    pub fields: Vec<BufferField>,
}

impl ConstantBufferDesc {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a scalar field (builder style).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.add(name, ty, 1);
        self
    }

    /// Appends an array field (builder style).
    #[must_use]
    pub fn with_array(mut self, name: impl Into<String>, ty: ValueType, count: u32) -> Self {
        self.add(name, ty, count);
        self
    }

    pub fn add(&mut self, name: impl Into<String>, ty: ValueType, count: u32) {
        self.fields.push(BufferField {
            name: name.into(),
            ty,
            count,
        });
    }

    /// Packed size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.fields.iter().map(BufferField::size).sum()
    }

    /// Byte offset of a field, if present.
    #[must_use]
    pub fn offset_of(&self, name: &str) -> Option<u32> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.size();
        }
        None
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Texture dimensionality of a sampler binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerKind {
    #[default]
    Texture2D,
    Cube,
}

/// One binding inside a constant set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantDesc {
    /// Combined texture + sampler.
    Sampler { name: String, kind: SamplerKind },
    /// Uniform buffer.
    Buffer(ConstantBufferDesc),
    /// Raw (structured/storage) buffer.
    RawBuffer { name: String, writable: bool },
}

impl ConstantDesc {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Sampler { name, .. } | Self::RawBuffer { name, .. } => name,
            Self::Buffer(desc) => &desc.name,
        }
    }
}

/// Ordered list of bindings bound together as one set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConstantSetLayout {
    pub stages: ShaderStageMask,
    pub constants: Vec<ConstantDesc>,
}

impl ConstantSetLayout {
    #[must_use]
    pub fn new(stages: ShaderStageMask) -> Self {
        Self {
            stages,
            constants: Vec::new(),
        }
    }

    #[must_use]
    pub fn sampler(mut self, name: impl Into<String>) -> Self {
        self.add_sampler(name);
        self
    }

    #[must_use]
    pub fn cube_sampler(mut self, name: impl Into<String>) -> Self {
        self.constants.push(ConstantDesc::Sampler {
            name: name.into(),
            kind: SamplerKind::Cube,
        });
        self
    }

    #[must_use]
    pub fn buffer(mut self, desc: ConstantBufferDesc) -> Self {
        self.constants.push(ConstantDesc::Buffer(desc));
        self
    }

    #[must_use]
    pub fn raw(mut self, name: impl Into<String>) -> Self {
        self.add_raw(name);
        self
    }

    #[must_use]
    pub fn raw_rw(mut self, name: impl Into<String>) -> Self {
        self.constants.push(ConstantDesc::RawBuffer {
            name: name.into(),
            writable: true,
        });
        self
    }

    pub fn add_sampler(&mut self, name: impl Into<String>) {
        self.constants.push(ConstantDesc::Sampler {
            name: name.into(),
            kind: SamplerKind::Texture2D,
        });
    }

    pub fn add_raw(&mut self, name: impl Into<String>) {
        self.constants.push(ConstantDesc::RawBuffer {
            name: name.into(),
            writable: false,
        });
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.constants.iter().position(|c| c.name() == name)
    }
}

/// Push-constant block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PushConstantDesc {
    pub name: String,
    pub stages: ShaderStageMask,
    pub fields: Vec<BufferField>,
}

impl PushConstantDesc {
    #[must_use]
    pub fn new(name: impl Into<String>, stages: ShaderStageMask) -> Self {
        Self {
            name: name.into(),
            stages,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.push(BufferField {
            name: name.into(),
            ty,
            count: 1,
        });
        self
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.fields.iter().map(BufferField::size).sum()
    }
}

/// Vertex shader input with its resolved location and source buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub name: String,
    pub location: u32,
    pub ty: ValueType,
    pub buffer_index: u32,
    /// Byte offset inside the source buffer's element.
    pub offset: u32,
}

/// Layout of one bound vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub rate: InputRate,
}

/// Preprocessor define visible to a set of stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDefine {
    pub name: String,
    pub value: Option<String>,
    pub stages: ShaderStageMask,
}

impl ShaderDefine {
    #[must_use]
    pub fn new(name: impl Into<String>, stages: ShaderStageMask) -> Self {
        Self {
            name: name.into(),
            value: None,
            stages,
        }
    }
}

/// Complete binding layout of a shader program.
///
/// Index spaces (locations, vertex buffers, constant sets, push constants)
/// are dense and assigned in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderBindings {
    pub attributes: Vec<VertexAttribute>,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub constant_sets: Vec<ConstantSetLayout>,
    pub push_constants: Vec<PushConstantDesc>,
    pub defines: Vec<ShaderDefine>,
}

impl ShaderBindings {
    /// Finds the index of the first constant set containing a binding named `name`.
    #[must_use]
    pub fn find_constant_set(&self, name: &str) -> Option<usize> {
        self.constant_sets.iter().position(|set| set.find(name).is_some())
    }

    #[must_use]
    pub fn has_define(&self, name: &str) -> bool {
        self.defines.iter().any(|d| d.name == name)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
