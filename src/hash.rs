//! Content Hashing
//!
//! Stable digests used as cache keys and as file names of precompiled
//! shader permutations. Every function here is part of the on-disk
//! contract: changing what is hashed, or in which order, renames every
//! compiled shader.
//!
//! - [`content_hash`]: options, class and enabled feature names. Property
//!   values never participate, so renderers that only differ by values
//!   share one program.
//! - [`ShaderBindings::layout_hash`]: canonical encoding of a binding layout.
//! - [`remap_shader_path`]: `<root>/<xxh3-128 hex>` of a readable
//!   permutation string.

use xxhash_rust::xxh3::{Xxh3, xxh3_128};

use crate::binding::{ComputeShaderType, ParticlePass, ShaderOptions};
use crate::errors::Result;
use crate::material::{RendererClass, ToggledFeature, enabled_features};
use crate::rhi::{
    BufferField, ConstantDesc, GraphicsApi, SamplerKind, ShaderBindings, ShaderStage,
};

/// Digest of one shader permutation: little-endian options, class, then
/// each enabled feature name followed by a zero byte.
#[must_use]
pub fn content_hash(options: ShaderOptions, class: RendererClass, features: &[ToggledFeature]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&options.bits().to_le_bytes());
    hasher.update(&(class as u32).to_le_bytes());
    for feature in enabled_features(features) {
        hasher.update(feature.name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.digest()
}

/// Canonical byte encoding of a binding layout.
struct LayoutWriter(Xxh3);

impl LayoutWriter {
    #[inline]
    fn u32(&mut self, value: u32) {
        self.0.update(&value.to_le_bytes());
    }

    #[inline]
    fn str(&mut self, value: &str) {
        self.u32(value.len() as u32);
        self.0.update(value.as_bytes());
    }

    fn fields(&mut self, fields: &[BufferField]) {
        self.u32(fields.len() as u32);
        for field in fields {
            self.str(&field.name);
            self.u32(field.ty as u32);
            self.u32(field.count);
        }
    }
}

impl ShaderBindings {
    /// xxh3-64 of the whole layout. Equal layouts hash equal; the converse
    /// is only checked in debug builds by the caches.
    #[must_use]
    pub fn layout_hash(&self) -> u64 {
        let mut w = LayoutWriter(Xxh3::new());

        w.u32(self.attributes.len() as u32);
        for attr in &self.attributes {
            w.str(&attr.name);
            w.u32(attr.location);
            w.u32(attr.ty as u32);
            w.u32(attr.buffer_index);
            w.u32(attr.offset);
        }

        w.u32(self.vertex_buffers.len() as u32);
        for buffer in &self.vertex_buffers {
            w.u32(buffer.stride);
            w.u32(buffer.rate as u32);
        }

        w.u32(self.constant_sets.len() as u32);
        for set in &self.constant_sets {
            w.u32(u32::from(set.stages.bits()));
            w.u32(set.constants.len() as u32);
            for constant in &set.constants {
                match constant {
                    ConstantDesc::Sampler { name, kind } => {
                        w.u32(0);
                        w.str(name);
                        w.u32(u32::from(*kind == SamplerKind::Cube));
                    }
                    ConstantDesc::Buffer(desc) => {
                        w.u32(1);
                        w.str(&desc.name);
                        w.fields(&desc.fields);
                    }
                    ConstantDesc::RawBuffer { name, writable } => {
                        w.u32(2);
                        w.str(name);
                        w.u32(u32::from(*writable));
                    }
                }
            }
        }

        w.u32(self.push_constants.len() as u32);
        for push in &self.push_constants {
            w.str(&push.name);
            w.u32(u32::from(push.stages.bits()));
            w.fields(&push.fields);
        }

        w.u32(self.defines.len() as u32);
        for define in &self.defines {
            w.str(&define.name);
            w.str(define.value.as_deref().unwrap_or_default());
            w.u32(u32::from(define.stages.bits()));
        }

        w.0.digest()
    }
}

/// Identity of one compiled shader stage.
#[derive(Debug, Clone, Copy)]
pub struct ShaderPermutation<'a> {
    /// Source shader path; empty for stages generated from the bindings.
    pub source_path: &'a str,
    pub material: &'a str,
    pub stage: ShaderStage,
    pub class: RendererClass,
    pub options: ShaderOptions,
    pub features: &'a [ToggledFeature],
    pub pass: ParticlePass,
}

impl ShaderPermutation<'_> {
    /// Readable permutation string, e.g.
    /// `Billboard.frag.Default_Billboard_Diffuse_ParticlePass_Transparent_Fwd_VC0`.
    #[must_use]
    pub fn name(&self) -> String {
        let (prefix, path) = if self.source_path.is_empty() {
            ("Generated", self.stage.extension())
        } else {
            let file = self
                .source_path
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(self.source_path);
            ("", file)
        };
        let specialization = if self.class == RendererClass::Mesh && self.stage == ShaderStage::Vertex {
            "Mesh_"
        } else {
            ""
        };

        let mut name = format!("{prefix}{path}.{}_{specialization}", self.material);
        for feature in enabled_features(self.features) {
            name.push_str(&feature.name);
            name.push('_');
        }
        name.push_str(self.pass.name());
        name.push('_');
        name.push_str(&self.options.shader_name(self.stage));
        name
    }
}

/// `<root>/<hash>` of a permutation, without extension.
#[must_use]
pub fn remap_shader_path(root: &str, permutation: &ShaderPermutation<'_>) -> String {
    let hash = xxh3_128(permutation.name().as_bytes());
    format!("{}/{hash:032x}", root.trim_end_matches('/'))
}

/// Compiled shader file of a permutation for `api`.
#[must_use]
pub fn hashed_shader_file(root: &str, permutation: &ShaderPermutation<'_>, api: GraphicsApi) -> String {
    format!("{}{}", remap_shader_path(root, permutation), api.shader_extension())
}

/// `<root>/<Name>.<layout hash>` of a compute shader, without extension.
pub fn compute_shader_path(root: &str, ty: ComputeShaderType) -> Result<String> {
    let layout = ty.bindings()?.bindings.layout_hash();
    Ok(format!("{}/{}.{layout:016x}", root.trim_end_matches('/'), ty.stem()))
}

/// Compiled compute shader file of `ty` for `api`.
pub fn compute_shader_file(root: &str, ty: ComputeShaderType, api: GraphicsApi) -> Result<String> {
    Ok(format!("{}{}", compute_shader_path(root, ty)?, api.shader_extension()))
}
