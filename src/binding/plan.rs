//! Binding Plan
//!
//! The binding builder does not assign indices itself. It emits an ordered
//! list of [`BindingStep`]s and [`BindingPlan::fold`] walks that list once,
//! handing out shader locations, vertex-buffer indices and constant-set
//! indices from monotonically increasing counters.
//!
//! Runtime render states, offline permutation lists and shader stubs all
//! consume the same plan, so they cannot disagree on binding order.

use bitflags::bitflags;

use crate::errors::{Result, RhiError};
use crate::rhi::{
    ConstantSetLayout, InputRate, PushConstantDesc, ShaderBindings, ShaderDefine, ValueType,
    VertexAttribute, VertexBufferLayout,
};

bitflags! {
    /// Scene resources a shader reads, bound by the dispatcher per draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NeededConstants: u32 {
        const SAMPLE_DEPTH              = 1 << 0;
        const SAMPLE_NORMAL_ROUGH_METAL = 1 << 1;
        const SAMPLE_DIFFUSE            = 1 << 2;
        const LIGHTING_INFO             = 1 << 3;
        const ATLAS_INFO                = 1 << 4;
        const DITHERING_PATTERN         = 1 << 5;
    }
}

/// What a constant set holds, so the dispatcher knows what to bind there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetRole {
    DepthSampler,
    NormalRoughMetalSampler,
    DiffuseSampler,
    LightInfo,
    ShadowsInfo,
    BrdfLut,
    EnvironmentMap,
    Atlas,
    Dithering,
    SceneInfo,
    Material,
    DrawRequests,
    StreamOffsets,
    SimData,
    Compute,
}

/// One entry of the ordered binding contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingStep {
    /// Opens a new vertex buffer; following attributes read from it.
    VertexBuffer { stride: u32, rate: InputRate },
    /// Attribute read from the last opened vertex buffer at `offset`.
    Attribute {
        name: String,
        ty: ValueType,
        offset: u32,
    },
    Define(ShaderDefine),
    ConstantSet {
        role: SetRole,
        layout: ConstantSetLayout,
    },
    PushConstant(PushConstantDesc),
}

/// Ordered binding steps plus the scene resources they need.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindingPlan {
    steps: Vec<BindingStep>,
    needed: NeededConstants,
}

/// Result of folding a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CompiledBindings {
    pub bindings: ShaderBindings,
    pub needed: NeededConstants,
    /// Role of each constant set, parallel to `bindings.constant_sets`.
    pub set_roles: Vec<SetRole>,
}

impl CompiledBindings {
    /// Index of the first constant set with the given role.
    #[must_use]
    pub fn set_index(&self, role: SetRole) -> Option<usize> {
        self.set_roles.iter().position(|r| *r == role)
    }

    #[must_use]
    pub fn set_layout(&self, role: SetRole) -> Option<&ConstantSetLayout> {
        self.set_index(role).map(|i| &self.bindings.constant_sets[i])
    }
}

impl BindingPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, step: BindingStep) {
        self.steps.push(step);
    }

    pub fn vertex_buffer(&mut self, stride: u32, rate: InputRate) {
        self.push(BindingStep::VertexBuffer { stride, rate });
    }

    pub fn attribute(&mut self, name: impl Into<String>, ty: ValueType) {
        self.attribute_at(name, ty, 0);
    }

    pub fn attribute_at(&mut self, name: impl Into<String>, ty: ValueType, offset: u32) {
        self.push(BindingStep::Attribute {
            name: name.into(),
            ty,
            offset,
        });
    }

    /// Vertex buffer holding exactly one attribute.
    pub fn stream(&mut self, name: impl Into<String>, ty: ValueType, stride: u32, rate: InputRate) {
        self.vertex_buffer(stride, rate);
        self.attribute(name, ty);
    }

    pub fn define(&mut self, define: ShaderDefine) {
        self.push(BindingStep::Define(define));
    }

    pub fn constant_set(&mut self, role: SetRole, layout: ConstantSetLayout) {
        self.push(BindingStep::ConstantSet { role, layout });
    }

    pub fn push_constant(&mut self, desc: PushConstantDesc) {
        self.push(BindingStep::PushConstant(desc));
    }

    pub fn require(&mut self, needed: NeededConstants) {
        self.needed |= needed;
    }

    #[must_use]
    pub fn steps(&self) -> &[BindingStep] {
        &self.steps
    }

    #[inline]
    #[must_use]
    pub fn needed(&self) -> NeededConstants {
        self.needed
    }

    /// Assigns every index and produces the final bindings.
    ///
    /// Locations advance by the row count of each attribute type (a 4x4
    /// matrix takes four).
    pub fn fold(&self) -> Result<CompiledBindings> {
        let mut out = CompiledBindings {
            needed: self.needed,
            ..CompiledBindings::default()
        };
        let mut location = 0u32;

        for step in &self.steps {
            match step {
                BindingStep::VertexBuffer { stride, rate } => {
                    out.bindings.vertex_buffers.push(VertexBufferLayout {
                        stride: *stride,
                        rate: *rate,
                    });
                }
                BindingStep::Attribute { name, ty, offset } => {
                    let Some(buffer_index) = out.bindings.vertex_buffers.len().checked_sub(1) else {
                        return Err(RhiError::InvalidField(format!(
                            "attribute '{name}' declared before any vertex buffer"
                        )));
                    };
                    out.bindings.attributes.push(VertexAttribute {
                        name: name.clone(),
                        location,
                        ty: *ty,
                        buffer_index: buffer_index as u32,
                        offset: *offset,
                    });
                    location += ty.rows();
                }
                BindingStep::Define(define) => out.bindings.defines.push(define.clone()),
                BindingStep::ConstantSet { role, layout } => {
                    out.bindings.constant_sets.push(layout.clone());
                    out.set_roles.push(*role);
                }
                BindingStep::PushConstant(desc) => out.bindings.push_constants.push(desc.clone()),
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::ShaderStageMask;

    #[test]
    fn test_fold_assigns_locations_by_rows() {
        let mut plan = BindingPlan::new();
        plan.vertex_buffer(16, InputRate::PerVertex);
        plan.attribute("Position", ValueType::Float3);
        plan.attribute_at("DrawRequestID", ValueType::Float, 12);
        plan.stream("MeshTransform", ValueType::Float4x4, 64, InputRate::PerInstance);
        plan.stream("Color", ValueType::Float4, 16, InputRate::PerInstance);

        let compiled = plan.fold().unwrap();
        let attrs = &compiled.bindings.attributes;
        assert_eq!(attrs[0].location, 0);
        assert_eq!((attrs[1].location, attrs[1].buffer_index, attrs[1].offset), (1, 0, 12));
        assert_eq!((attrs[2].location, attrs[2].buffer_index), (2, 1));
        assert_eq!((attrs[3].location, attrs[3].buffer_index), (6, 2));
        assert_eq!(compiled.bindings.vertex_buffers.len(), 3);
    }

    #[test]
    fn test_fold_keeps_set_roles_parallel() {
        let mut plan = BindingPlan::new();
        plan.require(NeededConstants::ATLAS_INFO);
        plan.constant_set(SetRole::Atlas, ConstantSetLayout::new(ShaderStageMask::ALL_GRAPHICS).raw("Atlas"));
        plan.define(ShaderDefine::new("HAS_Diffuse", ShaderStageMask::ALL_GRAPHICS));
        plan.constant_set(SetRole::SimData, ConstantSetLayout::new(ShaderStageMask::VERTEX).raw("Indices"));

        let compiled = plan.fold().unwrap();
        assert_eq!(compiled.set_index(SetRole::Atlas), Some(0));
        assert_eq!(compiled.set_index(SetRole::SimData), Some(1));
        assert_eq!(compiled.set_index(SetRole::Material), None);
        assert_eq!(compiled.needed, NeededConstants::ATLAS_INFO);
        assert!(compiled.bindings.has_define("HAS_Diffuse"));
    }

    #[test]
    fn test_attribute_without_buffer_is_rejected() {
        let mut plan = BindingPlan::new();
        plan.attribute("Position", ValueType::Float3);
        assert!(matches!(plan.fold(), Err(RhiError::InvalidField(_))));
    }
}
