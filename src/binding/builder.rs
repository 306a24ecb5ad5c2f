//! Binding Builder
//!
//! Turns (renderer class, shader options, enabled features, fields) into a
//! [`BindingPlan`]. The plan is emitted in one fixed order:
//!
//! | # | Steps |
//! |---|-------|
//! | 1 | generated inputs of the renderer class, `HAS_<feature>` defines, scene resource sets |
//! | 2 | declared fields |
//! | 3 | scene info set |
//! | 4 | material set (when the material has properties) |
//! | 5 | draw-request constants (billboarded and GPU-mesh options) |
//! | 6 | stream-offsets set, then sim-data set |
//!
//! Both trailing sets are appended last so texture registers never shift
//! between CPU, vertex and geometry billboarding of the same material.

use crate::binding::layout::{
    self, LightingLayouts, MaterialLayout, sanitize_shader_name,
};
use crate::binding::options::ShaderOptions;
use crate::binding::plan::{BindingPlan, CompiledBindings, NeededConstants, SetRole};
use crate::errors::{Result, RhiError};
use crate::material::{
    FeatureNeeds, FieldDecl, RendererClass, ToggledFeature, combined_needs, enabled_features,
    is_enabled, names,
};
use crate::rhi::{ConstantSetLayout, InputRate, ShaderDefine, ShaderStageMask, ValueType};

/// Everything the binding layout depends on.
#[derive(Debug, Clone, Copy)]
pub struct BindingInput<'a> {
    pub class: RendererClass,
    pub options: ShaderOptions,
    pub features: &'a [ToggledFeature],
    pub fields: &'a [FieldDecl],
}

impl<'a> BindingInput<'a> {
    #[must_use]
    pub fn new(
        class: RendererClass,
        options: ShaderOptions,
        features: &'a [ToggledFeature],
        fields: &'a [FieldDecl],
    ) -> Self {
        Self {
            class,
            options,
            features,
            fields,
        }
    }
}

/// Builds the ordered binding plan.
pub fn build_plan(input: &BindingInput<'_>) -> Result<BindingPlan> {
    PlanBuilder::new(input)?.run()
}

/// Builds and folds the plan.
pub fn build_bindings(input: &BindingInput<'_>) -> Result<CompiledBindings> {
    build_plan(input)?.fold()
}

/// Fields the enabled features stream, for call sites without a renderer.
///
/// Generation features drive hardcoded code and the sort key never reaches
/// the draw shaders, so neither contributes.
#[must_use]
pub fn feature_fields(features: &[ToggledFeature]) -> Vec<FieldDecl> {
    enabled_features(features)
        .filter(|f| !f.is_generation_feature())
        .flat_map(|f| {
            f.fields
                .iter()
                .filter(move |field| f.property_path(&field.name) != "Transparent.SortKey")
                .map(move |field| FieldDecl::new(f.property_path(&field.name), field.ty))
        })
        .collect()
}

// ============================================================================
// Plan builder
// ============================================================================

struct PlanBuilder<'a> {
    class: RendererClass,
    options: ShaderOptions,
    features: &'a [ToggledFeature],
    fields: &'a [FieldDecl],

    vertex_bb: bool,
    geom_bb: bool,
    gpu_storage: bool,
    needs: FeatureNeeds,
    atlas: bool,
    opaque: bool,
    correct_deformation: bool,
    custom_texture_u: bool,

    plan: BindingPlan,
    stream_offsets: ConstantSetLayout,
    sim_data: ConstantSetLayout,
}

impl<'a> PlanBuilder<'a> {
    fn new(input: &BindingInput<'a>) -> Result<Self> {
        let options = input.options;
        let class = input.class;
        if class == RendererClass::Sound {
            return Err(RhiError::UnsupportedRenderer(class.name()));
        }

        let vertex_bb = options.vertex_billboarding();
        let geom_bb = options.geom_billboarding();
        let gpu_storage = options.gpu_storage();
        if options.contains(ShaderOptions::GPU_STORAGE) && !vertex_bb && !geom_bb {
            return Err(RhiError::UnsupportedCombination(format!(
                "{} GPU storage without billboarding ({options:?})",
                class.name()
            )));
        }
        if vertex_bb && gpu_storage && !matches!(class, RendererClass::Billboard | RendererClass::Ribbon) {
            return Err(RhiError::UnsupportedCombination(format!(
                "{} vertex billboarding from GPU storage",
                class.name()
            )));
        }
        if class == RendererClass::Ribbon && vertex_bb && !gpu_storage {
            return Err(RhiError::UnsupportedCombination(
                "Ribbon vertex billboarding needs GPU storage".to_owned(),
            ));
        }

        let features = input.features;
        Ok(Self {
            class,
            options,
            features,
            fields: input.fields,
            vertex_bb,
            geom_bb,
            gpu_storage,
            needs: combined_needs(features),
            atlas: is_enabled(features, names::ATLAS),
            opaque: is_enabled(features, names::OPAQUE),
            correct_deformation: is_enabled(features, names::CORRECT_DEFORMATION),
            custom_texture_u: is_enabled(features, names::CUSTOM_TEXTURE_U),
            plan: BindingPlan::new(),
            stream_offsets: ConstantSetLayout::new(ShaderStageMask::VERTEX),
            sim_data: ConstantSetLayout::new(ShaderStageMask::VERTEX),
        })
    }

    fn run(mut self) -> Result<BindingPlan> {
        self.generated_inputs()?;
        self.feature_defines();
        self.class_inputs()?;
        self.scene_resource_sets();
        self.fields()?;

        self.plan.constant_set(SetRole::SceneInfo, layout::scene_info_layout());
        let material = MaterialLayout::layout_for(self.features);
        if !material.is_empty() {
            self.plan.constant_set(SetRole::Material, material);
        }
        if self.geom_bb || self.vertex_bb || self.options.contains(ShaderOptions::GPU_MESH) {
            self.draw_request_constants();
        }

        let gpu_mesh = self.options.contains(ShaderOptions::GPU_MESH);
        if (self.vertex_bb && self.gpu_storage) || gpu_mesh {
            let offsets = std::mem::take(&mut self.stream_offsets);
            self.plan.constant_set(SetRole::StreamOffsets, offsets);
        }
        if self.vertex_bb || gpu_mesh {
            let sim_data = std::mem::take(&mut self.sim_data);
            self.plan.constant_set(SetRole::SimData, sim_data);
        }
        Ok(self.plan)
    }

    #[inline]
    fn has(&self, need: FeatureNeeds) -> bool {
        self.needs.contains(need)
    }

    fn define(&mut self, name: &str, stages: ShaderStageMask) {
        self.plan.define(ShaderDefine::new(name, stages));
    }

    /// One per-particle stream: a vertex attribute under geometry
    /// billboarding, a raw buffer (or its offset into GPU storage) under
    /// vertex billboarding.
    fn particle_stream(&mut self, attribute: &str, ty: ValueType, buffer: &str) {
        if self.geom_bb {
            self.plan.stream(attribute, ty, ty.size(), InputRate::PerVertex);
        } else if self.gpu_storage {
            self.stream_offsets.add_raw(format!("{buffer}Offsets"));
        } else {
            self.sim_data.add_raw(buffer);
        }
    }

    // ------------------------------------------------------------------------
    // Generated inputs
    // ------------------------------------------------------------------------

    fn generated_inputs(&mut self) -> Result<()> {
        let gpu_sort_camera = self.options.contains(ShaderOptions::GPU_SORT);
        let gpu_sort_ribbon = self.class == RendererClass::Ribbon && self.vertex_bb && self.gpu_storage;

        if self.vertex_bb {
            if self.gpu_storage {
                self.sim_data.add_raw("GPUSimData");
                self.define("BB_GPU_SIM", ShaderStageMask::VERTEX);
                self.stream_offsets.add_raw("EnabledsOffsets");
                self.stream_offsets.add_raw("PositionsOffsets");
                if gpu_sort_ribbon {
                    self.stream_offsets.add_raw("ParentIDsOffsets");
                }
                if gpu_sort_camera {
                    self.sim_data.add_raw("Indirection");
                }
                if gpu_sort_ribbon {
                    self.sim_data.add_raw("RibbonIndirection");
                    // Effective particle count lives in the indirect draw arguments.
                    self.sim_data.add_raw("IndirectDraw");
                }
            } else {
                self.sim_data.add_raw("Indices");
                match self.class {
                    RendererClass::Billboard => self.sim_data.add_raw("Positions"),
                    RendererClass::Triangle => {
                        for vertex in 0..3 {
                            self.sim_data.add_raw(format!("VertexPosition{vertex}"));
                        }
                    }
                    _ => {}
                }
            }
            if self.class != RendererClass::Triangle {
                self.plan.stream("TexCoords", ValueType::Float2, 8, InputRate::PerVertex);
            }
        } else {
            let float3 = self.class.is_instanced() || self.gpu_storage;
            self.plan.vertex_buffer(if float3 { 12 } else { 16 }, InputRate::PerVertex);
            self.plan.attribute("Position", ValueType::Float3);
            if self.geom_bb && !self.gpu_storage {
                self.plan.attribute_at("DrawRequestID", ValueType::Float, 12);
            }
        }
        Ok(())
    }

    fn feature_defines(&mut self) {
        let defines: Vec<String> = enabled_features(self.features)
            .map(|f| format!("HAS_{}", f.name))
            .collect();
        for name in defines {
            self.define(&name, ShaderStageMask::ALL_GRAPHICS);
        }
    }

    fn class_inputs(&mut self) -> Result<()> {
        let uv = self.has(FeatureNeeds::UV);
        let normal = self.has(FeatureNeeds::NORMAL);
        let tangent = self.has(FeatureNeeds::TANGENT);

        match self.class {
            RendererClass::Billboard => {
                if self.geom_bb || self.vertex_bb {
                    self.billboard_inputs(uv);
                } else {
                    self.common_inputs(uv, self.atlas, normal, tangent);
                }
            }
            RendererClass::Ribbon => {
                if self.vertex_bb {
                    self.define("BB_FeatureC0", ShaderStageMask::VERTEX);
                    self.stream_offsets.add_raw("SizesOffsets");
                    if self.options.contains(ShaderOptions::AXIS_C1) {
                        self.stream_offsets.add_raw("Axis0sOffsets");
                        self.define("BB_FeatureC1", ShaderStageMask::VERTEX);
                    }
                    if uv && self.atlas {
                        self.define("BB_Feature_Atlas", ShaderStageMask::VERTEX);
                    }
                    if self.custom_texture_u {
                        self.define("BB_Feature_CustomTextureU", ShaderStageMask::VERTEX);
                    }
                } else {
                    self.common_inputs(uv, self.atlas, normal, tangent);
                    if self.correct_deformation {
                        self.plan.stream("UVScaleAndOffset", ValueType::Float4, 16, InputRate::PerVertex);
                        self.plan.stream("UVFactors", ValueType::Float4, 16, InputRate::PerVertex);
                    }
                }
            }
            RendererClass::Mesh => self.mesh_inputs(uv, normal, tangent),
            RendererClass::Triangle => {
                if !self.vertex_bb {
                    self.common_inputs(uv, false, normal, tangent);
                }
            }
            RendererClass::Decal => {
                self.plan.stream("DecalTransform", ValueType::Float4x4, 64, InputRate::PerInstance);
                self.plan.stream("InverseDecalTransform", ValueType::Float4x4, 64, InputRate::PerInstance);
            }
            RendererClass::Light => {
                self.plan.stream("LightPosition", ValueType::Float3, 12, InputRate::PerInstance);
            }
            RendererClass::Sound => return Err(RhiError::UnsupportedRenderer(self.class.name())),
        }
        Ok(())
    }

    /// Geometry produced on the CPU: one stream per generated vertex channel.
    fn common_inputs(&mut self, uv: bool, atlas: bool, normal: bool, tangent: bool) {
        if normal {
            self.plan.stream("Normal", ValueType::Float3, 16, InputRate::PerVertex);
        }
        if tangent {
            self.plan.stream("Tangent", ValueType::Float4, 16, InputRate::PerVertex);
        }
        if uv {
            self.plan.stream("UV0", ValueType::Float2, 8, InputRate::PerVertex);
        }
        if atlas {
            self.plan.stream("UV1", ValueType::Float2, 8, InputRate::PerVertex);
            self.plan.stream("AtlasID", ValueType::Float, 4, InputRate::PerVertex);
        }
    }

    fn billboard_inputs(&mut self, uv: bool) {
        let stages = if self.geom_bb {
            ShaderStageMask::GEOMETRY
        } else {
            ShaderStageMask::VERTEX
        };
        let options = self.options;

        if options.contains(ShaderOptions::BILLBOARD_SIZE_FLOAT2) {
            self.define("HAS_SizeFloat2", stages);
            self.particle_stream("Size", ValueType::Float2, "Size2s");
        } else {
            self.particle_stream("Size", ValueType::Float, "Sizes");
        }

        let c1 = options.contains(ShaderOptions::AXIS_C1);
        let c2 = options.contains(ShaderOptions::AXIS_C2);
        if !c1 || c2 {
            self.particle_stream("Rotation", ValueType::Float, "Rotations");
        }
        if uv && self.atlas {
            self.define("BB_Feature_Atlas", stages);
        }
        self.define("BB_FeatureC0", stages);

        if c1 {
            self.particle_stream("Axis0", ValueType::Float3, "Axis0s");
            self.define("BB_FeatureC1", stages);
            if options.contains(ShaderOptions::CAPSULE) {
                self.define("BB_FeatureC1_Capsule", stages);
            }
        }
        if c2 {
            self.particle_stream("Axis1", ValueType::Float3, "Axis1s");
            self.define("BB_FeatureC2", stages);
        }

        if self.gpu_storage && self.geom_bb {
            self.plan.stream("Enabled", ValueType::Uint, 4, InputRate::PerVertex);
        }
    }

    fn mesh_inputs(&mut self, uv: bool, normal: bool, tangent: bool) {
        let uv1 = self.has(FeatureNeeds::UV1);

        if normal {
            self.plan.stream("Normal", ValueType::Float3, 12, InputRate::PerVertex);
        }
        if tangent {
            self.plan.stream("Tangent", ValueType::Float4, 16, InputRate::PerVertex);
        }
        if self.has(FeatureNeeds::VERTEX_COLOR0) {
            self.plan.stream("Color0", ValueType::Float4, 16, InputRate::PerVertex);
        }
        if uv {
            self.plan.stream("UV0", ValueType::Float2, 8, InputRate::PerVertex);
            if self.atlas {
                // Atlas rects reuse the UV1 slot; a mesh cannot have both.
                if !uv1 {
                    self.plan.stream("UV1", ValueType::Float2, 8, InputRate::PerVertex);
                }
                self.define("BB_Feature_Atlas", ShaderStageMask::VERTEX);
            }
        }
        if self.has(FeatureNeeds::VERTEX_COLOR1) {
            self.plan.stream("Color1", ValueType::Float4, 16, InputRate::PerVertex);
        }
        if uv1 {
            self.plan.stream("UV1", ValueType::Float2, 8, InputRate::PerVertex);
            self.define("MESH_USE_UV1", ShaderStageMask::VERTEX);
        }
        if self.has(FeatureNeeds::BONES) {
            self.plan.stream("BoneIds", ValueType::Float4, 16, InputRate::PerVertex);
            self.plan.stream("BoneWeights", ValueType::Float4, 16, InputRate::PerVertex);
        }

        if self.gpu_storage {
            self.sim_data.add_raw("GPUSimData");
            self.sim_data.add_raw("MeshTransforms");
            self.sim_data.add_raw("Indirection");
            self.stream_offsets.add_raw("MeshTransformsOffsets");
            self.stream_offsets.add_raw("IndirectionOffsets");
        } else {
            self.plan.stream("MeshTransform", ValueType::Float4x4, 64, InputRate::PerInstance);
        }
    }

    // ------------------------------------------------------------------------
    // Scene resources
    // ------------------------------------------------------------------------

    fn scene_resource_sets(&mut self) {
        if self.has(FeatureNeeds::SAMPLE_DEPTH) {
            self.plan.constant_set(SetRole::DepthSampler, layout::depth_sampler_layout());
            self.plan.require(NeededConstants::SAMPLE_DEPTH);
        }
        if self.has(FeatureNeeds::SAMPLE_NORMAL_ROUGH_METAL) {
            self.plan
                .constant_set(SetRole::NormalRoughMetalSampler, layout::normal_rough_metal_sampler_layout());
            self.plan.require(NeededConstants::SAMPLE_NORMAL_ROUGH_METAL);
        }
        if self.has(FeatureNeeds::SAMPLE_DIFFUSE) {
            self.plan.constant_set(SetRole::DiffuseSampler, layout::diffuse_sampler_layout());
            self.plan.require(NeededConstants::SAMPLE_DIFFUSE);
        }
        if self.has(FeatureNeeds::LIGHTING) {
            let lighting = LightingLayouts::new();
            self.plan.constant_set(SetRole::LightInfo, lighting.light_info);
            self.plan.constant_set(SetRole::ShadowsInfo, lighting.shadows_info);
            self.plan.constant_set(SetRole::BrdfLut, lighting.brdf_lut);
            self.plan.constant_set(SetRole::EnvironmentMap, lighting.environment_map);
            self.plan.require(NeededConstants::LIGHTING_INFO);
        }
        if self.atlas {
            self.plan.constant_set(SetRole::Atlas, layout::atlas_layout());
            self.plan.require(NeededConstants::ATLAS_INFO);
        }
        if self.opaque {
            self.plan.constant_set(SetRole::Dithering, layout::dithering_layout());
            self.plan.require(NeededConstants::DITHERING_PATTERN);
        }
    }

    // ------------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------------

    fn fields(&mut self) -> Result<()> {
        let gpu_mesh = self.options.contains(ShaderOptions::GPU_MESH);
        let rate = if self.class.is_instanced() {
            InputRate::PerInstance
        } else {
            InputRate::PerVertex
        };

        for field in self.fields {
            let name = sanitize_shader_name(&field.name);
            if name.is_empty() {
                return Err(RhiError::InvalidField("empty field name".to_owned()));
            }
            if field.ty == ValueType::Bool {
                continue;
            }
            // Custom triangle normals and UVs are only read by vertex billboarding.
            if names::TRIANGLE_CUSTOM_FIELDS.contains(&name.as_str()) && !self.vertex_bb {
                continue;
            }
            if name == names::MESH_LOD_FIELD {
                continue;
            }

            if self.vertex_bb {
                if self.gpu_storage {
                    self.stream_offsets.add_raw(format!("{name}sOffsets"));
                } else {
                    self.sim_data.add_raw(format!("{name}s"));
                }
            } else if gpu_mesh {
                self.stream_offsets.add_raw(format!("{name}sOffsets"));
            } else {
                self.plan.stream(name, field.ty, field.ty.size(), rate);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Draw requests
    // ------------------------------------------------------------------------

    fn draw_request_constants(&mut self) {
        if self.gpu_storage {
            self.plan.push_constant(layout::draw_request_push_constant(self.class));
        } else {
            self.plan
                .constant_set(SetRole::DrawRequests, layout::draw_requests_layout(self.class));
        }
        if self.vertex_bb {
            self.plan
                .push_constant(layout::vertex_billboarding_push_constant(self.gpu_storage));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{FeatureDesc, FeatureProperty};
    use crate::rhi::ConstantDesc;

    fn toggle(feature: FeatureDesc) -> ToggledFeature {
        ToggledFeature {
            feature,
            enabled: true,
        }
    }

    fn features() -> Vec<ToggledFeature> {
        vec![
            toggle(
                FeatureDesc::new(names::DIFFUSE)
                    .needs(FeatureNeeds::UV)
                    .property(FeatureProperty::texture("DiffuseMap")),
            ),
            toggle(FeatureDesc::new(names::ATLAS)),
        ]
    }

    fn set_names(compiled: &CompiledBindings) -> Vec<SetRole> {
        compiled.set_roles.clone()
    }

    #[test]
    fn test_sound_is_rejected() {
        let input = BindingInput::new(RendererClass::Sound, ShaderOptions::VERTEX_PASS_THROUGH, &[], &[]);
        assert!(matches!(build_plan(&input), Err(RhiError::UnsupportedRenderer("Sound"))));
    }

    #[test]
    fn test_cpu_billboard_inputs() {
        let features = features();
        let fields = [FieldDecl::new("Diffuse.Color", ValueType::Float4)];
        let input = BindingInput::new(
            RendererClass::Billboard,
            ShaderOptions::VERTEX_PASS_THROUGH,
            &features,
            &fields,
        );
        let compiled = build_bindings(&input).unwrap();
        let names: Vec<_> = compiled.bindings.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Position", "UV0", "UV1", "AtlasID", "Diffuse_Color"]);
        assert_eq!(compiled.bindings.vertex_buffers[0].stride, 16);
        assert_eq!(
            set_names(&compiled),
            vec![SetRole::Atlas, SetRole::SceneInfo, SetRole::Material]
        );
        assert_eq!(compiled.needed, NeededConstants::ATLAS_INFO);
        assert!(compiled.bindings.has_define("HAS_Atlas"));
        assert!(compiled.bindings.push_constants.is_empty());
    }

    #[test]
    fn test_geom_billboard_shares_position_buffer() {
        let features = features();
        let options = ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::GEOM_BILLBOARDING;
        let input = BindingInput::new(RendererClass::Billboard, options, &features, &[]);
        let compiled = build_bindings(&input).unwrap();

        let request = compiled.bindings.attribute("DrawRequestID").unwrap();
        assert_eq!((request.location, request.buffer_index, request.offset), (1, 0, 12));
        let size = compiled.bindings.attribute("Size").unwrap();
        assert_eq!((size.location, size.buffer_index), (2, 1));
        assert!(compiled.bindings.attribute("Rotation").is_some());
        assert!(compiled.bindings.has_define("BB_Feature_Atlas"));
        assert_eq!(compiled.set_roles.last(), Some(&SetRole::DrawRequests));
    }

    #[test]
    fn test_vertex_billboard_gpu_storage_sets_last() {
        let features = features();
        let fields = [FieldDecl::new("Diffuse.Color", ValueType::Float4)];
        let options = ShaderOptions::VERTEX_PASS_THROUGH
            | ShaderOptions::VERTEX_BILLBOARDING
            | ShaderOptions::GPU_STORAGE
            | ShaderOptions::GPU_SORT
            | ShaderOptions::AXIS_C1;
        let input = BindingInput::new(RendererClass::Billboard, options, &features, &fields);
        let compiled = build_bindings(&input).unwrap();

        let roles = &compiled.set_roles;
        assert_eq!(&roles[roles.len() - 2..], &[SetRole::StreamOffsets, SetRole::SimData]);

        let offsets = compiled.set_layout(SetRole::StreamOffsets).unwrap();
        let names: Vec<_> = offsets.constants.iter().map(ConstantDesc::name).collect();
        assert_eq!(
            names,
            vec!["EnabledsOffsets", "PositionsOffsets", "SizesOffsets", "Axis0sOffsets", "Diffuse_ColorsOffsets"]
        );
        let sim = compiled.set_layout(SetRole::SimData).unwrap();
        assert_eq!(sim.find("Indirection"), Some(1));

        assert_eq!(compiled.bindings.push_constants.len(), 2);
        assert_eq!(compiled.bindings.push_constants[1].name, "GPUBillboardPushConstants");
        assert_eq!(compiled.bindings.attributes.len(), 1);
    }

    #[test]
    fn test_ribbon_vertex_billboarding_requires_gpu_storage() {
        let options = ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::RIBBON_VERTEX_BILLBOARDING;
        let input = BindingInput::new(RendererClass::Ribbon, options, &[], &[]);
        assert!(matches!(build_plan(&input), Err(RhiError::UnsupportedCombination(_))));
    }

    #[test]
    fn test_mesh_instance_inputs() {
        let features = vec![toggle(
            FeatureDesc::new(names::LIT).needs(FeatureNeeds::NORMAL | FeatureNeeds::LIGHTING),
        )];
        let fields = [FieldDecl::new("Color", ValueType::Float4)];
        let input = BindingInput::new(RendererClass::Mesh, ShaderOptions::VERTEX_PASS_THROUGH, &features, &fields);
        let compiled = build_bindings(&input).unwrap();

        let transform = compiled.bindings.attribute("MeshTransform").unwrap();
        assert_eq!(transform.location, 2);
        let color = compiled.bindings.attribute("Color").unwrap();
        assert_eq!(color.location, 6);
        assert_eq!(
            compiled.bindings.vertex_buffers[color.buffer_index as usize].rate,
            InputRate::PerInstance
        );
        assert!(compiled.needed.contains(NeededConstants::LIGHTING_INFO));
        assert_eq!(compiled.set_index(SetRole::LightInfo), Some(0));
        assert_eq!(compiled.set_index(SetRole::EnvironmentMap), Some(3));
    }

    #[test]
    fn test_feature_fields_skip_generation_features() {
        let features = vec![
            toggle(FeatureDesc::new("Diffuse").field("Color", ValueType::Float4)),
            toggle(FeatureDesc::new("GeometryRibbon").field("Width", ValueType::Float)),
            toggle(FeatureDesc::new("Transparent").field("SortKey", ValueType::Float)),
        ];
        let fields = feature_fields(&features);
        assert_eq!(fields, vec![FieldDecl::new("Diffuse.Color", ValueType::Float4)]);
    }
}
