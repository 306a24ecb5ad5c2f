//! Offline Permutation Enumeration
//!
//! Lists every shader file a material or renderer needs precompiled, with
//! the same hashed paths the runtime looks up. Two entry points:
//!
//! | Constructor | Features | Fields | Options |
//! |---|---|---|---|
//! | [`OfflineCompileArgs::from_renderer`] | the renderer's toggles | the renderer's fields | derived from billboarding mode and size2 |
//! | [`OfflineCompileArgs::from_material`] | one combination of optional features | streamed by the enabled features | the family tables below |
//!
//! Option tables per family (every entry carries `VERTEX_PASS_THROUGH`):
//!
//! | Family | Entries |
//! |---|---|
//! | regular | pass-through |
//! | geometry BB | 4 geoms × {size, size2} (× GPU storage) |
//! | vertex BB | 4 geoms × {size, size2} (× {GPU storage, GPU storage + sort}) |
//! | triangle VB | triangle billboarding |
//! | GPU mesh | GPU mesh |
//! | ribbon VB | GPU storage × {viewpos, axis} (× sort) |

use rustc_hash::FxHashSet;

use crate::binding::{
    BindingInput, CompiledBindings, ComputeShaderType, ParticlePass, PassList, ShaderOptions,
    build_bindings, feature_fields, find_render_passes,
};
use crate::cache::registered_permutations;
use crate::errors::{Result, RhiError};
use crate::hash::{ShaderPermutation, compute_shader_file, remap_shader_path};
use crate::material::{
    BillboardMode, FieldDecl, MaterialSettings, RendererClass, RendererDescriptor, ToggledFeature,
    is_enabled,
};
use crate::rhi::{GpuCaps, GraphicsApi, ShaderDefine, ShaderStage, ShaderStageMask};

// ============================================================================
// Option tables
// ============================================================================

const PASS_THROUGH: ShaderOptions = ShaderOptions::VERTEX_PASS_THROUGH;

/// The four billboard geometries on top of a billboarding bit.
const fn geoms(billboarding: ShaderOptions) -> [ShaderOptions; 4] {
    let base = PASS_THROUGH.union(billboarding);
    [
        base,
        base.union(ShaderOptions::AXIS_C1),
        base.union(ShaderOptions::AXIS_C1).union(ShaderOptions::CAPSULE),
        base.union(ShaderOptions::AXIS_C2),
    ]
}

/// `geoms` without and with `BILLBOARD_SIZE_FLOAT2`.
fn sized_geoms(billboarding: ShaderOptions) -> Vec<ShaderOptions> {
    let base = geoms(billboarding);
    base.iter()
        .copied()
        .chain(base.iter().map(|&o| o | ShaderOptions::BILLBOARD_SIZE_FLOAT2))
        .collect()
}

fn with_flags(options: &[ShaderOptions], flags: ShaderOptions) -> impl Iterator<Item = ShaderOptions> + '_ {
    options.iter().map(move |&o| o | flags)
}

#[must_use]
pub fn regular_options() -> Vec<ShaderOptions> {
    vec![PASS_THROUGH]
}

#[must_use]
pub fn geom_billboarding_options(gpu: bool) -> Vec<ShaderOptions> {
    let sized = sized_geoms(ShaderOptions::GEOM_BILLBOARDING);
    let mut options = vec![PASS_THROUGH];
    options.extend_from_slice(&sized);
    if gpu {
        options.extend(with_flags(&sized, ShaderOptions::GPU_STORAGE));
    }
    options
}

#[must_use]
pub fn vertex_billboarding_options(gpu: bool) -> Vec<ShaderOptions> {
    let sized = sized_geoms(ShaderOptions::VERTEX_BILLBOARDING);
    let mut options = vec![PASS_THROUGH];
    options.extend_from_slice(&sized);
    if gpu {
        options.extend(with_flags(&sized, ShaderOptions::GPU_STORAGE));
        options.extend(with_flags(&sized, ShaderOptions::GPU_STORAGE | ShaderOptions::GPU_SORT));
    }
    options
}

#[must_use]
pub fn triangle_billboarding_options() -> Vec<ShaderOptions> {
    vec![PASS_THROUGH, PASS_THROUGH | ShaderOptions::TRIANGLE_VERTEX_BILLBOARDING]
}

#[must_use]
pub fn gpu_mesh_options() -> Vec<ShaderOptions> {
    vec![PASS_THROUGH, PASS_THROUGH | ShaderOptions::GPU_MESH]
}

#[must_use]
pub fn ribbon_billboarding_options(gpu: bool) -> Vec<ShaderOptions> {
    let mut options = vec![PASS_THROUGH];
    if gpu {
        let storage = PASS_THROUGH | ShaderOptions::GPU_STORAGE;
        let ribbon = storage | ShaderOptions::RIBBON_VERTEX_BILLBOARDING;
        options.extend([
            storage,
            ribbon,
            ribbon | ShaderOptions::AXIS_C1,
            ribbon | ShaderOptions::GPU_SORT,
            ribbon | ShaderOptions::AXIS_C1 | ShaderOptions::GPU_SORT,
        ]);
    }
    options
}

// ============================================================================
// Compile arguments
// ============================================================================

/// One shader file the offline compiler must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineShaderFile {
    /// Source shader; empty for generated stages.
    pub source_path: String,
    /// Hashed output path, with the API extension.
    pub output_path: String,
    /// Readable permutation string the output path hashes.
    pub permutation: String,
    pub stage: ShaderStage,
    pub options: ShaderOptions,
    pub pass: ParticlePass,
    pub api: GraphicsApi,
}

/// Everything the offline compiler needs for one renderer or one feature
/// combination of a material.
#[derive(Debug, Clone)]
pub struct OfflineCompileArgs {
    pub class: RendererClass,
    pub material: MaterialSettings,
    pub features: Vec<ToggledFeature>,
    pub fields: Vec<FieldDecl>,
    pub passes: PassList,
    /// When non-empty, replaces the family tables.
    pub options_override: Vec<ShaderOptions>,
    pub shader_root: String,
    pub caps: GpuCaps,
    /// Whether `fields` follow the enabled features.
    fields_from_features: bool,
}

impl OfflineCompileArgs {
    /// Arguments of one concrete renderer.
    pub fn from_renderer(renderer: &RendererDescriptor, shader_root: impl Into<String>, caps: GpuCaps) -> Result<Self> {
        if renderer.class == RendererClass::Sound {
            return Err(RhiError::UnsupportedRenderer(renderer.class.name()));
        }
        let options_override = renderer_options(renderer, caps);
        let args = Self {
            class: renderer.class,
            material: renderer.material.clone(),
            features: renderer.toggled_features(),
            fields: renderer.fields.clone(),
            passes: find_render_passes(renderer.class, |name| renderer.has_feature(name)),
            options_override,
            shader_root: shader_root.into(),
            caps,
            fields_from_features: false,
        };
        log::debug!(
            "Offline args for {} renderer of '{}': {} option(s), {} pass(es)",
            renderer.class.name(),
            args.material.material_name,
            args.options_override.len(),
            args.passes.len()
        );
        Ok(args)
    }

    /// Arguments of a material with every optional feature off; walk the
    /// others with [`set_feature_combination`](Self::set_feature_combination).
    pub fn from_material(
        class: RendererClass,
        material: MaterialSettings,
        shader_root: impl Into<String>,
        caps: GpuCaps,
    ) -> Result<Self> {
        if class == RendererClass::Sound {
            return Err(RhiError::UnsupportedRenderer(class.name()));
        }
        let features = material.default_toggles();
        let mut args = Self {
            class,
            material,
            features,
            fields: Vec::new(),
            passes: PassList::new(),
            options_override: Vec::new(),
            shader_root: shader_root.into(),
            caps,
            fields_from_features: true,
        };
        args.refresh();
        Ok(args)
    }

    fn refresh(&mut self) {
        if self.fields_from_features {
            self.fields = feature_fields(&self.features);
        }
        self.passes = find_render_passes(self.class, |name| is_enabled(&self.features, name));
    }

    /// Number of optional features of the material.
    #[must_use]
    pub fn optional_feature_count(&self) -> u32 {
        self.features.iter().filter(|t| !t.feature.mandatory).count() as u32
    }

    /// Number of distinct feature combinations, `2^optional`.
    #[must_use]
    pub fn combination_count(&self) -> u64 {
        1u64.checked_shl(self.optional_feature_count()).unwrap_or(u64::MAX)
    }

    /// Enables optional feature `i` (in declaration order) when bit `i` of
    /// `combination` is set, then recomputes fields and passes.
    pub fn set_feature_combination(&mut self, combination: u64) {
        let mut bit = 0u32;
        for toggle in &mut self.features {
            if toggle.feature.mandatory {
                toggle.enabled = true;
                continue;
            }
            toggle.enabled = combination.checked_shr(bit).is_some_and(|c| c & 1 != 0);
            bit += 1;
        }
        self.refresh();
    }

    /// Options enumerated for this renderer class, in table order.
    #[must_use]
    pub fn shader_options(&self) -> Vec<ShaderOptions> {
        if !self.options_override.is_empty() {
            return self.options_override.clone();
        }
        let gpu = self.caps.supports_gpu_particles;
        let mut options = Vec::new();
        match self.class {
            RendererClass::Billboard => {
                if self.caps.supports_geometry_shaders {
                    options.extend(geom_billboarding_options(gpu));
                }
                if self.caps.supports_shader_resource_views {
                    options.extend(vertex_billboarding_options(gpu));
                }
            }
            RendererClass::Triangle if self.caps.supports_shader_resource_views => {
                options.extend(triangle_billboarding_options());
            }
            RendererClass::Mesh => options.extend(gpu_mesh_options()),
            RendererClass::Ribbon => options.extend(ribbon_billboarding_options(gpu)),
            _ => {}
        }
        options.extend(regular_options());
        options
    }

    /// Bindings of one option, identical to what the runtime builds for the
    /// same features and fields.
    pub fn bindings(&self, options: ShaderOptions) -> Result<CompiledBindings> {
        build_bindings(&BindingInput::new(self.class, options, &self.features, &self.fields))
    }

    /// Defines of one (option, pass) compilation: the binding defines
    /// followed by the pass name.
    pub fn shader_defines(&self, options: ShaderOptions, pass: ParticlePass) -> Result<Vec<ShaderDefine>> {
        let mut defines = self.bindings(options)?.bindings.defines;
        defines.push(ShaderDefine::new(pass.name(), ShaderStageMask::ALL_GRAPHICS));
        Ok(defines)
    }

    fn source_path(&self, stage: ShaderStage) -> String {
        match stage {
            ShaderStage::Fragment => self.material.fragment_path(),
            _ => self.material.vertex_shader_path.clone(),
        }
    }

    /// Every graphics shader file for `api`, once per hashed path.
    ///
    /// Options needing a geometry stage are skipped on APIs without one.
    #[must_use]
    pub fn shader_files(&self, api: GraphicsApi) -> Vec<OfflineShaderFile> {
        let options = self.shader_options();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut files = Vec::new();

        for &pass in &self.passes {
            for &option in &options {
                let stages = option.stage_pipeline().stages();
                if stages.contains(&ShaderStage::Geometry) && !api.has_geometry_stage() {
                    continue;
                }
                for &stage in stages {
                    let source_path = self.source_path(stage);
                    let permutation = ShaderPermutation {
                        source_path: &source_path,
                        material: &self.material.material_name,
                        stage,
                        class: self.class,
                        options: option,
                        features: &self.features,
                        pass,
                    };
                    let path = remap_shader_path(&self.shader_root, &permutation);
                    if !seen.insert(path.clone()) {
                        continue;
                    }
                    files.push(OfflineShaderFile {
                        output_path: format!("{path}{}", api.shader_extension()),
                        permutation: permutation.name(),
                        source_path,
                        stage,
                        options: option,
                        pass,
                        api,
                    });
                }
            }
        }
        log::debug!(
            "'{}': {} shader file(s) for {api:?}",
            self.material.material_name,
            files.len()
        );
        files
    }

    /// Compute shaders the renderer's GPU simulation needs, for `api`.
    pub fn compute_shader_files(&self, api: GraphicsApi) -> Result<Vec<(ComputeShaderType, String)>> {
        let (_, computes) = registered_permutations(self.class, self.caps);
        let mut seen = FxHashSet::default();
        computes
            .into_iter()
            .filter(|ty| seen.insert(*ty))
            .map(|ty| Ok((ty, compute_shader_file(&self.shader_root, ty, api)?)))
            .collect()
    }
}

/// Options of a concrete renderer, from its billboarding mode and size2.
fn renderer_options(renderer: &RendererDescriptor, caps: GpuCaps) -> Vec<ShaderOptions> {
    let gpu = caps.supports_gpu_particles;
    let mut options = vec![PASS_THROUGH];
    match renderer.class {
        RendererClass::Billboard => {
            let mut shape = match renderer.billboard_mode() {
                BillboardMode::ScreenAligned | BillboardMode::ViewposAligned => ShaderOptions::empty(),
                BillboardMode::AxisAligned | BillboardMode::AxisAlignedSpheroid => ShaderOptions::AXIS_C1,
                BillboardMode::AxisAlignedCapsule => ShaderOptions::AXIS_C1 | ShaderOptions::CAPSULE,
                BillboardMode::PlaneAligned => ShaderOptions::AXIS_C2,
            };
            if renderer.size2_enabled() {
                shape |= ShaderOptions::BILLBOARD_SIZE_FLOAT2;
            }
            if caps.supports_geometry_shaders {
                let geom = PASS_THROUGH | ShaderOptions::GEOM_BILLBOARDING | shape;
                options.push(geom);
                if gpu {
                    options.push(geom | ShaderOptions::GPU_STORAGE);
                }
            }
            if caps.supports_shader_resource_views {
                let vertex = PASS_THROUGH | ShaderOptions::VERTEX_BILLBOARDING | shape;
                options.push(vertex);
                if gpu {
                    options.push(vertex | ShaderOptions::GPU_STORAGE);
                    options.push(vertex | ShaderOptions::GPU_STORAGE | ShaderOptions::GPU_SORT);
                }
            }
        }
        RendererClass::Triangle => options.push(PASS_THROUGH | ShaderOptions::TRIANGLE_VERTEX_BILLBOARDING),
        RendererClass::Mesh => options.push(PASS_THROUGH | ShaderOptions::GPU_MESH),
        RendererClass::Ribbon if gpu => {
            let mut ribbon = PASS_THROUGH | ShaderOptions::RIBBON_VERTEX_BILLBOARDING | ShaderOptions::GPU_STORAGE;
            if renderer.ribbon_mode().has_axis() {
                ribbon |= ShaderOptions::AXIS_C1;
            }
            options.push(ribbon);
            options.push(ribbon | ShaderOptions::GPU_SORT);
        }
        _ => {}
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{FeatureDesc, PropertyValue, names};

    fn material() -> MaterialSettings {
        MaterialSettings {
            material_name: "Billboard_Default".to_owned(),
            vertex_shader_path: String::new(),
            fragment_shader_path: "Shaders/Default.frag".to_owned(),
            features: vec![
                FeatureDesc::new(names::DIFFUSE).mandatory(),
                FeatureDesc::new(names::TRANSPARENT).mandatory(),
                FeatureDesc::new(names::ATLAS),
                FeatureDesc::new(names::EMISSIVE),
            ],
        }
    }

    fn all_caps() -> GpuCaps {
        GpuCaps {
            supports_geometry_shaders: true,
            supports_shader_resource_views: true,
            supports_gpu_particles: true,
            graphics_api: GraphicsApi::Vulkan,
        }
    }

    #[test]
    fn test_family_table_sizes() {
        assert_eq!(geom_billboarding_options(false).len(), 9);
        assert_eq!(geom_billboarding_options(true).len(), 17);
        assert_eq!(vertex_billboarding_options(false).len(), 9);
        assert_eq!(vertex_billboarding_options(true).len(), 25);
        assert_eq!(ribbon_billboarding_options(false), [PASS_THROUGH]);
        assert_eq!(ribbon_billboarding_options(true).len(), 6);
        for option in vertex_billboarding_options(true) {
            assert!(option.contains(PASS_THROUGH));
        }
    }

    #[test]
    fn test_feature_combinations_toggle_optional_features() {
        let mut args =
            OfflineCompileArgs::from_material(RendererClass::Billboard, material(), "Shaders/Generated", all_caps())
                .unwrap();
        assert_eq!(args.combination_count(), 4);
        assert!(!is_enabled(&args.features, names::ATLAS));

        args.set_feature_combination(0b10);
        assert!(is_enabled(&args.features, names::DIFFUSE));
        assert!(!is_enabled(&args.features, names::ATLAS));
        assert!(is_enabled(&args.features, names::EMISSIVE));
    }

    #[test]
    fn test_geometry_stages_skipped_without_geometry_api() {
        let args =
            OfflineCompileArgs::from_material(RendererClass::Billboard, material(), "Shaders/Generated", all_caps())
                .unwrap();
        let vulkan = args.shader_files(GraphicsApi::Vulkan);
        let metal = args.shader_files(GraphicsApi::Metal);
        assert!(vulkan.iter().any(|f| f.stage == ShaderStage::Geometry));
        assert!(metal.iter().all(|f| f.stage != ShaderStage::Geometry));
        assert!(metal.len() < vulkan.len());
        assert!(metal.iter().all(|f| f.output_path.ends_with(".metal")));
    }

    #[test]
    fn test_shader_files_are_unique() {
        let args =
            OfflineCompileArgs::from_material(RendererClass::Billboard, material(), "Shaders/Generated", all_caps())
                .unwrap();
        let files = args.shader_files(GraphicsApi::Vulkan);
        let unique: FxHashSet<&str> = files.iter().map(|f| f.output_path.as_str()).collect();
        assert_eq!(unique.len(), files.len());
    }

    #[test]
    fn test_renderer_options_follow_billboarding_mode() {
        let renderer = RendererDescriptor::new(RendererClass::Billboard, material())
            .with_property(names::BILLBOARDING_MODE, PropertyValue::Int(4))
            .with_property(names::ENABLE_SIZE2, PropertyValue::Bool(true));
        let caps = GpuCaps::default();
        let args = OfflineCompileArgs::from_renderer(&renderer, "Shaders/Generated", caps).unwrap();
        let expected = PASS_THROUGH
            | ShaderOptions::VERTEX_BILLBOARDING
            | ShaderOptions::AXIS_C1
            | ShaderOptions::CAPSULE
            | ShaderOptions::BILLBOARD_SIZE_FLOAT2;
        assert_eq!(args.shader_options(), [PASS_THROUGH, expected]);
    }

    #[test]
    fn test_sound_is_rejected() {
        assert!(OfflineCompileArgs::from_material(RendererClass::Sound, material(), "Shaders", all_caps()).is_err());
    }
}
