//! Shader Options
//!
//! Orthogonal axes of shader specialization. A renderer cache bakes one
//! render state per (options, pass) pair; draw calls pick theirs by exact
//! equality.
//!
//! Apart from the always-present [`ShaderOptions::VERTEX_PASS_THROUGH`] bit,
//! at most one billboarding-mode bit is set at a time.

use bitflags::bitflags;

use crate::rhi::{ShaderStage, StagePipeline};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct ShaderOptions: u32 {
        const VERTEX_PASS_THROUGH          = 1 << 0;
        /// Billboard expanded in the vertex stage.
        const VERTEX_BILLBOARDING          = 1 << 1;
        /// Billboard expanded in the geometry stage.
        const GEOM_BILLBOARDING            = 1 << 2;
        const TRIANGLE_VERTEX_BILLBOARDING = 1 << 3;
        const RIBBON_VERTEX_BILLBOARDING   = 1 << 4;
        /// Mesh instances laid out by compute shaders.
        const GPU_MESH                     = 1 << 5;
        /// One constraint axis.
        const AXIS_C1                      = 1 << 6;
        /// Two constraint axes, implies the first.
        const AXIS_C2                      = (1 << 7) | Self::AXIS_C1.bits();
        /// Capsule billboard, 6 vertices instead of 4.
        const CAPSULE                      = 1 << 8;
        const BILLBOARD_SIZE_FLOAT2        = 1 << 9;
        /// Particle data lives in GPU buffers (GPU simulation).
        const GPU_STORAGE                  = 1 << 10;
        /// Draw order comes from a compute sort.
        const GPU_SORT                     = 1 << 11;

        const ANY_VERTEX_BILLBOARDING = Self::VERTEX_BILLBOARDING.bits()
            | Self::TRIANGLE_VERTEX_BILLBOARDING.bits()
            | Self::RIBBON_VERTEX_BILLBOARDING.bits();
    }
}

/// Per-stage name fragment of one option, `None` when the stage ignores it.
struct OptionName {
    option: ShaderOptions,
    vertex: Option<&'static str>,
    geometry: Option<&'static str>,
    fragment: Option<&'static str>,
}

const OPTION_NAMES: [OptionName; 12] = [
    OptionName { option: ShaderOptions::VERTEX_PASS_THROUGH, vertex: Some("Fwd"), geometry: None, fragment: None },
    OptionName { option: ShaderOptions::GEOM_BILLBOARDING, vertex: Some("Geom"), geometry: Some("Geom"), fragment: Some("Geom") },
    OptionName { option: ShaderOptions::VERTEX_BILLBOARDING, vertex: Some("Vertex"), geometry: None, fragment: Some("Vertex") },
    OptionName { option: ShaderOptions::AXIS_C1, vertex: Some("C1"), geometry: Some("C1"), fragment: Some("C1") },
    OptionName { option: ShaderOptions::AXIS_C2, vertex: Some("C2"), geometry: Some("C2"), fragment: Some("C2") },
    OptionName { option: ShaderOptions::CAPSULE, vertex: Some("Caps"), geometry: Some("Caps"), fragment: None },
    OptionName { option: ShaderOptions::BILLBOARD_SIZE_FLOAT2, vertex: Some("Size2"), geometry: Some("Size2"), fragment: None },
    OptionName { option: ShaderOptions::TRIANGLE_VERTEX_BILLBOARDING, vertex: Some("Tri"), geometry: None, fragment: Some("VB") },
    OptionName { option: ShaderOptions::RIBBON_VERTEX_BILLBOARDING, vertex: Some("Ribbon"), geometry: None, fragment: Some("VB") },
    OptionName { option: ShaderOptions::GPU_STORAGE, vertex: Some("GPU"), geometry: Some("GPU"), fragment: Some("GPU") },
    OptionName { option: ShaderOptions::GPU_MESH, vertex: Some("GPUMesh"), geometry: None, fragment: Some("GPUMesh") },
    OptionName { option: ShaderOptions::GPU_SORT, vertex: Some("GPUSort"), geometry: None, fragment: Some("GPUSort") },
];

impl ShaderOptions {
    /// Any of the vertex, triangle or ribbon vertex-billboarding modes.
    #[inline]
    #[must_use]
    pub const fn vertex_billboarding(self) -> bool {
        self.intersects(Self::ANY_VERTEX_BILLBOARDING)
    }

    #[inline]
    #[must_use]
    pub const fn geom_billboarding(self) -> bool {
        self.contains(Self::GEOM_BILLBOARDING)
    }

    /// GPU-simulated storage; GPU meshes read their instances from GPU buffers too.
    #[inline]
    #[must_use]
    pub const fn gpu_storage(self) -> bool {
        self.intersects(Self::GPU_STORAGE.union(Self::GPU_MESH))
    }

    #[must_use]
    pub const fn stage_pipeline(self) -> StagePipeline {
        if self.contains(Self::GEOM_BILLBOARDING) {
            StagePipeline::VertexGeometryFragment
        } else {
            StagePipeline::VertexFragment
        }
    }

    /// Permutation name of one stage, fragments joined with `_`.
    ///
    /// A table row matches when all of its bits are set, so the two-axis
    /// row also matches the single-axis one.
    #[must_use]
    pub fn shader_name(self, stage: ShaderStage) -> String {
        let parts: Vec<&str> = OPTION_NAMES
            .iter()
            .filter(|row| self.contains(row.option))
            .filter_map(|row| match stage {
                ShaderStage::Vertex => row.vertex,
                ShaderStage::Geometry => row.geometry,
                ShaderStage::Fragment => row.fragment,
                ShaderStage::Compute => None,
            })
            .collect();

        if parts.is_empty() {
            "User".to_owned()
        } else {
            parts.join("_")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_c2_implies_c1() {
        assert!(ShaderOptions::AXIS_C2.contains(ShaderOptions::AXIS_C1));
        assert_eq!(ShaderOptions::AXIS_C2.bits(), 0xC0);
    }

    #[test]
    fn test_predicates() {
        let vb = ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::RIBBON_VERTEX_BILLBOARDING;
        assert!(vb.vertex_billboarding());
        assert!(!vb.gpu_storage());
        assert!((ShaderOptions::VERTEX_PASS_THROUGH | ShaderOptions::GPU_MESH).gpu_storage());
        assert_eq!(
            ShaderOptions::GEOM_BILLBOARDING.stage_pipeline(),
            StagePipeline::VertexGeometryFragment
        );
        assert_eq!(vb.stage_pipeline(), StagePipeline::VertexFragment);
    }

    #[test]
    fn test_shader_name() {
        let opts = ShaderOptions::VERTEX_PASS_THROUGH
            | ShaderOptions::GEOM_BILLBOARDING
            | ShaderOptions::AXIS_C1
            | ShaderOptions::CAPSULE;
        assert_eq!(opts.shader_name(ShaderStage::Vertex), "Fwd_Geom_C1_Caps");
        assert_eq!(opts.shader_name(ShaderStage::Geometry), "Geom_C1_Caps");
        assert_eq!(opts.shader_name(ShaderStage::Fragment), "Geom_C1");

        let two_axes = ShaderOptions::GEOM_BILLBOARDING | ShaderOptions::AXIS_C2;
        assert_eq!(two_axes.shader_name(ShaderStage::Geometry), "Geom_C1_C2");
    }

    #[test]
    fn test_shader_name_defaults_to_user() {
        assert_eq!(ShaderOptions::empty().shader_name(ShaderStage::Vertex), "User");
        assert_eq!(
            ShaderOptions::VERTEX_PASS_THROUGH.shader_name(ShaderStage::Fragment),
            "User"
        );
    }
}
