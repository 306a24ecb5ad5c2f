//! Compute Shader Bindings
//!
//! GPU-mesh instancing and GPU sorting run fixed compute shaders. Each
//! [`ComputeShaderType`] maps to a source file and to a binding plan: one
//! compute-only set of raw buffers (inputs read-only, outputs writable) plus
//! an `Info` push constant.

use crate::binding::layout;
use crate::binding::plan::{BindingPlan, CompiledBindings, SetRole};
use crate::errors::Result;
use crate::rhi::{ConstantBufferDesc, ConstantSetLayout, PushConstantDesc, ShaderDefine, ShaderStageMask, ValueType};

/// Threads per group of every particle compute shader.
pub const THREADGROUP_SIZE: u32 = 128;

/// Keys handled by one thread of the radix sort.
pub const SORT_KEYS_PER_THREAD: u32 = 24;

/// Upper bound on mesh LODs.
pub const MAX_LOD_COUNT: u32 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComputeShaderType {
    CountPerMesh,
    CountPerMeshMeshAtlas,
    CountPerMeshLod,
    CountPerMeshLodMeshAtlas,
    InitIndirectionOffsets,
    InitIndirectionOffsetsLodNoAtlas,
    MeshIndirection,
    MeshIndirectionMeshAtlas,
    MeshIndirectionLod,
    MeshIndirectionLodMeshAtlas,
    MeshMatrices,
    SortKeys,
    SortKeysCameraDistance,
    SortKeysRibbonIndirection,
    SortKeysCameraDistanceRibbonIndirection,
    SortUpSweep,
    SortPrefixSum,
    SortDownSweep,
    SortUpSweepKeyStride64,
    SortDownSweepKeyStride64,
    RibbonSortKeys,
}

impl ComputeShaderType {
    pub const ALL: [Self; 21] = [
        Self::CountPerMesh,
        Self::CountPerMeshMeshAtlas,
        Self::CountPerMeshLod,
        Self::CountPerMeshLodMeshAtlas,
        Self::InitIndirectionOffsets,
        Self::InitIndirectionOffsetsLodNoAtlas,
        Self::MeshIndirection,
        Self::MeshIndirectionMeshAtlas,
        Self::MeshIndirectionLod,
        Self::MeshIndirectionLodMeshAtlas,
        Self::MeshMatrices,
        Self::SortKeys,
        Self::SortKeysCameraDistance,
        Self::SortKeysRibbonIndirection,
        Self::SortKeysCameraDistanceRibbonIndirection,
        Self::SortUpSweep,
        Self::SortPrefixSum,
        Self::SortDownSweep,
        Self::SortUpSweepKeyStride64,
        Self::SortDownSweepKeyStride64,
        Self::RibbonSortKeys,
    ];

    /// Shader source file.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::CountPerMesh
            | Self::CountPerMeshMeshAtlas
            | Self::CountPerMeshLod
            | Self::CountPerMeshLodMeshAtlas => "ComputeParticleCountPerMesh.comp",
            Self::InitIndirectionOffsets | Self::InitIndirectionOffsetsLodNoAtlas => {
                "InitIndirectionOffsetsBuffer.comp"
            }
            Self::MeshIndirection
            | Self::MeshIndirectionMeshAtlas
            | Self::MeshIndirectionLod
            | Self::MeshIndirectionLodMeshAtlas => "ComputeMeshIndirectionBuffer.comp",
            Self::MeshMatrices => "ComputeMeshMatrices.comp",
            Self::SortKeys
            | Self::SortKeysCameraDistance
            | Self::SortKeysRibbonIndirection
            | Self::SortKeysCameraDistanceRibbonIndirection => "ComputeSortKeys.comp",
            Self::SortUpSweep | Self::SortUpSweepKeyStride64 => "SortUpSweep.comp",
            Self::SortPrefixSum => "SortPrefixSum.comp",
            Self::SortDownSweep | Self::SortDownSweepKeyStride64 => "SortDownSweep.comp",
            Self::RibbonSortKeys => "ComputeRibbonSortKeys.comp",
        }
    }

    /// File stem, used to name the compiled permutation.
    #[must_use]
    pub fn stem(self) -> &'static str {
        let file = self.file_name();
        file.strip_suffix(".comp").unwrap_or(file)
    }

    /// The stages every GPU sort runs after its key generation pass.
    pub const SORT_PASSES: [Self; 3] = [Self::SortUpSweep, Self::SortPrefixSum, Self::SortDownSweep];

    pub fn bindings(self) -> Result<CompiledBindings> {
        self.plan().fold()
    }

    /// Ordered bindings of this compute shader.
    #[must_use]
    pub fn plan(self) -> BindingPlan {
        let mut plan = BindingPlan::new();
        let mut set = ConstantSetLayout::new(ShaderStageMask::COMPUTE);
        let mut info = PushConstantDesc::new("Info", ShaderStageMask::COMPUTE);

        match self {
            Self::CountPerMesh
            | Self::CountPerMeshMeshAtlas
            | Self::CountPerMeshLod
            | Self::CountPerMeshLodMeshAtlas
            | Self::MeshIndirection
            | Self::MeshIndirectionMeshAtlas
            | Self::MeshIndirectionLod
            | Self::MeshIndirectionLodMeshAtlas => {
                let mesh_ids = matches!(
                    self,
                    Self::CountPerMeshMeshAtlas
                        | Self::CountPerMeshLodMeshAtlas
                        | Self::MeshIndirectionMeshAtlas
                        | Self::MeshIndirectionLodMeshAtlas
                );
                let lods = matches!(
                    self,
                    Self::CountPerMeshLod
                        | Self::CountPerMeshLodMeshAtlas
                        | Self::MeshIndirectionLod
                        | Self::MeshIndirectionLodMeshAtlas
                );
                let indirection = matches!(
                    self,
                    Self::MeshIndirection
                        | Self::MeshIndirectionMeshAtlas
                        | Self::MeshIndirectionLod
                        | Self::MeshIndirectionLodMeshAtlas
                );

                set = set.raw("StreamInfo").raw("GPUSimData");
                if indirection {
                    set = set.raw("EnabledOffsets").raw_rw("OutIndirection").raw_rw("IndirectionOffsets");
                } else {
                    set = set.raw("EnabledsOffsets").raw_rw("OutIndirect");
                }
                if mesh_ids {
                    set.add_raw("MeshIDsOffsets");
                }
                let mut lod_constants = ConstantBufferDesc::new("LODConstants").with_array(
                    "PerLODMeshCount",
                    ValueType::Uint,
                    MAX_LOD_COUNT,
                );
                if lods {
                    set.add_raw("LODsOffsets");
                    // Last slot holds the total mesh count.
                    lod_constants.add("LODMeshOffsets", ValueType::Uint, MAX_LOD_COUNT + 1);
                }
                set = set.buffer(lod_constants);

                info = info.with("DrawRequest", ValueType::Uint).with("MeshCount", ValueType::Uint);
                if lods {
                    info = info.with("LODCount", ValueType::Uint);
                    plan.define(ShaderDefine::new("HAS_LODS", ShaderStageMask::COMPUTE));
                }
                if mesh_ids {
                    plan.define(ShaderDefine::new("HAS_MESHIDS", ShaderStageMask::COMPUTE));
                }
            }
            Self::InitIndirectionOffsets | Self::InitIndirectionOffsetsLodNoAtlas => {
                set = set.raw("IndirectBuffer").raw_rw("OutIndirectionOffsets");
                if self == Self::InitIndirectionOffsetsLodNoAtlas {
                    set = set.buffer(
                        ConstantBufferDesc::new("LODConstants")
                            .with_array("PerLODMeshCount", ValueType::Uint, MAX_LOD_COUNT)
                            .with_array("LODMeshOffsets", ValueType::Uint, MAX_LOD_COUNT + 1),
                    );
                    plan.define(ShaderDefine::new("HAS_LODSNOATLAS", ShaderStageMask::COMPUTE));
                }
                info = info.with("DrawCallCount", ValueType::Uint);
            }
            Self::MeshMatrices => {
                set = set
                    .raw("StreamInfo")
                    .raw("GPUSimData")
                    .raw("PositionsOffsets")
                    .raw("ScalesOffsets")
                    .raw("OrientationsOffsets")
                    .raw("MatricesOffsets")
                    .raw_rw("OutMatrices");
                info = info.with("DrawRequest", ValueType::Uint);
            }
            Self::SortKeys
            | Self::SortKeysCameraDistance
            | Self::SortKeysRibbonIndirection
            | Self::SortKeysCameraDistanceRibbonIndirection => {
                let camera = matches!(
                    self,
                    Self::SortKeysCameraDistance | Self::SortKeysCameraDistanceRibbonIndirection
                );
                let ribbon = matches!(
                    self,
                    Self::SortKeysRibbonIndirection | Self::SortKeysCameraDistanceRibbonIndirection
                );
                if camera {
                    plan.constant_set(SetRole::SceneInfo, layout::scene_info_layout());
                    plan.define(ShaderDefine::new("SORT_BY_CAMERA_DISTANCE", ShaderStageMask::COMPUTE));
                }
                if ribbon {
                    plan.define(ShaderDefine::new("HAS_RIBBON_INDIRECTION", ShaderStageMask::COMPUTE));
                }
                set = set
                    .raw("StreamInfo")
                    .raw("GPUSimData")
                    .raw(if camera { "PositionsOffsets" } else { "CustomSortKeysOffsets" });
                if ribbon {
                    set = set.raw("RibbonIndirection").raw("IndirectDraw");
                }
                set = set.raw_rw("OutSortKeys").raw_rw("OutIndirection");
                info = info.with("DrawRequest", ValueType::Uint);
            }
            Self::SortUpSweep | Self::SortUpSweepKeyStride64 => {
                set = set.raw("InIndirection").raw("InKeys").raw_rw("OutCounts");
                info = info.with("CurrentBit", ValueType::Uint);
                sort_defines(&mut plan, self == Self::SortUpSweepKeyStride64);
            }
            Self::SortPrefixSum => {
                set = set.raw_rw("InOutCounts");
                info = info.with("CurrentBit", ValueType::Uint).with("GroupCount", ValueType::Uint);
            }
            Self::SortDownSweep | Self::SortDownSweepKeyStride64 => {
                set = set
                    .raw("InCounts")
                    .raw("InKeys")
                    .raw("InIndirection")
                    .raw_rw("OutKeys")
                    .raw_rw("OutIndirection");
                info = info.with("CurrentBit", ValueType::Uint).with("GroupCount", ValueType::Uint);
                sort_defines(&mut plan, self == Self::SortDownSweepKeyStride64);
            }
            Self::RibbonSortKeys => {
                set = set
                    .raw("StreamInfo")
                    .raw("GPUSimData")
                    .raw("SelfIDsOffsets")
                    .raw("ParentIDsOffsets")
                    .raw("EnabledsOffsets")
                    .raw_rw("OutSortKeys")
                    .raw_rw("OutIndirection")
                    .raw_rw("OutIndirectDraw");
                info = info.with("DrawRequest", ValueType::Uint);
            }
        }

        plan.constant_set(SetRole::Compute, set);
        plan.push_constant(info);
        plan
    }
}

fn sort_defines(plan: &mut BindingPlan, key_stride_64: bool) {
    if key_stride_64 {
        plan.define(ShaderDefine::new("KEYSTRIDE64", ShaderStageMask::COMPUTE));
    }
    plan.define(ShaderDefine {
        name: "NUM_KEY_PER_THREAD".to_owned(),
        value: Some(SORT_KEYS_PER_THREAD.to_string()),
        stages: ShaderStageMask::COMPUTE,
    });
}
