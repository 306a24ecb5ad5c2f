//! Deferred Render-Pass Graph
//!
//! | Module | Contents |
//! |---|---|
//! | [`stages`] | init-pass flags, ordered stage descriptors and the wiring fold |
//! | [`builder`] | targets, render passes, frame buffers and the pass table |
//! | [`options`] | host-facing scene options |

pub mod builder;
pub mod options;
pub mod stages;

pub use builder::{
    BakedPass, GBufferSets, GBufferTargets, PassLocation, RenderGraph, SHADOW_CASCADE_COUNT, ShadowPass,
    StageSubPasses,
};
pub use options::{RenderTargetDebug, SceneOptions, ShadowOptions};
pub use stages::{
    InitRenderPasses, RenderPassSlot, STAGES, Stage, StageDescriptor, StageWiring, TargetRole, wire,
};
