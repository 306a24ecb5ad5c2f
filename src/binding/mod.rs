//! Shader Binding Compiler
//!
//! Everything derived from a (renderer, options, pass) triple before any
//! device object exists:
//!
//! | Module | Contents |
//! |---|---|
//! | [`options`] | shader permutation flags and shader names |
//! | [`passes`] | particle render passes and their output formats |
//! | [`plan`] | the ordered binding contract and its fold |
//! | [`layout`] | fixed scene/material/draw-request layouts |
//! | [`builder`] | per-renderer binding plans |
//! | [`compute`] | GPU simulation compute shaders |
//! | [`pipeline`] | fixed-function pipeline state |
//! | [`stub`] | shader declaration stubs and their validator |

pub mod builder;
pub mod compute;
pub mod layout;
pub mod options;
pub mod passes;
pub mod pipeline;
pub mod plan;
pub mod stub;

pub use builder::{BindingInput, build_bindings, build_plan, feature_fields};
pub use compute::ComputeShaderType;
pub use layout::{MaterialLayout, TextureProperty};
pub use options::ShaderOptions;
pub use passes::{ParticlePass, PassList, find_render_passes};
pub use pipeline::{BlendMode, pipeline_state};
pub use plan::{BindingPlan, BindingStep, CompiledBindings, NeededConstants, SetRole};
pub use stub::{render_stub, validate_stub};
