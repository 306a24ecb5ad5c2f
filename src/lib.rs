#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Particle RHI integration layer.
//!
//! | Module | Contents |
//! |---|---|
//! | [`rhi`] | abstract device, resource vocabulary, command buffers, headless backend |
//! | [`material`] | renderer descriptors and material features |
//! | [`binding`] | shader binding compiler |
//! | [`hash`] | content hash and hashed shader paths |
//! | [`cache`] | two-phase resource caches, renderer caches and instances |
//! | [`context`] | per-device context shared by every cache |
//! | [`graph`] | deferred render-pass graph |
//! | [`draw`] | draw-call records and per-pass dispatch |
//! | [`offline`] | offline shader permutation enumeration |

pub mod binding;
pub mod cache;
pub mod context;
pub mod draw;
pub mod errors;
pub mod graph;
pub mod hash;
pub mod material;
pub mod offline;
pub mod rhi;

pub use binding::{BindingInput, CompiledBindings, ParticlePass, SetRole, ShaderOptions, build_bindings};
pub use cache::{
    Handle, RendererCache, RendererCacheInstance, RendererCacheInstanceUpdate, ResourceManager,
};
pub use context::GraphicsDeviceContext;
pub use draw::{DrawCall, DrawType, ParticleSceneRenderer, PostEffects, PostStep, SceneInfo};
pub use errors::{Result, RhiError};
pub use graph::{InitRenderPasses, RenderGraph, SceneOptions};
pub use hash::content_hash;
pub use material::{MaterialSettings, RendererClass, RendererDescriptor};
pub use offline::OfflineCompileArgs;
pub use rhi::{GpuCaps, GraphicsApi, HeadlessApi, MemoryProvider, RenderApi, ResourceProvider};
