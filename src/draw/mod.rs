//! Draw Dispatch
//!
//! | Module | Contents |
//! |---|---|
//! | [`call`] | queued draw-call records |
//! | [`scene`] | scene constants and the sets shared by every draw |
//! | [`dispatch`] | per-pass binding and draw recording |
//! | [`renderer`] | frame recording over the render graph |

pub mod call;
pub mod dispatch;
pub mod renderer;
pub mod scene;

pub use call::{DrawCall, DrawType};
pub use dispatch::{DispatchStats, DrawRequestSets, FrameBindings, render_particles};
pub use renderer::{NoPostEffects, ParticleSceneRenderer, PostEffects, PostStep};
pub use scene::{BackdropInfo, DirectionalLight, PointLight, SceneInfo, SceneResources, SpotLight};
