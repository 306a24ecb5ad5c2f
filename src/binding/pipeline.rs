//! Pipeline State Derivation
//!
//! Fixed-function state of a particle render state, derived from the
//! renderer family, its features and the pass it is baked for.
//!
//! Lights and decals rasterize the back faces of their bounding volume with
//! a `>=` depth test and never write depth. Every other class depth-tests
//! with `<` and blends according to the pass (or `Transparent.Type` in the
//! transparent passes).

use wgpu::{BlendComponent, BlendFactor, BlendOperation, BlendState, CompareFunction, Face, FrontFace};

use crate::binding::options::ShaderOptions;
use crate::binding::passes::ParticlePass;
use crate::material::{RendererClass, RendererDescriptor, names};
use crate::rhi::{DrawMode, PipelineState};

/// Blend equation of a particle pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    Additive,
    AdditiveNoAlpha,
    AlphaBlend,
    #[default]
    AlphaBlendAdditive,
    Multiply,
    Opaque,
}

impl BlendMode {
    /// Mode selected by the `Transparent.Type` property; unknown values are additive.
    #[must_use]
    pub const fn from_transparent_type(value: i32) -> Self {
        match value {
            1 => Self::AdditiveNoAlpha,
            2 => Self::AlphaBlend,
            3 => Self::AlphaBlendAdditive,
            _ => Self::Additive,
        }
    }

    /// `None` for opaque (blending disabled).
    #[must_use]
    pub const fn blend_state(self) -> Option<BlendState> {
        let (color, alpha) = match self {
            Self::Additive => (
                (BlendFactor::SrcAlpha, BlendFactor::One),
                (BlendFactor::One, BlendFactor::One),
            ),
            Self::AdditiveNoAlpha => (
                (BlendFactor::One, BlendFactor::One),
                (BlendFactor::Zero, BlendFactor::One),
            ),
            Self::AlphaBlend => (
                (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
                (BlendFactor::One, BlendFactor::One),
            ),
            Self::AlphaBlendAdditive => (
                (BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
                (BlendFactor::One, BlendFactor::One),
            ),
            Self::Multiply => (
                (BlendFactor::Dst, BlendFactor::Zero),
                (BlendFactor::One, BlendFactor::One),
            ),
            Self::Opaque => return None,
        };
        Some(blend(color, alpha))
    }
}

const fn blend(color: (BlendFactor, BlendFactor), alpha: (BlendFactor, BlendFactor)) -> BlendState {
    BlendState {
        color: BlendComponent {
            src_factor: color.0,
            dst_factor: color.1,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponent {
            src_factor: alpha.0,
            dst_factor: alpha.1,
            operation: BlendOperation::Add,
        },
    }
}

/// Blend mode of a non-volume renderer in `pass`.
#[must_use]
pub fn blend_mode(renderer: &RendererDescriptor, pass: ParticlePass) -> BlendMode {
    match pass {
        ParticlePass::Distortion => BlendMode::Additive,
        ParticlePass::TransparentPostDisto => BlendMode::AlphaBlendAdditive,
        ParticlePass::Tint => BlendMode::Multiply,
        ParticlePass::Opaque | ParticlePass::OpaqueShadow => BlendMode::Opaque,
        _ => renderer
            .property_int(names::TRANSPARENT_TYPE)
            .map_or(BlendMode::default(), BlendMode::from_transparent_type),
    }
}

/// Derives the pipeline state of one (renderer, options, pass) render state.
#[must_use]
pub fn pipeline_state(
    renderer: &RendererDescriptor,
    options: ShaderOptions,
    pass: ParticlePass,
) -> PipelineState {
    let class = renderer.class;
    let mut state = PipelineState {
        dynamic_viewport: true,
        dynamic_scissor: true,
        blend: None,
        depth_compare: Some(CompareFunction::Less),
        depth_write: false,
        depth_clamp: false,
        cull_mode: None,
        front_face: FrontFace::Cw,
        draw_mode: DrawMode::Triangles,
    };

    if class == RendererClass::Mesh && renderer.has_feature(names::CULLING) {
        let double_sided = renderer.property_bool(names::CULLING_DOUBLE_SIDED).unwrap_or(true);
        if !double_sided {
            state.cull_mode = Some(Face::Back);
        }
    }

    if matches!(
        class,
        RendererClass::Light | RendererClass::Decal | RendererClass::Mesh | RendererClass::Triangle
    ) {
        state.front_face = FrontFace::Ccw;
    }

    match class {
        RendererClass::Light | RendererClass::Decal => {
            // Far-plane clipping would cut light volumes, hence the clamp.
            state.depth_clamp = true;
            state.depth_compare = Some(CompareFunction::GreaterEqual);
            state.cull_mode = Some(Face::Front);
            state.blend = Some(if class == RendererClass::Decal {
                blend(
                    (BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
                    (BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
                )
            } else {
                blend(
                    (BlendFactor::One, BlendFactor::One),
                    (BlendFactor::Zero, BlendFactor::One),
                )
            });
        }
        _ => {
            let mode = blend_mode(renderer, pass);
            state.blend = mode.blend_state();
            state.depth_write = mode == BlendMode::Opaque;
            if options.geom_billboarding() {
                state.draw_mode = DrawMode::Points;
            }
        }
    }

    state
}
