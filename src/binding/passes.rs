//! Particle Render Passes
//!
//! The named slots of the deferred pipeline a particle render state can be
//! baked against. The render graph resolves each slot to a concrete
//! (render pass, sub-pass) pair at build time; a slot the current pipeline
//! does not host stays empty and its render states are skipped.

use smallvec::SmallVec;

use crate::material::{RendererClass, names};

/// Particle render pass, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ParticlePass {
    Opaque = 0,
    Decal,
    Lighting,
    Transparent,
    Distortion,
    Tint,
    TransparentPostDisto,
    Debug,
    Compositing,
    OpaqueShadow,
}

/// Render passes a renderer draws into, at most four.
pub type PassList = SmallVec<[ParticlePass; 4]>;

/// Formats the offline compiler assumes for the pass outputs.
mod formats {
    use wgpu::TextureFormat;

    pub const OPAQUE: &[TextureFormat] = &[
        TextureFormat::Rgba16Float, // diffuse HDR
        TextureFormat::R32Float,    // depth
        TextureFormat::Rgba16Float, // emissive HDR
        TextureFormat::Rgba16Float, // normal / roughness / metalness
    ];
    pub const OPAQUE_NO_DEPTH: &[TextureFormat] = &[
        TextureFormat::Rgba16Float,
        TextureFormat::Rgba16Float,
        TextureFormat::Rgba16Float,
    ];
    pub const LIGHTING: &[TextureFormat] = &[TextureFormat::Rgba16Float];
    pub const DISTORTION: &[TextureFormat] = &[TextureFormat::Rgba16Float];
    pub const MERGE: &[TextureFormat] = &[TextureFormat::Rgba16Float];
    pub const COMPOSITING: &[TextureFormat] = &[TextureFormat::Rgba8Unorm];
    pub const SHADOW: &[TextureFormat] = &[TextureFormat::Rg32Float];
}

impl ParticlePass {
    pub const COUNT: usize = 10;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Opaque,
        Self::Decal,
        Self::Lighting,
        Self::Transparent,
        Self::Distortion,
        Self::Tint,
        Self::TransparentPostDisto,
        Self::Debug,
        Self::Compositing,
        Self::OpaqueShadow,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Opaque => "ParticlePass_Opaque",
            Self::Decal => "ParticlePass_Decal",
            Self::Lighting => "ParticlePass_Lighting",
            Self::Transparent => "ParticlePass_Transparent",
            Self::Distortion => "ParticlePass_Distortion",
            Self::Tint => "ParticlePass_Tint",
            Self::TransparentPostDisto => "ParticlePass_TransparentPostDisto",
            Self::Debug => "ParticlePass_Debug",
            Self::Compositing => "ParticlePass_Compositing",
            Self::OpaqueShadow => "ParticlePass_OpaqueShadow",
        }
    }

    /// Output formats used when compiling shaders without a live graph.
    #[must_use]
    pub const fn output_formats(self) -> &'static [wgpu::TextureFormat] {
        match self {
            Self::Opaque => formats::OPAQUE,
            Self::Decal => formats::OPAQUE_NO_DEPTH,
            Self::Lighting => formats::LIGHTING,
            Self::Distortion => formats::DISTORTION,
            Self::Transparent | Self::Tint | Self::TransparentPostDisto | Self::Debug => {
                formats::MERGE
            }
            Self::Compositing => formats::COMPOSITING,
            Self::OpaqueShadow => formats::SHADOW,
        }
    }
}

/// Passes a renderer draws into, derived from its class and enabled features.
///
/// Lights and decals have a dedicated pass. Everything else renders into
/// the opaque GBuffer (plus shadows) when opaque, into the tint and
/// distortion passes when those features are on, and into one of the
/// transparent passes otherwise.
pub fn find_render_passes(class: RendererClass, has_feature: impl Fn(&str) -> bool) -> PassList {
    let mut passes = PassList::new();
    match class {
        RendererClass::Light => passes.push(ParticlePass::Lighting),
        RendererClass::Decal => passes.push(ParticlePass::Decal),
        _ => {
            let diffuse = has_feature(names::DIFFUSE);
            let emissive = has_feature(names::EMISSIVE);
            let opaque = has_feature(names::OPAQUE);
            let lit = has_feature(names::LIT);
            let tint = has_feature(names::TINT);
            let distortion = has_feature(names::DISTORTION);

            let transparent_lighting = lit && (tint || distortion);
            let transparent_colors = !opaque && (diffuse || emissive);
            let transparent =
                transparent_colors || transparent_lighting || (!opaque && !tint && !distortion);

            if transparent {
                if tint || distortion {
                    passes.push(ParticlePass::TransparentPostDisto);
                } else {
                    passes.push(ParticlePass::Transparent);
                }
            }
            if opaque {
                passes.push(ParticlePass::Opaque);
                passes.push(ParticlePass::OpaqueShadow);
            }
            if tint {
                passes.push(ParticlePass::Tint);
            }
            if distortion {
                passes.push(ParticlePass::Distortion);
            }
            if passes.is_empty() {
                passes.push(ParticlePass::Transparent);
            }
        }
    }
    passes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(features: &[&str]) -> impl Fn(&str) -> bool {
        let owned: Vec<String> = features.iter().map(|s| (*s).to_owned()).collect();
        move |name| owned.iter().any(|f| f == name)
    }

    #[test]
    fn test_opaque_routes_to_gbuffer_and_shadows() {
        let passes = find_render_passes(RendererClass::Billboard, with(&["Diffuse", "Opaque"]));
        assert_eq!(passes.as_slice(), &[ParticlePass::Opaque, ParticlePass::OpaqueShadow]);
    }

    #[test]
    fn test_transparent_default() {
        let passes = find_render_passes(RendererClass::Ribbon, with(&["Diffuse"]));
        assert_eq!(passes.as_slice(), &[ParticlePass::Transparent]);

        let passes = find_render_passes(RendererClass::Mesh, with(&[]));
        assert_eq!(passes.as_slice(), &[ParticlePass::Transparent]);
    }

    #[test]
    fn test_distortion_and_tint() {
        let passes = find_render_passes(RendererClass::Billboard, with(&["Distortion"]));
        assert_eq!(passes.as_slice(), &[ParticlePass::Distortion]);

        let passes = find_render_passes(RendererClass::Billboard, with(&["Diffuse", "Tint"]));
        assert_eq!(
            passes.as_slice(),
            &[ParticlePass::TransparentPostDisto, ParticlePass::Tint]
        );
    }

    #[test]
    fn test_light_and_decal_passes() {
        assert_eq!(
            find_render_passes(RendererClass::Light, with(&["Diffuse"])).as_slice(),
            &[ParticlePass::Lighting]
        );
        assert_eq!(
            find_render_passes(RendererClass::Decal, with(&[])).as_slice(),
            &[ParticlePass::Decal]
        );
    }

    #[test]
    fn test_pass_table() {
        assert_eq!(ParticlePass::ALL.len(), ParticlePass::COUNT);
        for (i, pass) in ParticlePass::ALL.iter().enumerate() {
            assert_eq!(pass.index(), i);
        }
        assert_eq!(ParticlePass::OpaqueShadow.name(), "ParticlePass_OpaqueShadow");
        assert_eq!(ParticlePass::Opaque.output_formats().len(), 4);
        assert_eq!(ParticlePass::Decal.output_formats().len(), 3);
    }
}
