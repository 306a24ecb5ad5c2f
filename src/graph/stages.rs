//! Pipeline Stages
//!
//! The scene pipeline is a fixed, ordered list of stages. Every stage but
//! the scene itself is optional; [`wire`] folds the enabled subset into a
//! chain where each stage reads what the previous enabled stage wrote, and
//! the last enabled stage writes the swap chain.
//!
//! | Stage | Flag | Writes | Render pass |
//! |-------|------|--------|-------------|
//! | `Scene` | `GBUFFER` (baseline, always present) | scene color | before bloom / final |
//! | `Distortion` | `DISTORTION` | distortion output | before bloom / final |
//! | `Bloom` | `BLOOM` | its input, in place | own pass |
//! | `ToneMapping` | `TONE_MAPPING` | tone-mapping output | final |
//! | `ColorRemap` | `COLOR_REMAP` | color-remap output | final |
//! | `Fxaa` | `FXAA` | FXAA output | final |
//! | `Debug` | `DEBUG` | swap chain | final |

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Optional pipeline stages enabled at graph build time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct InitRenderPasses: u32 {
        const GBUFFER      = 1 << 0;
        const DISTORTION   = 1 << 1;
        const BLOOM        = 1 << 2;
        const TONE_MAPPING = 1 << 3;
        const COLOR_REMAP  = 1 << 4;
        const FXAA         = 1 << 5;
        const DEBUG        = 1 << 6;

        const ALL_EXCEPT_BLOOM = Self::GBUFFER.bits()
            | Self::DISTORTION.bits()
            | Self::TONE_MAPPING.bits()
            | Self::COLOR_REMAP.bits()
            | Self::FXAA.bits()
            | Self::DEBUG.bits();
        const ALL = Self::ALL_EXCEPT_BLOOM.bits() | Self::BLOOM.bits();
    }
}

impl InitRenderPasses {
    /// `true` when no stage after `stage` is enabled. `stage` must be a
    /// single flag.
    #[must_use]
    pub fn is_last(self, stage: Self) -> bool {
        let bit = stage.bits().trailing_zeros();
        let above = u32::MAX.checked_shl(bit + 1).unwrap_or(0);
        self.bits() & above == 0
    }
}

/// Pipeline stage, in execution order.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[repr(u8)]
pub enum Stage {
    /// Opaque GBuffer fill, decals, lighting and merge, or a single basic
    /// transparent sub-pass without GBuffer.
    Scene = 0,
    Distortion = 1,
    Bloom = 2,
    ToneMapping = 3,
    ColorRemap = 4,
    Fxaa = 5,
    /// Render-target debug view and compositing.
    Debug = 6,
}

impl Stage {
    #[inline]
    #[must_use]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scene => "Scene",
            Self::Distortion => "Distortion",
            Self::Bloom => "Bloom",
            Self::ToneMapping => "ToneMapping",
            Self::ColorRemap => "ColorRemap",
            Self::Fxaa => "FXAA",
            Self::Debug => "Debug",
        }
    }
}

/// What a stage writes, independent of which concrete target backs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRole {
    SwapChain,
    /// Merge target with GBuffer, basic transparent target otherwise.
    SceneColor,
    DistortionOutput,
    ToneMappingOutput,
    ColorRemapOutput,
    FxaaOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub stage: Stage,
    pub flag: InitRenderPasses,
    /// Target written when the stage is not the last one.
    pub produces: TargetRole,
    /// The stage opens its own render pass.
    pub new_render_pass: bool,
    /// The stage writes back into its input instead of `produces`.
    pub in_place: bool,
}

impl StageDescriptor {
    const fn new(stage: Stage, flag: InitRenderPasses, produces: TargetRole) -> Self {
        Self {
            stage,
            flag,
            produces,
            new_render_pass: false,
            in_place: false,
        }
    }
}

pub const STAGES: [StageDescriptor; 7] = [
    StageDescriptor::new(Stage::Scene, InitRenderPasses::GBUFFER, TargetRole::SceneColor),
    StageDescriptor::new(Stage::Distortion, InitRenderPasses::DISTORTION, TargetRole::DistortionOutput),
    StageDescriptor {
        new_render_pass: true,
        in_place: true,
        ..StageDescriptor::new(Stage::Bloom, InitRenderPasses::BLOOM, TargetRole::SceneColor)
    },
    StageDescriptor::new(Stage::ToneMapping, InitRenderPasses::TONE_MAPPING, TargetRole::ToneMappingOutput),
    StageDescriptor::new(Stage::ColorRemap, InitRenderPasses::COLOR_REMAP, TargetRole::ColorRemapOutput),
    StageDescriptor::new(Stage::Fxaa, InitRenderPasses::FXAA, TargetRole::FxaaOutput),
    StageDescriptor::new(Stage::Debug, InitRenderPasses::DEBUG, TargetRole::SwapChain),
];

#[inline]
#[must_use]
pub fn descriptor(stage: Stage) -> &'static StageDescriptor {
    &STAGES[stage as usize]
}

/// Render pass hosting a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderPassSlot {
    /// Everything up to bloom's input. Only exists with bloom.
    BeforeBloom,
    Bloom,
    /// Everything after bloom, or the whole pipeline without bloom.
    Final,
}

impl RenderPassSlot {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BeforeBloom => "Before Bloom Render Pass",
            Self::Bloom => "Bloom Render Pass",
            Self::Final => "Final Render Pass",
        }
    }
}

/// Input, output and render pass of one enabled stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageWiring {
    pub stage: Stage,
    /// `None` for the scene stage.
    pub input: Option<TargetRole>,
    pub output: TargetRole,
    pub slot: RenderPassSlot,
}

/// Folds the enabled stages of `init` into their input/output chain.
///
/// The scene stage is always present; with `init` empty it renders
/// straight into the swap chain.
#[must_use]
pub fn wire(init: InitRenderPasses) -> Vec<StageWiring> {
    let bloom = init.contains(InitRenderPasses::BLOOM);

    STAGES
        .iter()
        .filter(|d| d.stage == Stage::Scene || init.contains(d.flag))
        .scan(None, |previous: &mut Option<TargetRole>, d| {
            let input = *previous;
            let output = if init.is_last(d.flag) {
                TargetRole::SwapChain
            } else if d.in_place {
                input.unwrap_or(d.produces)
            } else {
                d.produces
            };
            let slot = match (bloom, d.stage.cmp(&Stage::Bloom)) {
                (false, _) | (true, std::cmp::Ordering::Greater) => RenderPassSlot::Final,
                (true, std::cmp::Ordering::Less) => RenderPassSlot::BeforeBloom,
                (true, std::cmp::Ordering::Equal) => RenderPassSlot::Bloom,
            };
            *previous = Some(output);
            Some(StageWiring {
                stage: d.stage,
                input,
                output,
                slot,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Scene < Stage::Distortion);
        assert!(Stage::Distortion < Stage::Bloom);
        assert!(Stage::Bloom < Stage::ToneMapping);
        assert!(Stage::ToneMapping < Stage::ColorRemap);
        assert!(Stage::ColorRemap < Stage::Fxaa);
        assert!(Stage::Fxaa < Stage::Debug);
        for (i, d) in STAGES.iter().enumerate() {
            assert_eq!(d.stage.order() as usize, i);
            assert_eq!(descriptor(d.stage), d);
        }
    }

    #[test]
    fn test_is_last() {
        let init = InitRenderPasses::GBUFFER;
        assert!(init.is_last(InitRenderPasses::GBUFFER));

        let init = InitRenderPasses::GBUFFER | InitRenderPasses::BLOOM;
        assert!(!init.is_last(InitRenderPasses::GBUFFER));
        assert!(!init.is_last(InitRenderPasses::DISTORTION));
        assert!(init.is_last(InitRenderPasses::BLOOM));
        assert!(InitRenderPasses::ALL.is_last(InitRenderPasses::DEBUG));
        assert!(InitRenderPasses::empty().is_last(InitRenderPasses::GBUFFER));
    }

    #[test]
    fn test_wire_every_subset() {
        for bits in 0..=InitRenderPasses::ALL.bits() {
            let init = InitRenderPasses::from_bits_truncate(bits);
            let wiring = wire(init);

            assert_eq!(wiring[0].stage, Stage::Scene);
            assert_eq!(wiring[0].input, None);
            let to_swap_chain: Vec<_> =
                wiring.iter().filter(|w| w.output == TargetRole::SwapChain).collect();
            assert_eq!(to_swap_chain.len(), 1, "{init:?}");
            assert_eq!(to_swap_chain[0].stage, wiring.last().unwrap().stage, "{init:?}");

            for pair in wiring.windows(2) {
                assert_eq!(pair[1].input, Some(pair[0].output), "{init:?}");
                assert!(pair[0].stage < pair[1].stage);
                assert!(pair[0].slot <= pair[1].slot);
            }
        }
    }

    #[test]
    fn test_wire_gbuffer_only() {
        let wiring = wire(InitRenderPasses::GBUFFER);
        assert_eq!(wiring.len(), 1);
        assert_eq!(wiring[0].output, TargetRole::SwapChain);
        assert_eq!(wiring[0].slot, RenderPassSlot::Final);
    }

    #[test]
    fn test_wire_bloom_splits_render_passes() {
        let init = InitRenderPasses::GBUFFER | InitRenderPasses::BLOOM | InitRenderPasses::TONE_MAPPING;
        let wiring = wire(init);
        let slots: Vec<_> = wiring.iter().map(|w| (w.stage, w.slot)).collect();
        assert_eq!(
            slots,
            [
                (Stage::Scene, RenderPassSlot::BeforeBloom),
                (Stage::Bloom, RenderPassSlot::Bloom),
                (Stage::ToneMapping, RenderPassSlot::Final),
            ]
        );
        // Bloom writes back into the scene color.
        assert_eq!(wiring[1].input, Some(TargetRole::SceneColor));
        assert_eq!(wiring[1].output, TargetRole::SceneColor);
    }
}
