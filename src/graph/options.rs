//! Scene Options
//!
//! Host-facing toggles of the particle scene pipeline, serializable to and
//! from JSON. Every struct is `#[serde(default)]`, so a partial document
//! only overrides the fields it names.
//!
//! | Group | Field | Default |
//! |-------|-------|---------|
//! | distortion | `enable` / `intensity` | `true` / `1.0` |
//! | distortion | `chromatic_aberration` | `(0.01, 0.0125, 0.015, 0.0175)` |
//! | bloom | `enable` / `bright_pass` / `intensity` / `attenuation` | `true` / `1` / `1` / `1` |
//! | bloom | `blur_tap` / `render_pass_count` | 9 taps / `6` |
//! | tone mapping | `enable` / `exposure` / `saturation` | `true` / `-0.336472` / `1` |
//! | vignetting | color, intensity, desaturation, roundness, smoothness | black, `0.1`, `0.1`, `1`, `1` |
//! | color remap | `enable` / `force_srgb_to_linear` / `remap_texture_path` | `true` / `false` / empty |
//! | FXAA | `enable` / `luma_in_alpha` | `false` / `true` |
//! | overdraw | `upper_range` / `heatmap_texture_path` | `50` / empty |
//! | dithering | `enable` | `false` |
//! | shadows | see [`ShadowOptions`] | |
//!
//! ```rust,ignore
//! let options = SceneOptions::from_json_str(r#"{ "bloom": { "enable": false } }"#)?;
//! let init = options.init_render_passes(true);
//! ```

use glam::{UVec2, Vec4};
use serde::{Deserialize, Serialize};

use super::stages::InitRenderPasses;
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionOptions {
    pub enable: bool,
    pub intensity: f32,
    /// Per-channel UV offset multipliers.
    pub chromatic_aberration: Vec4,
}

impl Default for DistortionOptions {
    fn default() -> Self {
        Self {
            enable: true,
            intensity: 1.0,
            chromatic_aberration: Vec4::new(0.01, 0.0125, 0.015, 0.0175),
        }
    }
}

/// Gaussian kernel width of the bloom blur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BlurTap {
    Tap5,
    #[default]
    Tap9,
    Tap13,
}

impl BlurTap {
    #[must_use]
    pub const fn taps(self) -> u32 {
        match self {
            Self::Tap5 => 5,
            Self::Tap9 => 9,
            Self::Tap13 => 13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomOptions {
    pub enable: bool,
    pub bright_pass: f32,
    pub intensity: f32,
    pub attenuation: f32,
    pub blur_tap: BlurTap,
    /// Downsample/upsample steps.
    pub render_pass_count: u32,
}

impl Default for BloomOptions {
    fn default() -> Self {
        Self {
            enable: true,
            bright_pass: 1.0,
            intensity: 1.0,
            attenuation: 1.0,
            blur_tap: BlurTap::Tap9,
            render_pass_count: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMappingOptions {
    pub enable: bool,
    pub exposure: f32,
    pub saturation: f32,
}

impl Default for ToneMappingOptions {
    fn default() -> Self {
        Self {
            enable: true,
            exposure: -0.336_472,
            saturation: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VignettingOptions {
    pub color: Vec4,
    pub color_intensity: f32,
    pub desaturation_intensity: f32,
    pub roundness: f32,
    pub smoothness: f32,
}

impl Default for VignettingOptions {
    fn default() -> Self {
        Self {
            color: Vec4::ZERO,
            color_intensity: 0.1,
            desaturation_intensity: 0.1,
            roundness: 1.0,
            smoothness: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorRemapOptions {
    pub enable: bool,
    pub force_srgb_to_linear: bool,
    pub remap_texture_path: String,
}

impl Default for ColorRemapOptions {
    fn default() -> Self {
        Self {
            enable: true,
            force_srgb_to_linear: false,
            remap_texture_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxaaOptions {
    pub enable: bool,
    /// Luma is already stored in the alpha channel of the input.
    pub luma_in_alpha: bool,
}

impl Default for FxaaOptions {
    fn default() -> Self {
        Self {
            enable: false,
            luma_in_alpha: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverdrawOptions {
    /// Overdraw count mapped to the top of the heatmap.
    pub upper_range: u32,
    pub heatmap_texture_path: String,
}

impl Default for OverdrawOptions {
    fn default() -> Self {
        Self {
            upper_range: 50,
            heatmap_texture_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DitheringOptions {
    pub enable: bool,
}

/// Cascaded variance shadow maps of opaque particles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowOptions {
    pub enable: bool,
    /// Tint each cascade in the lit output.
    pub debug: bool,
    pub bias: f32,
    pub variance: bool,
    pub exponent: f32,
    pub resolution: UVec2,
    /// Far plane of each cascade, as a fraction of the view range.
    pub cascade_range_ratios: Vec4,
    /// Lower bound of each cascade's far plane, in world units.
    pub cascade_min_distances: Vec4,
}

impl Default for ShadowOptions {
    fn default() -> Self {
        Self {
            enable: true,
            debug: false,
            bias: 0.005,
            variance: true,
            exponent: 10.0,
            resolution: UVec2::splat(1024),
            cascade_range_ratios: Vec4::new(0.15, 0.2, 0.25, 0.4),
            cascade_min_distances: Vec4::new(5.0, 10.0, 20.0, 40.0),
        }
    }
}

/// Every host-facing toggle of the particle scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SceneOptions {
    pub distortion: DistortionOptions,
    pub bloom: BloomOptions,
    pub tone_mapping: ToneMappingOptions,
    pub vignetting: VignettingOptions,
    pub color_remap: ColorRemapOptions,
    pub fxaa: FxaaOptions,
    pub overdraw: OverdrawOptions,
    pub dithering: DitheringOptions,
    pub shadows: ShadowOptions,
    /// Adds the render-target debug and compositing stage.
    pub debug_views: bool,
}

impl SceneOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Stages the render graph is built with.
    #[must_use]
    pub fn init_render_passes(&self, gbuffer: bool) -> InitRenderPasses {
        let mut init = InitRenderPasses::empty();
        init.set(InitRenderPasses::GBUFFER, gbuffer);
        init.set(InitRenderPasses::DISTORTION, self.distortion.enable);
        init.set(InitRenderPasses::BLOOM, self.bloom.enable);
        init.set(InitRenderPasses::TONE_MAPPING, self.tone_mapping.enable);
        init.set(InitRenderPasses::COLOR_REMAP, self.color_remap.enable);
        init.set(InitRenderPasses::FXAA, self.fxaa.enable);
        init.set(InitRenderPasses::DEBUG, self.debug_views);
        init
    }

    /// Shadow settings when shadows apply to a graph built with `init`.
    /// Shadows need the GBuffer.
    #[must_use]
    pub fn shadows_for(&self, init: InitRenderPasses) -> Option<ShadowOptions> {
        (self.shadows.enable && init.contains(InitRenderPasses::GBUFFER)).then_some(self.shadows)
    }
}

/// Render target shown by the debug stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RenderTargetDebug {
    #[default]
    NoDebug,
    Diffuse,
    Depth,
    Normal,
    NormalUnpacked,
    Roughness,
    Metalness,
    LightAccum,
    Distortion,
    PostMerge,
    ShadowCascades,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SceneOptions::default();
        assert!(options.distortion.enable);
        assert_eq!(options.bloom.render_pass_count, 6);
        assert_eq!(options.bloom.blur_tap.taps(), 9);
        assert!((options.tone_mapping.exposure + 0.336_472).abs() < 1e-6);
        assert!(!options.fxaa.enable);
        assert_eq!(options.overdraw.upper_range, 50);
        assert_eq!(options.shadows.resolution, UVec2::splat(1024));
        assert_eq!(options.shadows.cascade_min_distances, Vec4::new(5.0, 10.0, 20.0, 40.0));
    }

    #[test]
    fn test_init_render_passes() {
        let options = SceneOptions::default();
        assert_eq!(
            options.init_render_passes(true),
            InitRenderPasses::GBUFFER
                | InitRenderPasses::DISTORTION
                | InitRenderPasses::BLOOM
                | InitRenderPasses::TONE_MAPPING
                | InitRenderPasses::COLOR_REMAP
        );
        assert!(!options.init_render_passes(false).contains(InitRenderPasses::GBUFFER));
    }

    #[test]
    fn test_shadows_need_gbuffer() {
        let options = SceneOptions::default();
        assert!(options.shadows_for(InitRenderPasses::GBUFFER).is_some());
        assert!(options.shadows_for(InitRenderPasses::BLOOM).is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = SceneOptions::from_json_str(r#"{ "bloom": { "enable": false }, "fxaa": { "enable": true } }"#)
            .unwrap();
        assert!(!options.bloom.enable);
        assert!((options.bloom.intensity - 1.0).abs() < f32::EPSILON);
        assert!(options.fxaa.enable);
        assert!(options.fxaa.luma_in_alpha);

        let json = options.to_json_string().unwrap();
        assert_eq!(SceneOptions::from_json_str(&json).unwrap(), options);
    }
}
