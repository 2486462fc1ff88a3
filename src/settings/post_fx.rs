//! Post-processing configuration

use glam::Vec3;

use crate::backend::types::{Color, ShaderRef};
use crate::error::PipelineError;

/// How bloom levels are combined on the way back up the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomMode {
    /// Classic additive blending; intensity applied in the final combine.
    Additive,
    /// Energy-conserving scatter blending; intensity reused as the
    /// per-level scatter factor.
    Scattering,
}

/// Bloom stage settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    /// Pyramid depth limit, at most 16.
    pub max_iterations: u32,
    /// Stop downsampling before a dimension falls below this.
    pub downscale_limit: u32,
    pub bicubic_upsampling: bool,
    pub threshold: f32,
    pub threshold_knee: f32,
    pub intensity: f32,
    /// Use the firefly-fading prefilter variant.
    pub fade_fireflies: bool,
    pub mode: BloomMode,
    /// Scatter amount in 0.05..=0.95, only used by `Scattering`.
    pub scatter: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            max_iterations: 16,
            downscale_limit: 2,
            bicubic_upsampling: false,
            threshold: 0.5,
            threshold_knee: 0.5,
            intensity: 1.0,
            fade_fireflies: false,
            mode: BloomMode::Scattering,
            scatter: 0.7,
        }
    }
}

/// Tone mapping curve applied during LUT baking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneMappingMode {
    None,
    Aces,
    Neutral,
    Reinhard,
}

/// Exposure, contrast, filtering, hue and saturation adjustments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAdjustments {
    /// Exposure in stops.
    pub post_exposure: f32,
    /// -100..100.
    pub contrast: f32,
    pub color_filter: Color,
    /// -180..180 degrees.
    pub hue_shift: f32,
    /// -100..100.
    pub saturation: f32,
}

impl Default for ColorAdjustments {
    fn default() -> Self {
        Self {
            post_exposure: 0.0,
            contrast: 0.0,
            color_filter: Color::WHITE,
            hue_shift: 0.0,
            saturation: 0.0,
        }
    }
}

/// White balance temperature/tint, both -100..100.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WhiteBalance {
    pub temperature: f32,
    pub tint: f32,
}

/// Separate tints for shadows and highlights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitToning {
    pub shadows: Color,
    pub highlights: Color,
    /// -100..100, shifts the crossover point.
    pub balance: f32,
}

impl Default for SplitToning {
    fn default() -> Self {
        Self {
            shadows: Color::gray(0.5),
            highlights: Color::gray(0.5),
            balance: 0.0,
        }
    }
}

/// Per-output-channel mix of the input channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMixer {
    pub red: Vec3,
    pub green: Vec3,
    pub blue: Vec3,
}

impl Default for ChannelMixer {
    fn default() -> Self {
        Self {
            red: Vec3::X,
            green: Vec3::Y,
            blue: Vec3::Z,
        }
    }
}

/// Color wheels gated to luminance ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowsMidtonesHighlights {
    pub shadows: Color,
    pub midtones: Color,
    pub highlights: Color,
    pub shadows_start: f32,
    pub shadows_end: f32,
    pub highlights_start: f32,
    pub highlights_end: f32,
}

impl Default for ShadowsMidtonesHighlights {
    fn default() -> Self {
        Self {
            shadows: Color::WHITE,
            midtones: Color::WHITE,
            highlights: Color::WHITE,
            shadows_start: 0.0,
            shadows_end: 0.3,
            highlights_start: 0.55,
            highlights_end: 1.0,
        }
    }
}

/// Long-lived post-processing settings, shared across frames.
#[derive(Debug, Clone, PartialEq)]
pub struct PostFxSettings {
    pub bloom: BloomSettings,
    pub tone_mapping: ToneMappingMode,
    pub color_adjustments: ColorAdjustments,
    pub white_balance: WhiteBalance,
    pub split_toning: SplitToning,
    pub channel_mixer: ChannelMixer,
    pub shadows_midtones_highlights: ShadowsMidtonesHighlights,
    /// The stack's uber shader. Loaded externally; `None` means the asset
    /// was never wired up, which is a configuration error.
    pub shader: Option<ShaderRef>,
}

impl PostFxSettings {
    pub fn new(shader: ShaderRef) -> Self {
        Self {
            bloom: BloomSettings::default(),
            tone_mapping: ToneMappingMode::None,
            color_adjustments: ColorAdjustments::default(),
            white_balance: WhiteBalance::default(),
            split_toning: SplitToning::default(),
            channel_mixer: ChannelMixer::default(),
            shadows_midtones_highlights: ShadowsMidtonesHighlights::default(),
            shader: Some(shader),
        }
    }

    /// The shader reference, or the configuration error a missing one is.
    pub fn shader(&self) -> Result<&ShaderRef, PipelineError> {
        self.shader.as_ref().ok_or(PipelineError::MissingShader)
    }
}
