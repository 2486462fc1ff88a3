//! Long-lived configuration objects.
//!
//! Settings are loaded externally and shared across frames; the pipeline
//! treats them as immutable per-frame input.

mod camera;
mod post_fx;
mod shadow;

pub use camera::CameraSettings;
pub use post_fx::{
    BloomMode, BloomSettings, ChannelMixer, ColorAdjustments, PostFxSettings,
    ShadowsMidtonesHighlights, SplitToning, ToneMappingMode, WhiteBalance,
};
pub use shadow::{
    AdditionalShadows, DirectionalShadows, ShadowFilter, ShadowMapSize, ShadowSettings,
};
