//! Shadow configuration

use glam::Vec3;

use crate::error::PipelineError;

/// Power-of-two shadow atlas sizes.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMapSize {
    Px256 = 256,
    Px512 = 512,
    Px1024 = 1024,
    Px2048 = 2048,
    Px4096 = 4096,
    Px8192 = 8192,
}

impl ShadowMapSize {
    pub fn pixels(self) -> u32 {
        self as u32
    }
}

/// Shadow filter quality. `Pcf2x2` is the hardware default; the wider
/// kernels enable dedicated shader variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowFilter {
    Pcf2x2,
    Pcf3x3,
    Pcf5x5,
    Pcf7x7,
}

impl ShadowFilter {
    /// Filter footprint in texels, used for normal bias and culling sphere
    /// shrinking.
    pub fn tap_factor(self) -> f32 {
        self as u32 as f32 + 1.0
    }

    /// Index into the filter keyword table; negative disables them all.
    pub fn keyword_index(self) -> i32 {
        self as i32 - 1
    }
}

/// Cascaded shadow settings for directional lights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalShadows {
    pub atlas_size: ShadowMapSize,
    pub filter: ShadowFilter,
    /// Number of cascades, 1 to 4.
    pub cascade_count: u32,
    /// Split ratios of the inner three cascades, each in 0..1.
    pub cascade_ratios: [f32; 3],
    /// Fraction of the last cascade over which shadows fade out.
    pub cascade_fade: f32,
}

impl DirectionalShadows {
    pub fn ratios(&self) -> Vec3 {
        Vec3::from_array(self.cascade_ratios)
    }
}

impl Default for DirectionalShadows {
    fn default() -> Self {
        Self {
            atlas_size: ShadowMapSize::Px1024,
            filter: ShadowFilter::Pcf2x2,
            cascade_count: 4,
            cascade_ratios: [0.1, 0.25, 0.5],
            cascade_fade: 0.1,
        }
    }
}

/// Shadow settings for point and spot lights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdditionalShadows {
    pub atlas_size: ShadowMapSize,
    pub filter: ShadowFilter,
}

impl Default for AdditionalShadows {
    fn default() -> Self {
        Self {
            atlas_size: ShadowMapSize::Px1024,
            filter: ShadowFilter::Pcf2x2,
        }
    }
}

/// Immutable per-frame shadow configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    /// Realtime shadows are rendered up to this view distance.
    pub max_distance: f32,
    /// Fraction of the max distance over which shadows fade out.
    pub distance_fade: f32,
    pub directional: DirectionalShadows,
    pub additional: AdditionalShadows,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            distance_fade: 0.1,
            directional: DirectionalShadows::default(),
            additional: AdditionalShadows::default(),
        }
    }
}

impl ShadowSettings {
    /// Check the invariants the atlas packer indexes by.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_distance <= 0.0 {
            return Err(PipelineError::InvalidConfiguration(
                "shadow max distance must be positive".to_string(),
            ));
        }
        if !(0.001..=1.0).contains(&self.distance_fade) {
            return Err(PipelineError::InvalidConfiguration(
                "shadow distance fade must be in 0.001..=1".to_string(),
            ));
        }
        if !(1..=4).contains(&self.directional.cascade_count) {
            return Err(PipelineError::InvalidConfiguration(
                "cascade count must be 1 to 4".to_string(),
            ));
        }
        if self
            .directional
            .cascade_ratios
            .iter()
            .any(|r| !(0.0..=1.0).contains(r))
        {
            return Err(PipelineError::InvalidConfiguration(
                "cascade ratios must be in 0..=1".to_string(),
            ));
        }
        if !(0.001..=1.0).contains(&self.directional.cascade_fade) {
            return Err(PipelineError::InvalidConfiguration(
                "cascade fade must be in 0.001..=1".to_string(),
            ));
        }
        Ok(())
    }
}
