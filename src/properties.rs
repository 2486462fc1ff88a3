//! Shader property registry.
//!
//! Global shader parameters and temporary render targets are addressed by
//! stable integer handles rather than string lookups per frame. The
//! [`PropertyRegistry`] interns semantic names once; [`ShaderIds`] resolves
//! every property the pipeline touches at construction time.

use std::collections::HashMap;

/// Stable handle to a named shader property.
///
/// `ShaderPropertyId` is `Copy` and cheap to pass around. It is only valid
/// within the [`PropertyRegistry`] that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderPropertyId(u32);

impl ShaderPropertyId {
    /// Raw index of the handle.
    pub fn index(self) -> u32 {
        self.0
    }

    pub(crate) fn offset(self, levels: u32) -> Self {
        Self(self.0 + levels)
    }
}

/// Interns shader property names to stable handles.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    names: Vec<String>,
    lookup: HashMap<String, ShaderPropertyId>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a property name to its stable handle, interning it on first
    /// use. Repeated calls with the same name return the same handle.
    pub fn id(&mut self, name: &str) -> ShaderPropertyId {
        if let Some(id) = self.lookup.get(name) {
            return *id;
        }
        let id = ShaderPropertyId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), id);
        id
    }

    /// Get the name behind a handle, if it was interned here.
    pub fn name(&self, id: ShaderPropertyId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Maximum number of bloom pyramid levels; each level uses two targets
/// (horizontal blur scratch + downsampled result).
pub const MAX_BLOOM_PYRAMID_LEVELS: u32 = 16;

/// Every shader property the pipeline writes, resolved once.
#[derive(Debug, Clone)]
pub struct ShaderIds {
    // Shadow atlas
    pub directional_shadow_atlas: ShaderPropertyId,
    pub directional_shadow_matrices: ShaderPropertyId,
    pub additional_shadow_atlas: ShaderPropertyId,
    pub additional_shadow_matrices: ShaderPropertyId,
    pub additional_shadow_tiles: ShaderPropertyId,
    pub cascade_count: ShaderPropertyId,
    pub cascade_culling_spheres: ShaderPropertyId,
    pub cascade_data: ShaderPropertyId,
    pub shadow_atlas_size: ShaderPropertyId,
    pub shadow_distance_fade: ShaderPropertyId,
    pub shadow_pancaking: ShaderPropertyId,

    // Lighting
    pub directional_light_count: ShaderPropertyId,
    pub directional_light_colors: ShaderPropertyId,
    pub directional_light_directions: ShaderPropertyId,
    pub directional_light_shadow_data: ShaderPropertyId,
    pub additional_light_count: ShaderPropertyId,
    pub additional_light_colors: ShaderPropertyId,
    pub additional_light_positions: ShaderPropertyId,
    pub additional_light_directions: ShaderPropertyId,
    pub additional_light_spot_angles: ShaderPropertyId,
    pub additional_light_shadow_data: ShaderPropertyId,

    // Post effects
    pub fx_source: ShaderPropertyId,
    pub fx_source2: ShaderPropertyId,
    pub bloom_prefilter: ShaderPropertyId,
    pub bloom_threshold: ShaderPropertyId,
    pub bloom_intensity: ShaderPropertyId,
    pub bloom_bicubic_upsampling: ShaderPropertyId,
    pub bloom_result: ShaderPropertyId,
    pub color_adjustments: ShaderPropertyId,
    pub color_filter: ShaderPropertyId,
    pub white_balance: ShaderPropertyId,
    pub split_toning_shadows: ShaderPropertyId,
    pub split_toning_highlights: ShaderPropertyId,
    pub channel_mixer_red: ShaderPropertyId,
    pub channel_mixer_green: ShaderPropertyId,
    pub channel_mixer_blue: ShaderPropertyId,
    pub smh_shadows: ShaderPropertyId,
    pub smh_midtones: ShaderPropertyId,
    pub smh_highlights: ShaderPropertyId,
    pub smh_range: ShaderPropertyId,
    pub color_grading_lut: ShaderPropertyId,
    pub color_grading_lut_parameters: ShaderPropertyId,
    pub color_grading_lut_in_log_c: ShaderPropertyId,
    pub final_src_blend: ShaderPropertyId,
    pub final_dst_blend: ShaderPropertyId,

    // Camera attachments
    pub color_attachment: ShaderPropertyId,
    pub depth_attachment: ShaderPropertyId,
    pub color_texture: ShaderPropertyId,
    pub depth_texture: ShaderPropertyId,
    pub source_texture: ShaderPropertyId,

    bloom_pyramid: ShaderPropertyId,
}

impl ShaderIds {
    /// Resolve the full property set. The bloom pyramid level names are
    /// interned back to back so walking the pyramid is index arithmetic.
    pub fn resolve(registry: &mut PropertyRegistry) -> Self {
        let bloom_pyramid = registry.id("_BloomPyramid0");
        for level in 1..MAX_BLOOM_PYRAMID_LEVELS * 2 {
            let id = registry.id(&format!("_BloomPyramid{level}"));
            debug_assert_eq!(id.index(), bloom_pyramid.index() + level);
        }

        Self {
            directional_shadow_atlas: registry.id("_DirectionalShadowAtlas"),
            directional_shadow_matrices: registry.id("_DirectionalShadowMatrices"),
            additional_shadow_atlas: registry.id("_AdditionalShadowAtlas"),
            additional_shadow_matrices: registry.id("_AdditionalShadowMatrices"),
            additional_shadow_tiles: registry.id("_AdditionalShadowTiles"),
            cascade_count: registry.id("_CascadeCount"),
            cascade_culling_spheres: registry.id("_CascadeCullingSpheres"),
            cascade_data: registry.id("_CascadeData"),
            shadow_atlas_size: registry.id("_ShadowAtlasSize"),
            shadow_distance_fade: registry.id("_ShadowDistanceFade"),
            shadow_pancaking: registry.id("_ShadowPancaking"),

            directional_light_count: registry.id("_DirectionalLightCount"),
            directional_light_colors: registry.id("_DirectionalLightColors"),
            directional_light_directions: registry.id("_DirectionalLightDirections"),
            directional_light_shadow_data: registry.id("_DirectionalLightShadowData"),
            additional_light_count: registry.id("_AdditionalLightCount"),
            additional_light_colors: registry.id("_AdditionalLightColors"),
            additional_light_positions: registry.id("_AdditionalLightPositions"),
            additional_light_directions: registry.id("_AdditionalLightDirections"),
            additional_light_spot_angles: registry.id("_AdditionalLightSpotAngles"),
            additional_light_shadow_data: registry.id("_AdditionalLightShadowData"),

            fx_source: registry.id("_PostFXSource"),
            fx_source2: registry.id("_PostFXSource2"),
            bloom_prefilter: registry.id("_BloomPrefilter"),
            bloom_threshold: registry.id("_BloomThreshold"),
            bloom_intensity: registry.id("_BloomIntensity"),
            bloom_bicubic_upsampling: registry.id("_BloomBicubicUpsampling"),
            bloom_result: registry.id("_BloomResult"),
            color_adjustments: registry.id("_ColorAdjustments"),
            color_filter: registry.id("_ColorFilter"),
            white_balance: registry.id("_WhiteBalance"),
            split_toning_shadows: registry.id("_SplitToningShadows"),
            split_toning_highlights: registry.id("_SplitToningHighlights"),
            channel_mixer_red: registry.id("_ChannelMixerRed"),
            channel_mixer_green: registry.id("_ChannelMixerGreen"),
            channel_mixer_blue: registry.id("_ChannelMixerBlue"),
            smh_shadows: registry.id("_SMHShadows"),
            smh_midtones: registry.id("_SMHMidtones"),
            smh_highlights: registry.id("_SMHHighlights"),
            smh_range: registry.id("_SMHRange"),
            color_grading_lut: registry.id("_ColorGradingLUT"),
            color_grading_lut_parameters: registry.id("_ColorGradingLUTParameters"),
            color_grading_lut_in_log_c: registry.id("_ColorGradingLUTInLogC"),
            final_src_blend: registry.id("_FinalSrcBlend"),
            final_dst_blend: registry.id("_FinalDstBlend"),

            color_attachment: registry.id("_CameraColorAttachment"),
            depth_attachment: registry.id("_CameraDepthAttachment"),
            color_texture: registry.id("_CameraColorTexture"),
            depth_texture: registry.id("_CameraDepthTexture"),
            source_texture: registry.id("_SourceTexture"),

            bloom_pyramid,
        }
    }

    /// Handle for a bloom pyramid target. Even slots hold the horizontal
    /// blur scratch of a level, odd slots the level's downsampled result.
    pub fn bloom_pyramid(&self, slot: u32) -> ShaderPropertyId {
        debug_assert!(slot < MAX_BLOOM_PYRAMID_LEVELS * 2);
        self.bloom_pyramid.offset(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_stable() {
        let mut registry = PropertyRegistry::new();
        let a = registry.id("_Foo");
        let b = registry.id("_Bar");
        assert_ne!(a, b);
        assert_eq!(registry.id("_Foo"), a);
        assert_eq!(registry.name(a), Some("_Foo"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bloom_pyramid_slots_are_contiguous() {
        let mut registry = PropertyRegistry::new();
        let ids = ShaderIds::resolve(&mut registry);
        let base = ids.bloom_pyramid(0);
        for slot in 0..MAX_BLOOM_PYRAMID_LEVELS * 2 {
            assert_eq!(ids.bloom_pyramid(slot).index(), base.index() + slot);
        }
        assert_eq!(registry.name(base), Some("_BloomPyramid0"));
        assert_eq!(registry.name(ids.bloom_pyramid(7)), Some("_BloomPyramid7"));
    }

    #[test]
    fn test_resolve_is_collision_free() {
        let mut registry = PropertyRegistry::new();
        let ids = ShaderIds::resolve(&mut registry);
        assert_ne!(ids.fx_source, ids.fx_source2);
        assert_ne!(ids.color_attachment, ids.depth_attachment);
        // Resolving twice against the same registry yields identical handles.
        let again = ShaderIds::resolve(&mut registry);
        assert_eq!(ids.directional_shadow_atlas, again.directional_shadow_atlas);
        assert_eq!(ids.final_dst_blend, again.final_dst_blend);
    }
}
