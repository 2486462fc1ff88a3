//! Per-camera overrides

use crate::backend::types::FinalBlendMode;
use crate::settings::post_fx::PostFxSettings;

/// Optional per-camera settings; anything absent falls back to the
/// pipeline-wide defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraSettings {
    /// Copy the opaque color attachment into a sampler-visible texture
    /// before transparents draw.
    pub copy_color: bool,
    /// Same for the depth attachment.
    pub copy_depth: bool,
    /// Replace the pipeline's post FX settings with [`Self::post_fx`].
    pub override_post_fx: bool,
    pub post_fx: Option<PostFxSettings>,
    /// Blend factors for the final composite into the camera target.
    pub final_blend: FinalBlendMode,
}

impl CameraSettings {
    /// Resolve the post FX settings that apply to this camera.
    pub fn resolve_post_fx<'a>(
        &'a self,
        pipeline_default: Option<&'a PostFxSettings>,
    ) -> Option<&'a PostFxSettings> {
        if self.override_post_fx {
            self.post_fx.as_ref()
        } else {
            pipeline_default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::ShaderRef;

    #[test]
    fn test_post_fx_resolution_falls_back_to_default() {
        let default = PostFxSettings::new(ShaderRef::new("Hidden/PostFXStack"));
        let settings = CameraSettings::default();
        assert!(settings.resolve_post_fx(Some(&default)).is_some());

        let suppressed = CameraSettings {
            override_post_fx: true,
            post_fx: None,
            ..CameraSettings::default()
        };
        assert!(suppressed.resolve_post_fx(Some(&default)).is_none());

        let mut replaced = PostFxSettings::new(ShaderRef::new("Hidden/Other"));
        replaced.bloom.max_iterations = 3;
        let overridden = CameraSettings {
            override_post_fx: true,
            post_fx: Some(replaced.clone()),
            ..CameraSettings::default()
        };
        assert_eq!(
            overridden.resolve_post_fx(Some(&default)),
            Some(&replaced)
        );
    }
}
