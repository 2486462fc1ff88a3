//! Pipeline entry point.
//!
//! Validates configuration once, then renders cameras strictly
//! sequentially in host order. One camera's failure never affects the
//! next: the only per-camera abort is a failed cull, which degrades to a
//! no-op.

use std::collections::HashMap;

use crate::backend::traits::{RenderContext, RenderDevice, SceneSource};
use crate::backend::types::{BatchingFlags, CameraDesc, MaterialId, ShaderRef};
use crate::diagnostics::{Diagnostics, NullDiagnostics};
use crate::error::PipelineError;
use crate::properties::{PropertyRegistry, ShaderIds};
use crate::renderer::{CameraRenderer, FrameParams};
use crate::settings::{CameraSettings, PostFxSettings, ShadowSettings};

/// Pipeline-wide configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub allow_hdr: bool,
    pub batching: BatchingFlags,
    pub shadows: ShadowSettings,
    /// Default post FX settings; `None` disables the stack pipeline-wide.
    pub post_fx: Option<PostFxSettings>,
    /// Height of the color grading LUT; its width is the square.
    pub color_lut_resolution: u32,
    /// Shader for the camera renderer's copy passes.
    pub camera_renderer_shader: ShaderRef,
}

impl PipelineSettings {
    pub fn new(camera_renderer_shader: ShaderRef) -> Self {
        Self {
            allow_hdr: true,
            batching: BatchingFlags::SRP_BATCHER,
            shadows: ShadowSettings::default(),
            post_fx: None,
            color_lut_resolution: 32,
            camera_renderer_shader,
        }
    }
}

/// One camera to render, with its optional per-camera overrides.
#[derive(Debug, Clone)]
pub struct HostCamera {
    pub desc: CameraDesc,
    pub overrides: Option<CameraSettings>,
}

impl HostCamera {
    pub fn new(desc: CameraDesc) -> Self {
        Self {
            desc,
            overrides: None,
        }
    }

    pub fn with_settings(desc: CameraDesc, settings: CameraSettings) -> Self {
        Self {
            desc,
            overrides: Some(settings),
        }
    }
}

/// One material per distinct shader, created lazily and owned by the
/// pipeline until teardown.
#[derive(Debug, Default)]
struct MaterialCache {
    entries: HashMap<String, MaterialId>,
}

impl MaterialCache {
    fn get_or_create(
        &mut self,
        device: &mut dyn RenderDevice,
        shader: &ShaderRef,
    ) -> Result<MaterialId, PipelineError> {
        if let Some(id) = self.entries.get(shader.name()) {
            return Ok(*id);
        }
        let id = device.create_material(shader)?;
        self.entries.insert(shader.name().to_string(), id);
        Ok(id)
    }

    fn dispose(&mut self, device: &mut dyn RenderDevice) {
        for (_, id) in self.entries.drain() {
            device.destroy_material(id);
        }
    }
}

/// The forward render pipeline.
pub struct RenderPipeline {
    settings: PipelineSettings,
    renderer: CameraRenderer,
    materials: MaterialCache,
    diagnostics: Box<dyn Diagnostics>,
    default_camera_settings: CameraSettings,
}

impl RenderPipeline {
    /// Build the pipeline, resolving shader properties and validating the
    /// configuration. A missing or broken shader reference fails here,
    /// never per frame.
    pub fn new(
        device: &mut dyn RenderDevice,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        settings.shadows.validate()?;
        if settings.color_lut_resolution < 2 {
            return Err(PipelineError::InvalidConfiguration(
                "color LUT resolution must be at least 2".to_string(),
            ));
        }

        let mut registry = PropertyRegistry::new();
        let ids = ShaderIds::resolve(&mut registry);
        let renderer = CameraRenderer::new(device, &settings.camera_renderer_shader, ids)?;

        let mut materials = MaterialCache::default();
        if let Some(post_fx) = &settings.post_fx {
            materials.get_or_create(device, post_fx.shader()?)?;
        }

        log::debug!(
            "render pipeline ready: hdr={}, lut={}, {} shader properties",
            settings.allow_hdr,
            settings.color_lut_resolution,
            registry.len()
        );

        Ok(Self {
            settings,
            renderer,
            materials,
            diagnostics: Box::new(NullDiagnostics),
            default_camera_settings: CameraSettings::default(),
        })
    }

    /// Replace the diagnostics observer (editor hosts install theirs here).
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Render all cameras for one frame, in the order given.
    pub fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        ctx: &mut dyn RenderContext,
        scene: &dyn SceneSource,
        cameras: &[HostCamera],
    ) {
        for camera in cameras {
            let settings = camera
                .overrides
                .as_ref()
                .unwrap_or(&self.default_camera_settings);
            let post_fx = settings.resolve_post_fx(self.settings.post_fx.as_ref());
            let post_fx_material = post_fx.and_then(|fx| match fx.shader() {
                Ok(shader) => match self.materials.get_or_create(device, shader) {
                    Ok(id) => Some(id),
                    Err(err) => {
                        log::warn!("post FX material unavailable: {err}");
                        None
                    }
                },
                Err(err) => {
                    log::warn!("post FX disabled for camera: {err}");
                    None
                }
            });

            let frame = FrameParams {
                allow_hdr: self.settings.allow_hdr,
                batching: self.settings.batching,
                shadows: &self.settings.shadows,
                post_fx,
                post_fx_material,
                lut_resolution: self.settings.color_lut_resolution,
            };
            self.renderer.render(
                ctx,
                scene,
                &camera.desc,
                settings,
                &frame,
                self.diagnostics.as_mut(),
            );
        }
    }

    /// Release every GPU object the pipeline owns.
    pub fn dispose(&mut self, device: &mut dyn RenderDevice) {
        self.renderer.dispose(device);
        self.materials.dispose(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{RecordingContext, RecordingDevice, StubScene};
    use crate::backend::traits::CullResults;

    fn settings_with_post_fx() -> PipelineSettings {
        let mut settings = PipelineSettings::new(ShaderRef::new("Hidden/CameraRenderer"));
        settings.post_fx = Some(PostFxSettings::new(ShaderRef::new("Hidden/PostFXStack")));
        settings
    }

    #[test]
    fn test_construction_fails_fast_on_missing_shader() {
        let mut device = RecordingDevice::new();
        let mut settings = settings_with_post_fx();
        settings.post_fx.as_mut().unwrap().shader = None;
        let err = RenderPipeline::new(&mut device, settings).err().unwrap();
        assert_eq!(err, PipelineError::MissingShader);
    }

    #[test]
    fn test_construction_fails_fast_on_broken_shader() {
        let mut device = RecordingDevice::new();
        device.broken_shaders.push("Hidden/PostFXStack".to_string());
        let err = RenderPipeline::new(&mut device, settings_with_post_fx())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::MaterialCreationFailed { .. }));
    }

    #[test]
    fn test_post_fx_material_is_created_once() {
        let mut device = RecordingDevice::new();
        let mut pipeline = RenderPipeline::new(&mut device, settings_with_post_fx()).unwrap();
        let mut ctx = RecordingContext::new();
        let scene = StubScene::new();
        let cameras = vec![
            HostCamera::new(CameraDesc::new(640, 480)),
            HostCamera::new(CameraDesc::new(640, 480)),
        ];
        pipeline.render(&mut device, &mut ctx, &scene, &cameras);

        let fx_materials = device
            .created_materials
            .iter()
            .filter(|(name, _)| name == "Hidden/PostFXStack")
            .count();
        assert_eq!(fx_materials, 1);
        assert_eq!(ctx.submits(), 2);
    }

    /// Fails culling for cameras narrower than 16 pixels.
    struct FlakyScene {
        inner: StubScene,
    }

    impl SceneSource for FlakyScene {
        fn cull(
            &self,
            camera: &CameraDesc,
            max_shadow_distance: f32,
        ) -> Option<Box<dyn CullResults + '_>> {
            if camera.pixel_width() < 16 {
                return None;
            }
            self.inner.cull(camera, max_shadow_distance)
        }
    }

    #[test]
    fn test_one_cameras_cull_failure_does_not_abort_others() {
        let mut device = RecordingDevice::new();
        let mut pipeline =
            RenderPipeline::new(&mut device, settings_with_post_fx()).unwrap();
        let mut ctx = RecordingContext::new();
        let scene = FlakyScene {
            inner: StubScene::new(),
        };
        let cameras = vec![
            HostCamera::new(CameraDesc::new(8, 8)),
            HostCamera::new(CameraDesc::new(640, 480)),
        ];
        pipeline.render(&mut device, &mut ctx, &scene, &cameras);
        assert_eq!(ctx.submits(), 1);
        assert!(ctx.leaked_targets().is_empty());
    }

    #[test]
    fn test_dispose_destroys_owned_materials() {
        let mut device = RecordingDevice::new();
        let mut pipeline = RenderPipeline::new(&mut device, settings_with_post_fx()).unwrap();
        pipeline.dispose(&mut device);
        // Camera renderer material plus the post FX material.
        assert_eq!(device.destroyed_materials.len(), 2);
        assert_eq!(device.destroyed_textures.len(), 1);
    }

    #[test]
    fn test_invalid_lut_resolution_is_rejected() {
        let mut device = RecordingDevice::new();
        let mut settings = settings_with_post_fx();
        settings.color_lut_resolution = 1;
        assert!(RenderPipeline::new(&mut device, settings).is_err());
    }
}
