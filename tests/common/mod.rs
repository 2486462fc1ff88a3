//! Shared helpers for pipeline integration tests.

use glam::{Mat4, Vec4};

use forward_pipeline::{
    CameraDesc, PipelineSettings, PostFxSettings, RecordingDevice, RenderPipeline, ShaderRef,
    ShadowMode, StubScene, VisibleLight,
};

pub const CAMERA_RENDERER_SHADER: &str = "Hidden/CameraRenderer";
pub const POST_FX_SHADER: &str = "Hidden/PostFXStack";

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A pipeline without post effects.
pub fn plain_pipeline(device: &mut RecordingDevice) -> RenderPipeline {
    init_logs();
    let settings = PipelineSettings::new(ShaderRef::new(CAMERA_RENDERER_SHADER));
    RenderPipeline::new(device, settings).expect("pipeline construction")
}

/// A pipeline with the default post FX stack enabled.
pub fn post_fx_pipeline(device: &mut RecordingDevice) -> RenderPipeline {
    init_logs();
    let mut settings = PipelineSettings::new(ShaderRef::new(CAMERA_RENDERER_SHADER));
    settings.post_fx = Some(PostFxSettings::new(ShaderRef::new(POST_FX_SHADER)));
    RenderPipeline::new(device, settings).expect("pipeline construction")
}

/// One shadow-casting sun, full strength.
pub fn sun_scene() -> StubScene {
    StubScene::with_lights(vec![
        VisibleLight::directional(Vec4::new(1.0, 0.95, 0.9, 1.0), Mat4::IDENTITY)
            .with_shadows(ShadowMode::Soft, 1.0),
    ])
}

/// A sun plus a handful of shadowed point and spot lights.
pub fn mixed_scene() -> StubScene {
    let mut lights = vec![
        VisibleLight::directional(Vec4::ONE, Mat4::IDENTITY).with_shadows(ShadowMode::Soft, 1.0),
        VisibleLight::point(Vec4::ONE, Mat4::from_translation(glam::Vec3::X * 4.0), 10.0)
            .with_shadows(ShadowMode::Soft, 1.0),
    ];
    for i in 0..3 {
        lights.push(
            VisibleLight::spot(
                Vec4::ONE,
                Mat4::from_translation(glam::Vec3::Y * i as f32),
                15.0,
                60.0,
                40.0,
            )
            .with_shadows(ShadowMode::Hard, 0.8),
        );
    }
    StubScene::with_lights(lights)
}

/// Standard 1080p game camera.
pub fn game_camera() -> CameraDesc {
    CameraDesc::new(1920, 1080)
}
