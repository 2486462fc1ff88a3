//! Per-camera rendering.
//!
//! Orchestrates one camera's frame: cull, lighting and shadow setup,
//! opaque/skybox/transparent geometry, optional attachment copies, post
//! effects, and submission. Owns the intermediate attachment decision and
//! the small utility material used for copy blits.

use crate::backend::traits::{CullResults, DeviceCaps, RenderContext, RenderDevice, SceneSource};
use crate::backend::types::{
    BatchingFlags, BlendFactor, CameraDesc, ClearFlags, Color, FinalBlendMode,
    GeometryDrawSettings, LoadAction, MaterialId, PerObjectData, RenderQueueRange,
    RenderTargetDescriptor, RenderTargetId, ShaderRef, SortingCriteria, StoreAction,
    TextureFormat, TextureId,
};
use crate::diagnostics::Diagnostics;
use crate::error::PipelineError;
use crate::lighting::Lighting;
use crate::post_fx::PostFxStack;
use crate::properties::{ShaderIds, ShaderPropertyId};
use crate::settings::{CameraSettings, PostFxSettings, ShadowSettings};

const SAMPLE_NAME: &str = "Render Camera";

/// Pass indices into the camera renderer's utility material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyPass {
    Color,
    Depth,
}

/// Pipeline-wide parameters resolved for one camera's render.
pub struct FrameParams<'a> {
    pub allow_hdr: bool,
    pub batching: BatchingFlags,
    pub shadows: &'a ShadowSettings,
    pub post_fx: Option<&'a PostFxSettings>,
    pub post_fx_material: Option<MaterialId>,
    pub lut_resolution: u32,
}

/// Renders one camera per call; owns the copy material and the
/// placeholder texture bound when attachment copies are not requested.
pub struct CameraRenderer {
    ids: ShaderIds,
    caps: DeviceCaps,
    material: MaterialId,
    missing_texture: TextureId,
}

impl CameraRenderer {
    pub fn new(
        device: &mut dyn RenderDevice,
        shader: &ShaderRef,
        ids: ShaderIds,
    ) -> Result<Self, PipelineError> {
        let material = device.create_material(shader)?;
        let missing_texture = device.create_placeholder_texture("Missing", Color::gray(0.5));
        Ok(Self {
            ids,
            caps: device.caps(),
            material,
            missing_texture,
        })
    }

    pub fn ids(&self) -> &ShaderIds {
        &self.ids
    }

    /// Render one camera. A failed cull skips the camera silently; no
    /// GPU-visible work happens for it.
    pub fn render(
        &self,
        ctx: &mut dyn RenderContext,
        scene: &dyn SceneSource,
        camera: &CameraDesc,
        settings: &CameraSettings,
        frame: &FrameParams<'_>,
        diagnostics: &mut dyn Diagnostics,
    ) {
        diagnostics.prepare_scene_window(camera);

        let max_shadow_distance = frame.shadows.max_distance.min(camera.far_plane);
        let Some(cull) = scene.cull(camera, max_shadow_distance) else {
            log::debug!("cull query failed, skipping camera");
            diagnostics.cull_failed(camera);
            return;
        };

        let use_hdr = frame.allow_hdr && camera.allow_hdr;
        let frame_format = if use_hdr {
            self.caps.hdr_format
        } else {
            TextureFormat::Rgba8Unorm
        };

        ctx.begin_sample(SAMPLE_NAME);
        let lighting = Lighting::setup(ctx, &*cull, frame.shadows, &self.ids, self.caps);
        let stack = PostFxStack::setup(
            camera,
            frame.post_fx,
            frame.post_fx_material,
            use_hdr,
            self.caps,
            frame.lut_resolution,
            settings.final_blend,
            &self.ids,
        );
        ctx.end_sample(SAMPLE_NAME);

        ctx.setup_camera(camera);
        let mut flags = camera.clear_flags;
        // Post effects sample the whole attachment, so its background must
        // be defined.
        if stack.is_active() && flags > ClearFlags::Color {
            flags = ClearFlags::Color;
        }

        let use_color_texture = settings.copy_color;
        let use_depth_texture = settings.copy_depth;
        let use_intermediate = use_color_texture || use_depth_texture || stack.is_active();
        if use_intermediate {
            let width = camera.pixel_width();
            let height = camera.pixel_height();
            ctx.get_temporary_rt(
                self.ids.color_attachment,
                &RenderTargetDescriptor::color(width, height, frame_format),
            );
            ctx.get_temporary_rt(
                self.ids.depth_attachment,
                &RenderTargetDescriptor::depth(width, height),
            );
            ctx.set_render_target_with_depth(
                RenderTargetId::Temporary(self.ids.color_attachment),
                LoadAction::DontCare,
                StoreAction::Store,
                RenderTargetId::Temporary(self.ids.depth_attachment),
                LoadAction::DontCare,
                StoreAction::Store,
            );
        }
        ctx.clear_render_target(
            flags.clears_depth(),
            flags.clears_color(),
            if flags.clears_color() {
                camera.background_color
            } else {
                Color::CLEAR
            },
        );
        ctx.begin_sample(SAMPLE_NAME);

        // Defined bindings for shaders sampling scene color/depth even
        // when no copy was requested this frame.
        ctx.set_global_texture(
            self.ids.color_texture,
            RenderTargetId::Texture(self.missing_texture),
        );
        ctx.set_global_texture(
            self.ids.depth_texture,
            RenderTargetId::Texture(self.missing_texture),
        );

        self.draw_visible_geometry(
            ctx,
            &*cull,
            camera,
            frame.batching,
            use_color_texture,
            use_depth_texture,
            frame_format,
        );
        diagnostics.draw_unsupported(ctx);
        diagnostics.draw_pre_effect_overlays(ctx);

        if stack.is_active() {
            stack.render(ctx, self.ids.color_attachment);
        } else if use_intermediate {
            self.draw_final(ctx, settings.final_blend, camera);
        }
        diagnostics.draw_post_effect_overlays(ctx);

        lighting.cleanup(ctx, &self.ids);
        if use_intermediate {
            ctx.release_temporary_rt(self.ids.color_attachment);
            ctx.release_temporary_rt(self.ids.depth_attachment);
            if use_color_texture {
                ctx.release_temporary_rt(self.ids.color_texture);
            }
            if use_depth_texture {
                ctx.release_temporary_rt(self.ids.depth_texture);
            }
        }

        ctx.end_sample(SAMPLE_NAME);
        ctx.submit();
    }

    /// Tear down the owned material and placeholder texture.
    pub fn dispose(&mut self, device: &mut dyn RenderDevice) {
        device.destroy_material(self.material);
        device.destroy_texture(self.missing_texture);
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_visible_geometry(
        &self,
        ctx: &mut dyn RenderContext,
        cull: &dyn CullResults,
        camera: &CameraDesc,
        batching: BatchingFlags,
        use_color_texture: bool,
        use_depth_texture: bool,
        frame_format: TextureFormat,
    ) {
        let per_object = PerObjectData::REFLECTION_PROBES
            | PerObjectData::LIGHTMAPS
            | PerObjectData::SHADOW_MASK
            | PerObjectData::LIGHT_PROBE
            | PerObjectData::OCCLUSION_PROBE;

        ctx.draw_geometry(
            cull,
            &GeometryDrawSettings {
                queue_range: RenderQueueRange::Opaque,
                sorting: SortingCriteria::CommonOpaque,
                batching,
                per_object,
            },
        );
        ctx.draw_skybox(camera);

        // Copy before transparents so refraction-style sampling of the
        // scene behind a surface only ever sees opaque content.
        if use_color_texture || use_depth_texture {
            self.copy_attachments(ctx, camera, use_color_texture, use_depth_texture, frame_format);
        }

        ctx.draw_geometry(
            cull,
            &GeometryDrawSettings {
                queue_range: RenderQueueRange::Transparent,
                sorting: SortingCriteria::CommonTransparent,
                batching,
                per_object,
            },
        );
    }

    fn copy_attachments(
        &self,
        ctx: &mut dyn RenderContext,
        camera: &CameraDesc,
        use_color_texture: bool,
        use_depth_texture: bool,
        frame_format: TextureFormat,
    ) {
        let width = camera.pixel_width();
        let height = camera.pixel_height();

        if use_color_texture {
            ctx.get_temporary_rt(
                self.ids.color_texture,
                &RenderTargetDescriptor::color(width, height, frame_format),
            );
            if self.caps.copy_texture_supported {
                ctx.copy_texture(
                    RenderTargetId::Temporary(self.ids.color_attachment),
                    RenderTargetId::Temporary(self.ids.color_texture),
                );
            } else {
                self.copy(ctx, self.ids.color_attachment, self.ids.color_texture, CopyPass::Color);
            }
        }
        if use_depth_texture {
            ctx.get_temporary_rt(
                self.ids.depth_texture,
                &RenderTargetDescriptor::depth(width, height),
            );
            if self.caps.copy_texture_supported {
                ctx.copy_texture(
                    RenderTargetId::Temporary(self.ids.depth_attachment),
                    RenderTargetId::Temporary(self.ids.depth_texture),
                );
            } else {
                self.copy(ctx, self.ids.depth_attachment, self.ids.depth_texture, CopyPass::Depth);
            }
        }

        if !self.caps.copy_texture_supported {
            // The blit fallback rebound the target; restore the attachments
            // without losing their contents.
            ctx.set_render_target_with_depth(
                RenderTargetId::Temporary(self.ids.color_attachment),
                LoadAction::Load,
                StoreAction::Store,
                RenderTargetId::Temporary(self.ids.depth_attachment),
                LoadAction::Load,
                StoreAction::Store,
            );
        }
    }

    fn copy(
        &self,
        ctx: &mut dyn RenderContext,
        from: ShaderPropertyId,
        to: ShaderPropertyId,
        pass: CopyPass,
    ) {
        ctx.set_global_texture(self.ids.source_texture, RenderTargetId::Temporary(from));
        ctx.set_render_target(
            RenderTargetId::Temporary(to),
            LoadAction::DontCare,
            StoreAction::Store,
        );
        ctx.draw_fullscreen(self.material, pass as u32);
    }

    /// Blit the intermediate color attachment to the camera's real target
    /// when no post effects ran.
    fn draw_final(&self, ctx: &mut dyn RenderContext, blend: FinalBlendMode, camera: &CameraDesc) {
        ctx.set_global_float(self.ids.final_src_blend, blend.source.index() as f32);
        ctx.set_global_float(self.ids.final_dst_blend, blend.destination.index() as f32);
        ctx.set_global_texture(
            self.ids.source_texture,
            RenderTargetId::Temporary(self.ids.color_attachment),
        );
        let load = if blend.destination == BlendFactor::Zero && camera.viewport.is_full() {
            LoadAction::DontCare
        } else {
            LoadAction::Load
        };
        ctx.set_render_target(RenderTargetId::CameraTarget, load, StoreAction::Store);
        ctx.set_viewport(camera.pixel_rect);
        ctx.draw_fullscreen(self.material, CopyPass::Color as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Command, RecordingContext, RecordingDevice, StubScene};
    use crate::diagnostics::NullDiagnostics;
    use crate::properties::PropertyRegistry;
    use crate::settings::ShadowSettings;

    fn renderer(device: &mut RecordingDevice) -> CameraRenderer {
        let ids = ShaderIds::resolve(&mut PropertyRegistry::new());
        CameraRenderer::new(device, &ShaderRef::new("Hidden/CameraRenderer"), ids).unwrap()
    }

    fn frame_params(shadows: &ShadowSettings) -> FrameParams<'_> {
        FrameParams {
            allow_hdr: true,
            batching: BatchingFlags::SRP_BATCHER,
            shadows,
            post_fx: None,
            post_fx_material: None,
            lut_resolution: 32,
        }
    }

    #[test]
    fn test_fast_path_allocates_no_camera_targets() {
        let mut device = RecordingDevice::new();
        let renderer = renderer(&mut device);
        let shadows = ShadowSettings::default();
        let mut ctx = RecordingContext::new();

        renderer.render(
            &mut ctx,
            &StubScene::new(),
            &CameraDesc::new(800, 600),
            &CameraSettings::default(),
            &frame_params(&shadows),
            &mut NullDiagnostics,
        );

        // Only the two 1x1 shadow atlas placeholders; no intermediate
        // attachments, copies, or post FX targets.
        let acquired = ctx.acquired();
        assert_eq!(acquired.len(), 2);
        for (_, desc) in &acquired {
            assert_eq!((desc.width, desc.height), (1, 1));
        }
        assert!(ctx.leaked_targets().is_empty());
        assert_eq!(
            ctx.count(|c| matches!(c, Command::SetRenderTargetWithDepth { .. })),
            0
        );
        assert_eq!(ctx.submits(), 1);

        // Opaque, skybox, then transparent.
        let draws: Vec<&Command> = ctx
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::DrawGeometry(_) | Command::DrawSkybox))
            .collect();
        assert_eq!(draws.len(), 3);
        assert!(matches!(
            draws[0],
            Command::DrawGeometry(GeometryDrawSettings {
                queue_range: RenderQueueRange::Opaque,
                ..
            })
        ));
        assert!(matches!(draws[1], Command::DrawSkybox));
        assert!(matches!(
            draws[2],
            Command::DrawGeometry(GeometryDrawSettings {
                queue_range: RenderQueueRange::Transparent,
                ..
            })
        ));
    }

    #[test]
    fn test_cull_failure_skips_camera_entirely() {
        let mut device = RecordingDevice::new();
        let renderer = renderer(&mut device);
        let shadows = ShadowSettings::default();
        let mut ctx = RecordingContext::new();

        renderer.render(
            &mut ctx,
            &StubScene::failing(),
            &CameraDesc::new(800, 600),
            &CameraSettings::default(),
            &frame_params(&shadows),
            &mut NullDiagnostics,
        );

        assert!(ctx.commands().is_empty());
        assert_eq!(ctx.submits(), 0);
    }

    #[test]
    fn test_copy_color_uses_hardware_path_when_supported() {
        let mut device = RecordingDevice::new();
        let renderer = renderer(&mut device);
        let shadows = ShadowSettings::default();
        let settings = CameraSettings {
            copy_color: true,
            ..CameraSettings::default()
        };
        let mut ctx = RecordingContext::new();

        renderer.render(
            &mut ctx,
            &StubScene::new(),
            &CameraDesc::new(800, 600),
            &settings,
            &frame_params(&shadows),
            &mut NullDiagnostics,
        );

        assert_eq!(ctx.count(|c| matches!(c, Command::CopyTexture { .. })), 1);
        assert_eq!(ctx.acquires_of(renderer.ids().color_texture), 1);
        assert_eq!(ctx.releases_of(renderer.ids().color_texture), 1);
        assert!(ctx.leaked_targets().is_empty());
    }

    #[test]
    fn test_copy_falls_back_to_blit_without_hardware_support() {
        let caps = DeviceCaps {
            copy_texture_supported: false,
            ..DeviceCaps::default()
        };
        let mut device = RecordingDevice::with_caps(caps);
        let renderer = renderer(&mut device);
        let shadows = ShadowSettings::default();
        let settings = CameraSettings {
            copy_color: true,
            copy_depth: true,
            ..CameraSettings::default()
        };
        let mut ctx = RecordingContext::new();

        renderer.render(
            &mut ctx,
            &StubScene::new(),
            &CameraDesc::new(800, 600),
            &settings,
            &frame_params(&shadows),
            &mut NullDiagnostics,
        );

        assert_eq!(ctx.count(|c| matches!(c, Command::CopyTexture { .. })), 0);
        // Two blit draws plus the final composite blit.
        assert_eq!(
            ctx.count(|c| matches!(c, Command::DrawFullscreen { .. })),
            3
        );
        // Attachments are re-bound with Load after the blits.
        assert_eq!(
            ctx.count(|c| matches!(
                c,
                Command::SetRenderTargetWithDepth {
                    color_load: LoadAction::Load,
                    ..
                }
            )),
            1
        );
        assert!(ctx.leaked_targets().is_empty());
    }

    #[test]
    fn test_copies_happen_between_skybox_and_transparents() {
        let mut device = RecordingDevice::new();
        let renderer = renderer(&mut device);
        let shadows = ShadowSettings::default();
        let settings = CameraSettings {
            copy_color: true,
            ..CameraSettings::default()
        };
        let mut ctx = RecordingContext::new();

        renderer.render(
            &mut ctx,
            &StubScene::new(),
            &CameraDesc::new(800, 600),
            &settings,
            &frame_params(&shadows),
            &mut NullDiagnostics,
        );

        let skybox_at = ctx
            .commands()
            .iter()
            .position(|c| matches!(c, Command::DrawSkybox))
            .unwrap();
        let copy_at = ctx
            .commands()
            .iter()
            .position(|c| matches!(c, Command::CopyTexture { .. }))
            .unwrap();
        let transparent_at = ctx
            .commands()
            .iter()
            .position(|c| {
                matches!(
                    c,
                    Command::DrawGeometry(GeometryDrawSettings {
                        queue_range: RenderQueueRange::Transparent,
                        ..
                    })
                )
            })
            .unwrap();
        assert!(skybox_at < copy_at && copy_at < transparent_at);
    }

    #[test]
    fn test_dispose_releases_owned_resources() {
        let mut device = RecordingDevice::new();
        let mut renderer = renderer(&mut device);
        renderer.dispose(&mut device);
        assert_eq!(device.destroyed_materials.len(), 1);
        assert_eq!(device.destroyed_textures.len(), 1);
    }
}
