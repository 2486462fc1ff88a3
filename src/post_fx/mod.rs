//! Post-processing stack.
//!
//! A fixed sequence of full-screen passes over the camera's rendered
//! color: bloom through a half-resolution blur pyramid, a color grading
//! LUT bake with tone mapping, and the final composite into the camera's
//! target. Every temporary target acquired here is released before the
//! frame submits.

use glam::{Vec3, Vec4};

use crate::backend::traits::{DeviceCaps, RenderContext};
use crate::backend::types::{
    gamma_to_linear, BlendFactor, CameraDesc, CameraType, FinalBlendMode, LoadAction, MaterialId,
    RenderTargetDescriptor, RenderTargetId, StoreAction, TextureFormat,
};
use crate::properties::{ShaderIds, ShaderPropertyId};
use crate::settings::{BloomMode, PostFxSettings, ToneMappingMode};

const SAMPLE_NAME: &str = "Post FX";

/// Pass indices into the stack's uber material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxPass {
    BloomAdd,
    BloomHorizontal,
    BloomPrefilter,
    BloomPrefilterFireflies,
    BloomScatter,
    BloomScatterFinal,
    BloomVertical,
    Copy,
    ColorGradingNone,
    ColorGradingAces,
    ColorGradingNeutral,
    ColorGradingReinhard,
    Final,
}

impl FxPass {
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Per-frame post FX state for one camera.
///
/// Inactive stacks (wrong camera type, suppressed image effects, no
/// settings, or a missing material) skip rendering entirely; the camera
/// renderer then blits the intermediate buffer itself.
pub struct PostFxStack<'a> {
    camera: &'a CameraDesc,
    ids: &'a ShaderIds,
    settings: Option<&'a PostFxSettings>,
    material: MaterialId,
    use_hdr: bool,
    frame_format: TextureFormat,
    lut_format: TextureFormat,
    lut_resolution: u32,
    final_blend: FinalBlendMode,
}

impl<'a> PostFxStack<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn setup(
        camera: &'a CameraDesc,
        settings: Option<&'a PostFxSettings>,
        material: Option<MaterialId>,
        use_hdr: bool,
        caps: DeviceCaps,
        lut_resolution: u32,
        final_blend: FinalBlendMode,
        ids: &'a ShaderIds,
    ) -> Self {
        let applies =
            camera.camera_type <= CameraType::SceneView && !camera.suppress_image_effects;
        let settings = if applies { settings } else { None };
        let (settings, material) = match (settings, material) {
            (Some(settings), Some(material)) => (Some(settings), material),
            (Some(_), None) => {
                log::warn!("post FX settings present but material missing, stack disabled");
                (None, MaterialId(0))
            }
            (None, _) => (None, MaterialId(0)),
        };

        Self {
            camera,
            ids,
            settings,
            material,
            use_hdr,
            frame_format: if use_hdr {
                caps.hdr_format
            } else {
                TextureFormat::Rgba8Unorm
            },
            lut_format: caps.hdr_format,
            lut_resolution,
            final_blend,
        }
    }

    pub fn is_active(&self) -> bool {
        self.settings.is_some()
    }

    /// Run the stack over the camera's color attachment, compositing into
    /// the camera's real target.
    pub fn render(&self, ctx: &mut dyn RenderContext, source: ShaderPropertyId) {
        let Some(settings) = self.settings else {
            return;
        };

        ctx.begin_sample(SAMPLE_NAME);
        if self.bloom(ctx, settings, source) {
            self.color_grading_and_tone_mapping(ctx, settings, self.ids.bloom_result);
            ctx.release_temporary_rt(self.ids.bloom_result);
        } else {
            // Bloom inactive: grading and tone mapping still run on the
            // unmodified source.
            self.color_grading_and_tone_mapping(ctx, settings, source);
        }
        ctx.end_sample(SAMPLE_NAME);
    }

    fn draw(
        &self,
        ctx: &mut dyn RenderContext,
        from: ShaderPropertyId,
        to: RenderTargetId,
        pass: FxPass,
    ) {
        ctx.set_global_texture(self.ids.fx_source, RenderTargetId::Temporary(from));
        ctx.set_render_target(to, LoadAction::DontCare, StoreAction::Store);
        ctx.draw_fullscreen(self.material, pass.index());
    }

    fn draw_final(&self, ctx: &mut dyn RenderContext, from: ShaderPropertyId) {
        ctx.set_global_float(
            self.ids.final_src_blend,
            self.final_blend.source.index() as f32,
        );
        ctx.set_global_float(
            self.ids.final_dst_blend,
            self.final_blend.destination.index() as f32,
        );
        ctx.set_global_texture(self.ids.fx_source, RenderTargetId::Temporary(from));
        // Skipping the load is only safe when this draw overwrites the
        // whole target.
        let load = if self.final_blend.destination == BlendFactor::Zero
            && self.camera.viewport.is_full()
        {
            LoadAction::DontCare
        } else {
            LoadAction::Load
        };
        ctx.set_render_target(RenderTargetId::CameraTarget, load, StoreAction::Store);
        ctx.set_viewport(self.camera.pixel_rect);
        ctx.draw_fullscreen(self.material, FxPass::Final.index());
    }

    /// Build and combine the bloom pyramid. Returns `false` when bloom is
    /// inactive and the source should flow to grading unchanged.
    fn bloom(
        &self,
        ctx: &mut dyn RenderContext,
        settings: &PostFxSettings,
        source: ShaderPropertyId,
    ) -> bool {
        let bloom = &settings.bloom;
        let mut width = self.camera.pixel_width() / 2;
        let mut height = self.camera.pixel_height() / 2;

        if bloom.max_iterations == 0
            || bloom.intensity <= 0.0
            || height < bloom.downscale_limit * 2
            || width < bloom.downscale_limit * 2
        {
            return false;
        }

        ctx.begin_sample("Bloom");

        // Soft knee curve of the threshold, precomputed for the prefilter.
        let t = gamma_to_linear(bloom.threshold);
        let mut threshold = Vec4::new(t, t * bloom.threshold_knee, 0.0, 0.0);
        threshold.z = 2.0 * threshold.y;
        threshold.w = 0.25 / (threshold.y + 0.00001);
        threshold.y -= threshold.x;
        ctx.set_global_vector(self.ids.bloom_threshold, threshold);

        let format = self.frame_format;
        ctx.get_temporary_rt(
            self.ids.bloom_prefilter,
            &RenderTargetDescriptor::color(width, height, format),
        );
        self.draw(
            ctx,
            source,
            RenderTargetId::Temporary(self.ids.bloom_prefilter),
            if bloom.fade_fireflies {
                FxPass::BloomPrefilterFireflies
            } else {
                FxPass::BloomPrefilter
            },
        );

        let mut from_id = self.ids.bloom_prefilter;
        let mut to_slot: u32 = 1;
        let mut iterations = 0u32;
        while iterations < bloom.max_iterations {
            if width < bloom.downscale_limit || height < bloom.downscale_limit {
                break;
            }
            let mid_id = self.ids.bloom_pyramid(to_slot - 1);
            let to_id = self.ids.bloom_pyramid(to_slot);
            let desc = RenderTargetDescriptor::color(width, height, format);
            ctx.get_temporary_rt(mid_id, &desc);
            ctx.get_temporary_rt(to_id, &desc);
            self.draw(
                ctx,
                from_id,
                RenderTargetId::Temporary(mid_id),
                FxPass::BloomHorizontal,
            );
            self.draw(
                ctx,
                mid_id,
                RenderTargetId::Temporary(to_id),
                FxPass::BloomVertical,
            );
            from_id = to_id;
            to_slot += 2;
            width /= 2;
            height /= 2;
            iterations += 1;
        }

        ctx.release_temporary_rt(self.ids.bloom_prefilter);
        ctx.set_global_float(
            self.ids.bloom_bicubic_upsampling,
            if bloom.bicubic_upsampling { 1.0 } else { 0.0 },
        );

        let (combine_pass, final_pass, final_intensity) = match bloom.mode {
            BloomMode::Additive => {
                ctx.set_global_float(self.ids.bloom_intensity, 1.0);
                (FxPass::BloomAdd, FxPass::BloomAdd, bloom.intensity)
            }
            BloomMode::Scattering => {
                ctx.set_global_float(self.ids.bloom_intensity, bloom.scatter);
                (
                    FxPass::BloomScatter,
                    FxPass::BloomScatterFinal,
                    bloom.intensity.min(0.95),
                )
            }
        };

        if iterations > 1 {
            // Walk back up the pyramid, combining each level into the
            // horizontal scratch of the level above.
            let mut from_slot = to_slot as i32 - 2;
            let mut dest_slot = to_slot as i32 - 5;
            ctx.release_temporary_rt(self.ids.bloom_pyramid(from_slot as u32 - 1));
            for _ in 1..iterations {
                let dest = self.ids.bloom_pyramid(dest_slot as u32);
                let dest_partner = self.ids.bloom_pyramid(dest_slot as u32 + 1);
                ctx.set_global_texture(
                    self.ids.fx_source2,
                    RenderTargetId::Temporary(dest_partner),
                );
                self.draw(
                    ctx,
                    self.ids.bloom_pyramid(from_slot as u32),
                    RenderTargetId::Temporary(dest),
                    combine_pass,
                );
                ctx.release_temporary_rt(self.ids.bloom_pyramid(from_slot as u32));
                ctx.release_temporary_rt(dest_partner);
                from_slot = dest_slot;
                dest_slot -= 2;
            }
            from_id = self.ids.bloom_pyramid(from_slot as u32);
        } else {
            ctx.release_temporary_rt(self.ids.bloom_pyramid(0));
        }

        ctx.set_global_float(self.ids.bloom_intensity, final_intensity);
        ctx.set_global_texture(self.ids.fx_source2, RenderTargetId::Temporary(source));
        ctx.get_temporary_rt(
            self.ids.bloom_result,
            &RenderTargetDescriptor::color(
                self.camera.pixel_width(),
                self.camera.pixel_height(),
                format,
            ),
        );
        self.draw(
            ctx,
            from_id,
            RenderTargetId::Temporary(self.ids.bloom_result),
            final_pass,
        );
        ctx.release_temporary_rt(from_id);
        ctx.end_sample("Bloom");
        true
    }

    fn color_grading_and_tone_mapping(
        &self,
        ctx: &mut dyn RenderContext,
        settings: &PostFxSettings,
        source: ShaderPropertyId,
    ) {
        self.configure_color_adjustments(ctx, settings);
        self.configure_white_balance(ctx, settings);
        self.configure_split_toning(ctx, settings);
        self.configure_channel_mixer(ctx, settings);
        self.configure_shadows_midtones_highlights(ctx, settings);

        let lut_height = self.lut_resolution;
        let lut_width = lut_height * lut_height;
        ctx.get_temporary_rt(
            self.ids.color_grading_lut,
            &RenderTargetDescriptor::color(lut_width, lut_height, self.lut_format),
        );
        let h = lut_height as f32;
        ctx.set_global_vector(
            self.ids.color_grading_lut_parameters,
            Vec4::new(h, 0.5 / lut_width as f32, 0.5 / h, h / (h - 1.0)),
        );

        let pass = match settings.tone_mapping {
            ToneMappingMode::None => FxPass::ColorGradingNone,
            ToneMappingMode::Aces => FxPass::ColorGradingAces,
            ToneMappingMode::Neutral => FxPass::ColorGradingNeutral,
            ToneMappingMode::Reinhard => FxPass::ColorGradingReinhard,
        };
        // Tone mapping curves expect log-C input when the pipeline is HDR.
        let in_log_c = self.use_hdr && pass != FxPass::ColorGradingNone;
        ctx.set_global_float(
            self.ids.color_grading_lut_in_log_c,
            if in_log_c { 1.0 } else { 0.0 },
        );
        self.draw(
            ctx,
            source,
            RenderTargetId::Temporary(self.ids.color_grading_lut),
            pass,
        );

        ctx.set_global_vector(
            self.ids.color_grading_lut_parameters,
            Vec4::new(1.0 / lut_width as f32, 1.0 / h, h - 1.0, 0.0),
        );
        self.draw_final(ctx, source);
        ctx.release_temporary_rt(self.ids.color_grading_lut);
    }

    fn configure_color_adjustments(&self, ctx: &mut dyn RenderContext, settings: &PostFxSettings) {
        let adjustments = &settings.color_adjustments;
        ctx.set_global_vector(
            self.ids.color_adjustments,
            Vec4::new(
                2f32.powf(adjustments.post_exposure),
                adjustments.contrast * 0.01 + 1.0,
                adjustments.hue_shift / 360.0,
                adjustments.saturation * 0.01 + 1.0,
            ),
        );
        ctx.set_global_vector(self.ids.color_filter, adjustments.color_filter.to_linear());
    }

    fn configure_white_balance(&self, ctx: &mut dyn RenderContext, settings: &PostFxSettings) {
        let balance = &settings.white_balance;
        ctx.set_global_vector(
            self.ids.white_balance,
            color_balance_to_lms(balance.temperature, balance.tint).extend(0.0),
        );
    }

    fn configure_split_toning(&self, ctx: &mut dyn RenderContext, settings: &PostFxSettings) {
        let toning = &settings.split_toning;
        let mut shadows = toning.shadows.to_vec4();
        shadows.w = toning.balance * 0.01;
        ctx.set_global_vector(self.ids.split_toning_shadows, shadows);
        ctx.set_global_vector(self.ids.split_toning_highlights, toning.highlights.to_vec4());
    }

    fn configure_channel_mixer(&self, ctx: &mut dyn RenderContext, settings: &PostFxSettings) {
        let mixer = &settings.channel_mixer;
        ctx.set_global_vector(self.ids.channel_mixer_red, mixer.red.extend(0.0));
        ctx.set_global_vector(self.ids.channel_mixer_green, mixer.green.extend(0.0));
        ctx.set_global_vector(self.ids.channel_mixer_blue, mixer.blue.extend(0.0));
    }

    fn configure_shadows_midtones_highlights(
        &self,
        ctx: &mut dyn RenderContext,
        settings: &PostFxSettings,
    ) {
        let smh = &settings.shadows_midtones_highlights;
        ctx.set_global_vector(self.ids.smh_shadows, smh.shadows.to_linear());
        ctx.set_global_vector(self.ids.smh_midtones, smh.midtones.to_linear());
        ctx.set_global_vector(self.ids.smh_highlights, smh.highlights.to_linear());
        ctx.set_global_vector(
            self.ids.smh_range,
            Vec4::new(
                smh.shadows_start,
                smh.shadows_end,
                smh.highlights_start,
                smh.highlights_end,
            ),
        );
    }
}

/// LMS gain coefficients for a temperature/tint white balance shift.
fn color_balance_to_lms(temperature: f32, tint: f32) -> Vec3 {
    let t1 = temperature / 65.0;
    let t2 = tint / 65.0;

    // Shift the planckian locus reference white by temperature, then
    // offset perpendicular to it by tint.
    let x = 0.31271 - t1 * (if t1 < 0.0 { 0.1 } else { 0.05 });
    let y = standard_illuminant_y(x) + t2 * 0.05;

    let w1 = cie_xy_to_lms(0.31271, 0.32902);
    let w2 = cie_xy_to_lms(x, y);
    Vec3::new(w1.x / w2.x, w1.y / w2.y, w1.z / w2.z)
}

fn standard_illuminant_y(x: f32) -> f32 {
    2.87 * x - 3.0 * x * x - 0.27509507
}

fn cie_xy_to_lms(x: f32, y: f32) -> Vec3 {
    let big_y = 1.0;
    let big_x = big_y * x / y;
    let big_z = big_y * (1.0 - x - y) / y;
    Vec3::new(
        0.7328 * big_x + 0.4296 * big_y - 0.1624 * big_z,
        -0.7036 * big_x + 1.6975 * big_y + 0.0061 * big_z,
        0.0030 * big_x + 0.0136 * big_y + 0.9834 * big_z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Command, RecordingContext};
    use crate::backend::types::ShaderRef;
    use crate::properties::PropertyRegistry;

    fn ids() -> ShaderIds {
        ShaderIds::resolve(&mut PropertyRegistry::new())
    }

    fn default_settings() -> PostFxSettings {
        PostFxSettings::new(ShaderRef::new("Hidden/PostFXStack"))
    }

    fn render_stack(
        camera: &CameraDesc,
        settings: &PostFxSettings,
        shader_ids: &ShaderIds,
    ) -> RecordingContext {
        let stack = PostFxStack::setup(
            camera,
            Some(settings),
            Some(MaterialId(1)),
            true,
            DeviceCaps::default(),
            32,
            FinalBlendMode::default(),
            shader_ids,
        );
        assert!(stack.is_active());
        let mut ctx = RecordingContext::new();
        stack.render(&mut ctx, shader_ids.color_attachment);
        ctx
    }

    #[test]
    fn test_stack_inactive_for_preview_cameras() {
        let mut camera = CameraDesc::new(256, 256);
        camera.camera_type = CameraType::Preview;
        let settings = default_settings();
        let shader_ids = ids();
        let stack = PostFxStack::setup(
            &camera,
            Some(&settings),
            Some(MaterialId(1)),
            true,
            DeviceCaps::default(),
            32,
            FinalBlendMode::default(),
            &shader_ids,
        );
        assert!(!stack.is_active());
    }

    #[test]
    fn test_stack_inactive_when_image_effects_suppressed() {
        let mut camera = CameraDesc::new(256, 256);
        camera.camera_type = CameraType::SceneView;
        camera.suppress_image_effects = true;
        let settings = default_settings();
        let shader_ids = ids();
        let stack = PostFxStack::setup(
            &camera,
            Some(&settings),
            Some(MaterialId(1)),
            true,
            DeviceCaps::default(),
            32,
            FinalBlendMode::default(),
            &shader_ids,
        );
        assert!(!stack.is_active());
    }

    #[test]
    fn test_bloom_skipped_when_iterations_zero() {
        let camera = CameraDesc::new(1024, 1024);
        let mut settings = default_settings();
        settings.bloom.max_iterations = 0;
        let shader_ids = ids();
        let ctx = render_stack(&camera, &settings, &shader_ids);

        assert_eq!(ctx.acquires_of(shader_ids.bloom_result), 0);
        assert_eq!(ctx.acquires_of(shader_ids.bloom_prefilter), 0);
        // Grading still runs on the unmodified source.
        assert_eq!(ctx.acquires_of(shader_ids.color_grading_lut), 1);
        let grading_source = ctx.commands().iter().find_map(|c| match c {
            Command::SetGlobalTexture { id, texture } if *id == shader_ids.fx_source => {
                Some(*texture)
            }
            _ => None,
        });
        assert_eq!(
            grading_source,
            Some(RenderTargetId::Temporary(shader_ids.color_attachment))
        );
    }

    #[test]
    fn test_bloom_skipped_when_intensity_zero() {
        let camera = CameraDesc::new(1024, 1024);
        let mut settings = default_settings();
        settings.bloom.intensity = 0.0;
        let shader_ids = ids();
        let ctx = render_stack(&camera, &settings, &shader_ids);
        assert_eq!(ctx.acquires_of(shader_ids.bloom_result), 0);
        assert_eq!(ctx.acquires_of(shader_ids.color_grading_lut), 1);
    }

    #[test]
    fn test_bloom_skipped_when_source_undershoots_limit() {
        let camera = CameraDesc::new(32, 32);
        let mut settings = default_settings();
        settings.bloom.downscale_limit = 16;
        let shader_ids = ids();
        let ctx = render_stack(&camera, &settings, &shader_ids);
        assert_eq!(ctx.acquires_of(shader_ids.bloom_result), 0);
    }

    #[test]
    fn test_bloom_pyramid_depth_and_pairing() {
        let camera = CameraDesc::new(128, 128);
        let mut settings = default_settings();
        settings.bloom.downscale_limit = 16;
        settings.bloom.max_iterations = 16;
        let shader_ids = ids();
        let ctx = render_stack(&camera, &settings, &shader_ids);

        // 64 -> 32 -> 16, stop before 8: three levels, two targets each.
        let pyramid_acquires: usize = (0..32)
            .map(|slot| ctx.acquires_of(shader_ids.bloom_pyramid(slot)))
            .sum();
        assert_eq!(pyramid_acquires, 6);
        assert_eq!(ctx.acquires_of(shader_ids.bloom_prefilter), 1);
        assert_eq!(ctx.acquires_of(shader_ids.bloom_result), 1);
        assert!(ctx.leaked_targets().is_empty(), "acquire/release mismatch");
    }

    #[test]
    fn test_bloom_is_idempotent_across_frames() {
        let camera = CameraDesc::new(1920, 1080);
        let settings = default_settings();
        let shader_ids = ids();
        let first = render_stack(&camera, &settings, &shader_ids);
        let second = render_stack(&camera, &settings, &shader_ids);
        assert_eq!(first.commands(), second.commands());
        assert!(first.leaked_targets().is_empty());
    }

    #[test]
    fn test_scattering_clamps_final_intensity() {
        let camera = CameraDesc::new(512, 512);
        let mut settings = default_settings();
        settings.bloom.mode = BloomMode::Scattering;
        settings.bloom.scatter = 0.6;
        settings.bloom.intensity = 2.0;
        let shader_ids = ids();
        let ctx = render_stack(&camera, &settings, &shader_ids);

        let intensities = ctx.floats_of(shader_ids.bloom_intensity);
        assert_eq!(intensities, vec![0.6, 0.95]);
    }

    #[test]
    fn test_additive_keeps_configured_intensity() {
        let camera = CameraDesc::new(512, 512);
        let mut settings = default_settings();
        settings.bloom.mode = BloomMode::Additive;
        settings.bloom.intensity = 2.0;
        let shader_ids = ids();
        let ctx = render_stack(&camera, &settings, &shader_ids);

        let intensities = ctx.floats_of(shader_ids.bloom_intensity);
        assert_eq!(intensities, vec![1.0, 2.0]);
    }

    #[test]
    fn test_final_draw_load_action_depends_on_blend() {
        let camera = CameraDesc::new(256, 256);
        let settings = default_settings();
        let shader_ids = ids();

        let overwrite = render_stack(&camera, &settings, &shader_ids);
        let load = overwrite.commands().iter().find_map(|c| match c {
            Command::SetRenderTarget {
                color: RenderTargetId::CameraTarget,
                load,
                ..
            } => Some(*load),
            _ => None,
        });
        assert_eq!(load, Some(LoadAction::DontCare));

        let blended_stack = PostFxStack::setup(
            &camera,
            Some(&settings),
            Some(MaterialId(1)),
            true,
            DeviceCaps::default(),
            32,
            FinalBlendMode {
                source: BlendFactor::SrcAlpha,
                destination: BlendFactor::OneMinusSrcAlpha,
            },
            &shader_ids,
        );
        let mut ctx = RecordingContext::new();
        blended_stack.render(&mut ctx, shader_ids.color_attachment);
        let load = ctx.commands().iter().find_map(|c| match c {
            Command::SetRenderTarget {
                color: RenderTargetId::CameraTarget,
                load,
                ..
            } => Some(*load),
            _ => None,
        });
        assert_eq!(load, Some(LoadAction::Load));
    }

    #[test]
    fn test_lut_dimensions_follow_resolution() {
        let camera = CameraDesc::new(256, 256);
        let settings = default_settings();
        let shader_ids = ids();
        let ctx = render_stack(&camera, &settings, &shader_ids);
        let lut = ctx
            .acquired()
            .into_iter()
            .find(|(id, _)| *id == shader_ids.color_grading_lut)
            .expect("LUT allocated");
        assert_eq!(lut.1.width, 32 * 32);
        assert_eq!(lut.1.height, 32);
    }

    #[test]
    fn test_white_balance_is_identity_at_neutral() {
        let coeffs = color_balance_to_lms(0.0, 0.0);
        assert!((coeffs - Vec3::ONE).length() < 1e-5);
    }
}
