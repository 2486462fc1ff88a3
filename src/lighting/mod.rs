//! Light aggregation.
//!
//! Collects the visible lights of one camera into fixed-capacity shader
//! arrays, delegates shadow tile reservation to the atlas packer, and
//! publishes everything as globals before the geometry pass.

pub mod shadows;

use glam::Vec4;

use crate::backend::traits::{CullResults, DeviceCaps, RenderContext};
use crate::backend::types::{LightKind, VisibleLight};
use crate::properties::ShaderIds;
use crate::settings::ShadowSettings;

pub use shadows::{
    atlas_split, ShadowData, Shadows, MAX_CASCADES, MAX_SHADOWED_ADDITIONAL_LIGHTS,
    MAX_SHADOWED_DIRECTIONAL_LIGHTS,
};

/// Shader array capacity for directional lights.
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
/// Shader array capacity for point and spot lights.
pub const MAX_ADDITIONAL_LIGHTS: usize = 64;

const SAMPLE_NAME: &str = "Lighting";

/// Per-frame light setup result.
///
/// Construction does all the work: classify lights, reserve shadows,
/// publish globals, render the shadow atlases.
pub struct Lighting {
    dir_count: usize,
    add_count: usize,
}

impl Lighting {
    /// Aggregate the cull result's lights and render shadow atlases.
    pub fn setup(
        ctx: &mut dyn RenderContext,
        cull: &dyn CullResults,
        shadow_settings: &ShadowSettings,
        ids: &ShaderIds,
        caps: DeviceCaps,
    ) -> Self {
        ctx.begin_sample(SAMPLE_NAME);
        let mut shadows = Shadows::new(cull, shadow_settings, ids, caps);

        let mut dir_colors = [Vec4::ZERO; MAX_DIRECTIONAL_LIGHTS];
        let mut dir_directions = [Vec4::ZERO; MAX_DIRECTIONAL_LIGHTS];
        let mut dir_shadow_data = [Vec4::ZERO; MAX_DIRECTIONAL_LIGHTS];
        let mut add_colors = [Vec4::ZERO; MAX_ADDITIONAL_LIGHTS];
        let mut add_positions = [Vec4::ZERO; MAX_ADDITIONAL_LIGHTS];
        let mut add_directions = [Vec4::ZERO; MAX_ADDITIONAL_LIGHTS];
        let mut add_spot_angles = [Vec4::ZERO; MAX_ADDITIONAL_LIGHTS];
        let mut add_shadow_data = [Vec4::ZERO; MAX_ADDITIONAL_LIGHTS];

        let mut dir_count = 0;
        let mut add_count = 0;

        for (index, light) in cull.visible_lights().iter().enumerate() {
            match light.kind {
                LightKind::Directional => {
                    if dir_count >= MAX_DIRECTIONAL_LIGHTS {
                        log::trace!("directional light {index} dropped, array full");
                        continue;
                    }
                    dir_colors[dir_count] = light.color;
                    dir_directions[dir_count] = light.direction().extend(0.0);
                    dir_shadow_data[dir_count] =
                        shadows.reserve_directional(light, index).to_vec4();
                    dir_count += 1;
                }
                LightKind::Point => {
                    if add_count >= MAX_ADDITIONAL_LIGHTS {
                        log::trace!("point light {index} dropped, array full");
                        continue;
                    }
                    add_colors[add_count] = light.color;
                    add_positions[add_count] = pack_position(light);
                    add_spot_angles[add_count] = Vec4::new(0.0, 1.0, 0.0, 0.0);
                    add_shadow_data[add_count] =
                        shadows.reserve_additional(light, index).to_vec4();
                    add_count += 1;
                }
                LightKind::Spot => {
                    if add_count >= MAX_ADDITIONAL_LIGHTS {
                        log::trace!("spot light {index} dropped, array full");
                        continue;
                    }
                    add_colors[add_count] = light.color;
                    add_positions[add_count] = pack_position(light);
                    add_directions[add_count] = light.direction().extend(0.0);
                    add_spot_angles[add_count] = pack_spot_angles(light);
                    add_shadow_data[add_count] =
                        shadows.reserve_additional(light, index).to_vec4();
                    add_count += 1;
                }
            }
        }

        ctx.set_global_int(ids.directional_light_count, dir_count as i32);
        ctx.set_global_vector_array(ids.directional_light_colors, &dir_colors);
        ctx.set_global_vector_array(ids.directional_light_directions, &dir_directions);
        ctx.set_global_vector_array(ids.directional_light_shadow_data, &dir_shadow_data);

        ctx.set_global_int(ids.additional_light_count, add_count as i32);
        ctx.set_global_vector_array(ids.additional_light_colors, &add_colors);
        ctx.set_global_vector_array(ids.additional_light_positions, &add_positions);
        ctx.set_global_vector_array(ids.additional_light_directions, &add_directions);
        ctx.set_global_vector_array(ids.additional_light_spot_angles, &add_spot_angles);
        ctx.set_global_vector_array(ids.additional_light_shadow_data, &add_shadow_data);

        shadows.render(ctx);
        ctx.end_sample(SAMPLE_NAME);

        Self {
            dir_count,
            add_count,
        }
    }

    /// Release the shadow atlases at the end of the camera's frame.
    pub fn cleanup(&self, ctx: &mut dyn RenderContext, ids: &ShaderIds) {
        Shadows::cleanup(ctx, ids);
    }

    pub fn directional_count(&self) -> usize {
        self.dir_count
    }

    pub fn additional_count(&self) -> usize {
        self.add_count
    }
}

/// Position with the inverse squared range packed into `w` so the shader
/// computes range attenuation without a divide per fragment.
fn pack_position(light: &VisibleLight) -> Vec4 {
    let inv_range_sq = 1.0 / (light.range * light.range).max(0.00001);
    light.position().extend(inv_range_sq)
}

/// Angular falloff terms: `1 / (cos(inner/2) - cos(outer/2))` and its
/// negated outer-cosine offset.
fn pack_spot_angles(light: &VisibleLight) -> Vec4 {
    let inner_cos = (0.5 * light.inner_spot_angle.to_radians()).cos();
    let outer_cos = (0.5 * light.spot_angle.to_radians()).cos();
    let angle_range_inv = 1.0 / (inner_cos - outer_cos).max(0.001);
    Vec4::new(angle_range_inv, -outer_cos * angle_range_inv, 0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Command, RecordingContext, StubScene};
    use crate::backend::traits::SceneSource;
    use crate::backend::types::{CameraDesc, ShadowMode};
    use crate::properties::PropertyRegistry;
    use glam::Mat4;

    fn ids() -> ShaderIds {
        ShaderIds::resolve(&mut PropertyRegistry::new())
    }

    fn setup_with(lights: Vec<VisibleLight>) -> (RecordingContext, Lighting, ShaderIds) {
        let scene = StubScene::with_lights(lights);
        let cull = scene.cull(&CameraDesc::new(256, 256), 100.0).unwrap();
        let settings = ShadowSettings::default();
        let shader_ids = ids();
        let mut ctx = RecordingContext::new();
        let lighting = Lighting::setup(
            &mut ctx,
            &*cull,
            &settings,
            &shader_ids,
            DeviceCaps::default(),
        );
        (ctx, lighting, shader_ids)
    }

    #[test]
    fn test_lights_are_classified_by_kind() {
        let (ctx, lighting, shader_ids) = setup_with(vec![
            VisibleLight::directional(Vec4::ONE, Mat4::IDENTITY),
            VisibleLight::point(Vec4::ONE, Mat4::IDENTITY, 5.0),
            VisibleLight::spot(Vec4::ONE, Mat4::IDENTITY, 5.0, 60.0, 40.0),
        ]);
        assert_eq!(lighting.directional_count(), 1);
        assert_eq!(lighting.additional_count(), 2);

        let counts: Vec<i32> = ctx
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetGlobalInt { id, value }
                    if *id == shader_ids.directional_light_count
                        || *id == shader_ids.additional_light_count =>
                {
                    Some(*value)
                }
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[test]
    fn test_excess_lights_are_silently_dropped() {
        let mut lights: Vec<_> = (0..6)
            .map(|_| VisibleLight::directional(Vec4::ONE, Mat4::IDENTITY))
            .collect();
        lights.extend((0..70).map(|_| VisibleLight::point(Vec4::ONE, Mat4::IDENTITY, 5.0)));
        let (_, lighting, _) = setup_with(lights);
        assert_eq!(lighting.directional_count(), MAX_DIRECTIONAL_LIGHTS);
        assert_eq!(lighting.additional_count(), MAX_ADDITIONAL_LIGHTS);
    }

    #[test]
    fn test_published_arrays_are_fixed_capacity() {
        let (ctx, _, shader_ids) = setup_with(vec![VisibleLight::point(
            Vec4::ONE,
            Mat4::IDENTITY,
            5.0,
        )]);
        let colors = ctx.vector_array_of(shader_ids.additional_light_colors).unwrap();
        assert_eq!(colors.len(), MAX_ADDITIONAL_LIGHTS);
        assert_eq!(colors[0], Vec4::ONE);
        assert_eq!(colors[1], Vec4::ZERO);
    }

    #[test]
    fn test_point_light_packs_inverse_square_range() {
        let light = VisibleLight::point(Vec4::ONE, Mat4::IDENTITY, 10.0);
        let packed = pack_position(&light);
        assert!((packed.w - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_spot_angle_falloff_terms() {
        let light = VisibleLight::spot(Vec4::ONE, Mat4::IDENTITY, 10.0, 90.0, 0.0);
        let angles = pack_spot_angles(&light);
        let outer_cos = (45.0f32).to_radians().cos();
        let expected_inv = 1.0 / (1.0 - outer_cos);
        assert!((angles.x - expected_inv).abs() < 1e-4);
        assert!((angles.y + outer_cos * expected_inv).abs() < 1e-4);
    }

    #[test]
    fn test_shadow_data_reaches_the_arrays() {
        let light = VisibleLight::directional(Vec4::ONE, Mat4::IDENTITY)
            .with_shadows(ShadowMode::Soft, 0.8);
        let (ctx, _, shader_ids) = setup_with(vec![light]);
        let data = ctx
            .vector_array_of(shader_ids.directional_light_shadow_data)
            .unwrap();
        let decoded = ShadowData::from_vec4(data[0]);
        assert!(decoded.is_shadowed());
        assert_eq!(decoded.strength, 0.8);
    }

    #[test]
    fn test_cleanup_releases_both_atlases() {
        let (mut ctx, lighting, shader_ids) = setup_with(Vec::new());
        lighting.cleanup(&mut ctx, &shader_ids);
        assert!(ctx.leaked_targets().is_empty());
    }
}
