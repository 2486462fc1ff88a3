//! Shadow atlas packer.
//!
//! Reserves tile slots in two fixed-size depth atlases (cascaded tiles
//! for directional lights, single tiles or six cube faces for spot and
//! point lights), then renders every reserved tile and publishes the
//! per-light atlas transforms as shader globals.
//!
//! All reservation state lives in this per-frame value; constructing a
//! fresh packer for every camera keeps the atlas reentrant and free of
//! cross-frame leakage.

use std::f32::consts::SQRT_2;

use glam::{Mat4, Vec2, Vec4};

use crate::backend::traits::{CullResults, DeviceCaps, RenderContext, ShadowmaskMode};
use crate::backend::types::{
    Color, CubeFace, LightKind, LoadAction, Rect, RenderTargetDescriptor, RenderTargetId,
    ShadowMode, StoreAction, VisibleLight,
};
use crate::properties::ShaderIds;
use crate::settings::ShadowSettings;

/// Capacity for shadowed directional lights.
pub const MAX_SHADOWED_DIRECTIONAL_LIGHTS: usize = 4;
/// Capacity for shadowed additional light tiles; a point light consumes
/// six, one per cube face.
pub const MAX_SHADOWED_ADDITIONAL_LIGHTS: usize = 16;
/// Cascade capacity per directional light.
pub const MAX_CASCADES: usize = 4;

const DIRECTIONAL_FILTER_KEYWORDS: [&str; 3] =
    ["_DIRECTIONAL_PCF3", "_DIRECTIONAL_PCF5", "_DIRECTIONAL_PCF7"];

const ADDITIONAL_FILTER_KEYWORDS: [&str; 3] =
    ["_ADDITIONAL_PCF3", "_ADDITIONAL_PCF5", "_ADDITIONAL_PCF7"];

const SHADOW_MASK_KEYWORDS: [&str; 2] = ["_SHADOW_MASK_ALWAYS", "_SHADOW_MASK_DISTANCE"];

/// Packed per-light shadow parameters, published to the shading stage as
/// one vector.
///
/// A zero strength means the light casts no realtime shadows at all; a
/// negative strength is the "lit but unshadowed" sentinel used when a
/// reservation fails but baked occlusion may still apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowData {
    pub strength: f32,
    /// First atlas tile of the light (slot for additional lights, cascade
    /// base for directional lights).
    pub tile_index: u32,
    /// Normal bias for directional lights, the point-light flag for
    /// additional lights.
    pub param: f32,
    /// Baked shadowmask channel, -1 when unused.
    pub mask_channel: i32,
}

impl ShadowData {
    /// No shadows at all.
    pub fn none() -> Self {
        Self {
            strength: 0.0,
            tile_index: 0,
            param: 0.0,
            mask_channel: -1,
        }
    }

    /// Reservation failed; the shading stage sees the negated strength and
    /// falls back to baked occlusion only.
    pub fn unshadowed(strength: f32, mask_channel: i32) -> Self {
        Self {
            strength: -strength,
            tile_index: 0,
            param: 0.0,
            mask_channel,
        }
    }

    pub fn is_shadowed(&self) -> bool {
        self.strength > 0.0
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(
            self.strength,
            self.tile_index as f32,
            self.param,
            self.mask_channel as f32,
        )
    }

    pub fn from_vec4(value: Vec4) -> Self {
        Self {
            strength: value.x,
            tile_index: value.y as u32,
            param: value.z,
            mask_channel: value.w as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ShadowedDirectionalLight {
    visible_light_index: usize,
    slope_scale_bias: f32,
    near_plane_offset: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ShadowedAdditionalLight {
    visible_light_index: usize,
    slope_scale_bias: f32,
    normal_bias: f32,
    is_point: bool,
}

/// Grid split for an atlas holding `tiles` tiles.
pub fn atlas_split(tiles: u32) -> u32 {
    if tiles <= 1 {
        1
    } else if tiles <= 4 {
        2
    } else {
        4
    }
}

/// Per-frame shadow atlas state: reservations first, then one render pass
/// per atlas.
pub struct Shadows<'a> {
    cull: &'a dyn CullResults,
    settings: &'a ShadowSettings,
    ids: &'a ShaderIds,
    caps: DeviceCaps,

    dir_lights: [ShadowedDirectionalLight; MAX_SHADOWED_DIRECTIONAL_LIGHTS],
    dir_count: usize,
    add_lights: [ShadowedAdditionalLight; MAX_SHADOWED_ADDITIONAL_LIGHTS],
    add_count: usize,
    use_shadow_mask: bool,

    atlas_sizes: Vec4,
    cascade_culling_spheres: [Vec4; MAX_CASCADES],
    cascade_data: [Vec4; MAX_CASCADES],
    dir_matrices: [Mat4; MAX_SHADOWED_DIRECTIONAL_LIGHTS * MAX_CASCADES],
    add_matrices: [Mat4; MAX_SHADOWED_ADDITIONAL_LIGHTS],
    add_tiles: [Vec4; MAX_SHADOWED_ADDITIONAL_LIGHTS],
}

impl<'a> Shadows<'a> {
    pub fn new(
        cull: &'a dyn CullResults,
        settings: &'a ShadowSettings,
        ids: &'a ShaderIds,
        caps: DeviceCaps,
    ) -> Self {
        Self {
            cull,
            settings,
            ids,
            caps,
            dir_lights: Default::default(),
            dir_count: 0,
            add_lights: Default::default(),
            add_count: 0,
            use_shadow_mask: false,
            atlas_sizes: Vec4::ZERO,
            cascade_culling_spheres: [Vec4::ZERO; MAX_CASCADES],
            cascade_data: [Vec4::ZERO; MAX_CASCADES],
            dir_matrices: [Mat4::ZERO; MAX_SHADOWED_DIRECTIONAL_LIGHTS * MAX_CASCADES],
            add_matrices: [Mat4::ZERO; MAX_SHADOWED_ADDITIONAL_LIGHTS],
            add_tiles: [Vec4::ZERO; MAX_SHADOWED_ADDITIONAL_LIGHTS],
        }
    }

    pub fn directional_count(&self) -> usize {
        self.dir_count
    }

    pub fn additional_count(&self) -> usize {
        self.add_count
    }

    pub fn uses_shadow_mask(&self) -> bool {
        self.use_shadow_mask
    }

    /// Reserve cascade tiles for a directional light.
    ///
    /// Fails with the unshadowed sentinel when the caster bounds are
    /// degenerate, and with the zero sentinel when the light casts no
    /// shadows or the capacity is exhausted.
    pub fn reserve_directional(
        &mut self,
        light: &VisibleLight,
        visible_light_index: usize,
    ) -> ShadowData {
        if self.dir_count < MAX_SHADOWED_DIRECTIONAL_LIGHTS
            && light.shadows != ShadowMode::None
            && light.shadow_strength > 0.0
        {
            let mask_channel = self.resolve_mask_channel(light);

            if self.cull.shadow_caster_bounds(visible_light_index).is_none() {
                return ShadowData::unshadowed(light.shadow_strength, mask_channel);
            }

            self.dir_lights[self.dir_count] = ShadowedDirectionalLight {
                visible_light_index,
                slope_scale_bias: light.shadow_bias,
                near_plane_offset: light.shadow_near_plane,
            };
            let data = ShadowData {
                strength: light.shadow_strength,
                tile_index: self.settings.directional.cascade_count * self.dir_count as u32,
                param: light.shadow_normal_bias,
                mask_channel,
            };
            self.dir_count += 1;
            return data;
        }

        ShadowData::none()
    }

    /// Reserve atlas tiles for a spot or point light. A point light takes
    /// six consecutive slots atomically or none at all.
    pub fn reserve_additional(
        &mut self,
        light: &VisibleLight,
        visible_light_index: usize,
    ) -> ShadowData {
        if light.shadows == ShadowMode::None || light.shadow_strength <= 0.0 {
            return ShadowData::none();
        }

        let mask_channel = self.resolve_mask_channel(light);

        let is_point = light.kind == LightKind::Point;
        let new_count = self.add_count + if is_point { 6 } else { 1 };

        if new_count > MAX_SHADOWED_ADDITIONAL_LIGHTS
            || self.cull.shadow_caster_bounds(visible_light_index).is_none()
        {
            return ShadowData::unshadowed(light.shadow_strength, mask_channel);
        }

        self.add_lights[self.add_count] = ShadowedAdditionalLight {
            visible_light_index,
            slope_scale_bias: light.shadow_bias,
            normal_bias: light.shadow_normal_bias,
            is_point,
        };
        let data = ShadowData {
            strength: light.shadow_strength,
            tile_index: self.add_count as u32,
            param: if is_point { 1.0 } else { 0.0 },
            mask_channel,
        };
        self.add_count = new_count;
        data
    }

    fn resolve_mask_channel(&mut self, light: &VisibleLight) -> i32 {
        match light.shadow_mask_channel {
            Some(channel) => {
                self.use_shadow_mask = true;
                channel as i32
            }
            None => -1,
        }
    }

    /// Render both atlases and publish the shadow globals.
    pub fn render(&mut self, ctx: &mut dyn RenderContext) {
        if self.dir_count > 0 {
            self.render_directional(ctx);
        } else {
            // 1x1 placeholder keeps the atlas binding valid downstream.
            ctx.get_temporary_rt(
                self.ids.directional_shadow_atlas,
                &RenderTargetDescriptor::shadow_atlas(1),
            );
        }

        if self.add_count > 0 {
            self.render_additional(ctx);
        } else {
            ctx.get_temporary_rt(
                self.ids.additional_shadow_atlas,
                &RenderTargetDescriptor::shadow_atlas(1),
            );
        }

        let mask_index = if self.use_shadow_mask {
            match self.caps.shadowmask_mode {
                ShadowmaskMode::Shadowmask => 0,
                ShadowmaskMode::DistanceShadowmask => 1,
            }
        } else {
            -1
        };
        set_keywords(ctx, &SHADOW_MASK_KEYWORDS, mask_index);

        ctx.set_global_int(
            self.ids.cascade_count,
            if self.dir_count > 0 {
                self.settings.directional.cascade_count as i32
            } else {
                0
            },
        );
        let f = 1.0 - self.settings.directional.cascade_fade;
        ctx.set_global_vector(
            self.ids.shadow_distance_fade,
            Vec4::new(
                1.0 / self.settings.max_distance,
                1.0 / self.settings.distance_fade,
                1.0 / (1.0 - f * f),
                0.0,
            ),
        );
        ctx.set_global_vector(self.ids.shadow_atlas_size, self.atlas_sizes);
    }

    /// Release both atlas targets at the end of the camera's frame.
    pub fn cleanup(ctx: &mut dyn RenderContext, ids: &ShaderIds) {
        ctx.release_temporary_rt(ids.directional_shadow_atlas);
        ctx.release_temporary_rt(ids.additional_shadow_atlas);
    }

    fn render_directional(&mut self, ctx: &mut dyn RenderContext) {
        let atlas_size = self.settings.directional.atlas_size.pixels();
        self.atlas_sizes.x = atlas_size as f32;
        self.atlas_sizes.y = 1.0 / atlas_size as f32;

        ctx.get_temporary_rt(
            self.ids.directional_shadow_atlas,
            &RenderTargetDescriptor::shadow_atlas(atlas_size),
        );
        ctx.set_render_target(
            RenderTargetId::Temporary(self.ids.directional_shadow_atlas),
            LoadAction::DontCare,
            StoreAction::Store,
        );
        ctx.clear_render_target(true, false, Color::CLEAR);
        ctx.set_global_float(self.ids.shadow_pancaking, 1.0);
        ctx.begin_sample("Directional Shadows");

        let tiles = self.settings.directional.cascade_count * self.dir_count as u32;
        let split = atlas_split(tiles);
        let tile_size = atlas_size / split;
        log::trace!(
            "directional shadow atlas: {atlas_size}px, {} lights, split {split}",
            self.dir_count
        );

        for index in 0..self.dir_count {
            self.render_directional_light(ctx, index, split, tile_size);
        }

        ctx.set_global_vector_array(
            self.ids.cascade_culling_spheres,
            &self.cascade_culling_spheres,
        );
        ctx.set_global_vector_array(self.ids.cascade_data, &self.cascade_data);
        ctx.set_global_matrix_array(self.ids.directional_shadow_matrices, &self.dir_matrices);
        set_keywords(
            ctx,
            &DIRECTIONAL_FILTER_KEYWORDS,
            self.settings.directional.filter.keyword_index(),
        );
        ctx.end_sample("Directional Shadows");
    }

    fn render_directional_light(
        &mut self,
        ctx: &mut dyn RenderContext,
        index: usize,
        split: u32,
        tile_size: u32,
    ) {
        let light = self.dir_lights[index];
        let cascade_count = self.settings.directional.cascade_count;
        let tile_offset = index as u32 * cascade_count;
        let ratios = self.settings.directional.ratios();
        let tile_scale = 1.0 / split as f32;
        let cull_factor = (0.8 - self.settings.directional.cascade_fade).max(0.0);

        for cascade in 0..cascade_count {
            let slice = self.cull.directional_shadow_slice(
                light.visible_light_index,
                cascade,
                cascade_count,
                ratios,
                tile_size,
                light.near_plane_offset,
            );
            let mut split_data = slice.split;
            split_data.blend_cull_factor = cull_factor;

            // Cascade geometry is camera-relative and identical for every
            // light; record it once.
            if index == 0 {
                self.set_cascade_data(cascade as usize, split_data.culling_sphere, tile_size as f32);
            }

            let tile_index = tile_offset + cascade;
            let offset = set_tile_viewport(ctx, tile_index, split, tile_size);
            self.dir_matrices[tile_index as usize] =
                self.to_atlas_matrix(slice.proj * slice.view, offset, tile_scale);
            ctx.set_view_projection(slice.view, slice.proj);
            ctx.set_global_depth_bias(0.0, light.slope_scale_bias);
            ctx.draw_shadow_casters(light.visible_light_index, &split_data);
            ctx.set_global_depth_bias(0.0, 0.0);
        }
    }

    fn set_cascade_data(&mut self, index: usize, culling_sphere: Vec4, tile_size: f32) {
        let texel_size = 2.0 * culling_sphere.w / tile_size;
        let filter_size = texel_size * self.settings.directional.filter.tap_factor();

        let mut sphere = culling_sphere;
        // Shrink by the filter footprint so samples never leave the tile,
        // and store the squared radius the shader compares against.
        sphere.w -= filter_size;
        sphere.w *= sphere.w;
        self.cascade_culling_spheres[index] = sphere;

        self.cascade_data[index] = Vec4::new(1.0 / sphere.w, filter_size * SQRT_2, 0.0, 0.0);
    }

    fn render_additional(&mut self, ctx: &mut dyn RenderContext) {
        let atlas_size = self.settings.additional.atlas_size.pixels();
        self.atlas_sizes.z = atlas_size as f32;
        self.atlas_sizes.w = 1.0 / atlas_size as f32;

        ctx.get_temporary_rt(
            self.ids.additional_shadow_atlas,
            &RenderTargetDescriptor::shadow_atlas(atlas_size),
        );
        ctx.set_render_target(
            RenderTargetId::Temporary(self.ids.additional_shadow_atlas),
            LoadAction::DontCare,
            StoreAction::Store,
        );
        ctx.clear_render_target(true, false, Color::CLEAR);
        ctx.set_global_float(self.ids.shadow_pancaking, 0.0);
        ctx.begin_sample("Additional Shadows");

        let split = atlas_split(self.add_count as u32);
        let tile_size = atlas_size / split;
        log::trace!(
            "additional shadow atlas: {atlas_size}px, {} tiles, split {split}",
            self.add_count
        );

        let mut index = 0;
        while index < self.add_count {
            if self.add_lights[index].is_point {
                self.render_point_light(ctx, index, split, tile_size);
                index += 6;
            } else {
                self.render_spot_light(ctx, index, split, tile_size);
                index += 1;
            }
        }

        ctx.set_global_matrix_array(self.ids.additional_shadow_matrices, &self.add_matrices);
        ctx.set_global_vector_array(self.ids.additional_shadow_tiles, &self.add_tiles);
        set_keywords(
            ctx,
            &ADDITIONAL_FILTER_KEYWORDS,
            self.settings.additional.filter.keyword_index(),
        );
        ctx.end_sample("Additional Shadows");
    }

    fn render_spot_light(
        &mut self,
        ctx: &mut dyn RenderContext,
        index: usize,
        split: u32,
        tile_size: u32,
    ) {
        let light = self.add_lights[index];
        let slice = self.cull.spot_shadow_slice(light.visible_light_index);

        // Perspective projection: texel size depends on the distance-one
        // plane width encoded in the projection's X scale.
        let texel_size = 2.0 / (tile_size as f32 * slice.proj.x_axis.x);
        let filter_size = texel_size * self.settings.additional.filter.tap_factor();
        let bias = light.normal_bias * filter_size * SQRT_2;
        let offset = set_tile_viewport(ctx, index as u32, split, tile_size);
        let tile_scale = 1.0 / split as f32;
        self.set_additional_tile_data(index, offset, tile_scale, bias);
        self.add_matrices[index] = self.to_atlas_matrix(slice.proj * slice.view, offset, tile_scale);

        ctx.set_view_projection(slice.view, slice.proj);
        ctx.set_global_depth_bias(0.0, light.slope_scale_bias);
        ctx.draw_shadow_casters(light.visible_light_index, &slice.split);
        ctx.set_global_depth_bias(0.0, 0.0);
    }

    fn render_point_light(
        &mut self,
        ctx: &mut dyn RenderContext,
        index: usize,
        split: u32,
        tile_size: u32,
    ) {
        let light = self.add_lights[index];
        let texel_size = 2.0 / tile_size as f32;
        let filter_size = texel_size * self.settings.additional.filter.tap_factor();
        let bias = light.normal_bias * filter_size * SQRT_2;
        let tile_scale = 1.0 / split as f32;
        // Widen the 90 degree face frustum so the filter footprint never
        // samples past a tile edge.
        let fov_bias = (1.0 + bias + filter_size).atan().to_degrees() * 2.0 - 90.0;

        for face in CubeFace::ALL {
            let slice =
                self.cull
                    .point_shadow_slice(light.visible_light_index, face, fov_bias);
            // Flip the view's Y row; rendering the face upside down
            // matches the atlas orientation and undoes the front-face
            // winding reversal.
            let mut view = slice.view;
            view.y_axis.y = -view.y_axis.y;
            view.z_axis.y = -view.z_axis.y;
            view.w_axis.y = -view.w_axis.y;

            let tile_index = index as u32 + face.index() as u32;
            let offset = set_tile_viewport(ctx, tile_index, split, tile_size);
            self.set_additional_tile_data(tile_index as usize, offset, tile_scale, bias);
            self.add_matrices[tile_index as usize] =
                self.to_atlas_matrix(slice.proj * view, offset, tile_scale);

            ctx.set_view_projection(view, slice.proj);
            ctx.set_global_depth_bias(0.0, light.slope_scale_bias);
            ctx.draw_shadow_casters(light.visible_light_index, &slice.split);
            ctx.set_global_depth_bias(0.0, 0.0);
        }
    }

    fn set_additional_tile_data(&mut self, index: usize, offset: Vec2, scale: f32, bias: f32) {
        let border = self.atlas_sizes.w * 0.5;
        self.add_tiles[index] = Vec4::new(
            offset.x * scale + border,
            offset.y * scale + border,
            scale - border - border,
            bias,
        );
    }

    /// Convert a clip-space shadow matrix into atlas texture space,
    /// offset and scaled into the light's tile.
    fn to_atlas_matrix(&self, m: Mat4, offset: Vec2, scale: f32) -> Mat4 {
        let mut m = m;
        if self.caps.reversed_z {
            m.x_axis.z = -m.x_axis.z;
            m.y_axis.z = -m.y_axis.z;
            m.z_axis.z = -m.z_axis.z;
            m.w_axis.z = -m.w_axis.z;
        }

        let r3 = m.row(3);
        let r0 = (0.5 * (m.row(0) + r3) + offset.x * r3) * scale;
        let r1 = (0.5 * (m.row(1) + r3) + offset.y * r3) * scale;
        let r2 = 0.5 * (m.row(2) + r3);
        Mat4::from_cols(r0, r1, r2, r3).transpose()
    }
}

fn set_tile_viewport(
    ctx: &mut dyn RenderContext,
    index: u32,
    split: u32,
    tile_size: u32,
) -> Vec2 {
    let offset = Vec2::new((index % split) as f32, (index / split) as f32);
    ctx.set_viewport(Rect::new(
        offset.x * tile_size as f32,
        offset.y * tile_size as f32,
        tile_size as f32,
        tile_size as f32,
    ));
    offset
}

fn set_keywords(ctx: &mut dyn RenderContext, keywords: &[&'static str], enabled_index: i32) {
    for (i, keyword) in keywords.iter().enumerate() {
        if i as i32 == enabled_index {
            ctx.enable_keyword(keyword);
        } else {
            ctx.disable_keyword(keyword);
        }
    }
}
