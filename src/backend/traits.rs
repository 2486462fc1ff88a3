//! Host-engine abstraction traits
//!
//! These traits define the narrow contract between the pipeline and the
//! host engine: command recording and submission, device capabilities and
//! resource lifetime, and the visibility/shadow-matrix queries. The
//! pipeline never reaches past them.

use glam::{Mat4, Vec3, Vec4};

use crate::backend::types::*;
use crate::error::PipelineError;
use crate::properties::ShaderPropertyId;

/// Shadowmask quality selected on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowmaskMode {
    /// Baked shadows everywhere the mask covers.
    Shadowmask,
    /// Baked shadows only beyond the realtime shadow distance.
    DistanceShadowmask,
}

/// Hardware capabilities the pipeline branches on.
///
/// Capability gaps are never errors; every query maps to a functionally
/// equivalent fallback path.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    /// Depth buffer runs 1..0; shadow matrices need their Z row negated.
    pub reversed_z: bool,
    /// Attachment-to-texture copies are supported in hardware.
    pub copy_texture_supported: bool,
    /// Preferred format for HDR intermediate targets.
    pub hdr_format: TextureFormat,
    pub shadowmask_mode: ShadowmaskMode,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            reversed_z: true,
            copy_texture_supported: true,
            hdr_format: TextureFormat::Rgba16Float,
            shadowmask_mode: ShadowmaskMode::DistanceShadowmask,
        }
    }
}

/// Long-lived device surface: capabilities and resource lifetime.
pub trait RenderDevice {
    fn caps(&self) -> DeviceCaps;

    /// Instantiate a material from a shader reference.
    ///
    /// Failure here is a configuration error; the pipeline surfaces it at
    /// construction, never mid-frame.
    fn create_material(&mut self, shader: &ShaderRef) -> Result<MaterialId, PipelineError>;

    fn destroy_material(&mut self, material: MaterialId);

    /// Create a tiny solid-color texture used as a stand-in binding for
    /// attachment copies that were not requested this frame.
    fn create_placeholder_texture(&mut self, label: &str, color: Color) -> TextureId;

    fn destroy_texture(&mut self, texture: TextureId);
}

/// Per-camera visibility query result.
///
/// Owned by the host; the pipeline reads visible lights and asks for
/// shadow caster bounds and shadow tile matrices through it.
pub trait CullResults {
    fn visible_lights(&self) -> &[VisibleLight];

    /// Bounds of the light's visible shadow casters, or `None` when there
    /// is nothing to cast (the light then renders lit but unshadowed).
    fn shadow_caster_bounds(&self, light_index: usize) -> Option<Bounds>;

    /// Orthographic view/projection and culling sphere for one cascade of
    /// a directional light.
    #[allow(clippy::too_many_arguments)]
    fn directional_shadow_slice(
        &self,
        light_index: usize,
        cascade: u32,
        cascade_count: u32,
        cascade_ratios: Vec3,
        tile_size: u32,
        near_plane_offset: f32,
    ) -> ShadowSlice;

    /// Perspective view/projection for a spot light's single tile.
    fn spot_shadow_slice(&self, light_index: usize) -> ShadowSlice;

    /// Perspective view/projection for one cube face of a point light,
    /// with the field of view widened by `fov_bias` degrees.
    fn point_shadow_slice(&self, light_index: usize, face: CubeFace, fov_bias: f32) -> ShadowSlice;
}

/// The host's scene visibility query.
pub trait SceneSource {
    /// Cull the scene for a camera. `None` signals a degenerate view; the
    /// camera's render becomes a no-op.
    fn cull(&self, camera: &CameraDesc, max_shadow_distance: f32)
        -> Option<Box<dyn CullResults + '_>>;
}

/// Command recording and submission for one camera's frame.
///
/// All work for a camera is recorded through one context and submitted
/// atomically; temporary render targets acquired here never outlive the
/// frame.
pub trait RenderContext {
    fn begin_sample(&mut self, name: &str);
    fn end_sample(&mut self, name: &str);

    fn get_temporary_rt(&mut self, id: ShaderPropertyId, desc: &RenderTargetDescriptor);
    fn release_temporary_rt(&mut self, id: ShaderPropertyId);

    fn set_render_target(&mut self, color: RenderTargetId, load: LoadAction, store: StoreAction);

    #[allow(clippy::too_many_arguments)]
    fn set_render_target_with_depth(
        &mut self,
        color: RenderTargetId,
        color_load: LoadAction,
        color_store: StoreAction,
        depth: RenderTargetId,
        depth_load: LoadAction,
        depth_store: StoreAction,
    );

    fn clear_render_target(&mut self, clear_depth: bool, clear_color: bool, color: Color);
    fn set_viewport(&mut self, rect: Rect);

    fn set_global_float(&mut self, id: ShaderPropertyId, value: f32);
    fn set_global_int(&mut self, id: ShaderPropertyId, value: i32);
    fn set_global_vector(&mut self, id: ShaderPropertyId, value: Vec4);
    fn set_global_matrix(&mut self, id: ShaderPropertyId, value: Mat4);
    fn set_global_vector_array(&mut self, id: ShaderPropertyId, values: &[Vec4]);
    fn set_global_matrix_array(&mut self, id: ShaderPropertyId, values: &[Mat4]);
    fn set_global_texture(&mut self, id: ShaderPropertyId, texture: RenderTargetId);

    fn enable_keyword(&mut self, keyword: &'static str);
    fn disable_keyword(&mut self, keyword: &'static str);

    /// Upload the camera's view/projection and viewport state.
    fn setup_camera(&mut self, camera: &CameraDesc);
    /// Override view/projection for shadow tile rendering.
    fn set_view_projection(&mut self, view: Mat4, proj: Mat4);
    fn set_global_depth_bias(&mut self, constant: f32, slope_scale: f32);

    /// Draw the shadow casters of one visible light, filtered by the
    /// slice's culling data.
    fn draw_shadow_casters(&mut self, light_index: usize, split: &ShadowSplitData);
    /// Draw culled scene geometry.
    fn draw_geometry(&mut self, cull: &dyn CullResults, settings: &GeometryDrawSettings);
    fn draw_skybox(&mut self, camera: &CameraDesc);
    /// Draw a full-screen triangle with the given material pass.
    fn draw_fullscreen(&mut self, material: MaterialId, pass: u32);
    /// Hardware attachment copy; only valid when the device reports
    /// [`DeviceCaps::copy_texture_supported`].
    fn copy_texture(&mut self, src: RenderTargetId, dst: RenderTargetId);

    /// Submit everything recorded so far to the graphics device.
    fn submit(&mut self);
}
