//! Recording no-op backend.
//!
//! This backend performs no GPU work but records every command into an
//! inspectable log, providing a valid implementation of the host contract
//! for tests and development without GPU hardware. `StubScene` serves
//! canned cull results to drive the pipeline end to end.

use glam::{Mat4, Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::PipelineError;
use crate::properties::ShaderPropertyId;

/// One recorded command, mirroring the [`RenderContext`] surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginSample(String),
    EndSample(String),
    GetTemporaryRt {
        id: ShaderPropertyId,
        desc: RenderTargetDescriptor,
    },
    ReleaseTemporaryRt {
        id: ShaderPropertyId,
    },
    SetRenderTarget {
        color: RenderTargetId,
        load: LoadAction,
        store: StoreAction,
    },
    SetRenderTargetWithDepth {
        color: RenderTargetId,
        color_load: LoadAction,
        color_store: StoreAction,
        depth: RenderTargetId,
        depth_load: LoadAction,
        depth_store: StoreAction,
    },
    ClearRenderTarget {
        clear_depth: bool,
        clear_color: bool,
        color: Color,
    },
    SetViewport(Rect),
    SetGlobalFloat {
        id: ShaderPropertyId,
        value: f32,
    },
    SetGlobalInt {
        id: ShaderPropertyId,
        value: i32,
    },
    SetGlobalVector {
        id: ShaderPropertyId,
        value: Vec4,
    },
    SetGlobalMatrix {
        id: ShaderPropertyId,
        value: Mat4,
    },
    SetGlobalVectorArray {
        id: ShaderPropertyId,
        values: Vec<Vec4>,
    },
    SetGlobalMatrixArray {
        id: ShaderPropertyId,
        values: Vec<Mat4>,
    },
    SetGlobalTexture {
        id: ShaderPropertyId,
        texture: RenderTargetId,
    },
    EnableKeyword(&'static str),
    DisableKeyword(&'static str),
    SetupCamera,
    SetViewProjection {
        view: Mat4,
        proj: Mat4,
    },
    SetGlobalDepthBias {
        constant: f32,
        slope_scale: f32,
    },
    DrawShadowCasters {
        light_index: usize,
        split: ShadowSplitData,
    },
    DrawGeometry(GeometryDrawSettings),
    DrawSkybox,
    DrawFullscreen {
        material: MaterialId,
        pass: u32,
    },
    CopyTexture {
        src: RenderTargetId,
        dst: RenderTargetId,
    },
    Submit,
}

/// Render context that records commands instead of executing them.
#[derive(Debug, Default)]
pub struct RecordingContext {
    commands: Vec<Command>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    /// Acquire count for one temporary render target key.
    pub fn acquires_of(&self, id: ShaderPropertyId) -> usize {
        self.count(|c| matches!(c, Command::GetTemporaryRt { id: got, .. } if *got == id))
    }

    /// Release count for one temporary render target key.
    pub fn releases_of(&self, id: ShaderPropertyId) -> usize {
        self.count(|c| matches!(c, Command::ReleaseTemporaryRt { id: got } if *got == id))
    }

    /// All recorded acquires with their descriptors, in order.
    pub fn acquired(&self) -> Vec<(ShaderPropertyId, RenderTargetDescriptor)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::GetTemporaryRt { id, desc } => Some((*id, *desc)),
                _ => None,
            })
            .collect()
    }

    /// All recorded releases, in order.
    pub fn released(&self) -> Vec<ShaderPropertyId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::ReleaseTemporaryRt { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Every float written to one property, in order.
    pub fn floats_of(&self, id: ShaderPropertyId) -> Vec<f32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetGlobalFloat { id: got, value } if *got == id => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Every vector written to one property, in order.
    pub fn vectors_of(&self, id: ShaderPropertyId) -> Vec<Vec4> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetGlobalVector { id: got, value } if *got == id => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// The last vector array written to one property.
    pub fn vector_array_of(&self, id: ShaderPropertyId) -> Option<Vec<Vec4>> {
        self.commands
            .iter()
            .rev()
            .find_map(|c| match c {
                Command::SetGlobalVectorArray { id: got, values } if *got == id => {
                    Some(values.clone())
                }
                _ => None,
            })
    }

    pub fn viewports(&self) -> Vec<Rect> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetViewport(rect) => Some(*rect),
                _ => None,
            })
            .collect()
    }

    pub fn shadow_draws(&self) -> usize {
        self.count(|c| matches!(c, Command::DrawShadowCasters { .. }))
    }

    pub fn submits(&self) -> usize {
        self.count(|c| matches!(c, Command::Submit))
    }

    /// Whether a keyword's last recorded toggle left it enabled.
    pub fn keyword_enabled(&self, keyword: &str) -> bool {
        self.commands
            .iter()
            .rev()
            .find_map(|c| match c {
                Command::EnableKeyword(k) if *k == keyword => Some(true),
                Command::DisableKeyword(k) if *k == keyword => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Temporary keys with mismatched acquire/release counts.
    pub fn leaked_targets(&self) -> Vec<ShaderPropertyId> {
        let mut leaked = Vec::new();
        for (id, _) in self.acquired() {
            if self.acquires_of(id) != self.releases_of(id) && !leaked.contains(&id) {
                leaked.push(id);
            }
        }
        leaked
    }

    fn push(&mut self, command: Command) {
        log::trace!("RecordingContext: {command:?}");
        self.commands.push(command);
    }
}

impl RenderContext for RecordingContext {
    fn begin_sample(&mut self, name: &str) {
        self.push(Command::BeginSample(name.to_string()));
    }

    fn end_sample(&mut self, name: &str) {
        self.push(Command::EndSample(name.to_string()));
    }

    fn get_temporary_rt(&mut self, id: ShaderPropertyId, desc: &RenderTargetDescriptor) {
        self.push(Command::GetTemporaryRt { id, desc: *desc });
    }

    fn release_temporary_rt(&mut self, id: ShaderPropertyId) {
        self.push(Command::ReleaseTemporaryRt { id });
    }

    fn set_render_target(&mut self, color: RenderTargetId, load: LoadAction, store: StoreAction) {
        self.push(Command::SetRenderTarget { color, load, store });
    }

    fn set_render_target_with_depth(
        &mut self,
        color: RenderTargetId,
        color_load: LoadAction,
        color_store: StoreAction,
        depth: RenderTargetId,
        depth_load: LoadAction,
        depth_store: StoreAction,
    ) {
        self.push(Command::SetRenderTargetWithDepth {
            color,
            color_load,
            color_store,
            depth,
            depth_load,
            depth_store,
        });
    }

    fn clear_render_target(&mut self, clear_depth: bool, clear_color: bool, color: Color) {
        self.push(Command::ClearRenderTarget {
            clear_depth,
            clear_color,
            color,
        });
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.push(Command::SetViewport(rect));
    }

    fn set_global_float(&mut self, id: ShaderPropertyId, value: f32) {
        self.push(Command::SetGlobalFloat { id, value });
    }

    fn set_global_int(&mut self, id: ShaderPropertyId, value: i32) {
        self.push(Command::SetGlobalInt { id, value });
    }

    fn set_global_vector(&mut self, id: ShaderPropertyId, value: Vec4) {
        self.push(Command::SetGlobalVector { id, value });
    }

    fn set_global_matrix(&mut self, id: ShaderPropertyId, value: Mat4) {
        self.push(Command::SetGlobalMatrix { id, value });
    }

    fn set_global_vector_array(&mut self, id: ShaderPropertyId, values: &[Vec4]) {
        self.push(Command::SetGlobalVectorArray {
            id,
            values: values.to_vec(),
        });
    }

    fn set_global_matrix_array(&mut self, id: ShaderPropertyId, values: &[Mat4]) {
        self.push(Command::SetGlobalMatrixArray {
            id,
            values: values.to_vec(),
        });
    }

    fn set_global_texture(&mut self, id: ShaderPropertyId, texture: RenderTargetId) {
        self.push(Command::SetGlobalTexture { id, texture });
    }

    fn enable_keyword(&mut self, keyword: &'static str) {
        self.push(Command::EnableKeyword(keyword));
    }

    fn disable_keyword(&mut self, keyword: &'static str) {
        self.push(Command::DisableKeyword(keyword));
    }

    fn setup_camera(&mut self, _camera: &CameraDesc) {
        self.push(Command::SetupCamera);
    }

    fn set_view_projection(&mut self, view: Mat4, proj: Mat4) {
        self.push(Command::SetViewProjection { view, proj });
    }

    fn set_global_depth_bias(&mut self, constant: f32, slope_scale: f32) {
        self.push(Command::SetGlobalDepthBias {
            constant,
            slope_scale,
        });
    }

    fn draw_shadow_casters(&mut self, light_index: usize, split: &ShadowSplitData) {
        self.push(Command::DrawShadowCasters {
            light_index,
            split: *split,
        });
    }

    fn draw_geometry(&mut self, _cull: &dyn CullResults, settings: &GeometryDrawSettings) {
        self.push(Command::DrawGeometry(*settings));
    }

    fn draw_skybox(&mut self, _camera: &CameraDesc) {
        self.push(Command::DrawSkybox);
    }

    fn draw_fullscreen(&mut self, material: MaterialId, pass: u32) {
        self.push(Command::DrawFullscreen { material, pass });
    }

    fn copy_texture(&mut self, src: RenderTargetId, dst: RenderTargetId) {
        self.push(Command::CopyTexture { src, dst });
    }

    fn submit(&mut self) {
        self.push(Command::Submit);
    }
}

/// Device that hands out sequential handles and records lifetime calls.
#[derive(Debug)]
pub struct RecordingDevice {
    caps: DeviceCaps,
    next_handle: u64,
    /// Shader names that fail material creation, for configuration tests.
    pub broken_shaders: Vec<String>,
    pub created_materials: Vec<(String, MaterialId)>,
    pub destroyed_materials: Vec<MaterialId>,
    pub created_textures: Vec<TextureId>,
    pub destroyed_textures: Vec<TextureId>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::with_caps(DeviceCaps::default())
    }

    pub fn with_caps(caps: DeviceCaps) -> Self {
        Self {
            caps,
            next_handle: 1,
            broken_shaders: Vec::new(),
            created_materials: Vec::new(),
            destroyed_materials: Vec::new(),
            created_textures: Vec::new(),
            destroyed_textures: Vec::new(),
        }
    }

    fn next(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for RecordingDevice {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_material(&mut self, shader: &ShaderRef) -> Result<MaterialId, PipelineError> {
        if self.broken_shaders.iter().any(|s| s == shader.name()) {
            return Err(PipelineError::MaterialCreationFailed {
                shader: shader.name().to_string(),
                reason: "shader failed to compile".to_string(),
            });
        }
        let id = MaterialId(self.next());
        log::trace!("RecordingDevice: material {id:?} from `{}`", shader.name());
        self.created_materials.push((shader.name().to_string(), id));
        Ok(id)
    }

    fn destroy_material(&mut self, material: MaterialId) {
        self.destroyed_materials.push(material);
    }

    fn create_placeholder_texture(&mut self, label: &str, _color: Color) -> TextureId {
        let id = TextureId(self.next());
        log::trace!("RecordingDevice: placeholder texture {id:?} (`{label}`)");
        self.created_textures.push(id);
        id
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.destroyed_textures.push(texture);
    }
}

/// Canned scene for driving the pipeline without a host engine.
#[derive(Debug, Default, Clone)]
pub struct StubScene {
    pub lights: Vec<VisibleLight>,
    /// Light indices whose shadow caster bounds are degenerate.
    pub empty_bounds: Vec<usize>,
    /// Simulate a degenerate view: `cull` returns `None`.
    pub fail_cull: bool,
}

impl StubScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lights(lights: Vec<VisibleLight>) -> Self {
        Self {
            lights,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_cull: true,
            ..Self::default()
        }
    }

    pub fn without_bounds(mut self, light_index: usize) -> Self {
        self.empty_bounds.push(light_index);
        self
    }
}

impl SceneSource for StubScene {
    fn cull(
        &self,
        _camera: &CameraDesc,
        _max_shadow_distance: f32,
    ) -> Option<Box<dyn CullResults + '_>> {
        if self.fail_cull {
            return None;
        }
        Some(Box::new(StubCull {
            lights: &self.lights,
            empty_bounds: &self.empty_bounds,
        }))
    }
}

/// Cull result over a [`StubScene`], producing deterministic shadow slices.
#[derive(Debug)]
pub struct StubCull<'a> {
    lights: &'a [VisibleLight],
    empty_bounds: &'a [usize],
}

impl CullResults for StubCull<'_> {
    fn visible_lights(&self) -> &[VisibleLight] {
        self.lights
    }

    fn shadow_caster_bounds(&self, light_index: usize) -> Option<Bounds> {
        if self.empty_bounds.contains(&light_index) {
            return None;
        }
        Some(Bounds {
            min: Vec3::splat(-10.0),
            max: Vec3::splat(10.0),
        })
    }

    fn directional_shadow_slice(
        &self,
        light_index: usize,
        cascade: u32,
        cascade_count: u32,
        cascade_ratios: Vec3,
        _tile_size: u32,
        near_plane_offset: f32,
    ) -> ShadowSlice {
        // Cascades get well-separated spheres so tile data stays distinct.
        let ratio = match cascade {
            0 => cascade_ratios.x,
            1 => cascade_ratios.y,
            2 => cascade_ratios.z,
            _ => 1.0,
        };
        let radius = 10.0 + 40.0 * ratio * cascade_count as f32;
        let center = Vec3::new(light_index as f32, 0.0, cascade as f32 * 500.0);
        ShadowSlice {
            view: Mat4::IDENTITY,
            proj: Mat4::orthographic_rh(
                -radius,
                radius,
                -radius,
                radius,
                near_plane_offset,
                radius * 2.0,
            ),
            split: ShadowSplitData {
                culling_sphere: center.extend(radius),
                blend_cull_factor: 0.0,
            },
        }
    }

    fn spot_shadow_slice(&self, light_index: usize) -> ShadowSlice {
        let light = &self.lights[light_index];
        let fov = light.spot_angle.max(1.0).to_radians();
        ShadowSlice {
            view: Mat4::IDENTITY,
            proj: Mat4::perspective_rh(fov, 1.0, light.shadow_near_plane, light.range),
            split: ShadowSplitData {
                culling_sphere: light.position().extend(light.range),
                blend_cull_factor: 0.0,
            },
        }
    }

    fn point_shadow_slice(
        &self,
        light_index: usize,
        face: CubeFace,
        fov_bias: f32,
    ) -> ShadowSlice {
        let light = &self.lights[light_index];
        let fov = (90.0 + fov_bias).to_radians();
        ShadowSlice {
            view: Mat4::from_rotation_y(face.index() as f32),
            proj: Mat4::perspective_rh(fov, 1.0, light.shadow_near_plane, light.range),
            split: ShadowSplitData {
                culling_sphere: light.position().extend(light.range),
                blend_cull_factor: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PropertyRegistry;

    #[test]
    fn test_acquire_release_bookkeeping() {
        let mut registry = PropertyRegistry::new();
        let id = registry.id("_Scratch");
        let other = registry.id("_Other");

        let mut ctx = RecordingContext::new();
        let desc = RenderTargetDescriptor::color(64, 64, TextureFormat::Rgba8Unorm);
        ctx.get_temporary_rt(id, &desc);
        ctx.get_temporary_rt(other, &desc);
        ctx.release_temporary_rt(id);

        assert_eq!(ctx.acquires_of(id), 1);
        assert_eq!(ctx.releases_of(id), 1);
        assert_eq!(ctx.leaked_targets(), vec![other]);
    }

    #[test]
    fn test_keyword_tracking_uses_last_toggle() {
        let mut ctx = RecordingContext::new();
        ctx.enable_keyword("_DIRECTIONAL_PCF3");
        ctx.disable_keyword("_DIRECTIONAL_PCF3");
        assert!(!ctx.keyword_enabled("_DIRECTIONAL_PCF3"));
        ctx.enable_keyword("_DIRECTIONAL_PCF3");
        assert!(ctx.keyword_enabled("_DIRECTIONAL_PCF3"));
        assert!(!ctx.keyword_enabled("_NEVER_SET"));
    }

    #[test]
    fn test_stub_scene_cull_failure() {
        let scene = StubScene::failing();
        let camera = CameraDesc::new(64, 64);
        assert!(scene.cull(&camera, 100.0).is_none());
    }

    #[test]
    fn test_stub_cull_reports_bounds() {
        let scene = StubScene::with_lights(vec![
            VisibleLight::directional(Vec4::ONE, Mat4::IDENTITY),
            VisibleLight::directional(Vec4::ONE, Mat4::IDENTITY),
        ])
        .without_bounds(1);
        let camera = CameraDesc::new(64, 64);
        let cull = scene.cull(&camera, 100.0).unwrap();
        assert!(cull.shadow_caster_bounds(0).is_some());
        assert!(cull.shadow_caster_bounds(1).is_none());
    }

    #[test]
    fn test_recording_device_fails_broken_shaders() {
        let mut device = RecordingDevice::new();
        device.broken_shaders.push("Hidden/Broken".to_string());
        let err = device.create_material(&ShaderRef::new("Hidden/Broken"));
        assert!(err.is_err());
        let ok = device.create_material(&ShaderRef::new("Hidden/Fine"));
        assert!(ok.is_ok());
    }
}
