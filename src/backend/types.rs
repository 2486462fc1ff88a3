//! Common types shared across the host-engine contract

use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};

use crate::properties::ShaderPropertyId;

/// Texture format enumeration for render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    /// Depth format with comparison sampling, used by the shadow atlases.
    Shadowmap,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float | TextureFormat::Shadowmap)
    }
}

/// Filter mode for temporary render target sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// What happens to an attachment's previous contents when it is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    DontCare,
    Load,
}

/// What happens to an attachment's contents when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Store,
    DontCare,
}

/// Blend factor for the final composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    /// Stable index used when a blend factor is passed as a shader float.
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// RGBA color, unclamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const CLEAR: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn gray(value: f32) -> Self {
        Self::new(value, value, value, 1.0)
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }

    /// sRGB to linear conversion, alpha untouched.
    pub fn to_linear(self) -> Vec4 {
        Vec4::new(
            gamma_to_linear(self.r),
            gamma_to_linear(self.g),
            gamma_to_linear(self.b),
            self.a,
        )
    }
}

/// Exact sRGB gamma to linear conversion for a single channel.
pub fn gamma_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

/// Rectangle, used both for normalized viewports and pixel rects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// The full normalized viewport.
    pub const FULL: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether a normalized viewport rect covers the whole target.
    pub fn is_full(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.width == 1.0 && self.height == 1.0
    }
}

/// How a camera clears its target before drawing.
///
/// Ordering matters: later variants clear less. `Skybox` and `Color` clear
/// depth and color (the former replacing the color clear with the skybox
/// draw); `Depth` clears only depth; `Nothing` leaves the target alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClearFlags {
    Skybox,
    Color,
    Depth,
    Nothing,
}

impl ClearFlags {
    pub fn clears_depth(self) -> bool {
        self <= ClearFlags::Depth
    }

    pub fn clears_color(self) -> bool {
        self == ClearFlags::Color
    }
}

/// Camera category; post effects only apply up to `SceneView`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CameraType {
    Game,
    SceneView,
    Preview,
    Reflection,
}

/// Host-provided camera description for one frame.
#[derive(Debug, Clone)]
pub struct CameraDesc {
    pub camera_type: CameraType,
    /// Absolute pixel rect of the camera on its target.
    pub pixel_rect: Rect,
    /// Normalized viewport rect on the target.
    pub viewport: Rect,
    pub clear_flags: ClearFlags,
    pub background_color: Color,
    pub allow_hdr: bool,
    pub far_plane: f32,
    /// Editor "show image effects" toggle; suppresses the post FX stack.
    pub suppress_image_effects: bool,
}

impl CameraDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            camera_type: CameraType::Game,
            pixel_rect: Rect::new(0.0, 0.0, width as f32, height as f32),
            viewport: Rect::FULL,
            clear_flags: ClearFlags::Skybox,
            background_color: Color::CLEAR,
            allow_hdr: true,
            far_plane: 1000.0,
            suppress_image_effects: false,
        }
    }

    pub fn pixel_width(&self) -> u32 {
        self.pixel_rect.width as u32
    }

    pub fn pixel_height(&self) -> u32 {
        self.pixel_rect.height as u32
    }
}

/// Kind of a visible light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

/// Shadow casting mode of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMode {
    None,
    Hard,
    Soft,
}

/// One visible light from the cull result.
#[derive(Debug, Clone)]
pub struct VisibleLight {
    pub kind: LightKind,
    /// Final color with intensity premultiplied.
    pub color: Vec4,
    /// Light transform; forward is the negated third column.
    pub local_to_world: Mat4,
    pub range: f32,
    /// Outer spot angle in degrees.
    pub spot_angle: f32,
    /// Inner spot angle in degrees.
    pub inner_spot_angle: f32,
    pub shadows: ShadowMode,
    pub shadow_strength: f32,
    /// Slope-scale depth bias.
    pub shadow_bias: f32,
    pub shadow_normal_bias: f32,
    pub shadow_near_plane: f32,
    /// Baked occlusion mask channel when the light uses mixed lighting.
    pub shadow_mask_channel: Option<u32>,
}

impl VisibleLight {
    pub fn directional(color: Vec4, local_to_world: Mat4) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            local_to_world,
            range: f32::INFINITY,
            spot_angle: 0.0,
            inner_spot_angle: 0.0,
            shadows: ShadowMode::None,
            shadow_strength: 1.0,
            shadow_bias: 0.0,
            shadow_normal_bias: 0.0,
            shadow_near_plane: 0.1,
            shadow_mask_channel: None,
        }
    }

    pub fn point(color: Vec4, local_to_world: Mat4, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            range,
            ..Self::directional(color, local_to_world)
        }
    }

    pub fn spot(
        color: Vec4,
        local_to_world: Mat4,
        range: f32,
        spot_angle: f32,
        inner_spot_angle: f32,
    ) -> Self {
        Self {
            kind: LightKind::Spot,
            range,
            spot_angle,
            inner_spot_angle,
            ..Self::directional(color, local_to_world)
        }
    }

    pub fn with_shadows(mut self, mode: ShadowMode, strength: f32) -> Self {
        self.shadows = mode;
        self.shadow_strength = strength;
        self
    }

    /// World-space direction the light shines along.
    pub fn direction(&self) -> Vec3 {
        -Vec3::new(
            self.local_to_world.z_axis.x,
            self.local_to_world.z_axis.y,
            self.local_to_world.z_axis.z,
        )
    }

    /// World-space position of the light.
    pub fn position(&self) -> Vec3 {
        Vec3::new(
            self.local_to_world.w_axis.x,
            self.local_to_world.w_axis.y,
            self.local_to_world.w_axis.z,
        )
    }
}

/// Axis-aligned shadow caster bounds for a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

/// Per-slice caster culling data forwarded to the shadow draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSplitData {
    /// xyz center, w radius of the culling sphere.
    pub culling_sphere: Vec4,
    pub blend_cull_factor: f32,
}

/// View/projection pair for one shadow tile, from the host's shadow
/// matrix utilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSlice {
    pub view: Mat4,
    pub proj: Mat4,
    pub split: ShadowSplitData,
}

/// Cube map face index for point light shadow tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Geometry sort order for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortingCriteria {
    /// Front to back with state sorting, for opaque geometry.
    CommonOpaque,
    /// Back to front, for transparent geometry.
    CommonTransparent,
}

/// Render queue range filter for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderQueueRange {
    Opaque,
    Transparent,
    All,
}

bitflags! {
    /// Draw-call batching strategies requested from the host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BatchingFlags: u32 {
        const DYNAMIC_BATCHING = 1 << 0;
        const GPU_INSTANCING = 1 << 1;
        const SRP_BATCHER = 1 << 2;
    }
}

bitflags! {
    /// Per-object data the host uploads alongside geometry draws.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PerObjectData: u32 {
        const REFLECTION_PROBES = 1 << 0;
        const LIGHTMAPS = 1 << 1;
        const SHADOW_MASK = 1 << 2;
        const LIGHT_PROBE = 1 << 3;
        const OCCLUSION_PROBE = 1 << 4;
    }
}

/// Settings for one culled-geometry draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryDrawSettings {
    pub queue_range: RenderQueueRange,
    pub sorting: SortingCriteria,
    pub batching: BatchingFlags,
    pub per_object: PerObjectData,
}

/// Handle to a host-owned texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Handle to a host-owned material instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u64);

/// Reference to a shader asset by name, resolved by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderRef {
    name: String,
}

impl ShaderRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Identifies a render target for binding, copying, or sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetId {
    /// The camera's real target (backbuffer or host-provided texture).
    CameraTarget,
    /// A frame-scoped temporary render target addressed by property key.
    Temporary(ShaderPropertyId),
    /// A long-lived host texture.
    Texture(TextureId),
}

/// Descriptor for a frame-scoped temporary render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth_bits: u32,
    pub filter: FilterMode,
    pub format: TextureFormat,
}

impl RenderTargetDescriptor {
    /// A color target without a depth buffer.
    pub fn color(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            depth_bits: 0,
            filter: FilterMode::Linear,
            format,
        }
    }

    /// A standalone depth attachment.
    pub fn depth(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_bits: 32,
            filter: FilterMode::Nearest,
            format: TextureFormat::Depth32Float,
        }
    }

    /// A square shadow atlas target.
    pub fn shadow_atlas(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            depth_bits: 32,
            filter: FilterMode::Linear,
            format: TextureFormat::Shadowmap,
        }
    }
}

/// Blend factors applied when compositing into the camera's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalBlendMode {
    pub source: BlendFactor,
    pub destination: BlendFactor,
}

impl Default for FinalBlendMode {
    fn default() -> Self {
        Self {
            source: BlendFactor::One,
            destination: BlendFactor::Zero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_flags_ordering() {
        assert!(ClearFlags::Skybox.clears_depth());
        assert!(ClearFlags::Depth.clears_depth());
        assert!(!ClearFlags::Nothing.clears_depth());
        assert!(ClearFlags::Color.clears_color());
        assert!(!ClearFlags::Skybox.clears_color());
        assert!(ClearFlags::Skybox < ClearFlags::Color);
        assert!(ClearFlags::Depth > ClearFlags::Color);
    }

    #[test]
    fn test_gamma_to_linear_endpoints() {
        assert_eq!(gamma_to_linear(0.0), 0.0);
        assert!((gamma_to_linear(1.0) - 1.0).abs() < 1e-6);
        assert!(gamma_to_linear(0.5) < 0.5);
    }

    #[test]
    fn test_light_direction_is_negated_forward() {
        let light = VisibleLight::directional(Vec4::ONE, Mat4::IDENTITY);
        assert_eq!(light.direction(), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_viewport_full_check() {
        assert!(Rect::FULL.is_full());
        assert!(!Rect::new(0.0, 0.0, 0.5, 1.0).is_full());
    }
}
