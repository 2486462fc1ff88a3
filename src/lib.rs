//! # Forward Pipeline
//!
//! A forward render pipeline built on a host engine's command recording
//! and visibility contracts.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderPipeline`] - Per-frame camera iteration and configuration
//! - [`CameraRenderer`] - Cull, light, draw, and composite one camera
//! - [`Shadows`] - Tile reservation and rendering for two shadow atlases
//! - [`PostFxStack`] - Bloom, color grading LUT, tone mapping, composite
//! - A recording no-op backend for tests and development
//!
//! ## Example
//!
//! ```
//! use forward_pipeline::{
//!     HostCamera, PipelineSettings, RenderPipeline, RecordingContext, RecordingDevice,
//!     CameraDesc, ShaderRef, StubScene,
//! };
//!
//! let mut device = RecordingDevice::new();
//! let settings = PipelineSettings::new(ShaderRef::new("Hidden/CameraRenderer"));
//! let mut pipeline = RenderPipeline::new(&mut device, settings).unwrap();
//!
//! let mut ctx = RecordingContext::new();
//! let scene = StubScene::new();
//! let cameras = [HostCamera::new(CameraDesc::new(1920, 1080))];
//! pipeline.render(&mut device, &mut ctx, &scene, &cameras);
//! pipeline.dispose(&mut device);
//! ```

pub mod backend;
pub mod diagnostics;
pub mod error;
pub mod lighting;
pub mod pipeline;
pub mod post_fx;
pub mod properties;
pub mod renderer;
pub mod settings;

// Re-export main types for convenience
pub use backend::{
    BatchingFlags, CameraDesc, CameraType, ClearFlags, Color, Command, CullResults, DeviceCaps,
    FinalBlendMode, LightKind, MaterialId, RecordingContext, RecordingDevice, RenderContext,
    RenderDevice, RenderTargetDescriptor, RenderTargetId, SceneSource, ShaderRef, ShadowMode,
    ShadowmaskMode, StubScene, TextureFormat, VisibleLight,
};
pub use diagnostics::{Diagnostics, NullDiagnostics};
pub use error::{PipelineError, PipelineResult};
pub use lighting::{Lighting, ShadowData, Shadows};
pub use pipeline::{HostCamera, PipelineSettings, RenderPipeline};
pub use post_fx::{FxPass, PostFxStack};
pub use properties::{PropertyRegistry, ShaderIds, ShaderPropertyId};
pub use renderer::{CameraRenderer, FrameParams};
pub use settings::{
    BloomMode, BloomSettings, CameraSettings, PostFxSettings, ShadowFilter, ShadowMapSize,
    ShadowSettings, ToneMappingMode,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the pipeline library.
///
/// Optional; only emits a version log line for host diagnostics.
pub fn init() {
    log::info!("forward-pipeline v{VERSION} initialized");
}
