//! Diagnostics observer.
//!
//! Editor and tooling hooks are injected through this trait instead of
//! conditional compilation, so the core pipeline never branches on build
//! configuration. Every method defaults to a no-op.

use crate::backend::traits::RenderContext;
use crate::backend::types::CameraDesc;

/// Optional observer for editor-only drawing and instrumentation.
pub trait Diagnostics {
    /// Called before culling; scene-view hosts emit UI geometry here.
    fn prepare_scene_window(&mut self, _camera: &CameraDesc) {}

    /// A camera's cull query failed and its render was skipped.
    fn cull_failed(&mut self, _camera: &CameraDesc) {}

    /// Draw geometry using unsupported materials, for error shading.
    fn draw_unsupported(&mut self, _ctx: &mut dyn RenderContext) {}

    /// Overlay hook before post effects run (depth-tested gizmos).
    fn draw_pre_effect_overlays(&mut self, _ctx: &mut dyn RenderContext) {}

    /// Overlay hook after post effects run (always-on-top gizmos).
    fn draw_post_effect_overlays(&mut self, _ctx: &mut dyn RenderContext) {}
}

/// The default observer: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_diagnostics_is_a_valid_observer() {
        let mut observer: Box<dyn Diagnostics> = Box::<NullDiagnostics>::default();
        observer.prepare_scene_window(&CameraDesc::new(4, 4));
        observer.cull_failed(&CameraDesc::new(4, 4));
    }
}
