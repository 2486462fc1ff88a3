//! Host-engine abstraction layer.
//!
//! The pipeline consumes the host engine through a narrow contract: a
//! command recording context, a device surface for capabilities and
//! resource lifetime, and the visibility/shadow-matrix queries. A
//! recording no-op implementation ships alongside for tests and
//! development without GPU hardware.

pub mod recording;
pub mod traits;
pub mod types;

pub use recording::{Command, RecordingContext, RecordingDevice, StubCull, StubScene};
pub use traits::{
    CullResults, DeviceCaps, RenderContext, RenderDevice, SceneSource, ShadowmaskMode,
};
pub use types::*;
