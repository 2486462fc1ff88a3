//! Pipeline error types

use thiserror::Error;

/// Errors surfaced by pipeline construction and teardown.
///
/// Per-frame failures (culling, shadow reservation, capability gaps) never
/// produce errors; they degrade locally with skip/sentinel/fallback paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("missing shader reference in post FX settings")]
    MissingShader,
    #[error("failed to create material for shader `{shader}`: {reason}")]
    MaterialCreationFailed { shader: String, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
