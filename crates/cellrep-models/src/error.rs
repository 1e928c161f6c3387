//! Error types for model validation and conversion.

use thiserror::Error;

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating or converting model values.
///
/// The fixed-message variants are sentinels: callers compare on the
/// variant and never retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("container is missing tags")]
    ContainerMissingTags,

    #[error("container does not have a valid process index")]
    InvalidProcessIndex,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("preloaded rootfs path not found")]
    PreloadedRootFsNotFound,

    #[error("invalid rootfs url: {0}")]
    InvalidRootFs(String),
}
