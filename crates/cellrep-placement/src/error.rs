//! Placement error types.

use thiserror::Error;

use crate::cell_state::InsufficientResourcesError;

/// Reasons a work item could not be placed on any cell.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error(transparent)]
    InsufficientResources(#[from] InsufficientResourcesError),

    #[error("rootfs not found")]
    IncompatibleRootFs,

    #[error("found no compatible cell with required volume drivers")]
    VolumeDriverMismatch,

    #[error("found no compatible cell with required placement tags")]
    PlacementTagMismatch,

    #[error("no cells available")]
    NoCellsAvailable,
}

pub type PlacementResult<T> = Result<T, PlacementError>;
