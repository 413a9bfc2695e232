// Service error types

use crate::vfs::VfsError;

use thiserror::Error;

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced to callers of the controller
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("unit '{0}' is not ready")]
    UnitNotReady(String),

    #[error("no unit named '{0}'")]
    UnknownUnit(String),

    #[error("no primary input supplied")]
    MissingInput,

    #[error("required artifact '{0}' missing")]
    MissingArtifact(String),

    #[error("tool binary not found: {0}")]
    ToolNotFound(String),

    #[error("{unit} failed: {description}")]
    ToolFailed {
        unit: String,
        description: String,
        errno: Option<i32>,
    },

    #[error("unit event channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
