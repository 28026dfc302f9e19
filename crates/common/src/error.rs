use crate::types::{ContextId, ResourceHandle, ResourceName};
use thiserror::Error;

/// Errors reported by the quiescence barrier.
///
/// None of these are fatal: the registry is left unchanged and stays usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BarrierError {
    #[error("Resource already open: {context_id}/{resource_name}")]
    DuplicateResource {
        context_id: ContextId,
        resource_name: ResourceName,
    },

    #[error("Resource not open: {context_id}/{resource_name}")]
    UnknownResource {
        context_id: ContextId,
        resource_name: ResourceName,
    },

    #[error("A quiescence wait is already active on this barrier")]
    WaitAlreadyActive,

    #[error("Timed out waiting for quiescence with {open} resource(s) still open")]
    Timeout { open: usize },

    #[error("Quiescence signal dropped before release")]
    SignalDropped,
}

impl BarrierError {
    pub fn duplicate(handle: &ResourceHandle) -> Self {
        Self::DuplicateResource {
            context_id: handle.context_id.clone(),
            resource_name: handle.resource_name.clone(),
        }
    }

    pub fn unknown(handle: &ResourceHandle) -> Self {
        Self::UnknownResource {
            context_id: handle.context_id.clone(),
            resource_name: handle.resource_name.clone(),
        }
    }

    /// Misbehaving caller or notification source, not a transient failure
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::DuplicateResource { .. } | Self::UnknownResource { .. } | Self::WaitAlreadyActive
        )
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation failed: {details}")]
    Validation { details: String },
}

impl ConfigError {
    pub fn validation(details: impl Into<String>) -> Self {
        Self::Validation {
            details: details.into(),
        }
    }
}

pub type BarrierResult<T> = std::result::Result<T, BarrierError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
