// Discovery provider error types

use peerlink_common::ValidationError;

/// Errors returned by discovery providers
///
/// Lifecycle violations are the only errors a state transition can produce
/// on its own; everything else comes from configuration or the backend.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("provider already initialized")]
    AlreadyInitialized,

    #[error("provider not initialized")]
    NotInitialized,

    #[error("provider already registered")]
    AlreadyRegistered,

    #[error("provider is not registered")]
    NotRegistered,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("network error: {0}")]
    Network(String),

    #[error("directory error: {0}")]
    Directory(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl DiscoveryError {
    /// Whether the error is a lifecycle-state violation
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            DiscoveryError::AlreadyInitialized
                | DiscoveryError::NotInitialized
                | DiscoveryError::AlreadyRegistered
                | DiscoveryError::NotRegistered
        )
    }

    /// Whether retrying the operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Network(_) | DiscoveryError::Directory(_)
        )
    }
}
