use peerlink_common::BoxError;
use peerlink_discovery::DiscoveryError;

/// Errors returned by the discovery engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid host address {address}: {reason}")]
    InvalidHostAddress { address: String, reason: String },

    #[error("discovery engine already started")]
    AlreadyStarted,

    #[error("discovery engine not started")]
    NotStarted,

    #[error("cluster quorum not met: discovered {discovered} peers, minimum is {minimum}")]
    QuorumNotMet { discovered: usize, minimum: usize },

    #[error("timed out joining the cluster")]
    JoinTimeout,

    #[error("timed out shutting down the discovery engine")]
    ShutdownTimeout,

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("membership error: {0}")]
    Membership(BoxError),

    #[error("peer metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
