// Peer model and the consumer of peer-set updates

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use peerlink_common::BoxError;

/// Identity of one cluster node
///
/// A node publishes its own `Peer` as gossip metadata. The encoding is JSON:
///
/// ```json
/// {"address":"10.0.0.1:8080","isSelf":true,"discoveryPort":7946}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    /// `host:port` used for cache traffic
    pub address: String,
    /// Whether this record describes the local node
    pub is_self: bool,
    /// Gossip port of the node
    pub discovery_port: u16,
}

impl Peer {
    pub fn new(address: impl Into<String>, is_self: bool, discovery_port: u16) -> Self {
        Self {
            address: address.into(),
            is_self,
            discovery_port,
        }
    }

    /// The local node
    pub fn host(address: impl Into<String>, discovery_port: u16) -> Self {
        Self::new(address, true, discovery_port)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(meta: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(meta)
    }

    /// Decode another member's metadata as seen from `host_address`
    ///
    /// Every node advertises itself with `is_self = true`, so the flag is
    /// recomputed against the local address.
    pub fn decode_relative(meta: &[u8], host_address: &str) -> Result<Self, serde_json::Error> {
        let mut peer = Self::decode(meta)?;
        peer.is_self = peer.address == host_address;
        Ok(peer)
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            address: self.address.clone(),
            is_self: self.is_self,
        }
    }
}

/// Entry of the peer set pushed to a [`PeerSink`]
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerInfo {
    pub address: String,
    pub is_self: bool,
}

/// Consumer of peer-set updates, usually the cache routing layer
#[async_trait]
pub trait PeerSink: Send + Sync {
    /// Replace the current peer set
    async fn set_peers(&self, peers: Vec<PeerInfo>) -> Result<(), BoxError>;
}
