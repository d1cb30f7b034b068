// Gossip membership transport contract
//
// The failure-detecting membership layer is an external collaborator. The
// engine only needs to create an instance, join it through a list of seed
// addresses, read its member list and receive its join/leave/update events.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use peerlink_common::BoxError;

use crate::log_writer::LogWriter;

/// A live member as reported by the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    /// Transport-level node name (`host:gossip-port`)
    pub name: String,
    /// Metadata published by the member's delegate
    pub meta: Vec<u8>,
}

impl Member {
    pub fn new(name: impl Into<String>, meta: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            meta,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeEventKind {
    Join,
    Leave,
    Update,
}

impl fmt::Display for NodeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEventKind::Join => write!(f, "NODE_JOIN"),
            NodeEventKind::Leave => write!(f, "NODE_LEAVE"),
            NodeEventKind::Update => write!(f, "NODE_UPDATE"),
        }
    }
}

/// Membership change delivered by the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeEvent {
    pub kind: NodeEventKind,
    pub node: Member,
}

impl NodeEvent {
    pub fn join(node: Member) -> Self {
        Self {
            kind: NodeEventKind::Join,
            node,
        }
    }

    pub fn leave(node: Member) -> Self {
        Self {
            kind: NodeEventKind::Leave,
            node,
        }
    }

    pub fn update(node: Member) -> Self {
        Self {
            kind: NodeEventKind::Update,
            node,
        }
    }
}

/// Hooks the transport calls to exchange node metadata and user state
pub trait MembershipDelegate: Send + Sync {
    /// Metadata advertised for the local node, at most `limit` bytes
    fn node_meta(&self, limit: usize) -> Vec<u8>;

    fn notify_msg(&self, msg: &[u8]);

    fn get_broadcasts(&self, overhead: usize, limit: usize) -> Vec<Vec<u8>>;

    fn local_state(&self, join: bool) -> Vec<u8>;

    fn merge_remote_state(&self, buf: &[u8], join: bool);
}

/// Settings handed to [`MembershipFactory::create`]
pub struct MembershipConfig {
    /// Unique node name, `host:gossip-port`
    pub name: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub advertise_port: u16,
    /// Sink for the transport's text logs
    pub log_output: LogWriter,
    pub delegate: Arc<dyn MembershipDelegate>,
    /// Bounded channel receiving membership events
    pub events: mpsc::Sender<NodeEvent>,
}

impl fmt::Debug for MembershipConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MembershipConfig")
            .field("name", &self.name)
            .field("bind_addr", &self.bind_addr)
            .field("bind_port", &self.bind_port)
            .field("advertise_port", &self.advertise_port)
            .finish_non_exhaustive()
    }
}

/// A running membership transport instance
#[async_trait]
pub trait Membership: Send + Sync {
    /// Join a cluster through the given seed addresses
    ///
    /// Returns the number of nodes successfully contacted.
    async fn join(&self, addresses: &[String]) -> Result<usize, BoxError>;

    /// Current live members, the local node included
    async fn members(&self) -> Vec<Member>;

    /// Broadcast a graceful leave, waiting up to `timeout`
    async fn leave(&self, timeout: Duration) -> Result<(), BoxError>;

    /// Stop the transport without notifying the cluster
    async fn shutdown(&self) -> Result<(), BoxError>;
}

/// Creates membership transport instances
#[async_trait]
pub trait MembershipFactory: Send + Sync {
    async fn create(&self, config: MembershipConfig) -> Result<Arc<dyn Membership>, BoxError>;
}
