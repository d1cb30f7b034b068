//! Peerlink Core - Discovery engine and gossip membership bootstrap
//!
//! The [`Engine`] owns one discovery [`Provider`](peerlink_discovery::Provider),
//! uses it to find the addresses of an existing cluster, joins the gossip
//! membership transport through them and then keeps a [`PeerSink`] fed with
//! the current peer set on every membership change.
//!
//! The membership transport itself is consumed through the [`Membership`] and
//! [`MembershipFactory`] traits.

pub mod config;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod log_writer;
pub mod membership;
pub mod peer;

pub use config::{Configuration, EngineConfig};
pub use delegate::EngineDelegate;
pub use engine::Engine;
pub use error::EngineError;
pub use log_writer::LogWriter;
pub use membership::{
    Member, Membership, MembershipConfig, MembershipDelegate, MembershipFactory, NodeEvent,
    NodeEventKind,
};
pub use peer::{Peer, PeerInfo, PeerSink};
