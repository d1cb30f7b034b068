//! NATS discovery provider
//!
//! Discovery without a central directory: every registered node subscribes to
//! a shared subject and answers `Request` messages with its own address on the
//! requester's private inbox. A discovery round publishes one request and
//! collects every response that arrives before the timeout.

mod config;
mod discovery;
mod message;

pub use config::NatsConfig;
pub use discovery::NatsDiscovery;
pub use message::{DiscoveryMessage, MessageType};
