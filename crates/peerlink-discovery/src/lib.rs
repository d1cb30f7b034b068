//! Peerlink Discovery - Pluggable peer discovery providers
//!
//! Every backend implements the [`Provider`] contract and its lifecycle
//! state machine:
//!
//! ```text
//! Uninitialized --initialize--> Initialized --register--> Registered
//!       ^                            ^                        |
//!       |                            +-------deregister-------+
//!       +------------------------ close (from any state)
//! ```
//!
//! Backends:
//! - [`NatsDiscovery`]: request/response discovery over a NATS subject
//! - [`StaticDiscovery`]: a fixed list of addresses
//! - [`DnsDiscovery`]: A/AAAA records of a DNS name
//! - [`KubernetesDiscovery`]: running and ready pods selected by labels

pub mod config;
pub mod dns;
pub mod error;
pub mod kubernetes;
pub mod nats;
pub mod provider;
pub mod static_hosts;

pub use config::{ProviderConfig, create_provider};
pub use dns::{DnsConfig, DnsDiscovery};
pub use error::DiscoveryError;
pub use kubernetes::{KubernetesConfig, KubernetesDiscovery};
pub use nats::{DiscoveryMessage, MessageType, NatsConfig, NatsDiscovery};
pub use provider::{Provider, ProviderState};
pub use static_hosts::{StaticConfig, StaticDiscovery};
