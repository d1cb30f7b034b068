// DNS discovery provider
// Resolves the A and AAAA records of a DNS name through the system resolver

use std::collections::HashSet;
use std::net::SocketAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use peerlink_common::validation::{
    BooleanValidator, ConditionalValidator, EmptyStringValidator, ValidationChain,
};
use peerlink_common::{ValidationError, join_host_port};

use crate::error::DiscoveryError;
use crate::provider::{Provider, ProviderState};

/// DNS provider configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DnsConfig {
    /// The DNS name to resolve
    pub domain_name: String,
    /// Only keep IPv6 addresses when set to true; otherwise keep every address
    #[serde(default)]
    pub ipv6: Option<bool>,
    /// Port appended to every resolved address
    #[serde(default)]
    pub port: Option<u16>,
}

impl DnsConfig {
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationChain::fail_fast()
            .add_validator(EmptyStringValidator::new("DomainName", self.domain_name.as_str()))
            .add_validator(ConditionalValidator::new(
                self.port.is_some(),
                BooleanValidator::new(self.port != Some(0), "Port is invalid"),
            ))
            .validate()
    }
}

pub struct DnsDiscovery {
    config: DnsConfig,
    state: Mutex<ProviderState>,
}

impl DnsDiscovery {
    pub const ID: &'static str = "dns-sd";

    pub fn new(config: DnsConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ProviderState::default()),
        }
    }

    /// Turn resolved socket addresses into peer addresses
    ///
    /// Keeps first-seen order and drops duplicates.
    pub fn peer_addresses(
        addrs: impl IntoIterator<Item = SocketAddr>,
        ipv6_only: bool,
        port: Option<u16>,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        addrs
            .into_iter()
            .filter(|addr| !ipv6_only || addr.is_ipv6())
            .map(|addr| {
                let ip = addr.ip().to_string();
                match port {
                    Some(port) => join_host_port(&ip, port),
                    None => ip,
                }
            })
            .filter(|addr| seen.insert(addr.clone()))
            .collect()
    }
}

#[async_trait]
impl Provider for DnsDiscovery {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn initialize(&self) -> Result<(), DiscoveryError> {
        let mut state = self.state.lock().await;
        state.check_initialize()?;
        self.config.validate()?;
        *state = ProviderState::Initialized;
        Ok(())
    }

    async fn register(&self) -> Result<(), DiscoveryError> {
        let mut state = self.state.lock().await;
        state.check_register()?;
        *state = ProviderState::Registered;
        Ok(())
    }

    async fn deregister(&self) -> Result<(), DiscoveryError> {
        let mut state = self.state.lock().await;
        state.check_deregister()?;
        *state = ProviderState::Deregistered;
        Ok(())
    }

    async fn discover_peers(&self) -> Result<Vec<String>, DiscoveryError> {
        self.state.lock().await.check_discover()?;

        let target = (self.config.domain_name.as_str(), self.config.port.unwrap_or(0));
        let addrs = tokio::net::lookup_host(target)
            .await
            .map_err(|e| DiscoveryError::Directory(e.to_string()))?;

        let peers = Self::peer_addresses(
            addrs,
            self.config.ipv6.unwrap_or(false),
            self.config.port,
        );
        debug!(
            domain = %self.config.domain_name,
            count = peers.len(),
            "Resolved DNS peers"
        );
        Ok(peers)
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        *self.state.lock().await = ProviderState::Closed;
        Ok(())
    }
}
