// Static discovery provider
// Returns a configured list of addresses without contacting any network resource

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use peerlink_common::ValidationError;
use peerlink_common::validation::{TcpAddressValidator, ValidationChain};

use crate::error::DiscoveryError;
use crate::provider::{Provider, ProviderState};

/// Static provider configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticConfig {
    /// Peer addresses in the form `ip:port`, where the port is the gossip port
    #[serde(default)]
    pub hosts: Vec<String>,
}

impl StaticConfig {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.hosts
            .iter()
            .fold(
                ValidationChain::fail_fast().add_assertion(!self.hosts.is_empty(), "hosts are required"),
                |chain, host| chain.add_validator(TcpAddressValidator::new(host.as_str())),
            )
            .validate()
    }
}

pub struct StaticDiscovery {
    config: StaticConfig,
    state: Mutex<ProviderState>,
}

impl StaticDiscovery {
    pub const ID: &'static str = "static";

    pub fn new(config: StaticConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ProviderState::default()),
        }
    }

    pub async fn state(&self) -> ProviderState {
        *self.state.lock().await
    }
}

#[async_trait]
impl Provider for StaticDiscovery {
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
        let state = self.state.lock().await;
        state.check_discover()?;
        debug!(count = self.config.hosts.len(), "Returning static peers");
        Ok(self.config.hosts.clone())
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        *self.state.lock().await = ProviderState::Closed;
        Ok(())
    }
}
