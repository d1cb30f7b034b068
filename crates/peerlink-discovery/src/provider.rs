// Provider contract shared by every discovery backend

use async_trait::async_trait;

use crate::error::DiscoveryError;

/// Discovers the other running nodes of the cluster
///
/// Implementations guard their mutable state with their own lock, so a
/// single instance can be shared behind an `Arc<dyn Provider>`. A repeated
/// transition fails instead of running twice, and a failed transition leaves
/// the state unchanged.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable backend name
    fn id(&self) -> &str;

    /// Validate the configuration and prepare internal resources
    async fn initialize(&self) -> Result<(), DiscoveryError>;

    /// Announce this node to the backend
    async fn register(&self) -> Result<(), DiscoveryError>;

    /// Reverse `register`
    async fn deregister(&self) -> Result<(), DiscoveryError>;

    /// Current best-known peer addresses
    async fn discover_peers(&self) -> Result<Vec<String>, DiscoveryError>;

    /// Release every resource; safe to call in any state
    async fn close(&self) -> Result<(), DiscoveryError>;
}

/// Lifecycle state of a provider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderState {
    #[default]
    Uninitialized,
    Initialized,
    Registered,
    /// Initialized again after a deregistration
    Deregistered,
    Closed,
}

impl ProviderState {
    pub fn is_initialized(self) -> bool {
        matches!(
            self,
            ProviderState::Initialized | ProviderState::Registered | ProviderState::Deregistered
        )
    }

    pub fn is_registered(self) -> bool {
        self == ProviderState::Registered
    }

    pub fn check_initialize(self) -> Result<(), DiscoveryError> {
        if self.is_initialized() {
            return Err(DiscoveryError::AlreadyInitialized);
        }
        Ok(())
    }

    pub fn check_register(self) -> Result<(), DiscoveryError> {
        if !self.is_initialized() {
            return Err(DiscoveryError::NotInitialized);
        }
        if self.is_registered() {
            return Err(DiscoveryError::AlreadyRegistered);
        }
        Ok(())
    }

    pub fn check_deregister(self) -> Result<(), DiscoveryError> {
        if !self.is_initialized() {
            return Err(DiscoveryError::NotInitialized);
        }
        if !self.is_registered() {
            return Err(DiscoveryError::NotRegistered);
        }
        Ok(())
    }

    /// Check a discovery call that only needs an initialized provider
    pub fn check_discover(self) -> Result<(), DiscoveryError> {
        if !self.is_initialized() {
            return Err(DiscoveryError::NotInitialized);
        }
        Ok(())
    }

    /// Check a discovery call on a backend that needs a registration first
    pub fn check_discover_registered(self) -> Result<(), DiscoveryError> {
        self.check_discover()?;
        if !self.is_registered() {
            return Err(DiscoveryError::NotRegistered);
        }
        Ok(())
    }

    /// Check a discovery call that is refused once the node has withdrawn
    ///
    /// A node may discover before it registers, but not after it deregistered.
    pub fn check_discover_not_withdrawn(self) -> Result<(), DiscoveryError> {
        self.check_discover()?;
        if self == ProviderState::Deregistered {
            return Err(DiscoveryError::NotRegistered);
        }
        Ok(())
    }
}
