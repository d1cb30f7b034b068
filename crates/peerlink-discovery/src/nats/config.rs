// NATS provider configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use peerlink_common::validation::{
    EmptyStringValidator, PatternValidator, TcpAddressValidator, ValidationChain, Validator,
};
use peerlink_common::{ValidationError, join_host_port};

const NATS_SCHEME: &str = "nats://";
// Published subjects carry no whitespace or wildcard tokens
const SUBJECT_PATTERN: &str = r"^[^\s*>]+$";

/// NATS provider configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NatsConfig {
    /// NATS server in the form `nats://host:port`
    pub server: String,
    /// Subject shared by every node of the cluster
    pub subject: String,
    /// Host of the local node
    pub host: String,
    /// Gossip port of the local node
    pub discovery_port: u16,
    /// How long a discovery round collects responses; 0 means the 1s default
    #[serde(default)]
    pub timeout_ms: u64,
    /// Attempts to connect to the NATS server; 0 means the default of 5
    #[serde(default)]
    pub max_join_attempts: u32,
    /// Backoff between reconnects to a known server; 0 means the 2s default
    #[serde(default)]
    pub reconnect_wait_ms: u64,
}

impl NatsConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
    pub const DEFAULT_MAX_JOIN_ATTEMPTS: u32 = 5;
    pub const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(2);

    pub fn new(
        server: impl Into<String>,
        subject: impl Into<String>,
        host: impl Into<String>,
        discovery_port: u16,
    ) -> Self {
        Self {
            server: server.into(),
            subject: subject.into(),
            host: host.into(),
            discovery_port,
            timeout_ms: 0,
            max_join_attempts: 0,
            reconnect_wait_ms: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_join_attempts(mut self, attempts: u32) -> Self {
        self.max_join_attempts = attempts;
        self
    }

    pub fn with_reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            0 => Self::DEFAULT_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    pub fn max_join_attempts(&self) -> u32 {
        match self.max_join_attempts {
            0 => Self::DEFAULT_MAX_JOIN_ATTEMPTS,
            n => n,
        }
    }

    pub fn reconnect_wait(&self) -> Duration {
        match self.reconnect_wait_ms {
            0 => Self::DEFAULT_RECONNECT_WAIT,
            ms => Duration::from_millis(ms),
        }
    }

    /// `host:port` of the local node
    pub fn address(&self) -> String {
        join_host_port(&self.host, self.discovery_port)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationChain::fail_fast()
            .add_validator(EmptyStringValidator::new("Server", self.server.as_str()))
            .add_validator(ServerAddrValidator::new(self.server.as_str()))
            .add_validator(EmptyStringValidator::new("Subject", self.subject.as_str()))
            .add_validator(
                PatternValidator::new(SUBJECT_PATTERN, self.subject.as_str())
                    .with_message("Subject must not contain whitespace or wildcards"),
            )
            .add_validator(EmptyStringValidator::new("Host", self.host.as_str()))
            .add_assertion(self.discovery_port > 0, "DiscoveryPort is invalid")
            .validate()
    }
}

/// Validates a `nats://host:port` server address
pub struct ServerAddrValidator {
    server: String,
}

impl ServerAddrValidator {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }
}

impl Validator for ServerAddrValidator {
    fn validate(&self) -> Result<(), ValidationError> {
        let host_and_port =
            self.server
                .strip_prefix(NATS_SCHEME)
                .ok_or_else(|| ValidationError::InvalidAddress {
                    address: self.server.clone(),
                    reason: "invalid nats server address".to_string(),
                })?;
        TcpAddressValidator::new(host_and_port).validate()
    }
}
