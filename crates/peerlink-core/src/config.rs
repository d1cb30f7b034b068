// Engine configuration
//
// `EngineConfig` carries the engine tunables with builder-style setters.
// `Configuration` reads them, and the discovery provider settings, from a
// layered `config::Config` under the `peerlink.` prefix.

use std::time::Duration;

use serde_json::{Map, Value};

use peerlink_common::local_ip;
use peerlink_discovery::{NatsDiscovery, ProviderConfig, StaticDiscovery};

use crate::error::EngineError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound for the whole shutdown sequence
    pub shutdown_timeout: Duration,
    /// Minimum number of discovered peers required to join an existing cluster
    pub min_peers_quorum: usize,
    /// Attempts for both peer discovery and joining
    pub max_join_attempts: u32,
    /// Upper bound for the discovery phase and for the join phase
    pub max_join_timeout: Duration,
    /// Delay between discovery or join attempts
    pub join_retry_interval: Duration,
    /// Capacity of the membership event channel
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(3),
            min_peers_quorum: 1,
            max_join_attempts: 10,
            max_join_timeout: Duration::from_secs(1),
            join_retry_interval: Duration::from_secs(1),
            event_buffer_size: 256,
        }
    }
}

impl EngineConfig {
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_min_peers_quorum(mut self, quorum: usize) -> Self {
        self.min_peers_quorum = quorum;
        self
    }

    pub fn with_max_join_attempts(mut self, attempts: u32) -> Self {
        self.max_join_attempts = attempts;
        self
    }

    pub fn with_max_join_timeout(mut self, timeout: Duration) -> Self {
        self.max_join_timeout = timeout;
        self
    }

    pub fn with_join_retry_interval(mut self, interval: Duration) -> Self {
        self.join_retry_interval = interval;
        self
    }

    /// Events are held here until the listener drains them; a full buffer
    /// makes the transport wait
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size.max(1);
        self
    }
}

/// Typed access to the `peerlink.*` configuration tree
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: config::Config,
}

impl Configuration {
    pub fn from_config(config: config::Config) -> Self {
        Self { config }
    }

    /// Read an unsigned setting; missing, negative or out of range values
    /// fall back to the default
    fn get_unsigned<T: TryFrom<i64>>(&self, key: &str, default: T) -> T {
        self.config
            .get_int(key)
            .ok()
            .and_then(|value| T::try_from(value).ok())
            .unwrap_or(default)
    }

    /// Get the shutdown timeout in milliseconds (default: 3000ms)
    pub fn shutdown_timeout_ms(&self) -> u64 {
        self.get_unsigned("peerlink.engine.shutdown-timeout-ms", 3000)
    }

    /// Get the minimum peers quorum (default: 1)
    pub fn min_peers_quorum(&self) -> usize {
        self.get_unsigned("peerlink.engine.min-quorum", 1)
    }

    /// Get the max join attempts (default: 10)
    pub fn max_join_attempts(&self) -> u32 {
        self.get_unsigned("peerlink.engine.max-join-attempts", 10)
    }

    /// Get the max join timeout in milliseconds (default: 1000ms)
    pub fn max_join_timeout_ms(&self) -> u64 {
        self.get_unsigned("peerlink.engine.max-join-timeout-ms", 1000)
    }

    /// Get the join retry interval in milliseconds (default: 1000ms)
    pub fn join_retry_interval_ms(&self) -> u64 {
        self.get_unsigned("peerlink.engine.join-retry-interval-ms", 1000)
    }

    /// Get the membership event buffer size (default: 256)
    pub fn event_buffer_size(&self) -> usize {
        self.get_unsigned("peerlink.engine.event-buffer-size", 256)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_shutdown_timeout(Duration::from_millis(self.shutdown_timeout_ms()))
            .with_min_peers_quorum(self.min_peers_quorum())
            .with_max_join_attempts(self.max_join_attempts())
            .with_max_join_timeout(Duration::from_millis(self.max_join_timeout_ms()))
            .with_join_retry_interval(Duration::from_millis(self.join_retry_interval_ms()))
            .with_event_buffer_size(self.event_buffer_size())
    }

    /// Get the discovery provider id (default: static)
    pub fn discovery_provider(&self) -> String {
        self.config
            .get_string("peerlink.discovery.provider")
            .unwrap_or_else(|_| StaticDiscovery::ID.to_string())
    }

    /// Build the provider configuration from `peerlink.discovery.<provider>`
    ///
    /// The NATS host defaults to the first non-loopback local address.
    pub fn provider_config(&self) -> Result<ProviderConfig, EngineError> {
        let provider = self.discovery_provider();
        let key = format!("peerlink.discovery.{}", provider);

        let mut section: Map<String, Value> = match self.config.get(&key) {
            Ok(section) => section,
            Err(config::ConfigError::NotFound(_)) => Map::new(),
            Err(e) => return Err(e.into()),
        };

        if provider == NatsDiscovery::ID {
            section
                .entry("host")
                .or_insert_with(|| Value::String(local_ip()));
        }
        section.insert("provider".to_string(), Value::String(provider));

        serde_json::from_value(Value::Object(section)).map_err(|e| {
            EngineError::Config(config::ConfigError::Message(format!(
                "invalid {}: {}",
                key, e
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};
    use peerlink_discovery::StaticConfig;

    fn configuration(yaml: &str) -> Configuration {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap();
        Configuration::from_config(config)
    }

    #[test]
    fn test_engine_defaults() {
        let config = configuration("peerlink: {}");
        assert_eq!(config.engine_config(), EngineConfig::default());
        assert_eq!(config.discovery_provider(), "static");
    }

    #[test]
    fn test_engine_overrides() {
        let config = configuration(
            r#"
peerlink:
  engine:
    shutdown-timeout-ms: 500
    min-quorum: 2
    max-join-attempts: 3
    max-join-timeout-ms: 2000
    join-retry-interval-ms: 50
    event-buffer-size: 16
"#,
        );
        let engine = config.engine_config();
        assert_eq!(engine.shutdown_timeout, Duration::from_millis(500));
        assert_eq!(engine.min_peers_quorum, 2);
        assert_eq!(engine.max_join_attempts, 3);
        assert_eq!(engine.max_join_timeout, Duration::from_secs(2));
        assert_eq!(engine.join_retry_interval, Duration::from_millis(50));
        assert_eq!(engine.event_buffer_size, 16);
    }

    #[test]
    fn test_negative_engine_values_use_defaults() {
        let config = configuration(
            r#"
peerlink:
  engine:
    shutdown-timeout-ms: -1
    min-quorum: -2
    max-join-attempts: 5000000000
    max-join-timeout-ms: -1000
    join-retry-interval-ms: 75
    event-buffer-size: -16
"#,
        );
        let engine = config.engine_config();
        let defaults = EngineConfig::default();
        assert_eq!(engine.shutdown_timeout, defaults.shutdown_timeout);
        assert_eq!(engine.min_peers_quorum, defaults.min_peers_quorum);
        assert_eq!(engine.max_join_attempts, defaults.max_join_attempts);
        assert_eq!(engine.max_join_timeout, defaults.max_join_timeout);
        assert_eq!(engine.join_retry_interval, Duration::from_millis(75));
        assert_eq!(engine.event_buffer_size, defaults.event_buffer_size);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_min_peers_quorum(3)
            .with_event_buffer_size(0);
        assert_eq!(config.min_peers_quorum, 3);
        assert_eq!(config.event_buffer_size, 1);
    }

    #[test]
    fn test_static_provider_config() {
        let config = configuration(
            r#"
peerlink:
  discovery:
    provider: static
    static:
      hosts:
        - "10.0.0.1:9000"
        - "10.0.0.2:9000"
"#,
        );
        assert_eq!(
            config.provider_config().unwrap(),
            ProviderConfig::Static(StaticConfig::new(vec![
                "10.0.0.1:9000".to_string(),
                "10.0.0.2:9000".to_string(),
            ]))
        );
    }

    #[test]
    fn test_nats_provider_config_defaults_host() {
        let config = configuration(
            r#"
peerlink:
  discovery:
    provider: nats
    nats:
      server: "nats://127.0.0.1:4222"
      subject: cluster
      discovery-port: 7946
"#,
        );
        match config.provider_config().unwrap() {
            ProviderConfig::Nats(nats) => {
                assert_eq!(nats.host, local_ip());
                assert_eq!(nats.subject, "cluster");
                assert_eq!(nats.discovery_port, 7946);
            }
            other => panic!("unexpected provider config: {:?}", other),
        }
    }

    #[test]
    fn test_missing_provider_section() {
        let config = configuration(
            r#"
peerlink:
  discovery:
    provider: kubernetes
"#,
        );
        assert!(matches!(
            config.provider_config(),
            Err(EngineError::Config(_))
        ));
    }
}
