// Provider selection from configuration

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dns::{DnsConfig, DnsDiscovery};
use crate::kubernetes::{KubernetesConfig, KubernetesDiscovery};
use crate::nats::{NatsConfig, NatsDiscovery};
use crate::provider::Provider;
use crate::static_hosts::{StaticConfig, StaticDiscovery};

/// Configuration of the discovery backend, tagged by provider id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum ProviderConfig {
    Static(StaticConfig),
    #[serde(rename = "dns-sd")]
    Dns(DnsConfig),
    Kubernetes(KubernetesConfig),
    Nats(NatsConfig),
}

impl ProviderConfig {
    /// Id of the provider this configuration builds
    pub fn id(&self) -> &'static str {
        match self {
            ProviderConfig::Static(_) => StaticDiscovery::ID,
            ProviderConfig::Dns(_) => DnsDiscovery::ID,
            ProviderConfig::Kubernetes(_) => KubernetesDiscovery::ID,
            ProviderConfig::Nats(_) => NatsDiscovery::ID,
        }
    }
}

/// Create the discovery provider described by the configuration
pub fn create_provider(config: &ProviderConfig) -> Arc<dyn Provider> {
    info!("Using {} discovery provider", config.id());
    match config {
        ProviderConfig::Static(c) => Arc::new(StaticDiscovery::new(c.clone())),
        ProviderConfig::Dns(c) => Arc::new(DnsDiscovery::new(c.clone())),
        ProviderConfig::Kubernetes(c) => Arc::new(KubernetesDiscovery::new(c.clone())),
        ProviderConfig::Nats(c) => Arc::new(NatsDiscovery::new(c.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_static() {
        let yaml = r#"
provider: static
hosts:
  - "10.0.0.1:9000"
  - "10.0.0.2:9000"
"#;
        let config: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config,
            ProviderConfig::Static(StaticConfig::new(vec![
                "10.0.0.1:9000".to_string(),
                "10.0.0.2:9000".to_string()
            ]))
        );
    }

    #[test]
    fn test_deserialize_nats() {
        let yaml = r#"
provider: nats
server: "nats://127.0.0.1:4222"
subject: cluster
host: 127.0.0.1
discovery-port: 9001
timeout-ms: 500
"#;
        let config: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        let ProviderConfig::Nats(nats) = &config else {
            panic!("expected nats config, got {:?}", config);
        };
        assert_eq!(nats.discovery_port, 9001);
        assert_eq!(nats.timeout(), std::time::Duration::from_millis(500));
        assert_eq!(nats.max_join_attempts(), 5);
        assert_eq!(config.id(), "nats");
    }

    #[test]
    fn test_deserialize_dns() {
        let config: ProviderConfig =
            serde_yaml::from_str("provider: dns-sd\ndomain-name: peers.local\n").unwrap();
        assert_eq!(config.id(), "dns-sd");
    }

    #[tokio::test]
    async fn test_create_provider() {
        let config = ProviderConfig::Static(StaticConfig::new(vec!["10.0.0.1:9000".to_string()]));
        let provider = create_provider(&config);
        assert_eq!(provider.id(), "static");
        provider.initialize().await.unwrap();
        assert_eq!(
            provider.discover_peers().await.unwrap(),
            vec!["10.0.0.1:9000".to_string()]
        );
    }
}
