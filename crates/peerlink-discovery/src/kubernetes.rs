// Kubernetes discovery provider
// Lists the running and ready pods matching a label selector

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Api, Client, Config,
    api::ListParams,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use peerlink_common::validation::{EmptyStringValidator, ValidationChain};
use peerlink_common::{ValidationError, join_host_port};

use crate::error::DiscoveryError;
use crate::provider::{Provider, ProviderState};

const POD_RUNNING: &str = "Running";
const CONDITION_READY: &str = "Ready";
const CONDITION_TRUE: &str = "True";

/// Kubernetes provider configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubernetesConfig {
    /// Namespace of the pods
    pub namespace: String,
    /// Name of the container port used for gossip
    pub discovery_port_name: String,
    /// Name of the container port used for cache traffic
    pub port_name: String,
    /// Labels every cluster pod carries
    #[serde(default)]
    pub pod_labels: BTreeMap<String, String>,
}

impl KubernetesConfig {
    /// Reports every violation at once
    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationChain::all_errors()
            .add_validator(EmptyStringValidator::new("Namespace", self.namespace.as_str()))
            .add_validator(EmptyStringValidator::new(
                "DiscoveryPortName",
                self.discovery_port_name.as_str(),
            ))
            .add_validator(EmptyStringValidator::new("PortName", self.port_name.as_str()))
            .add_assertion(!self.pod_labels.is_empty(), "PodLabels are required")
            .validate()
    }

    /// Label selector in the `key=value,...` form
    pub fn label_selector(&self) -> String {
        self.pod_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Discovery addresses of the usable pods
///
/// A pod is usable when it is running and, if it reports a `Ready`
/// condition, that condition is true.
pub fn pod_addresses(pods: &[Pod], discovery_port_name: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();

    for pod in pods {
        let Some(status) = pod.status.as_ref() else {
            continue;
        };
        if status.phase.as_deref() != Some(POD_RUNNING) {
            continue;
        }
        let not_ready = status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == CONDITION_READY && c.status != CONDITION_TRUE);
        if not_ready {
            continue;
        }
        let (Some(pod_ip), Some(spec)) = (status.pod_ip.as_deref(), pod.spec.as_ref()) else {
            continue;
        };

        for port in spec
            .containers
            .iter()
            .flat_map(|c| c.ports.iter().flatten())
            .filter(|p| p.name.as_deref() == Some(discovery_port_name))
        {
            let Ok(container_port) = u16::try_from(port.container_port) else {
                continue;
            };
            let address = join_host_port(pod_ip, container_port);
            if seen.insert(address.clone()) {
                addresses.push(address);
            }
        }
    }

    addresses
}

#[derive(Default)]
struct Inner {
    state: ProviderState,
    client: Option<Client>,
}

pub struct KubernetesDiscovery {
    config: KubernetesConfig,
    inner: Mutex<Inner>,
}

impl KubernetesDiscovery {
    pub const ID: &'static str = "kubernetes";

    pub fn new(config: KubernetesConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    async fn create_client() -> Result<Client, DiscoveryError> {
        let config = Config::incluster().map_err(|e| {
            DiscoveryError::Directory(format!(
                "failed to get the in-cluster config of the kubernetes provider: {}",
                e
            ))
        })?;
        Client::try_from(config).map_err(|e| {
            DiscoveryError::Directory(format!("failed to create the kubernetes client api: {}", e))
        })
    }
}

#[async_trait]
impl Provider for KubernetesDiscovery {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn initialize(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.state.check_initialize()?;
        self.config.validate()?;
        inner.state = ProviderState::Initialized;
        Ok(())
    }

    async fn register(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.state.check_register()?;

        let client = Self::create_client().await?;
        inner.client = Some(client);
        inner.state = ProviderState::Registered;
        info!(namespace = %self.config.namespace, "Kubernetes discovery registered");
        Ok(())
    }

    async fn deregister(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.state.check_deregister()?;
        inner.client = None;
        inner.state = ProviderState::Deregistered;
        Ok(())
    }

    async fn discover_peers(&self) -> Result<Vec<String>, DiscoveryError> {
        let client = {
            let inner = self.inner.lock().await;
            inner.state.check_discover_registered()?;
            inner.client.clone().ok_or(DiscoveryError::NotRegistered)?
        };

        let pods: Api<Pod> = Api::namespaced(client, &self.config.namespace);
        let params = ListParams::default().labels(&self.config.label_selector());
        let list = pods
            .list(&params)
            .await
            .map_err(|e| DiscoveryError::Directory(e.to_string()))?;

        let peers = pod_addresses(&list.items, &self.config.discovery_port_name);
        debug!(
            namespace = %self.config.namespace,
            pods = list.items.len(),
            count = peers.len(),
            "Listed kubernetes peers"
        );
        Ok(peers)
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.client = None;
        inner.state = ProviderState::Closed;
        Ok(())
    }
}
