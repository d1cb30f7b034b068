// Discovery engine
//
// Bootstraps the gossip membership transport from the addresses a discovery
// provider returns, then turns membership events into peer-set updates.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use peerlink_common::{Retrier, join_host_port};
use peerlink_discovery::{DiscoveryError, Provider};

use crate::config::EngineConfig;
use crate::delegate::EngineDelegate;
use crate::error::EngineError;
use crate::log_writer::LogWriter;
use crate::membership::{Membership, MembershipConfig, MembershipFactory, NodeEvent, NodeEventKind};
use crate::peer::{Peer, PeerSink};

/// Next step of the shutdown sequence
///
/// Kept across failed `stop` calls so a retry resumes where the last one
/// failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ShutdownStep {
    #[default]
    Leave,
    Deregister,
    Close,
    Shutdown,
}

/// Lifecycle fields, guarded separately from peer-set updates
#[derive(Default)]
struct Lifecycle {
    started: bool,
    membership: Option<Arc<dyn Membership>>,
    stop_listener: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<()>>,
    shutdown_step: ShutdownStep,
}

/// Clears the starting flag when `start` returns or is cancelled
struct StartingGuard<'a>(&'a AtomicBool);

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Discovery engine of one node
pub struct Engine {
    host: Peer,
    config: EngineConfig,
    provider: Arc<dyn Provider>,
    factory: Arc<dyn MembershipFactory>,
    sink: Arc<dyn PeerSink>,
    lifecycle: Mutex<Lifecycle>,
    /// Set while `start` discovers and joins without holding the lifecycle lock
    starting: AtomicBool,
    /// Held while a peer set is computed and pushed
    events_lock: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(
        host: Peer,
        provider: Arc<dyn Provider>,
        factory: Arc<dyn MembershipFactory>,
        sink: Arc<dyn PeerSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            host,
            config,
            provider,
            factory,
            sink,
            lifecycle: Mutex::new(Lifecycle::default()),
            starting: AtomicBool::new(false),
            events_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn host(&self) -> &Peer {
        &self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn is_started(&self) -> bool {
        self.lifecycle.lock().await.started
    }

    /// Start the engine: register with the provider, join the cluster and
    /// begin listening to membership events
    ///
    /// The first failing step aborts the start and its error is returned.
    /// Discovery and joining run without the lifecycle lock; a concurrent
    /// `start` fails with `AlreadyStarted` and `stop` is a no-op until the
    /// start completes.
    pub async fn start(&self) -> Result<(), EngineError> {
        {
            let lifecycle = self.lifecycle.lock().await;
            if lifecycle.started || self.starting.swap(true, Ordering::SeqCst) {
                return Err(EngineError::AlreadyStarted);
            }
        }
        let _starting = StartingGuard(&self.starting);

        let bind_addr = resolve_host(&self.host.address).await?;
        let discovery_port = self.host.discovery_port;
        let delegate = EngineDelegate::new(&self.host)?;
        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer_size.max(1));

        let membership_config = MembershipConfig {
            name: join_host_port(&bind_addr, discovery_port),
            bind_addr,
            bind_port: discovery_port,
            advertise_port: discovery_port,
            log_output: LogWriter::new(),
            delegate: Arc::new(delegate),
            events: events_tx,
        };

        self.provider.initialize().await?;
        self.provider.register().await?;
        let membership = self.join_cluster(membership_config).await?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let listener = EventsListener {
            host: self.host.clone(),
            membership: membership.clone(),
            sink: self.sink.clone(),
            events_lock: self.events_lock.clone(),
        };

        let mut lifecycle = self.lifecycle.lock().await;
        *lifecycle = Lifecycle {
            started: true,
            membership: Some(membership),
            stop_listener: Some(stop_tx),
            listener: Some(tokio::spawn(listener.run(events_rx, stop_rx))),
            shutdown_step: ShutdownStep::default(),
        };

        info!(
            address = %self.host.address,
            provider = self.provider.id(),
            "Discovery engine started"
        );
        Ok(())
    }

    /// Stop the engine gracefully
    ///
    /// A no-op when the engine is not started. On error the engine stays
    /// started and a later `stop` resumes at the step that failed.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.started {
            return Ok(());
        }

        if let Some(stop) = lifecycle.stop_listener.take() {
            let _ = stop.send(());
        }

        timeout(self.config.shutdown_timeout, self.shutdown(&mut lifecycle))
            .await
            .map_err(|_| EngineError::ShutdownTimeout)??;

        *lifecycle = Lifecycle::default();
        info!(address = %self.host.address, "Discovery engine stopped");
        Ok(())
    }

    /// Current peers, the local node excluded
    pub async fn peers(&self) -> Result<Vec<Peer>, EngineError> {
        let membership = {
            let lifecycle = self.lifecycle.lock().await;
            if !lifecycle.started {
                return Err(EngineError::NotStarted);
            }
            lifecycle.membership.clone().ok_or(EngineError::NotStarted)?
        };

        let _guard = self.events_lock.lock().await;
        remote_peers(membership.as_ref(), &self.host.address).await
    }

    /// Run the remaining shutdown steps, recording progress after each one
    async fn shutdown(&self, lifecycle: &mut Lifecycle) -> Result<(), EngineError> {
        if let Some(listener) = lifecycle.listener.take() {
            let _ = listener.await;
        }
        let membership = lifecycle.membership.clone();

        if lifecycle.shutdown_step == ShutdownStep::Leave {
            if let Some(membership) = &membership {
                membership
                    .leave(self.config.shutdown_timeout)
                    .await
                    .map_err(EngineError::Membership)?;
            }
            lifecycle.shutdown_step = ShutdownStep::Deregister;
        }
        if lifecycle.shutdown_step == ShutdownStep::Deregister {
            self.provider.deregister().await?;
            lifecycle.shutdown_step = ShutdownStep::Close;
        }
        if lifecycle.shutdown_step == ShutdownStep::Close {
            self.provider.close().await?;
            lifecycle.shutdown_step = ShutdownStep::Shutdown;
        }
        if let Some(membership) = &membership {
            membership.shutdown().await.map_err(EngineError::Membership)?;
        }
        Ok(())
    }

    /// Create the membership transport and join the discovered peers
    async fn join_cluster(
        &self,
        config: MembershipConfig,
    ) -> Result<Arc<dyn Membership>, EngineError> {
        let membership = self
            .factory
            .create(config)
            .await
            .map_err(EngineError::Membership)?;

        match self.bootstrap(membership.as_ref()).await {
            Ok(()) => Ok(membership),
            Err(e) => {
                if let Err(shutdown_err) = membership.shutdown().await {
                    warn!(error = %shutdown_err, "Failed to shut down membership after join failure");
                }
                Err(e)
            }
        }
    }

    async fn bootstrap(&self, membership: &dyn Membership) -> Result<(), EngineError> {
        let retrier = Retrier::fixed(self.config.max_join_attempts, self.config.join_retry_interval);

        let peers = timeout(
            self.config.max_join_timeout,
            retrier.run_if(
                || self.provider.discover_peers(),
                DiscoveryError::is_transient,
            ),
        )
        .await
        .map_err(|_| EngineError::JoinTimeout)??;

        if peers.is_empty() {
            info!("No peers discovered, bootstrapping a new cluster");
            return Ok(());
        }

        if peers.len() < self.config.min_peers_quorum {
            return Err(EngineError::QuorumNotMet {
                discovered: peers.len(),
                minimum: self.config.min_peers_quorum,
            });
        }

        let joined = timeout(
            self.config.max_join_timeout,
            retrier.run(|| membership.join(&peers)),
        )
        .await
        .map_err(|_| EngineError::JoinTimeout)?
        .map_err(EngineError::Membership)?;

        info!(discovered = peers.len(), joined, "Joined cluster");
        Ok(())
    }
}

/// Resolve the host part of `host:port` to an IP address
async fn resolve_host(address: &str) -> Result<String, EngineError> {
    let invalid = |reason: String| EngineError::InvalidHostAddress {
        address: address.to_string(),
        reason,
    };

    let addr: SocketAddr = tokio::net::lookup_host(address)
        .await
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("no address resolved".to_string()))?;

    Ok(addr.ip().to_string())
}

/// Decode every member except the local node
async fn remote_peers(
    membership: &dyn Membership,
    host_address: &str,
) -> Result<Vec<Peer>, EngineError> {
    let mut peers = Vec::new();
    for member in membership.members().await {
        let peer = Peer::decode_relative(&member.meta, host_address)?;
        if !peer.is_self {
            peers.push(peer);
        }
    }
    Ok(peers)
}

/// Background task applying membership events to the peer set
struct EventsListener {
    host: Peer,
    membership: Arc<dyn Membership>,
    sink: Arc<dyn PeerSink>,
    events_lock: Arc<Mutex<()>>,
}

impl EventsListener {
    async fn run(self, mut events: mpsc::Receiver<NodeEvent>, mut stop: oneshot::Receiver<()>) {
        debug!("Membership events listener started");
        loop {
            tokio::select! {
                _ = &mut stop => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }
        debug!("Membership events listener stopped");
    }

    async fn handle(&self, event: NodeEvent) {
        let peer = match Peer::decode_relative(&event.node.meta, &self.host.address) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(node = %event.node.name, error = %e, "Failed to decode member metadata");
                return;
            }
        };
        if peer.is_self {
            return;
        }

        if event.kind == NodeEventKind::Update {
            // Metadata changes do not alter the peer set until a leave/join
            debug!(peer = %peer.address, "Ignoring membership update");
            return;
        }

        let _guard = self.events_lock.lock().await;

        let mut peers = BTreeSet::new();
        peers.insert(self.host.info());
        match remote_peers(self.membership.as_ref(), &self.host.address).await {
            Ok(current) => peers.extend(current.iter().map(Peer::info)),
            Err(e) => warn!(error = %e, "Failed to read current members"),
        }

        match event.kind {
            NodeEventKind::Join => {
                info!(peer = %peer.address, "Peer joined");
                peers.insert(peer.info());
            }
            NodeEventKind::Leave => {
                info!(peer = %peer.address, "Peer left");
                peers.remove(&peer.info());
            }
            NodeEventKind::Update => {}
        }

        if let Err(e) = self.sink.set_peers(peers.into_iter().collect()).await {
            warn!(error = %e, "Failed to update peers");
        }
    }
}
