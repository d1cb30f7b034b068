//! Common test utilities for engine integration tests
//!
//! Provides an in-process membership transport, a scripted discovery
//! provider and a recording peer sink.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use peerlink_common::BoxError;
use peerlink_core::{
    EngineConfig, Member, Membership, MembershipConfig, MembershipFactory, NodeEvent, Peer,
    PeerInfo, PeerSink,
};
use peerlink_discovery::{DiscoveryError, Provider, ProviderState};

pub const HOST_ADDRESS: &str = "127.0.0.1:8080";
pub const HOST_DISCOVERY_PORT: u16 = 7946;

pub fn init_tracing() {
    peerlink_common::logging::init_test_tracing();
}

pub fn host() -> Peer {
    Peer::host(HOST_ADDRESS, HOST_DISCOVERY_PORT)
}

/// Engine settings with short delays so retries finish quickly
pub fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_max_join_attempts(5)
        .with_join_retry_interval(Duration::from_millis(10))
        .with_max_join_timeout(Duration::from_secs(2))
        .with_shutdown_timeout(Duration::from_secs(2))
}

/// Member as the transport would report it for `peer`
pub fn member(peer: &Peer) -> Member {
    Member::new(
        format!("{}-gossip", peer.address),
        peer.encode().expect("encode peer"),
    )
}

/// Remote peer advertising itself the way every node does
pub fn remote(address: &str) -> Peer {
    Peer::host(address, HOST_DISCOVERY_PORT)
}

/// Discovery provider returning scripted results
pub struct FakeProvider {
    state: AsyncMutex<ProviderState>,
    results: Mutex<VecDeque<Result<Vec<String>, DiscoveryError>>>,
    fallback: Vec<String>,
    delay: Duration,
    pub discover_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(peers: Vec<String>) -> Arc<Self> {
        Self::with_delay(peers, Duration::ZERO)
    }

    /// Results returned by the next discovery calls, before the fallback peers
    pub fn with_results(
        peers: Vec<String>,
        results: Vec<Result<Vec<String>, DiscoveryError>>,
    ) -> Arc<Self> {
        let provider = Self::new(peers);
        provider.results.lock().unwrap().extend(results);
        provider
    }

    /// Every discovery call takes `delay` before answering
    pub fn with_delay(peers: Vec<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: AsyncMutex::new(ProviderState::default()),
            results: Mutex::new(VecDeque::new()),
            fallback: peers,
            delay,
            discover_calls: AtomicUsize::new(0),
        })
    }

    pub async fn state(&self) -> ProviderState {
        *self.state.lock().await
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn id(&self) -> &str {
        "fake"
    }

    async fn initialize(&self) -> Result<(), DiscoveryError> {
        let mut state = self.state.lock().await;
        state.check_initialize()?;
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
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        *self.state.lock().await = ProviderState::Closed;
        Ok(())
    }
}

/// State shared between a fake transport instance and the test
#[derive(Default)]
pub struct FakeCluster {
    members: Mutex<Vec<Member>>,
    events: Mutex<Option<mpsc::Sender<NodeEvent>>>,
    config: Mutex<Option<(String, String, u16, u16)>>,
    local_meta: Mutex<Vec<u8>>,
    join_failures: AtomicUsize,
    leave_failures: AtomicUsize,
    pub join_calls: AtomicUsize,
    pub joined: Mutex<Vec<String>>,
    pub created: AtomicUsize,
    pub left: AtomicBool,
    pub shut_down: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `count` join calls fail
    pub fn fail_joins(&self, count: usize) {
        self.join_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` leave calls fail
    pub fn fail_leaves(&self, count: usize) {
        self.leave_failures.store(count, Ordering::SeqCst);
    }

    /// `(name, bind_addr, bind_port, advertise_port)` the transport was created with
    pub fn created_with(&self) -> Option<(String, String, u16, u16)> {
        self.config.lock().unwrap().clone()
    }

    /// Metadata the engine's delegate advertised for the local node
    pub fn local_meta(&self) -> Vec<u8> {
        self.local_meta.lock().unwrap().clone()
    }

    pub fn add_member(&self, member: Member) {
        self.members.lock().unwrap().push(member);
    }

    /// Add a member and emit its join event
    pub async fn emit_join(&self, member: Member) {
        self.add_member(member.clone());
        self.send(NodeEvent::join(member)).await;
    }

    /// Remove a member and emit its leave event
    pub async fn emit_leave(&self, member: Member) {
        self.members.lock().unwrap().retain(|m| m.name != member.name);
        self.send(NodeEvent::leave(member)).await;
    }

    pub async fn send(&self, event: NodeEvent) {
        let sender = self.events.lock().unwrap().clone();
        if let Some(sender) = sender {
            sender.send(event).await.expect("events listener running");
        }
    }
}

pub struct FakeMembership {
    cluster: Arc<FakeCluster>,
}

#[async_trait]
impl Membership for FakeMembership {
    async fn join(&self, addresses: &[String]) -> Result<usize, BoxError> {
        self.cluster.join_calls.fetch_add(1, Ordering::SeqCst);
        let failures = self.cluster.join_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.cluster.join_failures.store(failures - 1, Ordering::SeqCst);
            return Err("connection refused".into());
        }
        *self.cluster.joined.lock().unwrap() = addresses.to_vec();
        Ok(addresses.len())
    }

    async fn members(&self) -> Vec<Member> {
        self.cluster.members.lock().unwrap().clone()
    }

    async fn leave(&self, _timeout: Duration) -> Result<(), BoxError> {
        let failures = self.cluster.leave_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.cluster.leave_failures.store(failures - 1, Ordering::SeqCst);
            return Err("leave broadcast failed".into());
        }
        self.cluster.left.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.cluster.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeFactory {
    pub cluster: Arc<FakeCluster>,
}

impl FakeFactory {
    pub fn new(cluster: Arc<FakeCluster>) -> Arc<Self> {
        Arc::new(Self { cluster })
    }
}

#[async_trait]
impl MembershipFactory for FakeFactory {
    async fn create(&self, config: MembershipConfig) -> Result<Arc<dyn Membership>, BoxError> {
        let meta = config.delegate.node_meta(512);
        self.cluster.created.fetch_add(1, Ordering::SeqCst);
        *self.cluster.config.lock().unwrap() = Some((
            config.name.clone(),
            config.bind_addr.clone(),
            config.bind_port,
            config.advertise_port,
        ));
        *self.cluster.local_meta.lock().unwrap() = meta.clone();
        *self.cluster.events.lock().unwrap() = Some(config.events);
        // The transport lists the local node among its members
        self.cluster.add_member(Member::new(config.name, meta));
        Ok(Arc::new(FakeMembership {
            cluster: self.cluster.clone(),
        }))
    }
}

/// Sink forwarding every pushed peer set to the test
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<Vec<PeerInfo>>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<PeerInfo>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl PeerSink for RecordingSink {
    async fn set_peers(&self, peers: Vec<PeerInfo>) -> Result<(), BoxError> {
        self.tx.send(peers)?;
        Ok(())
    }
}

/// Wait for the next pushed peer set, sorted by address
pub async fn next_push(rx: &mut mpsc::UnboundedReceiver<Vec<PeerInfo>>) -> Vec<PeerInfo> {
    let mut peers = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("peer set pushed in time")
        .expect("sink open");
    peers.sort();
    peers
}

pub fn info(address: &str, is_self: bool) -> PeerInfo {
    PeerInfo {
        address: address.to_string(),
        is_self,
    }
}
