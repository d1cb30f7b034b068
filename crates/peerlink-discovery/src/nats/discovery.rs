// NATS discovery provider implementation

use std::collections::HashSet;
use std::time::Duration;

use async_nats::{Client, ConnectOptions, Message, Subscriber};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peerlink_common::Retrier;

use super::config::NatsConfig;
use super::message::{DiscoveryMessage, MessageType};
use crate::error::DiscoveryError;
use crate::provider::{Provider, ProviderState};

const CONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

fn network_error(context: &str, e: impl std::fmt::Display) -> DiscoveryError {
    DiscoveryError::Network(format!("{}: {}", context, e))
}

/// A subscription served by a background task
///
/// The task owns the NATS subscriber; it unsubscribes when signalled and
/// hands the result back through its join handle.
struct Subscription {
    subject: String,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), async_nats::UnsubscribeError>>,
}

impl Subscription {
    fn is_valid(&self) -> bool {
        self.stop.is_some() && !self.task.is_finished()
    }

    /// Unsubscribe; a subscription that is no longer valid is skipped
    async fn unsubscribe(&mut self) -> Result<(), DiscoveryError> {
        if !self.is_valid() {
            self.stop = None;
            return Ok(());
        }
        let Some(stop) = self.stop.take() else {
            return Ok(());
        };
        if stop.send(()).is_err() {
            return Ok(());
        }

        match (&mut self.task).await {
            Ok(result) => result.map_err(|e| {
                network_error(&format!("failed to unsubscribe from {}", self.subject), e)
            }),
            Err(e) => Err(network_error("subscription task failed", e)),
        }
    }
}

#[derive(Default)]
struct Inner {
    state: ProviderState,
    client: Option<Client>,
    subscriptions: Vec<Subscription>,
}

/// Discovery over a shared NATS subject
pub struct NatsDiscovery {
    config: NatsConfig,
    address: String,
    inner: Mutex<Inner>,
}

impl NatsDiscovery {
    pub const ID: &'static str = "nats";

    pub fn new(config: NatsConfig) -> Self {
        let address = config.address();
        Self {
            config,
            address,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// `host:port` this node answers discovery requests with
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    pub async fn state(&self) -> ProviderState {
        self.inner.lock().await.state
    }

    fn message(&self, kind: MessageType) -> DiscoveryMessage {
        DiscoveryMessage::new(&self.config.host, self.config.discovery_port, kind)
    }

    /// Connect with exponential backoff; once connected the client
    /// reconnects indefinitely
    async fn connect(&self) -> Result<Client, DiscoveryError> {
        let reconnect_wait = self.config.reconnect_wait();
        let retrier = Retrier::exponential(
            self.config.max_join_attempts(),
            CONNECT_INITIAL_BACKOFF,
            reconnect_wait,
        );

        retrier
            .run(|| {
                ConnectOptions::new()
                    .name(self.address.as_str())
                    .max_reconnects(None::<usize>)
                    .reconnect_delay_callback(move |_| reconnect_wait)
                    .connect(self.config.server.as_str())
            })
            .await
            .map_err(|e| {
                network_error(
                    &format!("failed to connect to nats server {}", self.config.server),
                    e,
                )
            })
    }
}

/// Answer discovery requests until stopped or the subscription ends
async fn serve_discovery_requests(
    client: Client,
    mut subscriber: Subscriber,
    mut stop: oneshot::Receiver<()>,
    response: Bytes,
) -> Result<(), async_nats::UnsubscribeError> {
    loop {
        tokio::select! {
            _ = &mut stop => return subscriber.unsubscribe().await,
            next = subscriber.next() => match next {
                Some(msg) => handle_discovery_message(&client, msg, &response).await,
                None => return Ok(()),
            },
        }
    }
}

async fn handle_discovery_message(client: &Client, msg: Message, response: &Bytes) {
    let message = match DiscoveryMessage::decode(&msg.payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(subject = %msg.subject, "Failed to decode discovery message: {}", e);
            return;
        }
    };

    match message.kind {
        MessageType::Request => {
            let Some(reply) = msg.reply else {
                debug!(peer = %message.name, "Discovery request without reply subject");
                return;
            };
            if let Err(e) = client.publish(reply, response.clone()).await {
                warn!(peer = %message.name, "Failed to answer discovery request: {}", e);
            }
        }
        MessageType::Register | MessageType::Deregister => {
            debug!(peer = %message.name, kind = ?message.kind, "Discovery announcement received");
        }
        MessageType::Response => {}
    }
}

/// Collect responses until the timeout elapses or the payload stream ends
///
/// Only `Response` messages count. The requester's own address and
/// duplicates are dropped, and undecodable payloads are skipped.
async fn collect_responses<S>(mut payloads: S, me: &str, timeout: Duration) -> Vec<String>
where
    S: Stream<Item = Bytes> + Unpin,
{
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut seen = HashSet::new();
    let mut peers = Vec::new();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            next = payloads.next() => {
                let Some(payload) = next else {
                    break;
                };
                match DiscoveryMessage::decode(&payload) {
                    Ok(message) if message.kind == MessageType::Response => {
                        let address = message.address();
                        if address != me && seen.insert(address.clone()) {
                            peers.push(address);
                        }
                    }
                    Ok(message) => {
                        debug!(peer = %message.name, kind = ?message.kind, "Ignoring non-response on inbox");
                    }
                    Err(e) => warn!("Failed to decode discovery response: {}", e),
                }
            }
        }
    }
    peers
}

#[async_trait]
impl Provider for NatsDiscovery {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn initialize(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.state.check_initialize()?;
        self.config.validate()?;

        let client = self.connect().await?;
        inner.client = Some(client);
        inner.state = ProviderState::Initialized;
        info!(
            server = %self.config.server,
            subject = %self.config.subject,
            node = %self.address,
            "NATS discovery initialized"
        );
        Ok(())
    }

    async fn register(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.state.check_register()?;
        let client = inner.client.clone().ok_or(DiscoveryError::NotInitialized)?;

        let response = Bytes::from(self.message(MessageType::Response).encode()?);
        let subscriber = client
            .subscribe(self.config.subject.clone())
            .await
            .map_err(|e| network_error("failed to subscribe to discovery subject", e))?;
        // Requests published right after registering must reach the subscription
        client
            .flush()
            .await
            .map_err(|e| network_error("failed to flush nats connection", e))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(serve_discovery_requests(
            client,
            subscriber,
            stop_rx,
            response,
        ));
        inner.subscriptions.push(Subscription {
            subject: self.config.subject.clone(),
            stop: Some(stop_tx),
            task,
        });
        inner.state = ProviderState::Registered;
        info!(subject = %self.config.subject, node = %self.address, "NATS discovery registered");
        Ok(())
    }

    async fn deregister(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.state.check_deregister()?;

        for subscription in inner.subscriptions.iter_mut() {
            subscription.unsubscribe().await?;
        }
        inner.subscriptions.clear();
        inner.state = ProviderState::Deregistered;

        // The announcement is informational; peers stop seeing this node as
        // soon as the subscription is gone.
        if let Some(client) = inner.client.as_ref() {
            let announcement = Bytes::from(self.message(MessageType::Deregister).encode()?);
            if let Err(e) = client
                .publish(self.config.subject.clone(), announcement)
                .await
            {
                warn!(node = %self.address, "Failed to publish deregistration: {}", e);
            }
            if let Err(e) = client.flush().await {
                warn!(node = %self.address, "Failed to flush deregistration: {}", e);
            }
        }

        info!(node = %self.address, "NATS discovery deregistered");
        Ok(())
    }

    async fn discover_peers(&self) -> Result<Vec<String>, DiscoveryError> {
        let inner = self.inner.lock().await;
        inner.state.check_discover_not_withdrawn()?;
        let client = inner.client.as_ref().ok_or(DiscoveryError::NotInitialized)?;

        let inbox = client.new_inbox();
        let mut responses = client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| network_error("failed to subscribe to discovery inbox", e))?;

        let request = Bytes::from(self.message(MessageType::Request).encode()?);
        client
            .publish_with_reply(self.config.subject.clone(), inbox, request)
            .await
            .map_err(|e| network_error("failed to publish discovery request", e))?;

        let peers = collect_responses(
            (&mut responses).map(|msg| msg.payload),
            &self.address,
            self.config.timeout(),
        )
        .await;
        if let Err(e) = responses.unsubscribe().await {
            debug!("Failed to unsubscribe from discovery inbox: {}", e);
        }

        debug!(node = %self.address, count = peers.len(), "Discovered NATS peers");
        Ok(peers)
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.state = ProviderState::Closed;

        let mut result = Ok(());
        for subscription in inner.subscriptions.iter_mut() {
            if let Err(e) = subscription.unsubscribe().await {
                warn!(node = %self.address, "Failed to unsubscribe while closing: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        inner.subscriptions.clear();

        if let Some(client) = inner.client.take() {
            if let Err(e) = client.flush().await {
                if result.is_ok() {
                    result = Err(network_error("failed to flush nats connection", e));
                }
            }
            drop(client);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> NatsDiscovery {
        NatsDiscovery::new(NatsConfig::new(
            "nats://127.0.0.1:4222",
            "some-subject",
            "127.0.0.1",
            9001,
        ))
    }

    #[test]
    fn test_id_and_address() {
        let provider = provider();
        assert_eq!(provider.id(), "nats");
        assert_eq!(provider.address(), "127.0.0.1:9001");
    }

    #[tokio::test]
    async fn test_initialize_invalid_config() {
        let provider = NatsDiscovery::new(NatsConfig::new("", "", "", 0));
        assert!(matches!(
            provider.initialize().await,
            Err(DiscoveryError::InvalidConfig(_))
        ));
        assert_eq!(provider.state().await, ProviderState::Uninitialized);
    }

    #[tokio::test]
    async fn test_initialize_already_initialized() {
        let provider = provider();
        provider.inner.lock().await.state = ProviderState::Initialized;
        assert!(matches!(
            provider.initialize().await,
            Err(DiscoveryError::AlreadyInitialized)
        ));
        assert_eq!(provider.state().await, ProviderState::Initialized);
    }

    #[tokio::test]
    async fn test_register_already_registered() {
        let provider = provider();
        provider.inner.lock().await.state = ProviderState::Registered;
        let err = provider.register().await.unwrap_err();
        assert_eq!(err.to_string(), DiscoveryError::AlreadyRegistered.to_string());
    }

    #[tokio::test]
    async fn test_deregister_not_registered() {
        let provider = provider();
        provider.inner.lock().await.state = ProviderState::Initialized;
        assert!(matches!(
            provider.deregister().await,
            Err(DiscoveryError::NotRegistered)
        ));
    }

    #[tokio::test]
    async fn test_discover_peers_not_initialized() {
        let provider = provider();
        assert!(matches!(
            provider.discover_peers().await,
            Err(DiscoveryError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_close_without_connection() {
        let provider = provider();
        provider.close().await.unwrap();
        provider.close().await.unwrap();
        assert_eq!(provider.state().await, ProviderState::Closed);
    }

    #[tokio::test]
    async fn test_initialize_unreachable_server() {
        let provider = NatsDiscovery::new(
            NatsConfig::new("nats://127.0.0.1:1", "some-subject", "127.0.0.1", 9001)
                .with_max_join_attempts(1),
        );
        assert!(matches!(
            provider.initialize().await,
            Err(DiscoveryError::Network(_))
        ));
        assert_eq!(provider.state().await, ProviderState::Uninitialized);
    }

    fn payload(port: u16, kind: MessageType) -> Bytes {
        Bytes::from(DiscoveryMessage::new("127.0.0.1", port, kind).encode().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_responses_filters_and_dedups() {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        for payload in [
            payload(9001, MessageType::Response),
            payload(9002, MessageType::Response),
            payload(9002, MessageType::Response),
            payload(9003, MessageType::Register),
            Bytes::from_static(b"not json"),
            payload(9004, MessageType::Response),
        ] {
            tx.unbounded_send(payload).unwrap();
        }
        drop(tx);

        let started = tokio::time::Instant::now();
        let peers = collect_responses(rx, "127.0.0.1:9001", Duration::from_secs(1)).await;

        assert_eq!(
            peers,
            vec!["127.0.0.1:9002".to_string(), "127.0.0.1:9004".to_string()]
        );
        // A closed stream ends the round before the timeout
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_responses_stops_at_timeout() {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        tx.unbounded_send(payload(9002, MessageType::Response)).unwrap();

        let started = tokio::time::Instant::now();
        let peers = collect_responses(rx, "127.0.0.1:9001", Duration::from_millis(500)).await;

        assert_eq!(peers, vec!["127.0.0.1:9002".to_string()]);
        assert!(started.elapsed() >= Duration::from_millis(500));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_responses_without_peers() {
        let (_tx, rx) = futures::channel::mpsc::unbounded::<Bytes>();
        let peers = collect_responses(rx, "127.0.0.1:9001", Duration::from_millis(200)).await;
        assert!(peers.is_empty());
    }
}
