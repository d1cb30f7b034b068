//! Common test utilities for discovery integration tests

#![allow(dead_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use peerlink_discovery::{NatsConfig, NatsDiscovery, Provider};

/// Default NATS server used when `NATS_URL` is not set
pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";

pub fn nats_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| DEFAULT_NATS_URL.to_string())
}

/// Generate a subject unique to one test run so parallel tests never see each other
pub fn unique_subject(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

/// Create and initialize a NATS provider for a local node
pub async fn new_peer(subject: &str, port: u16) -> NatsDiscovery {
    let config = NatsConfig::new(nats_url(), subject, "127.0.0.1", port)
        .with_timeout(Duration::from_millis(500));
    let provider = NatsDiscovery::new(config);
    provider.initialize().await.unwrap();
    provider
}

pub fn init_tracing() {
    peerlink_common::logging::init_test_tracing();
}
