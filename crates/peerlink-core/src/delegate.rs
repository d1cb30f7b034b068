use tracing::warn;

use crate::membership::MembershipDelegate;
use crate::peer::Peer;

/// Delegate advertising the local [`Peer`] as gossip metadata
#[derive(Clone, Debug)]
pub struct EngineDelegate {
    meta: Vec<u8>,
}

impl EngineDelegate {
    pub fn new(host: &Peer) -> Result<Self, serde_json::Error> {
        Ok(Self {
            meta: host.encode()?,
        })
    }

    pub fn meta(&self) -> &[u8] {
        &self.meta
    }
}

impl MembershipDelegate for EngineDelegate {
    fn node_meta(&self, limit: usize) -> Vec<u8> {
        if self.meta.len() > limit {
            warn!(
                size = self.meta.len(),
                limit, "Node metadata exceeds the transport limit, advertising none"
            );
            return Vec::new();
        }
        self.meta.clone()
    }

    fn notify_msg(&self, _msg: &[u8]) {}

    fn get_broadcasts(&self, _overhead: usize, _limit: usize) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn local_state(&self, _join: bool) -> Vec<u8> {
        Vec::new()
    }

    fn merge_remote_state(&self, _buf: &[u8], _join: bool) {}
}
