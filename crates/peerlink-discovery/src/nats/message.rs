// Discovery messages exchanged on the shared NATS subject

use serde::{Deserialize, Serialize};

use peerlink_common::join_host_port;

/// Kind of discovery message, encoded as an integer on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    Register = 0,
    Deregister = 1,
    Request = 2,
    Response = 3,
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Register),
            1 => Ok(MessageType::Deregister),
            2 => Ok(MessageType::Request),
            3 => Ok(MessageType::Response),
            other => Err(format!("invalid discovery message type: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    pub host: String,
    pub port: u16,
    /// `host:port` of the sender
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

impl DiscoveryMessage {
    pub fn new(host: impl Into<String>, port: u16, kind: MessageType) -> Self {
        let host = host.into();
        let name = join_host_port(&host, port);
        Self {
            host,
            port,
            name,
            kind,
        }
    }

    /// `host:port` of the sender
    pub fn address(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
