use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The two ways anchors reach this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Long-lived WebSocket subscription to a block-trace endpoint.
    Streaming,
    /// An external chain reader POSTs normalized records to the webhook.
    Push,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Streaming => write!(f, "streaming"),
            SourceKind::Push => write!(f, "push"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("tls: {0}")]
    Tls(String),

    #[error("malformed frame: {0}")]
    Frame(String),

    /// Binary block-trace frames need ABI-aware deserialization. Dropping
    /// them silently would look like a healthy source ingesting nothing, so
    /// this is a fatal startup condition instead.
    #[error(
        "block-trace endpoint sent a binary frame; this build speaks JSON frames only \
         and will not silently discard them"
    )]
    BinaryFramesUnsupported,

    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl SourceError {
    /// Fatal errors abort the process instead of triggering reconnects.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SourceError::BinaryFramesUnsupported | SourceError::ReconnectExhausted { .. }
        )
    }
}

/// Counters exposed by the streaming source.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SourceStatsSnapshot {
    pub blocks: u64,
    pub anchors: u64,
    pub reconnects: u64,
}
