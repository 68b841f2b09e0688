use serde::Serialize;

use ankra_core::{ContentHash, IngestStatus};

/// Per-anchor outcome record. The processor never throws across its
/// boundary; every path ends in one of these.
#[derive(Clone, Debug, Serialize)]
pub struct IngestResult {
    pub status: IngestStatus,
    #[serde(rename = "contentHash", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(rename = "eventType", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<u32>,
    #[serde(rename = "retrievalSource", skip_serializing_if = "Option::is_none")]
    pub retrieval_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestResult {
    pub fn processed(hash: &ContentHash, event_type: u32, retrieval_source: &str) -> Self {
        Self {
            status: IngestStatus::Processed,
            content_hash: Some(hash.to_string()),
            event_type: Some(event_type),
            retrieval_source: Some(retrieval_source.to_string()),
            error: None,
        }
    }

    pub fn duplicate(hash: &ContentHash) -> Self {
        Self {
            status: IngestStatus::Duplicate,
            content_hash: Some(hash.to_string()),
            event_type: None,
            retrieval_source: None,
            error: None,
        }
    }

    pub fn failed(status: IngestStatus, hash: Option<&ContentHash>, error: impl Into<String>) -> Self {
        Self {
            status,
            content_hash: hash.map(|h| h.to_string()),
            event_type: None,
            retrieval_source: None,
            error: Some(error.into()),
        }
    }
}
