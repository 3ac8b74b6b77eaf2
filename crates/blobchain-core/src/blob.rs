//! Wrapper carried by every body entry, and the content hash derived from it.

use crate::{error::DecodeError, sha256, wire, Hash};
use bincode::Options;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMessage {
    pub blob: Vec<u8>,
}

impl BlobMessage {
    pub fn new(blob: impl Into<Vec<u8>>) -> Self {
        Self { blob: blob.into() }
    }

    pub fn encode(&self) -> Vec<u8> {
        wire::encoder()
            .serialize(self)
            .expect("blob message is always serializable")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        wire::decode(bytes)
    }

    pub fn content_hash(&self) -> Hash {
        sha256(&self.blob)
    }
}

/// Key under which a body entry is indexed. Entries that are not a wrapped
/// [`BlobMessage`] are keyed by the hash of their raw bytes.
pub fn content_hash(raw: &[u8]) -> Hash {
    match BlobMessage::decode(raw) {
        Ok(msg) => msg.content_hash(),
        Err(e) => {
            debug!(error = %e, len = raw.len(), "body entry is not a blob message");
            sha256(raw)
        }
    }
}
