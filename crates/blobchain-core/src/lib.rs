//! Hash-linked proof-of-work chain over opaque blobs.
//!
//! Blocks commit to their body through a Merkle root in the header, so a
//! chain can be exchanged and verified header-first and completed later by
//! attaching bodies with [`chain::Chain::replace`].

pub mod blob;
pub mod block;
pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;

use constants::HASH_SIZE;
use sha2::{Digest, Sha256};

pub use blob::BlobMessage;
pub use block::{check_genesis, Block, BlockBody, BlockHeader};
pub use chain::{BlobLocation, Chain};
pub use error::{ChainError, DecodeError};
pub use mine::{BlockBuilder, CancelToken, MiningTask};

pub type Hash = [u8; HASH_SIZE];

pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

pub fn leaf_hash(blob: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_TAG]);
    hasher.update(blob);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_TAG]);
    hasher.update(left);
    hasher.update(right);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Binary Merkle root over the blobs. Leaves and inner nodes are hashed
/// under distinct tags, and the last node of an odd level moves up
/// unchanged, so no two blob lists share a root. An empty list yields the
/// zero hash.
pub fn merkle_root<B: AsRef<[u8]>>(blobs: &[B]) -> Hash {
    if blobs.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = blobs.iter().map(|b| leaf_hash(b.as_ref())).collect();

    while level.len() > 1 {
        let next = level
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => node_hash(a, b),
                [odd] => *odd,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
        level = next;
    }
    level[0]
}

pub mod pow {
    use super::Hash;

    pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 8;
            } else {
                total += b.leading_zeros();
                break;
            }
        }
        total
    }

    pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
        count_leading_zero_bits(hash) >= difficulty
    }

    /// Expected number of hashes needed to reach `difficulty`.
    pub fn cost_of(difficulty: u32) -> u128 {
        1u128.checked_shl(difficulty).unwrap_or(u128::MAX)
    }
}

/// Shared bincode configuration for every record that goes on the wire.
pub(crate) mod wire {
    use crate::{constants::MAX_WIRE_BYTES, error::DecodeError};
    use bincode::Options;
    use serde::de::DeserializeOwned;

    pub(crate) fn encoder() -> impl Options {
        bincode::DefaultOptions::new()
    }

    fn decoder() -> impl Options {
        bincode::DefaultOptions::new()
            .with_limit(MAX_WIRE_BYTES)
            .reject_trailing_bytes()
    }

    /// Decodes one record, refusing input longer than `MAX_WIRE_BYTES` up front.
    pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
        if bytes.len() as u64 > MAX_WIRE_BYTES {
            return Err(DecodeError::TooLarge {
                len: bytes.len(),
                max: MAX_WIRE_BYTES,
            });
        }
        Ok(decoder().deserialize(bytes)?)
    }
}
