use crate::{
    constants::{GENESIS_DIFFICULTY, GENESIS_NONCE, MAX_DIFFICULTY},
    error::{ChainError, DecodeError},
    merkle_root, pow, sha256, wire, Hash,
};
use bincode::Options;
use serde::{Deserialize, Serialize};
use tracing::error;

pub const HEADER_BYTES: usize = 32 + 32 + 4 + 8;

/// The unit of hash-chain identity. Bodies only take part through `body_hash`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    pub prev_hash: Hash,
    pub body_hash: Hash,
    pub difficulty: u32,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn new(prev_hash: Hash, body_hash: Hash, difficulty: u32, nonce: u64) -> Self {
        Self {
            prev_hash,
            body_hash,
            difficulty,
            nonce,
        }
    }

    pub fn hash_bytes(&self) -> [u8; HEADER_BYTES] {
        let mut bytes = [0u8; HEADER_BYTES];
        bytes[0..32].copy_from_slice(&self.prev_hash);
        bytes[32..64].copy_from_slice(&self.body_hash);
        bytes[64..68].copy_from_slice(&self.difficulty.to_le_bytes());
        bytes[68..76].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    pub fn hash(&self) -> Hash {
        sha256(&self.hash_bytes())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    pub blobs: Vec<Vec<u8>>,
}

impl BlockBody {
    pub fn new(blobs: Vec<Vec<u8>>) -> Self {
        Self { blobs }
    }

    /// Merkle root stored in the header as `body_hash`.
    pub fn commitment(&self) -> Hash {
        merkle_root(&self.blobs)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// A finalized header plus an optional body.
///
/// Two blocks compare equal when their headers do, whether or not either one
/// carries its body. An attached body always matches the header's `body_hash`.
#[derive(Clone, Debug)]
pub struct Block {
    header: BlockHeader,
    body: Option<BlockBody>,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
    }
}

impl Eq for Block {}

#[derive(Serialize)]
struct BlockRecordRef<'a> {
    header: &'a BlockHeader,
    body: Option<&'a Vec<Vec<u8>>>,
}

#[derive(Deserialize)]
struct BlockRecord {
    header: BlockHeader,
    body: Option<Vec<Vec<u8>>>,
}

impl Block {
    /// The fixed first block: zero parent, empty body, pre-mined nonce.
    pub fn genesis() -> Self {
        let body = BlockBody::default();
        let header = BlockHeader::new(
            [0u8; 32],
            body.commitment(),
            GENESIS_DIFFICULTY,
            GENESIS_NONCE,
        );
        Self {
            header,
            body: Some(body),
        }
    }

    /// Builds a full block, rejecting a body the header does not commit to.
    pub fn new(header: BlockHeader, body: BlockBody) -> Result<Self, ChainError> {
        let mut block = Self::header_only(header);
        block.set_body(body)?;
        Ok(block)
    }

    pub fn header_only(header: BlockHeader) -> Self {
        Self { header, body: None }
    }

    /// Copy of this block with the body stripped, as sent in a headers-only sync.
    pub fn without_body(&self) -> Self {
        Self::header_only(self.header)
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn prev_hash(&self) -> Hash {
        self.header.prev_hash
    }

    pub fn nonce(&self) -> u64 {
        self.header.nonce
    }

    pub fn difficulty(&self) -> u32 {
        self.header.difficulty
    }

    pub fn cost(&self) -> u128 {
        pow::cost_of(self.header.difficulty)
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// True when the header hash carries at least `difficulty` leading zero bits.
    pub fn is_valid(&self) -> bool {
        pow::meets_difficulty(&self.hash(), self.header.difficulty)
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<&BlockBody> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<BlockBody> {
        self.body
    }

    pub fn set_body(&mut self, body: BlockBody) -> Result<(), ChainError> {
        self.replace_body(body).map(|_| ())
    }

    /// Attaches `body` and hands back whatever body was attached before.
    /// The header is never touched; on a commitment mismatch nothing changes.
    pub fn replace_body(&mut self, body: BlockBody) -> Result<Option<BlockBody>, ChainError> {
        if body.commitment() != self.header.body_hash {
            return Err(ChainError::BodyCommitmentMismatch);
        }
        Ok(self.body.replace(body))
    }

    /// # Panics
    ///
    /// Panics if bincode fails to serialize plain byte vectors, which is a
    /// programming error.
    pub fn encode(&self, include_body: bool) -> Vec<u8> {
        let record = BlockRecordRef {
            header: &self.header,
            body: if include_body {
                self.body.as_ref().map(|b| &b.blobs)
            } else {
                None
            },
        };
        wire::encoder()
            .serialize(&record)
            .expect("block record is always serializable")
    }

    /// Parses a block record. A body on the wire is kept only when `has_body`
    /// is set, and must match the header's commitment.
    pub fn decode(bytes: &[u8], has_body: bool) -> Result<Self, DecodeError> {
        let record: BlockRecord = wire::decode(bytes)?;
        if record.header.difficulty > MAX_DIFFICULTY {
            return Err(DecodeError::DifficultyOutOfRange {
                difficulty: record.header.difficulty,
                max: MAX_DIFFICULTY,
            });
        }

        let mut block = Self::header_only(record.header);
        if let Some(blobs) = record.body.filter(|_| has_body) {
            block
                .set_body(BlockBody::new(blobs))
                .map_err(|_| DecodeError::BodyCommitmentMismatch)?;
        }
        Ok(block)
    }

    #[cfg(test)]
    pub(crate) fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }
}

/// Startup check that the agreed genesis parameters are self-consistent.
pub fn check_genesis() -> Result<(), ChainError> {
    let genesis = Block::genesis();
    if genesis.is_valid() {
        Ok(())
    } else {
        error!(
            difficulty = genesis.difficulty(),
            nonce = genesis.nonce(),
            "genesis block fails its own proof of work"
        );
        Err(ChainError::InvalidGenesis {
            difficulty: genesis.difficulty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockBuilder;

    fn sample_body() -> BlockBody {
        BlockBody::new(vec![b"alpha".to_vec(), b"beta".to_vec()])
    }

    #[test]
    fn genesis_is_valid_and_complete() {
        let genesis = Block::genesis();
        assert!(genesis.is_valid());
        assert!(genesis.has_body());
        assert_eq!(genesis.prev_hash(), [0u8; 32]);
        assert_eq!(genesis.cost(), pow::cost_of(GENESIS_DIFFICULTY));
        assert!(hex::encode(genesis.hash()).starts_with("000030cd"));
        assert!(check_genesis().is_ok());
    }

    #[test]
    fn header_hash_bytes_layout() {
        let header = BlockHeader::new([1u8; 32], [2u8; 32], 7, 42);
        let bytes = header.hash_bytes();
        assert_eq!(bytes.len(), 76);
        assert_eq!(&bytes[0..32], &[1u8; 32]);
        assert_eq!(&bytes[32..64], &[2u8; 32]);
        assert_eq!(&bytes[64..68], &7u32.to_le_bytes());
        assert_eq!(&bytes[68..76], &42u64.to_le_bytes());
    }

    #[test]
    fn hash_changes_with_nonce() {
        let mut header = BlockHeader::new([0u8; 32], sample_body().commitment(), 4, 0);
        let h1 = header.hash();
        header.nonce += 1;
        assert_ne!(h1, header.hash());
    }

    #[test]
    fn body_does_not_change_hash() {
        let body = sample_body();
        let header = BlockHeader::new([9u8; 32], body.commitment(), 1, 3);
        let bare = Block::header_only(header);
        let full = Block::new(header, body).unwrap();
        assert_eq!(bare.hash(), full.hash());
        assert_eq!(bare, full);
    }

    #[test]
    fn new_rejects_uncommitted_body() {
        let header = BlockHeader::new([0u8; 32], [0u8; 32], 1, 0);
        let err = Block::new(header, sample_body()).unwrap_err();
        assert!(matches!(err, ChainError::BodyCommitmentMismatch));
    }

    #[test]
    fn set_body_on_bodiless_block() {
        let body = sample_body();
        let mut block = Block::header_only(BlockHeader::new([0u8; 32], body.commitment(), 1, 0));
        let before = block.hash();
        assert!(!block.has_body());
        block.set_body(body.clone()).unwrap();
        assert!(block.has_body());
        assert_eq!(block.body(), Some(&body));
        assert_eq!(block.hash(), before);
    }

    #[test]
    fn set_body_mismatch_leaves_block_untouched() {
        let mut block = Block::header_only(BlockHeader::new([0u8; 32], [5u8; 32], 1, 0));
        assert!(block.set_body(sample_body()).is_err());
        assert!(!block.has_body());
    }

    #[test]
    fn is_valid_tracks_difficulty() {
        let mined = BlockBuilder::new([3u8; 32], 6).build();
        assert!(mined.is_valid());

        let mut harder = mined.without_body();
        harder.header_mut().difficulty = 255;
        assert!(!harder.is_valid());
    }

    #[test]
    fn encode_decode_with_body() {
        let mut builder = BlockBuilder::new([7u8; 32], 4);
        builder.add(b"one".to_vec()).add(b"two".to_vec());
        let block = builder.build();

        let decoded = Block::decode(&block.encode(true), true).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.body(), block.body());
    }

    #[test]
    fn headers_only_encoding_drops_body() {
        let mut builder = BlockBuilder::new([7u8; 32], 4);
        builder.add(b"one".to_vec());
        let block = builder.build();

        let skeleton = block.encode(false);
        assert!(skeleton.len() < block.encode(true).len());
        let decoded = Block::decode(&skeleton, false).unwrap();
        assert_eq!(decoded, block);
        assert!(!decoded.has_body());

        // has_body = false ignores a body that is present on the wire
        let decoded = Block::decode(&block.encode(true), false).unwrap();
        assert!(!decoded.has_body());
    }

    #[test]
    fn decode_truncated_fails() {
        let bytes = Block::genesis().encode(true);
        let err = Block::decode(&bytes[..bytes.len() / 2], true).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn decode_trailing_bytes_fails() {
        let mut bytes = Block::genesis().encode(true);
        bytes.push(0);
        assert!(Block::decode(&bytes, true).is_err());
    }

    #[test]
    fn decode_rejects_difficulty_out_of_range() {
        let block = Block::header_only(BlockHeader::new([0u8; 32], [0u8; 32], MAX_DIFFICULTY + 1, 0));
        let err = Block::decode(&block.encode(false), false).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::DifficultyOutOfRange { difficulty, .. } if difficulty == MAX_DIFFICULTY + 1
        ));
    }

    #[test]
    fn decode_rejects_tampered_body() {
        let body = sample_body();
        let header = BlockHeader::new([0u8; 32], body.commitment(), 1, 0);
        let swapped = vec![b"alpha".to_vec(), b"gamma".to_vec()];
        let forged = BlockRecordRef {
            header: &header,
            body: Some(&swapped),
        };
        let bytes = wire::encoder().serialize(&forged).unwrap();
        let err = Block::decode(&bytes, true).unwrap_err();
        assert!(matches!(err, DecodeError::BodyCommitmentMismatch));
    }
}
