//! The ordered block sequence, its cumulative cost, and the blob index.

use crate::{
    blob,
    block::{Block, BlockBody},
    error::{ChainError, DecodeError},
    mine::{BlockBuilder, CancelToken},
    wire, Hash,
};
use bincode::Options;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error};

/// `(block_index, blob_index)` of a mined blob.
pub type BlobLocation = (usize, usize);

type BlobIndex = HashMap<Hash, BTreeSet<BlobLocation>>;

/// Hash-linked blocks anchored at [`Block::genesis`].
///
/// Mutations never check validity; call [`Chain::is_valid`] or
/// [`Chain::is_complete`] once a batch of changes is in place.
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    cost: u128,
    mined_blobs: BlobIndex,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let mut chain = Self {
            blocks: Vec::new(),
            cost: genesis.cost(),
            mined_blobs: BlobIndex::new(),
        };
        if let Some(body) = genesis.body() {
            index_body(&mut chain.mined_blobs, 0, body);
        }
        chain.blocks.push(genesis);
        chain
    }

    /// Parses an encoded chain. The first record is the genesis slot and is
    /// skipped; every later record is decoded and appended in order.
    pub fn decode(bytes: &[u8], has_bodies: bool) -> Result<Self, DecodeError> {
        let records: Vec<Vec<u8>> = wire::decode(bytes)?;
        let mut chain = Self::new();
        for record in records.iter().skip(1) {
            chain.add(Block::decode(record, has_bodies)?);
        }
        Ok(chain)
    }

    /// Serializes every block, genesis included.
    pub fn encode(&self, include_body: bool) -> Vec<u8> {
        let records: Vec<Vec<u8>> = self
            .blocks
            .iter()
            .map(|b| b.encode(include_body))
            .collect();
        wire::encoder()
            .serialize(&records)
            .expect("chain record is always serializable")
    }

    /// Total work in the chain. Competing chains are ranked by this value.
    pub fn cost(&self) -> u128 {
        self.cost
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, idx: usize) -> Option<&Block> {
        self.blocks.get(idx)
    }

    pub fn tip(&self) -> &Block {
        // blocks[0] is genesis and is never removed
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn mined_blobs(&self) -> &HashMap<Hash, BTreeSet<BlobLocation>> {
        &self.mined_blobs
    }

    /// Where blobs with this content hash were mined, if anywhere.
    pub fn locations(&self, content_hash: &Hash) -> Option<&BTreeSet<BlobLocation>> {
        self.mined_blobs.get(content_hash)
    }

    /// True if a body entry with the same content as `raw` is already in the chain.
    pub fn is_mined(&self, raw: &[u8]) -> bool {
        self.locations(&blob::content_hash(raw))
            .is_some_and(|l| !l.is_empty())
    }

    /// Appends at the tail.
    pub fn add(&mut self, block: Block) {
        debug!(
            nonce = block.nonce(),
            blobs = block.body().map_or(0, BlockBody::len),
            "add block to chain"
        );
        let block_idx = self.blocks.len();
        if let Some(body) = block.body() {
            index_body(&mut self.mined_blobs, block_idx, body);
        }
        self.cost = self.cost.saturating_add(block.cost());
        self.blocks.push(block);
    }

    /// Inserts at `idx` in `1..=len`, shifting later blocks and their index
    /// entries up by one. Genesis cannot be displaced.
    pub fn insert(&mut self, idx: usize, block: Block) -> Result<(), ChainError> {
        if idx == 0 || idx > self.blocks.len() {
            return Err(ChainError::IndexOutOfRange {
                index: idx,
                len: self.blocks.len(),
            });
        }
        debug!(idx, nonce = block.nonce(), "insert block into chain");

        shift_index(&mut self.mined_blobs, idx);
        if let Some(body) = block.body() {
            index_body(&mut self.mined_blobs, idx, body);
        }
        self.cost = self.cost.saturating_add(block.cost());
        self.blocks.insert(idx, block);
        Ok(())
    }

    /// Fills in the body of the block at `idx` from `block`, which must carry
    /// the same header and a body. The header and linkage are left alone, and
    /// nothing changes on rejection.
    pub fn replace(&mut self, idx: usize, block: Block) -> Result<(), ChainError> {
        if idx == 0 || idx >= self.blocks.len() {
            return Err(ChainError::IndexOutOfRange {
                index: idx,
                len: self.blocks.len(),
            });
        }
        if self.blocks[idx] != block {
            debug!(idx, "replace rejected: header mismatch");
            return Err(ChainError::HeaderMismatch { index: idx });
        }
        let Some(body) = block.into_body() else {
            return Err(ChainError::MissingBody { index: idx });
        };

        let previous = self.blocks[idx].replace_body(body)?;
        if let Some(old) = previous {
            unindex_body(&mut self.mined_blobs, idx, &old);
        }
        if let Some(body) = self.blocks[idx].body() {
            index_body(&mut self.mined_blobs, idx, body);
        }
        debug!(idx, "replaced block body");
        Ok(())
    }

    /// Builder for the block that would extend the current tip.
    pub fn builder(&self, difficulty: u32) -> BlockBuilder {
        BlockBuilder::new(self.tip().hash(), difficulty)
    }

    /// Mines (but does not add) the next block over `blobs`.
    pub fn next<I, B>(&self, difficulty: u32, blobs: I) -> Block
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        self.next_builder(difficulty, blobs).build()
    }

    pub fn next_cancellable<I, B>(
        &self,
        difficulty: u32,
        blobs: I,
        cancel: &CancelToken,
    ) -> Result<Block, ChainError>
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        self.next_builder(difficulty, blobs).build_cancellable(cancel)
    }

    fn next_builder<I, B>(&self, difficulty: u32, blobs: I) -> BlockBuilder
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        let mut builder = self.builder(difficulty);
        for blob in blobs {
            builder.add(blob);
        }
        debug!(blobs = builder.len(), difficulty, "building next block");
        builder
    }

    /// Checks genesis, then hash linkage and proof of work of every later
    /// block. Bodies are not inspected.
    pub fn is_valid(&self) -> bool {
        if !self.blocks[0].is_valid() {
            error!("Invalid genesis block: the genesis nonce requires updating.");
            return false;
        }
        self.blocks
            .windows(2)
            .all(|pair| pair[1].prev_hash() == pair[0].hash() && pair[1].is_valid())
    }

    /// Indices of blocks that still lack a body, in chain order.
    pub fn bodiless_indices(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.has_body())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Valid and every block has its body.
    pub fn is_complete(&self) -> bool {
        self.is_valid() && self.blocks.iter().all(Block::has_body)
    }

    #[cfg(test)]
    pub(crate) fn block_mut(&mut self, idx: usize) -> &mut Block {
        &mut self.blocks[idx]
    }
}

fn index_body(index: &mut BlobIndex, block_idx: usize, body: &BlockBody) {
    for (idx, raw) in body.blobs.iter().enumerate() {
        index
            .entry(blob::content_hash(raw))
            .or_default()
            .insert((block_idx, idx));
    }
}

fn unindex_body(index: &mut BlobIndex, block_idx: usize, body: &BlockBody) {
    for (idx, raw) in body.blobs.iter().enumerate() {
        let key = blob::content_hash(raw);
        if let Some(locations) = index.get_mut(&key) {
            locations.remove(&(block_idx, idx));
            if locations.is_empty() {
                index.remove(&key);
            }
        }
    }
}

fn shift_index(index: &mut BlobIndex, from: usize) {
    for locations in index.values_mut() {
        *locations = locations
            .iter()
            .map(|&(b, i)| if b >= from { (b + 1, i) } else { (b, i) })
            .collect();
    }
}
