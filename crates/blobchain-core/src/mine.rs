use crate::{
    block::{Block, BlockBody, BlockHeader},
    constants::MAX_DIFFICULTY,
    error::ChainError,
    pow, Hash,
};
use rayon::prelude::*;
use std::{
    panic,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, info, warn};

/// Shared stop flag for an in-flight nonce search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Collects blobs for a pending block and mines it on top of `prev_hash`.
#[derive(Clone, Debug)]
pub struct BlockBuilder {
    prev_hash: Hash,
    difficulty: u32,
    blobs: Vec<Vec<u8>>,
}

impl BlockBuilder {
    /// `difficulty` is capped at [`MAX_DIFFICULTY`] so every mined block decodes.
    pub fn new(prev_hash: Hash, difficulty: u32) -> Self {
        if difficulty > MAX_DIFFICULTY {
            warn!(difficulty, max = MAX_DIFFICULTY, "difficulty clamped");
        }
        Self {
            prev_hash,
            difficulty: difficulty.min(MAX_DIFFICULTY),
            blobs: Vec::new(),
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Appends a blob. Order is preserved and is part of the body commitment.
    pub fn add(&mut self, blob: impl Into<Vec<u8>>) -> &mut Self {
        self.blobs.push(blob.into());
        self
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Mines the block, blocking until a nonce satisfies the difficulty.
    pub fn build(&self) -> Block {
        let body = BlockBody::new(self.blobs.clone());
        let template = self.template(&body);
        let nonce = search(template, None).expect("nonce space exhausted (practically impossible)");
        self.finish(template, nonce, body)
    }

    /// Like [`BlockBuilder::build`], but gives up with [`ChainError::Cancelled`]
    /// once `cancel` fires.
    pub fn build_cancellable(&self, cancel: &CancelToken) -> Result<Block, ChainError> {
        let body = BlockBody::new(self.blobs.clone());
        let template = self.template(&body);
        match search(template, Some(cancel)) {
            Some(nonce) => Ok(self.finish(template, nonce, body)),
            None => {
                warn!(difficulty = self.difficulty, "mining cancelled");
                Err(ChainError::Cancelled)
            }
        }
    }

    /// Runs the search on a dedicated worker thread.
    pub fn spawn(self) -> MiningTask {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = thread::spawn(move || self.build_cancellable(&token));
        MiningTask { cancel, handle }
    }

    fn template(&self, body: &BlockBody) -> BlockHeader {
        debug!(
            difficulty = self.difficulty,
            blobs = body.len(),
            "building block"
        );
        BlockHeader::new(self.prev_hash, body.commitment(), self.difficulty, 0)
    }

    fn finish(&self, mut header: BlockHeader, nonce: u64, body: BlockBody) -> Block {
        header.nonce = nonce;
        info!(
            "Mined block with nonce {} and hash {}",
            nonce,
            hex::encode(header.hash())
        );
        Block::new(header, body).expect("body hash was taken from this body")
    }
}

/// Parallel nonce search. `None` means the search was cancelled.
fn search(template: BlockHeader, cancel: Option<&CancelToken>) -> Option<u64> {
    (0u64..u64::MAX)
        .into_par_iter()
        .find_map_any(|nonce| {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Some(None);
            }
            let mut h = template;
            h.nonce = nonce;
            pow::meets_difficulty(&h.hash(), h.difficulty).then_some(Some(nonce))
        })
        .flatten()
}

/// Handle to a block being mined on its own thread.
pub struct MiningTask {
    cancel: CancelToken,
    handle: JoinHandle<Result<Block, ChainError>>,
}

impl MiningTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker. Returns [`ChainError::Cancelled`] if it was stopped first.
    pub fn join(self) -> Result<Block, ChainError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}
