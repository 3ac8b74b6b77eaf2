use thiserror::Error;

/// Failure to parse a chain, block or blob record from wire bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed record: {0}")]
    Malformed(#[from] bincode::Error),

    #[error("record of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: u64 },

    #[error("difficulty {difficulty} exceeds maximum of {max}")]
    DifficultyOutOfRange { difficulty: u32, max: u32 },

    #[error("block body does not match the header's body hash")]
    BodyCommitmentMismatch,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("index {index} is outside the allowed range for a chain of {len} blocks")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("block header differs from the header at index {index}")]
    HeaderMismatch { index: usize },

    #[error("block offered for index {index} carries no body")]
    MissingBody { index: usize },

    #[error("body does not match the header's body hash")]
    BodyCommitmentMismatch,

    #[error("mining cancelled")]
    Cancelled,

    #[error("genesis block does not satisfy its own difficulty ({difficulty} bits); update GENESIS_NONCE")]
    InvalidGenesis { difficulty: u32 },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
