pub const HASH_SIZE: usize = 32;

/// Leading zero bits a block hash may be asked to carry. Keeps `2^difficulty` inside a `u128`.
pub const MAX_DIFFICULTY: u32 = 120;
pub const DEFAULT_DIFFICULTY: u32 = 20;

// Pre-mined against an empty body and an all-zero parent.
pub const GENESIS_DIFFICULTY: u32 = 16;
pub const GENESIS_NONCE: u64 = 23_833;

/// Upper bound on a single encoded chain or block record.
pub const MAX_WIRE_BYTES: u64 = 64 * 1024 * 1024;
