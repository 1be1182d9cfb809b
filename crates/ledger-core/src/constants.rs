pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_PROOF: u64 = 100;
pub const GENESIS_PREVIOUS_HASH: &str = "1";
pub const POW_TARGET_DIFFICULTY: usize = 4;
pub const POW_BATCH_SIZE: u64 = 4_096;
pub const MAX_MINING_ATTEMPTS: u64 = 1 << 32;
pub const PEER_TIMEOUT_MS: u64 = 5_000;
pub const MAX_PEERS_IN_FLIGHT: usize = 8;
