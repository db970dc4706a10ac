// src/miner/algorithm/mod.rs
//! Momentum hashing primitives
//!
//! The search needs two external capabilities, modelled as traits:
//! - [`HashPrimitive`]: SHA-256d for header/proof-of-work hashing and the
//!   SHA-512 birthday digest used for revalidation
//! - [`BatchHasher`]: the accelerator that turns one midstate block into a
//!   batch of packed birthday candidates
//!
//! Both have CPU implementations here; a GPU backend only has to implement
//! [`BatchHasher`].

/// CPU batch hasher enumerating the full nonce space
pub mod cpu;

/// SHA-2 backed digest primitives
pub mod sha;

use crate::types::{BlockHeader, HashMode};
use crate::utils::error::MinerError;
use std::sync::Arc;

/// Highest-order bits of each SHA-512 word kept as the birthday value
pub const SEARCH_SPACE_BITS: u32 = 50;

/// Each SHA-512 digest yields eight 64-bit birthdays
pub const BIRTHDAYS_PER_HASH: u32 = 8;

/// Bits of a packed candidate holding its nonce
pub const INDEX_BITS: u32 = 26;

/// Mask selecting the nonce part of a packed candidate
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Input to the birthday digest: 4-byte little-endian index + 32-byte mid hash
pub const BIRTHDAY_INPUT_LEN: usize = 4 + 32;

/// One padded SHA-512 block
pub const SHA512_BLOCK_LEN: usize = 128;

/// Digest primitives used by the collision search
pub trait HashPrimitive: Send + Sync {
    /// Double SHA-256 (`sha256(sha256(data))`)
    fn sha256d(&self, data: &[u8]) -> [u8; 32];

    /// SHA-512 of a birthday input, read as eight little-endian words
    fn birthday_words(&self, input: &[u8; BIRTHDAY_INPUT_LEN]) -> [u64; 8];

    /// Which implementation this is
    fn mode(&self) -> HashMode;
}

/// Batch hash accelerator
///
/// Implementations own their output buffer. Each packed candidate carries
/// the top 38 bits of its birthday word above the low [`INDEX_BITS`] bits
/// holding the nonce it came from.
pub trait BatchHasher: Send {
    /// Acquires device resources; must succeed before [`compute_hashes`](Self::compute_hashes)
    fn initialize(&mut self) -> Result<(), MinerError>;

    /// Computes one batch for the given padded midstate block
    ///
    /// Bytes 0..4 of `block` are an index placeholder overwritten per digest.
    /// An empty batch is a valid result.
    fn compute_hashes(&mut self, block: &[u8; SHA512_BLOCK_LEN]) -> Result<&[u64], MinerError>;
}

/// Builds the digest implementation selected by `mode`
pub fn create_hash_primitive(mode: HashMode) -> Arc<dyn HashPrimitive> {
    match mode {
        HashMode::Portable => Arc::new(sha::PortableSha),
        HashMode::Compress => Arc::new(sha::CompressSha),
    }
}

/// Per-header search prefix
///
/// Holds `sha256d(header[0..80])`, the value every birthday digest is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Midstate {
    mid_hash: [u8; 32],
}

impl Midstate {
    /// Wraps an already computed mid hash
    pub fn new(mid_hash: [u8; 32]) -> Self {
        Midstate { mid_hash }
    }

    /// Derives the midstate of a header's commitment bytes
    pub fn from_header(primitive: &dyn HashPrimitive, header: &BlockHeader) -> Self {
        Midstate {
            mid_hash: primitive.sha256d(&header.commitment()),
        }
    }

    /// The 32-byte mid hash
    pub fn mid_hash(&self) -> &[u8; 32] {
        &self.mid_hash
    }

    /// Birthday digest input for `index`
    pub fn input_for(&self, index: u32) -> [u8; BIRTHDAY_INPUT_LEN] {
        let mut input = [0u8; BIRTHDAY_INPUT_LEN];
        input[..4].copy_from_slice(&index.to_le_bytes());
        input[4..].copy_from_slice(&self.mid_hash);
        input
    }

    /// Padded SHA-512 block handed to the accelerator (index placeholder = 0)
    pub fn padded_block(&self) -> [u8; SHA512_BLOCK_LEN] {
        pad_block(&self.input_for(0))
    }
}

/// Applies SHA-512 padding to a 36-byte birthday input
pub fn pad_block(input: &[u8; BIRTHDAY_INPUT_LEN]) -> [u8; SHA512_BLOCK_LEN] {
    let mut block = [0u8; SHA512_BLOCK_LEN];
    block[..BIRTHDAY_INPUT_LEN].copy_from_slice(input);
    block[BIRTHDAY_INPUT_LEN] = 0x80;
    let bit_len = (BIRTHDAY_INPUT_LEN as u128) * 8;
    block[SHA512_BLOCK_LEN - 16..].copy_from_slice(&bit_len.to_be_bytes());
    block
}

/// Recomputes the truncated birthday of a single nonce
pub fn birthday_for_index(primitive: &dyn HashPrimitive, midstate: &Midstate, index: u32) -> u64 {
    let words = primitive.birthday_words(&midstate.input_for(index & !(BIRTHDAYS_PER_HASH - 1)));
    words[(index & (BIRTHDAYS_PER_HASH - 1)) as usize] >> (64 - SEARCH_SPACE_BITS)
}

/// Compares a proof-of-work hash against a share target
///
/// Both values are 256-bit integers stored as eight little-endian 32-bit
/// words; word 7 is the most significant and is compared first. A hash equal
/// to the target in every word meets it.
pub fn meets_target(hash: &[u8; 32], target: &[u8; 32]) -> bool {
    for word in (0..8).rev() {
        let at = word * 4;
        let generated = u32::from_le_bytes([hash[at], hash[at + 1], hash[at + 2], hash[at + 3]]);
        let limit = u32::from_le_bytes([target[at], target[at + 1], target[at + 2], target[at + 3]]);
        if generated < limit {
            return true;
        }
        if generated > limit {
            return false;
        }
    }
    true
}
