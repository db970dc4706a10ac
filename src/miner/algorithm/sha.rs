// src/miner/algorithm/sha.rs
//! SHA-2 digest primitives
//!
//! Two interchangeable [`HashPrimitive`] implementations:
//! - [`PortableSha`] hashes through the streaming `Sha512` API
//! - [`CompressSha`] runs the SHA-512 compression function once over the
//!   pre-padded block, which is all a 36-byte message needs

use crate::miner::algorithm::{BIRTHDAY_INPUT_LEN, HashPrimitive, pad_block};
use crate::types::HashMode;
use sha2::digest::generic_array::GenericArray;
use sha2::{Digest, Sha256, Sha512};

/// SHA-512 initial hash value (FIPS 180-4, 5.3.5)
const SHA512_IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Streaming SHA-2 from the `sha2` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableSha;

impl HashPrimitive for PortableSha {
    fn sha256d(&self, data: &[u8]) -> [u8; 32] {
        sha256d(data)
    }

    fn birthday_words(&self, input: &[u8; BIRTHDAY_INPUT_LEN]) -> [u64; 8] {
        let digest = Sha512::digest(input);
        let mut words = [0u64; 8];
        for (word, chunk) in words.iter_mut().zip(digest.chunks_exact(8)) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            *word = u64::from_le_bytes(bytes);
        }
        words
    }

    fn mode(&self) -> HashMode {
        HashMode::Portable
    }
}

/// Single-block SHA-512 compression
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressSha;

impl HashPrimitive for CompressSha {
    fn sha256d(&self, data: &[u8]) -> [u8; 32] {
        sha256d(data)
    }

    fn birthday_words(&self, input: &[u8; BIRTHDAY_INPUT_LEN]) -> [u64; 8] {
        let block = pad_block(input);
        let mut state = SHA512_IV;
        sha2::compress512(&mut state, &[GenericArray::clone_from_slice(&block)]);
        // Digest bytes are the state words big-endian; birthdays read them little-endian
        state.map(u64::swap_bytes)
    }

    fn mode(&self) -> HashMode {
        HashMode::Compress
    }
}
