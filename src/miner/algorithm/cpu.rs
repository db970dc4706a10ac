// src/miner/algorithm/cpu.rs
//! CPU batch hasher
//!
//! Enumerates every nonce of the search space and emits one packed candidate
//! per nonce, in nonce order. Digests are spread over rayon's pool, eight
//! birthdays per SHA-512 call.

use crate::miner::algorithm::{
    BIRTHDAY_INPUT_LEN, BIRTHDAYS_PER_HASH, BatchHasher, HashPrimitive, INDEX_BITS, INDEX_MASK,
    SHA512_BLOCK_LEN,
};
use crate::utils::error::MinerError;
use rayon::prelude::*;
use std::sync::Arc;

/// Batch hasher running on the CPU
pub struct CpuBatchHasher {
    primitive: Arc<dyn HashPrimitive>,
    /// log2 of the number of nonces per batch
    nonce_bits: u32,
    buffer: Vec<u64>,
}

impl CpuBatchHasher {
    /// Creates a hasher covering `2^nonce_bits` nonces per batch
    ///
    /// The buffer is only allocated by [`BatchHasher::initialize`].
    pub fn new(primitive: Arc<dyn HashPrimitive>, nonce_bits: u32) -> Self {
        CpuBatchHasher {
            primitive,
            nonce_bits,
            buffer: Vec::new(),
        }
    }

    /// Number of candidates produced per batch
    pub fn batch_len(&self) -> usize {
        1usize << self.nonce_bits
    }
}

impl BatchHasher for CpuBatchHasher {
    fn initialize(&mut self) -> Result<(), MinerError> {
        if !(3..=INDEX_BITS).contains(&self.nonce_bits) {
            return Err(MinerError::AcceleratorError(format!(
                "nonce space of 2^{} is outside 2^3..=2^{}",
                self.nonce_bits, INDEX_BITS
            )));
        }
        let len = self.batch_len();
        self.buffer.try_reserve_exact(len).map_err(|e| {
            MinerError::AcceleratorError(format!(
                "cannot allocate {} MiB batch buffer: {}",
                len * 8 >> 20,
                e
            ))
        })?;
        self.buffer.resize(len, 0);
        log::debug!(
            "CPU batch hasher ready: {} nonces, {} digest",
            len,
            self.primitive.mode()
        );
        Ok(())
    }

    fn compute_hashes(&mut self, block: &[u8; SHA512_BLOCK_LEN]) -> Result<&[u64], MinerError> {
        if self.buffer.is_empty() {
            return Err(MinerError::AcceleratorError(
                "batch hasher used before initialization".into(),
            ));
        }

        let mut template = [0u8; BIRTHDAY_INPUT_LEN];
        template.copy_from_slice(&block[..BIRTHDAY_INPUT_LEN]);
        let primitive = &self.primitive;
        let keep_mask = !u64::from(INDEX_MASK);

        self.buffer
            .par_chunks_mut(BIRTHDAYS_PER_HASH as usize)
            .enumerate()
            .for_each(|(chunk, out)| {
                let base = chunk as u32 * BIRTHDAYS_PER_HASH;
                let mut input = template;
                input[..4].copy_from_slice(&base.to_le_bytes());
                let words = primitive.birthday_words(&input);
                for (offset, (slot, word)) in out.iter_mut().zip(words).enumerate() {
                    *slot = (word & keep_mask) | u64::from(base + offset as u32);
                }
            });

        Ok(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::{Midstate, birthday_for_index, create_hash_primitive};
    use crate::types::HashMode;

    #[test]
    fn test_compute_before_initialize_fails() {
        let mut hasher = CpuBatchHasher::new(create_hash_primitive(HashMode::Portable), 6);
        let block = Midstate::new([0u8; 32]).padded_block();
        assert!(matches!(
            hasher.compute_hashes(&block),
            Err(MinerError::AcceleratorError(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_nonce_space() {
        let mut hasher = CpuBatchHasher::new(create_hash_primitive(HashMode::Portable), 27);
        assert!(hasher.initialize().is_err());
    }

    #[test]
    fn test_candidates_carry_nonce_and_birthday_prefix() {
        let primitive = create_hash_primitive(HashMode::Compress);
        let midstate = Midstate::new([0x3au8; 32]);
        let mut hasher = CpuBatchHasher::new(primitive.clone(), 8);
        hasher.initialize().unwrap();

        let batch = hasher.compute_hashes(&midstate.padded_block()).unwrap().to_vec();
        assert_eq!(batch.len(), 256);
        for (position, packed) in batch.iter().enumerate() {
            let nonce = (*packed as u32) & INDEX_MASK;
            assert_eq!(nonce as usize, position);
            // Packed high bits are the birthday without its low 12 bits
            let birthday = birthday_for_index(primitive.as_ref(), &midstate, nonce);
            assert_eq!(packed >> INDEX_BITS, birthday >> 12);
        }
    }
}
