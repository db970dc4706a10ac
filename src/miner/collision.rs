// src/miner/collision.rs
//! Birthday collision search
//!
//! One [`CollisionSearch`] per worker. A round hashes the header commitment
//! into a midstate, asks the batch hasher for candidates and streams them
//! through a [`CollisionTable`]. Table hits are only hints: each pair is
//! recomputed with the digest primitive before it is trusted.
//!
//! Packed candidate layout (64 bits):
//!
//! ```text
//! 63 ............ 64-B | ... | 31 .. 26 | 25 ........ 0
//!  bucket (B bits)     |     |   tag    |    nonce
//!  \______________ block group ________/
//! ```
//!
//! Table entries are `tag | position`. A cleared slot reads as position 0
//! with tag 0; the block-group comparison tells it apart from a real entry.

use crate::miner::algorithm::{
    BatchHasher, HashPrimitive, INDEX_BITS, INDEX_MASK, Midstate, birthday_for_index,
    meets_target,
};
use crate::types::BlockHeader;
use crate::utils::error::MinerError;
use std::collections::TryReserveError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Smallest supported table exponent (4 MiB per worker)
pub const MIN_TABLE_BITS: u32 = 20;

/// Largest supported table exponent (4 GiB per worker)
pub const MAX_TABLE_BITS: u32 = 30;

/// Longest batch whose positions fit in a table entry
pub const MAX_BATCH_LEN: usize = 1 << INDEX_BITS;

const TAG_MASK: u32 = !INDEX_MASK;

/// Receives headers whose proof-of-work meets the share target
pub trait ShareSink: Send + Sync {
    /// Hands over a completed header found by worker `thread_id`
    fn submit(&self, header: &BlockHeader, thread_id: usize);
}

impl ShareSink for crossbeam_channel::Sender<BlockHeader> {
    fn submit(&self, header: &BlockHeader, thread_id: usize) {
        if let Err(e) = self.send(*header) {
            log::warn!("worker {} could not queue share: {}", thread_id, e);
        }
    }
}

/// Fixed-size bucket table mapping truncated birthdays to their last candidate
pub struct CollisionTable {
    bits: u32,
    slots: Vec<u32>,
}

impl CollisionTable {
    /// Allocates a table of `2^bits` entries
    ///
    /// When the full reservation fails the table falls back to half the size
    /// once; if that fails too the worker cannot run.
    pub fn allocate(bits: u32) -> Result<Self, MinerError> {
        if !(MIN_TABLE_BITS..=MAX_TABLE_BITS).contains(&bits) {
            return Err(MinerError::ConfigError(format!(
                "collision table bits must be within {}..={}, got {}",
                MIN_TABLE_BITS, MAX_TABLE_BITS, bits
            )));
        }

        match Self::try_allocate(bits) {
            Ok(table) => Ok(table),
            Err(e) if bits > MIN_TABLE_BITS => {
                log::warn!(
                    "could not allocate {} MiB collision table ({}), retrying with 2^{} entries",
                    Self::bytes_for(bits) >> 20,
                    e,
                    bits - 1
                );
                Self::try_allocate(bits - 1).map_err(|e| Self::exhausted(bits - 1, e))
            }
            Err(e) => Err(Self::exhausted(bits, e)),
        }
    }

    fn try_allocate(bits: u32) -> Result<Self, TryReserveError> {
        let len = 1usize << bits;
        let mut slots = Vec::new();
        slots.try_reserve_exact(len)?;
        slots.resize(len, 0);
        Ok(CollisionTable { bits, slots })
    }

    fn exhausted(bits: u32, e: TryReserveError) -> MinerError {
        MinerError::ResourceError(format!(
            "cannot allocate {} MiB collision table: {}",
            Self::bytes_for(bits) >> 20,
            e
        ))
    }

    fn bytes_for(bits: u32) -> usize {
        (1usize << bits) * size_of::<u32>()
    }

    /// Table exponent actually in use
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Memory held by the table
    pub fn memory_bytes(&self) -> usize {
        Self::bytes_for(self.bits)
    }

    /// Empties every bucket
    pub fn clear(&mut self) {
        self.slots.fill(0);
    }

    /// Bucket of a packed candidate (its top `bits` bits)
    pub fn bucket(&self, candidate: u64) -> usize {
        (candidate >> (64 - self.bits)) as usize
    }

    /// Current occupant of `bucket` (0 = empty)
    pub fn get(&self, bucket: usize) -> u32 {
        self.slots[bucket]
    }

    /// Overwrites `bucket`
    pub fn insert(&mut self, bucket: usize, entry: u32) {
        self.slots[bucket] = entry;
    }
}

/// Summary of one search round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Candidates scanned
    pub candidates: usize,
    /// Table hits that failed revalidation
    pub false_positives: u64,
    /// Revalidated birthday collisions
    pub collisions: u64,
    /// Headers handed to the share sink
    pub shares: u64,
}

impl std::ops::AddAssign for RoundOutcome {
    fn add_assign(&mut self, other: Self) {
        self.candidates += other.candidates;
        self.false_positives += other.false_positives;
        self.collisions += other.collisions;
        self.shares += other.shares;
    }
}

/// Per-worker collision search engine
pub struct CollisionSearch {
    thread_id: usize,
    table: CollisionTable,
    hasher: Box<dyn BatchHasher>,
    primitive: Arc<dyn HashPrimitive>,
    /// Genuine collisions found, counted twice (both orderings are attempts)
    collisions: Arc<AtomicU64>,
}

impl CollisionSearch {
    /// Assembles an engine from an allocated table and an initialized hasher
    pub fn new(
        thread_id: usize,
        table: CollisionTable,
        hasher: Box<dyn BatchHasher>,
        primitive: Arc<dyn HashPrimitive>,
    ) -> Self {
        CollisionSearch {
            thread_id,
            table,
            hasher,
            primitive,
            collisions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counts collisions into `counter` instead of a private one
    pub fn with_collision_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.collisions = counter;
        self
    }

    /// Shared handle on this engine's collision counter, for reporting
    pub fn collision_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.collisions)
    }

    /// Exponent of the table in use
    pub fn table_bits(&self) -> u32 {
        self.table.bits()
    }

    /// Runs one search round over `header`
    ///
    /// Shares are handed to `sink` as they are found. The header itself is
    /// not modified; every share is a private copy with its birthdays set.
    pub fn search(
        &mut self,
        header: &BlockHeader,
        sink: &dyn ShareSink,
    ) -> Result<RoundOutcome, MinerError> {
        let midstate = Midstate::from_header(self.primitive.as_ref(), header);
        let batch = self.hasher.compute_hashes(&midstate.padded_block())?;

        let scanned = batch.len().min(MAX_BATCH_LEN);
        let mut outcome = RoundOutcome {
            candidates: scanned,
            ..RoundOutcome::default()
        };
        if batch.is_empty() {
            return Ok(outcome);
        }
        if batch.len() > MAX_BATCH_LEN {
            log::debug!(
                "worker {}: truncating batch of {} candidates",
                self.thread_id,
                batch.len()
            );
        }

        self.table.clear();
        for (position, &candidate) in batch[..scanned].iter().enumerate() {
            let tag = (candidate as u32) & TAG_MASK;
            let bucket = self.table.bucket(candidate);
            let entry = self.table.get(bucket);
            let stored_position = (entry & INDEX_MASK) as usize;

            if entry & TAG_MASK == tag && stored_position < position {
                let stored = batch[stored_position];
                if stored >> INDEX_BITS == candidate >> INDEX_BITS {
                    let index_a = (stored as u32) & INDEX_MASK;
                    let index_b = (candidate as u32) & INDEX_MASK;
                    match revalidate(
                        self.primitive.as_ref(),
                        &midstate,
                        header,
                        index_a,
                        index_b,
                        sink,
                        self.thread_id,
                    ) {
                        Some(shares) => {
                            self.collisions.fetch_add(2, Ordering::Relaxed);
                            outcome.collisions += 1;
                            outcome.shares += shares;
                        }
                        None => outcome.false_positives += 1,
                    }
                }
            }

            self.table.insert(bucket, tag | position as u32);
        }

        Ok(outcome)
    }
}

/// Confirms a table hit and checks both orderings against the share target
///
/// Returns `None` for aliasing false positives, otherwise the number of
/// shares handed to the sink.
fn revalidate(
    primitive: &dyn HashPrimitive,
    midstate: &Midstate,
    header: &BlockHeader,
    index_a: u32,
    index_b: u32,
    sink: &dyn ShareSink,
    thread_id: usize,
) -> Option<u64> {
    let birthday_a = birthday_for_index(primitive, midstate, index_a);
    let birthday_b = birthday_for_index(primitive, midstate, index_b);
    if birthday_a != birthday_b {
        return None;
    }

    let mut shares = 0;
    for (first, second) in [(index_a, index_b), (index_b, index_a)] {
        let mut candidate = *header;
        candidate.birthday_a = first;
        candidate.birthday_b = second;
        let pow = primitive.sha256d(&candidate.submission());
        if meets_target(&pow, &candidate.target_share) {
            log::debug!(
                "worker {}: share {} <-> {} @ {}",
                thread_id,
                first,
                second,
                candidate.time
            );
            sink.submit(&candidate, thread_id);
            shares += 1;
        }
    }
    Some(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::{BIRTHDAY_INPUT_LEN, SEARCH_SPACE_BITS, SHA512_BLOCK_LEN};
    use crate::types::HashMode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns a fixed batch regardless of the midstate
    struct FixedBatch(Vec<u64>);

    impl BatchHasher for FixedBatch {
        fn initialize(&mut self) -> Result<(), MinerError> {
            Ok(())
        }

        fn compute_hashes(&mut self, _block: &[u8; SHA512_BLOCK_LEN]) -> Result<&[u64], MinerError> {
            Ok(&self.0)
        }
    }

    /// Deterministic digest: birthdays come from a lookup, pow hash is fixed
    struct StubPrimitive {
        birthdays: HashMap<u32, u64>,
        pow: [u8; 32],
    }

    impl HashPrimitive for StubPrimitive {
        fn sha256d(&self, _data: &[u8]) -> [u8; 32] {
            self.pow
        }

        fn birthday_words(&self, input: &[u8; BIRTHDAY_INPUT_LEN]) -> [u64; 8] {
            let base = u32::from_le_bytes([input[0], input[1], input[2], input[3]]);
            let mut words = [0u64; 8];
            for (offset, word) in words.iter_mut().enumerate() {
                let index = base + offset as u32;
                let birthday = self.birthdays.get(&index).copied().unwrap_or(u64::from(index));
                *word = birthday << (64 - SEARCH_SPACE_BITS);
            }
            words
        }

        fn mode(&self) -> HashMode {
            HashMode::Portable
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<BlockHeader>>);

    impl ShareSink for CollectingSink {
        fn submit(&self, header: &BlockHeader, _thread_id: usize) {
            self.0.lock().unwrap().push(*header);
        }
    }

    fn pack(group: u64, nonce: u32) -> u64 {
        (group << INDEX_BITS) | u64::from(nonce)
    }

    fn engine(batch: Vec<u64>, birthdays: &[(u32, u64)], pow: [u8; 32]) -> CollisionSearch {
        let primitive = StubPrimitive {
            birthdays: birthdays.iter().copied().collect(),
            pow,
        };
        CollisionSearch::new(
            3,
            CollisionTable::allocate(MIN_TABLE_BITS).unwrap(),
            Box::new(FixedBatch(batch)),
            Arc::new(primitive),
        )
    }

    fn header_with_target(target: [u8; 32]) -> BlockHeader {
        BlockHeader {
            time: 1_400_000_000,
            target_share: target,
            ..BlockHeader::default()
        }
    }

    const GROUP: u64 = 0x2a_5555_5555;

    #[test]
    fn test_table_rejects_out_of_range_bits() {
        assert!(matches!(
            CollisionTable::allocate(19),
            Err(MinerError::ConfigError(_))
        ));
        assert!(matches!(
            CollisionTable::allocate(31),
            Err(MinerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_table_bucket_uses_top_bits() {
        let table = CollisionTable::allocate(MIN_TABLE_BITS).unwrap();
        assert_eq!(table.bits(), 20);
        assert_eq!(table.memory_bytes(), 4 << 20);
        assert_eq!(table.bucket(0xfffff000_00000000), 0xfffff);
        assert_eq!(table.bucket(0x00000fff_ffffffff), 0);
    }

    #[test]
    fn test_false_positive_is_suppressed() {
        let batch = vec![pack(GROUP, 10), pack(GROUP, 20)];
        let mut search = engine(batch, &[(10, 111), (20, 222)], [0; 32]);
        let sink = CollectingSink::default();

        let outcome = search.search(&header_with_target([0xff; 32]), &sink).unwrap();

        assert_eq!(outcome.false_positives, 1);
        assert_eq!(outcome.collisions, 0);
        assert_eq!(search.collision_counter().load(Ordering::Relaxed), 0);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_genuine_collision_is_reported_in_both_orders() {
        let batch = vec![pack(GROUP, 10), pack(GROUP, 20)];
        let mut search = engine(batch, &[(10, 777), (20, 777)], [0; 32]);
        let sink = CollectingSink::default();

        let outcome = search.search(&header_with_target([0xff; 32]), &sink).unwrap();

        assert_eq!(outcome.collisions, 1, "exactly one collision event");
        assert_eq!(outcome.shares, 2);
        assert_eq!(search.collision_counter().load(Ordering::Relaxed), 2);
        let shares = sink.0.lock().unwrap();
        assert_eq!((shares[0].birthday_a, shares[0].birthday_b), (10, 20));
        assert_eq!((shares[1].birthday_a, shares[1].birthday_b), (20, 10));
        assert_eq!(shares[0].time, 1_400_000_000);
    }

    #[test]
    fn test_tag_mismatch_skips_revalidation() {
        // Same bucket, tags (low 6 bits of the group) differ
        let batch = vec![pack(GROUP, 10), pack(GROUP ^ 0x1, 20)];
        let mut search = engine(batch, &[(10, 777), (20, 777)], [0; 32]);

        let outcome = search
            .search(&header_with_target([0xff; 32]), &CollectingSink::default())
            .unwrap();

        assert_eq!(outcome, RoundOutcome { candidates: 2, ..RoundOutcome::default() });
    }

    #[test]
    fn test_block_group_mismatch_skips_revalidation() {
        // Same bucket and tag, differing bit between them
        let batch = vec![pack(GROUP, 10), pack(GROUP ^ (1 << 12), 20)];
        let mut search = engine(batch, &[(10, 777), (20, 777)], [0; 32]);

        let outcome = search
            .search(&header_with_target([0xff; 32]), &CollectingSink::default())
            .unwrap();

        assert_eq!(outcome.false_positives + outcome.collisions, 0);
    }

    #[test]
    fn test_last_writer_wins() {
        // The middle candidate evicts the first; the third only sees the second
        let batch = vec![
            pack(GROUP, 10),
            pack(GROUP ^ 0x1, 11),
            pack(GROUP, 12),
        ];
        let mut search = engine(batch, &[(10, 5), (12, 5)], [0; 32]);

        let outcome = search
            .search(&header_with_target([0xff; 32]), &CollectingSink::default())
            .unwrap();

        assert_eq!(outcome.collisions, 0);
    }

    // Tag bits (low 6 of the group) all zero, like a cleared slot
    const UNTAGGED_GROUP: u64 = 0x2a_5555_5540;

    #[test]
    fn test_collision_with_first_candidate_is_found() {
        let batch = vec![pack(UNTAGGED_GROUP, 10), pack(UNTAGGED_GROUP, 20)];
        let mut search = engine(batch, &[(10, 31), (20, 31)], [0; 32]);

        let outcome = search
            .search(&header_with_target([0xff; 32]), &CollectingSink::default())
            .unwrap();

        assert_eq!((outcome.collisions, outcome.shares), (1, 2));
    }

    #[test]
    fn test_cleared_slot_is_not_a_hit() {
        // First candidate lands elsewhere; the second reads an empty slot
        let batch = vec![pack(GROUP, 10), pack(UNTAGGED_GROUP ^ (1 << 30), 20)];
        let mut search = engine(batch, &[(10, 31), (20, 31)], [0; 32]);

        let outcome = search
            .search(&header_with_target([0xff; 32]), &CollectingSink::default())
            .unwrap();

        assert_eq!(outcome, RoundOutcome { candidates: 2, ..RoundOutcome::default() });

        let mut lone = engine(vec![pack(UNTAGGED_GROUP, 10)], &[], [0; 32]);
        let outcome = lone
            .search(&header_with_target([0xff; 32]), &CollectingSink::default())
            .unwrap();
        assert_eq!(outcome.false_positives + outcome.collisions, 0, "no self match");
    }

    #[test]
    fn test_full_nonce_space_fits_the_table() {
        assert_eq!(MAX_BATCH_LEN, 1 << INDEX_BITS);
        assert_eq!((MAX_BATCH_LEN - 1) as u32 & TAG_MASK, 0);
    }

    #[test]
    fn test_empty_batch_is_not_an_error() {
        let mut search = engine(Vec::new(), &[], [0; 32]);
        let outcome = search
            .search(&header_with_target([0xff; 32]), &CollectingSink::default())
            .unwrap();
        assert_eq!(outcome, RoundOutcome::default());
    }

    #[test]
    fn test_all_zero_target_accepts_only_zero_hash() {
        let batch = vec![pack(GROUP, 10), pack(GROUP, 20)];

        let mut nonzero = [0u8; 32];
        nonzero[0] = 1;
        let mut search = engine(batch.clone(), &[(10, 9), (20, 9)], nonzero);
        let outcome = search
            .search(&header_with_target([0; 32]), &CollectingSink::default())
            .unwrap();
        assert_eq!((outcome.collisions, outcome.shares), (1, 0));

        let mut search = engine(batch, &[(10, 9), (20, 9)], [0; 32]);
        let outcome = search
            .search(&header_with_target([0; 32]), &CollectingSink::default())
            .unwrap();
        assert_eq!(outcome.shares, 2, "hash equal to the target meets it");
    }

    #[test]
    fn test_table_is_cleared_between_rounds() {
        let batch = vec![pack(GROUP, 10)];
        let mut search = engine(batch, &[], [0; 32]);
        let header = header_with_target([0xff; 32]);
        let sink = CollectingSink::default();

        search.search(&header, &sink).unwrap();
        let outcome = search.search(&header, &sink).unwrap();

        assert_eq!(outcome.false_positives + outcome.collisions, 0);
    }
}
