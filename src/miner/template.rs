// src/miner/template.rs
//! Shared block template store
//!
//! The pool session publishes templates, workers take private copies. The
//! current template lives behind an [`ArcSwapOption`]: publishing swaps in a
//! new immutable `Arc`, readers load whichever `Arc` is current and copy the
//! header out of it, so a reader never sees a half-written template and its
//! copy stays valid after the next swap.

use crate::types::BlockHeader;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A published template
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Header as received from the pool
    pub header: BlockHeader,
    /// Seconds the pool clock is ahead of ours (never negative)
    pub time_offset: u32,
    /// Store-assigned identity, starts at 1
    pub generation: u64,
}

/// Thread-safe holder of the current template
pub struct BlockTemplateStore {
    current: ArcSwapOption<BlockTemplate>,
    next_generation: AtomicU64,
    thread_count: u32,
}

/// Seconds since the Unix epoch, truncated to the header's 32-bit time field
pub fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl BlockTemplateStore {
    /// Creates an empty store for `thread_count` workers (at least 1)
    pub fn new(thread_count: usize) -> Self {
        BlockTemplateStore {
            current: ArcSwapOption::empty(),
            next_generation: AtomicU64::new(1),
            thread_count: thread_count.max(1) as u32,
        }
    }

    /// Replaces the current template, using the local clock for the offset
    pub fn publish(&self, header: BlockHeader) {
        self.publish_at(header, unix_time());
    }

    /// Replaces the current template as if received at `local_time`
    pub fn publish_at(&self, header: BlockHeader, local_time: u32) {
        let template = BlockTemplate {
            header,
            time_offset: header.time.saturating_sub(local_time),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        };
        self.current.store(Some(Arc::new(template)));
    }

    /// Drops the current template; workers idle until the next publish
    pub fn clear(&self) {
        self.current.store(None);
    }

    /// Private copy of the current header, if any
    pub fn snapshot(&self) -> Option<BlockHeader> {
        self.current.load_full().map(|template| template.header)
    }

    /// Identity of the current template (0 when absent)
    pub fn generation(&self) -> u64 {
        self.current
            .load_full()
            .map_or(0, |template| template.generation)
    }

    /// Header time for worker `thread_id` on round `counter`
    pub fn adjusted_time(&self, thread_id: u32, counter: u32) -> u32 {
        let offset = self
            .current
            .load_full()
            .map_or(0, |template| template.time_offset);
        adjusted_time_at(offset, unix_time(), self.thread_count, thread_id, counter)
    }

    /// Snapshot of the current header with its time set for this worker/round
    ///
    /// `last_time` is the time of the worker's previous header, used only to
    /// notice a clock that did not advance.
    pub fn get_block(&self, thread_id: u32, last_time: u32, counter: u32) -> Option<BlockHeader> {
        let template = self.current.load_full()?;
        let mut header = template.header;
        header.time = adjusted_time_at(
            template.time_offset,
            unix_time(),
            self.thread_count,
            thread_id,
            counter,
        );
        if header.time <= last_time && counter > 0 {
            log::debug!(
                "worker {}: header time {} did not advance past {}",
                thread_id,
                header.time,
                last_time
            );
        }
        Some(header)
    }
}

/// Time schedule shared by all workers
///
/// Rounds `local_time + threads` down to a multiple of `threads`, then
/// interleaves workers: worker `t` on round `c` gets slot `t + c * threads`.
pub fn adjusted_time_at(
    time_offset: u32,
    local_time: u32,
    thread_count: u32,
    thread_id: u32,
    counter: u32,
) -> u32 {
    let threads = thread_count.max(1);
    let aligned = (local_time.wrapping_add(threads) / threads).wrapping_mul(threads);
    time_offset
        .wrapping_add(aligned)
        .wrapping_add(thread_id)
        .wrapping_add(counter.wrapping_mul(threads))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::thread;

    fn header(fill: u8, time: u32) -> BlockHeader {
        BlockHeader {
            version: i32::from(fill),
            prev_hash: [fill; 32],
            merkle_root: [fill; 32],
            time,
            bits: u32::from(fill),
            nonce: u32::from(fill),
            target_share: [fill; 32],
            ..BlockHeader::default()
        }
    }

    #[test]
    fn test_empty_store_has_nothing() {
        let store = BlockTemplateStore::new(4);
        assert!(store.snapshot().is_none());
        assert!(store.get_block(0, 0, 0).is_none());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_publish_and_clear() {
        let store = BlockTemplateStore::new(2);
        store.publish_at(header(1, 100), 100);
        assert_eq!(store.snapshot(), Some(header(1, 100)));
        let first = store.generation();

        store.publish_at(header(2, 100), 100);
        assert!(store.generation() > first, "each publish is a new identity");

        store.clear();
        assert!(store.snapshot().is_none());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_time_offset_only_when_server_ahead() {
        let store = BlockTemplateStore::new(1);
        store.publish_at(header(1, 1_000), 900);
        assert_eq!(store.current.load_full().unwrap().time_offset, 100);

        store.publish_at(header(1, 900), 1_000);
        assert_eq!(store.current.load_full().unwrap().time_offset, 0);
    }

    #[test]
    fn test_get_block_stamps_time_on_copy() {
        let store = BlockTemplateStore::new(4);
        store.publish_at(header(9, 5), 5);
        let block = store.get_block(1, 0, 3).unwrap();

        assert_eq!(block.merkle_root, [9; 32]);
        assert_eq!(block.time % 4, 1);
        assert_eq!(store.snapshot().unwrap().time, 5, "stored template untouched");
    }

    #[test]
    fn test_adjusted_time_includes_offset() {
        let store = BlockTemplateStore::new(4);
        assert_eq!(store.adjusted_time(1, 0) % 4, 1, "no template, no offset");

        store.publish_at(header(1, 1_000), 900);
        assert_eq!(store.adjusted_time(1, 0) % 4, 1);
        assert_eq!(store.adjusted_time(2, 5) % 4, 2);
        assert!(store.adjusted_time(0, 0) >= unix_time() + 100);
    }

    #[test]
    fn test_adjusted_time_formula() {
        // (1001 + 4) / 4 * 4 = 1004
        assert_eq!(adjusted_time_at(0, 1001, 4, 0, 0), 1004);
        assert_eq!(adjusted_time_at(10, 1001, 4, 3, 2), 10 + 1004 + 3 + 8);
    }

    #[test]
    fn test_time_diversification() {
        for threads in 1..=16u32 {
            let mut seen = HashSet::new();
            for counter in 0..32u32 {
                for thread_id in 0..threads {
                    let t = adjusted_time_at(7, 1_700_000_123, threads, thread_id, counter);
                    assert!(seen.insert(t), "duplicate time {} for {} threads", t, threads);
                    if counter > 0 {
                        let before =
                            adjusted_time_at(7, 1_700_000_123, threads, thread_id, counter - 1);
                        assert!(t > before, "time must increase with the counter");
                    }
                }
            }
        }
    }

    #[test]
    fn test_concurrent_snapshots_see_whole_templates() {
        let store = Arc::new(BlockTemplateStore::new(8));
        store.publish_at(header(0x11, 1), 1);
        let start = Arc::new(Barrier::new(9));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    for _ in 0..10_000 {
                        let snap = store.snapshot().unwrap();
                        let fill = snap.prev_hash[0];
                        assert!(fill == 0x11 || fill == 0x22);
                        assert_eq!(snap, header(fill, 1), "mixed template observed");
                    }
                })
            })
            .collect();

        start.wait();
        for round in 0..1_000 {
            let fill = if round % 2 == 0 { 0x22 } else { 0x11 };
            store.publish_at(header(fill, 1), 1);
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
