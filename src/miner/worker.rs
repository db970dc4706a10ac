// src/miner/worker.rs
//! Worker thread implementation
//!
//! A worker repeatedly asks the template store for a header stamped with its
//! own time slot and runs one collision search round on it. Workers never
//! coordinate with each other; the time schedule keeps their headers apart.

use crate::miner::collision::{CollisionSearch, ShareSink};
use crate::miner::template::BlockTemplateStore;
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long a worker sleeps when no template is available
pub const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Totals reported by a worker when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Search rounds completed
    pub rounds: u64,
    /// Revalidated collisions
    pub collisions: u64,
    /// Shares handed to the sink
    pub shares: u64,
}

/// Search loop bound to one thread
pub struct Worker {
    id: usize,
    store: Arc<BlockTemplateStore>,
    search: CollisionSearch,
    sink: Arc<dyn ShareSink>,
    running: Arc<AtomicBool>,
    idle_interval: Duration,
}

impl Worker {
    /// Creates a worker around an already prepared search engine
    pub fn new(
        id: usize,
        store: Arc<BlockTemplateStore>,
        search: CollisionSearch,
        sink: Arc<dyn ShareSink>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Worker {
            id,
            store,
            search,
            sink,
            running,
            idle_interval: IDLE_INTERVAL,
        }
    }

    /// Overrides the idle sleep (tests use a short one)
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Searches until the running flag is cleared
    ///
    /// The flag is checked between rounds only; a round in progress always
    /// completes. The round counter restarts whenever the template changes
    /// and only advances if the template survived the round.
    pub fn run(mut self) -> Result<WorkerSummary, MinerError> {
        let thread_id = self.id as u32;
        let mut summary = WorkerSummary::default();
        let mut counter: u32 = 0;
        let mut last_generation = 0;
        let mut last_time = 0;

        while self.running.load(Ordering::Relaxed) {
            let generation = self.store.generation();
            if generation != last_generation {
                last_generation = generation;
                counter = 0;
            }

            let Some(header) = self.store.get_block(thread_id, last_time, counter) else {
                std::thread::sleep(self.idle_interval);
                continue;
            };
            last_time = header.time;

            let outcome = self.search.search(&header, self.sink.as_ref())?;
            summary.rounds += 1;
            summary.collisions += outcome.collisions;
            summary.shares += outcome.shares;
            log::trace!(
                "worker {} round @ {}: {} candidates, {} collisions, {} false positives",
                self.id,
                header.time,
                outcome.candidates,
                outcome.collisions,
                outcome.false_positives
            );

            if self.store.generation() == generation {
                counter = counter.wrapping_add(1);
            }
        }

        log::info!("[WORKER{}] Bye Bye! {} rounds searched", self.id, summary.rounds);
        Ok(summary)
    }
}
