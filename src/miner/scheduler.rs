// src/miner/scheduler.rs
//! Worker orchestration
//!
//! Spawns one OS thread per worker, holds them at a startup gate until every
//! worker has acquired its collision table and batch hasher, and owns the
//! shared running flag used to stop them.

use crate::miner::algorithm::{BatchHasher, HashPrimitive};
use crate::miner::collision::{CollisionSearch, CollisionTable, ShareSink};
use crate::miner::template::BlockTemplateStore;
use crate::miner::worker::{Worker, WorkerSummary};
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Builds the batch hasher for worker `id`
pub type HasherFactory = Arc<dyn Fn(usize) -> Box<dyn BatchHasher> + Send + Sync>;

/// Per-worker resources requested from the scheduler
#[derive(Clone)]
pub struct WorkerSetup {
    /// Collision table exponent
    pub table_bits: u32,
    /// Digest implementation shared by all workers
    pub primitive: Arc<dyn HashPrimitive>,
    /// Accelerator constructor
    pub hasher_factory: HasherFactory,
    /// Sleep while no template is available
    pub idle_interval: Duration,
}

/// Coordinates worker threads
pub struct Scheduler {
    store: Arc<BlockTemplateStore>,
    running: Arc<AtomicBool>,
    counters: Vec<Arc<AtomicU64>>,
    handles: Vec<JoinHandle<Option<WorkerSummary>>>,
}

impl Scheduler {
    /// Creates a scheduler feeding workers from `store`
    pub fn new(store: Arc<BlockTemplateStore>, running: Arc<AtomicBool>) -> Self {
        Scheduler {
            store,
            running,
            counters: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Spawns `workers` threads and waits until all of them are ready
    ///
    /// Returns the number of workers that started. Workers that fail to
    /// acquire their resources log the reason and exit; it is an error only
    /// if none of them could start.
    pub fn start_mining(
        &mut self,
        workers: usize,
        setup: WorkerSetup,
        sink: Arc<dyn ShareSink>,
    ) -> Result<usize, MinerError> {
        log::info!("spawning {} worker thread(s)", workers);

        let (ready_tx, ready_rx) = unbounded();
        // Dropping the sender releases every worker at once
        let (gate_tx, gate_rx) = bounded::<()>(0);

        for id in 0..workers {
            let counter = Arc::new(AtomicU64::new(0));
            let store = Arc::clone(&self.store);
            let running = Arc::clone(&self.running);
            let setup = setup.clone();
            let sink = Arc::clone(&sink);
            let ready_tx = ready_tx.clone();
            let gate_rx = gate_rx.clone();
            let worker_counter = Arc::clone(&counter);

            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || {
                    log::info!("[WORKER{}] Hello, World!", id);
                    let prepared = prepare_search(id, &setup).map(|search| {
                        log::info!(
                            "[WORKER{}] collision table 2^{} ({} MiB)",
                            id,
                            search.table_bits(),
                            (4usize << search.table_bits()) >> 20
                        );
                        search.with_collision_counter(worker_counter)
                    });
                    if ready_tx.send(prepared.is_ok()).is_err() {
                        log::warn!("[WORKER{}] scheduler stopped listening", id);
                    }
                    // The scheduler counts readiness until every sender is gone
                    drop(ready_tx);
                    wait_for_gate(&gate_rx);

                    let search = match prepared {
                        Ok(search) => search,
                        Err(e) => {
                            log::error!("[WORKER{}] cannot start: {}", id, e);
                            return None;
                        }
                    };
                    log::info!("[WORKER{}] GoGoGo!", id);
                    let worker = Worker::new(id, store, search, sink, running)
                        .with_idle_interval(setup.idle_interval);
                    match worker.run() {
                        Ok(summary) => Some(summary),
                        Err(e) => {
                            log::error!("[WORKER{}] stopped: {}", id, e);
                            None
                        }
                    }
                });

            match handle {
                Ok(handle) => {
                    self.handles.push(handle);
                    self.counters.push(counter);
                }
                Err(e) => log::error!("could not spawn worker {}: {}", id, e),
            }
        }
        drop(ready_tx);

        let ready = ready_rx.iter().filter(|ok| *ok).count();
        drop(gate_tx);

        if ready == 0 {
            self.stop();
            return Err(MinerError::WorkerError(format!(
                "none of {} worker(s) could start",
                workers
            )));
        }
        if ready < workers {
            log::warn!("only {} of {} workers started", ready, workers);
        }
        Ok(ready)
    }

    /// Collision counters of the spawned workers, for reporting
    pub fn collision_counters(&self) -> Vec<Arc<AtomicU64>> {
        self.counters.clone()
    }

    /// Asks all workers to stop after their current round
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Waits for every worker and returns the summaries of those that ran
    pub fn join(&mut self) -> Vec<WorkerSummary> {
        self.handles
            .drain(..)
            .filter_map(|handle| handle.join().ok().flatten())
            .collect()
    }
}

/// Acquires a worker's table and accelerator
fn prepare_search(id: usize, setup: &WorkerSetup) -> Result<CollisionSearch, MinerError> {
    let table = CollisionTable::allocate(setup.table_bits)?;
    let mut hasher = (setup.hasher_factory)(id);
    hasher.initialize()?;
    Ok(CollisionSearch::new(
        id,
        table,
        hasher,
        Arc::clone(&setup.primitive),
    ))
}

fn wait_for_gate(gate: &Receiver<()>) {
    // Only returns once the scheduler drops the sender
    while gate.recv().is_ok() {}
}
