// src/main.rs
use clap::Parser;
use crossbeam_channel::unbounded;
use ptsminer_rs::miner::algorithm::cpu::CpuBatchHasher;
use ptsminer_rs::miner::{
    BatchHasher, HashPrimitive, HasherFactory, RoundOutcome, WorkerSetup, create_hash_primitive,
};
use ptsminer_rs::utils::logging::init_bench_logging;
use ptsminer_rs::{self, *};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Main entry point for the pool miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Starts mining with the given configuration options
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads and validates configuration, applying CLI overrides
/// 3. Installs the Ctrl+C handler
/// 4. Starts the workers behind their startup gate
/// 5. Runs the pool session on this thread until shutdown
/// 6. Joins every worker
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let mut config = match (&opts.config, &opts.user) {
        (Some(path), _) => config::Config::load(path)?,
        (None, Some(user)) => config::Config::for_user(user.clone()),
        (None, None) => {
            return Err(MinerError::InputError(
                "either --config or --user is required".into(),
            ));
        }
    };
    // Apply CLI overrides
    if let Some(user) = opts.user {
        config.pool.user = user;
    }
    if let Some(pool) = opts.pool {
        config.pool.url = pool;
    }
    if let Some(workers) = opts.workers {
        config.worker_threads = workers;
    }
    if let Some(bits) = opts.table_bits {
        config.table_bits = bits;
    }
    if let Some(mode) = opts.mode {
        config.hash_mode = mode;
    }
    config.validate()?;

    let running = Arc::new(AtomicBool::new(true));
    let store = Arc::new(BlockTemplateStore::new(config.worker_threads));
    let link = PoolLink::new();
    {
        let running = Arc::clone(&running);
        let link = link.clone();
        ctrlc::set_handler(move || {
            log::info!("[MASTER] shutdown requested");
            running.store(false, Ordering::SeqCst);
            link.shutdown();
        })?;
    }

    let primitive = create_hash_primitive(config.hash_mode);
    log::info!(
        "using {} digest, collision table 2^{} per worker",
        primitive.mode(),
        config.table_bits
    );
    let setup = worker_setup(&config, primitive);

    let mut scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&running));
    if let Err(e) = scheduler.start_mining(config.worker_threads, setup, Arc::new(link.clone())) {
        log::error!("[MASTER] no worker could start, aborting: {}", e);
        return Err(e);
    }

    let reporter = StatsReporter::new(
        scheduler.collision_counters(),
        Duration::from_secs(config.stats_interval_secs),
    );
    let stats_handle = reporter.start_reporting(Arc::clone(&running))?;

    let session = PoolSession::new(
        config.pool.clone(),
        config.worker_threads,
        store,
        link,
        Arc::clone(&running),
    );
    let result = session.and_then(|session| {
        session
            .with_collision_counters(scheduler.collision_counters())
            .run()
    });

    scheduler.stop();
    let summaries = scheduler.join();
    let _ = stats_handle.join();

    let collisions: u64 = summaries.iter().map(|s| s.collisions).sum();
    let shares: u64 = summaries.iter().map(|s| s.shares).sum();
    log::info!(
        "[MASTER] {} worker(s) stopped: {} collisions, {} shares",
        summaries.len(),
        collisions,
        shares
    );
    result
}

/// Per-worker resources for the configured CPU search
fn worker_setup(config: &config::Config, primitive: Arc<dyn HashPrimitive>) -> WorkerSetup {
    let nonce_bits = config.nonce_bits;
    let hasher_primitive = Arc::clone(&primitive);
    let hasher_factory: HasherFactory = Arc::new(move |_id: usize| {
        Box::new(CpuBatchHasher::new(Arc::clone(&hasher_primitive), nonce_bits))
            as Box<dyn BatchHasher>
    });

    WorkerSetup {
        table_bits: config.table_bits,
        primitive,
        hasher_factory,
        idle_interval: miner::worker::IDLE_INTERVAL,
    }
}

/// Runs offline search rounds against a synthetic header
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Publishes a header whose share target accepts every collision
/// 3. Spawns the requested threads, each running its own rounds
/// 4. Reports collision and candidate throughput
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();
    if opts.threads == 0 || opts.rounds == 0 {
        return Err(MinerError::InputError(
            "benchmark needs at least one thread and one round".into(),
        ));
    }

    let primitive = create_hash_primitive(opts.mode);
    let store = Arc::new(BlockTemplateStore::new(opts.threads));
    store.publish(benchmark_header());
    let (share_sender, share_receiver) = unbounded::<BlockHeader>();

    log::info!(
        "Starting {} benchmark: {} thread(s) x {} round(s), 2^{} nonces, table 2^{}",
        opts.mode,
        opts.threads,
        opts.rounds,
        opts.nonce_bits,
        opts.table_bits
    );

    let start_time = Instant::now();
    let handles: Vec<_> = (0..opts.threads)
        .map(|id| {
            let primitive = Arc::clone(&primitive);
            let store = Arc::clone(&store);
            let sink = share_sender.clone();
            let (rounds, table_bits, nonce_bits) = (opts.rounds, opts.table_bits, opts.nonce_bits);

            thread::spawn(move || -> Result<RoundOutcome, MinerError> {
                let table = CollisionTable::allocate(table_bits)?;
                let mut hasher = CpuBatchHasher::new(Arc::clone(&primitive), nonce_bits);
                hasher.initialize()?;
                let mut search = CollisionSearch::new(id, table, Box::new(hasher), primitive);

                let mut totals = RoundOutcome::default();
                let mut last_time = 0;
                for counter in 0..rounds {
                    let Some(header) = store.get_block(id as u32, last_time, counter as u32) else {
                        break;
                    };
                    last_time = header.time;
                    let round_start = Instant::now();
                    let outcome = search.search(&header, &sink)?;
                    log::debug!(
                        "Thread {}: round {} in {:.2}s, {} collisions",
                        id,
                        counter,
                        round_start.elapsed().as_secs_f64(),
                        outcome.collisions
                    );
                    totals += outcome;
                }
                Ok(totals)
            })
        })
        .collect();
    drop(share_sender);

    // Wait for all threads to complete
    let mut totals = RoundOutcome::default();
    for handle in handles {
        let outcome = handle
            .join()
            .map_err(|_| MinerError::WorkerError("benchmark thread panicked".into()))??;
        totals += outcome;
    }
    let elapsed = start_time.elapsed().as_secs_f64();
    let shares = share_receiver.try_iter().count();

    // Report final results
    log::info!("Benchmark results:");
    log::info!("Candidates: {} ({:.0}/s)", totals.candidates, totals.candidates as f64 / elapsed);
    log::info!(
        "Collisions: {} ({:.2} c/m), false positives: {}",
        totals.collisions,
        totals.collisions as f64 * 2.0 / (elapsed / 60.0),
        totals.false_positives
    );
    log::info!("Shares queued: {}", shares);
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Header with a fixed commitment and an all-ones share target
fn benchmark_header() -> BlockHeader {
    BlockHeader {
        version: 2,
        prev_hash: [0x5a; 32],
        merkle_root: [0xa5; 32],
        time: miner::template::unix_time(),
        bits: 0x1d00_ffff,
        nonce: 0,
        target_share: [0xff; 32],
        ..BlockHeader::default()
    }
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let config = config::generate_template(&opts.user);
    std::fs::write(opts.output, config)?;
    Ok(())
}
