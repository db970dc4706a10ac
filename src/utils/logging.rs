// src/utils/logging.rs
//! Logging configuration
//!
//! Sets up `env_logger` with the miner's line format. Worker and master
//! threads are named, so the thread name is part of every line.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging for normal mining
///
/// Info level by default; `RUST_LOG` overrides it when set.
pub fn init_logging() {
    let mut builder = common_log_config();
    builder.filter_level(LevelFilter::Info);
    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    // A second init (tests, benchmark after start) is harmless
    let _ = builder.try_init();
}

/// Initializes logging for benchmark runs (Debug unless `RUST_LOG` is set)
pub fn init_bench_logging() {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.parse_env("RUST_LOG");
    }

    let _ = builder.try_init();
}

/// Base builder: `[ts level thread module:line] message` on stdout
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_seconds();
            let level = record.level();
            let thread = std::thread::current();
            let module = record.module_path().unwrap_or_default();
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "[{} {} {} {}:{}] {}",
                ts,
                level,
                thread.name().unwrap_or("-"),
                module,
                line,
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
