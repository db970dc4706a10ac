// src/cli/commands.rs
use crate::types::HashMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ptsminer-rs - Momentum (birthday collision) pool miner
#[derive(Parser, Debug)]
#[command(name = "ptsminer-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining, run benchmarks, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Start mining on the configured pool
    Start(StartOptions),

    /// Run offline search rounds on a synthetic header
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file; without one, defaults are used
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Payout address (overrides config, required without one)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Pool address, e.g. tcp://host:port (overrides config)
    #[arg(short, long)]
    pub pool: Option<String>,

    /// Number of worker threads to use (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Collision table exponent, 20..=30 (overrides config)
    #[arg(short, long)]
    pub table_bits: Option<u32>,

    /// Digest implementation (overrides config)
    #[arg(short, long)]
    pub mode: Option<HashMode>,
}

/// Options for running search benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Search rounds per thread
    #[arg(short, long, default_value_t = 2)]
    pub rounds: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Collision table exponent
    #[arg(short = 'b', long, default_value_t = 26)]
    pub table_bits: u32,

    /// log2 of the nonces hashed per round
    #[arg(short, long, default_value_t = 26)]
    pub nonce_bits: u32,

    /// Digest implementation
    #[arg(short, long, value_enum, default_value_t = HashMode::Compress)]
    pub mode: HashMode,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,

    /// Payout address written into the template
    #[arg(short, long, default_value = "your_payout_address")]
    pub user: String,
}
