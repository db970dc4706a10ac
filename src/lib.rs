//! ptsminer-rs - Momentum proof-of-work pool miner in Rust
//!
//! This crate provides a birthday-collision miner for the Momentum scheme with:
//! - A per-worker tagged collision table with full revalidation of hits
//! - A lock-free template store shared by all search threads
//! - The binary pool protocol with automatic reconnects
//! - Offline benchmarking and periodic statistics

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation including digests, collision search and scheduling
pub mod miner;

/// Network communication components for the pool connection
pub mod network;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{BlockTemplateStore, CollisionSearch, CollisionTable, Scheduler, Worker};
pub use network::{PoolConfig, PoolLink, PoolSession};
pub use stats::{SessionStats, ShareResult, StatsReporter};
pub use types::{BlockHeader, HashMode};
pub use utils::{MinerError, init_logging};
