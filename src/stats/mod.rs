//! Statistics collection and reporting module
//!
//! This module provides functionality for tracking and reporting mining statistics,
//! including:
//! - Per-connection share results (valid, rejected, stale)
//! - Collision rate across all workers
//! - Hardware monitoring (CPU, memory, temperature)
//!
//! [`SessionStats`] is owned by the pool session; [`StatsReporter`] runs on its
//! own thread and only reads the workers' atomic counters.

/// Submodule containing the statistics reporter implementation
pub mod reporter;

// Re-export main components
pub use reporter::{
    HardwareStats, MiningStats, SessionStats, ShareResult, StatsReporter, sleep_while_running,
    total_collisions,
};
