// src/network/mod.rs
//! Network communication components
//!
//! This module handles the connection to the mining pool:
//! - `protocol`: the binary message formats exchanged with the pool
//! - `pool`: the reconnecting session and the share link used by workers

/// Pool wire protocol
///
/// Hello, template, share result and share submission framing.
pub mod protocol;

/// Mining pool client implementation
///
/// Manages the TCP connection lifecycle, template distribution and share
/// submission.
pub mod pool;

// Re-export main components for cleaner imports
pub use pool::{PoolConfig, PoolLink, PoolSession};
pub use protocol::{Hello, ServerMessage};
