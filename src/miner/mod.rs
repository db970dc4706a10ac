// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the Momentum search:
//! - Digest primitives and batch hashers
//! - The birthday collision table and per-worker search engine
//! - The shared template store and its time schedule
//! - Worker thread management

/// Digest primitives and batch hashers
///
/// SHA-256d for commitments and proofs of work, SHA-512 for birthdays.
pub mod algorithm;

/// Birthday collision detection
///
/// Tagged bucket table plus revalidation of every hit.
pub mod collision;

/// Worker orchestration
///
/// Spawns workers behind a startup gate and stops them on request.
pub mod scheduler;

/// Template store shared between the pool session and the workers
pub mod template;

/// Worker thread implementation
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::{BatchHasher, HashPrimitive, create_hash_primitive};
pub use self::collision::{CollisionSearch, CollisionTable, RoundOutcome, ShareSink};
pub use self::scheduler::{HasherFactory, Scheduler, WorkerSetup};
pub use self::template::{BlockTemplate, BlockTemplateStore};
pub use self::worker::{Worker, WorkerSummary};
