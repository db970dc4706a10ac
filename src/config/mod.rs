// src/config/mod.rs
//! Configuration management for the Momentum pool miner
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files
//! - Validating thread counts and collision table sizes
//! - Generating configuration templates
//!
//! The configuration uses TOML format.

/// Core configuration implementation
///
/// Contains the [`Config`] struct that defines the miner's configuration
/// structure and behavior.
pub mod config;

// Re-export key items for easy access
pub use config::{Config, MAX_WORKER_THREADS};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads and validates miner configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    let config = Config::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Generates a commented configuration template
///
/// # Arguments
/// * `user` - Payout address to put in the pool section
///
/// # Returns
/// String containing a ready-to-use TOML configuration template
pub fn generate_template(user: &str) -> String {
    Config::generate_template(user)
}
