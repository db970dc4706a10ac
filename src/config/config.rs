// src/config/config.rs
use crate::{
    miner::{
        algorithm::INDEX_BITS,
        collision::{MAX_TABLE_BITS, MIN_TABLE_BITS},
    },
    network::pool::PoolConfig,
    types::HashMode,
    utils::error::MinerError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest worker count the pool protocol and the time schedule support
pub const MAX_WORKER_THREADS: usize = 64;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to configure mining operations:
/// worker count, collision table size, digest implementation and the
/// pool to mine on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of worker threads to use for mining
    /// (default: number of CPU cores)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Collision table exponent; each worker holds 2^bits * 4 bytes
    /// (default: 27, 512 MiB per worker)
    #[serde(default = "default_table_bits")]
    pub table_bits: u32,

    /// Digest implementation ("portable" or "compress")
    #[serde(default)]
    pub hash_mode: HashMode,

    /// log2 of the nonces hashed per round (default: 26, the full space)
    #[serde(default = "default_nonce_bits")]
    pub nonce_bits: u32,

    /// Seconds between collision-rate reports
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Pool connection settings
    pub pool: PoolConfig,
}

fn default_worker_threads() -> usize {
    num_cpus::get().clamp(1, MAX_WORKER_THREADS)
}

fn default_table_bits() -> u32 {
    27
}

fn default_nonce_bits() -> u32 {
    INDEX_BITS
}

fn default_stats_interval() -> u64 {
    60
}

impl Config {
    /// Default configuration mining for `user` on the default pool
    pub fn for_user(user: impl Into<String>) -> Self {
        Config {
            worker_threads: default_worker_threads(),
            table_bits: default_table_bits(),
            hash_mode: HashMode::default(),
            nonce_bits: default_nonce_bits(),
            stats_interval_secs: default_stats_interval(),
            pool: PoolConfig::for_user(user),
        }
    }

    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&config_str)
    }

    /// Parses TOML text without validating it
    pub fn parse(text: &str) -> Result<Self, MinerError> {
        Ok(toml::from_str(text)?)
    }

    /// Checks every setting against the ranges the miner supports
    ///
    /// # Errors
    /// `ConfigError` naming the first offending setting
    pub fn validate(&self) -> Result<(), MinerError> {
        if !(1..=MAX_WORKER_THREADS).contains(&self.worker_threads) {
            return Err(MinerError::ConfigError(format!(
                "worker_threads must be within 1..={}, got {}",
                MAX_WORKER_THREADS, self.worker_threads
            )));
        }
        if !(MIN_TABLE_BITS..=MAX_TABLE_BITS).contains(&self.table_bits) {
            return Err(MinerError::ConfigError(format!(
                "table_bits must be within {}..={}, got {}",
                MIN_TABLE_BITS, MAX_TABLE_BITS, self.table_bits
            )));
        }
        if !(3..=INDEX_BITS).contains(&self.nonce_bits) {
            return Err(MinerError::ConfigError(format!(
                "nonce_bits must be within 3..={}, got {}",
                INDEX_BITS, self.nonce_bits
            )));
        }
        if self.pool.user.is_empty() || self.pool.user.len() > 255 {
            return Err(MinerError::ConfigError(format!(
                "pool user must be 1..=255 bytes, got {}",
                self.pool.user.len()
            )));
        }
        self.pool.endpoint()?;
        Ok(())
    }

    /// Generates a configuration template string
    ///
    /// # Arguments
    /// * `user` - Payout address written into the pool section
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template(user: &str) -> String {
        let mut template = String::new();
        template.push_str("# ptsminer-rs configuration\n\n");
        template.push_str("# Number of worker threads (1-64)\n");
        template.push_str(&format!("worker_threads = {}\n", default_worker_threads()));
        template.push_str("# Collision table size per worker: 2^bits * 4 bytes\n");
        template.push_str("# 20 -> 4 MiB, 25 -> 128 MiB, 27 -> 512 MiB, 30 -> 4 GiB\n");
        template.push_str(&format!("table_bits = {}\n", default_table_bits()));
        template.push_str("# Digest implementation: portable, compress\n");
        template.push_str(&format!("hash_mode = \"{}\"\n", HashMode::default()));
        template.push_str("# Seconds between collision-rate reports\n");
        template.push_str(&format!(
            "stats_interval_secs = {}\n\n",
            default_stats_interval()
        ));

        template.push_str("# Pool mining configuration\n");
        template.push_str("[pool]\n");
        template.push_str(&format!("url = \"{}\"\n", crate::network::pool::DEFAULT_POOL_URL));
        template.push_str(&format!("user = \"{}\"\n", user));
        template.push_str("password = \"blabla\"\n");
        template.push_str("fee = 0\n");
        template.push_str("miner_id = 0\n");
        template.push_str("reconnect_delay_secs = 10\n");

        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse("[pool]\nuser = \"Pabc\"\n").unwrap();
        assert_eq!(config.table_bits, 27);
        assert_eq!(config.nonce_bits, INDEX_BITS);
        assert_eq!(config.hash_mode, HashMode::Compress);
        assert_eq!(config.pool.password, "blabla");
        assert_eq!(config.pool.reconnect_delay_secs, 10);
        assert!(config.worker_threads >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_generated_template_round_trips() {
        let config = Config::parse(&Config::generate_template("Pxyz")).unwrap();
        assert_eq!(config.pool.user, "Pxyz");
        config.validate().unwrap();
    }

    #[test]
    fn test_out_of_range_table_bits() {
        let mut config = Config::for_user("P");
        config.table_bits = 31;
        assert!(matches!(config.validate(), Err(MinerError::ConfigError(_))));
        config.table_bits = 19;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_thread_limits() {
        let mut config = Config::for_user("P");
        config.worker_threads = 0;
        assert!(config.validate().is_err());
        config.worker_threads = 65;
        assert!(config.validate().is_err());
        config.worker_threads = 64;
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_user_rejected() {
        assert!(Config::for_user("").validate().is_err());
    }

    #[test]
    fn test_hash_mode_aliases() {
        let config = Config::parse("hash_mode = \"portable\"\n[pool]\nuser = \"P\"\n").unwrap();
        assert_eq!(config.hash_mode, HashMode::Portable);
        assert!(Config::parse("hash_mode = \"gpu\"\n[pool]\nuser = \"P\"\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/ptsminer.toml"),
            Err(MinerError::ConfigError(_))
        ));
    }
}
