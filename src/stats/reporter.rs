// src/stats/reporter.rs
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use sysinfo::{Components, System};

/// Outcome of a submitted share as reported by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareResult {
    /// Submitted against an outdated template
    Stale,
    /// The share was rejected (likely invalid)
    Rejected,
    /// The share solved a block
    Block,
    /// The share was accepted as valid
    Share,
}

impl ShareResult {
    /// True for results that reset the reject streak
    pub fn is_accepted(self) -> bool {
        matches!(self, ShareResult::Block | ShareResult::Share)
    }
}

impl std::fmt::Display for ShareResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ShareResult::Stale => "STALE",
            ShareResult::Rejected => "REJECTED",
            ShareResult::Block => "BLOCK",
            ShareResult::Share => "SHARE",
        };
        f.write_str(label)
    }
}

/// Share results of the current pool connection
///
/// Owned by the pool session and reset on every successful connect.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Results received for outdated work
    pub stale: u64,
    /// Rejected shares
    pub rejected: u64,
    /// Shares that solved a block
    pub blocks: u64,
    /// Accepted shares
    pub shares: u64,
    started: Instant,
    collision_baseline: u64,
}

impl SessionStats {
    /// Empty statistics starting now
    pub fn new() -> Self {
        SessionStats {
            stale: 0,
            rejected: 0,
            blocks: 0,
            shares: 0,
            started: Instant::now(),
            collision_baseline: 0,
        }
    }

    /// Clears the counters and restarts the clock
    ///
    /// `collisions_now` is the current collision total; rates are computed
    /// from it onwards.
    pub fn reset(&mut self, collisions_now: u64) {
        *self = SessionStats {
            collision_baseline: collisions_now,
            ..SessionStats::new()
        };
    }

    /// Counts one pool result
    pub fn record(&mut self, result: ShareResult) {
        match result {
            ShareResult::Stale => self.stale += 1,
            ShareResult::Rejected => self.rejected += 1,
            ShareResult::Block => self.blocks += 1,
            ShareResult::Share => self.shares += 1,
        }
    }

    /// Results received so far
    pub fn total(&self) -> u64 {
        self.stale + self.rejected + self.blocks + self.shares
    }

    /// Accepted results (shares and blocks)
    pub fn valid(&self) -> u64 {
        self.shares + self.blocks
    }

    /// One-line summary logged after every pool result
    ///
    /// # Arguments
    /// * `collisions_now` - Collision total across all workers
    /// * `submitted` - Shares written to the pool during this session
    pub fn summary_line(&self, collisions_now: u64, submitted: u64) -> String {
        self.summary_at(self.started.elapsed(), collisions_now, submitted)
    }

    fn summary_at(&self, elapsed: Duration, collisions_now: u64, submitted: u64) -> String {
        let mut line = String::from("[STATS] ");
        let seconds = elapsed.as_secs();
        if seconds > 0 {
            let minutes = seconds as f64 / 60.0;
            let collisions = collisions_now.saturating_sub(self.collision_baseline);
            line.push_str(&format!(
                "{:.1} c/m | {:.1} sh/m | ",
                collisions as f64 / minutes,
                submitted as f64 / minutes
            ));
        }

        let total = self.total();
        let percent = |n: u64| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64 * 100.0
            }
        };
        line.push_str(&format!(
            "VL: {} ({:.1}%), RJ: {} ({:.1}%), ST: {} ({:.1}%)",
            self.valid(),
            percent(self.valid()),
            self.rejected,
            percent(self.rejected),
            self.stale,
            percent(self.stale)
        ));
        line
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Collision throughput across all workers
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    /// Collisions found since the reporter started
    pub collisions_total: u64,
    /// Average collisions per minute since the reporter started
    pub collisions_per_minute: f64,
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently used on the host (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// Sums per-worker collision counters
pub fn total_collisions(counters: &[Arc<AtomicU64>]) -> u64 {
    counters.iter().map(|c| c.load(Ordering::Relaxed)).sum()
}

/// Periodically logs collision rate and hardware figures
pub struct StatsReporter {
    /// Per-worker collision counters
    counters: Vec<Arc<AtomicU64>>,
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
    /// Interval at which stats are reported
    report_interval: Duration,
    start_time: Instant,
}

impl StatsReporter {
    /// Creates a reporter over the given worker counters
    ///
    /// # Arguments
    /// * `counters` - Collision counters, one per worker
    /// * `report_interval` - How often to log statistics
    pub fn new(counters: Vec<Arc<AtomicU64>>, report_interval: Duration) -> Self {
        StatsReporter {
            counters,
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
            report_interval,
            start_time: Instant::now(),
        }
    }

    /// Gets the current collision statistics
    pub fn get_stats(&self) -> MiningStats {
        let minutes = self.start_time.elapsed().as_secs_f64() / 60.0;
        let collisions_total = total_collisions(&self.counters);
        MiningStats {
            collisions_total,
            collisions_per_minute: if minutes > 0.0 {
                collisions_total as f64 / minutes
            } else {
                0.0
            },
        }
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    pub fn get_hardware_stats(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }

    /// Starts the periodic reporting of statistics
    ///
    /// Spawns a background thread that logs at the configured interval
    /// until `running` is cleared.
    pub fn start_reporting(mut self, running: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("stats".into())
            .spawn(move || {
                while sleep_while_running(self.report_interval, &running) {
                    let mining_stats = self.get_stats();
                    let hw_stats = self.get_hardware_stats();

                    log::info!(
                        "Collisions: {} ({:.1} c/m) | CPU: {:.1}% | Mem: {} MiB | Temp: {:.1}°C",
                        mining_stats.collisions_total,
                        mining_stats.collisions_per_minute,
                        hw_stats.cpu_usage,
                        hw_stats.memory_used >> 20,
                        hw_stats.temperature
                    );
                }
            })
    }
}

/// Sleeps for `duration` in short slices; returns false if `running` was cleared
pub fn sleep_while_running(duration: Duration, running: &AtomicBool) -> bool {
    const SLICE: Duration = Duration::from_millis(100);
    let deadline = Instant::now() + duration;
    loop {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_without_results() {
        let stats = SessionStats::new();
        assert_eq!(
            stats.summary_at(Duration::ZERO, 0, 0),
            "[STATS] VL: 0 (0.0%), RJ: 0 (0.0%), ST: 0 (0.0%)"
        );
    }

    #[test]
    fn test_summary_rates_and_percentages() {
        let mut stats = SessionStats::new();
        stats.reset(100);
        for result in [
            ShareResult::Share,
            ShareResult::Share,
            ShareResult::Block,
            ShareResult::Rejected,
        ] {
            stats.record(result);
        }

        let line = stats.summary_at(Duration::from_secs(120), 160, 6);
        assert_eq!(
            line,
            "[STATS] 30.0 c/m | 3.0 sh/m | VL: 3 (75.0%), RJ: 1 (25.0%), ST: 0 (0.0%)"
        );
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut stats = SessionStats::new();
        stats.record(ShareResult::Stale);
        stats.record(ShareResult::Rejected);
        stats.reset(0);
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_acceptance() {
        assert!(ShareResult::Share.is_accepted());
        assert!(ShareResult::Block.is_accepted());
        assert!(!ShareResult::Rejected.is_accepted());
        assert!(!ShareResult::Stale.is_accepted());
    }

    #[test]
    fn test_total_collisions() {
        let counters = vec![Arc::new(AtomicU64::new(4)), Arc::new(AtomicU64::new(6))];
        assert_eq!(total_collisions(&counters), 10);
    }

    #[test]
    fn test_sleep_stops_early_when_cleared() {
        let running = AtomicBool::new(false);
        let start = Instant::now();
        assert!(!sleep_while_running(Duration::from_secs(10), &running));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
