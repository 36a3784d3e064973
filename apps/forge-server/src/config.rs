use std::time::Duration;

use forge_core::util::{env_bool, env_u64};

/// Coordinator tunables, resolved from the environment once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Surface real error messages instead of the flattened
    /// `internal server error`.
    pub debug: bool,
    /// How long a `run_single_task` caller waits for the agent's report.
    pub single_timeout: Duration,
    /// Deadline the getTask long poll is held open for.
    pub long_loop_duration: Duration,
    /// Re-check cadence inside the long poll.
    pub task_wait_tick: Duration,
    /// Re-enqueue abandoned processing entries after terminal reports.
    pub sweep_on_report: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            single_timeout: Duration::from_secs(30),
            long_loop_duration: Duration::from_secs(10),
            task_wait_tick: Duration::from_secs(1),
            sweep_on_report: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            debug: env_bool("FORGE_DEBUG"),
            single_timeout: Duration::from_secs(env_u64("FORGE_SINGLE_TIMEOUT_SECS", 30)),
            long_loop_duration: Duration::from_secs(env_u64("FORGE_LONG_LOOP_SECS", 10)),
            task_wait_tick: Duration::from_millis(env_u64("FORGE_TASK_WAIT_TICK_MS", 1_000)),
            sweep_on_report: env_bool("FORGE_SWEEP_ON_REPORT"),
        }
    }
}
