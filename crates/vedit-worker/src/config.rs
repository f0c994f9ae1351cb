//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vedit_media::DEFAULT_REFRAME_SCRIPTS;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for staged files
    pub work_dir: PathBuf,
    /// Directory artifacts are published into
    pub output_dir: PathBuf,
    /// Wall-clock bound for one job, end to end
    pub job_timeout: Duration,
    /// Bound for stream-copy engine runs and probes
    pub copy_timeout: Duration,
    /// Bound for a reframe run
    pub reframe_timeout: Duration,
    /// Idle bound while downloading inputs
    pub download_timeout: Duration,
    /// Executors per process, each running one job at a time
    pub instances: usize,
    /// How often each executor scans for orphaned pending items
    pub claim_interval: Duration,
    /// Minimum idle time before a pending item can be claimed (crash recovery).
    /// Must exceed `job_timeout` so live jobs are never taken over.
    pub claim_min_idle: Duration,
    /// How long one queue read blocks
    pub block: Duration,
    /// Reframe scripts probed in order
    pub reframe_scripts: Vec<PathBuf>,
    /// Port for the Prometheus listener, if any
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/vedit"),
            output_dir: PathBuf::from("/app/processed"),
            job_timeout: Duration::from_secs(3600), // 1 hour
            copy_timeout: Duration::from_secs(300),
            reframe_timeout: Duration::from_secs(600),
            download_timeout: Duration::from_secs(60),
            instances: 1,
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(3900),
            block: Duration::from_millis(1000),
            reframe_scripts: DEFAULT_REFRAME_SCRIPTS.iter().map(PathBuf::from).collect(),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            job_timeout: env_secs("WORKER_JOB_TIMEOUT").unwrap_or(defaults.job_timeout),
            copy_timeout: env_secs("WORKER_COPY_TIMEOUT").unwrap_or(defaults.copy_timeout),
            reframe_timeout: env_secs("WORKER_REFRAME_TIMEOUT").unwrap_or(defaults.reframe_timeout),
            download_timeout: env_secs("DOWNLOAD_TIMEOUT").unwrap_or(defaults.download_timeout),
            instances: env_parse::<usize>("WORKER_INSTANCES")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.instances),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS")
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS")
                .unwrap_or(defaults.claim_min_idle),
            block: env_parse::<u64>("WORKER_BLOCK_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.block),
            reframe_scripts: std::env::var("REFRAME_SCRIPTS")
                .map(|v| parse_script_list(&v))
                .unwrap_or(defaults.reframe_scripts),
            metrics_port: env_parse("WORKER_METRICS_PORT"),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

/// Comma-separated paths; blanks are skipped.
fn parse_script_list(value: &str) -> Vec<PathBuf> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}
