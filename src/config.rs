//! Scheduler configuration.
//!
//! [`SchedulerConfig`] can be built directly or assembled by a
//! [`ConfigLoader`] from layered sources. Precedence, lowest first:
//!
//! 1. Defaults
//! 2. TOML file (requires the `config-file` feature)
//! 3. Environment variables prefixed `TICKLESS_`
//! 4. Programmatic overrides
//!
//! Override keys use the environment variable names:
//!
//! | Key | Value |
//! |-----|-------|
//! | `TICKLESS_PENDING_POLICY` | `drop` or `drain` |
//! | `TICKLESS_THREAD_NAME` | dispatcher thread name |
//! | `TICKLESS_SHUTDOWN_TIMEOUT_MS` | milliseconds, or `none` |
//! | `TICKLESS_EXECUTION` | `inline` or `pool` |
//! | `TICKLESS_POOL_WORKERS` | worker count |
//! | `TICKLESS_POOL_QUEUE_CAPACITY` | bounded queue length |
//! | `TICKLESS_POOL_BACKPRESSURE` | `block` or `reject` |
//! | `TICKLESS_POOL_THREAD_NAME` | worker thread name prefix |
//!
//! Setting any `TICKLESS_POOL_*` key selects pool execution. Unknown keys
//! with the prefix are an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "config-file")]
use std::path::{Path, PathBuf};

/// Prefix shared by every environment and override key.
pub const ENV_PREFIX: &str = "TICKLESS_";

const DEFAULT_DISPATCHER_NAME: &str = "tickless-dispatcher";
const DEFAULT_WORKER_NAME: &str = "tickless-worker";
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What happens to tasks still pending when the scheduler shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPolicy {
    /// Discard pending tasks without running them.
    #[default]
    Drop,
    /// Run every pending task immediately, in deadline order, then stop.
    Drain,
}

impl FromStr for PendingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "drain" => Ok(Self::Drain),
            other => Err(format!("unknown pending policy: {other}")),
        }
    }
}

/// What a full pool queue does to a new job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Wait until a worker frees a slot.
    #[default]
    Block,
    /// Fail immediately with `ExecutorError::Saturated`.
    Reject,
}

impl FromStr for Backpressure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown backpressure policy: {other}")),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Number of worker threads. Fixed for the pool's lifetime.
    pub workers: usize,
    /// Maximum number of queued, not yet running, jobs.
    pub queue_capacity: usize,
    /// Behavior when the queue is full.
    pub backpressure: Backpressure,
    /// Worker thread name prefix; workers are named `{prefix}-{index}`.
    pub thread_name: String,
}

impl PoolConfig {
    /// Pool with `workers` threads and default settings otherwise.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the backpressure policy.
    #[must_use]
    pub const fn backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Checks the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        validate_thread_name(&self.thread_name)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: available_parallelism(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: Backpressure::Block,
            thread_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

/// Where fired actions run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// On the dispatcher thread. A slow action delays every later task.
    #[default]
    Inline,
    /// On a bounded worker pool.
    Pool(PoolConfig),
}

impl ExecutionMode {
    /// Returns the pool settings, if pool execution is selected.
    #[must_use]
    pub const fn pool(&self) -> Option<&PoolConfig> {
        match self {
            Self::Inline => None,
            Self::Pool(pool) => Some(pool),
        }
    }

    fn pool_mut(&mut self) -> &mut PoolConfig {
        match self {
            Self::Pool(pool) => pool,
            Self::Inline => {
                *self = Self::Pool(PoolConfig::default());
                self.pool_mut()
            }
        }
    }
}

/// Complete scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Fate of pending tasks at shutdown.
    pub pending_policy: PendingPolicy,
    /// Where fired actions run.
    pub execution: ExecutionMode,
    /// Dispatcher thread name.
    pub thread_name: String,
    /// How long `shutdown` waits for the dispatcher to exit. `None` waits
    /// indefinitely.
    pub shutdown_timeout: Option<Duration>,
}

impl SchedulerConfig {
    /// Checks the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_thread_name(&self.thread_name)?;
        if let ExecutionMode::Pool(pool) = &self.execution {
            pool.validate()?;
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pending_policy: PendingPolicy::Drop,
            execution: ExecutionMode::Inline,
            thread_name: DEFAULT_DISPATCHER_NAME.to_string(),
            shutdown_timeout: None,
        }
    }
}

/// Configuration loader with layered sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    #[cfg(feature = "config-file")]
    file_path: Option<PathBuf>,
    skip_env: bool,
    overrides: BTreeMap<String, String>,
}

impl ConfigLoader {
    /// Creates a loader that reads only the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a TOML file to load.
    #[cfg(feature = "config-file")]
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Ignores `TICKLESS_*` environment variables.
    #[must_use]
    pub const fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Adds a programmatic override (highest precedence).
    #[must_use]
    pub fn override_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> Result<SchedulerConfig, ConfigError> {
        if self.skip_env {
            self.load_with_env(std::iter::empty())
        } else {
            self.load_with_env(std::env::vars())
        }
    }

    /// Like [`load`](Self::load), reading environment variables from `vars`
    /// instead of the process environment.
    pub fn load_with_env<I>(&self, vars: I) -> Result<SchedulerConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        #[cfg(feature = "config-file")]
        let mut config = match &self.file_path {
            Some(path) => load_from_file(path)?,
            None => SchedulerConfig::default(),
        };
        #[cfg(not(feature = "config-file"))]
        let mut config = SchedulerConfig::default();

        let env: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        apply_overrides(&mut config, &env)?;
        apply_overrides(&mut config, &self.overrides)?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error while reading configuration.
    Io(std::io::Error),
    /// Parse error.
    Parse(String),
    /// Unknown override key.
    InvalidOverride(String),
    /// Pool with zero workers.
    ZeroWorkers,
    /// Pool with zero queue capacity.
    ZeroQueueCapacity,
    /// Thread name empty or containing a NUL byte.
    InvalidThreadName(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "config I/O error: {err}"),
            Self::Parse(err) => write!(f, "config parse error: {err}"),
            Self::InvalidOverride(key) => write!(f, "invalid override: {key}"),
            Self::ZeroWorkers => write!(f, "pool workers must be > 0"),
            Self::ZeroQueueCapacity => write!(f, "pool queue_capacity must be > 0"),
            Self::InvalidThreadName(name) => write!(f, "invalid thread name: {name:?}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .max(1)
}

fn validate_thread_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains('\0') {
        return Err(ConfigError::InvalidThreadName(name.to_string()));
    }
    Ok(())
}

#[cfg(feature = "config-file")]
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    pending_policy: Option<PendingPolicy>,
    thread_name: Option<String>,
    shutdown_timeout_ms: Option<u64>,
    pool: Option<PoolConfig>,
}

#[cfg(feature = "config-file")]
fn load_from_file(path: &Path) -> Result<SchedulerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

#[cfg(feature = "config-file")]
fn parse_config(contents: &str) -> Result<SchedulerConfig, ConfigError> {
    let file: FileConfig =
        toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
    let mut config = SchedulerConfig::default();
    if let Some(policy) = file.pending_policy {
        config.pending_policy = policy;
    }
    if let Some(name) = file.thread_name {
        config.thread_name = name;
    }
    config.shutdown_timeout = file.shutdown_timeout_ms.map(Duration::from_millis);
    if let Some(pool) = file.pool {
        config.execution = ExecutionMode::Pool(pool);
    }
    Ok(config)
}

fn apply_overrides(
    config: &mut SchedulerConfig,
    overrides: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for (key, value) in overrides {
        apply_override(config, key, value)?;
    }
    Ok(())
}

fn apply_override(config: &mut SchedulerConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "TICKLESS_PENDING_POLICY" => {
            config.pending_policy = parse_enum(value, key)?;
        }
        "TICKLESS_THREAD_NAME" => {
            config.thread_name = value.to_string();
        }
        "TICKLESS_SHUTDOWN_TIMEOUT_MS" => {
            config.shutdown_timeout = if value.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(Duration::from_millis(parse_u64(value, key)?))
            };
        }
        "TICKLESS_EXECUTION" => match value.to_ascii_lowercase().as_str() {
            "inline" => config.execution = ExecutionMode::Inline,
            "pool" => {
                config.execution.pool_mut();
            }
            _ => {
                return Err(ConfigError::Parse(format!(
                    "invalid execution mode for {key}: {value}"
                )));
            }
        },
        "TICKLESS_POOL_WORKERS" => {
            config.execution.pool_mut().workers = parse_usize(value, key)?;
        }
        "TICKLESS_POOL_QUEUE_CAPACITY" => {
            config.execution.pool_mut().queue_capacity = parse_usize(value, key)?;
        }
        "TICKLESS_POOL_BACKPRESSURE" => {
            config.execution.pool_mut().backpressure = parse_enum(value, key)?;
        }
        "TICKLESS_POOL_THREAD_NAME" => {
            config.execution.pool_mut().thread_name = value.to_string();
        }
        _ => return Err(ConfigError::InvalidOverride(key.to_string())),
    }
    Ok(())
}

fn parse_usize(value: &str, key: &str) -> Result<usize, ConfigError> {
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Parse(format!("invalid usize for {key}: {value}")))
}

fn parse_u64(value: &str, key: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Parse(format!("invalid u64 for {key}: {value}")))
}

fn parse_enum<T: FromStr<Err = String>>(value: &str, key: &str) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|err| ConfigError::Parse(format!("{key}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pending_policy, PendingPolicy::Drop);
        assert_eq!(config.execution, ExecutionMode::Inline);
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn env_layer_applies_prefixed_keys_only() {
        let config = ConfigLoader::new()
            .load_with_env(env(&[
                ("TICKLESS_PENDING_POLICY", "drain"),
                ("TICKLESS_SHUTDOWN_TIMEOUT_MS", "250"),
                ("HOME", "/root"),
            ]))
            .unwrap();
        assert_eq!(config.pending_policy, PendingPolicy::Drain);
        assert_eq!(config.shutdown_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn override_beats_env() {
        let config = ConfigLoader::new()
            .override_value("TICKLESS_PENDING_POLICY", "drop")
            .load_with_env(env(&[("TICKLESS_PENDING_POLICY", "drain")]))
            .unwrap();
        assert_eq!(config.pending_policy, PendingPolicy::Drop);
    }

    #[test]
    fn pool_keys_select_pool_execution() {
        let config = ConfigLoader::new()
            .without_env()
            .override_value("TICKLESS_POOL_WORKERS", "3")
            .override_value("TICKLESS_POOL_BACKPRESSURE", "reject")
            .load()
            .unwrap();
        let pool = config.execution.pool().unwrap();
        assert_eq!(pool.workers, 3);
        assert_eq!(pool.backpressure, Backpressure::Reject);
        assert_eq!(pool.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = ConfigLoader::new()
            .load_with_env(env(&[("TICKLESS_BOGUS", "1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride(ref k) if k == "TICKLESS_BOGUS"));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = ConfigLoader::new()
            .without_env()
            .override_value("TICKLESS_POOL_WORKERS", "many")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");

        let err = ConfigLoader::new()
            .without_env()
            .override_value("TICKLESS_POOL_WORKERS", "0")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWorkers));

        let err = ConfigLoader::new()
            .without_env()
            .override_value("TICKLESS_THREAD_NAME", "")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreadName(_)));
    }

    #[test]
    fn config_error_converts_to_crate_error() {
        let err: crate::Error = ConfigError::ZeroQueueCapacity.into();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_file_layer() {
        let config = parse_config(
            r#"
            pending_policy = "drain"
            thread_name = "timers"
            shutdown_timeout_ms = 100

            [pool]
            workers = 2
            backpressure = "reject"
            "#,
        )
        .unwrap();
        assert_eq!(config.pending_policy, PendingPolicy::Drain);
        assert_eq!(config.thread_name, "timers");
        let pool = config.execution.pool().unwrap();
        assert_eq!(pool.workers, 2);
        assert_eq!(pool.backpressure, Backpressure::Reject);
        assert_eq!(pool.thread_name, DEFAULT_WORKER_NAME);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_unknown_field_is_rejected() {
        let err = parse_config("tick_rate = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn loader_reads_file_then_overrides() {
        use std::io::Write as _;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pending_policy = \"drain\"").unwrap();
        let config = ConfigLoader::new()
            .without_env()
            .file(file.path())
            .override_value("TICKLESS_THREAD_NAME", "override")
            .load()
            .unwrap();
        assert_eq!(config.pending_policy, PendingPolicy::Drain);
        assert_eq!(config.thread_name, "override");
    }
}
