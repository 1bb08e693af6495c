//! Configuration types for stickerhub

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

/// One mebibyte
pub const MIB: u64 = 1024 * 1024;

/// Placeholder replaced by the source directory in batch renderer commands
pub const DIR_PLACEHOLDER: &str = "{dir}";
/// Placeholder replaced by a per-collection job name in batch renderer and cleanup commands
pub const JOB_PLACEHOLDER: &str = "{job}";
/// Placeholder replaced by the source file in per-item converter arguments
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced by the target file in per-item converter arguments
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Pipeline layout and sizing (hub directory, worker pool, archive ceiling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory holding one subdirectory per collection (default: "./hub")
    #[serde(default = "default_hub_dir")]
    pub hub_dir: PathBuf,

    /// Worker pool size shared by fetch and conversion (default: 5)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum total size of one archive part in bytes (default: 45 MiB)
    ///
    /// Chosen to stay under the 50 MiB single-file limit of the delivery channel.
    /// A single file larger than this still gets a part of its own.
    #[serde(default = "default_archive_ceiling")]
    pub archive_ceiling_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            hub_dir: default_hub_dir(),
            workers: default_workers(),
            archive_ceiling_bytes: default_archive_ceiling(),
        }
    }
}

/// How animated vector sources are rendered
///
/// Exactly one strategy is active; it is never auto-detected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum VectorStrategy {
    /// Run one renderer over the whole raw-source directory
    ///
    /// The renderer writes `<source-file>.gif` next to each vector source.
    Batch {
        /// Program and arguments; `{dir}` is replaced by the raw-source directory
        /// and `{job}` by a name unique to the collection
        command: Vec<String>,
    },
    /// Run one converter process per vector item
    PerItem {
        /// Converter executable
        program: PathBuf,
        /// Arguments; `{input}` and `{output}` are replaced per item
        args: Vec<String>,
    },
}

impl Default for VectorStrategy {
    fn default() -> Self {
        VectorStrategy::Batch {
            command: default_batch_command(),
        }
    }
}

/// External converter configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Animated vector rendering strategy (default: batch docker renderer)
    #[serde(default)]
    pub vector: VectorStrategy,

    /// Path to ffmpeg (searched in PATH if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Timeout for one per-item conversion (default: 120 seconds)
    #[serde(default = "default_item_timeout", with = "duration_serde")]
    pub item_timeout: Duration,

    /// Timeout for the batch vector renderer (default: 600 seconds)
    #[serde(default = "default_batch_timeout", with = "duration_serde")]
    pub batch_timeout: Duration,

    /// Frame duration of single-frame static image animations (default: 100ms)
    #[serde(default = "default_frame_delay_ms")]
    pub frame_delay_ms: u32,

    /// Command run after the batch renderer timed out (default: `docker kill {job}`)
    ///
    /// Killing the renderer process only stops the docker client; the container
    /// it started keeps writing into the raw-source area until this runs.
    /// Empty disables the cleanup.
    #[serde(default = "default_batch_cleanup")]
    pub batch_cleanup: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            vector: VectorStrategy::default(),
            ffmpeg_path: None,
            item_timeout: default_item_timeout(),
            batch_timeout: default_batch_timeout(),
            frame_delay_ms: default_frame_delay_ms(),
            batch_cleanup: default_batch_cleanup(),
        }
    }
}

/// Cache retention and the janitor sweep
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Run the janitor at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Collections older than this are evicted (default: 3 days)
    #[serde(default = "default_retention", with = "duration_serde")]
    pub retention: Duration,

    /// Time between sweeps (default: 10 minutes)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention: default_retention(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Remote origin (Bot API) endpoints and credentials
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OriginConfig {
    /// API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bot token
    #[serde(default)]
    pub token: Option<String>,

    /// Timeout for a single HTTP request (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Publication HTTP surface configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// Main configuration for StickerHub
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Hub directory, worker pool and archive ceiling
    #[serde(flatten)]
    pub pipeline: PipelineConfig,

    /// External converters
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Cache retention
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Remote origin
    #[serde(default)]
    pub origin: OriginConfig,

    /// Fetch retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Publication surface
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Hub directory
    pub fn hub_dir(&self) -> &PathBuf {
        &self.pipeline.hub_dir
    }

    /// Build a configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Recognized variables:
    ///
    /// | variable | meaning |
    /// |---|---|
    /// | `STICKERHUB_HUB_DIR` | hub directory |
    /// | `STICKERHUB_WORKERS` | worker pool size |
    /// | `STICKERHUB_ARCHIVE_CEILING_MB` | archive part ceiling in MiB |
    /// | `STICKERHUB_RETENTION_SECS` | retention window |
    /// | `STICKERHUB_SWEEP_INTERVAL_SECS` | janitor interval |
    /// | `STICKERHUB_JANITOR` | `on` / `off` |
    /// | `STICKERHUB_VECTOR_STRATEGY` | `batch` / `per_item` |
    /// | `STICKERHUB_VECTOR_COMMAND` | batch renderer command line |
    /// | `STICKERHUB_VECTOR_CLEANUP` | command run after a batch renderer timeout (empty disables) |
    /// | `STICKERHUB_VECTOR_CONVERTER` | per-item converter (selects `per_item` unless a strategy is set) |
    /// | `STICKERHUB_VECTOR_CONVERTER_ARGS` | per-item converter arguments |
    /// | `STICKERHUB_FFMPEG` | ffmpeg path |
    /// | `STICKERHUB_ITEM_TIMEOUT_SECS` / `STICKERHUB_BATCH_TIMEOUT_SECS` | converter timeouts |
    /// | `STICKERHUB_API_BASE` | origin API base URL |
    /// | `STICKERHUB_BOT_TOKEN` or `BOT_TOKEN` | origin credentials |
    /// | `STICKERHUB_BIND_ADDRESS` | publication surface address |
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "failed to load .env file");
        }
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(dir) = lookup("STICKERHUB_HUB_DIR") {
            config.pipeline.hub_dir = PathBuf::from(dir);
        }
        if let Some(workers) = parse_var::<usize>(&lookup, "STICKERHUB_WORKERS")? {
            config.pipeline.workers = workers;
        }
        if let Some(mib) = parse_var::<u64>(&lookup, "STICKERHUB_ARCHIVE_CEILING_MB")? {
            config.pipeline.archive_ceiling_bytes = mib.saturating_mul(MIB);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "STICKERHUB_RETENTION_SECS")? {
            config.retention.retention = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "STICKERHUB_SWEEP_INTERVAL_SECS")? {
            config.retention.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup("STICKERHUB_JANITOR") {
            config.retention.enabled = parse_switch(&flag, "STICKERHUB_JANITOR")?;
        }
        if let Some(path) = lookup("STICKERHUB_FFMPEG") {
            config.converter.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "STICKERHUB_ITEM_TIMEOUT_SECS")? {
            config.converter.item_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "STICKERHUB_BATCH_TIMEOUT_SECS")? {
            config.converter.batch_timeout = Duration::from_secs(secs);
        }
        config.converter.vector = vector_strategy_from_vars(&lookup)?;
        if let Some(cleanup) = lookup("STICKERHUB_VECTOR_CLEANUP") {
            config.converter.batch_cleanup = split_words(&cleanup);
        }

        if let Some(base) = lookup("STICKERHUB_API_BASE") {
            config.origin.api_base = base;
        }
        config.origin.token = lookup("STICKERHUB_BOT_TOKEN").or_else(|| lookup("BOT_TOKEN"));
        if let Some(addr) = parse_var::<SocketAddr>(&lookup, "STICKERHUB_BIND_ADDRESS")? {
            config.api.bind_address = addr;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            return Err(config_error("workers must be at least 1", "workers"));
        }
        if self.pipeline.archive_ceiling_bytes == 0 {
            return Err(config_error(
                "archive ceiling must be greater than zero",
                "archive_ceiling_bytes",
            ));
        }
        if self.retention.sweep_interval.is_zero() {
            return Err(config_error(
                "sweep interval must be greater than zero",
                "sweep_interval",
            ));
        }
        match &self.converter.vector {
            VectorStrategy::Batch { command } => {
                if command.first().is_none_or(|program| program.is_empty()) {
                    return Err(config_error(
                        "batch renderer command is empty",
                        "converter.vector.command",
                    ));
                }
            }
            VectorStrategy::PerItem { program, .. } => {
                if program.as_os_str().is_empty() {
                    return Err(config_error(
                        "per-item converter program is empty",
                        "converter.vector.program",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn vector_strategy_from_vars(lookup: &impl Fn(&str) -> Option<String>) -> Result<VectorStrategy> {
    let converter = lookup("STICKERHUB_VECTOR_CONVERTER");
    let strategy = lookup("STICKERHUB_VECTOR_STRATEGY");

    let per_item = match strategy.as_deref().map(str::trim) {
        Some("batch") => false,
        Some("per_item") | Some("per-item") => true,
        Some(other) => {
            return Err(config_error(
                &format!("unknown vector strategy '{other}' (expected batch or per_item)"),
                "STICKERHUB_VECTOR_STRATEGY",
            ));
        }
        None => converter.is_some(),
    };

    if per_item {
        let program = converter.ok_or_else(|| {
            config_error(
                "per_item strategy requires STICKERHUB_VECTOR_CONVERTER",
                "STICKERHUB_VECTOR_CONVERTER",
            )
        })?;
        let args = lookup("STICKERHUB_VECTOR_CONVERTER_ARGS")
            .map(|a| split_words(&a))
            .unwrap_or_else(default_per_item_args);
        Ok(VectorStrategy::PerItem {
            program: PathBuf::from(program),
            args,
        })
    } else {
        let command = lookup("STICKERHUB_VECTOR_COMMAND")
            .map(|c| split_words(&c))
            .unwrap_or_else(default_batch_command);
        Ok(VectorStrategy::Batch { command })
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| config_error(&format!("invalid value '{raw}' for {key}: {e}"), key)),
    }
}

fn parse_switch(raw: &str, key: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(config_error(
            &format!("invalid switch '{raw}' for {key}"),
            key,
        )),
    }
}

fn split_words(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_hub_dir() -> PathBuf {
    PathBuf::from("./hub")
}

fn default_workers() -> usize {
    5
}

fn default_archive_ceiling() -> u64 {
    45 * MIB
}

fn default_batch_command() -> Vec<String> {
    [
        "docker",
        "run",
        "--rm",
        "--name",
        JOB_PLACEHOLDER,
        "-v",
        "{dir}:/source",
        "edasriyan/lottie-to-gif",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_batch_cleanup() -> Vec<String> {
    vec!["docker".to_string(), "kill".to_string(), JOB_PLACEHOLDER.to_string()]
}

fn default_per_item_args() -> Vec<String> {
    vec![INPUT_PLACEHOLDER.to_string(), OUTPUT_PLACEHOLDER.to_string()]
}

fn default_item_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_frame_delay_ms() -> u32 {
    100
}

fn default_retention() -> Duration {
    Duration::from_secs(3 * 24 * 60 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pipeline.workers, 5);
        assert_eq!(config.pipeline.archive_ceiling_bytes, 45 * MIB);
        assert_eq!(config.retention.retention, Duration::from_secs(259_200));
        assert_eq!(config.retention.sweep_interval, Duration::from_secs(600));
        assert_eq!(config.converter.batch_timeout, Duration::from_secs(600));
        assert!(matches!(config.converter.vector, VectorStrategy::Batch { .. }));
        config.validate().unwrap();
    }

    #[test]
    fn test_from_vars_overrides() {
        let config = Config::from_vars(vars(&[
            ("STICKERHUB_HUB_DIR", "/srv/hub"),
            ("STICKERHUB_WORKERS", "8"),
            ("STICKERHUB_ARCHIVE_CEILING_MB", "10"),
            ("STICKERHUB_RETENTION_SECS", "60"),
            ("BOT_TOKEN", "123:abc"),
        ]))
        .unwrap();

        assert_eq!(config.pipeline.hub_dir, PathBuf::from("/srv/hub"));
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.pipeline.archive_ceiling_bytes, 10 * MIB);
        assert_eq!(config.retention.retention, Duration::from_secs(60));
        assert_eq!(config.origin.token.as_deref(), Some("123:abc"));
    }

    #[test]
    fn test_converter_path_selects_per_item_strategy() {
        let config = Config::from_vars(vars(&[(
            "STICKERHUB_VECTOR_CONVERTER",
            "/usr/local/bin/lottie_convert.py",
        )]))
        .unwrap();

        assert_eq!(
            config.converter.vector,
            VectorStrategy::PerItem {
                program: PathBuf::from("/usr/local/bin/lottie_convert.py"),
                args: vec!["{input}".to_string(), "{output}".to_string()],
            }
        );
    }

    #[test]
    fn test_explicit_batch_strategy_wins_over_converter_path() {
        let config = Config::from_vars(vars(&[
            ("STICKERHUB_VECTOR_STRATEGY", "batch"),
            ("STICKERHUB_VECTOR_CONVERTER", "/usr/bin/conv"),
            ("STICKERHUB_VECTOR_COMMAND", "render --dir {dir}"),
        ]))
        .unwrap();

        assert_eq!(
            config.converter.vector,
            VectorStrategy::Batch {
                command: vec!["render".into(), "--dir".into(), "{dir}".into()],
            }
        );
    }

    #[test]
    fn test_default_batch_renderer_is_named_and_killable() {
        let config = Config::default();
        let VectorStrategy::Batch { command } = &config.converter.vector else {
            panic!("default strategy is batch");
        };
        let name_at = command.iter().position(|a| a == "--name").unwrap();
        assert_eq!(command[name_at + 1], JOB_PLACEHOLDER);
        assert_eq!(config.converter.batch_cleanup, vec!["docker", "kill", JOB_PLACEHOLDER]);
    }

    #[test]
    fn test_empty_cleanup_disables_it() {
        let config = Config::from_vars(vars(&[("STICKERHUB_VECTOR_CLEANUP", "")])).unwrap();
        assert!(config.converter.batch_cleanup.is_empty());

        let config =
            Config::from_vars(vars(&[("STICKERHUB_VECTOR_CLEANUP", "podman kill {job}")])).unwrap();
        assert_eq!(config.converter.batch_cleanup, vec!["podman", "kill", "{job}"]);
    }

    #[test]
    fn test_per_item_without_converter_is_rejected() {
        let err = Config::from_vars(vars(&[("STICKERHUB_VECTOR_STRATEGY", "per_item")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "STICKERHUB_VECTOR_CONVERTER"));
    }

    #[test]
    fn test_invalid_number_reports_key() {
        let err = Config::from_vars(vars(&[("STICKERHUB_WORKERS", "many")])).unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "STICKERHUB_WORKERS"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = Config::from_vars(vars(&[("STICKERHUB_WORKERS", "0")])).unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "workers"));
    }

    #[test]
    fn test_janitor_switch() {
        let config = Config::from_vars(vars(&[("STICKERHUB_JANITOR", "off")])).unwrap();
        assert!(!config.retention.enabled);
        assert!(Config::from_vars(vars(&[("STICKERHUB_JANITOR", "maybe")])).is_err());
    }

    #[test]
    fn test_json_round_trip_uses_seconds() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["retention"]["retention"], 259_200);
        assert_eq!(json["workers"], 5);
        assert_eq!(json["converter"]["vector"]["strategy"], "batch");

        let parsed: Config = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.retention.retention, config.retention.retention);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"workers": 2}"#).unwrap();
        assert_eq!(parsed.pipeline.workers, 2);
        assert_eq!(parsed.pipeline.archive_ceiling_bytes, 45 * MIB);
        assert_eq!(parsed.converter.item_timeout, Duration::from_secs(120));
    }
}
