//! Test configuration helpers

use std::path::{Path, PathBuf};
use std::time::Duration;
use stickerhub::Config;
use stickerhub::config::{INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER, RetryConfig, VectorStrategy};

/// Config over `hub_dir`: janitor off, no retries, `cp` as vector converter
///
/// With `cp` the normalized output of a vector item has exactly the size of
/// its payload, which makes archive sizes predictable.
pub fn test_config(hub_dir: &Path) -> Config {
    let mut config = Config::default();
    config.pipeline.hub_dir = hub_dir.to_path_buf();
    config.pipeline.workers = 4;
    config.retention.enabled = false;
    config.retry = RetryConfig {
        max_attempts: 0,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        jitter: false,
    };
    config.converter.vector = VectorStrategy::PerItem {
        program: PathBuf::from("cp"),
        args: vec![INPUT_PLACEHOLDER.into(), OUTPUT_PLACEHOLDER.into()],
    };
    config.converter.item_timeout = Duration::from_secs(20);
    config
}
