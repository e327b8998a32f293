use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub drill: DrillConfig,
}

/// Cache connection. Without a URL the process runs on the in-memory cache.
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,
    /// Synthesize conditional writes from `SET NX` locks instead of the
    /// compare-and-set script.
    #[serde(default)]
    pub advisory_lock: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            lock_ttl_seconds: default_lock_ttl_seconds(),
            advisory_lock: false,
        }
    }
}

fn default_lock_ttl_seconds() -> u64 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    pub deadline_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            deadline_ms: None,
        }
    }
}

fn default_max_attempts() -> u32 { 10 }
fn default_base_backoff_ms() -> u64 { 10 }
fn default_max_backoff_ms() -> u64 { 200 }

/// Shape of the concurrent-update drill the app runs after seeding.
#[derive(Debug, Deserialize, Clone)]
pub struct DrillConfig {
    #[serde(default = "default_segments")]
    pub segments: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            segments: default_segments(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_segments() -> usize { 20 }
fn default_concurrency() -> usize { 20 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `JOURNEY__REDIS__URL=redis://127.0.0.1:6379` sets `redis.url`
            .add_source(config::Environment::with_prefix("JOURNEY").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
