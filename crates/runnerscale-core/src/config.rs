//! runnerscale.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

/// Runner labels the autoscaler manages when none are configured.
pub const DEFAULT_KNOWN_POOLS: &[&str] = &[
    "builder",
    "func-tester",
    "func-tester-aarch64",
    "fuzzer-unit-tester",
    "stress-tester",
    "style-checker",
    "style-checker-aarch64",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerscaleConfig {
    pub controller: ControllerConfig,
    pub queue: QueueConfig,
    pub pools: PoolsConfig,
    pub inventory: InventoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Time between control-loop ticks.
    pub interval: String,
    pub dry_run: bool,
    pub scale_up_divisor: u32,
    pub scale_down_divisor: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: "60s".to_string(),
            dry_run: true,
            scale_up_divisor: 5,
            scale_down_divisor: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Literal endpoint URL. Takes precedence over `url_env`.
    pub url: Option<String>,
    /// Environment variable holding the endpoint URL.
    pub url_env: Option<String>,
    pub user: Option<String>,
    /// Environment variable holding the password, if any.
    pub password_env: Option<String>,
    pub database: String,
    pub table: String,
    /// Only jobs started within this many days are considered.
    pub lookback_days: u32,
    pub max_attempts: u32,
    pub backoff_base: String,
    pub backoff_max: String,
    pub request_timeout: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_env: Some("RUNNERSCALE_CLICKHOUSE_URL".to_string()),
            user: Some("play".to_string()),
            password_env: None,
            database: "default".to_string(),
            table: "workflow_jobs".to_string(),
            lookback_days: 2,
            max_attempts: 5,
            backoff_base: "100ms".to_string(),
            backoff_max: "2s".to_string(),
            request_timeout: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
    /// Ordered list of pool identifiers evaluated every tick.
    pub known: Vec<String>,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            known: DEFAULT_KNOWN_POOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub groups: Vec<GroupConfig>,
}

/// A worker group seeded into the static inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub pool: String,
    pub desired: u32,
    pub min: u32,
    pub max: u32,
}

impl RunnerscaleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: RunnerscaleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let c = &self.controller;
        if c.scale_up_divisor == 0 || c.scale_down_divisor == 0 {
            bail!("controller: scaling divisors must be positive");
        }
        if duration_field("controller.interval", &c.interval)?.is_zero() {
            bail!("controller.interval must be positive");
        }

        let q = &self.queue;
        if q.url.is_none() && q.url_env.is_none() {
            bail!("queue: one of `url` or `url_env` must be set");
        }
        if q.max_attempts == 0 {
            bail!("queue: max_attempts must be at least 1");
        }
        if !is_identifier(&q.database) || !is_identifier(&q.table) {
            bail!("queue: database and table must be plain identifiers");
        }
        duration_field("queue.backoff_base", &q.backoff_base)?;
        duration_field("queue.backoff_max", &q.backoff_max)?;
        duration_field("queue.request_timeout", &q.request_timeout)?;

        if self.pools.known.is_empty() {
            bail!("pools: at least one known pool is required");
        }
        let mut seen = HashSet::new();
        for pool in &self.pools.known {
            if !seen.insert(pool.as_str()) {
                bail!("pools: duplicate known pool {pool:?}");
            }
        }

        for group in &self.inventory.groups {
            if group.min > group.max {
                bail!(
                    "inventory: group {:?} has min {} above max {}",
                    group.name,
                    group.min,
                    group.max
                );
            }
        }
        Ok(())
    }
}

impl ControllerConfig {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(60))
    }
}

impl QueueConfig {
    pub fn backoff_base(&self) -> Duration {
        parse_duration(&self.backoff_base).unwrap_or(Duration::from_millis(100))
    }

    pub fn backoff_max(&self) -> Duration {
        parse_duration(&self.backoff_max).unwrap_or(Duration::from_secs(2))
    }

    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(30))
    }
}

fn duration_field(name: &str, value: &str) -> anyhow::Result<Duration> {
    match parse_duration(value) {
        Some(d) => Ok(d),
        None => bail!("{name}: cannot parse duration {value:?}"),
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
