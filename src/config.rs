//! # Engine settings
//! Loaded once at startup from `config/engine.toml` (optional) with
//! environment-variable overrides. A missing file falls back to defaults;
//! a malformed file is a fatal configuration error.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PATH: &str = "ENGINE_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/engine.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Per-channel concurrency slot count.
    pub max_parallel_searches: usize,
    /// Consecutive failures before a channel's breaker opens.
    pub circuit_breaker_failures: u32,
    /// Seconds an open breaker waits before allowing a half-open probe.
    pub circuit_breaker_reset_seconds: f64,
    /// Requests-per-minute ceilings per channel name.
    pub channel_rpm: HashMap<String, u32>,
    /// RPM ceiling for channels not listed in `channel_rpm`.
    pub default_rpm: u32,
    /// Per-task source timeout; expiry is treated as a source failure.
    pub source_timeout_seconds: u64,
    /// Max idle gap between stream events before a heartbeat is injected.
    pub heartbeat_seconds: u64,
    /// Chat model used by the OpenAI analyzer.
    pub analyzer_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        let mut channel_rpm = HashMap::new();
        channel_rpm.insert("web_search".to_string(), 500);
        channel_rpm.insert("news_search".to_string(), 300);
        Self {
            max_parallel_searches: 20,
            circuit_breaker_failures: 5,
            circuit_breaker_reset_seconds: 30.0,
            channel_rpm,
            default_rpm: 120,
            source_timeout_seconds: 20,
            heartbeat_seconds: 30,
            analyzer_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Settings {
    /// Load settings using env var + fallback:
    /// 1) $ENGINE_CONFIG_PATH
    /// 2) config/engine.toml
    /// 3) built-in defaults
    pub fn load() -> Result<Self> {
        let mut settings = if let Ok(p) = std::env::var(ENV_PATH) {
            Self::from_file(&PathBuf::from(p))?
        } else {
            let default = PathBuf::from(DEFAULT_PATH);
            if default.exists() {
                Self::from_file(&default)?
            } else {
                Self::default()
            }
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing engine config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("ENGINE_MAX_PARALLEL_SEARCHES") {
            self.max_parallel_searches = v
                .parse()
                .context("ENGINE_MAX_PARALLEL_SEARCHES must be an integer")?;
        }
        if let Ok(v) = std::env::var("ENGINE_BREAKER_FAILURES") {
            self.circuit_breaker_failures =
                v.parse().context("ENGINE_BREAKER_FAILURES must be an integer")?;
        }
        if let Ok(v) = std::env::var("ENGINE_BREAKER_RESET_SECONDS") {
            self.circuit_breaker_reset_seconds = v
                .parse()
                .context("ENGINE_BREAKER_RESET_SECONDS must be a number")?;
        }
        if let Ok(v) = std::env::var("ENGINE_SOURCE_TIMEOUT_SECONDS") {
            self.source_timeout_seconds = v
                .parse()
                .context("ENGINE_SOURCE_TIMEOUT_SECONDS must be an integer")?;
        }
        if let Ok(v) = std::env::var("ENGINE_HEARTBEAT_SECONDS") {
            self.heartbeat_seconds =
                v.parse().context("ENGINE_HEARTBEAT_SECONDS must be an integer")?;
        }
        Ok(())
    }

    /// RPM ceiling for a channel, falling back to the default budget.
    pub fn rpm_for(&self, channel: &str) -> u32 {
        self.channel_rpm
            .get(channel)
            .copied()
            .unwrap_or(self.default_rpm)
    }

    pub fn breaker_reset(&self) -> Duration {
        Duration::from_secs_f64(self.circuit_breaker_reset_seconds.max(0.0))
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }
}
