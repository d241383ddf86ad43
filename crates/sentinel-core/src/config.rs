use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Base URL of the metrics/config host.
pub const API_URL_ENV: &str = "SENTINEL_API_URL";
/// Base URL of the rate-limited probe endpoint.
pub const PROBE_URL_ENV: &str = "SENTINEL_PROBE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub load: LoadConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides and
    /// validate.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)
                .with_context(|| format!("Failed to load config from {:?}", p))?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over file values. The lookup is injected so
    /// tests don't have to touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|s| !s.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(url) = lookup(PROBE_URL_ENV).filter(|s| !s.trim().is_empty()) {
            self.probe.base_url = url.trim().to_string();
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        parse_base_url(&self.api.base_url).context("Invalid api.base_url")?;
        parse_base_url(&self.probe.base_url).context("Invalid probe.base_url")?;

        if self.sampler.interval_ms == 0 {
            anyhow::bail!("sampler.interval_ms must be non-zero");
        }
        if self.sampler.history_len == 0 {
            anyhow::bail!("sampler.history_len must be non-zero");
        }
        if self.load.interval_ms == 0 {
            anyhow::bail!("load.interval_ms must be non-zero");
        }
        if self.load.log_len == 0 {
            anyhow::bail!("load.log_len must be non-zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host serving the metrics and config endpoints
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_config_path")]
    pub config_path: String,
    /// Client-side request timeout in milliseconds; unset leaves it to the
    /// transport
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ApiConfig {
    pub fn metrics_url(&self) -> anyhow::Result<Url> {
        endpoint_url(&self.base_url, &self.metrics_path)
    }

    pub fn config_url(&self) -> anyhow::Result<Url> {
        endpoint_url(&self.base_url, &self.config_path)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            metrics_path: default_metrics_path(),
            config_path: default_config_path(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Host serving the rate-limited endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_probe_path")]
    pub path: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ProbeConfig {
    pub fn url(&self) -> anyhow::Result<Url> {
        endpoint_url(&self.base_url, &self.path)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_probe_path(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Milliseconds between metrics polls
    #[serde(default = "default_sampler_interval_ms")]
    pub interval_ms: u64,
    /// Number of points kept for the chart
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sampler_interval_ms(),
            history_len: default_history_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Milliseconds between probes while a simulation runs
    #[serde(default = "default_load_interval_ms")]
    pub interval_ms: u64,
    /// Number of probe events kept in the log
    #[serde(default = "default_log_len")]
    pub log_len: usize,
}

impl LoadConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_load_interval_ms(),
            log_len: default_log_len(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_config_path() -> String {
    "/api/config".to_string()
}

fn default_probe_path() -> String {
    "/playground".to_string()
}

fn default_sampler_interval_ms() -> u64 {
    1000
}

fn default_history_len() -> usize {
    20
}

fn default_load_interval_ms() -> u64 {
    50
}

fn default_log_len() -> usize {
    50
}

fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid URL: {raw}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("URL must be http:// or https:// (got {raw})");
    }
    if url.host_str().is_none() {
        anyhow::bail!("URL must include a hostname (got {raw})");
    }
    Ok(url)
}

/// Join `path` onto `base`, keeping any path prefix the base already carries.
pub fn endpoint_url(base: &str, path: &str) -> anyhow::Result<Url> {
    let mut base = parse_base_url(base)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    let url = base.join(path.trim_start_matches('/'))?;
    Ok(url)
}
