use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;
use crate::policy::DEFAULT_HOST_INTERVAL_SECS;
use crate::session::Schedule;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    /// Used until the first volume change is saved to the state file.
    #[serde(default = "default_volume")]
    pub default_volume: f32,
}

/// Where the song / content rows come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Local TOML catalog (highest priority).
    /// Defaults to `~/.config/rmradio/catalog.toml`.
    #[serde(default = "default_catalog_toml")]
    pub catalog_toml: PathBuf,
    /// HTTP(S) endpoint serving the same rows as JSON, used when the TOML
    /// file does not exist.  `file://` paths are accepted too.
    #[serde(default)]
    pub catalog_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between host segments.
    #[serde(default = "default_host_interval_secs")]
    pub host_interval_secs: u64,
    /// Static host clip played for every host segment.
    #[serde(default = "default_host_clip")]
    pub host_clip: String,
    /// Songs between interstitials: one value in this range is drawn per
    /// playlist build.
    #[serde(default = "default_cadence_min")]
    pub cadence_min: usize,
    #[serde(default = "default_cadence_max")]
    pub cadence_max: usize,
}

impl ScheduleConfig {
    pub fn schedule(&self) -> Schedule {
        let min = self.cadence_min.max(1);
        let max = self.cadence_max.max(min);
        let secs = i64::try_from(self.host_interval_secs).unwrap_or(i64::MAX);
        Schedule {
            host_interval: chrono::Duration::seconds(secs),
            cadence: min..=max,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
            state_file: default_state_file(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_toml: default_catalog_toml(),
            catalog_url: String::new(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            host_interval_secs: default_host_interval_secs(),
            host_clip: default_host_clip(),
            cadence_min: default_cadence_min(),
            cadence_max: default_cadence_max(),
        }
    }
}

fn default_pid_file() -> PathBuf {
    platform::data_dir().join("daemon.pid")
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_volume() -> f32 {
    0.5
}

fn default_catalog_toml() -> PathBuf {
    platform::config_dir().join("catalog.toml")
}

fn default_host_interval_secs() -> u64 {
    DEFAULT_HOST_INTERVAL_SECS as u64
}

fn default_host_clip() -> String {
    platform::data_dir()
        .join("assets")
        .join("radio-host.mp3")
        .display()
        .to_string()
}

fn default_cadence_min() -> usize {
    3
}

fn default_cadence_max() -> usize {
    5
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
