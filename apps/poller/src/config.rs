use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fmt, fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },
    #[error("failed to parse config file {}: {source}", path.display())]
    ParseFailed { path: PathBuf, source: toml::de::Error },
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Poller configuration, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poller_token: String,
    pub api_url: String,
    /// Seconds between assignment fetches
    pub poll_interval: u64,
    pub max_concurrency: usize,
    /// Pending outcomes above this mark the poller busy
    pub batch_size: usize,
    /// Seconds between result submissions
    pub batch_interval: u64,
    pub heartbeat_interval: u64,
    pub health_port: u16,
    pub log_level: String,
    /// Skip certificate verification for HTTP/API checks
    pub tls_insecure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poller_token: String::new(),
            api_url: String::new(),
            poll_interval: 60,
            max_concurrency: 50,
            batch_size: 100,
            batch_interval: 10,
            heartbeat_interval: 30,
            health_port: 8089,
            log_level: "info".into(),
            tls_insecure: false,
        }
    }
}

/// $XDG_CONFIG_HOME/poller/config.toml or $HOME/.config/poller/config.toml
fn default_config_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let base = match lookup("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(config_home) => PathBuf::from(config_home),
        None => PathBuf::from(lookup("HOME").filter(|v| !v.is_empty())?).join(".config"),
    };
    Some(base.join("poller/config.toml"))
}

fn positive<T: std::str::FromStr + Default + PartialOrd>(value: &str) -> Option<T> {
    value.trim().parse::<T>().ok().filter(|n| *n > T::default())
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
            writeln!(f, "  {label}: {value}")
        };

        writeln!(f, "Current Poller Configuration:")?;
        write_indented(f, "API URL", &self.api_url)?;
        write_indented(f, "Poller Token", &if self.poller_token.is_empty() { "<unset>" } else { "<redacted>" })?;
        write_indented(f, "Poll Interval (s)", &self.poll_interval)?;
        write_indented(f, "Max Concurrency", &self.max_concurrency)?;
        write_indented(f, "Batch Size", &self.batch_size)?;
        write_indented(f, "Batch Interval (s)", &self.batch_interval)?;
        write_indented(f, "Heartbeat Interval (s)", &self.heartbeat_interval)?;
        write_indented(f, "Health Port", &self.health_port)?;
        write_indented(f, "Log Level", &self.log_level)?;
        write_indented(f, "TLS Insecure", &self.tls_insecure)?;

        Ok(())
    }
}

impl Config {
    /// Load with priority: environment > config file > defaults.
    ///
    /// Without an explicit path the XDG config location is tried. A missing
    /// file is not an error, a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| env::var(name).ok())
    }

    fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(|| default_config_path(&lookup));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?.unwrap_or_default(),
            None => Self::default(),
        };
        config.apply_env(lookup);
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        config.validate()?;

        Ok(config)
    }

    /// `Ok(None)` when the file does not exist
    fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ConfigError::ReadFailed { path: path.to_path_buf(), source }),
        };

        toml::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::ParseFailed { path: path.to_path_buf(), source })
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = var("AP_POLLER_TOKEN") {
            self.poller_token = v;
        }
        if let Some(v) = var("AP_API_URL") {
            self.api_url = v;
        }
        if let Some(n) = var("AP_POLL_INTERVAL").as_deref().and_then(positive) {
            self.poll_interval = n;
        }
        if let Some(n) = var("AP_MAX_CONCURRENCY").as_deref().and_then(positive) {
            self.max_concurrency = n;
        }
        if let Some(n) = var("AP_BATCH_SIZE").as_deref().and_then(positive) {
            self.batch_size = n;
        }
        if let Some(n) = var("AP_BATCH_INTERVAL").as_deref().and_then(positive) {
            self.batch_interval = n;
        }
        if let Some(n) = var("AP_HEALTH_PORT").as_deref().and_then(positive) {
            self.health_port = n;
        }
        if let Some(v) = var("AP_LOG_LEVEL") {
            self.log_level = v.to_lowercase();
        }
        if let Some(v) = var("AP_TLS_INSECURE") {
            self.tls_insecure = v == "true" || v == "1";
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poller_token.is_empty() {
            return Err(ConfigError::Missing("AP_POLLER_TOKEN"));
        }
        if self.api_url.is_empty() {
            return Err(ConfigError::Missing("AP_API_URL"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval.max(1))
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}
