//! Daemon configuration.
//!
//! Layered the usual way: an optional JSON config file named by
//! `CAMHUB_CONFIG`, then field-wise environment overrides, then validation.
//! The optional stream section is what pre-registers a network camera with
//! the manager at startup; without it only the local device is registered.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_DEVICE: &str = "stub://local_camera";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
struct CamhubConfigFile {
    local: Option<LocalConfigFile>,
    stream: Option<StreamConfigFile>,
    active: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LocalConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CamhubConfig {
    pub local: LocalSettings,
    /// Present when a network camera should be registered at startup.
    pub stream: Option<StreamSettings>,
    /// Source name to activate at startup; defaults to the stream source
    /// when one is configured, the local device otherwise.
    pub active: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl CamhubConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMHUB_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CamhubConfigFile) -> Self {
        let local = LocalSettings {
            device: file
                .local
                .as_ref()
                .and_then(|local| local.device.clone())
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: file
                .local
                .as_ref()
                .and_then(|local| local.width)
                .unwrap_or(DEFAULT_WIDTH),
            height: file
                .local
                .as_ref()
                .and_then(|local| local.height)
                .unwrap_or(DEFAULT_HEIGHT),
        };
        let stream = file.stream.and_then(|stream| {
            stream.url.map(|url| StreamSettings {
                url,
                connect_timeout: Duration::from_secs(
                    stream
                        .connect_timeout_secs
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                ),
                read_timeout: Duration::from_secs(
                    stream.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
                ),
            })
        });
        Self {
            local,
            stream,
            active: file.active,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("CAMHUB_DEVICE") {
            if !device.trim().is_empty() {
                self.local.device = device;
            }
        }
        if let Ok(url) = std::env::var("CAMHUB_STREAM_URL") {
            if !url.trim().is_empty() {
                let stream = self.stream.get_or_insert_with(|| StreamSettings {
                    url: String::new(),
                    connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
                    read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
                });
                stream.url = url;
            }
        }
        if let Ok(secs) = std::env::var("CAMHUB_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("CAMHUB_CONNECT_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            if let Some(stream) = self.stream.as_mut() {
                stream.connect_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(secs) = std::env::var("CAMHUB_READ_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("CAMHUB_READ_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            if let Some(stream) = self.stream.as_mut() {
                stream.read_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(active) = std::env::var("CAMHUB_ACTIVE") {
            if !active.trim().is_empty() {
                self.active = Some(active);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.local.device.trim().is_empty() {
            return Err(anyhow!("local device must not be empty"));
        }
        if self.local.width == 0 || self.local.height == 0 {
            return Err(anyhow!("local frame dimensions must be non-zero"));
        }
        if let Some(stream) = &self.stream {
            Url::parse(&stream.url)
                .map_err(|e| anyhow!("invalid stream url '{}': {}", stream.url, e))?;
            if stream.connect_timeout.is_zero() || stream.read_timeout.is_zero() {
                return Err(anyhow!("stream timeouts must be greater than zero"));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CamhubConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
