//! Gateway configuration.
//!
//! Resolution order: environment variables, then the config file, then
//! defaults. The file is the path given on the command line, otherwise
//! `<config dir>/gateway.toml`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{DEFAULT_HTTP_PORT, DEFAULT_TOS, DEFAULT_TTL};
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub network: NetworkConfig,
    pub ui: UiConfig,
    pub spectrum: SpectrumConfig,
    /// Sent to clients instead of the daemon's own description
    pub description_override: Option<String>,
    /// 0 = info, 1 = debug, 2+ = trace
    pub verbose: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Daemon status group, `host[:port][,iface]`
    pub status_group: String,
    /// Audio group. Learned from the daemon when unset.
    pub audio_group: Option<String>,
    pub ttl: i32,
    pub tos: i32,
    /// Resolution attempts for the status group. 0 = forever.
    pub resolve_tries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Static files served for every path that is not an endpoint
    pub resources: PathBuf,
    /// Frames queued per client before new ones are dropped
    pub client_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Bytes per bin on the wire: 1, 2 or 4
    pub bin_precision_bytes: i32,
    pub poll_interval_ms: u64,
    pub stop_repeats: u32,
    pub stop_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            status_group: "hf.local".to_string(),
            audio_group: None,
            ttl: DEFAULT_TTL,
            tos: DEFAULT_TOS,
            resolve_tries: 0,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            resources: PathBuf::from("/usr/local/share/ka9q-web/html"),
            client_queue: 256,
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            bin_precision_bytes: 4,
            poll_interval_ms: 100,
            stop_repeats: 3,
            stop_interval_ms: 100,
        }
    }
}

impl GatewayConfig {
    /// Load config: env vars, then file, then defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        let mut config = match path {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "reading config");
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
                Self::from_toml(&text)
                    .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// `<config dir>/gateway.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "radio-web-gateway").map(|dirs| dirs.config_dir().join("gateway.toml"))
    }

    /// Apply `GATEWAY_*` overrides found by `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GATEWAY_MCAST") {
            self.network.status_group = v;
        }
        if let Some(v) = lookup("GATEWAY_HTTP_PORT") {
            match v.parse() {
                Ok(port) => self.ui.http_port = port,
                Err(_) => warn!(value = %v, "ignoring GATEWAY_HTTP_PORT"),
            }
        }
        if let Some(v) = lookup("GATEWAY_RESOURCES") {
            self.ui.resources = PathBuf::from(v);
        }
        if let Some(v) = lookup("GATEWAY_BIN_BYTES") {
            match v.parse() {
                Ok(bytes) => self.spectrum.bin_precision_bytes = bytes,
                Err(_) => warn!(value = %v, "ignoring GATEWAY_BIN_BYTES"),
            }
        }
    }

    /// Reject unusable settings and normalise the bin precision
    pub fn validate(&mut self) -> Result<()> {
        if self.network.status_group.trim().is_empty() {
            return Err(Error::Config("status group must not be empty".into()));
        }
        if self.ui.http_port == 0 {
            return Err(Error::Config("HTTP port must not be 0".into()));
        }
        if self.ui.client_queue == 0 {
            return Err(Error::Config("client queue must hold at least one frame".into()));
        }
        if !matches!(self.spectrum.bin_precision_bytes, 1 | 2 | 4) {
            warn!(
                bytes = self.spectrum.bin_precision_bytes,
                "unsupported bin precision, using 4"
            );
            self.spectrum.bin_precision_bytes = 4;
        }
        Ok(())
    }
}
