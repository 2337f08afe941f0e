//! Scan tunables and where they are stored.
//!
//! Timeouts and the UDP retry budget are empirical; they live here so they
//! can be changed per run or per machine instead of being baked in.

use crate::error::{ConfigError, ConfigResult};
use crate::scanner::ScanMode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory paths following the XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/portsweep)
    pub config_dir: PathBuf,
}

impl Paths {
    pub fn new() -> ConfigResult<Self> {
        let project = ProjectDirs::from("com", "portsweep", "portsweep")
            .ok_or(ConfigError::DirectoryNotFound)?;

        Ok(Self {
            config_dir: project.config_dir().to_path_buf(),
        })
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}

/// Scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Mode used when the command line does not name one.
    pub default_scan_type: String,
    /// TCP connect timeout in milliseconds.
    pub tcp_timeout_ms: u64,
    /// How long a SYN probe waits for SYN+ACK or RST+ACK.
    pub syn_timeout_ms: u64,
    /// How long a UDP probe waits for ICMP port-unreachable.
    pub udp_timeout_ms: u64,
    /// Ports probed together in one UDP batch.
    pub udp_batch_size: usize,
    /// Extra rounds for UDP ports that stayed silent.
    pub udp_retries: u32,
    /// How long to wait for an ARP reply when resolving the next hop.
    pub arp_timeout_ms: u64,
    /// Read timeout of each capture handle; bounds deadline overshoot.
    pub capture_read_timeout_ms: u64,
    /// Concurrent capture sessions (SYN and UDP).
    pub max_capture_sessions: usize,
    /// Concurrent TCP connects.
    pub tcp_concurrency: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            default_scan_type: "connect".to_string(),
            tcp_timeout_ms: 3000,
            syn_timeout_ms: 1000,
            udp_timeout_ms: 3000,
            udp_batch_size: 6,
            udp_retries: 3,
            arp_timeout_ms: 1000,
            capture_read_timeout_ms: 10,
            max_capture_sessions: 256,
            tcp_concurrency: 500,
        }
    }
}

impl ScanSettings {
    /// Load settings from the default location, or defaults if there is no file.
    pub fn load() -> ConfigResult<Self> {
        let file = Paths::new()?.settings_file();

        if !file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let settings: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("udp_batch_size", self.udp_batch_size),
            ("max_capture_sessions", self.max_capture_sessions),
            ("tcp_concurrency", self.tcp_concurrency),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }

    /// The configured default mode; an unrecognised name is an error.
    pub fn default_mode(&self) -> Result<ScanMode, crate::error::ScanError> {
        self.default_scan_type.parse()
    }

    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }

    pub fn syn_timeout(&self) -> Duration {
        Duration::from_millis(self.syn_timeout_ms)
    }

    pub fn udp_timeout(&self) -> Duration {
        Duration::from_millis(self.udp_timeout_ms)
    }

    pub fn arp_timeout(&self) -> Duration {
        Duration::from_millis(self.arp_timeout_ms)
    }

    pub fn capture_read_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_read_timeout_ms)
    }
}
