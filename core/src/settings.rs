//! Persistent defaults for tunnel and client options.
//!
//! Stored in JSON format at `~/.kubectl-tunnel/config.json`. Every field is
//! optional in the file; command-line flags override what is loaded here.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::ConfigError;
use crate::supervisor::SupervisorOptions;
use crate::tunnel::{models, Readiness, TunnelOptions};

/// Settings data stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub ssh_binary: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    pub ssh_args: Vec<String>,
    pub forward_host: String,
    pub kubectl_binary: PathBuf,

    /// Settle interval in milliseconds (ignored when `probe` is set).
    pub settle_ms: u64,
    /// Poll the local port instead of waiting a fixed interval.
    pub probe: bool,
    pub probe_attempts: u32,
    pub probe_interval_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let tunnel = TunnelOptions::default();
        Self {
            ssh_binary: tunnel.ssh_binary,
            ssh_user: None,
            ssh_host: None,
            ssh_port: None,
            identity_file: None,
            ssh_args: Vec::new(),
            forward_host: tunnel.forward_host,
            kubectl_binary: SupervisorOptions::default().client_binary,
            settle_ms: models::DEFAULT_SETTLE.as_millis() as u64,
            probe: false,
            probe_attempts: models::DEFAULT_PROBE_ATTEMPTS,
            probe_interval_ms: models::DEFAULT_PROBE_INTERVAL.as_millis() as u64,
            stop_timeout_ms: models::DEFAULT_STOP_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Settings {
    /// Builds the tunnel options these settings describe.
    pub fn tunnel_options(&self) -> TunnelOptions {
        let readiness = if self.probe {
            Readiness::Probe {
                attempts: self.probe_attempts.max(1),
                interval: Duration::from_millis(self.probe_interval_ms),
            }
        } else {
            Readiness::Settle(Duration::from_millis(self.settle_ms))
        };

        TunnelOptions {
            ssh_binary: self.ssh_binary.clone(),
            ssh_user: self.ssh_user.clone(),
            ssh_host: self.ssh_host.clone(),
            ssh_port: self.ssh_port,
            identity_file: self.identity_file.clone(),
            extra_args: self.ssh_args.clone(),
            forward_host: self.forward_host.clone(),
            readiness,
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            ..TunnelOptions::default()
        }
    }

    /// Builds the wrapped client options.
    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            client_binary: self.kubectl_binary.clone(),
            ..SupervisorOptions::default()
        }
    }
}

/// Settings store backed by a JSON file.
pub struct SettingsStore {
    settings_path: PathBuf,
}

impl SettingsStore {
    /// Create a new settings store with the default path.
    ///
    /// Default path: `~/.kubectl-tunnel/config.json`
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ConfigError::Settings("Could not determine home directory".to_string())
        })?;

        Ok(Self {
            settings_path: home.join(".kubectl-tunnel").join("config.json"),
        })
    }

    /// Create a settings store with a custom path (for testing).
    pub fn with_path(settings_path: PathBuf) -> Self {
        Self { settings_path }
    }

    pub fn settings_path(&self) -> &PathBuf {
        &self.settings_path
    }

    /// Load settings from disk.
    ///
    /// Returns defaults if the file doesn't exist.
    pub async fn load(&self) -> Result<Settings, ConfigError> {
        if !self.settings_path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.settings_path)
            .await
            .map_err(|e| ConfigError::Settings(format!("Failed to read settings: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ConfigError::Settings(format!("Failed to parse settings: {}", e)))
    }
}
