//! Effective settings: the settings file overlaid with command-line flags.

use anyhow::{Context, Result};
use kubetunnel_core::error::ConfigError;
use kubetunnel_core::{Settings, SettingsStore};
use tracing::warn;

use crate::Cli;

/// Loads `~/.kubectl-tunnel/config.json` and applies flag overrides.
pub async fn effective(cli: &Cli) -> Result<Settings> {
    let settings = load_file(SettingsStore::new()).await?;
    Ok(apply_overrides(settings, cli))
}

/// Loads the settings file, or defaults when there is no home directory.
async fn load_file(store: Result<SettingsStore, ConfigError>) -> Result<Settings> {
    let store = match store {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Settings file unavailable, using defaults");
            return Ok(Settings::default());
        }
    };

    store
        .load()
        .await
        .with_context(|| format!("Error loading {}", store.settings_path().display()))
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(user) = &cli.ssh_user {
        settings.ssh_user = Some(user.clone());
    }
    if let Some(host) = &cli.ssh_host {
        settings.ssh_host = Some(host.clone());
    }
    if let Some(port) = cli.ssh_port {
        settings.ssh_port = Some(port);
    }
    if let Some(identity) = &cli.identity_file {
        settings.identity_file = Some(identity.clone());
    }
    if let Some(binary) = &cli.ssh_binary {
        settings.ssh_binary = binary.clone();
    }
    if let Some(kubectl) = &cli.kubectl {
        settings.kubectl_binary = kubectl.clone();
    }
    if let Some(settle_ms) = cli.settle_ms {
        settings.settle_ms = settle_ms;
    }
    if cli.probe {
        settings.probe = true;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_missing_home_falls_back_to_defaults() {
        let store = Err(ConfigError::Settings(
            "Could not determine home directory".to_string(),
        ));
        let settings = load_file(store).await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = load_file(Ok(SettingsStore::with_path(path))).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_file_values() {
        let file = Settings {
            ssh_user: Some("ops".to_string()),
            ssh_port: Some(22),
            ..Settings::default()
        };
        let cli = Cli::parse_from([
            "kubectl-tunnel",
            "--ssh-port",
            "2222",
            "--kubectl",
            "/usr/local/bin/kubectl",
            "get",
            "nodes",
        ]);

        let settings = apply_overrides(file, &cli);
        assert_eq!(settings.ssh_user.as_deref(), Some("ops"));
        assert_eq!(settings.ssh_port, Some(2222));
        assert_eq!(
            settings.kubectl_binary,
            PathBuf::from("/usr/local/bin/kubectl")
        );
        assert!(!settings.probe);
    }
}
