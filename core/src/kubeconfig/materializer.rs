//! Derived kubeconfig materialization.
//!
//! The raw config is never modified. A copy with the active cluster's server
//! rewritten to the tunnel endpoint is written to a private temp file that
//! lives until [`DerivedConfig::release`] (or drop).

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::document::RawConfig;
use crate::error::{CleanupError, ConfigError, Error};

/// Prefix for temporary kubeconfig files.
const TEMP_PREFIX: &str = "kubeconfig-";

/// Returns the server URL for a local tunnel port.
pub fn local_server_url(port: u16) -> String {
    format!("https://localhost:{}", port)
}

/// A persisted kubeconfig pointing at the local tunnel.
#[derive(Debug)]
pub struct DerivedConfig {
    path: PathBuf,
    file: Option<NamedTempFile>,
}

impl DerivedConfig {
    /// Path of the temporary kubeconfig file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the file has been released.
    pub fn is_released(&self) -> bool {
        self.file.is_none()
    }

    /// Closes and deletes the temporary file.
    ///
    /// Calling this again after the first call is a no-op.
    pub fn release(&mut self) -> Result<(), CleanupError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        debug!(path = %self.path.display(), "Removing temporary kubeconfig");
        file.close().map_err(|source| CleanupError::Release {
            path: self.path.clone(),
            source,
        })
    }
}

/// Writes a copy of `raw` whose active cluster points at `localhost:<local_port>`.
pub fn materialize(raw: &RawConfig, local_port: u16) -> Result<DerivedConfig, Error> {
    let mut derived = raw.clone();

    let context = derived
        .current_context()
        .ok_or(ConfigError::NoActiveContext)?
        .to_string();
    let cluster = derived
        .context_cluster(&context)
        .ok_or_else(|| ConfigError::ContextNotFound(context.clone()))?
        .to_string();

    let server = local_server_url(local_port);
    if !derived.set_cluster_server(&cluster, &server) {
        return Err(ConfigError::ClusterNotFound(cluster).into());
    }

    let content = derived.to_yaml_string()?;
    let file = write_temp(&content)?;
    let path = file.path().to_path_buf();

    info!(path = %path.display(), server = %server, "Created temporary kubeconfig");
    Ok(DerivedConfig {
        path,
        file: Some(file),
    })
}

/// Creates a private temp file holding `content`.
///
/// A partially written file is removed before the error is returned.
fn write_temp(content: &str) -> Result<NamedTempFile, ConfigError> {
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile()
        .map_err(|e| ConfigError::Write(format!("Failed to create temp file: {}", e)))?;

    let written = file
        .write_all(content.as_bytes())
        .and_then(|()| file.as_file().sync_all());

    if let Err(e) = written {
        let _ = file.close();
        return Err(ConfigError::Write(e.to_string()));
    }

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubeconfig::document::tests::SAMPLE;

    #[test]
    fn test_local_server_url() {
        assert_eq!(local_server_url(40123), "https://localhost:40123");
    }

    #[test]
    fn test_materialize_rewrites_only_active_cluster() {
        let raw = RawConfig::from_yaml_str(SAMPLE).unwrap();
        let mut derived = materialize(&raw, 40123).unwrap();

        assert!(derived.path().exists());
        let name = derived.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with(TEMP_PREFIX));

        let content = std::fs::read_to_string(derived.path()).unwrap();
        let mut written = RawConfig::from_yaml_str(&content).unwrap();
        assert_eq!(
            written.cluster_server("prod-cluster"),
            Some("https://localhost:40123")
        );

        // Everything except the rewritten server is identical to the input.
        written.set_cluster_server("prod-cluster", "https://10.0.0.12:6443");
        assert_eq!(written, raw);

        // The input itself is untouched.
        assert_eq!(
            raw.cluster_server("prod-cluster"),
            Some("https://10.0.0.12:6443")
        );

        derived.release().unwrap();
    }

    #[test]
    fn test_release_is_idempotent() {
        let raw = RawConfig::from_yaml_str(SAMPLE).unwrap();
        let mut derived = materialize(&raw, 40124).unwrap();
        let path = derived.path().to_path_buf();

        derived.release().unwrap();
        assert!(derived.is_released());
        assert!(!path.exists());

        derived.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_file() {
        let raw = RawConfig::from_yaml_str(SAMPLE).unwrap();
        let derived = materialize(&raw, 40125).unwrap();
        let path = derived.path().to_path_buf();

        drop(derived);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let raw = RawConfig::from_yaml_str(SAMPLE).unwrap();
        let mut derived = materialize(&raw, 40126).unwrap();

        let mode = std::fs::metadata(derived.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);

        derived.release().unwrap();
    }

    #[test]
    fn test_materialize_missing_cluster() {
        let yaml = SAMPLE.replace("current-context: prod", "current-context: dangling");
        let raw = RawConfig::from_yaml_str(&yaml).unwrap();

        assert!(matches!(
            materialize(&raw, 40127),
            Err(Error::Config(ConfigError::ClusterNotFound(_)))
        ));
    }
}
