//! Kubeconfig file discovery.

use std::ffi::OsString;
use std::path::PathBuf;

use tracing::debug;

use crate::error::ConfigError;

/// Environment variable holding a list of kubeconfig paths.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Locates the kubeconfig file to read.
///
/// Lookup order: the explicit path, the first existing entry of `KUBECONFIG`,
/// then `~/.kube/config`.
pub fn locate_kubeconfig(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    locate_from(
        explicit,
        std::env::var_os(KUBECONFIG_ENV),
        dirs::home_dir(),
    )
}

fn locate_from(
    explicit: Option<PathBuf>,
    env_paths: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "Using explicit kubeconfig");
        return Ok(path);
    }

    if let Some(paths) = env_paths {
        // Only the first existing file is used; entries are not merged.
        if let Some(path) = std::env::split_paths(&paths)
            .filter(|p| !p.as_os_str().is_empty())
            .find(|p| p.is_file())
        {
            debug!(path = %path.display(), "Using kubeconfig from KUBECONFIG");
            return Ok(path);
        }
    }

    let default = home
        .map(|home| home.join(".kube").join("config"))
        .filter(|path| path.is_file())
        .ok_or(ConfigError::NotFound)?;

    debug!(path = %default.display(), "Using default kubeconfig");
    Ok(default)
}
