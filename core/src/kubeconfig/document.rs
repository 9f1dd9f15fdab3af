//! Raw kubeconfig document.
//!
//! The document is kept as an untyped YAML tree so that everything this crate
//! does not touch (users, extensions, unknown keys) is carried through a
//! load/copy/write cycle unchanged.

use std::path::Path;

use serde_yaml::{Mapping, Value};
use tokio::fs;

use crate::error::ConfigError;

/// A parsed multi-cluster kubeconfig.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConfig {
    doc: Value,
}

impl RawConfig {
    /// Parses a kubeconfig from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let doc: Value = serde_yaml::from_str(content)?;
        Ok(Self { doc })
    }

    /// Loads a kubeconfig from disk.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Load {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_yaml_str(&content)
    }

    /// Serializes the document back to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.doc).map_err(|e| ConfigError::Write(e.to_string()))
    }

    /// Returns the active context name, if set and non-empty.
    pub fn current_context(&self) -> Option<&str> {
        self.doc
            .get("current-context")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Returns the cluster name referenced by a context entry.
    ///
    /// `None` means the context entry does not exist. A context without a
    /// `cluster` field yields `Some("")`, which never matches a cluster.
    pub fn context_cluster(&self, context: &str) -> Option<&str> {
        let entry = self.named_entry("contexts", context)?;
        Some(
            entry
                .get("context")
                .and_then(|body| body.get("cluster"))
                .and_then(Value::as_str)
                .unwrap_or(""),
        )
    }

    /// Returns true if a cluster entry with this name exists.
    pub fn has_cluster(&self, cluster: &str) -> bool {
        self.named_entry("clusters", cluster).is_some()
    }

    /// Returns the `server` field of a cluster entry.
    pub fn cluster_server(&self, cluster: &str) -> Option<&str> {
        self.named_entry("clusters", cluster)?
            .get("cluster")?
            .get("server")
            .and_then(Value::as_str)
    }

    /// Rewrites the `server` field of a cluster entry.
    ///
    /// Returns false if the cluster does not exist; nothing is modified then.
    pub fn set_cluster_server(&mut self, cluster: &str, server: &str) -> bool {
        let Some(entries) = self
            .doc
            .get_mut("clusters")
            .and_then(Value::as_sequence_mut)
        else {
            return false;
        };

        let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some(cluster))
        else {
            return false;
        };

        let Some(mapping) = entry.as_mapping_mut() else {
            return false;
        };

        let body = mapping
            .entry(Value::from("cluster"))
            .or_insert_with(|| Value::Mapping(Mapping::new()));

        match body.as_mapping_mut() {
            Some(body) => {
                body.insert(Value::from("server"), Value::from(server));
                true
            }
            None => false,
        }
    }

    /// Finds the `<list>` item whose `name` matches.
    fn named_entry(&self, list: &str, name: &str) -> Option<&Value> {
        self.doc
            .get(list)?
            .as_sequence()?
            .iter()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
    }
}
