use crate::chunker::DEFAULT_CHUNK_SIZE;
use crate::error::{DdsError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings for one node, stored as `config.json` in the node home.
///
/// Missing fields fall back to their defaults, so a partial file is fine,
/// except `node_id`: a node's identity is only ever generated once, by
/// [`NodeConfig::default`], and must be present in a loaded file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    #[serde(default = "String::new")]
    pub node_id: String,
    pub listen_address: String,
    pub chunk_size: usize,
    /// Keep a local copy of content fetched from peers.
    pub cache_retrieved: bool,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            listen_address: "127.0.0.1:7400".into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_retrieved: true,
            log_filter: "dds=info".into(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = serde_json::from_slice(&fs::read(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DdsError::MalformedInput(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.node_id.trim().is_empty() {
            return Err(DdsError::MalformedInput("node_id is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_unique() {
        let a = NodeConfig::default();
        let b = NodeConfig::default();
        a.validate().unwrap();
        assert_ne!(a.node_id, b.node_id);
        assert_eq!(a.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, br#"{"node_id": "alpha", "chunk_size": 1024}"#).unwrap();
        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.node_id, "alpha");
        assert_eq!(config.chunk_size, 1024);
        assert!(config.cache_retrieved);
    }

    #[test]
    fn missing_node_id_is_not_invented() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, br#"{"chunk_size": 1024}"#).unwrap();
        assert!(matches!(
            NodeConfig::load(&path),
            Err(DdsError::MalformedInput(_))
        ));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, br#"{"chunk_size": 0}"#).unwrap();
        assert!(matches!(
            NodeConfig::load(&path),
            Err(DdsError::MalformedInput(_))
        ));
    }
}
