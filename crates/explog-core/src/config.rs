//! Settings of an experiment log.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_conf_prefix() -> String {
    "conf_".to_string()
}

fn default_autoflush() -> bool {
    true
}

/// Configuration for an [`crate::ExperimentLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Image file backing the log; `None` keeps everything in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Name prefix of the per-configuration result folders (default: "conf_")
    #[serde(default = "default_conf_prefix")]
    pub conf_prefix: String,
    /// Rewrite the image after every mutating operation (default: true)
    #[serde(default = "default_autoflush")]
    pub autoflush: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            conf_prefix: default_conf_prefix(),
            autoflush: default_autoflush(),
        }
    }
}

impl LogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_conf_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.conf_prefix = prefix.into();
        self
    }

    pub fn with_autoflush(mut self, autoflush: bool) -> Self {
        self.autoflush = autoflush;
        self
    }

    /// Loads a config from YAML. A missing file yields the defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save_yaml(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: LogConfig = serde_yaml::from_str("path: runs/log.explog\n").unwrap();
        assert_eq!(cfg.path, Some(PathBuf::from("runs/log.explog")));
        assert_eq!(cfg.conf_prefix, "conf_");
        assert!(cfg.autoflush);
    }

    #[test]
    fn yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log.yaml");
        assert_eq!(LogConfig::from_yaml_file(&file).unwrap(), LogConfig::default());

        let cfg = LogConfig::new("x.explog")
            .with_conf_prefix("cfg_")
            .with_autoflush(false);
        cfg.save_yaml(&file).unwrap();
        assert_eq!(LogConfig::from_yaml_file(&file).unwrap(), cfg);
    }
}
