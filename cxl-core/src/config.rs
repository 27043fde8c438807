//! Filesystem roots used for discovery and device access
//!
//! Defaults point at the live system. A JSON file and the `CXL_SYSFS_ROOT` /
//! `CXL_DEV_ROOT` environment variables can redirect them, which is how the
//! test suites run against temporary trees.

use crate::constants::{attr, paths};
use crate::error::{CxlError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_SYSFS_ROOT: &str = "CXL_SYSFS_ROOT";
pub const ENV_DEV_ROOT: &str = "CXL_DEV_ROOT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    #[serde(default = "default_dev_root")]
    pub dev_root: PathBuf,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(paths::SYSFS_ROOT)
}

fn default_dev_root() -> PathBuf {
    PathBuf::from(paths::DEV_ROOT)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            dev_root: default_dev_root(),
        }
    }
}

impl Config {
    /// Defaults overridden by the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CxlError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `CXL_SYSFS_ROOT` / `CXL_DEV_ROOT` on top of the current values
    pub fn apply_env(&mut self) {
        if let Some(root) = std::env::var_os(ENV_SYSFS_ROOT).filter(|v| !v.is_empty()) {
            self.sysfs_root = PathBuf::from(root);
        }
        if let Some(root) = std::env::var_os(ENV_DEV_ROOT).filter(|v| !v.is_empty()) {
            self.dev_root = PathBuf::from(root);
        }
    }

    /// `<sysfs>/bus/cxl/devices`
    pub fn devices_dir(&self) -> PathBuf {
        self.sysfs_root.join(paths::CXL_BUS).join("devices")
    }

    /// `<sysfs>/bus/cxl/flush`
    pub fn flush_path(&self) -> PathBuf {
        self.sysfs_root.join(paths::CXL_BUS).join(attr::FLUSH)
    }

    /// `<sysfs>/bus/<bus>/drivers`
    pub fn drivers_dir(&self, bus: &str) -> PathBuf {
        self.sysfs_root.join("bus").join(bus).join("drivers")
    }

    /// `<dev>/cxl/<devname>`
    pub fn dev_node(&self, devname: &str) -> PathBuf {
        self.dev_root.join(paths::CXL_DEV_DIR).join(devname)
    }
}
