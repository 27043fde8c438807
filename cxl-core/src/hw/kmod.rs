//! Kernel module lookup and loading via modprobe

use crate::error::{CxlError, Result};
use std::process::Command;
use tracing::{debug, info};

/// A kernel module resolved from a device's modalias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelModule {
    pub name: String,
}

impl KernelModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Resolve a modalias to the first matching module, if any
    pub fn from_alias(alias: &str) -> Option<Self> {
        let output = match Command::new("modprobe")
            .arg("--resolve-alias")
            .arg(alias)
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!("Could not run modprobe for alias {}: {}", alias, e);
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                "No module for alias {}: {}",
                alias,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(KernelModule::new)
    }

    /// Insert the module (and its dependencies), honouring the blacklist
    pub fn load(&self) -> Result<()> {
        let output = Command::new("modprobe")
            .arg("--use-blacklist")
            .arg(&self.name)
            .output()
            .map_err(|e| CxlError::no_device(format!("{}: could not run modprobe: {}", self.name, e)))?;

        if output.status.success() {
            info!("Loaded kernel module: {}", self.name);
            Ok(())
        } else {
            Err(CxlError::no_device(format!(
                "{}: insert failure: {}",
                self.name,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
