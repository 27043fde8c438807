//! Attribute source for topology discovery
//!
//! Everything the topology builder learns about the system comes through the
//! [`AttributeSource`] trait: scalar attribute reads and writes, directory
//! enumeration by name prefix, symlink resolution, driver state and
//! bind/unbind. [`SysfsSource`] implements it over a sysfs mount.

use crate::constants::attr;
use crate::error::{CxlError, Result};
use crate::hw::kmod::KernelModule;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, trace};

/// One directory entry matching `<prefix><id>[.<sub>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub id: u32,
    pub sub_id: Option<u32>,
    pub name: String,
    pub path: PathBuf,
}

#[cfg_attr(test, mockall::automock)]
pub trait AttributeSource: Send + Sync {
    /// Read an attribute, trailing whitespace removed
    fn read_attribute(&self, path: &Path) -> Result<String>;

    fn write_attribute(&self, path: &Path, value: &str) -> Result<()>;

    /// Entries of `root` named `<prefix><id>[.<sub>]`, ordered by id
    fn list_children(&self, root: &Path, prefix: &str) -> Result<Vec<ChildEntry>>;

    /// Canonical absolute path, `None` if it does not resolve
    fn resolve_symlink(&self, path: &Path) -> Option<PathBuf>;

    /// True if `<dev_path>/driver` is present
    fn is_driver_bound(&self, dev_path: &Path) -> bool;

    fn module_for_alias(&self, alias: &str) -> Option<KernelModule>;

    /// Load `module` if given, then offer `devname` to each driver under
    /// `drivers_dir` until one accepts it
    fn bind(&self, devname: &str, module: Option<KernelModule>, drivers_dir: &Path) -> Result<()>;

    /// Detach the driver bound to `dev_path`
    fn unbind(&self, dev_path: &Path) -> Result<()>;
}

/// [`AttributeSource`] backed by the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct SysfsSource;

impl SysfsSource {
    pub fn new() -> Self {
        Self
    }
}

fn child_pattern(prefix: &str) -> Result<Regex> {
    Regex::new(&format!(r"^{}(\d+)(?:\.(\d+))?$", regex::escape(prefix)))
        .map_err(|e| CxlError::invalid(format!("bad child prefix '{}': {}", prefix, e)))
}

fn base_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

impl AttributeSource for SysfsSource {
    fn read_attribute(&self, path: &Path) -> Result<String> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let value = content.trim_end().to_string();
                trace!(path = %path.display(), value = %value, "read attribute");
                Ok(value)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CxlError::AttributeNotFound {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(CxlError::AttributeRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn write_attribute(&self, path: &Path, value: &str) -> Result<()> {
        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new().write(true).open(path)?;
            file.write_all(value.as_bytes())
        };
        write().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                CxlError::AttributeNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CxlError::AttributeWrite {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        trace!(path = %path.display(), value = %value.trim_end(), "wrote attribute");
        Ok(())
    }

    fn list_children(&self, root: &Path, prefix: &str) -> Result<Vec<ChildEntry>> {
        let pattern = child_pattern(prefix)?;
        let dir = match fs::read_dir(root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(root = %root.display(), "directory not present");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(CxlError::AttributeRead {
                    path: root.to_path_buf(),
                    source,
                })
            }
        };

        let mut children = Vec::new();
        for entry in dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = pattern.captures(&name) else {
                continue;
            };
            let Ok(id) = caps[1].parse::<u32>() else {
                continue;
            };
            let sub_id = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            children.push(ChildEntry {
                id,
                sub_id,
                path: entry.path(),
                name,
            });
        }

        children.sort_by_key(|c| (c.id, c.sub_id));
        Ok(children)
    }

    fn resolve_symlink(&self, path: &Path) -> Option<PathBuf> {
        fs::canonicalize(path).ok()
    }

    fn is_driver_bound(&self, dev_path: &Path) -> bool {
        fs::symlink_metadata(dev_path.join(attr::DRIVER))
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn module_for_alias(&self, alias: &str) -> Option<KernelModule> {
        KernelModule::from_alias(alias)
    }

    fn bind(&self, devname: &str, module: Option<KernelModule>, drivers_dir: &Path) -> Result<()> {
        if devname.is_empty() {
            return Err(CxlError::invalid("missing devname"));
        }

        if let Some(module) = &module {
            module.load()?;
        }

        let drivers = fs::read_dir(drivers_dir).map_err(|e| {
            CxlError::no_device(format!(
                "{}: opendir(\"{}\") failed: {}",
                devname,
                drivers_dir.display(),
                e
            ))
        })?;

        for driver in drivers.flatten() {
            let name = driver.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let bind = driver.path().join(attr::BIND);
            match self.write_attribute(&bind, devname) {
                Ok(()) => {
                    debug!(devname, driver = %name.to_string_lossy(), "bound");
                    return Ok(());
                }
                Err(e) => trace!(devname, path = %bind.display(), "bind rejected: {}", e),
            }
        }

        Err(CxlError::no_device(format!("{}: bind failed", devname)))
    }

    fn unbind(&self, dev_path: &Path) -> Result<()> {
        let devname = base_name(dev_path)
            .ok_or_else(|| CxlError::invalid(format!("bad device path {}", dev_path.display())))?;
        let unbind = dev_path.join(attr::DRIVER).join(attr::UNBIND);
        self.write_attribute(&unbind, devname)
    }
}

// ============================================================================
// Attribute parsing helpers
// ============================================================================

/// Parse an unsigned integer the way sysfs prints them: decimal or `0x` hex
pub fn parse_u64(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

/// Read a mandatory unsigned attribute
pub fn read_u64(source: &dyn AttributeSource, path: &Path) -> Result<u64> {
    let value = source.read_attribute(path)?;
    parse_u64(&value).ok_or_else(|| CxlError::AttributeParse {
        path: path.to_path_buf(),
        value,
    })
}

/// Read a mandatory attribute with `FromStr`
pub fn read_parsed<T: FromStr>(source: &dyn AttributeSource, path: &Path) -> Result<T> {
    let value = source.read_attribute(path)?;
    value.trim().parse().map_err(|_| CxlError::AttributeParse {
        path: path.to_path_buf(),
        value,
    })
}

/// Read an optional unsigned attribute, falling back to `default`
pub fn read_u64_or(source: &dyn AttributeSource, path: &Path, default: u64) -> u64 {
    match read_u64(source, path) {
        Ok(v) => v,
        Err(e) => {
            trace!(path = %path.display(), "using default {}: {}", default, e);
            default
        }
    }
}

/// Read an optional boolean attribute (`0`/`1`)
pub fn read_flag(source: &dyn AttributeSource, path: &Path) -> bool {
    read_u64_or(source, path, 0) != 0
}

/// Parse a `major:minor` pair from a sysfs `dev` attribute
pub fn parse_dev_numbers(value: &str) -> Option<(u32, u32)> {
    let (major, minor) = value.trim().split_once(':')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_parse_u64_formats() {
        assert_eq!(parse_u64("268435456\n"), Some(268_435_456));
        assert_eq!(parse_u64("0x10000000"), Some(0x1000_0000));
        assert_eq!(parse_u64("0xffffffffffffffff"), Some(u64::MAX));
        assert_eq!(parse_u64("garbage"), None);
        assert_eq!(parse_dev_numbers("250:3"), Some((250, 3)));
        assert_eq!(parse_dev_numbers("250"), None);
    }

    #[test]
    fn test_read_attribute_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let source = SysfsSource::new();

        fs::write(dir.path().join("size"), "0x1000\n").unwrap();
        assert_eq!(source.read_attribute(&dir.path().join("size")).unwrap(), "0x1000");

        let err = source.read_attribute(&dir.path().join("absent")).unwrap_err();
        assert!(err.is_unsupported());
        assert!(matches!(err, CxlError::AttributeNotFound { .. }));
    }

    #[test]
    fn test_list_children_filters_and_orders() {
        let dir = TempDir::new().unwrap();
        for name in ["mem10", "mem2", "memory", "mem", "pmem0", "decoder3.1", "decoder3.0", "decoder4.0"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let source = SysfsSource::new();

        let mems = source.list_children(dir.path(), "mem").unwrap();
        let ids: Vec<u32> = mems.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 10]);
        assert_eq!(mems[0].name, "mem2");

        let decoders = source.list_children(dir.path(), "decoder3.").unwrap();
        let names: Vec<&str> = decoders.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["decoder3.0", "decoder3.1"]);

        let missing = source.list_children(&dir.path().join("nope"), "mem").unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_driver_bound_and_unbind() {
        let dir = TempDir::new().unwrap();
        let driver = dir.path().join("drivers/cxl_mem");
        let dev = dir.path().join("mem0");
        fs::create_dir_all(&driver).unwrap();
        fs::create_dir_all(&dev).unwrap();
        fs::write(driver.join("unbind"), "").unwrap();

        let source = SysfsSource::new();
        assert!(!source.is_driver_bound(&dev));

        symlink(&driver, dev.join("driver")).unwrap();
        assert!(source.is_driver_bound(&dev));

        source.unbind(&dev).unwrap();
        assert_eq!(fs::read_to_string(driver.join("unbind")).unwrap(), "mem0");
    }

    #[test]
    fn test_bind_tries_each_driver() {
        let dir = TempDir::new().unwrap();
        let drivers = dir.path().join("drivers");
        fs::create_dir_all(drivers.join("a_no_bind")).unwrap();
        fs::create_dir_all(drivers.join("cxl_port")).unwrap();
        fs::write(drivers.join("cxl_port/bind"), "").unwrap();

        let source = SysfsSource::new();
        source.bind("port1", None, &drivers).unwrap();
        assert_eq!(fs::read_to_string(drivers.join("cxl_port/bind")).unwrap(), "port1");

        let err = source.bind("port1", None, &dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, CxlError::NoDevice(_)));
    }

    #[test]
    fn test_resolve_symlink() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("devices/pci0000:00/0000:00:01.0");
        fs::create_dir_all(&target).unwrap();
        symlink(&target, dir.path().join("dport0")).unwrap();

        let source = SysfsSource::new();
        let resolved = source.resolve_symlink(&dir.path().join("dport0")).unwrap();
        assert_eq!(resolved, fs::canonicalize(&target).unwrap());
        assert!(source.resolve_symlink(&dir.path().join("dport1")).is_none());
    }
}
