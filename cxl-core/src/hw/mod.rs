//! Hardware access
//!
//! Sysfs attribute reads and writes, driver binding, kernel module lookup and
//! the memdev ioctl channel.

pub mod ioctl;
pub mod kmod;
pub mod sysfs;

pub use ioctl::{DeviceChannel, DeviceNode, IoctlChannel, QueryResponse, SendRequest};
pub use kmod::KernelModule;
pub use sysfs::{AttributeSource, ChildEntry, SysfsSource};

#[cfg(test)]
pub use sysfs::MockAttributeSource;
