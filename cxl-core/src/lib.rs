//! cxlkit Core Library
//!
//! Discovery of the CXL device topology exposed through sysfs, and the
//! mailbox command protocol used to talk to CXL memory devices.
//!
//! # Module Structure
//!
//! - `hw/` - Attribute source (sysfs), kernel modules, memdev ioctl channel
//! - `topology/` - Memdevs, buses, ports, decoders, targets, dports
//! - `mailbox/` - Command engine and chunked label storage transfers
//!
//! # Example
//!
//! ```no_run
//! use cxl_core::{Command, Context};
//!
//! fn main() -> cxl_core::Result<()> {
//!     let ctx = Context::new();
//!     for memdev in ctx.memdevs() {
//!         let mut cmd = Command::identify(&memdev)?;
//!         cmd.submit()?;
//!         println!("{}: {}", memdev.devname(), cmd.identify_result()?.fw_revision_str());
//!     }
//!     Ok(())
//! }
//! ```

pub mod hw;
pub mod mailbox;
pub mod topology;

pub mod config;
pub mod constants;
pub mod context;
pub mod error;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use context::Context;
pub use error::{CxlError, Result};

pub use hw::{
    AttributeSource, ChildEntry, DeviceChannel, DeviceNode, IoctlChannel, KernelModule,
    QueryResponse, SendRequest, SysfsSource,
};

pub use mailbox::{Command, CommandState, LabelChunk, LabelChunks, QueryStatus};

pub use topology::{Decoder, Dport, Memdev, Port, PortType, Target, TargetType};

pub use cxl_protocol::{
    CommandId, CommandInfo, HealthInfo, Identify, MediaStatus, PartitionInfo, PartitionMode,
    ThresholdStatus,
};
