//! CXL object graph
//!
//! Nodes are discovered lazily from the attribute source the first time a
//! collection is walked, then served from cache until the owning bus is
//! invalidated. Children are owned through `Arc`, back-references are `Weak`.

mod collection;
mod decoder;
mod dport;
mod memdev;
mod port;

pub use decoder::{Decoder, Target, TargetType};
pub use dport::Dport;
pub use memdev::Memdev;
pub use port::{Port, PortType};

pub(crate) use collection::{Collection, Identified};

use crate::config::Config;
use crate::hw::{AttributeSource, DeviceChannel};
use std::path::Path;
use std::sync::Arc;

/// Services every node needs: where to look and how to talk to the system
pub(crate) struct Backend {
    pub config: Config,
    pub source: Arc<dyn AttributeSource>,
    pub channel: Arc<dyn DeviceChannel>,
}

impl Backend {
    pub fn new(
        config: Config,
        source: Arc<dyn AttributeSource>,
        channel: Arc<dyn DeviceChannel>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            source,
            channel,
        })
    }
}

/// Last path component as a string, empty if there is none
pub(crate) fn devname_of(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Path containment used to map targets and dports to memdevs.
///
/// Plain substring match on the rendered paths; a path that is a string
/// prefix of a sibling (`.../0000:35:00.1` vs `.../0000:35:00.10`) also
/// matches.
pub(crate) fn host_path_contains(host_path: &Path, needle: &Path) -> bool {
    host_path
        .to_string_lossy()
        .contains(needle.to_string_lossy().as_ref())
}
