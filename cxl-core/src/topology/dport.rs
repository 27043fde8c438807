//! Downstream ports (`dportN` links under a port)

use super::{devname_of, host_path_contains, Identified, Memdev, Port};
use crate::constants::attr;
use crate::error::{CxlError, Result};
use crate::hw::ChildEntry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::debug;

pub struct Dport {
    id: u32,
    port: Weak<Port>,
    dev_path: PathBuf,
    phys_path: Option<PathBuf>,
}

impl Identified for Dport {
    fn node_id(&self) -> u32 {
        self.id
    }

    fn node_name(&self) -> &str {
        self.devname()
    }
}

impl std::fmt::Debug for Dport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dport")
            .field("id", &self.id)
            .field("dev_path", &self.dev_path)
            .field("phys_path", &self.phys_path)
            .finish_non_exhaustive()
    }
}

impl Dport {
    pub(crate) fn discover(port: &Arc<Port>, child: &ChildEntry) -> Result<Arc<Self>> {
        let source = port.backend_source();
        debug!(devname = %child.name, base = %child.path.display(), "adding dport");

        let dev_path = source
            .resolve_symlink(&child.path)
            .ok_or_else(|| CxlError::AttributeNotFound {
                path: child.path.clone(),
            })?;
        let phys_path = source.resolve_symlink(&child.path.join(attr::PHYSICAL_NODE));

        Ok(Arc::new(Self {
            id: child.id,
            port: Arc::downgrade(port),
            dev_path,
            phys_path,
        }))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Name of the device the link resolves to
    pub fn devname(&self) -> &str {
        devname_of(&self.dev_path)
    }

    pub fn dev_path(&self) -> &Path {
        &self.dev_path
    }

    pub fn physical_node(&self) -> Option<&str> {
        self.phys_path.as_deref().map(devname_of)
    }

    pub fn port(&self) -> Option<Arc<Port>> {
        self.port.upgrade()
    }

    /// True if the memdev sits below this downstream port
    pub fn maps_memdev(&self, memdev: &Memdev) -> bool {
        let needle = self.phys_path.as_deref().unwrap_or(&self.dev_path);
        host_path_contains(memdev.host_path(), needle)
    }
}
