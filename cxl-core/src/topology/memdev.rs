//! Memory devices (`memN`)

use super::{devname_of, Backend, Identified, Port};
use crate::constants::{attr, paths, prefix, sentinel};
use crate::error::{CxlError, Result};
use crate::hw::sysfs::{parse_dev_numbers, read_parsed, read_u64};
use crate::hw::{DeviceNode, KernelModule};
use cxl_protocol::CommandInfo;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace};

pub struct Memdev {
    id: u32,
    devname: String,
    major: u32,
    minor: u32,
    dev_path: PathBuf,
    host_path: PathBuf,
    node_path: PathBuf,
    pmem_size: u64,
    ram_size: u64,
    payload_max: usize,
    lsa_size: usize,
    serial: u64,
    numa_node: i32,
    firmware_version: String,
    module: Option<KernelModule>,
    pmem_bridge: Option<PathBuf>,
    pub(crate) backend: Arc<Backend>,
    pub(crate) endpoint: Mutex<Weak<Port>>,
    pub(crate) capabilities: Mutex<Option<Arc<Vec<CommandInfo>>>>,
}

impl Identified for Memdev {
    fn node_id(&self) -> u32 {
        self.id
    }

    fn node_name(&self) -> &str {
        &self.devname
    }
}

impl std::fmt::Debug for Memdev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memdev")
            .field("devname", &self.devname)
            .field("dev_path", &self.dev_path)
            .finish_non_exhaustive()
    }
}

impl Memdev {
    /// Build a memdev from its sysfs directory. Fails if a mandatory
    /// attribute is missing or unparsable.
    pub(crate) fn discover(backend: &Arc<Backend>, id: u32, base: &Path) -> Result<Arc<Self>> {
        let source = backend.source.as_ref();
        let devname = devname_of(base).to_string();
        debug!(devname = %devname, base = %base.display(), "adding memdev");

        let dev_attr = base.join(attr::DEV);
        let dev = source.read_attribute(&dev_attr)?;
        let (major, minor) = parse_dev_numbers(&dev).ok_or_else(|| CxlError::AttributeParse {
            path: dev_attr,
            value: dev.clone(),
        })?;

        let pmem_size = read_u64(source, &base.join(attr::PMEM_SIZE))?;
        let ram_size = read_u64(source, &base.join(attr::RAM_SIZE))?;
        let payload_max = read_u64(source, &base.join(attr::PAYLOAD_MAX))? as usize;

        let lsa_path = base.join(attr::LABEL_STORAGE_SIZE);
        let lsa_size = read_u64(source, &lsa_path)?;
        if lsa_size == u64::MAX {
            return Err(CxlError::AttributeParse {
                path: lsa_path,
                value: lsa_size.to_string(),
            });
        }

        let serial = read_u64(source, &base.join(attr::SERIAL)).unwrap_or(sentinel::SERIAL_UNKNOWN);
        let numa_node = read_parsed::<i32>(source, &base.join(attr::NUMA_NODE))
            .unwrap_or(sentinel::NUMA_UNKNOWN);

        let host_path = source
            .resolve_symlink(base)
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .ok_or_else(|| CxlError::AttributeNotFound {
                path: base.to_path_buf(),
            })?;

        let firmware_version = source.read_attribute(&base.join(attr::FIRMWARE_VERSION))?;

        let module = source
            .read_attribute(&base.join(attr::MODALIAS))
            .ok()
            .and_then(|alias| source.module_for_alias(&alias));

        let pmem_bridge = source
            .list_children(base, prefix::PMEM_BRIDGE)
            .unwrap_or_else(|e| {
                debug!(devname = %devname, "no nvdimm bridge: {}", e);
                Vec::new()
            })
            .into_iter()
            .next()
            .map(|child| {
                trace!(devname = %devname, bridge = %child.name, "found nvdimm bridge");
                child.path
            });

        Ok(Arc::new(Self {
            id,
            node_path: backend.config.dev_node(&devname),
            devname,
            major,
            minor,
            dev_path: base.to_path_buf(),
            host_path,
            pmem_size,
            ram_size,
            payload_max,
            lsa_size: lsa_size as usize,
            serial,
            numa_node,
            firmware_version,
            module,
            pmem_bridge,
            backend: Arc::clone(backend),
            endpoint: Mutex::new(Weak::new()),
            capabilities: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// `memN`
    pub fn devname(&self) -> &str {
        &self.devname
    }

    /// Name of the device this memdev hangs off (e.g. a PCI function)
    pub fn host(&self) -> &str {
        devname_of(&self.host_path)
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn dev_path(&self) -> &Path {
        &self.dev_path
    }

    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// Character device used for mailbox commands
    pub fn node_path(&self) -> &Path {
        &self.node_path
    }

    pub fn pmem_size(&self) -> u64 {
        self.pmem_size
    }

    pub fn ram_size(&self) -> u64 {
        self.ram_size
    }

    /// Largest payload a single mailbox command may carry
    pub fn payload_max(&self) -> usize {
        self.payload_max
    }

    /// Size of the label storage area in bytes
    pub fn label_size(&self) -> usize {
        self.lsa_size
    }

    /// Serial number, `None` if the device does not report one
    pub fn serial(&self) -> Option<u64> {
        (self.serial != sentinel::SERIAL_UNKNOWN).then_some(self.serial)
    }

    /// NUMA node, `None` if unknown
    pub fn numa_node(&self) -> Option<i32> {
        (self.numa_node != sentinel::NUMA_UNKNOWN).then_some(self.numa_node)
    }

    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    pub(crate) fn device_node(&self) -> DeviceNode {
        DeviceNode {
            devname: self.devname.clone(),
            path: self.node_path.clone(),
            major: self.major,
            minor: self.minor,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.source.is_driver_bound(&self.dev_path)
    }

    /// True if the memdev's pmem bridge is bound to its driver; labels are
    /// then owned by the nvdimm subsystem.
    pub fn nvdimm_bridge_active(&self) -> bool {
        self.pmem_bridge
            .as_deref()
            .map(|bridge| self.backend.source.is_driver_bound(bridge))
            .unwrap_or(false)
    }

    /// Endpoint link if it has already been resolved
    pub fn cached_endpoint(&self) -> Option<Arc<Port>> {
        self.endpoint.lock().upgrade()
    }

    pub(crate) fn clear_endpoint(&self) {
        *self.endpoint.lock() = Weak::new();
    }

    /// Bind the memdev to its driver. No-op if already bound.
    pub fn enable(&self) -> Result<()> {
        if self.is_enabled() {
            return Ok(());
        }

        let drivers = self.backend.config.drivers_dir(paths::CXL_BUS_NAME);
        if let Err(e) = self.backend.source.bind(&self.devname, self.module.clone(), &drivers) {
            debug!(devname = %self.devname, "bind: {}", e);
        }

        if !self.is_enabled() {
            error!("{}: failed to enable", self.devname);
            return Err(CxlError::no_device(format!("{}: failed to enable", self.devname)));
        }

        debug!("{}: enabled", self.devname);
        Ok(())
    }
}
