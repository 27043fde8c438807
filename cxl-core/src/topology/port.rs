//! Ports: root (bus), switch and endpoint
//!
//! Every port owns four lazily scanned collections: child ports, endpoints,
//! decoders and downstream ports. A bus is a root port with no parent.

use super::{devname_of, Backend, Collection, Decoder, Dport, Identified, Memdev};
use crate::constants::{attr, paths, prefix, provider};
use crate::error::{CxlError, Result};
use crate::hw::{AttributeSource, ChildEntry, KernelModule};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Root,
    Switch,
    Endpoint,
}

/// Per-variant state
enum Variant {
    Root,
    Switch,
    Endpoint { memdev: Mutex<Weak<Memdev>> },
}

pub struct Port {
    id: u32,
    variant: Variant,
    dev_path: PathBuf,
    uport: PathBuf,
    module: Option<KernelModule>,
    parent: Weak<Port>,
    backend: Arc<Backend>,
    bus: Mutex<Weak<Port>>,
    child_ports: Mutex<Collection<Port>>,
    endpoints: Mutex<Collection<Port>>,
    decoders: Mutex<Collection<Decoder>>,
    dports: Mutex<Collection<Dport>>,
}

impl Identified for Port {
    fn node_id(&self) -> u32 {
        self.id
    }

    fn node_name(&self) -> &str {
        self.devname()
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("devname", &self.devname())
            .field("type", &self.port_type())
            .field("uport", &self.uport)
            .finish_non_exhaustive()
    }
}

impl Port {
    fn discover(
        backend: &Arc<Backend>,
        port_type: PortType,
        parent: Weak<Port>,
        id: u32,
        base: &Path,
    ) -> Result<Arc<Self>> {
        let source = backend.source.as_ref();
        debug!(devname = %devname_of(base), base = %base.display(), "adding port");

        let uport_link = base.join(attr::UPORT);
        let uport = source
            .resolve_symlink(&uport_link)
            .ok_or(CxlError::AttributeNotFound { path: uport_link })?;

        let module = source
            .read_attribute(&base.join(attr::MODALIAS))
            .ok()
            .and_then(|alias| source.module_for_alias(&alias));

        let variant = match port_type {
            PortType::Root => Variant::Root,
            PortType::Switch => Variant::Switch,
            PortType::Endpoint => Variant::Endpoint {
                memdev: Mutex::new(Weak::new()),
            },
        };

        Ok(Arc::new(Self {
            id,
            variant,
            dev_path: base.to_path_buf(),
            uport,
            module,
            parent,
            backend: Arc::clone(backend),
            bus: Mutex::new(Weak::new()),
            child_ports: Mutex::new(Collection::default()),
            endpoints: Mutex::new(Collection::default()),
            decoders: Mutex::new(Collection::default()),
            dports: Mutex::new(Collection::default()),
        }))
    }

    /// Build a bus (root port) from its sysfs directory
    pub(crate) fn discover_bus(backend: &Arc<Backend>, id: u32, base: &Path) -> Result<Arc<Self>> {
        Self::discover(backend, PortType::Root, Weak::new(), id, base)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// `rootN`, `portN` or `endpointN`
    pub fn devname(&self) -> &str {
        devname_of(&self.dev_path)
    }

    pub fn dev_path(&self) -> &Path {
        &self.dev_path
    }

    /// Resolved upstream device path
    pub fn uport(&self) -> &Path {
        &self.uport
    }

    /// Name of the upstream device. For endpoints this is the memdev name.
    pub fn host(&self) -> &str {
        devname_of(&self.uport)
    }

    pub fn port_type(&self) -> PortType {
        match self.variant {
            Variant::Root => PortType::Root,
            Variant::Switch => PortType::Switch,
            Variant::Endpoint { .. } => PortType::Endpoint,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.variant, Variant::Root)
    }

    pub fn is_switch(&self) -> bool {
        matches!(self.variant, Variant::Switch)
    }

    pub fn is_endpoint(&self) -> bool {
        matches!(self.variant, Variant::Endpoint { .. })
    }

    /// The endpoint's memdev link slot, `None` for other port types
    pub(crate) fn endpoint_link(&self) -> Option<&Mutex<Weak<Memdev>>> {
        match &self.variant {
            Variant::Endpoint { memdev } => Some(memdev),
            _ => None,
        }
    }

    /// The port itself if it is an endpoint
    pub fn as_endpoint(self: &Arc<Self>) -> Option<Arc<Port>> {
        self.is_endpoint().then(|| Arc::clone(self))
    }

    /// Memdev link of an endpoint if it has already been resolved
    pub fn cached_memdev(&self) -> Option<Arc<Memdev>> {
        self.endpoint_link().and_then(|link| link.lock().upgrade())
    }

    pub fn parent(&self) -> Option<Arc<Port>> {
        self.parent.upgrade()
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.source.is_driver_bound(&self.dev_path)
    }

    pub(crate) fn backend_source(&self) -> &dyn AttributeSource {
        self.backend.source.as_ref()
    }

    /// Topmost ancestor reachable through live parent links
    pub(crate) fn root(self: &Arc<Self>) -> Arc<Port> {
        let mut port = Arc::clone(self);
        while let Some(parent) = port.parent() {
            port = parent;
        }
        port
    }

    /// The bus this port belongs to. `None` while the port is disabled.
    pub fn bus(self: &Arc<Self>) -> Option<Arc<Port>> {
        if !self.is_enabled() {
            return None;
        }

        if let Some(bus) = self.bus.lock().upgrade() {
            return Some(bus);
        }

        let root = self.root();
        if !root.is_root() {
            return None;
        }
        *self.bus.lock() = Arc::downgrade(&root);
        Some(root)
    }

    /// Platform firmware that published a bus
    pub fn provider(&self) -> &str {
        match self.host() {
            provider::ACPI_HOST => provider::ACPI_NAME,
            provider::TEST_HOST => provider::TEST_NAME,
            other => other,
        }
    }

    // ========================================================================
    // Lazily populated children
    // ========================================================================

    fn populate<T, F>(
        self: &Arc<Self>,
        collection: &Mutex<Collection<T>>,
        prefix: &str,
        what: &str,
        mut build: F,
    ) -> Vec<Arc<T>>
    where
        T: Identified,
        F: FnMut(&ChildEntry) -> Result<Arc<T>>,
    {
        let mut guard = collection.lock();
        if !guard.begin_scan() {
            return guard.snapshot();
        }

        let children = match self.backend.source.list_children(&self.dev_path, prefix) {
            Ok(children) => children,
            Err(e) => {
                error!("{}: failed to list {}: {}", self.devname(), what, e);
                return guard.snapshot();
            }
        };

        for child in &children {
            match build(child) {
                Ok(node) => {
                    guard.insert(node);
                }
                Err(e) => error!("{}: failed to add {}: {}", child.name, what, e),
            }
        }
        guard.snapshot()
    }

    /// Switch ports directly below this port
    pub fn child_ports(self: &Arc<Self>) -> Vec<Arc<Port>> {
        let backend = Arc::clone(&self.backend);
        let parent = Arc::downgrade(self);
        self.populate(&self.child_ports, prefix::PORT, "port", |child| {
            Port::discover(&backend, PortType::Switch, parent.clone(), child.id, &child.path)
        })
    }

    pub fn endpoints(self: &Arc<Self>) -> Vec<Arc<Port>> {
        let backend = Arc::clone(&self.backend);
        let parent = Arc::downgrade(self);
        self.populate(&self.endpoints, prefix::ENDPOINT, "endpoint", |child| {
            Port::discover(&backend, PortType::Endpoint, parent.clone(), child.id, &child.path)
        })
    }

    pub fn decoders(self: &Arc<Self>) -> Vec<Arc<Decoder>> {
        let prefix = prefix::decoder(self.id);
        self.populate(&self.decoders, &prefix, "decoder", |child| {
            Decoder::discover(self, child)
        })
    }

    pub fn dports(self: &Arc<Self>) -> Vec<Arc<Dport>> {
        self.populate(&self.dports, prefix::DPORT, "dport", |child| {
            Dport::discover(self, child)
        })
    }

    /// Number of downstream ports (scans them if needed)
    pub fn nr_dports(self: &Arc<Self>) -> usize {
        self.dports().len()
    }

    /// Whether the child-port collection has been scanned since the last
    /// invalidation
    pub fn ports_initialized(&self) -> bool {
        self.child_ports.lock().is_initialized()
    }

    /// All ports below this one, depth first, parents before children
    pub fn descendants(self: &Arc<Self>) -> Vec<Arc<Port>> {
        let mut out = Vec::new();
        for child in self.child_ports() {
            let below = child.descendants();
            out.push(child);
            out.extend(below);
        }
        out
    }

    /// Drop the whole child-port subtree so the next walk rescans it
    pub(crate) fn reset_child_ports(&self) {
        self.child_ports.lock().reset();
    }

    pub fn dport_by_memdev(self: &Arc<Self>, memdev: &Memdev) -> Option<Arc<Dport>> {
        self.dports().into_iter().find(|dport| dport.maps_memdev(memdev))
    }

    /// Bind the port to its driver. No-op if already bound.
    pub fn enable(&self) -> Result<()> {
        let devname = self.devname();
        if self.is_enabled() {
            return Ok(());
        }

        let drivers = self.backend.config.drivers_dir(paths::CXL_BUS_NAME);
        if let Err(e) = self.backend.source.bind(devname, self.module.clone(), &drivers) {
            debug!(devname, "bind: {}", e);
        }

        if !self.is_enabled() {
            error!("{}: failed to enable", devname);
            return Err(CxlError::no_device(format!("{}: failed to enable", devname)));
        }

        debug!("{}: enabled", devname);
        Ok(())
    }
}
