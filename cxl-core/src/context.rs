//! Library context
//!
//! A [`Context`] owns the top-level memdev and bus collections and resolves
//! the cross links between them. Clones share one graph; the graph is torn
//! down when the last clone is dropped.

use crate::config::Config;
use crate::constants::prefix;
use crate::error::{CxlError, Result};
use crate::hw::{AttributeSource, DeviceChannel, IoctlChannel, SysfsSource};
use crate::topology::{Backend, Collection, Identified, Memdev, Port};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct ContextInner {
    backend: Arc<Backend>,
    memdevs: Mutex<Collection<Memdev>>,
    buses: Mutex<Collection<Port>>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let memdevs = self.memdevs.get_mut().len();
        let buses = self.buses.get_mut().len();
        self.memdevs.get_mut().reset();
        self.buses.get_mut().reset();
        info!(memdevs, buses, "context released");
    }
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.inner.backend.config)
            .field("refcount", &self.refcount())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Context over the live system, roots taken from the environment
    pub fn new() -> Self {
        Self::with_config(Config::from_env())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_backends(config, Arc::new(SysfsSource::new()), Arc::new(IoctlChannel::new()))
    }

    /// Context over injected attribute source and device channel
    pub fn with_backends(
        config: Config,
        source: Arc<dyn AttributeSource>,
        channel: Arc<dyn DeviceChannel>,
    ) -> Self {
        debug!(sysfs = %config.sysfs_root.display(), dev = %config.dev_root.display(), "context created");
        Self {
            inner: Arc::new(ContextInner {
                backend: Backend::new(config, source, channel),
                memdevs: Mutex::new(Collection::default()),
                buses: Mutex::new(Collection::default()),
            }),
        }
    }

    /// Number of live handles to this context
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn config(&self) -> &Config {
        &self.inner.backend.config
    }

    fn populate<T, F>(&self, collection: &Mutex<Collection<T>>, prefix: &str, what: &str, build: F) -> Vec<Arc<T>>
    where
        T: Identified,
        F: Fn(&Arc<Backend>, u32, &std::path::Path) -> Result<Arc<T>>,
    {
        let backend = &self.inner.backend;
        let mut guard = collection.lock();
        if !guard.begin_scan() {
            return guard.snapshot();
        }

        let root = backend.config.devices_dir();
        match backend.source.list_children(&root, prefix) {
            Ok(children) => {
                for child in &children {
                    match build(backend, child.id, &child.path) {
                        Ok(node) => {
                            guard.insert(node);
                        }
                        Err(e) => error!("{}: failed to add {}: {}", child.name, what, e),
                    }
                }
            }
            Err(e) => error!("failed to list {} in {}: {}", what, root.display(), e),
        }
        info!(count = guard.len(), "found {}s", what);
        guard.snapshot()
    }

    /// All memory devices, discovered on first call
    pub fn memdevs(&self) -> Vec<Arc<Memdev>> {
        self.populate(&self.inner.memdevs, prefix::MEMDEV, "memdev", Memdev::discover)
    }

    /// All root ports (buses), discovered on first call
    pub fn buses(&self) -> Vec<Arc<Port>> {
        self.populate(&self.inner.buses, prefix::BUS, "bus", Port::discover_bus)
    }

    pub fn memdev_by_name(&self, devname: &str) -> Option<Arc<Memdev>> {
        self.memdevs().into_iter().find(|m| m.devname() == devname)
    }

    pub fn bus_by_name(&self, devname: &str) -> Option<Arc<Port>> {
        self.buses().into_iter().find(|b| b.devname() == devname)
    }

    /// Find any port (bus, switch or endpoint) by device name
    pub fn port_by_name(&self, devname: &str) -> Option<Arc<Port>> {
        for bus in self.buses() {
            if bus.devname() == devname {
                return Some(bus);
            }
            let mut ports = vec![Arc::clone(&bus)];
            ports.extend(bus.descendants());
            for port in ports {
                if port.devname() == devname {
                    return Some(port);
                }
                if let Some(ep) = port.endpoints().into_iter().find(|e| e.devname() == devname) {
                    return Some(ep);
                }
            }
        }
        None
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Endpoint port of a memdev. `None` while the memdev is disabled or
    /// not yet attached to any bus.
    pub fn memdev_endpoint(&self, memdev: &Arc<Memdev>) -> Option<Arc<Port>> {
        if let Some(endpoint) = memdev.cached_endpoint() {
            return Some(endpoint);
        }

        if !memdev.is_enabled() {
            return None;
        }

        let endpoint = self
            .buses()
            .iter()
            .find_map(|bus| find_endpoint(bus, memdev.devname()))?;

        self.link(memdev, &endpoint);
        Some(endpoint)
    }

    /// Memdev behind an endpoint port
    pub fn endpoint_memdev(&self, endpoint: &Arc<Port>) -> Option<Arc<Memdev>> {
        if let Some(memdev) = endpoint.cached_memdev() {
            return Some(memdev);
        }

        if !endpoint.is_endpoint() || !endpoint.is_enabled() {
            return None;
        }

        let memdev = self.memdev_by_name(endpoint.host())?;
        self.link(&memdev, endpoint);
        Some(memdev)
    }

    /// Record the memdev/endpoint pairing in both directions. A side that
    /// already points elsewhere keeps its first link.
    fn link(&self, memdev: &Arc<Memdev>, endpoint: &Arc<Port>) {
        let Some(slot) = endpoint.endpoint_link() else {
            return;
        };

        {
            let mut ep_memdev = slot.lock();
            match ep_memdev.upgrade() {
                Some(existing) if !Arc::ptr_eq(&existing, memdev) => {
                    error!(
                        "{} assigned to {} not {}",
                        endpoint.devname(),
                        existing.devname(),
                        memdev.devname()
                    );
                }
                Some(_) => {}
                None => *ep_memdev = Arc::downgrade(memdev),
            }
        }

        let mut md_endpoint = memdev.endpoint.lock();
        match md_endpoint.upgrade() {
            Some(existing) if !Arc::ptr_eq(&existing, endpoint) => {
                error!(
                    "{} assigned to {} not {}",
                    memdev.devname(),
                    existing.devname(),
                    endpoint.devname()
                );
            }
            Some(_) => {}
            None => *md_endpoint = Arc::downgrade(endpoint),
        }
    }

    /// Bus of the memdev's endpoint
    pub fn memdev_bus(&self, memdev: &Arc<Memdev>) -> Option<Arc<Port>> {
        self.memdev_endpoint(memdev)?.bus()
    }

    /// True if `port` is an ancestor of (or is) the memdev's endpoint
    pub fn port_hosts_memdev(&self, port: &Arc<Port>, memdev: &Arc<Memdev>) -> bool {
        let mut iter = self.memdev_endpoint(memdev);
        while let Some(p) = iter {
            if Arc::ptr_eq(&p, port) {
                return true;
            }
            iter = p.parent();
        }
        false
    }

    // ========================================================================
    // Disable / invalidate
    // ========================================================================

    /// Forget everything discovered below `bus`.
    ///
    /// Clears endpoint links of memdevs resolved under the bus, drops the
    /// bus's child-port subtree and asks the kernel to flush pending
    /// topology work. The next walk rescans from scratch.
    fn invalidate_bus(&self, bus: &Arc<Port>) {
        let memdevs = self.inner.memdevs.lock().snapshot();
        for memdev in &memdevs {
            let Some(endpoint) = memdev.cached_endpoint() else {
                continue;
            };
            if Arc::ptr_eq(&endpoint.root(), bus) {
                debug!(memdev = %memdev.devname(), endpoint = %endpoint.devname(), "clearing endpoint link");
                memdev.clear_endpoint();
            }
        }

        bus.reset_child_ports();
        self.flush();
    }

    fn flush(&self) {
        let backend = &self.inner.backend;
        let path = backend.config.flush_path();
        if let Err(e) = backend.source.write_attribute(&path, "1\n") {
            warn!("failed to flush {}: {}", path.display(), e);
        }
    }

    /// Unbind a memdev and invalidate its bus. Already disabled is success.
    pub fn disable_memdev(&self, memdev: &Arc<Memdev>) -> Result<()> {
        let devname = memdev.devname();
        if !memdev.is_enabled() {
            return Ok(());
        }

        let Some(bus) = self.memdev_bus(memdev) else {
            error!("{}: failed to invalidate", devname);
            return Err(CxlError::no_device(format!("{}: failed to invalidate", devname)));
        };

        if let Err(e) = self.inner.backend.source.unbind(memdev.dev_path()) {
            debug!(devname, "unbind: {}", e);
        }

        if memdev.is_enabled() {
            error!("{}: failed to disable", devname);
            return Err(CxlError::Busy(format!("{}: failed to disable", devname)));
        }

        self.invalidate_bus(&bus);
        debug!("{}: disabled", devname);
        Ok(())
    }

    /// Unbind a switch or endpoint port and invalidate its bus
    pub fn disable_port(&self, port: &Arc<Port>) -> Result<()> {
        let devname = port.devname();
        if port.is_root() {
            error!("{}: can not be disabled through this interface", devname);
            return Err(CxlError::invalid(format!(
                "{}: can not be disabled through this interface",
                devname
            )));
        }

        let Some(bus) = port.bus() else {
            error!("{}: failed to invalidate", devname);
            return Err(CxlError::no_device(format!("{}: failed to invalidate", devname)));
        };

        if let Err(e) = self.inner.backend.source.unbind(port.dev_path()) {
            debug!(devname, "unbind: {}", e);
        }

        if port.is_enabled() {
            error!("{}: failed to disable", devname);
            return Err(CxlError::Busy(format!("{}: failed to disable", devname)));
        }

        debug!("{}: disabled", devname);
        self.invalidate_bus(&bus);
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first search below `parent` for the endpoint hosted by `devname`
fn find_endpoint(parent: &Arc<Port>, devname: &str) -> Option<Arc<Port>> {
    for port in parent.child_ports() {
        if let Some(endpoint) = port.endpoints().into_iter().find(|ep| ep.host() == devname) {
            return Some(endpoint);
        }
        if let Some(endpoint) = find_endpoint(&port, devname) {
            return Some(endpoint);
        }
    }
    None
}
