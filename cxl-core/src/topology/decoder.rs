//! HDM decoders and their interleave targets

use super::{devname_of, host_path_contains, Identified, Memdev, Port};
use crate::constants::{attr, sentinel};
use crate::error::Result;
use crate::hw::sysfs::{parse_u64, read_flag, read_u64_or};
use crate::hw::ChildEntry;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Unknown,
    Expander,
    Accelerator,
}

impl TargetType {
    fn from_attr(value: &str) -> Self {
        match value {
            "accelerator" => TargetType::Accelerator,
            "expander" => TargetType::Expander,
            _ => TargetType::Unknown,
        }
    }
}

pub struct Decoder {
    id: u32,
    dev_path: PathBuf,
    port: Weak<Port>,
    start: u64,
    size: u64,
    pmem_capable: bool,
    volatile_capable: bool,
    mem_capable: bool,
    accelmem_capable: bool,
    locked: bool,
    target_type: TargetType,
    targets: Vec<Arc<Target>>,
}

impl Identified for Decoder {
    fn node_id(&self) -> u32 {
        self.id
    }

    fn node_name(&self) -> &str {
        self.devname()
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("devname", &self.devname())
            .field("start", &self.start)
            .field("size", &self.size)
            .field("nr_targets", &self.targets.len())
            .finish_non_exhaustive()
    }
}

/// A target before its decoder exists
struct TargetSpec {
    id: u32,
    position: usize,
    dev_path: PathBuf,
    phys_path: Option<PathBuf>,
}

struct Caps {
    pmem: bool,
    volatile: bool,
    mem: bool,
    accelmem: bool,
    locked: bool,
    target_type: Option<TargetType>,
}

impl Decoder {
    pub(crate) fn discover(port: &Arc<Port>, child: &ChildEntry) -> Result<Arc<Self>> {
        let source = port.backend_source();
        let base = child.path.as_path();
        let devname = child.name.as_str();
        debug!(devname, base = %base.display(), "adding decoder");

        let start = read_u64_or(source, &base.join(attr::START), sentinel::SIZE_UNKNOWN);
        let size = read_u64_or(source, &base.join(attr::SIZE), sentinel::SIZE_UNKNOWN);

        let caps = if port.is_root() {
            Caps {
                accelmem: read_flag(source, &base.join(attr::CAP_TYPE2)),
                mem: read_flag(source, &base.join(attr::CAP_TYPE3)),
                volatile: read_flag(source, &base.join(attr::CAP_RAM)),
                pmem: read_flag(source, &base.join(attr::CAP_PMEM)),
                locked: read_flag(source, &base.join(attr::LOCKED)),
                target_type: None,
            }
        } else {
            Caps {
                pmem: true,
                volatile: true,
                mem: true,
                accelmem: true,
                locked: read_flag(source, &base.join(attr::LOCKED)),
                target_type: source
                    .read_attribute(&base.join(attr::TARGET_TYPE))
                    .ok()
                    .map(|t| TargetType::from_attr(&t)),
            }
        };

        let list = source
            .read_attribute(&base.join(attr::TARGET_LIST))
            .unwrap_or_default();
        let specs = resolve_targets(port, devname, &list);

        Ok(Arc::new_cyclic(|weak: &Weak<Decoder>| Decoder {
            id: child.id,
            dev_path: base.to_path_buf(),
            port: Arc::downgrade(port),
            start,
            size,
            pmem_capable: caps.pmem,
            volatile_capable: caps.volatile,
            mem_capable: caps.mem,
            accelmem_capable: caps.accelmem,
            locked: caps.locked,
            target_type: caps.target_type.unwrap_or(TargetType::Unknown),
            targets: specs
                .into_iter()
                .map(|spec| {
                    Arc::new(Target {
                        id: spec.id,
                        position: spec.position,
                        dev_path: spec.dev_path,
                        phys_path: spec.phys_path,
                        decoder: weak.clone(),
                    })
                })
                .collect(),
        }))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// `decoderP.N`
    pub fn devname(&self) -> &str {
        devname_of(&self.dev_path)
    }

    pub fn port(&self) -> Option<Arc<Port>> {
        self.port.upgrade()
    }

    /// Base address, `None` if not reported
    pub fn resource(&self) -> Option<u64> {
        (self.start != sentinel::SIZE_UNKNOWN).then_some(self.start)
    }

    /// Decode window size, `None` if not reported
    pub fn size(&self) -> Option<u64> {
        (self.size != sentinel::SIZE_UNKNOWN).then_some(self.size)
    }

    pub fn is_pmem_capable(&self) -> bool {
        self.pmem_capable
    }

    pub fn is_volatile_capable(&self) -> bool {
        self.volatile_capable
    }

    pub fn is_mem_capable(&self) -> bool {
        self.mem_capable
    }

    pub fn is_accelmem_capable(&self) -> bool {
        self.accelmem_capable
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Only switch and endpoint decoders report a target type
    pub fn target_type(&self) -> TargetType {
        self.target_type
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    /// Number of targets that resolved
    pub fn nr_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn target_by_memdev(&self, memdev: &Memdev) -> Option<Arc<Target>> {
        self.targets.iter().find(|t| t.maps_memdev(memdev)).cloned()
    }

    pub fn target_by_position(&self, position: usize) -> Option<Arc<Target>> {
        self.targets.iter().find(|t| t.position == position).cloned()
    }
}

/// Parse a comma separated dport id list and resolve each entry against the
/// port's `dportN` links. Stops at the first entry that fails.
fn resolve_targets(port: &Port, devname: &str, list: &str) -> Vec<TargetSpec> {
    let source = port.backend_source();
    let mut specs = Vec::new();
    let tokens: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    for (position, token) in tokens.iter().enumerate() {
        let Some(id) = parse_u64(token).and_then(|v| u32::try_from(v).ok()) else {
            break;
        };

        let dport = port.dev_path().join(format!("dport{}", id));
        let Some(dev_path) = source.resolve_symlink(&dport) else {
            break;
        };
        let phys_path = source.resolve_symlink(&dport.join(attr::PHYSICAL_NODE));

        debug!(
            devname,
            position,
            target = %dev_path.display(),
            phys_path = %phys_path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "none".into()),
            "resolved target"
        );
        specs.push(TargetSpec {
            id,
            position,
            dev_path,
            phys_path,
        });
    }

    if specs.len() < tokens.len() {
        error!("{}: failed to parse target{}", devname, specs.len());
    }
    specs
}

pub struct Target {
    id: u32,
    position: usize,
    dev_path: PathBuf,
    phys_path: Option<PathBuf>,
    decoder: Weak<Decoder>,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("dev_path", &self.dev_path)
            .finish_non_exhaustive()
    }
}

impl Target {
    /// Interconnect id of the downstream port this target routes to
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Index within the decoder's interleave set
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn devname(&self) -> &str {
        devname_of(&self.dev_path)
    }

    pub fn dev_path(&self) -> &Path {
        &self.dev_path
    }

    /// Name of the physical device behind the target, if linked
    pub fn physical_node(&self) -> Option<&str> {
        self.phys_path.as_deref().map(devname_of)
    }

    pub fn decoder(&self) -> Option<Arc<Decoder>> {
        self.decoder.upgrade()
    }

    /// True if the memdev sits below this target
    pub fn maps_memdev(&self, memdev: &Memdev) -> bool {
        let needle = self.phys_path.as_deref().unwrap_or(&self.dev_path);
        debug!(memdev = %memdev.host_path().display(), target = %self.dev_path.display(), "target maps memdev?");
        host_path_contains(memdev.host_path(), needle)
    }
}
