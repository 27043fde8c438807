//! Test fixtures: a throw-away sysfs tree and a scripted device channel

use crate::config::Config;
use crate::context::Context;
use crate::error::{CxlError, Result};
use crate::topology::Memdev;
use crate::hw::{
    AttributeSource, ChildEntry, DeviceChannel, DeviceNode, KernelModule, QueryResponse,
    SendRequest, SysfsSource,
};
use cxl_protocol::{CommandId, CommandInfo, LabelRead, LabelWriteHeader, LABEL_HEADER_SIZE, VARIABLE_SIZE};
use parking_lot::Mutex;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Fake sysfs tree
// ============================================================================

pub struct FakeSysfs {
    pub dir: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        let fake = Self {
            dir: TempDir::new().unwrap(),
        };
        fs::create_dir_all(fake.devices()).unwrap();
        fs::create_dir_all(fake.dir.path().join("dev/cxl")).unwrap();
        for driver in ["cxl_mem", "cxl_port"] {
            let d = fake.drivers().join(driver);
            fs::create_dir_all(&d).unwrap();
            fs::write(d.join("bind"), "").unwrap();
            fs::write(d.join("unbind"), "").unwrap();
        }
        fs::write(fake.sys().join("bus/cxl/flush"), "").unwrap();
        fake
    }

    pub fn sys(&self) -> PathBuf {
        self.dir.path().join("sys")
    }

    pub fn devices(&self) -> PathBuf {
        self.sys().join("bus/cxl/devices")
    }

    pub fn drivers(&self) -> PathBuf {
        self.sys().join("bus/cxl/drivers")
    }

    /// A real device directory under `sys/devices`
    pub fn device_dir(&self, rel: &str) -> PathBuf {
        let path = self.sys().join("devices").join(rel);
        fs::create_dir_all(&path).unwrap();
        fs::canonicalize(path).unwrap()
    }

    pub fn config(&self) -> Config {
        Config {
            sysfs_root: self.sys(),
            dev_root: self.dir.path().join("dev"),
        }
    }

    pub fn write(&self, path: &Path, value: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, value).unwrap();
    }

    /// Link `dev` to a driver
    pub fn bind(&self, dev: &Path) {
        if dev.join("driver").exists() {
            return;
        }
        let link = dev.join("driver");
        if fs::symlink_metadata(&link).is_err() {
            symlink(self.drivers().join("cxl_port"), link).unwrap();
        }
    }

    fn register(&self, real: &Path) {
        let name = real.file_name().unwrap();
        symlink(real, self.devices().join(name)).unwrap();
    }

    pub fn add_bus(&self, id: u32, host: &str) -> PathBuf {
        let host = self.device_dir(&format!("platform/{}", host));
        let root = host.join(format!("root{}", id));
        fs::create_dir_all(&root).unwrap();
        symlink(&host, root.join("uport")).unwrap();
        self.register(&root);
        self.bind(&root);
        root
    }

    pub fn add_port(&self, parent: &Path, id: u32, uport: &Path) -> PathBuf {
        let port = parent.join(format!("port{}", id));
        fs::create_dir_all(&port).unwrap();
        symlink(uport, port.join("uport")).unwrap();
        self.register(&port);
        self.bind(&port);
        port
    }

    pub fn add_endpoint(&self, parent: &Path, id: u32, memdev: &Path) -> PathBuf {
        let ep = parent.join(format!("endpoint{}", id));
        fs::create_dir_all(&ep).unwrap();
        symlink(memdev, ep.join("uport")).unwrap();
        self.register(&ep);
        self.bind(&ep);
        ep
    }

    pub fn add_dport(&self, port: &Path, id: u32, target: &Path, phys: Option<&Path>) {
        symlink(target, port.join(format!("dport{}", id))).unwrap();
        if let Some(phys) = phys {
            let link = target.join("physical_node");
            if fs::symlink_metadata(&link).is_err() {
                symlink(phys, link).unwrap();
            }
        }
    }

    pub fn add_decoder(&self, port: &Path, port_id: u32, id: u32, attrs: &[(&str, &str)]) -> PathBuf {
        let decoder = port.join(format!("decoder{}.{}", port_id, id));
        fs::create_dir_all(&decoder).unwrap();
        for (name, value) in attrs {
            self.write(&decoder.join(name), &format!("{}\n", value));
        }
        decoder
    }

    /// A memdev under `host` with the usual attributes
    pub fn add_memdev(&self, id: u32, host: &Path, payload_max: usize, lsa_size: usize) -> PathBuf {
        let mem = host.join(format!("mem{}", id));
        fs::create_dir_all(&mem).unwrap();
        let attrs = [
            ("dev", format!("250:{}", id)),
            ("pmem/size", "0x10000000".to_string()),
            ("ram/size", "0x0".to_string()),
            ("payload_max", payload_max.to_string()),
            ("label_storage_size", lsa_size.to_string()),
            ("firmware_version", "BWFW VERSION 00".to_string()),
            ("serial", format!("{:#x}", 0x1000 + id)),
            ("numa_node", "0".to_string()),
        ];
        for (name, value) in attrs {
            self.write(&mem.join(name), &format!("{}\n", value));
        }
        self.register(&mem);
        mem
    }
}

/// Paths of the standard test topology
pub struct Layout {
    pub root0: PathBuf,
    pub port1: PathBuf,
    pub endpoint2: PathBuf,
    pub mem0: PathBuf,
    pub mem1: PathBuf,
    pub host_bridge: PathBuf,
    pub root_port: PathBuf,
}

/// One bus with a host-bridge port and an endpoint for `mem0`; `mem1` is
/// present but disabled and unattached.
///
/// ```text
/// root0 (ACPI0017:00) -- dport34 -> ACPI0016:00 (phys pci0000:34)
///   decoder0.0 targets [34]
///   port1 (pci0000:34) -- dport0 -> 0000:34:00.0
///     decoder1.0 targets [0]
///     endpoint2 (mem0)
///       decoder2.0
/// ```
pub fn standard_topology(fake: &FakeSysfs) -> Layout {
    let host_bridge = fake.device_dir("pci0000:34");
    let root_port = fake.device_dir("pci0000:34/0000:34:00.0");
    let mem_host = fake.device_dir("pci0000:34/0000:34:00.0/0000:35:00.0");
    let acpi_bridge = fake.device_dir("platform/ACPI0016:00");

    let root0 = fake.add_bus(0, "ACPI0017:00");
    fake.add_dport(&root0, 34, &acpi_bridge, Some(&host_bridge));
    fake.add_decoder(
        &root0,
        0,
        0,
        &[
            ("start", "0x4000000000"),
            ("size", "0x10000000"),
            ("cap_pmem", "1"),
            ("cap_type3", "1"),
            ("cap_ram", "0"),
            ("target_list", "34"),
        ],
    );

    let port1 = fake.add_port(&root0, 1, &host_bridge);
    fake.add_dport(&port1, 0, &root_port, None);
    fake.add_decoder(&port1, 1, 0, &[("target_list", "0"), ("target_type", "expander"), ("locked", "1")]);

    let mem0 = fake.add_memdev(0, &mem_host, 1024, 4096);
    fake.bind(&mem0);
    let endpoint2 = fake.add_endpoint(&port1, 2, &mem0);
    fake.add_decoder(&endpoint2, 2, 0, &[("target_type", "accelerator")]);

    let mem1 = fake.add_memdev(1, &fake.device_dir("pci0000:36/0000:36:00.0"), 1024, 4096);

    Layout {
        root0,
        port1,
        endpoint2,
        mem0,
        mem1,
        host_bridge,
        root_port,
    }
}

// ============================================================================
// Sysfs source that behaves like the kernel on bind/unbind
// ============================================================================

/// Real sysfs reads, with bind/unbind creating and removing the `driver`
/// link the way the driver core would.
pub struct SimulatedSysfs {
    inner: SysfsSource,
    devices: PathBuf,
    pub bind_fails: bool,
    pub unbind_sticks: bool,
}

impl SimulatedSysfs {
    pub fn new(fake: &FakeSysfs) -> Self {
        Self {
            inner: SysfsSource::new(),
            devices: fake.devices(),
            bind_fails: false,
            unbind_sticks: false,
        }
    }
}

impl AttributeSource for SimulatedSysfs {
    fn read_attribute(&self, path: &Path) -> Result<String> {
        self.inner.read_attribute(path)
    }

    fn write_attribute(&self, path: &Path, value: &str) -> Result<()> {
        self.inner.write_attribute(path, value)
    }

    fn list_children(&self, root: &Path, prefix: &str) -> Result<Vec<ChildEntry>> {
        self.inner.list_children(root, prefix)
    }

    fn resolve_symlink(&self, path: &Path) -> Option<PathBuf> {
        self.inner.resolve_symlink(path)
    }

    fn is_driver_bound(&self, dev_path: &Path) -> bool {
        self.inner.is_driver_bound(dev_path)
    }

    fn module_for_alias(&self, _alias: &str) -> Option<KernelModule> {
        None
    }

    fn bind(&self, devname: &str, module: Option<KernelModule>, drivers_dir: &Path) -> Result<()> {
        self.inner.bind(devname, module, drivers_dir)?;
        if self.bind_fails {
            return Ok(());
        }
        let dev = self.devices.join(devname);
        symlink(drivers_dir.join("cxl_port"), dev.join("driver"))
            .map_err(|e| CxlError::transport("bind", &dev, e))
    }

    fn unbind(&self, dev_path: &Path) -> Result<()> {
        self.inner.unbind(dev_path)?;
        if self.unbind_sticks {
            return Ok(());
        }
        fs::remove_file(dev_path.join("driver")).map_err(|e| CxlError::transport("unbind", dev_path, e))
    }
}

// ============================================================================
// Scripted device channel
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub devname: String,
    pub id: u32,
    pub opcode: u16,
    pub input: Vec<u8>,
    pub out_len: usize,
}

#[derive(Default)]
pub struct ChannelState {
    pub queries: Vec<u32>,
    pub sends: Vec<SentCommand>,
    pub lsa: Vec<u8>,
    /// Send index that fails at the transport level
    pub fail_send_at: Option<usize>,
    /// Send index answered with a device error status
    pub status_at: Option<(usize, u32)>,
    pub identify: Vec<u8>,
    pub health: Vec<u8>,
    pub partition: Vec<u8>,
}

pub struct FakeChannel {
    pub commands: Vec<CommandInfo>,
    pub state: Mutex<ChannelState>,
}

fn info(id: CommandId, size_in: i32, size_out: i32) -> CommandInfo {
    CommandInfo {
        id: id.as_raw(),
        flags: 0,
        size_in,
        size_out,
    }
}

/// The command set a typical type-3 device advertises
pub fn default_commands() -> Vec<CommandInfo> {
    vec![
        info(CommandId::Identify, 0, 67),
        info(CommandId::GetPartitionInfo, 0, 32),
        info(CommandId::GetLsa, 8, VARIABLE_SIZE),
        info(CommandId::GetHealthInfo, 0, 18),
        info(CommandId::SetPartitionInfo, 9, 0),
        info(CommandId::SetLsa, VARIABLE_SIZE, 0),
        info(CommandId::Raw, VARIABLE_SIZE, VARIABLE_SIZE),
    ]
}

impl FakeChannel {
    pub fn new(commands: Vec<CommandInfo>, lsa_size: usize) -> Arc<Self> {
        Arc::new(Self {
            commands,
            state: Mutex::new(ChannelState {
                lsa: vec![0; lsa_size],
                ..Default::default()
            }),
        })
    }

    pub fn sends(&self) -> Vec<SentCommand> {
        self.state.lock().sends.clone()
    }

    pub fn queries(&self) -> Vec<u32> {
        self.state.lock().queries.clone()
    }
}

impl DeviceChannel for FakeChannel {
    fn query_commands(&self, _node: &DeviceNode, capacity: u32) -> Result<QueryResponse> {
        self.state.lock().queries.push(capacity);
        Ok(QueryResponse {
            n_commands: self.commands.len() as u32,
            commands: self.commands.iter().take(capacity as usize).copied().collect(),
        })
    }

    fn send_command(&self, node: &DeviceNode, request: &mut SendRequest<'_>) -> Result<()> {
        let mut state = self.state.lock();
        let index = state.sends.len();
        state.sends.push(SentCommand {
            devname: node.devname.clone(),
            id: request.id,
            opcode: request.opcode,
            input: request.input.to_vec(),
            out_len: request.output.len(),
        });

        if state.fail_send_at == Some(index) {
            return Err(CxlError::transport(
                "send",
                &node.path,
                std::io::Error::from_raw_os_error(libc::EIO),
            ));
        }
        if let Some((at, status)) = state.status_at {
            if at == index {
                request.retval = status;
                return Ok(());
            }
        }

        let canned = |payload: &[u8], out: &mut [u8]| {
            let n = payload.len().min(out.len());
            out[..n].copy_from_slice(&payload[..n]);
            n
        };

        let out_size = match CommandId::from_raw(request.id) {
            Some(CommandId::GetLsa) => {
                let req = LabelRead::decode(request.input)?;
                let (off, len) = (req.offset as usize, req.length as usize);
                request.output[..len].copy_from_slice(&state.lsa[off..off + len]);
                len
            }
            Some(CommandId::SetLsa) => {
                let hdr = LabelWriteHeader::decode(request.input)?;
                let data = &request.input[LABEL_HEADER_SIZE..];
                let off = hdr.offset as usize;
                state.lsa[off..off + data.len()].copy_from_slice(data);
                0
            }
            Some(CommandId::Identify) => canned(&state.identify, &mut request.output[..]),
            Some(CommandId::GetHealthInfo) => canned(&state.health, &mut request.output[..]),
            Some(CommandId::GetPartitionInfo) => canned(&state.partition, &mut request.output[..]),
            _ => 0,
        };
        request.out_size = out_size;
        request.retval = 0;
        Ok(())
    }
}

/// Context over the fake tree, the simulated source and `channel`
pub fn fake_context(fake: &FakeSysfs, channel: Arc<FakeChannel>) -> Context {
    Context::with_backends(fake.config(), Arc::new(SimulatedSysfs::new(fake)), channel)
}

/// A lone memdev wired to a scripted channel
pub struct Bench {
    pub fake: FakeSysfs,
    pub ctx: Context,
    pub channel: Arc<FakeChannel>,
    pub memdev: Arc<Memdev>,
}

pub fn bench(payload_max: usize, lsa_size: usize, commands: Vec<CommandInfo>) -> Bench {
    let fake = FakeSysfs::new();
    let mem = fake.add_memdev(0, &fake.device_dir("pci0000:34/0000:34:00.0/0000:35:00.0"), payload_max, lsa_size);
    fake.bind(&mem);
    let channel = FakeChannel::new(commands, lsa_size);
    let ctx = fake_context(&fake, Arc::clone(&channel));
    let memdev = ctx.memdev_by_name("mem0").unwrap();
    Bench {
        fake,
        ctx,
        channel,
        memdev,
    }
}
