//! Mailbox commands
//!
//! A [`Command`] walks a fixed sequence of states:
//!
//! 1. **Created**: bound to one memdev.
//! 2. **Queried**: the device's supported-command table is known. It is
//!    fetched with two query calls (count, then entries) and cached on the
//!    memdev, so later commands skip it.
//! 3. **Validated**: the requested id was found in the table. If it is
//!    absent the command is unsupported and construction fails.
//! 4. **Allocated**: fixed-size payload buffers sized from the table.
//! 5. **Submitted / Completed**: the send went through. `Completed` means
//!    the device returned status 0; `Submitted` means it returned an error
//!    status, which the output accessors report instead of parsing.
//!
//! A command keeps its own copy of the device identity, so it does not
//! depend on the topology staying alive.

use crate::error::{CxlError, Result};
use crate::hw::{DeviceChannel, DeviceNode, SendRequest};
use crate::topology::Memdev;
use cxl_protocol::{
    CommandId, CommandInfo, HealthInfo, Identify, LabelRead, LabelWriteHeader, PartitionInfo,
    PartitionMode, SetPartition, LABEL_HEADER_SIZE,
};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    NotRun,
    Ok,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommandState {
    Created,
    Queried,
    Validated,
    Allocated,
    Submitted,
    Completed,
}

/// One direction of payload. A caller-supplied buffer takes precedence over
/// the automatically allocated one; both are released with the command.
#[derive(Debug, Default)]
struct Payload {
    auto: Option<Vec<u8>>,
    user: Option<Vec<u8>>,
    size: usize,
}

impl Payload {
    fn buffer(&self) -> Option<&Vec<u8>> {
        self.user.as_ref().or(self.auto.as_ref())
    }

    fn active(&self) -> &[u8] {
        self.buffer().map(|b| &b[..self.size]).unwrap_or(&[])
    }

    fn active_mut(&mut self) -> &mut [u8] {
        let size = self.size;
        match (&mut self.user, &mut self.auto) {
            (Some(buf), _) | (None, Some(buf)) => &mut buf[..size],
            (None, None) => &mut [],
        }
    }
}

fn alloc_zeroed(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| CxlError::NoMemory(size))?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Fetch (or reuse) the memdev's supported-command table
fn supported_commands(memdev: &Memdev) -> Result<Arc<Vec<CommandInfo>>> {
    let mut cache = memdev.capabilities.lock();
    if let Some(table) = cache.as_ref() {
        return Ok(Arc::clone(table));
    }

    let node = memdev.device_node();
    let channel = &memdev.backend.channel;
    let count = channel.query_commands(&node, 0)?.n_commands;
    let table = channel.query_commands(&node, count)?.commands;
    debug!(devname = %memdev.devname(), commands = table.len(), "queried supported commands");

    let table = Arc::new(table);
    *cache = Some(Arc::clone(&table));
    Ok(table)
}

pub struct Command {
    node: DeviceNode,
    payload_max: usize,
    channel: Arc<dyn DeviceChannel>,
    capabilities: Option<Arc<Vec<CommandInfo>>>,
    query_status: QueryStatus,
    query_index: Option<usize>,
    state: CommandState,
    id: CommandId,
    opcode: u16,
    input: Payload,
    output: Payload,
    out_size: usize,
    status: u32,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("devname", &self.node.devname)
            .field("id", &self.id)
            .field("state", &self.state)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Build a command for `id`, negotiating support with the device and
    /// allocating any fixed-size payloads it declares.
    pub fn new(memdev: &Memdev, id: CommandId) -> Result<Self> {
        let mut cmd = Self {
            node: memdev.device_node(),
            payload_max: memdev.payload_max(),
            channel: Arc::clone(&memdev.backend.channel),
            capabilities: None,
            query_status: QueryStatus::NotRun,
            query_index: None,
            state: CommandState::Created,
            id,
            opcode: 0,
            input: Payload::default(),
            output: Payload::default(),
            out_size: 0,
            status: 0,
        };

        cmd.capabilities = Some(supported_commands(memdev)?);
        cmd.query_status = QueryStatus::Ok;
        cmd.state = CommandState::Queried;

        let info = cmd.validate()?;
        cmd.state = CommandState::Validated;

        if let Some(size) = info.fixed_input() {
            cmd.set_input_payload(None, size)?;
        }
        if let Some(size) = info.fixed_output() {
            cmd.set_output_payload(None, size)?;
        }
        cmd.state = CommandState::Allocated;

        trace!(devname = %cmd.node.devname, cmd = id.name(), "command allocated");
        Ok(cmd)
    }

    fn validate(&mut self) -> Result<CommandInfo> {
        let table = self.capabilities.as_deref().map(Vec::as_slice).unwrap_or(&[]);
        match table.iter().position(|c| c.id == self.id.as_raw()) {
            Some(index) => {
                self.query_index = Some(index);
                Ok(table[index])
            }
            None => {
                self.query_status = QueryStatus::Unsupported;
                debug!(devname = %self.node.devname, cmd = self.id.name(), "command not supported");
                Err(CxlError::unsupported(format!(
                    "{}: {} not supported",
                    self.node.devname,
                    self.id.name()
                )))
            }
        }
    }

    // ========================================================================
    // Constructors for the commands the library knows about
    // ========================================================================

    pub fn identify(memdev: &Memdev) -> Result<Self> {
        Self::new(memdev, CommandId::Identify)
    }

    pub fn health_info(memdev: &Memdev) -> Result<Self> {
        Self::new(memdev, CommandId::GetHealthInfo)
    }

    pub fn partition_info(memdev: &Memdev) -> Result<Self> {
        Self::new(memdev, CommandId::GetPartitionInfo)
    }

    /// Request a new volatile capacity; the rest becomes persistent
    pub fn set_partition(memdev: &Memdev, volatile_bytes: u64, mode: PartitionMode) -> Result<Self> {
        let mut cmd = Self::new(memdev, CommandId::SetPartitionInfo)?;
        cmd.ensure_input(cxl_protocol::SET_PARTITION_PAYLOAD_SIZE)?;
        SetPartition::from_bytes(volatile_bytes, mode).encode_into(cmd.input.active_mut())?;
        Ok(cmd)
    }

    /// Read `length` bytes of label storage at `offset`
    pub fn read_label(memdev: &Memdev, offset: u32, length: u32) -> Result<Self> {
        let mut cmd = Self::new(memdev, CommandId::GetLsa)?;
        cmd.ensure_input(LABEL_HEADER_SIZE)?;
        LabelRead { offset, length }.encode_into(cmd.input.active_mut())?;
        cmd.set_output_payload(None, length as usize)?;
        Ok(cmd)
    }

    /// Write `data` to label storage at `offset`
    pub fn write_label(memdev: &Memdev, data: &[u8], offset: u32) -> Result<Self> {
        let mut cmd = Self::new(memdev, CommandId::SetLsa)?;
        cmd.set_input_payload(None, LABEL_HEADER_SIZE + data.len())?;
        LabelWriteHeader { offset }.encode_into(data, cmd.input.active_mut())?;
        Ok(cmd)
    }

    /// Pass-through command with a device opcode. Payloads are left to the
    /// caller.
    pub fn raw(memdev: &Memdev, opcode: u16) -> Result<Self> {
        if opcode == 0 {
            return Err(CxlError::invalid(format!(
                "{}: opcode 0 is reserved",
                memdev.devname()
            )));
        }
        let mut cmd = Self::new(memdev, CommandId::Raw)?;
        cmd.opcode = opcode;
        Ok(cmd)
    }

    fn ensure_input(&mut self, size: usize) -> Result<()> {
        if self.input.size < size {
            self.set_input_payload(None, size)?;
        }
        Ok(())
    }

    // ========================================================================
    // Payload management
    // ========================================================================

    fn check_size(&self, size: usize, buf: Option<&Vec<u8>>, what: &str) -> Result<()> {
        if size > self.payload_max {
            return Err(CxlError::invalid(format!(
                "{}: {} size {} exceeds payload max {}",
                self.node.devname, what, size, self.payload_max
            )));
        }
        if let Some(buf) = buf {
            if buf.len() < size {
                return Err(CxlError::invalid(format!(
                    "{}: {} buffer of {} bytes is smaller than {}",
                    self.node.devname,
                    what,
                    buf.len(),
                    size
                )));
            }
        }
        Ok(())
    }

    /// Use `buf` as the input payload, or allocate a zeroed one when `None`
    pub fn set_input_payload(&mut self, buf: Option<Vec<u8>>, size: usize) -> Result<()> {
        self.check_size(size, buf.as_ref(), "input")?;
        match buf {
            Some(buf) => self.input.user = Some(buf),
            None => self.input.auto = Some(alloc_zeroed(size)?),
        }
        self.input.size = size;
        Ok(())
    }

    /// Use `buf` as the output payload, or allocate a zeroed one when `None`
    pub fn set_output_payload(&mut self, buf: Option<Vec<u8>>, size: usize) -> Result<()> {
        self.check_size(size, buf.as_ref(), "output")?;
        match buf {
            Some(buf) => self.output.user = Some(buf),
            None => self.output.auto = Some(alloc_zeroed(size)?),
        }
        self.output.size = size;
        Ok(())
    }

    /// Mutable view of the input payload, for raw commands
    pub fn input_payload_mut(&mut self) -> &mut [u8] {
        self.input.active_mut()
    }

    pub fn input_payload(&self) -> &[u8] {
        self.input.active()
    }

    /// Output payload as returned by the device
    pub fn output_payload(&self) -> &[u8] {
        let out = self.output.active();
        &out[..self.out_size.min(out.len())]
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Send the command. Transport failures are returned; a non-zero device
    /// status is recorded and surfaced by the accessors.
    pub fn submit(&mut self) -> Result<()> {
        match self.query_status {
            QueryStatus::Ok => {}
            QueryStatus::Unsupported => {
                return Err(CxlError::unsupported(format!(
                    "{}: {} not supported",
                    self.node.devname,
                    self.id.name()
                )))
            }
            QueryStatus::NotRun => {
                return Err(CxlError::invalid(format!(
                    "{}: command not queried",
                    self.node.devname
                )))
            }
        }
        if self.state < CommandState::Allocated {
            return Err(CxlError::invalid(format!(
                "{}: command not allocated",
                self.node.devname
            )));
        }

        let mut request = SendRequest {
            id: self.id.as_raw(),
            opcode: self.opcode,
            input: self.input.active(),
            output: self.output.active_mut(),
            out_size: 0,
            retval: 0,
        };
        self.channel.send_command(&self.node, &mut request)?;

        let (status, out_size) = (request.retval, request.out_size);
        self.status = status;
        self.out_size = out_size;
        self.state = if status == 0 {
            CommandState::Completed
        } else {
            CommandState::Submitted
        };

        if status != 0 {
            debug!(devname = %self.node.devname, cmd = self.id.name(), status, "device returned error status");
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn devname(&self) -> &str {
        &self.node.devname
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn query_status(&self) -> QueryStatus {
        self.query_status
    }

    /// Capability table entry this command was validated against
    pub fn info(&self) -> Option<CommandInfo> {
        let table = self.capabilities.as_deref()?;
        table.get(self.query_index?).copied()
    }

    /// Device status from the last submission (0 is success)
    pub fn mbox_status(&self) -> u32 {
        self.status
    }

    /// Bytes the device wrote into the output payload
    pub fn out_size(&self) -> usize {
        self.out_size
    }

    /// Output payload of a submitted `expected` command with good status
    fn result_payload(&self, expected: CommandId) -> Result<&[u8]> {
        if self.id != expected {
            return Err(CxlError::invalid(format!(
                "{}: {} is not a {} command",
                self.node.devname,
                self.id.name(),
                expected.name()
            )));
        }
        if self.state < CommandState::Submitted {
            return Err(CxlError::invalid(format!(
                "{}: {} not submitted",
                self.node.devname,
                self.id.name()
            )));
        }
        if self.status != 0 {
            return Err(CxlError::Firmware {
                status: self.status,
            });
        }
        Ok(self.output.active())
    }

    pub fn identify_result(&self) -> Result<Identify> {
        Ok(Identify::decode(self.result_payload(CommandId::Identify)?)?)
    }

    pub fn health_info_result(&self) -> Result<HealthInfo> {
        Ok(HealthInfo::decode(self.result_payload(CommandId::GetHealthInfo)?)?)
    }

    pub fn partition_info_result(&self) -> Result<PartitionInfo> {
        Ok(PartitionInfo::decode(self.result_payload(CommandId::GetPartitionInfo)?)?)
    }

    /// Percentage of life used; unsupported if the device does not track it
    pub fn life_used(&self) -> Result<u8> {
        self.health_info_result()?
            .life_used_percent()
            .ok_or_else(|| CxlError::unsupported(format!("{}: life used not implemented", self.node.devname)))
    }

    /// Temperature in Celsius; unsupported if the device does not report it
    pub fn temperature(&self) -> Result<u16> {
        self.health_info_result()?
            .temperature_celsius()
            .ok_or_else(|| CxlError::unsupported(format!("{}: temperature not implemented", self.node.devname)))
    }

    /// Copy label data read by a submitted get-label command into `buf`.
    /// `buf` may not be longer than the length requested.
    pub fn read_label_payload(&self, buf: &mut [u8]) -> Result<()> {
        let out = self.result_payload(CommandId::GetLsa)?;
        let requested = LabelRead::decode(self.input.active())?.length as usize;
        if buf.len() > requested || buf.len() > out.len() {
            return Err(CxlError::invalid(format!(
                "{}: label read of {} bytes exceeds request of {}",
                self.node.devname,
                buf.len(),
                requested
            )));
        }
        buf.copy_from_slice(&out[..buf.len()]);
        Ok(())
    }
}
