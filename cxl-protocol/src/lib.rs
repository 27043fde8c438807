use serde::{Deserialize, Serialize};

/// Capacity fields are reported in multiples of 256MiB
pub const CAPACITY_MULTIPLIER: u64 = 256 * 1024 * 1024;

/// Length of the firmware revision string in the identify payload
pub const FW_REVISION_LENGTH: usize = 0x10;

/// Packed size of the identify output payload
pub const IDENTIFY_PAYLOAD_SIZE: usize = 67;

/// Packed size of the health info output payload
pub const HEALTH_INFO_PAYLOAD_SIZE: usize = 18;

/// Packed size of the partition info output payload
pub const PARTITION_INFO_PAYLOAD_SIZE: usize = 32;

/// Packed size of the set partition input payload
pub const SET_PARTITION_PAYLOAD_SIZE: usize = 9;

/// Offset/length header carried by get-label requests and set-label payloads
pub const LABEL_HEADER_SIZE: usize = 8;

/// Capability size meaning "variable, caller supplies the buffer"
pub const VARIABLE_SIZE: i32 = -1;

const LIFE_USED_NOT_IMPL: u8 = 0xff;
const TEMPERATURE_NOT_IMPL: u16 = 0xffff;

/// Command identifiers understood by the kernel mailbox interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum CommandId {
    Invalid = 0,
    Identify = 1,
    Raw = 2,
    GetSupportedLogs = 3,
    GetFwInfo = 4,
    GetPartitionInfo = 5,
    GetLsa = 6,
    GetHealthInfo = 7,
    GetLog = 8,
    SetPartitionInfo = 9,
    SetLsa = 10,
    GetAlertConfig = 11,
    SetAlertConfig = 12,
    GetShutdownState = 13,
    SetShutdownState = 14,
    GetPoison = 15,
    InjectPoison = 16,
    ClearPoison = 17,
    GetScanMediaCaps = 18,
    ScanMedia = 19,
    GetScanMedia = 20,
}

impl CommandId {
    const ALL: [CommandId; 21] = [
        CommandId::Invalid,
        CommandId::Identify,
        CommandId::Raw,
        CommandId::GetSupportedLogs,
        CommandId::GetFwInfo,
        CommandId::GetPartitionInfo,
        CommandId::GetLsa,
        CommandId::GetHealthInfo,
        CommandId::GetLog,
        CommandId::SetPartitionInfo,
        CommandId::SetLsa,
        CommandId::GetAlertConfig,
        CommandId::SetAlertConfig,
        CommandId::GetShutdownState,
        CommandId::SetShutdownState,
        CommandId::GetPoison,
        CommandId::InjectPoison,
        CommandId::ClearPoison,
        CommandId::GetScanMediaCaps,
        CommandId::ScanMedia,
        CommandId::GetScanMedia,
    ];

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandId::Invalid => "Invalid",
            CommandId::Identify => "Identify",
            CommandId::Raw => "Raw",
            CommandId::GetSupportedLogs => "Get Supported Logs",
            CommandId::GetFwInfo => "Get FW Info",
            CommandId::GetPartitionInfo => "Get Partition Info",
            CommandId::GetLsa => "Get Label Storage Area",
            CommandId::GetHealthInfo => "Get Health Info",
            CommandId::GetLog => "Get Log",
            CommandId::SetPartitionInfo => "Set Partition Info",
            CommandId::SetLsa => "Set Label Storage Area",
            CommandId::GetAlertConfig => "Get Alert Configuration",
            CommandId::SetAlertConfig => "Set Alert Configuration",
            CommandId::GetShutdownState => "Get Shutdown State",
            CommandId::SetShutdownState => "Set Shutdown State",
            CommandId::GetPoison => "Get Poison List",
            CommandId::InjectPoison => "Inject Poison",
            CommandId::ClearPoison => "Clear Poison",
            CommandId::GetScanMediaCaps => "Get Scan Media Capabilities",
            CommandId::ScanMedia => "Scan Media",
            CommandId::GetScanMedia => "Get Scan Media Results",
        }
    }
}

/// One entry of the device's supported-command table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub id: u32,
    pub flags: u32,
    /// Input payload size, or [`VARIABLE_SIZE`]
    pub size_in: i32,
    /// Output payload size, or [`VARIABLE_SIZE`]
    pub size_out: i32,
}

impl CommandInfo {
    /// Fixed input size the command expects, if it declares one
    pub fn fixed_input(&self) -> Option<usize> {
        (self.size_in > 0).then_some(self.size_in as usize)
    }

    /// Fixed output size the command produces, if it declares one
    pub fn fixed_output(&self) -> Option<usize> {
        (self.size_out > 0).then_some(self.size_out as usize)
    }

    pub fn name(&self) -> &'static str {
        CommandId::from_raw(self.id).map(CommandId::name).unwrap_or("Unknown")
    }
}

/// Convert a capacity field (in 256MiB units) to bytes
pub fn capacity_to_bytes(raw: u64) -> u64 {
    raw.wrapping_mul(CAPACITY_MULTIPLIER)
}

/// Convert a byte count to capacity units, rounding down
pub fn bytes_to_capacity(bytes: u64) -> u64 {
    bytes / CAPACITY_MULTIPLIER
}

// ============================================================================
// Little-endian cursor
// ============================================================================

struct LeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    fn new(buf: &'a [u8], need: usize, what: &str) -> Result<Self, String> {
        if buf.len() < need {
            return Err(format!(
                "{} payload too short: {} bytes (need {})",
                what,
                buf.len(),
                need
            ));
        }
        Ok(Self { buf, pos: 0 })
    }

    fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.bytes::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.bytes())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.bytes())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.bytes())
    }
}

fn check_out_len(out: &[u8], need: usize, what: &str) -> Result<(), String> {
    if out.len() < need {
        return Err(format!(
            "{} buffer too small: {} bytes (need {})",
            what,
            out.len(),
            need
        ));
    }
    Ok(())
}

// ============================================================================
// Identify
// ============================================================================

/// Decoded identify output. Capacity fields stay in device units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify {
    pub fw_revision: [u8; FW_REVISION_LENGTH],
    pub total_capacity: u64,
    pub volatile_capacity: u64,
    pub persistent_capacity: u64,
    pub partition_align: u64,
    pub info_event_log_size: u16,
    pub warning_event_log_size: u16,
    pub failure_event_log_size: u16,
    pub fatal_event_log_size: u16,
    pub lsa_size: u32,
    pub poison_list_max_mer: [u8; 3],
    pub inject_poison_limit: u16,
    pub poison_caps: u8,
    pub qos_telemetry_caps: u8,
}

impl Identify {
    pub fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = LeReader::new(buf, IDENTIFY_PAYLOAD_SIZE, "identify")?;
        Ok(Self {
            fw_revision: r.bytes(),
            total_capacity: r.u64(),
            volatile_capacity: r.u64(),
            persistent_capacity: r.u64(),
            partition_align: r.u64(),
            info_event_log_size: r.u16(),
            warning_event_log_size: r.u16(),
            failure_event_log_size: r.u16(),
            fatal_event_log_size: r.u16(),
            lsa_size: r.u32(),
            poison_list_max_mer: r.bytes(),
            inject_poison_limit: r.u16(),
            poison_caps: r.u8(),
            qos_telemetry_caps: r.u8(),
        })
    }

    /// Firmware revision with trailing NULs stripped
    pub fn fw_revision_str(&self) -> String {
        let end = self
            .fw_revision
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FW_REVISION_LENGTH);
        String::from_utf8_lossy(&self.fw_revision[..end]).trim().to_string()
    }

    pub fn total_bytes(&self) -> u64 {
        capacity_to_bytes(self.total_capacity)
    }

    pub fn volatile_only_bytes(&self) -> u64 {
        capacity_to_bytes(self.volatile_capacity)
    }

    pub fn persistent_only_bytes(&self) -> u64 {
        capacity_to_bytes(self.persistent_capacity)
    }

    pub fn partition_align_bytes(&self) -> u64 {
        capacity_to_bytes(self.partition_align)
    }
}

// ============================================================================
// Health info
// ============================================================================

const HEALTH_STATUS_MAINTENANCE_NEEDED: u8 = 1 << 0;
const HEALTH_STATUS_PERFORMANCE_DEGRADED: u8 = 1 << 1;
const HEALTH_STATUS_HW_REPLACEMENT_NEEDED: u8 = 1 << 2;

const EXT_LIFE_USED_MASK: u8 = 0b0000_0011;
const EXT_TEMPERATURE_MASK: u8 = 0b0000_1100;
const EXT_CORRECTED_VOLATILE_MASK: u8 = 1 << 4;
const EXT_CORRECTED_PERSISTENT_MASK: u8 = 1 << 5;

/// Media status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    Normal,
    NotReady,
    PersistenceLost,
    DataLost,
    PowerlossPersistenceLoss,
    ShutdownPersistenceLoss,
    PersistenceLossImminent,
    PowerlossDataLoss,
    ShutdownDataLoss,
    DataLossImminent,
    Reserved(u8),
}

impl From<u8> for MediaStatus {
    fn from(raw: u8) -> Self {
        match raw {
            0x0 => MediaStatus::Normal,
            0x1 => MediaStatus::NotReady,
            0x2 => MediaStatus::PersistenceLost,
            0x3 => MediaStatus::DataLost,
            0x4 => MediaStatus::PowerlossPersistenceLoss,
            0x5 => MediaStatus::ShutdownPersistenceLoss,
            0x6 => MediaStatus::PersistenceLossImminent,
            0x7 => MediaStatus::PowerlossDataLoss,
            0x8 => MediaStatus::ShutdownDataLoss,
            0x9 => MediaStatus::DataLossImminent,
            other => MediaStatus::Reserved(other),
        }
    }
}

/// Two-bit threshold field of the additional status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus {
    Normal,
    Warning,
    Critical,
    Reserved,
}

impl From<u8> for ThresholdStatus {
    fn from(raw: u8) -> Self {
        match raw {
            0 => ThresholdStatus::Normal,
            1 => ThresholdStatus::Warning,
            2 => ThresholdStatus::Critical,
            _ => ThresholdStatus::Reserved,
        }
    }
}

/// Decoded health info output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthInfo {
    pub health_status: u8,
    pub media_status: u8,
    pub ext_status: u8,
    pub life_used: u8,
    pub temperature: u16,
    pub dirty_shutdowns: u32,
    pub volatile_errors: u32,
    pub pmem_errors: u32,
}

impl HealthInfo {
    pub fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = LeReader::new(buf, HEALTH_INFO_PAYLOAD_SIZE, "health info")?;
        Ok(Self {
            health_status: r.u8(),
            media_status: r.u8(),
            ext_status: r.u8(),
            life_used: r.u8(),
            temperature: r.u16(),
            dirty_shutdowns: r.u32(),
            volatile_errors: r.u32(),
            pmem_errors: r.u32(),
        })
    }

    pub fn maintenance_needed(&self) -> bool {
        self.health_status & HEALTH_STATUS_MAINTENANCE_NEEDED != 0
    }

    pub fn performance_degraded(&self) -> bool {
        self.health_status & HEALTH_STATUS_PERFORMANCE_DEGRADED != 0
    }

    pub fn hw_replacement_needed(&self) -> bool {
        self.health_status & HEALTH_STATUS_HW_REPLACEMENT_NEEDED != 0
    }

    pub fn media(&self) -> MediaStatus {
        MediaStatus::from(self.media_status)
    }

    pub fn ext_life_used(&self) -> ThresholdStatus {
        ThresholdStatus::from(self.ext_status & EXT_LIFE_USED_MASK)
    }

    pub fn ext_temperature(&self) -> ThresholdStatus {
        ThresholdStatus::from((self.ext_status & EXT_TEMPERATURE_MASK) >> 2)
    }

    /// True when the corrected volatile error count crossed its warning threshold
    pub fn ext_corrected_volatile_warning(&self) -> bool {
        self.ext_status & EXT_CORRECTED_VOLATILE_MASK != 0
    }

    /// True when the corrected persistent error count crossed its warning threshold
    pub fn ext_corrected_persistent_warning(&self) -> bool {
        self.ext_status & EXT_CORRECTED_PERSISTENT_MASK != 0
    }

    /// Percentage of device life used, `None` if the device does not implement it
    pub fn life_used_percent(&self) -> Option<u8> {
        (self.life_used != LIFE_USED_NOT_IMPL).then_some(self.life_used)
    }

    /// Device temperature in degrees Celsius, `None` if not implemented
    pub fn temperature_celsius(&self) -> Option<u16> {
        (self.temperature != TEMPERATURE_NOT_IMPL).then_some(self.temperature)
    }
}

// ============================================================================
// Partitioning
// ============================================================================

/// Decoded partition info output, in capacity units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub active_volatile: u64,
    pub active_persistent: u64,
    pub next_volatile: u64,
    pub next_persistent: u64,
}

impl PartitionInfo {
    pub fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = LeReader::new(buf, PARTITION_INFO_PAYLOAD_SIZE, "partition info")?;
        Ok(Self {
            active_volatile: r.u64(),
            active_persistent: r.u64(),
            next_volatile: r.u64(),
            next_persistent: r.u64(),
        })
    }

    pub fn active_volatile_bytes(&self) -> u64 {
        capacity_to_bytes(self.active_volatile)
    }

    pub fn active_persistent_bytes(&self) -> u64 {
        capacity_to_bytes(self.active_persistent)
    }

    pub fn next_volatile_bytes(&self) -> u64 {
        capacity_to_bytes(self.next_volatile)
    }

    pub fn next_persistent_bytes(&self) -> u64 {
        capacity_to_bytes(self.next_persistent)
    }
}

/// When a partition change takes effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMode {
    Immediate,
    NextBoot,
}

const SET_PARTITION_FLAG_IMMEDIATE: u8 = 1 << 0;

/// Set partition input payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPartition {
    /// Volatile capacity in capacity units
    pub volatile_size: u64,
    pub mode: PartitionMode,
}

impl SetPartition {
    /// Build from a byte count; sizes below one unit round down
    pub fn from_bytes(volatile_bytes: u64, mode: PartitionMode) -> Self {
        Self {
            volatile_size: bytes_to_capacity(volatile_bytes),
            mode,
        }
    }

    pub fn encode_into(&self, out: &mut [u8]) -> Result<(), String> {
        check_out_len(out, SET_PARTITION_PAYLOAD_SIZE, "set partition")?;
        out[..8].copy_from_slice(&self.volatile_size.to_le_bytes());
        out[8] = match self.mode {
            PartitionMode::Immediate => SET_PARTITION_FLAG_IMMEDIATE,
            PartitionMode::NextBoot => 0,
        };
        Ok(())
    }
}

// ============================================================================
// Label storage area
// ============================================================================

/// Get-label input payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRead {
    pub offset: u32,
    pub length: u32,
}

impl LabelRead {
    pub fn encode_into(&self, out: &mut [u8]) -> Result<(), String> {
        check_out_len(out, LABEL_HEADER_SIZE, "get label")?;
        out[..4].copy_from_slice(&self.offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = LeReader::new(buf, LABEL_HEADER_SIZE, "get label")?;
        Ok(Self {
            offset: r.u32(),
            length: r.u32(),
        })
    }
}

/// Set-label input header; the label bytes follow it in the same payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelWriteHeader {
    pub offset: u32,
}

impl LabelWriteHeader {
    /// Encode the header followed by `data` into `out`
    pub fn encode_into(&self, data: &[u8], out: &mut [u8]) -> Result<(), String> {
        check_out_len(out, LABEL_HEADER_SIZE + data.len(), "set label")?;
        out[..4].copy_from_slice(&self.offset.to_le_bytes());
        out[4..8].fill(0);
        out[LABEL_HEADER_SIZE..LABEL_HEADER_SIZE + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = LeReader::new(buf, LABEL_HEADER_SIZE, "set label")?;
        Ok(Self { offset: r.u32() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identify_bytes() -> Vec<u8> {
        let mut buf = Vec::with_capacity(IDENTIFY_PAYLOAD_SIZE);
        buf.extend_from_slice(b"BWFW VERSION 00\0");
        buf.extend_from_slice(&4u64.to_le_bytes()); // total
        buf.extend_from_slice(&1u64.to_le_bytes()); // volatile
        buf.extend_from_slice(&3u64.to_le_bytes()); // persistent
        buf.extend_from_slice(&1u64.to_le_bytes()); // partition align
        for n in [8u16, 9, 10, 11] {
            buf.extend_from_slice(&n.to_le_bytes());
        }
        buf.extend_from_slice(&0x40000u32.to_le_bytes());
        buf.extend_from_slice(&[0x10, 0, 0]);
        buf.extend_from_slice(&64u16.to_le_bytes());
        buf.push(0x7);
        buf.push(0x1);
        buf
    }

    #[test]
    fn test_capacity_conversion() {
        assert_eq!(capacity_to_bytes(4), 1_073_741_824);
        assert_eq!(capacity_to_bytes(1), 268_435_456);
        assert_eq!(bytes_to_capacity(1_073_741_824), 4);
        assert_eq!(bytes_to_capacity(268_435_455), 0);
    }

    #[test]
    fn test_identify_decode() {
        let buf = identify_bytes();
        assert_eq!(buf.len(), IDENTIFY_PAYLOAD_SIZE);

        let id = Identify::decode(&buf).unwrap();
        assert_eq!(id.fw_revision_str(), "BWFW VERSION 00");
        assert_eq!(id.total_bytes(), 1_073_741_824);
        assert_eq!(id.volatile_only_bytes(), 268_435_456);
        assert_eq!(id.persistent_only_bytes(), 3 * CAPACITY_MULTIPLIER);
        assert_eq!(id.partition_align_bytes(), CAPACITY_MULTIPLIER);
        assert_eq!(id.fatal_event_log_size, 11);
        assert_eq!(id.lsa_size, 0x40000);
        assert_eq!(id.inject_poison_limit, 64);
        assert_eq!(id.qos_telemetry_caps, 1);
    }

    #[test]
    fn test_identify_short_payload_rejected() {
        let buf = identify_bytes();
        let err = Identify::decode(&buf[..40]).unwrap_err();
        assert!(err.contains("too short"));
    }

    #[test]
    fn test_health_info_fields() {
        let mut buf = vec![
            0b101, // maintenance + replacement
            0x3,   // data lost
            0b0010_0110, // life used critical, temp warning, corrected persistent
            33,
        ];
        buf.extend_from_slice(&42u16.to_le_bytes());
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0x0102_0304u32.to_le_bytes());

        let h = HealthInfo::decode(&buf).unwrap();
        assert!(h.maintenance_needed());
        assert!(!h.performance_degraded());
        assert!(h.hw_replacement_needed());
        assert_eq!(h.media(), MediaStatus::DataLost);
        assert_eq!(h.ext_life_used(), ThresholdStatus::Critical);
        assert_eq!(h.ext_temperature(), ThresholdStatus::Warning);
        assert!(!h.ext_corrected_volatile_warning());
        assert!(h.ext_corrected_persistent_warning());
        assert_eq!(h.life_used_percent(), Some(33));
        assert_eq!(h.temperature_celsius(), Some(42));
        assert_eq!(h.dirty_shutdowns, 7);
        assert_eq!(h.pmem_errors, 0x0102_0304);
    }

    #[test]
    fn test_health_info_not_implemented_sentinels() {
        let mut buf = vec![0, 0, 0, 0xff];
        buf.extend_from_slice(&0xffffu16.to_le_bytes());
        buf.extend_from_slice(&[0u8; 12]);

        let h = HealthInfo::decode(&buf).unwrap();
        assert_eq!(h.life_used_percent(), None);
        assert_eq!(h.temperature_celsius(), None);
        assert_eq!(h.media(), MediaStatus::Normal);
    }

    #[test]
    fn test_partition_info_bytes() {
        let mut buf = Vec::new();
        for raw in [2u64, 6, 4, 4] {
            buf.extend_from_slice(&raw.to_le_bytes());
        }
        let p = PartitionInfo::decode(&buf).unwrap();
        assert_eq!(p.active_volatile_bytes(), 2 * CAPACITY_MULTIPLIER);
        assert_eq!(p.next_persistent_bytes(), 1_073_741_824);
    }

    #[test]
    fn test_set_partition_encoding() {
        let mut out = [0xaau8; SET_PARTITION_PAYLOAD_SIZE];
        SetPartition::from_bytes(1_073_741_824, PartitionMode::Immediate)
            .encode_into(&mut out)
            .unwrap();
        assert_eq!(&out[..8], &4u64.to_le_bytes());
        assert_eq!(out[8], 1);

        SetPartition::from_bytes(0, PartitionMode::NextBoot)
            .encode_into(&mut out)
            .unwrap();
        assert_eq!(out, [0u8; SET_PARTITION_PAYLOAD_SIZE]);
    }

    #[test]
    fn test_label_write_layout() {
        let mut out = vec![0xffu8; LABEL_HEADER_SIZE + 3];
        LabelWriteHeader { offset: 1016 }
            .encode_into(&[1, 2, 3], &mut out)
            .unwrap();
        assert_eq!(&out[..4], &1016u32.to_le_bytes());
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
        assert_eq!(&out[8..], &[1, 2, 3]);

        let mut small = [0u8; 9];
        assert!(LabelWriteHeader { offset: 0 }
            .encode_into(&[1, 2], &mut small)
            .is_err());
    }

    #[test]
    fn test_label_read_layout() {
        let mut out = [0u8; LABEL_HEADER_SIZE];
        LabelRead { offset: 0x10, length: 0x200 }.encode_into(&mut out).unwrap();
        assert_eq!(out, [0x10, 0, 0, 0, 0, 0x02, 0, 0]);
        assert_eq!(
            LabelRead::decode(&out).unwrap(),
            LabelRead { offset: 0x10, length: 0x200 }
        );
    }

    #[test]
    fn test_command_ids() {
        assert_eq!(CommandId::from_raw(6), Some(CommandId::GetLsa));
        assert_eq!(CommandId::from_raw(99), None);
        assert_eq!(CommandId::SetLsa.as_raw(), 10);

        let info = CommandInfo { id: 7, flags: 0, size_in: 0, size_out: 18 };
        assert_eq!(info.name(), "Get Health Info");
        assert_eq!(info.fixed_input(), None);
        assert_eq!(info.fixed_output(), Some(18));

        let variable = CommandInfo { id: 6, flags: 0, size_in: 8, size_out: VARIABLE_SIZE };
        assert_eq!(variable.fixed_output(), None);
    }

    #[test]
    fn test_media_status_serializes_snake_case() {
        let json = serde_json::to_string(&MediaStatus::PersistenceLossImminent).unwrap();
        assert_eq!(json, "\"persistence_loss_imminent\"");
    }
}
