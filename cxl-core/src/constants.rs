//! Constants for cxl-core
//!
//! Default filesystem locations, sysfs naming prefixes, "not reported"
//! sentinels and the kernel ioctl ABI numbers.

/// Default filesystem roots
pub mod paths {
    /// Root of the sysfs mount
    pub const SYSFS_ROOT: &str = "/sys";

    /// Root of the device node tree
    pub const DEV_ROOT: &str = "/dev";

    /// CXL bus directory, relative to the sysfs root
    pub const CXL_BUS: &str = "bus/cxl";

    /// Device node directory, relative to the dev root
    pub const CXL_DEV_DIR: &str = "cxl";

    /// Name of the bus used when binding CXL drivers
    pub const CXL_BUS_NAME: &str = "cxl";
}

/// Name prefixes used to recognise children in sysfs directories
pub mod prefix {
    pub const MEMDEV: &str = "mem";
    pub const BUS: &str = "root";
    pub const PORT: &str = "port";
    pub const ENDPOINT: &str = "endpoint";
    pub const DPORT: &str = "dport";
    pub const PMEM_BRIDGE: &str = "pmem";

    /// Decoders are named `decoder<port id>.<decoder id>`
    pub fn decoder(port_id: u32) -> String {
        format!("decoder{}.", port_id)
    }
}

/// Sysfs attribute names
pub mod attr {
    pub const DEV: &str = "dev";
    pub const PMEM_SIZE: &str = "pmem/size";
    pub const RAM_SIZE: &str = "ram/size";
    pub const PAYLOAD_MAX: &str = "payload_max";
    pub const LABEL_STORAGE_SIZE: &str = "label_storage_size";
    pub const FIRMWARE_VERSION: &str = "firmware_version";
    pub const SERIAL: &str = "serial";
    pub const NUMA_NODE: &str = "numa_node";
    pub const MODALIAS: &str = "modalias";
    pub const UPORT: &str = "uport";
    pub const FLUSH: &str = "flush";

    pub const START: &str = "start";
    pub const SIZE: &str = "size";
    pub const LOCKED: &str = "locked";
    pub const TARGET_TYPE: &str = "target_type";
    pub const TARGET_LIST: &str = "target_list";
    pub const CAP_PMEM: &str = "cap_pmem";
    pub const CAP_RAM: &str = "cap_ram";
    pub const CAP_TYPE2: &str = "cap_type2";
    pub const CAP_TYPE3: &str = "cap_type3";

    pub const PHYSICAL_NODE: &str = "physical_node";
    pub const DRIVER: &str = "driver";
    pub const BIND: &str = "bind";
    pub const UNBIND: &str = "unbind";
}

/// Values reported when an optional attribute is missing
pub mod sentinel {
    /// Decoder start/size not reported
    pub const SIZE_UNKNOWN: u64 = u64::MAX;

    /// Serial number not reported
    pub const SERIAL_UNKNOWN: u64 = u64::MAX;

    /// NUMA node not reported
    pub const NUMA_UNKNOWN: i32 = -1;
}

/// Provider names reported for known root bus hosts
pub mod provider {
    pub const ACPI_HOST: &str = "ACPI0017:00";
    pub const ACPI_NAME: &str = "ACPI.CXL";
    pub const TEST_HOST: &str = "cxl_acpi.0";
    pub const TEST_NAME: &str = "cxl_test";
}

/// CXL memdev ioctl interface
pub mod ioctl {
    /// `_IOR(0xCE, 1, struct cxl_mem_query_commands)`
    pub const QUERY_COMMANDS: u64 = 0x8008_CE01;

    /// `_IOWR(0xCE, 2, struct cxl_send_command)`
    pub const SEND_COMMAND: u64 = 0xC030_CE02;

    /// Size of the send descriptor exchanged with the kernel
    pub const SEND_DESCRIPTOR_SIZE: usize = 48;
}
