//! Raw mailbox channel to a memdev character device
//!
//! The kernel exposes two ioctls on `/dev/cxl/memN`: one lists the commands
//! the device supports and one sends a command. [`DeviceChannel`] is the
//! seam the command engine talks to; [`IoctlChannel`] is the real thing.

use crate::constants::ioctl;
use crate::error::{CxlError, Result};
use cxl_protocol::CommandInfo;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Identity of a memdev's character device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    pub devname: String,
    pub path: PathBuf,
    pub major: u32,
    pub minor: u32,
}

/// Result of a command query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponse {
    /// Number of commands the device supports
    pub n_commands: u32,
    /// Entries returned, at most the capacity asked for
    pub commands: Vec<CommandInfo>,
}

/// One send exchange. `out_size` and `retval` are filled in by the channel.
#[derive(Debug)]
pub struct SendRequest<'a> {
    pub id: u32,
    pub opcode: u16,
    pub input: &'a [u8],
    pub output: &'a mut [u8],
    pub out_size: usize,
    pub retval: u32,
}

pub trait DeviceChannel: Send + Sync {
    /// List supported commands. A `capacity` of 0 only asks for the count.
    fn query_commands(&self, node: &DeviceNode, capacity: u32) -> Result<QueryResponse>;

    fn send_command(&self, node: &DeviceNode, request: &mut SendRequest<'_>) -> Result<()>;
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct RawPayload {
    size: u32,
    rsvd: u32,
    payload: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct RawSendCommand {
    id: u32,
    flags: u32,
    raw_opcode: u16,
    raw_rsvd: u16,
    retval: u32,
    input: RawPayload,
    output: RawPayload,
}

const QUERY_HEADER_WORDS: usize = 2;
const QUERY_ENTRY_WORDS: usize = 4;

fn dev_major(dev: u64) -> u32 {
    (((dev >> 32) & 0xffff_f000) | ((dev >> 8) & 0x0000_0fff)) as u32
}

fn dev_minor(dev: u64) -> u32 {
    (((dev >> 12) & 0xffff_ff00) | (dev & 0x0000_00ff)) as u32
}

/// [`DeviceChannel`] over the kernel ioctl interface
#[derive(Debug, Default, Clone, Copy)]
pub struct IoctlChannel;

impl IoctlChannel {
    pub fn new() -> Self {
        Self
    }

    /// Open the node and make sure it is the character device we expect
    fn open(&self, node: &DeviceNode) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&node.path)
            .map_err(|e| CxlError::transport("open", &node.path, e))?;

        let meta = file
            .metadata()
            .map_err(|e| CxlError::transport("fstat", &node.path, e))?;

        let rdev = meta.rdev();
        if !meta.file_type().is_char_device()
            || dev_major(rdev) != node.major
            || dev_minor(rdev) != node.minor
        {
            debug!(
                devname = %node.devname,
                expected = %format!("{}:{}", node.major, node.minor),
                found = %format!("{}:{}", dev_major(rdev), dev_minor(rdev)),
                "device node mismatch"
            );
            return Err(CxlError::DeviceMismatch {
                path: node.path.clone(),
            });
        }

        Ok(file)
    }

    fn ioctl<T>(&self, file: &File, node: &DeviceNode, op: &'static str, request: u64, arg: *mut T) -> Result<()> {
        // SAFETY: `arg` points at a live, correctly sized repr(C) buffer for
        // this request, and the fd stays open for the duration of the call.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, arg) };
        if rc < 0 {
            return Err(CxlError::transport(op, &node.path, std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl DeviceChannel for IoctlChannel {
    fn query_commands(&self, node: &DeviceNode, capacity: u32) -> Result<QueryResponse> {
        let file = self.open(node)?;

        let words = QUERY_HEADER_WORDS + QUERY_ENTRY_WORDS * capacity as usize;
        let mut buf: Vec<u32> = Vec::new();
        buf.try_reserve_exact(words)
            .map_err(|_| CxlError::NoMemory(words * std::mem::size_of::<u32>()))?;
        buf.resize(words, 0);
        buf[0] = capacity;

        self.ioctl(&file, node, "query", ioctl::QUERY_COMMANDS, buf.as_mut_ptr())?;

        let n_commands = buf[0];
        let returned = n_commands.min(capacity) as usize;
        let commands = buf[QUERY_HEADER_WORDS..]
            .chunks_exact(QUERY_ENTRY_WORDS)
            .take(returned)
            .map(|e| CommandInfo {
                id: e[0],
                flags: e[1],
                size_in: e[2] as i32,
                size_out: e[3] as i32,
            })
            .collect();

        trace!(devname = %node.devname, n_commands, capacity, "queried commands");
        Ok(QueryResponse {
            n_commands,
            commands,
        })
    }

    fn send_command(&self, node: &DeviceNode, request: &mut SendRequest<'_>) -> Result<()> {
        let file = self.open(node)?;

        let mut raw = RawSendCommand {
            id: request.id,
            raw_opcode: request.opcode,
            input: RawPayload {
                size: request.input.len() as u32,
                payload: request.input.as_ptr() as u64,
                ..Default::default()
            },
            output: RawPayload {
                size: request.output.len() as u32,
                payload: request.output.as_mut_ptr() as u64,
                ..Default::default()
            },
            ..Default::default()
        };

        self.ioctl(&file, node, "send", ioctl::SEND_COMMAND, &mut raw as *mut RawSendCommand)?;

        request.retval = raw.retval;
        request.out_size = (raw.output.size as usize).min(request.output.len());
        trace!(
            devname = %node.devname,
            id = request.id,
            retval = raw.retval,
            out_size = request.out_size,
            "sent command"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_descriptor_layout() {
        assert_eq!(std::mem::size_of::<RawSendCommand>(), ioctl::SEND_DESCRIPTOR_SIZE);
        assert_eq!(std::mem::size_of::<RawPayload>(), 16);
    }

    #[test]
    fn test_dev_number_split() {
        // glibc makedev encoding; the second case only uses the high bits
        let small: u64 = (250 << 8) | 3;
        assert_eq!((dev_major(small), dev_minor(small)), (250, 3));

        let large: u64 = ((0x1000u64 & 0xffff_f000) << 32) | ((0x100u64 & 0xffff_ff00) << 12);
        assert_eq!((dev_major(large), dev_minor(large)), (0x1000, 0x100));
    }

    #[test]
    fn test_open_rejects_regular_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let node = DeviceNode {
            devname: "mem0".into(),
            path: file.path().to_path_buf(),
            major: 250,
            minor: 0,
        };
        let err = IoctlChannel::new().query_commands(&node, 0).unwrap_err();
        assert!(matches!(err, CxlError::DeviceMismatch { .. }));
    }

    #[test]
    fn test_open_missing_node_is_transport_error() {
        let node = DeviceNode {
            devname: "mem9".into(),
            path: PathBuf::from("/nonexistent/cxl/mem9"),
            major: 250,
            minor: 9,
        };
        let err = IoctlChannel::new().query_commands(&node, 0).unwrap_err();
        assert!(matches!(err, CxlError::Transport { op: "open", .. }));
        assert!(!err.is_unsupported());
    }
}
