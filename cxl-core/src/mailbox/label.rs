//! Label storage area transfers
//!
//! Reads and writes larger than one mailbox payload are split into chunks
//! of `payload_max - 8` bytes (the set-label header) and issued in order.
//! The first failing chunk stops the transfer.

use super::command::Command;
use crate::error::{CxlError, Result};
use crate::topology::Memdev;
use cxl_protocol::LABEL_HEADER_SIZE;
use tracing::{debug, error, warn};

/// One transaction of a chunked transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelChunk {
    /// Offset into the label storage area
    pub offset: usize,
    /// Offset into the caller's buffer
    pub buf_offset: usize,
    pub len: usize,
}

/// Iterator over the chunks covering `length` bytes at `offset`
#[derive(Debug, Clone)]
pub struct LabelChunks {
    offset: usize,
    done: usize,
    length: usize,
    capacity: usize,
}

impl LabelChunks {
    pub fn new(offset: usize, length: usize, capacity: usize) -> Self {
        Self {
            offset,
            done: 0,
            length,
            capacity,
        }
    }
}

impl Iterator for LabelChunks {
    type Item = LabelChunk;

    fn next(&mut self) -> Option<LabelChunk> {
        if self.done >= self.length || self.capacity == 0 {
            return None;
        }
        let len = self.capacity.min(self.length - self.done);
        let chunk = LabelChunk {
            offset: self.offset + self.done,
            buf_offset: self.done,
            len,
        };
        self.done += len;
        Some(chunk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelOp {
    Read,
    Write,
    Zero,
}

impl LabelOp {
    fn name(self) -> &'static str {
        match self {
            LabelOp::Read => "read",
            LabelOp::Write => "write",
            LabelOp::Zero => "zero",
        }
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| CxlError::invalid(format!("label {} {} out of range", what, value)))
}

/// Map a non-zero device status to an error
fn check_status(memdev: &Memdev, op: LabelOp, cmd: &Command) -> Result<()> {
    let status = cmd.mbox_status();
    if status != 0 {
        error!(
            "{}: label {} failed, firmware status: {}",
            memdev.devname(),
            op.name(),
            status
        );
        return Err(CxlError::Firmware { status });
    }
    Ok(())
}

impl Memdev {
    /// Bytes of label data a single set-label command can carry
    pub fn label_chunk_capacity(&self) -> Result<usize> {
        match self.payload_max().checked_sub(LABEL_HEADER_SIZE) {
            Some(capacity) if capacity > 0 => Ok(capacity),
            _ => Err(CxlError::invalid(format!(
                "{}: payload max {} leaves no room for label data",
                self.devname(),
                self.payload_max()
            ))),
        }
    }

    fn label_transfer<F>(&self, op: LabelOp, offset: usize, length: usize, mut step: F) -> Result<()>
    where
        F: FnMut(LabelChunk) -> Result<()>,
    {
        if length == 0 {
            return Ok(());
        }

        let capacity = self.label_chunk_capacity()?;
        let mut transferred = 0;
        for chunk in LabelChunks::new(offset, length, capacity) {
            if let Err(e) = step(chunk) {
                error!(
                    "{}: label {} failed at offset {}: {}",
                    self.devname(),
                    op.name(),
                    chunk.offset,
                    e
                );
                if op != LabelOp::Read {
                    warn!("{}: labels may be in an inconsistent state", self.devname());
                }
                return Err(CxlError::LabelTransfer {
                    transferred,
                    source: Box::new(e),
                });
            }
            transferred += chunk.len;
        }

        debug!(devname = %self.devname(), op = op.name(), offset, length, "label transfer complete");
        Ok(())
    }

    /// Fill `buf` from label storage starting at `offset`. On failure the
    /// chunks read before the failing one are already in `buf`.
    pub fn read_label(&self, buf: &mut [u8], offset: usize) -> Result<()> {
        let length = buf.len();
        self.label_transfer(LabelOp::Read, offset, length, |chunk| {
            let mut cmd = Command::read_label(self, to_u32(chunk.offset, "offset")?, to_u32(chunk.len, "length")?)?;
            cmd.submit()?;
            check_status(self, LabelOp::Read, &cmd)?;
            cmd.read_label_payload(&mut buf[chunk.buf_offset..chunk.buf_offset + chunk.len])
        })
    }

    /// Write `buf` to label storage starting at `offset`
    pub fn write_label(&self, buf: &[u8], offset: usize) -> Result<()> {
        self.write_chunks(LabelOp::Write, buf, offset)
    }

    /// Zero `length` bytes of label storage starting at `offset`
    pub fn zero_label(&self, length: usize, offset: usize) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        let mut zeroes = Vec::new();
        zeroes
            .try_reserve_exact(length)
            .map_err(|_| CxlError::NoMemory(length))?;
        zeroes.resize(length, 0);
        self.write_chunks(LabelOp::Zero, &zeroes, offset)
    }

    fn write_chunks(&self, op: LabelOp, buf: &[u8], offset: usize) -> Result<()> {
        self.label_transfer(op, offset, buf.len(), |chunk| {
            let data = &buf[chunk.buf_offset..chunk.buf_offset + chunk.len];
            let mut cmd = Command::write_label(self, data, to_u32(chunk.offset, "offset")?)?;
            cmd.submit()?;
            check_status(self, op, &cmd)
        })
    }
}
