/*
 * This file is part of cxlkit.
 *
 * Copyright (C) 2025 cxlkit contributors
 *
 * cxlkit is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * cxlkit is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with cxlkit. If not, see <https://www.gnu.org/licenses/>.
 */

//! Label storage actions behind `read-labels`, `write-labels` and
//! `zero-labels`

use cxl_core::{CxlError, Memdev, Result};
use tracing::{debug, error};

/// Bytes to transfer: `size` if given, else the rest of the label area
/// from `offset`. The range must fit in the label area.
pub fn transfer_len(memdev: &Memdev, offset: usize, size: Option<usize>) -> Result<usize> {
    let label_size = memdev.label_size();
    if offset > label_size {
        return Err(CxlError::invalid(format!(
            "{}: offset {} is beyond the label area ({} bytes)",
            memdev.devname(),
            offset,
            label_size
        )));
    }
    let len = size.unwrap_or(label_size - offset);
    if len > label_size - offset {
        return Err(CxlError::invalid(format!(
            "{}: {} bytes at offset {} exceeds the label area ({} bytes)",
            memdev.devname(),
            len,
            offset,
            label_size
        )));
    }
    Ok(len)
}

/// Labels belong to the nvdimm subsystem while the bridge is bound
fn check_writable(memdev: &Memdev) -> Result<()> {
    if memdev.nvdimm_bridge_active() {
        return Err(CxlError::Busy(format!(
            "{}: active nvdimm bridge, labels are in use",
            memdev.devname()
        )));
    }
    Ok(())
}

pub fn read_labels(memdev: &Memdev, offset: usize, size: Option<usize>) -> Result<Vec<u8>> {
    let len = transfer_len(memdev, offset, size)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| CxlError::NoMemory(len))?;
    buf.resize(len, 0);
    memdev.read_label(&mut buf, offset)?;
    debug!(devname = %memdev.devname(), offset, len, "read labels");
    Ok(buf)
}

/// Write `data` (or its first `size` bytes) at `offset`. Returns the bytes
/// written. Fails if `data` is shorter than `size`.
pub fn write_labels(memdev: &Memdev, data: &[u8], offset: usize, size: Option<usize>) -> Result<usize> {
    check_writable(memdev)?;
    let len = match size {
        Some(size) if size > data.len() => {
            error!(
                "{}: input holds {} bytes, {} requested",
                memdev.devname(),
                data.len(),
                size
            );
            return Err(CxlError::no_device(format!(
                "{}: short label input: {} of {} bytes",
                memdev.devname(),
                data.len(),
                size
            )));
        }
        Some(size) => size,
        None => data.len(),
    };
    let len = transfer_len(memdev, offset, Some(len))?;
    memdev.write_label(&data[..len], offset)?;
    debug!(devname = %memdev.devname(), offset, len, "wrote labels");
    Ok(len)
}

pub fn zero_labels(memdev: &Memdev, offset: usize, size: Option<usize>) -> Result<usize> {
    check_writable(memdev)?;
    let len = transfer_len(memdev, offset, size)?;
    memdev.zero_label(len, offset)?;
    debug!(devname = %memdev.devname(), offset, len, "zeroed labels");
    Ok(len)
}

/// `read 2 mems`, `zeroed 1 mem`
pub fn summary(action: &str, count: usize, noun: &str) -> String {
    format!("{} {} {}{}", action, count, noun, if count == 1 { "" } else { "s" })
}
