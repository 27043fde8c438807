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

//! `cxl list` output
//!
//! Every listed object becomes one JSON object whose first key names its
//! kind (`memdev`, `bus`, `port`, `endpoint`, `decoder`).

use std::sync::Arc;

use cxl_core::{Command, Context, Decoder, Memdev, Port, PortType, Result, Target, TargetType};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::filter;

#[derive(Debug, Default, Clone)]
pub struct ListOptions {
    /// Restrict memdevs (and everything hosting them) to this filter
    pub memdev: Option<String>,
    pub memdevs: bool,
    pub buses: bool,
    pub ports: bool,
    pub endpoints: bool,
    pub decoders: bool,
    pub targets: bool,
    pub health: bool,
    pub partition: bool,
    pub human: bool,
}

impl ListOptions {
    /// Memdevs are listed when no object kind was asked for
    fn list_memdevs(&self) -> bool {
        self.memdevs || !(self.buses || self.ports || self.endpoints || self.decoders)
    }
}

// ============================================================================
// Formatting helpers
// ============================================================================

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// `268435456` -> `256.00 MiB`
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

fn size_value(bytes: u64, human: bool) -> Value {
    if human {
        Value::from(format_size(bytes))
    } else {
        Value::from(bytes)
    }
}

fn state(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn object(kind: &str, devname: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(kind.to_string(), Value::from(devname));
    map
}

// ============================================================================
// Per-object JSON
// ============================================================================

fn health_json(memdev: &Memdev) -> Result<Value> {
    let mut cmd = Command::health_info(memdev)?;
    cmd.submit()?;
    let health = cmd.health_info_result()?;
    Ok(json!({
        "maintenance_needed": health.maintenance_needed(),
        "performance_degraded": health.performance_degraded(),
        "hw_replacement_needed": health.hw_replacement_needed(),
        "media_status": health.media(),
        "ext_life_used": health.ext_life_used(),
        "ext_temperature": health.ext_temperature(),
        "ext_corrected_volatile": health.ext_corrected_volatile_warning(),
        "ext_corrected_persistent": health.ext_corrected_persistent_warning(),
        "life_used_percent": health.life_used_percent(),
        "temperature": health.temperature_celsius(),
        "dirty_shutdowns": health.dirty_shutdowns,
        "volatile_errors": health.volatile_errors,
        "pmem_errors": health.pmem_errors,
    }))
}

fn partition_json(memdev: &Memdev, human: bool) -> Result<Value> {
    let mut cmd = Command::partition_info(memdev)?;
    cmd.submit()?;
    let info = cmd.partition_info_result()?;
    Ok(json!({
        "active_volatile_size": size_value(info.active_volatile_bytes(), human),
        "active_persistent_size": size_value(info.active_persistent_bytes(), human),
        "next_volatile_size": size_value(info.next_volatile_bytes(), human),
        "next_persistent_size": size_value(info.next_persistent_bytes(), human),
    }))
}

pub fn memdev_json(memdev: &Memdev, opts: &ListOptions) -> Value {
    let mut map = object("memdev", memdev.devname());
    map.insert("pmem_size".into(), size_value(memdev.pmem_size(), opts.human));
    map.insert("ram_size".into(), size_value(memdev.ram_size(), opts.human));
    if let Some(serial) = memdev.serial() {
        let value = if opts.human {
            Value::from(format!("{:#x}", serial))
        } else {
            Value::from(serial)
        };
        map.insert("serial".into(), value);
    }
    if let Some(node) = memdev.numa_node() {
        map.insert("numa_node".into(), Value::from(node));
    }
    map.insert("host".into(), Value::from(memdev.host()));
    map.insert("payload_max".into(), Value::from(memdev.payload_max()));
    map.insert("label_storage_size".into(), Value::from(memdev.label_size()));
    map.insert("firmware_version".into(), Value::from(memdev.firmware_version()));
    map.insert("state".into(), Value::from(state(memdev.is_enabled())));

    if opts.health {
        match health_json(memdev) {
            Ok(health) => {
                map.insert("health".into(), health);
            }
            Err(e) => warn!("{}: failed to read health info: {}", memdev.devname(), e),
        }
    }
    if opts.partition {
        match partition_json(memdev, opts.human) {
            Ok(info) => {
                map.insert("partition_info".into(), info);
            }
            Err(e) => warn!("{}: failed to read partition info: {}", memdev.devname(), e),
        }
    }
    Value::Object(map)
}

pub fn port_json(port: &Port) -> Value {
    let kind = match port.port_type() {
        PortType::Root => "bus",
        PortType::Switch => "port",
        PortType::Endpoint => "endpoint",
    };
    let mut map = object(kind, port.devname());
    if port.is_root() {
        map.insert("provider".into(), Value::from(port.provider()));
    }
    map.insert("host".into(), Value::from(port.host()));
    if let Some(parent) = port.parent() {
        map.insert("parent".into(), Value::from(parent.devname()));
    }
    map.insert("state".into(), Value::from(state(port.is_enabled())));
    Value::Object(map)
}

fn target_json(target: &Target) -> Value {
    let mut map = object("target", target.devname());
    map.insert("position".into(), Value::from(target.position()));
    map.insert("id".into(), Value::from(target.id()));
    if let Some(phys) = target.physical_node() {
        map.insert("physical_node".into(), Value::from(phys));
    }
    Value::Object(map)
}

pub fn decoder_json(port: &Port, decoder: &Decoder, opts: &ListOptions) -> Value {
    let mut map = object("decoder", decoder.devname());
    map.insert("port".into(), Value::from(port.devname()));
    if let Some(start) = decoder.resource() {
        map.insert("resource".into(), Value::from(start));
    }
    if let Some(size) = decoder.size() {
        map.insert("size".into(), size_value(size, opts.human));
    }
    if port.is_root() {
        map.insert("pmem_capable".into(), Value::from(decoder.is_pmem_capable()));
        map.insert("volatile_capable".into(), Value::from(decoder.is_volatile_capable()));
        map.insert("accelmem_capable".into(), Value::from(decoder.is_accelmem_capable()));
        map.insert("mem_capable".into(), Value::from(decoder.is_mem_capable()));
    } else if decoder.target_type() != TargetType::Unknown {
        map.insert("target_type".into(), json!(decoder.target_type()));
    }
    if decoder.is_locked() {
        map.insert("locked".into(), Value::from(true));
    }
    map.insert("nr_targets".into(), Value::from(decoder.nr_targets()));
    if opts.targets && decoder.nr_targets() > 0 {
        let targets = decoder.targets().iter().map(|t| target_json(t)).collect();
        map.insert("targets".into(), Value::Array(targets));
    }
    Value::Object(map)
}

// ============================================================================
// Listing
// ============================================================================

/// Build the `cxl list` array
pub fn list(ctx: &Context, opts: &ListOptions) -> Vec<Value> {
    let memdevs = match &opts.memdev {
        Some(f) => filter::select_memdevs(ctx, std::slice::from_ref(f)),
        None => ctx.memdevs(),
    };
    // with a memdev filter, only ports on the path to a selected memdev
    let relevant = |port: &Arc<Port>| {
        opts.memdev.is_none() || memdevs.iter().any(|m| ctx.port_hosts_memdev(port, m))
    };

    let mut out = Vec::new();
    if opts.list_memdevs() {
        out.extend(memdevs.iter().map(|m| memdev_json(m, opts)));
    }

    for port in filter::all_ports(ctx) {
        if !relevant(&port) {
            continue;
        }
        let wanted = match port.port_type() {
            PortType::Root => opts.buses,
            PortType::Switch => opts.ports,
            PortType::Endpoint => opts.endpoints,
        };
        if wanted {
            out.push(port_json(&port));
        }
        if opts.decoders {
            for decoder in port.decoders() {
                out.push(decoder_json(&port, &decoder, opts));
            }
        }
    }
    out
}
