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

//! Device selection from command-line arguments
//!
//! A memdev argument is `memN`, the bare number `N`, or `all`. Port
//! arguments work the same way against `rootN`, `portN` and `endpointN`.

use std::sync::Arc;

use cxl_core::{Context, Memdev, Port};

pub const ALL: &str = "all";

fn id_matches(filter: &str, devname: &str, id: u32) -> bool {
    filter == ALL || filter == devname || filter.parse::<u32>().map(|n| n == id).unwrap_or(false)
}

pub fn memdev_matches(filter: &str, memdev: &Memdev) -> bool {
    id_matches(filter, memdev.devname(), memdev.id())
}

pub fn port_matches(filter: &str, port: &Port) -> bool {
    id_matches(filter, port.devname(), port.id())
}

/// Memdevs matching any of `filters`, in discovery order
pub fn select_memdevs(ctx: &Context, filters: &[String]) -> Vec<Arc<Memdev>> {
    ctx.memdevs()
        .into_iter()
        .filter(|m| filters.iter().any(|f| memdev_matches(f, m)))
        .collect()
}

/// Every bus, switch port and endpoint, parents before children
pub fn all_ports(ctx: &Context) -> Vec<Arc<Port>> {
    let mut out = Vec::new();
    for bus in ctx.buses() {
        let mut ports = vec![Arc::clone(&bus)];
        ports.extend(bus.descendants());
        for port in ports {
            let endpoints = port.endpoints();
            out.push(port);
            out.extend(endpoints);
        }
    }
    out
}

/// Ports matching any of `filters`
pub fn select_ports(ctx: &Context, filters: &[String]) -> Vec<Arc<Port>> {
    all_ports(ctx)
        .into_iter()
        .filter(|p| filters.iter().any(|f| port_matches(f, p)))
        .collect()
}
