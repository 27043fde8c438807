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

//! Command Line Interface
//!
//! `cxl` subcommands over a [`Context`]. Mutating actions are recorded in
//! the audit log.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use cxl_core::{Config, Context};
use serde_json::json;
use tracing::error;

use crate::labels::{self, summary};
use crate::listing::{self, ListOptions};
use crate::{filter, logger};

#[derive(Parser)]
#[command(name = "cxl")]
#[command(version)]
#[command(about = "cxl - Inspect and manage CXL memory devices")]
#[command(long_about = "cxl - Inspect and manage CXL memory devices

Lists the CXL topology (memory devices, buses, ports, endpoints, decoders),
moves label storage data in and out of memory devices, and binds or unbinds
devices from their drivers.

EXAMPLES:
    cxl list                           List memory devices
    cxl list -BPED -T                  List the whole topology with targets
    cxl list -m mem0 -H -I             Health and partition info for mem0
    cxl read-labels mem0 -o labels.bin Save mem0's label area
    cxl write-labels mem0 -i labels.bin
    cxl zero-labels all
    cxl disable-memdev 0

ENVIRONMENT VARIABLES:
    CXL_LOG=debug          Log filter (default: warn)
    CXL_SYSFS_ROOT=/sys    Sysfs mount point
    CXL_DEV_ROOT=/dev      Device node directory
    CXL_AUDIT_LOG=<file>   Audit log (default: /var/log/cxlkit/events.json)")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Sysfs mount point
    #[arg(long, global = true, value_name = "DIR")]
    pub sysfs_root: Option<PathBuf>,

    /// Directory holding the cxl device nodes
    #[arg(long, global = true, value_name = "DIR")]
    pub dev_root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List CXL objects as JSON
    List(ListArgs),

    /// Read label storage into a file or stdout
    ReadLabels(ReadLabelsArgs),

    /// Write label storage from a file or stdin
    WriteLabels(WriteLabelsArgs),

    /// Zero label storage
    ZeroLabels(LabelArgs),

    /// Bind memory devices to their driver
    EnableMemdev(DeviceArgs),

    /// Unbind memory devices from their driver
    DisableMemdev(DeviceArgs),

    /// Bind ports to their driver
    EnablePort(DeviceArgs),

    /// Unbind switch or endpoint ports from their driver
    DisablePort(DeviceArgs),
}

impl Commands {
    /// Commands that change device state and go to the audit log
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Commands::List(_) | Commands::ReadLabels(_))
    }
}

#[derive(Args)]
pub struct ListArgs {
    /// Only objects related to this memdev (memN, N or all)
    #[arg(short = 'm', long = "memdev", value_name = "MEMDEV")]
    pub memdev: Option<String>,

    /// Include memory devices
    #[arg(short = 'M', long)]
    pub memdevs: bool,

    /// Include buses
    #[arg(short = 'B', long)]
    pub buses: bool,

    /// Include switch ports
    #[arg(short = 'P', long)]
    pub ports: bool,

    /// Include endpoints
    #[arg(short = 'E', long)]
    pub endpoints: bool,

    /// Include decoders
    #[arg(short = 'D', long)]
    pub decoders: bool,

    /// Include decoder targets
    #[arg(short = 'T', long)]
    pub targets: bool,

    /// Include memdev health info
    #[arg(short = 'H', long)]
    pub health: bool,

    /// Include memdev partition info
    #[arg(short = 'I', long)]
    pub partition: bool,

    /// Human friendly sizes
    #[arg(short = 'u', long)]
    pub human: bool,
}

impl From<&ListArgs> for ListOptions {
    fn from(args: &ListArgs) -> Self {
        ListOptions {
            memdev: args.memdev.clone(),
            memdevs: args.memdevs,
            buses: args.buses,
            ports: args.ports,
            endpoints: args.endpoints,
            decoders: args.decoders,
            targets: args.targets,
            health: args.health,
            partition: args.partition,
            human: args.human,
        }
    }
}

#[derive(Args)]
pub struct LabelArgs {
    /// Memory devices (memN, N or all)
    #[arg(required = true, value_name = "MEMDEV")]
    pub memdevs: Vec<String>,

    /// Bytes to transfer (default: the whole label area)
    #[arg(short = 's', long)]
    pub size: Option<usize>,

    /// Offset into the label area
    #[arg(short = 'O', long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(Args)]
pub struct ReadLabelsArgs {
    #[command(flatten)]
    pub labels: LabelArgs,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct WriteLabelsArgs {
    /// Memory device (memN or N)
    #[arg(value_name = "MEMDEV")]
    pub memdev: String,

    /// Bytes to write (default: the input size)
    #[arg(short = 's', long)]
    pub size: Option<usize>,

    /// Offset into the label area
    #[arg(short = 'O', long, default_value_t = 0)]
    pub offset: usize,

    /// Input file (default: stdin)
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,
}

#[derive(Args)]
pub struct DeviceArgs {
    /// Devices to act on (name, number or all)
    #[arg(required = true, value_name = "DEVICE")]
    pub devices: Vec<String>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Defaults, then the config file, then the environment, then flags
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(root) = &cli.sysfs_root {
        config.sysfs_root = root.clone();
    }
    if let Some(root) = &cli.dev_root {
        config.dev_root = root.clone();
    }
    Ok(config)
}

// ============================================================================
// CLI Execution
// ============================================================================

pub fn run(cli: &Cli, ctx: &Context) -> anyhow::Result<()> {
    match &cli.command {
        Commands::List(args) => cmd_list(ctx, args),
        Commands::ReadLabels(args) => cmd_read_labels(ctx, args),
        Commands::WriteLabels(args) => cmd_write_labels(ctx, args),
        Commands::ZeroLabels(args) => cmd_zero_labels(ctx, args),
        Commands::EnableMemdev(args) => cmd_memdev_state(ctx, args, true),
        Commands::DisableMemdev(args) => cmd_memdev_state(ctx, args, false),
        Commands::EnablePort(args) => cmd_port_state(ctx, args, true),
        Commands::DisablePort(args) => cmd_port_state(ctx, args, false),
    }
}

/// Report how many devices succeeded; fail if any did not
fn finish(action: &str, noun: &str, done: usize, total: usize) -> anyhow::Result<()> {
    eprintln!("{}", summary(action, done, noun));
    if done < total {
        bail!("{} of {} {}s failed", total - done, total, noun);
    }
    Ok(())
}

fn cmd_list(ctx: &Context, args: &ListArgs) -> anyhow::Result<()> {
    let items = listing::list(ctx, &ListOptions::from(args));
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

// ============================================================================
// Label Commands
// ============================================================================

fn cmd_read_labels(ctx: &Context, args: &ReadLabelsArgs) -> anyhow::Result<()> {
    let memdevs = filter::select_memdevs(ctx, &args.labels.memdevs);
    if memdevs.is_empty() {
        bail!("no memdev matches {:?}", args.labels.memdevs);
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    let mut done = 0;
    for memdev in &memdevs {
        match labels::read_labels(memdev, args.labels.offset, args.labels.size) {
            Ok(data) => {
                out.write_all(&data)?;
                done += 1;
            }
            Err(e) => error!("{}: {}", memdev.devname(), e),
        }
    }
    out.flush()?;
    finish("read", "mem", done, memdevs.len())
}

fn cmd_write_labels(ctx: &Context, args: &WriteLabelsArgs) -> anyhow::Result<()> {
    if args.memdev == filter::ALL {
        bail!("write-labels takes a single memdev");
    }
    let memdevs = filter::select_memdevs(ctx, std::slice::from_ref(&args.memdev));
    let [memdev] = memdevs.as_slice() else {
        bail!("no memdev matches {}", args.memdev);
    };

    let mut data = Vec::new();
    match &args.input {
        Some(path) => {
            File::open(path)
                .and_then(|mut f| f.read_to_end(&mut data))
                .with_context(|| format!("failed to read {}", path.display()))?;
        }
        None => {
            io::stdin().read_to_end(&mut data).context("failed to read stdin")?;
        }
    }

    let done = match labels::write_labels(memdev, &data, args.offset, args.size) {
        Ok(len) => {
            logger::log_event(
                "write-labels",
                json!({"memdev": memdev.devname(), "offset": args.offset, "bytes": len}),
            );
            1
        }
        Err(e) => {
            error!("{}: {}", memdev.devname(), e);
            0
        }
    };
    finish("wrote", "mem", done, 1)
}

fn cmd_zero_labels(ctx: &Context, args: &LabelArgs) -> anyhow::Result<()> {
    let memdevs = filter::select_memdevs(ctx, &args.memdevs);
    if memdevs.is_empty() {
        bail!("no memdev matches {:?}", args.memdevs);
    }

    let mut done = 0;
    for memdev in &memdevs {
        match labels::zero_labels(memdev, args.offset, args.size) {
            Ok(len) => {
                logger::log_event(
                    "zero-labels",
                    json!({"memdev": memdev.devname(), "offset": args.offset, "bytes": len}),
                );
                done += 1;
            }
            Err(e) => error!("{}: {}", memdev.devname(), e),
        }
    }
    finish("zeroed", "mem", done, memdevs.len())
}

// ============================================================================
// Enable / Disable Commands
// ============================================================================

fn cmd_memdev_state(ctx: &Context, args: &DeviceArgs, enable: bool) -> anyhow::Result<()> {
    let memdevs = filter::select_memdevs(ctx, &args.devices);
    if memdevs.is_empty() {
        bail!("no memdev matches {:?}", args.devices);
    }

    let event = if enable { "enable-memdev" } else { "disable-memdev" };
    let mut done = 0;
    for memdev in &memdevs {
        let result = if enable {
            memdev.enable()
        } else {
            ctx.disable_memdev(memdev)
        };
        match result {
            Ok(()) => {
                logger::log_event(event, json!({"memdev": memdev.devname()}));
                done += 1;
            }
            Err(e) => error!("{}: {}", memdev.devname(), e),
        }
    }
    finish(if enable { "enabled" } else { "disabled" }, "mem", done, memdevs.len())
}

fn cmd_port_state(ctx: &Context, args: &DeviceArgs, enable: bool) -> anyhow::Result<()> {
    let ports = filter::select_ports(ctx, &args.devices);
    if ports.is_empty() {
        bail!("no port matches {:?}", args.devices);
    }

    let event = if enable { "enable-port" } else { "disable-port" };
    let mut done = 0;
    for port in &ports {
        let result = if enable {
            port.enable()
        } else {
            ctx.disable_port(port)
        };
        match result {
            Ok(()) => {
                logger::log_event(event, json!({"port": port.devname()}));
                done += 1;
            }
            Err(e) => error!("{}: {}", port.devname(), e),
        }
    }
    finish(if enable { "enabled" } else { "disabled" }, "port", done, ports.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_list_flags() {
        let cli = Cli::try_parse_from(["cxl", "list", "-BPED", "-T", "-m", "mem0"]).unwrap();
        let Commands::List(args) = &cli.command else {
            panic!("expected list");
        };
        let opts = ListOptions::from(args);
        assert!(opts.buses && opts.ports && opts.endpoints && opts.decoders && opts.targets);
        assert_eq!(opts.memdev.as_deref(), Some("mem0"));
        assert!(!cli.command.is_mutating());
    }

    #[test]
    fn test_parse_label_commands() {
        let cli = Cli::try_parse_from(["cxl", "zero-labels", "mem0", "3", "-s", "1024", "-O", "64"]).unwrap();
        let Commands::ZeroLabels(args) = &cli.command else {
            panic!("expected zero-labels");
        };
        assert_eq!(args.memdevs, vec!["mem0", "3"]);
        assert_eq!(args.size, Some(1024));
        assert_eq!(args.offset, 64);
        assert!(cli.command.is_mutating());

        assert!(Cli::try_parse_from(["cxl", "read-labels"]).is_err());
    }

    #[test]
    #[serial]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from(["cxl", "--sysfs-root", "/tmp/sys", "list"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.sysfs_root, PathBuf::from("/tmp/sys"));
    }
}
