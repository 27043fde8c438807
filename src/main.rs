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

use clap::Parser;
use cxl_core::Context;
use tracing::debug;

use cxlkit::cli::{self, Cli};
use cxlkit::logger;

const ENV_LOG: &str = "CXL_LOG";

fn init_tracing(verbose: bool) {
    let log_level = if verbose {
        "debug".to_string()
    } else {
        std::env::var(ENV_LOG).unwrap_or_else(|_| "warn".to_string())
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(&log_level)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli::load_config(&cli)?;
    debug!(sysfs = %config.sysfs_root.display(), dev = %config.dev_root.display(), "configuration");

    if cli.command.is_mutating() {
        logger::init_logging();
        logger::log_event(
            "startup",
            serde_json::json!({ "args": std::env::args().collect::<Vec<_>>() }),
        );
    }

    let ctx = Context::with_config(config);
    cli::run(&cli, &ctx)
}
