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

//! Audit log of mutating actions
//!
//! One JSON object per line: `{"ts_ms", "event", "data"}`. Logging never
//! fails the action being logged.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};

pub const ENV_AUDIT_LOG: &str = "CXL_AUDIT_LOG";
const DEFAULT_LOG_PATH: &str = "/var/log/cxlkit/events.json";
const FALLBACK_LOG_PATH: &str = "/tmp/cxlkit_events.json";

lazy_static! {
    static ref LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Where events go: `CXL_AUDIT_LOG` if set, else the system log path
pub fn log_path() -> PathBuf {
    std::env::var_os(ENV_AUDIT_LOG)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH))
}

/// Open the audit log, falling back to /tmp when the primary path is not
/// writable. Returns the path actually opened.
pub fn init_logging() -> Option<PathBuf> {
    let primary = log_path();
    let (file, path) = match open_append(&primary) {
        Some(f) => (f, primary),
        None => {
            let fallback = PathBuf::from(FALLBACK_LOG_PATH);
            (open_append(&fallback)?, fallback)
        }
    };
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }
    tracing::debug!(path = %path.display(), "audit log opened");
    Some(path)
}

/// Close the audit log; later events go to the fallback path
pub fn close_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = None;
    }
}

pub fn log_event(event: &str, data: Value) {
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    })
    .to_string();

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(f) = guard.as_mut() {
            let _ = writeln!(f, "{}", line);
            return;
        }
    }
    if let Some(mut f) = open_append(Path::new(FALLBACK_LOG_PATH)) {
        let _ = writeln!(f, "{}", line);
    }
}
