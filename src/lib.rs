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

//! cxlkit
//!
//! The `cxl` command-line tool over [`cxl_core`]: topology listing, label
//! storage transfers and device enable/disable.

pub mod cli;
pub mod filter;
pub mod labels;
pub mod listing;
pub mod logger;
