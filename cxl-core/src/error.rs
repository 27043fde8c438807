//! Error types for cxl-core
//!
//! Re-exports the unified error type from cxl-error.

pub use cxl_error::{CxlError, Result};
