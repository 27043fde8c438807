//! Unified error handling for cxlkit
//!
//! This crate provides a single error type used across all cxlkit components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using CxlError
pub type Result<T> = std::result::Result<T, CxlError>;

/// Unified error type for all cxlkit operations
#[derive(thiserror::Error, Debug)]
pub enum CxlError {
    // ============================================================================
    // Resource Exhaustion
    // ============================================================================
    #[error("Out of memory allocating {0} bytes")]
    NoMemory(usize),

    // ============================================================================
    // Attribute Source Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Attribute not found: {path}")]
    AttributeNotFound { path: PathBuf },

    #[error("Failed to read attribute {path}: {source}")]
    AttributeRead { path: PathBuf, source: io::Error },

    #[error("Failed to write attribute {path}: {source}")]
    AttributeWrite { path: PathBuf, source: io::Error },

    #[error("Failed to parse attribute {path}: '{value}'")]
    AttributeParse { path: PathBuf, value: String },

    // ============================================================================
    // Device and Transport Errors
    // ============================================================================
    #[error("{op} failed on {path}: {source}")]
    Transport {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to validate {path} as a CXL memdev node")]
    DeviceMismatch { path: PathBuf },

    #[error("No such device: {0}")]
    NoDevice(String),

    #[error("Device busy: {0}")]
    Busy(String),

    // ============================================================================
    // Protocol and State Errors
    // ============================================================================
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed payload: {0}")]
    Protocol(String),

    #[error("Firmware status: {status}")]
    Firmware { status: u32 },

    #[error("Label transfer failed after {transferred} bytes: {source}")]
    LabelTransfer {
        transferred: usize,
        #[source]
        source: Box<CxlError>,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CxlError {
    /// Create an invalid argument error from a string
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an unsupported operation error from a string
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a no-device error from a string
    pub fn no_device(msg: impl Into<String>) -> Self {
        Self::NoDevice(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an I/O failure on a device node
    pub fn transport(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Transport {
            op,
            path: path.into(),
            source,
        }
    }

    /// True for the "not found / unsupported" category, which callers must be
    /// able to tell apart from transport failures.
    pub fn is_unsupported(&self) -> bool {
        match self {
            Self::Unsupported(_) | Self::AttributeNotFound { .. } => true,
            Self::LabelTransfer { source, .. } => source.is_unsupported(),
            _ => false,
        }
    }

    /// The innermost error, looking through label transfer wrappers.
    pub fn root(&self) -> &CxlError {
        match self {
            Self::LabelTransfer { source, .. } => source.root(),
            other => other,
        }
    }

    /// Conventional negative errno for this error, as reported by the C tooling
    pub fn errno(&self) -> i32 {
        let code = match self {
            Self::NoMemory(_) => libc::ENOMEM,
            Self::Io(e) | Self::AttributeRead { source: e, .. } | Self::AttributeWrite { source: e, .. } => {
                e.raw_os_error().unwrap_or(libc::EIO)
            }
            Self::Transport { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            Self::AttributeNotFound { .. } => libc::ENOENT,
            Self::AttributeParse { .. } => libc::EINVAL,
            Self::DeviceMismatch { .. } | Self::NoDevice(_) | Self::Firmware { .. } => libc::ENXIO,
            Self::Busy(_) => libc::EBUSY,
            Self::Unsupported(_) => libc::EOPNOTSUPP,
            Self::InvalidArgument(_) | Self::Protocol(_) => libc::EINVAL,
            Self::LabelTransfer { source, .. } => return source.errno(),
            Self::Config(_) | Self::Json(_) => libc::EINVAL,
        };
        -code
    }
}

// Allow converting from String to CxlError
impl From<String> for CxlError {
    fn from(s: String) -> Self {
        Self::Protocol(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(CxlError::NoMemory(16).errno(), -libc::ENOMEM);
        assert_eq!(CxlError::unsupported("GET_LSA").errno(), -libc::EOPNOTSUPP);
        assert_eq!(CxlError::invalid("size").errno(), -libc::EINVAL);
        assert_eq!(CxlError::Busy("mem0".into()).errno(), -libc::EBUSY);
        assert_eq!(CxlError::Firmware { status: 3 }.errno(), -libc::ENXIO);
    }

    #[test]
    fn test_label_transfer_unwraps_to_cause() {
        let err = CxlError::LabelTransfer {
            transferred: 1016,
            source: Box::new(CxlError::Firmware { status: 5 }),
        };
        assert_eq!(err.errno(), -libc::ENXIO);
        assert!(matches!(err.root(), CxlError::Firmware { status: 5 }));
        assert!(err.to_string().contains("after 1016 bytes"));
    }

    #[test]
    fn test_unsupported_is_distinct_from_transport() {
        assert!(CxlError::unsupported("identify").is_unsupported());
        let io = io::Error::from_raw_os_error(libc::EIO);
        assert!(!CxlError::transport("send", "/dev/cxl/mem0", io).is_unsupported());
    }
}
