//! Saving the logged frame to disk.
//!
//! Two formats are available, a compact binary one made of fixed size records
//! ([`save_frame_log`]), and a JSON dump of everything the logger knows about the
//! frame ([`save_frame_log_json`]).

mod binary;
mod json;

use std::{error::Error, fmt, io};

pub use binary::{
    read_frame_log, save_frame_log, FrameLog, FrameLogMetadata, FrameLogReader, LogEntry,
    METADATA_VERSION,
};
pub use json::{frame_log_json, save_frame_log_json};

#[derive(Debug)]
pub enum ExportError {
    Io(io::Error),
    Json(serde_json::Error),
    /// The file can't even hold the metadata trailer.
    TooSmall { len: u64 },
    /// The trailer sizes don't match the ones of this version of the format.
    BadMetadata {
        metadata_size: u64,
        log_entry_size: u64,
    },
    UnsupportedVersion(u64),
    /// The file length doesn't match the number of entries in the trailer.
    SizeMismatch { expected: u64, actual: u64 },
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "IO error: {}", e),
            ExportError::Json(e) => write!(f, "JSON error: {}", e),
            ExportError::TooSmall { len } => {
                write!(f, "File too small for a frame log ({} bytes)", len)
            }
            ExportError::BadMetadata {
                metadata_size,
                log_entry_size,
            } => write!(
                f,
                "Unexpected metadata, block size {} and entry size {}",
                metadata_size, log_entry_size
            ),
            ExportError::UnsupportedVersion(v) => {
                write!(f, "Unsupported frame log version {}", v)
            }
            ExportError::SizeMismatch { expected, actual } => write!(
                f,
                "File size mismatch, expected {} bytes, found {}",
                expected, actual
            ),
        }
    }
}

impl From<io::Error> for ExportError {
    fn from(e: io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Json(e)
    }
}
