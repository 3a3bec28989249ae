//! Driver error types
//!
//! Per-device faults (open, grab, read) carry the device path so the
//! receive worker can log them and carry on with the remaining devices.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Driver error taxonomy
#[derive(Error, Debug)]
pub enum DriverError {
    /// Device node could not be opened
    #[error("Cannot open input device {path:?}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// EVIOCGRAB request failed (non-fatal, per device)
    #[error("Cannot grab input device {path:?}: {source}")]
    Grab {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read from an open device failed
    #[error("Cannot read input device {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read attempted after the device was deliberately closed
    #[error("Input device {0:?} is closed")]
    DeviceClosed(PathBuf),

    /// No supported headset present
    #[error("No supported Logitech headset found (searched {0:?})")]
    DeviceNotFound(PathBuf),

    /// grab_keyboard called while a receive worker is already running
    #[error("Keyboard already grabbed")]
    AlreadyGrabbed,

    /// Operation requires a connected driver
    #[error("Not connected")]
    NotConnected,

    /// Synthetic key injection failed
    #[error("Key injection failed (code {code}): {source}")]
    Injection {
        code: u16,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// True for the error produced by reading a device after `close()`
    pub fn is_closed(&self) -> bool {
        match self {
            Self::DeviceClosed(_) => true,
            Self::Read { source, .. } => source.raw_os_error() == Some(libc::EBADF),
            _ => false,
        }
    }
}
