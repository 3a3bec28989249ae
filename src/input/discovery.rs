//! Headset discovery
//!
//! Scans the udev by-id directory for the stable event-interface names of
//! the supported headsets.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::Result;

/// Default by-id namespace maintained by udev
pub const DEFAULT_DEVICE_DIR: &str = "/dev/input/by-id";

/// Supported hardware variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadsetModel {
    /// Host model id
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Substring of the by-id filename of the headset's event interfaces
    pub pattern: &'static str,
}

pub const G930: HeadsetModel = HeadsetModel {
    id: "g930",
    name: "Logitech G930",
    pattern: "usb-Logitech_Logitech_G930_Headset-event-if",
};

// TODO: G35 name unverified on real hardware, confirm the by-id string
pub const G35: HeadsetModel = HeadsetModel {
    id: "g35",
    name: "Logitech G35",
    pattern: "usb-Logitech_Logitech_G35_Headset-event-if",
};

/// All models handled by this driver
pub const SUPPORTED_MODELS: [HeadsetModel; 2] = [G930, G35];

impl HeadsetModel {
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.contains(self.pattern)
    }
}

/// Device node found during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    pub path: PathBuf,
    pub model: HeadsetModel,
}

/// List matching device nodes in directory order.
///
/// A missing directory means no input devices at all and yields an empty
/// list.
pub fn list_devices(dir: &Path) -> Result<Vec<FoundDevice>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(model) = SUPPORTED_MODELS.iter().find(|m| m.matches(&name)) {
            info!("Input multi-media device {} matches {}", name, model.name);
            found.push(FoundDevice {
                path: dir.join(entry.file_name()),
                model: *model,
            });
        }
    }
    Ok(found)
}
