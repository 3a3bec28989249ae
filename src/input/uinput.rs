//! Synthetic key injection
//!
//! When multimedia keys are not grabbed, the G930's non-standard volume
//! reports are replayed as ordinary KEY_VOLUMEUP/KEY_VOLUMEDOWN presses on
//! a uinput virtual keyboard so the desktop still sees them.

use std::sync::Mutex;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use log::{debug, info, warn};

use super::keycodes::{is_multimedia_key, KEY_MUTE, KEY_VOLUMEDOWN, KEY_VOLUMEUP};
use crate::error::{DriverError, Result};

/// Name of the virtual keyboard as shown in /proc/bus/input/devices
pub const VIRTUAL_KEYBOARD_NAME: &str = "g930d virtual keyboard";

/// OS-level keyboard event sink
pub trait KeyInjector: Send + Sync {
    /// Emit one EV_KEY event (value 1 = press, 0 = release)
    fn emit(&self, code: u16, value: i32) -> Result<()>;

    /// Press and release `code`
    fn tap(&self, code: u16) -> Result<()> {
        self.emit(code, 1)?;
        self.emit(code, 0)
    }
}

/// uinput-backed virtual keyboard
pub struct VirtualKeyboard {
    device: Mutex<VirtualDevice>,
}

impl VirtualKeyboard {
    /// Create the virtual keyboard (requires write access to /dev/uinput)
    pub fn new() -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in [KEY_VOLUMEUP, KEY_VOLUMEDOWN, KEY_MUTE] {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()?
            .name(VIRTUAL_KEYBOARD_NAME)
            .with_keys(&keys)?
            .build()?;

        info!("Virtual keyboard created: {}", VIRTUAL_KEYBOARD_NAME);
        Ok(Self {
            device: Mutex::new(device),
        })
    }
}

impl KeyInjector for VirtualKeyboard {
    fn emit(&self, code: u16, value: i32) -> Result<()> {
        if !is_multimedia_key(code) {
            warn!("Virtual keyboard does not advertise key {}, emitting anyway", code);
        }
        let event = InputEvent::new(EventType::KEY, code, value);
        // A poisoned lock only means another emit panicked mid-write
        let mut device = self
            .device
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        device
            .emit(&[event])
            .map_err(|source| DriverError::Injection { code, source })?;
        debug!("Injected key {} value {}", code, value);
        Ok(())
    }
}

/// Injector used when no virtual keyboard could be created
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInjector;

impl KeyInjector for NullInjector {
    fn emit(&self, code: u16, value: i32) -> Result<()> {
        debug!("No virtual keyboard, dropping key {} value {}", code, value);
        Ok(())
    }
}
