//! Host driver contract
//!
//! The daemon talks to hardware through the `Driver` trait: connection
//! lifecycle, model/layout reporting, a (possibly empty) display surface,
//! and keyboard grabbing that feeds logical key events to a callback.

pub mod g930;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

pub use g930::G930Driver;

/// Abstract key identity exposed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKey {
    PreviousTrack,
    PlayPause,
    NextTrack,
    Mute,
    VolumeDown,
    VolumeUp,
}

impl LogicalKey {
    /// Host key id
    pub const fn id(self) -> &'static str {
        match self {
            Self::PreviousTrack => "g1",
            Self::PlayPause => "g2",
            Self::NextTrack => "g3",
            Self::Mute => "mute",
            Self::VolumeDown => "vol-down",
            Self::VolumeUp => "vol-up",
        }
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Key transition delivered to the host; autorepeat is never surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Down,
    Up,
}

/// Sink for normalized key events, called on the receive thread
pub type KeyCallback = Arc<dyn Fn(&[LogicalKey], KeyState) + Send + Sync>;

/// Hook run after a disconnect completes
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Disconnected,
    Connecting,
    Connected,
}

/// Adjustable device control (backlight, contrast, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: String,
    pub name: String,
    pub value: i32,
    pub lower: i32,
    pub upper: i32,
}

/// Frame handed to `paint`; headsets ignore it
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Driver interface implemented per device family
pub trait Driver: Send {
    fn connect(&mut self) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
    fn state(&self) -> DriverState;

    fn is_connected(&self) -> bool {
        self.state() == DriverState::Connected
    }

    /// Host model ids this driver handles
    fn model_names(&self) -> &[&'static str];
    fn name(&self) -> &str;
    /// Model of the attached device
    fn model_name(&self) -> Option<&str>;
    /// Rows of addressable keys
    fn key_layout(&self) -> Vec<Vec<LogicalKey>>;
    /// Display size in pixels
    fn size(&self) -> (u32, u32);
    /// Display bits per pixel
    fn bpp(&self) -> u32;
    /// Whether painted frames should be antialiased
    fn antialias(&self) -> bool;
    fn controls(&self) -> Vec<Control>;
    fn paint(&mut self, frame: &Frame);
    fn on_update_control(&mut self, control: &Control);

    /// Start delivering key events to `callback`
    fn grab_keyboard(&mut self, callback: KeyCallback) -> Result<()>;
}
