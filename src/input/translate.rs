//! Raw event translation
//!
//! Maps (type, code, value) triples read from the headset into the
//! host's logical key stream. Translation is stateless: one raw event
//! in, at most one action out.

use std::fmt;

use crate::driver::{KeyState, LogicalKey};

use super::keycodes::{
    event_type_name, EV_KEY, EV_MSC, EV_SYN, G930_MSC_VOLUME_DOWN, G930_MSC_VOLUME_UP,
    KEY_MUTE, KEY_NEXTSONG, KEY_PLAYPAUSE, KEY_PREVIOUSSONG, KEY_VALUE_PRESS, KEY_VALUE_REPEAT,
    KEY_VOLUMEDOWN, KEY_VOLUMEUP,
};

/// Event class of a raw record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Key,
    Sync,
    /// Any other event type (raw type number kept for the vendor hacks)
    Other(u16),
}

impl From<u16> for EventType {
    fn from(etype: u16) -> Self {
        match etype {
            EV_KEY => Self::Key,
            EV_SYN => Self::Sync,
            other => Self::Other(other),
        }
    }
}

impl EventType {
    pub fn raw(self) -> u16 {
        match self {
            Self::Key => EV_KEY,
            Self::Sync => EV_SYN,
            Self::Other(t) => t,
        }
    }
}

/// One record read from an input-event node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub etype: EventType,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn new(etype: u16, code: u16, value: i32) -> Self {
        Self {
            etype: EventType::from(etype),
            code,
            value,
        }
    }
}

impl From<&libc::input_event> for RawEvent {
    fn from(ev: &libc::input_event) -> Self {
        Self::new(ev.type_, ev.code, ev.value)
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.etype.raw();
        write!(
            f,
            "{}({}) code={} value={}",
            event_type_name(raw),
            raw,
            self.code,
            self.value
        )
    }
}

/// Fixed raw key code -> logical key table for one hardware model
#[derive(Debug, Clone, Copy)]
pub struct KeyMap {
    entries: &'static [(u16, LogicalKey)],
}

impl KeyMap {
    pub const fn new(entries: &'static [(u16, LogicalKey)]) -> Self {
        Self { entries }
    }

    /// Logical key for an evdev key code
    pub fn get(&self, code: u16) -> Option<LogicalKey> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, key)| *key)
    }

    pub fn contains(&self, code: u16) -> bool {
        self.get(code).is_some()
    }

    pub fn codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }
}

/// Key map shared by the G930 and G35
pub const G930_KEY_MAP: KeyMap = KeyMap::new(&[
    (KEY_PREVIOUSSONG, LogicalKey::PreviousTrack),
    (KEY_PLAYPAUSE, LogicalKey::PlayPause),
    (KEY_NEXTSONG, LogicalKey::NextTrack),
    (KEY_MUTE, LogicalKey::Mute),
    (KEY_VOLUMEDOWN, LogicalKey::VolumeDown),
    (KEY_VOLUMEUP, LogicalKey::VolumeUp),
]);

/// Outcome of translating one raw event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// Normalized key state change for the host callback
    Key(LogicalKey, KeyState),
    /// Press+release of a standard key on the virtual keyboard
    Inject(u16),
    /// Autorepeat, sync, or a vendor hack while multimedia keys are grabbed
    Ignored,
    /// EV_KEY with a code outside the key map
    Unmapped(u16),
    /// Any other event
    Unhandled,
}

/// Translate a raw event.
///
/// `grab_multimedia` decides whether the vendor volume events are
/// re-injected as standard keys (false) or dropped (true, the EV_KEY
/// stream already carries them).
pub fn translate(event: &RawEvent, key_map: &KeyMap, grab_multimedia: bool) -> Translation {
    match event.etype {
        EventType::Key if event.value == KEY_VALUE_REPEAT => Translation::Ignored,
        EventType::Key => match key_map.get(event.code) {
            Some(key) => {
                let state = if event.value == KEY_VALUE_PRESS {
                    KeyState::Down
                } else {
                    KeyState::Up
                };
                Translation::Key(key, state)
            }
            None => Translation::Unmapped(event.code),
        },
        EventType::Sync => Translation::Ignored,
        EventType::Other(EV_MSC) => match vendor_hack_key(event.value) {
            Some(_) if grab_multimedia => Translation::Ignored,
            Some(code) => Translation::Inject(code),
            None => Translation::Unhandled,
        },
        EventType::Other(_) => Translation::Unhandled,
    }
}

/// Standard key behind one of the G930's non-standard EV_MSC volume reports
fn vendor_hack_key(value: i32) -> Option<u16> {
    match value {
        G930_MSC_VOLUME_DOWN => Some(KEY_VOLUMEDOWN),
        G930_MSC_VOLUME_UP => Some(KEY_VOLUMEUP),
        _ => None,
    }
}
