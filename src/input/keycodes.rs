//! evdev event constants
//!
//! Linux input event types and the multimedia key codes emitted by the
//! G930/G35 headsets. Values are from <linux/input-event-codes.h>.

// ============================================================================
// Event Types
// ============================================================================

/// Synchronization event (end of report)
pub const EV_SYN: u16 = 0x00;

/// Key press/release/repeat
pub const EV_KEY: u16 = 0x01;

/// Miscellaneous event (scan codes, vendor data)
pub const EV_MSC: u16 = 0x04;

// ============================================================================
// Key Values
// ============================================================================

/// EV_KEY value for a release
pub const KEY_VALUE_RELEASE: i32 = 0;

/// EV_KEY value for a press
pub const KEY_VALUE_PRESS: i32 = 1;

/// EV_KEY value for kernel autorepeat
pub const KEY_VALUE_REPEAT: i32 = 2;

// ============================================================================
// Multimedia Keys
// ============================================================================

/// Mute key
pub const KEY_MUTE: u16 = 113;

/// Volume down key
pub const KEY_VOLUMEDOWN: u16 = 114;

/// Volume up key
pub const KEY_VOLUMEUP: u16 = 115;

/// Next track key
pub const KEY_NEXTSONG: u16 = 163;

/// Play/pause key
pub const KEY_PLAYPAUSE: u16 = 164;

/// Previous track key
pub const KEY_PREVIOUSSONG: u16 = 165;

// ============================================================================
// Vendor Event Values
// ============================================================================

/// EV_MSC value the G930 reports for the volume wheel turning down.
/// Opaque hardware constant.
pub const G930_MSC_VOLUME_DOWN: i32 = 786666;

/// EV_MSC value the G930 reports for the volume wheel turning up.
/// Opaque hardware constant.
pub const G930_MSC_VOLUME_UP: i32 = 786665;

// ============================================================================
// ioctl Requests
// ============================================================================

/// EVIOCGRAB: _IOW('E', 0x90, int)
pub const EVIOCGRAB: libc::c_ulong = 0x40044590;

// ============================================================================
// Helper Functions
// ============================================================================

/// Check if keycode is one of the volume/mute keys
#[inline]
pub const fn is_multimedia_key(keycode: u16) -> bool {
    matches!(keycode, KEY_MUTE | KEY_VOLUMEDOWN | KEY_VOLUMEUP)
}

/// Human-readable name for event types seen on the headset
#[inline]
pub const fn event_type_name(etype: u16) -> &'static str {
    match etype {
        EV_SYN => "EV_SYN",
        EV_KEY => "EV_KEY",
        EV_MSC => "EV_MSC",
        _ => "EV_?",
    }
}
