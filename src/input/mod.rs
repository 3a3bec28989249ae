//! Input handling
//!
//! Headset key acquisition:
//! - Discovery of the headset's event nodes under /dev/input/by-id
//! - Exclusive (EVIOCGRAB) access and raw input_event decoding
//! - Translation into the host's logical key stream
//! - uinput virtual keyboard for keys the host does not grab

pub mod device;
pub mod discovery;
pub mod ioctl_helpers;
pub mod keycodes;
pub mod receiver;
pub mod translate;
pub mod uinput;

pub use device::{Dispatcher, EventDevice, InputDevice};
pub use discovery::{list_devices, FoundDevice, HeadsetModel};
pub use receiver::ReceiveWorker;
pub use translate::{translate, EventType, KeyMap, RawEvent, Translation, G930_KEY_MAP};
pub use uinput::{KeyInjector, NullInjector, VirtualKeyboard};
