//! g930d - multimedia key driver for Logitech G930/G35 headsets
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            G930Driver (facade)           │
//! │  connect / disconnect / config reload    │
//! ├──────────────────────────────────────────┤
//! │  discovery  →  EventDevice × N           │
//! │                     ↓                    │
//! │        ReceiveWorker (poll thread)       │
//! │                     ↓                    │
//! │  translate  →  KeyCallback | uinput      │
//! └──────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod input;

pub use driver::{Driver, DriverState, G930Driver, KeyCallback, KeyState, LogicalKey};
pub use error::{DriverError, Result};
