//! Logitech G930/G35 headset driver
//!
//! The headsets have no display; the only thing to drive is the set of
//! multimedia keys, read from the headset's event interfaces. Volume and
//! mute are either surfaced as logical keys (`grab_multimedia`) or left to
//! the desktop, in which case the G930's non-standard volume wheel reports
//! are replayed on a virtual keyboard.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use super::{CloseCallback, Control, Driver, DriverState, Frame, KeyCallback, LogicalKey};
use crate::config::{Config, ConfigSource};
use crate::error::{DriverError, Result};
use crate::input::device::{Dispatcher, EventDevice, InputDevice};
use crate::input::discovery::{list_devices, FoundDevice, HeadsetModel, SUPPORTED_MODELS};
use crate::input::receiver::ReceiveWorker;
use crate::input::translate::G930_KEY_MAP;
use crate::input::uinput::KeyInjector;

const DRIVER_NAME: &str = "G930/G35 Headset Driver";

const MODEL_NAMES: [&str; 2] = [SUPPORTED_MODELS[0].id, SUPPORTED_MODELS[1].id];

/// Keys always present on the headset
const BASE_LAYOUT: [LogicalKey; 3] = [
    LogicalKey::PreviousTrack,
    LogicalKey::PlayPause,
    LogicalKey::NextTrack,
];

/// Extra row advertised while multimedia keys are grabbed
const MULTIMEDIA_LAYOUT: [LogicalKey; 3] =
    [LogicalKey::VolumeUp, LogicalKey::VolumeDown, LogicalKey::Mute];

/// Driver facade for the G930/G35 headsets
pub struct G930Driver {
    state: DriverState,
    config_source: Arc<dyn ConfigSource>,
    /// Snapshot taken at the last (re)connect
    config: Config,
    devices: Vec<FoundDevice>,
    injector: Arc<dyn KeyInjector>,
    worker: Option<ReceiveWorker>,
    /// Kept so a configuration reload can re-grab with the same sink
    callback: Option<KeyCallback>,
    on_close: Option<CloseCallback>,
}

impl G930Driver {
    pub fn new(config_source: Arc<dyn ConfigSource>, injector: Arc<dyn KeyInjector>) -> Self {
        let config = config_source.load();
        Self {
            state: DriverState::Disconnected,
            config_source,
            config,
            devices: Vec::new(),
            injector,
            worker: None,
            callback: None,
            on_close: None,
        }
    }

    /// Hook invoked (on a separate thread) after each disconnect
    pub fn with_on_close(mut self, on_close: CloseCallback) -> Self {
        self.on_close = Some(on_close);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grab_multimedia(&self) -> bool {
        self.config.headset.grab_multimedia
    }

    /// Event nodes found by the last connect
    pub fn device_paths(&self) -> impl Iterator<Item = &Path> {
        self.devices.iter().map(|d| d.path.as_path())
    }

    /// True while a receive worker exists
    pub fn is_grabbed(&self) -> bool {
        self.worker.is_some()
    }

    /// True while the receive thread is alive
    pub fn is_receiving(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Reload settings and, if connected, cycle the connection so they
    /// take effect. A previously registered key callback is re-attached.
    pub fn on_configuration_changed(&mut self) -> Result<()> {
        if !self.is_connected() {
            self.load_configuration();
            return Ok(());
        }

        info!("Configuration changed, reconnecting");
        let callback = self.worker.as_ref().and(self.callback.clone());
        self.disconnect()?;
        self.connect()?;
        if let Some(callback) = callback {
            self.grab_keyboard(callback)?;
        }
        Ok(())
    }

    fn load_configuration(&mut self) {
        self.config = self.config_source.load();
        debug!(
            "grab_multimedia={} device_dir={}",
            self.config.headset.grab_multimedia, self.config.input.device_dir
        );
    }

    fn stop_receiving_keys(&mut self) {
        if let Some(worker) = self.worker.take() {
            info!("Stopping {}", worker.name());
            worker.deactivate();
        }
    }

    fn schedule_close(&self) {
        let Some(on_close) = self.on_close.clone() else {
            return;
        };
        let spawned = std::thread::Builder::new()
            .name("g930d-close".into())
            .spawn(move || on_close());
        if let Err(e) = spawned {
            warn!("Failed to schedule close notification: {}", e);
        }
    }

    fn open_devices(&self, dispatcher: &Dispatcher) -> Result<Vec<Arc<dyn InputDevice>>> {
        let mut opened: Vec<Arc<dyn InputDevice>> = Vec::new();
        let mut last_err = None;
        for found in &self.devices {
            info!("Adding input multi-media device {}", found.path.display());
            match EventDevice::open(&found.path, dispatcher.clone()) {
                Ok(dev) => opened.push(Arc::new(dev)),
                Err(e) => {
                    warn!("{}", e);
                    last_err = Some(e);
                }
            }
        }
        match (opened.is_empty(), last_err) {
            (true, Some(e)) => Err(e),
            _ => Ok(opened),
        }
    }
}

impl Driver for G930Driver {
    fn connect(&mut self) -> Result<()> {
        if self.state != DriverState::Disconnected {
            debug!("connect() while {:?}, ignoring", self.state);
            return Ok(());
        }
        self.state = DriverState::Connecting;
        self.devices.clear();
        self.load_configuration();

        let dir = self.config.device_dir();
        let found = match list_devices(&dir) {
            Ok(found) => found,
            Err(e) => {
                self.state = DriverState::Disconnected;
                return Err(e);
            }
        };
        if found.is_empty() {
            self.state = DriverState::Disconnected;
            return Err(DriverError::DeviceNotFound(dir));
        }

        info!(
            "Connected to {} ({} event interface(s))",
            found[0].model.name,
            found.len()
        );
        self.devices = found;
        self.state = DriverState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.state != DriverState::Connected {
            return Err(DriverError::NotConnected);
        }
        self.stop_receiving_keys();
        self.state = DriverState::Disconnected;
        info!("Disconnected");
        self.schedule_close();
        Ok(())
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn model_names(&self) -> &[&'static str] {
        &MODEL_NAMES
    }

    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn model_name(&self) -> Option<&str> {
        self.devices.first().map(|d| d.model.id)
    }

    fn key_layout(&self) -> Vec<Vec<LogicalKey>> {
        let mut layout = vec![BASE_LAYOUT.to_vec()];
        if self.grab_multimedia() {
            layout.push(Vec::new());
            layout.push(MULTIMEDIA_LAYOUT.to_vec());
        }
        layout
    }

    fn size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn bpp(&self) -> u32 {
        0
    }

    fn antialias(&self) -> bool {
        false
    }

    fn controls(&self) -> Vec<Control> {
        Vec::new()
    }

    fn paint(&mut self, _frame: &Frame) {}

    fn on_update_control(&mut self, _control: &Control) {}

    fn grab_keyboard(&mut self, callback: KeyCallback) -> Result<()> {
        if self.worker.is_some() {
            return Err(DriverError::AlreadyGrabbed);
        }
        if !self.is_connected() {
            return Err(DriverError::NotConnected);
        }

        let dispatcher = Dispatcher::new(
            G930_KEY_MAP,
            self.grab_multimedia(),
            callback.clone(),
            self.injector.clone(),
        );
        let devices = self.open_devices(&dispatcher)?;
        let model = self
            .devices
            .first()
            .map(|d| d.model)
            .unwrap_or(SUPPORTED_MODELS[0]);
        let worker = ReceiveWorker::spawn(
            worker_name(&model),
            devices,
            self.config.poll_timeout(),
        )?;

        self.worker = Some(worker);
        self.callback = Some(callback);
        Ok(())
    }
}

impl Drop for G930Driver {
    fn drop(&mut self) {
        self.stop_receiving_keys();
    }
}

fn worker_name(model: &HeadsetModel) -> String {
    format!("g930d-recv-{}", model.id)
}
