//! Receive worker
//!
//! Dedicated thread that grabs every headset event node and blocks in
//! poll(2) across all of them. There is no way to interrupt the wait, so
//! the run flag is re-checked after every bounded timeout; `deactivate()`
//! clears the flag and releases the devices from the caller's thread
//! without waiting for the worker to notice.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};

use super::device::InputDevice;
use super::ioctl_helpers::{poll_fds, PollEvents};
use crate::error::{DriverError, Result};

/// Default bound on one poll(2) wait, and so on shutdown latency
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1000);

type DeviceSet = Arc<Vec<Arc<dyn InputDevice>>>;

/// Handle to a running receive thread
pub struct ReceiveWorker {
    name: String,
    running: Arc<AtomicBool>,
    devices: DeviceSet,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ReceiveWorker {
    /// Start the worker thread over `devices`
    pub fn spawn(
        name: impl Into<String>,
        devices: Vec<Arc<dyn InputDevice>>,
        poll_timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let running = Arc::new(AtomicBool::new(true));
        let devices: DeviceSet = Arc::new(devices);

        let thread = {
            let running = running.clone();
            let devices = devices.clone();
            let thread_name = name.clone();
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let result = receive_loop(&devices, &running, poll_timeout);
                    match &result {
                        Ok(()) => info!("{}: thread left", thread_name),
                        Err(e) => warn!("{}: thread failed: {}", thread_name, e),
                    }
                    result
                })?
        };

        Ok(Self {
            name,
            running,
            devices,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run flag as seen by the worker
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True once the thread has returned
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop receiving: clear the run flag, then ungrab and close every
    /// device. Never fails and may be called repeatedly; the worker exits
    /// on its next timeout or read error.
    pub fn deactivate(&self) {
        self.running.store(false, Ordering::Release);
        for dev in self.devices.iter() {
            let path = dev.path().display();
            info!("Ungrabbing {}", path);
            match dev.ungrab() {
                Ok(()) => {}
                Err(DriverError::DeviceClosed(_)) => debug!("{} already closed", path),
                Err(e) => info!("Failed ungrab: {}", e),
            }
            info!("Closing {}", path);
            if let Err(e) = dev.close() {
                info!("Failed close: {}", e);
            }
            info!("Stopped {}", path);
        }
        info!("{}: stopped all input devices", self.name);
    }

    /// Wait for the thread to exit and return its result
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                Err(DriverError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "receive thread panicked",
                )))
            }),
            None => Ok(()),
        }
    }
}

fn receive_loop(
    devices: &[Arc<dyn InputDevice>],
    running: &AtomicBool,
    poll_timeout: Duration,
) -> Result<()> {
    let fds: Vec<RawFd> = devices
        .iter()
        .map(|dev| dev.raw_fd().unwrap_or(-1))
        .collect();

    for dev in devices {
        // A device that refuses the grab still delivers events
        if let Err(e) = dev.grab() {
            warn!("{}", e);
        }
    }

    while running.load(Ordering::Acquire) {
        let ready = match poll_fds(&fds, PollEvents::INPUT, poll_timeout) {
            Ok(ready) => ready,
            Err(e) if !running.load(Ordering::Acquire) => {
                debug!("poll failed during shutdown: {}", e);
                break;
            }
            Err(e) => return Err(e.into()),
        };

        for r in ready {
            let dev = &devices[r.index];
            let result = match dev.read() {
                Ok(0) if r.events.intersects(PollEvents::HUP | PollEvents::NVAL | PollEvents::ERR) => {
                    Err(hangup_error(dev.as_ref(), r.events))
                }
                other => other.map(|_| ()),
            };
            if let Err(e) = result {
                // Expected once deactivate() has closed the device
                if !running.load(Ordering::Acquire) {
                    debug!("Read during shutdown: {}", e);
                    continue;
                }
                if e.is_closed() {
                    warn!("{} closed while receiving", dev.path().display());
                }
                return Err(e);
            }
        }

        if devices.iter().all(|dev| dev.raw_fd().is_none()) {
            debug!("All input devices closed");
            break;
        }
    }

    Ok(())
}

fn hangup_error(dev: &dyn InputDevice, events: PollEvents) -> DriverError {
    if dev.raw_fd().is_none() {
        return DriverError::DeviceClosed(dev.path().to_path_buf());
    }
    DriverError::Read {
        path: dev.path().to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            format!("device hung up ({:?})", events),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{KeyCallback, KeyState, LogicalKey};
    use crate::input::device::tests::{encode, recording_callback, socket_device};
    use crate::input::device::{Dispatcher, EventDevice};
    use crate::input::keycodes::{EV_KEY, EV_SYN, KEY_NEXTSONG};
    use crate::input::translate::G930_KEY_MAP;
    use crate::input::uinput::NullInjector;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn devices(count: usize, callback: KeyCallback) -> (Vec<Arc<EventDevice>>, Vec<UnixStream>) {
        let mut devs = Vec::new();
        let mut writers = Vec::new();
        for _ in 0..count {
            let dispatcher =
                Dispatcher::new(G930_KEY_MAP, true, callback.clone(), Arc::new(NullInjector));
            let (dev, writer) = socket_device(dispatcher);
            devs.push(Arc::new(dev));
            writers.push(writer);
        }
        (devs, writers)
    }

    fn as_input(devs: &[Arc<EventDevice>]) -> Vec<Arc<dyn InputDevice>> {
        devs.iter()
            .map(|d| d.clone() as Arc<dyn InputDevice>)
            .collect()
    }

    #[test]
    fn test_events_reach_callback_from_any_device() {
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let callback: KeyCallback = Arc::new(move |keys: &[LogicalKey], state: KeyState| {
            let _ = tx.lock().unwrap().send((keys.to_vec(), state));
        });
        let (devs, mut writers) = devices(2, callback);
        let worker = ReceiveWorker::spawn("test-recv", as_input(&devs), TIMEOUT).unwrap();

        writers[1]
            .write_all(&encode(&[(EV_KEY, KEY_NEXTSONG, 1), (EV_SYN, 0, 0)]))
            .unwrap();
        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, (vec![LogicalKey::NextTrack], KeyState::Down));

        worker.deactivate();
        assert!(!worker.is_running());
        worker.join().unwrap();
        assert!(devs.iter().all(|d| d.raw_fd().is_none()));
    }

    #[test]
    fn test_grab_failure_is_not_fatal() {
        // Socket pairs reject EVIOCGRAB; the loop must still run
        let (callback, _) = recording_callback();
        let (devs, _writers) = devices(1, callback);
        let worker = ReceiveWorker::spawn("test-recv-grab", as_input(&devs), TIMEOUT).unwrap();
        std::thread::sleep(TIMEOUT * 2);
        assert!(!worker.is_finished());
        worker.deactivate();
        worker.join().unwrap();
    }

    #[test]
    fn test_deactivate_after_devices_closed() {
        let (callback, _) = recording_callback();
        let (devs, _writers) = devices(2, callback);
        let worker = ReceiveWorker::spawn("test-recv-closed", as_input(&devs), TIMEOUT).unwrap();

        for dev in &devs {
            dev.close().unwrap();
        }
        let start = Instant::now();
        worker.deactivate();
        worker.deactivate();
        // The worker may have seen the closed descriptors before the flag
        // cleared; only termination matters here.
        let _ = worker.join();
        assert!(start.elapsed() < TIMEOUT * 4 + Duration::from_millis(500));
    }

    #[test]
    fn test_read_error_while_running_is_fatal() {
        let (callback, _) = recording_callback();
        let (devs, writers) = devices(1, callback);
        let worker = ReceiveWorker::spawn("test-recv-hup", as_input(&devs), TIMEOUT).unwrap();
        drop(writers);

        let err = worker.join().unwrap_err();
        assert!(matches!(err, DriverError::Read { .. }));
    }

    #[test]
    fn test_deactivate_on_exited_worker() {
        let (callback, _) = recording_callback();
        let (devs, writers) = devices(1, callback);
        let worker = ReceiveWorker::spawn("test-recv-exited", as_input(&devs), TIMEOUT).unwrap();
        drop(writers);
        let deadline = Instant::now() + Duration::from_secs(2);
        while !worker.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.is_finished());
        worker.deactivate();
        assert!(devs[0].raw_fd().is_none());
    }
}
