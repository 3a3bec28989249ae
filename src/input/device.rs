//! Input-event device handle
//!
//! Wraps one open /dev/input node. The descriptor lives in an atomic so
//! the caller's thread can ungrab and close the device while the receive
//! worker is still polling it; a read after close reports
//! `DriverError::DeviceClosed`, which the worker ignores once shutdown
//! has started.

use std::fs::OpenOptions;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};

use super::ioctl_helpers::ioctl_with_int_arg;
use super::keycodes::EVIOCGRAB;
use super::translate::{translate, KeyMap, RawEvent, Translation};
use super::uinput::KeyInjector;
use crate::driver::KeyCallback;
use crate::error::{DriverError, Result};

/// Number of input_event records fetched per read(2)
const READ_BATCH: usize = 64;

/// One input-event source as seen by the receive worker
///
/// All methods take `&self`: teardown runs on the caller's thread while
/// the worker may still hold a reference.
pub trait InputDevice: Send + Sync {
    /// Device node path (for logs)
    fn path(&self) -> &Path;

    /// Current descriptor, None once closed
    fn raw_fd(&self) -> Option<RawFd>;

    /// Drain all pending events and dispatch them. Returns the number of
    /// records decoded.
    fn read(&self) -> Result<usize>;

    /// Request exclusive access (EVIOCGRAB 1)
    fn grab(&self) -> Result<()>;

    /// Release exclusive access (EVIOCGRAB 0)
    fn ungrab(&self) -> Result<()>;

    /// Release the descriptor. Idempotent.
    fn close(&self) -> Result<()>;
}

/// Routes translated events to the host callback or the virtual keyboard
#[derive(Clone)]
pub struct Dispatcher {
    key_map: KeyMap,
    grab_multimedia: bool,
    callback: KeyCallback,
    injector: Arc<dyn KeyInjector>,
}

impl Dispatcher {
    pub fn new(
        key_map: KeyMap,
        grab_multimedia: bool,
        callback: KeyCallback,
        injector: Arc<dyn KeyInjector>,
    ) -> Self {
        Self {
            key_map,
            grab_multimedia,
            callback,
            injector,
        }
    }

    /// Translate one raw event and deliver the result
    pub fn dispatch(&self, path: &Path, event: &RawEvent) {
        match translate(event, &self.key_map, self.grab_multimedia) {
            Translation::Key(key, state) => {
                debug!("{}: {:?} {:?}", path.display(), key, state);
                (self.callback)(&[key], state);
            }
            Translation::Inject(code) => {
                if let Err(e) = self.injector.tap(code) {
                    warn!("{}: {}", path.display(), e);
                }
            }
            Translation::Ignored => {}
            Translation::Unmapped(code) => {
                warn!("Unmapped key for event: {} ({})", code, path.display());
            }
            Translation::Unhandled => {
                debug!("Unhandled event: {} ({})", event, path.display());
            }
        }
    }
}

/// evdev node opened read-only and non-blocking
pub struct EventDevice {
    path: PathBuf,
    /// -1 once closed
    fd: AtomicI32,
    grabbed: AtomicBool,
    dispatcher: Dispatcher,
}

impl EventDevice {
    /// Open a device node
    pub fn open(path: impl AsRef<Path>, dispatcher: Dispatcher) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(&path)
            .map_err(|source| DriverError::DeviceOpen {
                path: path.clone(),
                source,
            })?;
        info!("Opened input device {} (fd {})", path.display(), file.as_raw_fd());
        Ok(Self::with_raw_fd(path, file.into_raw_fd(), dispatcher))
    }

    /// Wrap an already open descriptor (switched to non-blocking)
    pub fn from_fd(path: impl AsRef<Path>, fd: OwnedFd, dispatcher: Dispatcher) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let fd = fd.into_raw_fd();
        let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| DriverError::DeviceOpen {
            path: path.clone(),
            source: e.into(),
        })?;
        let mut flags = OFlag::from_bits_truncate(flags);
        flags.insert(OFlag::O_NONBLOCK);
        fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| DriverError::DeviceOpen {
            path: path.clone(),
            source: e.into(),
        })?;
        Ok(Self::with_raw_fd(path, fd, dispatcher))
    }

    fn with_raw_fd(path: PathBuf, fd: RawFd, dispatcher: Dispatcher) -> Self {
        Self {
            path,
            fd: AtomicI32::new(fd),
            grabbed: AtomicBool::new(false),
            dispatcher,
        }
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed.load(Ordering::Acquire)
    }

    fn fd_or_closed(&self) -> Result<RawFd> {
        match self.fd.load(Ordering::Acquire) {
            fd if fd >= 0 => Ok(fd),
            _ => Err(DriverError::DeviceClosed(self.path.clone())),
        }
    }

    fn set_grab(&self, grab: bool) -> Result<()> {
        let fd = self.fd_or_closed()?;
        ioctl_with_int_arg(fd, EVIOCGRAB, grab as libc::c_int).map_err(|source| {
            DriverError::Grab {
                path: self.path.clone(),
                source,
            }
        })?;
        self.grabbed.store(grab, Ordering::Release);
        Ok(())
    }
}

impl InputDevice for EventDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.fd_or_closed().ok()
    }

    fn read(&self) -> Result<usize> {
        const RECORD: usize = mem::size_of::<libc::input_event>();
        let mut buf = [0u8; READ_BATCH * RECORD];
        let mut total = 0;

        loop {
            let fd = self.fd_or_closed()?;
            let n = match nix::unistd::read(fd, &mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(Errno::EAGAIN) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(DriverError::Read {
                        path: self.path.clone(),
                        source: e.into(),
                    })
                }
            };

            if n % RECORD != 0 {
                warn!(
                    "{}: discarding {} trailing bytes of a partial event",
                    self.path.display(),
                    n % RECORD
                );
            }
            for chunk in buf[..n].chunks_exact(RECORD) {
                // Safety: chunk is exactly one input_event worth of bytes and
                // every bit pattern is a valid input_event.
                let raw: libc::input_event =
                    unsafe { std::ptr::read_unaligned(chunk.as_ptr().cast()) };
                self.dispatcher.dispatch(&self.path, &RawEvent::from(&raw));
                total += 1;
            }

            if n < buf.len() {
                break;
            }
        }

        Ok(total)
    }

    fn grab(&self) -> Result<()> {
        self.set_grab(true)?;
        info!("Grabbed {}", self.path.display());
        Ok(())
    }

    fn ungrab(&self) -> Result<()> {
        self.set_grab(false)
    }

    fn close(&self) -> Result<()> {
        let fd = self.fd.swap(-1, Ordering::AcqRel);
        if fd < 0 {
            return Ok(());
        }
        self.grabbed.store(false, Ordering::Release);
        nix::unistd::close(fd).map_err(|e| DriverError::Io(e.into()))
    }
}

impl Drop for EventDevice {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::driver::{KeyState, LogicalKey};
    use crate::input::keycodes::{
        EV_KEY, EV_MSC, EV_SYN, G930_MSC_VOLUME_DOWN, G930_MSC_VOLUME_UP, KEY_MUTE,
        KEY_PLAYPAUSE, KEY_VOLUMEDOWN, KEY_VOLUMEUP,
    };
    use crate::input::translate::G930_KEY_MAP;
    use crate::input::uinput::tests::RecordingInjector;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::sync::Mutex;

    pub type KeyLog = Arc<Mutex<Vec<(Vec<LogicalKey>, KeyState)>>>;

    pub fn recording_callback() -> (KeyCallback, KeyLog) {
        let log: KeyLog = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let callback: KeyCallback = Arc::new(move |keys: &[LogicalKey], state: KeyState| {
            sink.lock().unwrap().push((keys.to_vec(), state));
        });
        (callback, log)
    }

    /// Serialize events the way the kernel hands them out
    pub fn encode(events: &[(u16, u16, i32)]) -> Vec<u8> {
        let mut out = Vec::new();
        for &(type_, code, value) in events {
            let mut ev: libc::input_event = unsafe { mem::zeroed() };
            ev.type_ = type_;
            ev.code = code;
            ev.value = value;
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    (&ev as *const libc::input_event).cast::<u8>(),
                    mem::size_of::<libc::input_event>(),
                )
            };
            out.extend_from_slice(bytes);
        }
        out
    }

    /// Device backed by one end of a socket pair
    pub fn socket_device(dispatcher: Dispatcher) -> (EventDevice, UnixStream) {
        let (reader, writer) = UnixStream::pair().unwrap();
        let device = EventDevice::from_fd("test-event-if00", OwnedFd::from(reader), dispatcher)
            .unwrap();
        (device, writer)
    }

    fn setup(grab_multimedia: bool) -> (EventDevice, UnixStream, KeyLog, Arc<RecordingInjector>) {
        let (callback, log) = recording_callback();
        let injector = Arc::new(RecordingInjector::default());
        let dispatcher = Dispatcher::new(G930_KEY_MAP, grab_multimedia, callback, injector.clone());
        let (device, writer) = socket_device(dispatcher);
        (device, writer, log, injector)
    }

    #[test]
    fn test_read_dispatches_keys() {
        let (device, mut writer, log, injector) = setup(true);
        writer
            .write_all(&encode(&[
                (EV_MSC, 4, 0x000c00cd),
                (EV_KEY, KEY_PLAYPAUSE, 1),
                (EV_SYN, 0, 0),
                (EV_KEY, KEY_PLAYPAUSE, 2),
                (EV_KEY, KEY_PLAYPAUSE, 0),
                (EV_SYN, 0, 0),
            ]))
            .unwrap();

        assert_eq!(device.read().unwrap(), 6);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (vec![LogicalKey::PlayPause], KeyState::Down),
                (vec![LogicalKey::PlayPause], KeyState::Up),
            ]
        );
        assert!(injector.take().is_empty());
    }

    #[test]
    fn test_read_with_nothing_pending() {
        let (device, _writer, log, _) = setup(false);
        assert_eq!(device.read().unwrap(), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_vendor_hacks_inject_without_grab() {
        let (device, mut writer, log, injector) = setup(false);
        writer
            .write_all(&encode(&[
                (EV_MSC, 4, G930_MSC_VOLUME_DOWN),
                (EV_MSC, 4, G930_MSC_VOLUME_UP),
            ]))
            .unwrap();

        device.read().unwrap();
        assert_eq!(
            injector.take(),
            vec![
                (KEY_VOLUMEDOWN, 1),
                (KEY_VOLUMEDOWN, 0),
                (KEY_VOLUMEUP, 1),
                (KEY_VOLUMEUP, 0),
            ]
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_vendor_hacks_silent_with_grab() {
        let (device, mut writer, log, injector) = setup(true);
        writer
            .write_all(&encode(&[
                (EV_MSC, 4, G930_MSC_VOLUME_DOWN),
                (EV_MSC, 4, G930_MSC_VOLUME_UP),
            ]))
            .unwrap();

        device.read().unwrap();
        assert!(injector.take().is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unmapped_key_does_not_fail() {
        let (device, mut writer, log, _) = setup(true);
        writer.write_all(&encode(&[(EV_KEY, 30, 1), (EV_KEY, KEY_MUTE, 1)])).unwrap();
        assert_eq!(device.read().unwrap(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec![(vec![LogicalKey::Mute], KeyState::Down)]
        );
    }

    #[test]
    fn test_partial_record_discarded() {
        let (device, mut writer, log, _) = setup(true);
        let mut bytes = encode(&[(EV_KEY, KEY_MUTE, 1)]);
        bytes.extend_from_slice(&[0u8; 3]);
        writer.write_all(&bytes).unwrap();
        assert_eq!(device.read().unwrap(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_grab_fails_on_non_evdev() {
        let (device, _writer, _, _) = setup(true);
        let err = device.grab().unwrap_err();
        assert!(matches!(err, DriverError::Grab { .. }));
        assert!(!device.is_grabbed());
    }

    #[test]
    fn test_close_is_idempotent_and_read_reports_closed() {
        let (device, _writer, _, _) = setup(true);
        assert!(device.raw_fd().is_some());
        device.close().unwrap();
        device.close().unwrap();
        assert!(device.raw_fd().is_none());

        let err = device.read().unwrap_err();
        assert!(err.is_closed());
        assert!(matches!(device.ungrab(), Err(DriverError::DeviceClosed(_))));
    }

    #[test]
    fn test_open_missing_path() {
        let (callback, _) = recording_callback();
        let dispatcher = Dispatcher::new(
            G930_KEY_MAP,
            false,
            callback,
            Arc::new(RecordingInjector::default()),
        );
        let err = EventDevice::open("/nonexistent/g930d-test-event", dispatcher)
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::DeviceOpen { .. }));
    }
}
