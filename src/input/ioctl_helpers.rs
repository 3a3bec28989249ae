//! Safe wrappers for the raw system calls used on input devices
//!
//! Keeps the unsafe boilerplate for EVIOCGRAB and poll(2) out of
//! device.rs and receiver.rs.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use bitflags::bitflags;

/// Execute an ioctl command with an integer argument.
///
/// # Arguments
/// * `fd` - File descriptor
/// * `cmd` - ioctl command number
/// * `arg` - Integer argument
pub fn ioctl_with_int_arg(fd: RawFd, cmd: libc::c_ulong, arg: libc::c_int) -> io::Result<()> {
    // Safety: the request only reads the integer argument; an invalid fd
    // is reported as EBADF rather than touching memory.
    let ret = unsafe { libc::ioctl(fd, cmd as _, arg) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Readiness reported for one descriptor by [`poll_fds`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    /// Index into the slice passed to `poll_fds`
    pub index: usize,
    pub events: PollEvents,
}

/// Block until any descriptor is ready or the timeout expires.
///
/// Negative descriptors are skipped by the kernel. EINTR is reported
/// as an empty ready set so callers simply re-check their run flag.
pub fn poll_fds(fds: &[RawFd], events: PollEvents, timeout: Duration) -> io::Result<Vec<Ready>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: events.bits(),
            revents: 0,
        })
        .collect();

    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    // Safety: pollfds is a live, correctly sized array for the duration of the call.
    let ret = unsafe {
        libc::poll(
            pollfds.as_mut_ptr(),
            pollfds.len() as libc::nfds_t,
            timeout_ms,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Vec::new());
        }
        return Err(err);
    }

    Ok(pollfds
        .iter()
        .enumerate()
        .filter(|(_, p)| p.revents != 0)
        .map(|(index, p)| Ready {
            index,
            events: PollEvents::from_bits_truncate(p.revents),
        })
        .collect())
}

bitflags! {
    /// poll(2) event bits watched on input devices
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollEvents: libc::c_short {
        const IN   = libc::POLLIN;
        const PRI  = libc::POLLPRI;
        const HUP  = libc::POLLHUP;
        const NVAL = libc::POLLNVAL;
        const ERR  = libc::POLLERR;
        /// Everything the receive worker registers for
        const INPUT = Self::IN.bits() | Self::PRI.bits() | Self::HUP.bits() | Self::NVAL.bits() | Self::ERR.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_poll_reports_ready_index() {
        let (a, _a_peer) = UnixStream::pair().unwrap();
        let (b, mut b_peer) = UnixStream::pair().unwrap();
        b_peer.write_all(b"x").unwrap();

        let ready = poll_fds(
            &[a.as_raw_fd(), -1, b.as_raw_fd()],
            PollEvents::INPUT,
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].index, 2);
        assert!(ready[0].events.contains(PollEvents::IN));
    }

    #[test]
    fn test_poll_times_out() {
        let (a, _peer) = UnixStream::pair().unwrap();
        let ready = poll_fds(&[a.as_raw_fd()], PollEvents::INPUT, Duration::from_millis(10)).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn test_grab_ioctl_rejected_by_socket() {
        let (a, _peer) = UnixStream::pair().unwrap();
        assert!(ioctl_with_int_arg(a.as_raw_fd(), crate::input::keycodes::EVIOCGRAB, 1).is_err());
    }
}
