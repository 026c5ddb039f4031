//! Exclusive owner of one OS file descriptor
//!
//! `DeviceHandle` closes its descriptor exactly once, when dropped, unless
//! ownership was given up with [`DeviceHandle::release`]. It is movable but
//! not clonable; a descriptor never has two owners.

use std::ffi::CString;
use std::os::fd::{AsRawFd, RawFd};

use tracing::trace;

use crate::error::{Result, RtuError};

/// Single-owner file descriptor guard
#[derive(Debug)]
pub struct DeviceHandle {
    fd: Option<RawFd>,
    path: String,
}

impl DeviceHandle {
    /// Take ownership of an already open descriptor
    pub fn from_raw(fd: RawFd) -> Self {
        trace!("DeviceHandle adopt fd={}", fd);
        Self {
            fd: Some(fd),
            path: String::new(),
        }
    }

    /// Open `path` with `open(2)` flags
    pub fn open(path: impl Into<String>, flags: libc::c_int) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(RtuError::invalid_argument("device path is empty"));
        }

        let c_path = CString::new(path.as_str())
            .map_err(|e| RtuError::invalid_argument(format!("device path {:?}: {}", path, e)))?;

        // SAFETY: c_path is a valid NUL terminated string for the duration of the call
        let fd = unsafe { libc::open(c_path.as_ptr(), flags) };
        if fd == -1 {
            return Err(RtuError::last_os_error("open"));
        }

        trace!("DeviceHandle open {} fd={}", path, fd);
        Ok(Self { fd: Some(fd), path })
    }

    /// Raw descriptor, `None` once released
    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// Path the descriptor was opened from (empty when adopted)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    /// Give up ownership; the caller becomes responsible for closing
    pub fn release(&mut self) -> Option<RawFd> {
        self.fd.take()
    }
}

impl AsRawFd for DeviceHandle {
    /// Returns -1 once released
    fn as_raw_fd(&self) -> RawFd {
        self.fd.unwrap_or(-1)
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            trace!("DeviceHandle close fd={}", fd);
            // SAFETY: fd is owned by this handle and closed only here
            unsafe {
                libc::close(fd);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    /// (read end, write end); the write end is what the tests hand out
    fn pipe() -> (DeviceHandle, RawFd) {
        let mut fds = [0 as RawFd; 2];
        // SAFETY: fds has room for the two descriptors pipe(2) fills in
        let r = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(r, 0);
        (DeviceHandle::from_raw(fds[0]), fds[1])
    }

    /// Writer closed <=> reader sees EOF
    fn writer_closed(reader: &DeviceHandle) -> bool {
        let mut buf = [0u8; 1];
        // SAFETY: buf is valid for one byte
        let r = unsafe { libc::read(reader.as_raw_fd(), buf.as_mut_ptr().cast(), 1) };
        r == 0
    }

    #[test]
    fn test_open_empty_path() {
        let err = DeviceHandle::open("", libc::O_RDONLY).unwrap_err();
        assert!(matches!(err, RtuError::InvalidArgument(_)));
    }

    #[test]
    fn test_open_missing_path() {
        let err = DeviceHandle::open("/nonexistent/ttyRTU0", libc::O_RDWR).unwrap_err();
        assert!(matches!(err, RtuError::SystemCall { op: "open", .. }));
        assert!(err.invalidates_transport());
    }

    #[test]
    fn test_open_records_path() {
        let handle = DeviceHandle::open("/dev/null", libc::O_RDWR).unwrap();
        assert!(handle.is_open());
        assert_eq!(handle.path(), "/dev/null");
        assert!(handle.as_raw_fd() >= 0);
    }

    #[test]
    fn test_drop_closes() {
        let (reader, write_fd) = pipe();
        let writer = DeviceHandle::from_raw(write_fd);
        drop(writer);
        assert!(writer_closed(&reader));
    }

    #[test]
    fn test_move_keeps_single_owner() {
        let (reader, write_fd) = pipe();
        let writer = DeviceHandle::from_raw(write_fd);
        let moved = writer;
        assert_eq!(moved.as_raw_fd(), write_fd);
        drop(moved);
        assert!(writer_closed(&reader));
    }

    #[test]
    fn test_release() {
        let (reader, write_fd) = pipe();
        let mut writer = DeviceHandle::from_raw(write_fd);
        assert_eq!(writer.release(), Some(write_fd));
        assert!(!writer.is_open());
        assert_eq!(writer.as_raw_fd(), -1);
        assert_eq!(writer.release(), None);
        drop(writer);

        // Still open: one byte goes through
        // SAFETY: one byte from a static buffer
        let r = unsafe { libc::write(write_fd, b"x".as_ptr().cast(), 1) };
        assert_eq!(r, 1);

        // Re-adopt so the descriptor is closed
        drop(DeviceHandle::from_raw(write_fd));
        let mut buf = [0u8; 1];
        // SAFETY: buf is valid for one byte
        let r = unsafe { libc::read(reader.as_raw_fd(), buf.as_mut_ptr().cast(), 1) };
        assert_eq!(r, 1);
        assert!(writer_closed(&reader));
    }
}
