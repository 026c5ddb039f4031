//! Pseudo-terminal pair
//!
//! Two connected [`SerialTransport`]s backed by a pty, for exercising the
//! master without hardware. Bytes written on one end are read on the other.

use std::ffi::CStr;
use std::os::fd::AsRawFd;

use tracing::debug;

use crate::config::SerialConfig;
use crate::error::{Result, RtuError};
use crate::fd_guard::DeviceHandle;
use crate::serial::{SerialTransport, OPEN_FLAGS};

/// Default pty multiplexor
pub const PTMX: &str = "/dev/ptmx";

/// Connected ends of one pseudo terminal
#[derive(Debug)]
pub struct PseudoPair {
    pub master: SerialTransport,
    pub slave: SerialTransport,
}

impl PseudoPair {
    /// Allocate a pty on `/dev/ptmx` and configure both ends with `config`
    pub fn open(config: SerialConfig) -> Result<Self> {
        Self::open_with(PTMX, config)
    }

    pub fn open_with(multiplexor: &str, config: SerialConfig) -> Result<Self> {
        let (master, slave_path) = allocate(multiplexor)?;
        let slave = DeviceHandle::open(slave_path.as_str(), OPEN_FLAGS)?;
        debug!("pty pair: {} <-> {}", multiplexor, slave_path);

        Ok(Self {
            master: SerialTransport::from_handle(master, config)?,
            slave: SerialTransport::from_handle(slave, config)?,
        })
    }

    /// Path of the secondary end, usable by a [`crate::serial::SerialConnector`]
    pub fn slave_path(&self) -> &str {
        self.slave.path()
    }
}

/// Open and unlock a pty on `multiplexor`; returns it with the secondary path
fn allocate(multiplexor: &str) -> Result<(DeviceHandle, String)> {
    let master = DeviceHandle::open(multiplexor, OPEN_FLAGS)?;
    let fd = master.as_raw_fd();

    // SAFETY: fd is an open pty master
    if unsafe { libc::grantpt(fd) } != 0 {
        return Err(RtuError::last_os_error("grantpt"));
    }
    // SAFETY: as above
    if unsafe { libc::unlockpt(fd) } != 0 {
        return Err(RtuError::last_os_error("unlockpt"));
    }

    let mut name = [0 as libc::c_char; libc::PATH_MAX as usize];
    // SAFETY: name is writable for its full length
    let r = unsafe { libc::ptsname_r(fd, name.as_mut_ptr(), name.len()) };
    if r != 0 {
        return Err(RtuError::system_call(
            "ptsname_r",
            std::io::Error::from_raw_os_error(r),
        ));
    }
    // SAFETY: ptsname_r wrote a NUL terminated path into name
    let slave_path = unsafe { CStr::from_ptr(name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    Ok((master, slave_path))
}
