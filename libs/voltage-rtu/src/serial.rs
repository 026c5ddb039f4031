//! Raw-mode serial transport
//!
//! `SerialTransport` owns one terminal descriptor, switches it to raw mode on
//! open and restores the saved line settings when dropped. Reads and writes
//! are poll(2)-driven with a caller-supplied deadline that shrinks with the
//! time already spent, so one call never outlives its timeout.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use common::hex::dump_compact;
use tracing::{debug, trace};

use crate::config::{Parity, SerialConfig, StopBits};
use crate::error::{Result, RtuError};
use crate::fd_guard::DeviceHandle;
use crate::transport::{ByteCounters, Connector, Transport};

/// Flags used to open a serial device
pub const OPEN_FLAGS: libc::c_int = libc::O_RDWR | libc::O_NONBLOCK | libc::O_NOCTTY;

/// Read the current line settings of `fd`
pub fn get_settings(fd: RawFd) -> Result<libc::termios> {
    // SAFETY: termios is plain old data; all-zero is a valid value
    let mut settings: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: settings is a valid termios for tcgetattr to fill in
    if unsafe { libc::tcgetattr(fd, &mut settings) } == -1 {
        return Err(RtuError::last_os_error("tcgetattr"));
    }
    Ok(settings)
}

/// Apply `config` plus raw mode to `settings`
///
/// Mirrors cfmakeraw(3) without touching fields it does not need: no
/// canonical mode, echo, signals, flow control or output processing, and
/// VMIN = VTIME = 0 since poll(2) does the waiting.
pub fn apply_config(settings: &mut libc::termios, config: &SerialConfig) {
    // SAFETY: settings is a valid termios
    unsafe {
        libc::cfsetispeed(settings, config.baud_rate.speed());
        libc::cfsetospeed(settings, config.baud_rate.speed());
    }

    match config.parity {
        Parity::None => {
            settings.c_cflag &= !libc::PARENB;
            settings.c_iflag &= !libc::INPCK;
        },
        Parity::Odd => {
            settings.c_iflag |= libc::INPCK;
            settings.c_cflag |= libc::PARENB | libc::PARODD;
        },
        Parity::Even => {
            settings.c_iflag |= libc::INPCK;
            settings.c_cflag |= libc::PARENB;
            settings.c_cflag &= !libc::PARODD;
        },
    }

    settings.c_cflag &= !libc::CSIZE;
    settings.c_cflag |= config.data_bits.csize();

    match config.stop_bits {
        StopBits::One => settings.c_cflag &= !libc::CSTOPB,
        StopBits::Two => settings.c_cflag |= libc::CSTOPB,
    }

    // no hardware flow control, receiver on, ignore modem control lines
    settings.c_cflag &= !libc::CRTSCTS;
    settings.c_cflag |= libc::CREAD | libc::CLOCAL;

    settings.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
    settings.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    settings.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL);
    settings.c_oflag &= !(libc::OPOST | libc::ONLCR);

    settings.c_cc[libc::VTIME] = 0;
    settings.c_cc[libc::VMIN] = 0;
}

/// True when every field `apply_config` sets reads back unchanged
pub fn settings_match(requested: &libc::termios, current: &libc::termios) -> bool {
    // SAFETY: both are valid termios
    let speeds_match = unsafe {
        libc::cfgetispeed(requested) == libc::cfgetispeed(current)
            && libc::cfgetospeed(requested) == libc::cfgetospeed(current)
    };

    speeds_match
        && requested.c_iflag == current.c_iflag
        && requested.c_oflag == current.c_oflag
        && requested.c_cflag == current.c_cflag
        && requested.c_lflag == current.c_lflag
        && requested.c_cc[libc::VMIN] == current.c_cc[libc::VMIN]
        && requested.c_cc[libc::VTIME] == current.c_cc[libc::VTIME]
}

/// Commit `settings` and check that all of them were applied
///
/// tcsetattr(3) reports success when any one change took effect.
pub fn set_settings(fd: RawFd, settings: &libc::termios) -> Result<()> {
    // SAFETY: settings is a valid termios
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, settings) } == -1 {
        return Err(RtuError::last_os_error("tcsetattr"));
    }

    let current = get_settings(fd)?;
    if !settings_match(settings, &current) {
        return Err(RtuError::consistency(format!(
            "line settings not applied: cflag {:#x} -> {:#x}, iflag {:#x} -> {:#x}",
            settings.c_cflag, current.c_cflag, settings.c_iflag, current.c_iflag
        )));
    }
    Ok(())
}

/// Serial line in raw mode
pub struct SerialTransport {
    handle: DeviceHandle,
    config: SerialConfig,
    backup: libc::termios,
    counters: ByteCounters,
    last_op: Instant,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("handle", &self.handle)
            .field("config", &self.config)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Open `path` non-blocking and configure it
    pub fn open(path: &str, config: SerialConfig) -> Result<Self> {
        let handle = DeviceHandle::open(path, OPEN_FLAGS)?;
        Self::from_handle(handle, config)
    }

    /// Configure an already open terminal descriptor
    ///
    /// Saves the current settings, applies `config` in raw mode and discards
    /// anything pending in either direction. If any step fails the saved
    /// settings are put back before the descriptor closes.
    pub fn from_handle(handle: DeviceHandle, config: SerialConfig) -> Result<Self> {
        let fd = handle.as_raw_fd();
        let backup = get_settings(fd)?;

        // built first so that Drop restores `backup` on every error below
        let transport = Self {
            handle,
            config,
            backup,
            counters: ByteCounters::default(),
            last_op: Instant::now(),
        };

        let mut settings = backup;
        apply_config(&mut settings, &config);
        set_settings(fd, &settings)?;
        transport.tcflush(libc::TCIOFLUSH)?;

        debug!(
            "Serial open: {} fd={} {}",
            transport.handle.path(),
            fd,
            config
        );
        Ok(transport)
    }

    pub fn path(&self) -> &str {
        self.handle.path()
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn tcflush(&self, queue: libc::c_int) -> Result<()> {
        // SAFETY: plain ioctl on an owned descriptor
        if unsafe { libc::tcflush(self.handle.as_raw_fd(), queue) } == -1 {
            return Err(RtuError::last_os_error("tcflush"));
        }
        Ok(())
    }

    /// Poll for `events` and run `io` until `len` bytes moved or the
    /// deadline is spent; returns the number of bytes moved
    fn poll_io<F>(
        &self,
        events: libc::c_short,
        op: &'static str,
        len: usize,
        timeout: Duration,
        mut io: F,
    ) -> Result<usize>
    where
        F: FnMut(RawFd, usize) -> libc::ssize_t,
    {
        let fd = self.handle.as_raw_fd();
        let deadline_ms = timeout.as_millis() as u64;
        let start = Instant::now();
        let mut elapsed_ms = 0u64;
        let mut done = 0usize;

        while done < len && elapsed_ms <= deadline_ms {
            let mut pfd = libc::pollfd {
                fd,
                events,
                revents: 0,
            };
            let wait = (deadline_ms - elapsed_ms).min(libc::c_int::MAX as u64) as libc::c_int;
            // SAFETY: pfd is a single valid pollfd
            let r = unsafe { libc::poll(&mut pfd, 1, wait) };
            elapsed_ms = start.elapsed().as_millis() as u64;

            if r == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(RtuError::system_call("poll", err));
            }
            if r == 0 {
                continue;
            }
            if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                return Err(RtuError::system_call(
                    "poll",
                    io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        format!("revents {:#x}", pfd.revents),
                    ),
                ));
            }
            if pfd.revents & events == 0 {
                // poll keeps reporting a hangup at once; wait out the deadline instead
                if pfd.revents & libc::POLLHUP != 0 {
                    trace!("{}: hangup on fd={}", op, fd);
                    std::thread::sleep(Duration::from_millis(deadline_ms.saturating_sub(elapsed_ms)));
                    break;
                }
                continue;
            }

            let n = io(fd, done);
            if n == -1 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => continue,
                    _ => return Err(RtuError::system_call(op, err)),
                }
            }
            if n == 0 {
                return Err(RtuError::system_call(
                    op,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "device ready but no data moved"),
                ));
            }
            done += n as usize;
        }

        Ok(done)
    }

    fn log_op(&mut self, tag: &str, started: Instant, data: &[u8], expected: usize) {
        let now = Instant::now();
        debug!(
            "{} {}ms {}us ({}/{}) {}{}",
            tag,
            started.saturating_duration_since(self.last_op).as_millis(),
            now.saturating_duration_since(started).as_micros(),
            data.len(),
            expected,
            dump_compact(data),
            if data.is_empty() && expected > 0 {
                " timeout"
            } else {
                ""
            }
        );
        self.last_op = now;
    }
}

impl Transport for SerialTransport {
    fn read<'a>(&mut self, buf: &'a mut [u8], timeout: Duration) -> Result<&'a [u8]> {
        let started = Instant::now();
        let len = buf.len();
        let n = self.poll_io(libc::POLLIN, "read", len, timeout, |fd, offset| {
            let rest = &mut buf[offset..];
            // SAFETY: rest is valid for rest.len() bytes
            unsafe { libc::read(fd, rest.as_mut_ptr().cast(), rest.len()) }
        })?;
        self.counters.add_rx(n);

        let filled = &buf[..n];
        self.log_op("read", started, filled, len);
        Ok(filled)
    }

    fn write<'a>(&mut self, buf: &'a [u8], timeout: Duration) -> Result<&'a [u8]> {
        let started = Instant::now();
        let n = self.poll_io(libc::POLLOUT, "write", buf.len(), timeout, |fd, offset| {
            let rest = &buf[offset..];
            // SAFETY: rest is valid for rest.len() bytes
            unsafe { libc::write(fd, rest.as_ptr().cast(), rest.len()) }
        })?;
        self.counters.add_tx(n);

        let written = &buf[..n];
        self.log_op("write", started, written, buf.len());
        Ok(written)
    }

    fn drain(&mut self) -> Result<()> {
        // SAFETY: plain ioctl on an owned descriptor
        if unsafe { libc::tcdrain(self.handle.as_raw_fd()) } == -1 {
            return Err(RtuError::last_os_error("tcdrain"));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.tcflush(libc::TCIOFLUSH)
    }

    fn rx_flush(&mut self) -> Result<()> {
        self.tcflush(libc::TCIFLUSH)
    }

    fn tx_flush(&mut self) -> Result<()> {
        self.tcflush(libc::TCOFLUSH)
    }

    fn counters(&self) -> &ByteCounters {
        &self.counters
    }

    fn counters_mut(&mut self) -> &mut ByteCounters {
        &mut self.counters
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        debug!(
            "Serial close: {} rx={} tx={} rx_total={} tx_total={}",
            self.handle.path(),
            self.counters.rx,
            self.counters.tx,
            self.counters.rx_total,
            self.counters.tx_total
        );

        if let Some(fd) = self.handle.fd() {
            // Best effort: nothing useful can be done with a failure here
            // SAFETY: fd is still owned by self.handle; backup came from tcgetattr
            unsafe {
                libc::tcflush(fd, libc::TCIOFLUSH);
                libc::tcsetattr(fd, libc::TCSANOW, &self.backup);
            }
            trace!("Serial settings restored fd={}", fd);
        }
    }
}

/// Opens a [`SerialTransport`] on `path` for every (re)connect
#[derive(Debug, Clone)]
pub struct SerialConnector {
    pub path: String,
    pub config: SerialConfig,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>, config: SerialConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

impl Connector for SerialConnector {
    type Transport = SerialTransport;

    fn connect(&mut self) -> Result<SerialTransport> {
        SerialTransport::open(&self.path, self.config)
    }
}
