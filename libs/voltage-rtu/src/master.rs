//! Modbus RTU master
//!
//! One transaction at a time: flush, write the request, drain, read the
//! predetermined reply length, then validate CRC and echo. The transport is
//! opened lazily and dropped after any system-level failure; the next call
//! reopens it.
//!
//! Consecutive transport operations are spaced by at least
//! [`INTER_FRAME_TIMEOUT`] measured from the end of the previous one.

use std::time::{Duration, Instant};

use common::hex::dump_compact;
use tracing::{debug, trace, warn};

use crate::bits::{bytes_to_words, unpack_bits};
use crate::clock::{Clock, MonotonicClock};
use crate::config::SerialConfig;
use crate::constants::{INTER_FRAME_TIMEOUT, WRITE_TIMEOUT};
use crate::error::{Result, RtuError};
use crate::frame::{self, exception_in, Addr, Request};
use crate::serial::SerialConnector;
use crate::transport::{Connector, Transport};

/// Modbus RTU master over one line
pub struct Master<C: Connector, K: Clock = MonotonicClock> {
    connector: C,
    clock: K,
    transport: Option<C::Transport>,
    last_op: Instant,
}

impl Master<SerialConnector> {
    /// Master for a serial device; nothing is opened until the first request
    pub fn open(path: impl Into<String>, config: SerialConfig) -> Self {
        Self::new(SerialConnector::new(path, config))
    }
}

impl<C: Connector> Master<C> {
    pub fn new(connector: C) -> Self {
        Self::with_clock(connector, MonotonicClock)
    }
}

impl<C: Connector, K: Clock> Master<C, K> {
    pub fn with_clock(connector: C, clock: K) -> Self {
        let last_op = clock.now();
        Self {
            connector,
            clock,
            transport: None,
            last_op,
        }
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Drop the transport; the next request reopens it
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("Master: transport closed");
        }
    }

    /// The transport, opened if needed (for counters and diagnostics)
    pub fn device(&mut self) -> Result<&mut C::Transport> {
        self.connected()
    }

    fn connected(&mut self) -> Result<&mut C::Transport> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                let transport = self.connector.connect()?;
                debug!("Master: transport connected");
                self.update_timing();
                transport
            },
        };
        Ok(self.transport.insert(transport))
    }

    /// Run `op` on the transport, dropping it if the failure says so
    fn with_device<T>(&mut self, op: impl FnOnce(&mut C::Transport) -> Result<T>) -> Result<T> {
        let result = op(self.connected()?);
        if let Err(e) = &result {
            if e.invalidates_transport() {
                warn!("Master: dropping transport: {}", e);
                self.transport = None;
            }
        }
        result
    }

    fn update_timing(&mut self) {
        self.last_op = self.clock.now();
    }

    fn ensure_timing(&mut self) -> Result<()> {
        let now = self.clock.now();
        if now <= self.last_op {
            return Err(RtuError::timing(format!(
                "clock at {:?} not after last operation at {:?}",
                now, self.last_op
            )));
        }

        let wait = INTER_FRAME_TIMEOUT.saturating_sub(now - self.last_op);
        if !wait.is_zero() {
            trace!("waiting {}us", wait.as_micros());
            self.clock.sleep(wait);
        }
        Ok(())
    }

    fn flush_device(&mut self) -> Result<()> {
        self.with_device(|t| t.flush())
    }

    fn drain_device(&mut self) -> Result<()> {
        self.with_device(|t| t.drain())
    }

    fn write_device(&mut self, frame: &[u8]) -> Result<usize> {
        self.connected()?;
        self.ensure_timing()?;
        let written = self.with_device(|t| t.write(frame, WRITE_TIMEOUT).map(<[u8]>::len))?;
        self.update_timing();
        Ok(written)
    }

    fn read_device(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.connected()?;
        self.ensure_timing()?;
        let received = self.with_device(|t| t.read(buf, timeout).map(<[u8]>::len))?;
        self.update_timing();
        Ok(received)
    }

    /// One request/reply exchange; returns the reply payload
    fn transact(&mut self, request: &Request, timeout: Duration) -> Result<Vec<u8>> {
        self.flush_device()?;

        let written = self.write_device(&request.frame)?;
        debug!("fc{:02} > {}", request.function, dump_compact(&request.frame));
        if written != request.frame.len() {
            return Err(RtuError::Request {
                written,
                expected: request.frame.len(),
            });
        }

        self.drain_device()?;

        let mut reply = request.reply_buffer();
        let received = self.read_device(&mut reply, timeout)?;
        if received == 0 {
            debug!("fc{:02} < timeout", request.function);
            return Err(RtuError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        debug!("fc{:02} < {}", request.function, dump_compact(&reply[..received]));
        if received < reply.len() {
            match exception_in(&reply, received) {
                Some(exception) => warn!(
                    "fc{:02} exception from slave {} fcode {:#04x} ecode {:#04x}",
                    request.function, exception.slave, exception.function, exception.code
                ),
                None => warn!(
                    "fc{:02} partial reply: length {}, expected {}",
                    request.function,
                    received,
                    reply.len()
                ),
            }
        }

        request.accept(&reply, received).map(<[u8]>::to_vec)
    }

    /// FC 05
    pub fn wr_coil(&mut self, slave: Addr, address: u16, on: bool, timeout: Duration) -> Result<()> {
        let request = frame::write_single_coil(slave, address, on);
        self.transact(&request, timeout).map(drop)
    }

    /// FC 06
    pub fn wr_register(
        &mut self,
        slave: Addr,
        address: u16,
        value: u16,
        timeout: Duration,
    ) -> Result<()> {
        let request = frame::write_single_register(slave, address, value);
        self.transact(&request, timeout).map(drop)
    }

    /// FC 16; an empty slice is a no-op
    pub fn wr_registers(
        &mut self,
        slave: Addr,
        address: u16,
        values: &[u16],
        timeout: Duration,
    ) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let request = frame::write_multiple_registers(slave, address, values)?;
        self.transact(&request, timeout).map(drop)
    }

    /// FC 01; one flag per coil, in address order
    pub fn rd_coils(
        &mut self,
        slave: Addr,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<bool>> {
        let request = frame::read_coils(slave, address, count)?;
        let payload = self.transact(&request, timeout)?;
        Ok(unpack_bits(&payload, count as usize))
    }

    /// FC 03
    pub fn rd_registers(
        &mut self,
        slave: Addr,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>> {
        let request = frame::read_holding_registers(slave, address, count)?;
        let payload = self.transact(&request, timeout)?;
        Ok(bytes_to_words(&payload))
    }

    /// FC 66; an empty slice is a no-op
    pub fn wr_bytes(
        &mut self,
        slave: Addr,
        address: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let request = frame::write_bytes(slave, address, data)?;
        self.transact(&request, timeout).map(drop)
    }

    /// FC 65
    pub fn rd_bytes(
        &mut self,
        slave: Addr,
        address: u16,
        count: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let request = frame::read_bytes(slave, address, count)?;
        self.transact(&request, timeout)
    }
}
