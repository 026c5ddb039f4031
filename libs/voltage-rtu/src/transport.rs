//! Byte transport abstraction
//!
//! The master talks to the wire only through [`Transport`] and obtains
//! transports only through [`Connector`], so a failed transport can be
//! dropped and a fresh one opened on the next request.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{Result, RtuError};

/// Received/transmitted byte bookkeeping
///
/// `rx`/`tx` count the current reporting window and are reset by
/// [`ByteCounters::clear`]; the totals are never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounters {
    pub rx: u64,
    pub tx: u64,
    pub rx_total: u64,
    pub tx_total: u64,
}

impl ByteCounters {
    pub fn add_rx(&mut self, n: usize) {
        self.rx += n as u64;
        self.rx_total += n as u64;
    }

    pub fn add_tx(&mut self, n: usize) {
        self.tx += n as u64;
        self.tx_total += n as u64;
    }

    /// Start a new window
    pub fn clear(&mut self) {
        self.rx = 0;
        self.tx = 0;
    }
}

/// Deadline-bounded byte I/O on one exclusively owned line
pub trait Transport {
    /// Fill `buf` until full or `timeout` elapses; returns the filled prefix.
    /// A short (even empty) prefix is not an error.
    fn read<'a>(&mut self, buf: &'a mut [u8], timeout: Duration) -> Result<&'a [u8]>;

    /// Write `buf` until done or `timeout` elapses; returns the written prefix
    fn write<'a>(&mut self, buf: &'a [u8], timeout: Duration) -> Result<&'a [u8]>;

    /// Block until every written byte left the line
    fn drain(&mut self) -> Result<()>;

    /// Discard pending input and output
    fn flush(&mut self) -> Result<()>;

    /// Discard pending input
    fn rx_flush(&mut self) -> Result<()>;

    /// Discard pending output
    fn tx_flush(&mut self) -> Result<()>;

    fn counters(&self) -> &ByteCounters;

    fn counters_mut(&mut self) -> &mut ByteCounters;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read<'a>(&mut self, buf: &'a mut [u8], timeout: Duration) -> Result<&'a [u8]> {
        (**self).read(buf, timeout)
    }

    fn write<'a>(&mut self, buf: &'a [u8], timeout: Duration) -> Result<&'a [u8]> {
        (**self).write(buf, timeout)
    }

    fn drain(&mut self) -> Result<()> {
        (**self).drain()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn rx_flush(&mut self) -> Result<()> {
        (**self).rx_flush()
    }

    fn tx_flush(&mut self) -> Result<()> {
        (**self).tx_flush()
    }

    fn counters(&self) -> &ByteCounters {
        (**self).counters()
    }

    fn counters_mut(&mut self) -> &mut ByteCounters {
        (**self).counters_mut()
    }
}

/// Factory for fresh transports, used for lazy (re)initialisation
pub trait Connector {
    type Transport: Transport;

    fn connect(&mut self) -> Result<Self::Transport>;
}

/// Hands out already open transports in order, then fails
///
/// Lets a master run over a pty end or any transport built elsewhere.
#[derive(Debug)]
pub struct ReadyConnector<T> {
    ready: VecDeque<T>,
}

impl<T> ReadyConnector<T> {
    pub fn new(transport: T) -> Self {
        Self::from_iter([transport])
    }

    pub fn remaining(&self) -> usize {
        self.ready.len()
    }
}

impl<T> FromIterator<T> for ReadyConnector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            ready: iter.into_iter().collect(),
        }
    }
}

impl<T: Transport> Connector for ReadyConnector<T> {
    type Transport = T;

    fn connect(&mut self) -> Result<T> {
        self.ready
            .pop_front()
            .ok_or_else(|| RtuError::invalid_argument("no transport left to connect"))
    }
}
