//! Scripted in-memory transport for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::clock::ManualClock;
use crate::crc;
use crate::error::{Result, RtuError};
use crate::transport::{ByteCounters, Connector, Transport};

/// What the next read returns
#[derive(Debug, Clone)]
pub enum Reply {
    /// Last written frame, verbatim
    Echo,
    /// Fixed bytes, truncated to the read buffer
    Bytes(Vec<u8>),
    /// `body` followed by its CRC
    Sealed(Vec<u8>),
    /// Nothing until the deadline
    Silence,
    /// Device vanished
    Disconnect,
}

#[derive(Debug, Default)]
pub struct Wire {
    pub written: Vec<Vec<u8>>,
    pub replies: VecDeque<Reply>,
    pub connects: usize,
    pub flushes: usize,
    pub drains: usize,
    pub write_at: Vec<Instant>,
    pub read_done_at: Vec<Instant>,
}

/// Shared view of what crossed the mock wire
#[derive(Debug, Clone, Default)]
pub struct Script(Arc<Mutex<Wire>>);

impl Script {
    pub fn wire(&self) -> MutexGuard<'_, Wire> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, reply: Reply) -> &Self {
        self.wire().replies.push_back(reply);
        self
    }
}

pub struct MockTransport {
    script: Script,
    clock: ManualClock,
    counters: ByteCounters,
}

impl Transport for MockTransport {
    fn read<'a>(&mut self, buf: &'a mut [u8], timeout: Duration) -> Result<&'a [u8]> {
        let mut wire = self.script.wire();
        let bytes = match wire.replies.pop_front().unwrap_or(Reply::Silence) {
            Reply::Echo => wire.written.last().cloned().unwrap_or_default(),
            Reply::Bytes(bytes) => bytes,
            Reply::Sealed(mut body) => {
                crc::append(&mut body);
                body
            },
            Reply::Silence => {
                self.clock.advance(timeout);
                Vec::new()
            },
            Reply::Disconnect => {
                return Err(RtuError::system_call(
                    "read",
                    std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
                ))
            },
        };

        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.counters.add_rx(n);
        wire.read_done_at.push(self.clock.peek());
        Ok(&buf[..n])
    }

    fn write<'a>(&mut self, buf: &'a [u8], _timeout: Duration) -> Result<&'a [u8]> {
        let mut wire = self.script.wire();
        wire.written.push(buf.to_vec());
        wire.write_at.push(self.clock.peek());
        self.counters.add_tx(buf.len());
        Ok(buf)
    }

    fn drain(&mut self) -> Result<()> {
        self.script.wire().drains += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.script.wire().flushes += 1;
        Ok(())
    }

    fn rx_flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn tx_flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn counters(&self) -> &ByteCounters {
        &self.counters
    }

    fn counters_mut(&mut self) -> &mut ByteCounters {
        &mut self.counters
    }
}

/// Connects any number of times to the same script
#[derive(Clone)]
pub struct MockConnector {
    pub script: Script,
    pub clock: ManualClock,
}

impl MockConnector {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            script: Script::default(),
            clock,
        }
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(&mut self) -> Result<MockTransport> {
        self.script.wire().connects += 1;
        Ok(MockTransport {
            script: self.script.clone(),
            clock: self.clock.clone(),
            counters: ByteCounters::default(),
        })
    }
}
