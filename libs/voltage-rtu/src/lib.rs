//! Voltage RTU Library
//!
//! Modbus RTU master over a raw serial line.
//!
//! # Architecture
//!
//! - **Transport**: `SerialTransport` puts a terminal in raw mode and moves
//!   bytes with poll(2)-driven, deadline-bounded reads and writes
//! - **Framing**: `frame` builds requests per function code and accepts or
//!   rejects replies (CRC, echo, exception frames)
//! - **Master**: `Master` runs one transaction at a time, keeps the Modbus
//!   inter-frame spacing and reopens the device after system-level failures
//! - **Dispatch**: JSON requests with retry on top of the master
//!
//! # Supported function codes
//!
//! 1 (read coils), 3 (read holding registers), 5 (write single coil),
//! 6 (write single register), 16 (write multiple registers) and the vendor
//! codes 65 (read bytes) and 66 (write bytes).

pub mod bits;
pub mod clock;
pub mod config;
pub mod constants;
pub mod crc;
pub mod dispatch;
pub mod error;
pub mod fd_guard;
pub mod frame;
pub mod master;
pub mod pty;
pub mod serial;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export core types
pub use clock::{Clock, MonotonicClock};
pub use config::{BaudRate, DataBits, Parity, SerialConfig, StopBits};
pub use error::{Result, RtuError};
pub use fd_guard::DeviceHandle;
pub use frame::Addr;
pub use master::Master;
pub use pty::PseudoPair;
pub use serial::{SerialConnector, SerialTransport};
pub use transport::{ByteCounters, Connector, ReadyConnector, Transport};
