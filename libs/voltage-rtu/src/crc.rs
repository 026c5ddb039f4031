//! Modbus CRC-16
//!
//! Reflected polynomial 0xA001, initial value 0xFFFF. On the wire the low
//! byte is sent first, the reverse of register byte order.

use crate::constants::CRC_LEN;
use crate::error::{Result, RtuError};

/// 16-bit Modbus checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc(pub u16);

impl Default for Crc {
    fn default() -> Self {
        Crc(0xFFFF)
    }
}

impl Crc {
    /// Build from the wire pair, `high` being the byte received last
    pub fn from_bytes(high: u8, low: u8) -> Self {
        Crc((u16::from(high) << 8) | u16::from(low))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn high_byte(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn low_byte(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Wire order: low byte first
    pub fn to_wire(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

/// Calculate CRC16 checksum (Modbus RTU standard)
pub fn compute(data: &[u8]) -> Crc {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }

    Crc(crc)
}

/// Append the CRC over all preceding bytes
pub fn append(frame: &mut Vec<u8>) {
    let crc = compute(frame);
    frame.extend_from_slice(&crc.to_wire());
}

/// Check the trailing CRC of a complete frame
pub fn validate(frame: &[u8]) -> Result<()> {
    if frame.len() <= CRC_LEN {
        return Err(RtuError::crc(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }

    let n = frame.len();
    let received = Crc::from_bytes(frame[n - 1], frame[n - 2]);
    let computed = compute(&frame[..n - CRC_LEN]);

    tracing::trace!(
        "rCRC {:04x} cCRC {:04x}",
        received.value(),
        computed.value()
    );

    if received != computed {
        return Err(RtuError::crc(format!(
            "mismatch: expected 0x{:04X}, got 0x{:04X}",
            computed.value(),
            received.value()
        )));
    }
    Ok(())
}
