//! Modbus RTU protocol constants
//!
//! Function codes, request limits and timing values used by the master.

use std::time::Duration;

// ============================================================================
// Function Codes
// ============================================================================

/// Read Coils
pub const FC_READ_COILS: u8 = 0x01;

/// Read Holding Registers
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Write Single Coil
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Registers
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// First user-defined function code
pub const FC_USER_OFFSET: u8 = 65;

/// Read Bytes (vendor)
pub const FC_READ_BYTES: u8 = FC_USER_OFFSET;

/// Write Bytes (vendor)
pub const FC_WRITE_BYTES: u8 = FC_USER_OFFSET + 1;

/// Bit set in the function code of an exception reply
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Frame Sizes
// ============================================================================

/// CRC trailer length
pub const CRC_LEN: usize = 2;

/// Slave address + function code
pub const ADDR_FCODE_LEN: usize = 2;

/// Slave address + function code + byte count
pub const READ_REPLY_HEADER_LEN: usize = 3;

/// Slave address + function code + exception code + CRC
pub const EXCEPTION_FRAME_LEN: usize = ADDR_FCODE_LEN + 1 + CRC_LEN;

/// Maximum RTU ADU size
pub const MAX_ADU_SIZE: usize = 256;

// ============================================================================
// Request Limits (exclusive upper bounds)
// ============================================================================

/// Read Coils: 0 < count < 0x7D1 (i.e. at most 2000)
pub const READ_COILS_LIMIT: usize = 0x7D1;

/// Read Holding Registers: 0 < count < 0x7E (i.e. at most 125)
pub const READ_REGISTERS_LIMIT: usize = 0x7E;

/// Write Multiple Registers: 0 < count < 0x7C (i.e. at most 123)
pub const WRITE_REGISTERS_LIMIT: usize = 0x7C;

/// Read/Write Bytes: 0 < count < 250
pub const BYTES_LIMIT: usize = 250;

/// Coil value for ON in Write Single Coil
pub const COIL_ON: u16 = 0xFF00;

/// Coil value for OFF in Write Single Coil
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Timing
// ============================================================================

/// Minimum spacing between consecutive transactions
///
/// MODBUS over serial line V1.02 recommends 750us (1.5t) inter-character and
/// 1750us (3.5t) end-of-frame silent intervals above 19200bps; slaves confirm
/// end of frame after 1.5t + 3.5t, plus 500us processing margin = 3000us.
pub const INTER_FRAME_TIMEOUT: Duration = Duration::from_micros(3000);

/// 3.5 character silent interval at 19200bps
pub const SILENT_INTERVAL: Duration = Duration::from_micros(1750);

/// Default per-request timeout used by the dispatcher
///
/// At 19200bps a 256 byte ADU is 2816 bits (11 bits per character), about
/// 147ms; request + reply worst case is about 294ms.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Deadline for the write-readiness poll loop
pub const WRITE_TIMEOUT: Duration = Duration::ZERO;

/// Bits on the wire per character (start + 8 data + parity + stop)
pub const BITS_PER_CHAR: u64 = 11;
