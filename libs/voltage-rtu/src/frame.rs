//! Modbus RTU request framing and reply acceptance
//!
//! Every builder returns a [`Request`]: the complete ADU (CRC included), the
//! exact reply length to read and how much of the reply must echo the
//! request. Nothing here touches a transport.

use std::fmt;
use std::str::FromStr;

use common::hex::encode_upper;

use crate::bits::{packed_len, push_word, words_to_bytes};
use crate::constants::{
    ADDR_FCODE_LEN, BYTES_LIMIT, COIL_OFF, COIL_ON, CRC_LEN, EXCEPTION_FLAG,
    EXCEPTION_FRAME_LEN, FC_READ_BYTES, FC_READ_COILS, FC_READ_HOLDING_REGISTERS,
    FC_WRITE_BYTES, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, READ_COILS_LIMIT, READ_REGISTERS_LIMIT, READ_REPLY_HEADER_LEN,
    WRITE_REGISTERS_LIMIT,
};
use crate::crc;
use crate::error::{Result, RtuError};

/// Slave address, 1..=255
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(u8);

impl Addr {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 255;

    pub fn new(value: u8) -> Result<Self> {
        if value < Self::MIN {
            return Err(RtuError::bounds(
                "slave address",
                value as usize,
                Self::MIN as usize,
                Self::MAX as usize,
            ));
        }
        Ok(Addr(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// All valid slave addresses in ascending order
    pub fn all() -> impl Iterator<Item = Addr> {
        (Self::MIN..=Self::MAX).map(Addr)
    }
}

impl TryFrom<u8> for Addr {
    type Error = RtuError;

    fn try_from(value: u8) -> Result<Self> {
        Addr::new(value)
    }
}

impl FromStr for Addr {
    type Err = RtuError;

    fn from_str(s: &str) -> Result<Self> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| RtuError::invalid_argument(format!("invalid slave address {:?}", s)))?;
        Addr::new(value)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One framed request and the shape of the reply it expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub function: u8,
    /// Complete ADU including CRC
    pub frame: Vec<u8>,
    /// Reply length in bytes, CRC included
    pub reply_len: usize,
    /// Leading reply bytes that must equal the request
    pub echo_len: usize,
    /// Offset of the payload in the reply
    pub payload_offset: usize,
}

impl Request {
    fn new(slave: Addr, function: u8) -> Vec<u8> {
        let mut frame = Vec::with_capacity(crate::constants::MAX_ADU_SIZE);
        frame.push(slave.value());
        frame.push(function);
        frame
    }

    fn seal(
        mut frame: Vec<u8>,
        reply_len: usize,
        echo_len: usize,
        payload_offset: usize,
    ) -> Self {
        crc::append(&mut frame);
        Self {
            function: frame[1],
            frame,
            reply_len,
            echo_len,
            payload_offset,
        }
    }

    /// Zeroed buffer of the predetermined reply size
    pub fn reply_buffer(&self) -> Vec<u8> {
        vec![0u8; self.reply_len]
    }

    /// Accept or reject a reply
    ///
    /// `reply` is the full predetermined-size buffer; `received` is how many
    /// of its bytes actually arrived (callers reject 0 as a timeout first).
    /// Returns the payload slice on success.
    pub fn accept<'a>(&self, reply: &'a [u8], received: usize) -> Result<&'a [u8]> {
        if let Some(exception) = exception_in(reply, received) {
            if !exception.answers(self) {
                return Err(RtuError::reply(format!(
                    "exception from slave {} fc{:02} to a request for slave {} fc{:02}",
                    exception.slave, exception.function, self.frame[0], self.function
                )));
            }
            return Err(RtuError::Exception {
                function: exception.function,
                code: exception.code,
            });
        }

        crc::validate(reply)?;

        if reply[..self.echo_len] != self.frame[..self.echo_len] {
            return Err(RtuError::reply(format!(
                "expected {} got {}",
                encode_upper(&self.frame[..self.echo_len]),
                encode_upper(&reply[..self.echo_len])
            )));
        }

        Ok(&reply[self.payload_offset..reply.len() - CRC_LEN])
    }
}

/// CRC-valid exception frame found at the start of a short reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub slave: u8,
    /// Function code without the exception flag
    pub function: u8,
    pub code: u8,
}

impl ExceptionFrame {
    /// Same slave and function code as `request`
    pub fn answers(&self, request: &Request) -> bool {
        self.slave == request.frame[0] && self.function == request.function
    }
}

/// Detect a complete exception frame at the start of a short reply
pub fn exception_in(reply: &[u8], received: usize) -> Option<ExceptionFrame> {
    if received != EXCEPTION_FRAME_LEN || reply.len() <= EXCEPTION_FRAME_LEN {
        return None;
    }
    let frame = &reply[..EXCEPTION_FRAME_LEN];
    if frame[1] & EXCEPTION_FLAG == 0 || crc::validate(frame).is_err() {
        return None;
    }
    Some(ExceptionFrame {
        slave: frame[0],
        function: frame[1] & !EXCEPTION_FLAG,
        code: frame[2],
    })
}

fn check_count(what: &'static str, count: usize, limit: usize) -> Result<()> {
    if count == 0 || count >= limit {
        return Err(RtuError::bounds(what, count, 1, limit - 1));
    }
    Ok(())
}

/// FC 05: reply echoes address and value
pub fn write_single_coil(slave: Addr, address: u16, on: bool) -> Request {
    let mut frame = Request::new(slave, FC_WRITE_SINGLE_COIL);
    push_word(&mut frame, address);
    push_word(&mut frame, if on { COIL_ON } else { COIL_OFF });
    let len = frame.len();
    Request::seal(frame, len + CRC_LEN, len, len)
}

/// FC 06: reply echoes address and value
pub fn write_single_register(slave: Addr, address: u16, value: u16) -> Request {
    let mut frame = Request::new(slave, FC_WRITE_SINGLE_REGISTER);
    push_word(&mut frame, address);
    push_word(&mut frame, value);
    let len = frame.len();
    Request::seal(frame, len + CRC_LEN, len, len)
}

/// FC 16: reply echoes address and register count
pub fn write_multiple_registers(slave: Addr, address: u16, values: &[u16]) -> Result<Request> {
    check_count("register count", values.len(), WRITE_REGISTERS_LIMIT)?;

    let mut frame = Request::new(slave, FC_WRITE_MULTIPLE_REGISTERS);
    push_word(&mut frame, address);
    push_word(&mut frame, values.len() as u16);
    let echo_len = frame.len();
    let data = words_to_bytes(values);
    frame.push(data.len() as u8);
    frame.extend_from_slice(&data);
    Ok(Request::seal(frame, echo_len + CRC_LEN, echo_len, echo_len))
}

/// FC 01: reply carries ceil(count / 8) packed bytes
pub fn read_coils(slave: Addr, address: u16, count: u16) -> Result<Request> {
    check_count("coil count", count as usize, READ_COILS_LIMIT)?;

    let mut frame = Request::new(slave, FC_READ_COILS);
    push_word(&mut frame, address);
    push_word(&mut frame, count);
    let reply_len = READ_REPLY_HEADER_LEN + packed_len(count as usize) + CRC_LEN;
    Ok(Request::seal(
        frame,
        reply_len,
        ADDR_FCODE_LEN,
        READ_REPLY_HEADER_LEN,
    ))
}

/// FC 03: reply carries count big-endian words
pub fn read_holding_registers(slave: Addr, address: u16, count: u16) -> Result<Request> {
    check_count("register count", count as usize, READ_REGISTERS_LIMIT)?;

    let mut frame = Request::new(slave, FC_READ_HOLDING_REGISTERS);
    push_word(&mut frame, address);
    push_word(&mut frame, count);
    let reply_len = READ_REPLY_HEADER_LEN + 2 * count as usize + CRC_LEN;
    Ok(Request::seal(
        frame,
        reply_len,
        ADDR_FCODE_LEN,
        READ_REPLY_HEADER_LEN,
    ))
}

/// FC 66: reply echoes the request header (address and byte count)
pub fn write_bytes(slave: Addr, address: u16, data: &[u8]) -> Result<Request> {
    check_count("byte count", data.len(), BYTES_LIMIT)?;

    let mut frame = Request::new(slave, FC_WRITE_BYTES);
    push_word(&mut frame, address);
    frame.push(data.len() as u8);
    let header_len = frame.len();
    frame.extend_from_slice(data);
    Ok(Request::seal(
        frame,
        header_len + CRC_LEN,
        header_len,
        header_len,
    ))
}

/// FC 65: reply is the request header followed by count raw bytes
pub fn read_bytes(slave: Addr, address: u16, count: u8) -> Result<Request> {
    check_count("byte count", count as usize, BYTES_LIMIT)?;

    let mut frame = Request::new(slave, FC_READ_BYTES);
    push_word(&mut frame, address);
    frame.push(count);
    let header_len = frame.len();
    Ok(Request::seal(
        frame,
        header_len + count as usize + CRC_LEN,
        header_len,
        header_len,
    ))
}
