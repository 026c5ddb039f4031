//! RTU Error Types
//!
//! Error kinds for the serial transport and the Modbus RTU master. Each
//! variant carries enough context to be logged on its own; the classification
//! helpers tell the master whether the transport survives the failure and
//! the dispatcher whether a retry makes sense.

use thiserror::Error;

/// Result type for voltage-rtu operations
pub type Result<T> = std::result::Result<T, RtuError>;

/// Serial transport and Modbus RTU errors
#[derive(Debug, Error)]
pub enum RtuError {
    /// Underlying OS call failed (open/poll/read/write/tcsetattr/...)
    #[error("System call {op} failed: {source}")]
    SystemCall {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Argument rejected before reaching the OS
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Applied state does not read back as requested
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Argument outside the protocol-mandated range
    #[error("Out of range: {what} = {value} not in [{min}, {max}]")]
    Bounds {
        what: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    /// Not all request bytes could be written
    #[error("Request error: wrote {written} of {expected} bytes")]
    Request { written: usize, expected: usize },

    /// No reply byte arrived within the deadline
    #[error("Timeout: no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Malformed or mismatched checksum
    #[error("CRC error: {0}")]
    Crc(String),

    /// Echo or address/function code mismatch
    #[error("Reply error: {0}")]
    Reply(String),

    /// Monotonic clock did not advance past the last recorded operation
    #[error("Timing error: {0}")]
    Timing(String),

    /// Slave answered with an exception frame
    #[error("Slave exception: function 0x{function:02X}, code 0x{code:02X} ({})", exception_description(*.code))]
    Exception { function: u8, code: u8 },

    /// JSON request is missing a tag or a tag is malformed
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl RtuError {
    pub fn system_call(op: &'static str, source: std::io::Error) -> Self {
        RtuError::SystemCall { op, source }
    }

    /// Capture `errno` of the call that just failed
    pub fn last_os_error(op: &'static str) -> Self {
        RtuError::SystemCall {
            op,
            source: std::io::Error::last_os_error(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        RtuError::InvalidArgument(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        RtuError::Consistency(msg.into())
    }

    pub fn bounds(what: &'static str, value: usize, min: usize, max: usize) -> Self {
        RtuError::Bounds {
            what,
            value,
            min,
            max,
        }
    }

    pub fn crc(msg: impl Into<String>) -> Self {
        RtuError::Crc(msg.into())
    }

    pub fn reply(msg: impl Into<String>) -> Self {
        RtuError::Reply(msg.into())
    }

    pub fn timing(msg: impl Into<String>) -> Self {
        RtuError::Timing(msg.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        RtuError::Dispatch(msg.into())
    }

    /// Check if this error means the transport must be dropped and reopened
    pub fn invalidates_transport(&self) -> bool {
        matches!(
            self,
            RtuError::SystemCall { .. } | RtuError::Consistency(_)
        )
    }

    /// Check if this error is protocol-level noise worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RtuError::Timeout { .. } | RtuError::Crc(_) | RtuError::Reply(_)
        )
    }
}

/// Get exception description
pub fn exception_description(exception_code: u8) -> &'static str {
    match exception_code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_invalidation() {
        let sys = RtuError::system_call("poll", std::io::Error::from_raw_os_error(libc::EIO));
        assert!(sys.invalidates_transport());
        assert!(RtuError::consistency("termios mismatch").invalidates_transport());

        assert!(!RtuError::Timeout { timeout_ms: 50 }.invalidates_transport());
        assert!(!RtuError::crc("mismatch").invalidates_transport());
        assert!(!RtuError::reply("echo").invalidates_transport());
        assert!(!RtuError::bounds("count", 0, 1, 2000).invalidates_transport());
        assert!(!RtuError::Request {
            written: 3,
            expected: 8
        }
        .invalidates_transport());
        assert!(!RtuError::timing("regressed").invalidates_transport());
    }

    #[test]
    fn test_retryable() {
        assert!(RtuError::Timeout { timeout_ms: 50 }.is_retryable());
        assert!(RtuError::crc("mismatch").is_retryable());
        assert!(RtuError::reply("echo").is_retryable());

        assert!(!RtuError::bounds("count", 0, 1, 2000).is_retryable());
        assert!(!RtuError::Exception {
            function: 3,
            code: 2
        }
        .is_retryable());
        assert!(!RtuError::last_os_error("read").is_retryable());
    }

    #[test]
    fn test_exception_display() {
        let err = RtuError::Exception {
            function: 0x03,
            code: 0x02,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x03"));
        assert!(msg.contains("Illegal Data Address"));
    }

    #[test]
    fn test_exception_description_unknown() {
        assert_eq!(exception_description(0x42), "Unknown Exception");
        assert_eq!(exception_description(0x06), "Slave Device Busy");
    }
}
