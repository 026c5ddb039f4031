//! Common test utilities: a simulated Modbus slave on the far end of a pty

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)]

use std::time::Duration;

use voltage_rtu::crc;
use voltage_rtu::{BaudRate, Parity, PseudoPair, SerialConfig, SerialTransport, Transport};

/// pty line discipline only keeps 8N1, so tests run without parity
pub fn pty_config() -> SerialConfig {
    SerialConfig::new(BaudRate::B115200, Parity::None)
}

pub fn pty_pair() -> PseudoPair {
    PseudoPair::open(pty_config()).unwrap()
}

/// How the simulated slave answers one request (`None` = stay silent)
pub type Responder = dyn Fn(&[u8]) -> Option<Vec<u8>> + Sync;

/// Read exactly one request frame, sized from its function code
pub fn read_request(device: &mut SerialTransport, timeout: Duration) -> Option<Vec<u8>> {
    let mut frame = vec![0u8; 7];
    let n = device.read(&mut frame, timeout).unwrap().len();
    if n < frame.len() {
        return None;
    }

    let more = match frame[1] {
        1 | 3 | 5 | 6 => 1,
        16 => frame[6] as usize + 2,
        65 => 0,
        66 => frame[4] as usize,
        _ => 0,
    };
    if more > 0 {
        let mut rest = vec![0u8; more];
        let m = device.read(&mut rest, timeout).unwrap().len();
        frame.extend_from_slice(&rest[..m]);
    }
    Some(frame)
}

/// Serve `requests` requests, sealing each answer with a CRC
pub fn serve(device: &mut SerialTransport, requests: usize, respond: &Responder) -> Vec<Vec<u8>> {
    let mut seen = Vec::new();
    for _ in 0..requests {
        let Some(request) = read_request(device, Duration::from_secs(2)) else {
            break;
        };
        crc::validate(&request).unwrap();
        if let Some(mut reply) = respond(&request) {
            crc::append(&mut reply);
            let written = device.write(&reply, Duration::from_millis(100)).unwrap().len();
            assert_eq!(written, reply.len());
        }
        seen.push(request);
    }
    seen
}

/// Echo the request without its CRC
pub fn echo(request: &[u8]) -> Option<Vec<u8>> {
    Some(request[..request.len() - 2].to_vec())
}

/// Answer the first `n` bytes of the request (write acknowledgements)
pub fn echo_prefix(n: usize) -> impl Fn(&[u8]) -> Option<Vec<u8>> + Sync {
    move |request: &[u8]| Some(request[..n].to_vec())
}
