//! Master transactions against a simulated slave on the far end of a pty

#![allow(clippy::disallowed_methods)]

mod common;

use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use voltage_rtu::dispatch::dispatch_all;
use voltage_rtu::{
    Addr, Master, PseudoPair, ReadyConnector, RtuError, SerialTransport, Transport,
};

const TIMEOUT: Duration = Duration::from_millis(200);

fn slave(v: u8) -> Addr {
    Addr::new(v).unwrap()
}

fn setup() -> (SerialTransport, Master<ReadyConnector<SerialTransport>>) {
    let PseudoPair { master, slave } = common::pty_pair();
    (master, Master::new(ReadyConnector::new(slave)))
}

#[test]
fn test_write_register_echo() {
    let (mut device, mut rtu) = setup();

    let seen = thread::scope(|s| {
        let server = s.spawn(|| common::serve(&mut device, 1, &common::echo));
        rtu.wr_register(slave(17), 1, 0x00FF, TIMEOUT).unwrap();
        server.join().unwrap()
    });

    assert_eq!(seen.len(), 1);
    assert_eq!(&seen[0][..6], &[17, 0x06, 0x00, 0x01, 0x00, 0xFF]);

    let counters = *rtu.device().unwrap().counters();
    assert_eq!(counters.tx, 8);
    assert_eq!(counters.rx, 8);
}

#[test]
fn test_write_coil_echo() {
    let (mut device, mut rtu) = setup();

    let seen = thread::scope(|s| {
        let server = s.spawn(|| common::serve(&mut device, 2, &common::echo));
        rtu.wr_coil(slave(3), 0x0AC, true, TIMEOUT).unwrap();
        rtu.wr_coil(slave(3), 0x0AC, false, TIMEOUT).unwrap();
        server.join().unwrap()
    });

    assert_eq!(&seen[0][..6], &[3, 0x05, 0x00, 0xAC, 0xFF, 0x00]);
    assert_eq!(&seen[1][..6], &[3, 0x05, 0x00, 0xAC, 0x00, 0x00]);
}

#[test]
fn test_read_coils_lsb_first() {
    let (mut device, mut rtu) = setup();
    let respond = |request: &[u8]| Some(vec![request[0], 0x01, 2, 0b1011_0010, 0b0000_0011]);

    let coils = thread::scope(|s| {
        s.spawn(|| common::serve(&mut device, 1, &respond));
        rtu.rd_coils(slave(17), 0, 10, TIMEOUT).unwrap()
    });

    assert_eq!(
        coils,
        vec![false, true, false, false, true, true, false, true, true, true]
    );
}

#[test]
fn test_register_round_trip() {
    let (mut device, mut rtu) = setup();
    let respond = |request: &[u8]| match request[1] {
        0x10 => Some(request[..6].to_vec()),
        0x03 => Some(vec![request[0], 0x03, 4, 0x12, 0x34, 0xAB, 0xCD]),
        _ => None,
    };

    let (seen, values) = thread::scope(|s| {
        let server = s.spawn(|| common::serve(&mut device, 2, &respond));
        rtu.wr_registers(slave(9), 0x10, &[0x1234, 0xABCD], TIMEOUT)
            .unwrap();
        let values = rtu.rd_registers(slave(9), 0x10, 2, TIMEOUT).unwrap();
        (server.join().unwrap(), values)
    });

    assert_eq!(
        &seen[0][..11],
        &[9, 0x10, 0x00, 0x10, 0x00, 0x02, 4, 0x12, 0x34, 0xAB, 0xCD]
    );
    assert_eq!(values, vec![0x1234, 0xABCD]);
}

#[test]
fn test_byte_functions() {
    let (mut device, mut rtu) = setup();
    let respond = |request: &[u8]| match request[1] {
        66 => Some(request[..5].to_vec()),
        65 => {
            let mut reply = request[..5].to_vec();
            reply.extend_from_slice(b"RTU");
            Some(reply)
        },
        _ => None,
    };

    let (seen, data) = thread::scope(|s| {
        let server = s.spawn(|| common::serve(&mut device, 2, &respond));
        rtu.wr_bytes(slave(5), 0x0200, b"abcdef", TIMEOUT).unwrap();
        let data = rtu.rd_bytes(slave(5), 0x0300, 3, TIMEOUT).unwrap();
        (server.join().unwrap(), data)
    });

    assert_eq!(&seen[0][..5], &[5, 66, 0x02, 0x00, 6]);
    assert_eq!(&seen[0][5..11], b"abcdef");
    assert_eq!(&seen[1][..5], &[5, 65, 0x03, 0x00, 3]);
    assert_eq!(data, b"RTU");
}

#[test]
fn test_echo_mismatch_is_reply_error() {
    let (mut device, mut rtu) = setup();
    let respond = |request: &[u8]| {
        let mut reply = request[..6].to_vec();
        reply[5] ^= 0x01;
        Some(reply)
    };

    let result = thread::scope(|s| {
        s.spawn(|| common::serve(&mut device, 1, &respond));
        rtu.wr_register(slave(17), 1, 0x00FF, TIMEOUT)
    });

    assert!(matches!(result, Err(RtuError::Reply(_))), "{:?}", result);
    assert!(rtu.is_connected());
}

#[test]
fn test_exception_reply() {
    let (mut device, mut rtu) = setup();
    let respond = |request: &[u8]| Some(vec![request[0], request[1] | 0x80, 0x02]);

    let result = thread::scope(|s| {
        s.spawn(|| common::serve(&mut device, 1, &respond));
        rtu.rd_registers(slave(4), 0x7000, 3, TIMEOUT)
    });

    match result {
        Err(RtuError::Exception { function, code }) => {
            assert_eq!(function, 0x03);
            assert_eq!(code, 0x02);
        },
        other => panic!("expected exception, got {:?}", other),
    }
}

#[test]
fn test_silent_slave_times_out() {
    let (_device, mut rtu) = setup();
    let deadline = Duration::from_millis(50);

    let started = Instant::now();
    let result = rtu.wr_register(slave(17), 1, 0x00FF, deadline);
    let elapsed = started.elapsed();

    assert!(
        matches!(result, Err(RtuError::Timeout { timeout_ms: 50 })),
        "{:?}",
        result
    );
    assert!(elapsed >= deadline, "gave up after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(150), "took {:?}", elapsed);
    assert!(rtu.is_connected());
}

#[test]
fn test_bounds_checked_before_any_io() {
    let (_device, mut rtu) = setup();

    let result = rtu.rd_registers(slave(1), 0, 0x7E, TIMEOUT);
    assert!(matches!(result, Err(RtuError::Bounds { .. })));

    let result = rtu.rd_bytes(slave(1), 0, 0, TIMEOUT);
    assert!(matches!(result, Err(RtuError::Bounds { .. })));

    assert_eq!(rtu.device().unwrap().counters().tx_total, 0);
}

#[test]
fn test_dispatch_all_over_pty() {
    let (mut device, mut rtu) = setup();
    let respond = |request: &[u8]| match request[1] {
        0x06 => Some(request[..6].to_vec()),
        0x03 => Some(vec![request[0], 0x03, 2, 0x00, 0x2A]),
        _ => None,
    };
    let requests = json!([
        {"slave": 2, "fcode": 6, "addr": 7, "value": 42},
        {"slave": 2, "fcode": 3, "addr": 7, "count": 1, "timeout_ms": 200},
    ]);

    let output = thread::scope(|s| {
        s.spawn(|| common::serve(&mut device, 2, &respond));
        dispatch_all(&mut rtu, &requests, Duration::from_millis(2)).unwrap()
    });

    assert_eq!(
        output,
        json!([
            {"slave": 2, "addr": 7},
            {"slave": 2, "addr": 7, "count": 1, "value": [42]},
        ])
    );
}

#[test]
fn test_missing_device_is_system_error() {
    let mut rtu = Master::open("/dev/does-not-exist-rtu", common::pty_config());

    let result = rtu.wr_register(slave(1), 0, 1, TIMEOUT);
    assert!(
        matches!(result, Err(RtuError::SystemCall { op: "open", .. })),
        "{:?}",
        result
    );
    assert!(!rtu.is_connected());
}
