//! SerialTransport over a pseudo terminal

#![allow(clippy::disallowed_methods)]

mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::pty_pair;
use voltage_rtu::{PseudoPair, RtuError, Transport};

const MESSAGE: &[u8] = b"hello on other side!\0";

#[test]
fn test_open_and_close() {
    let pair = pty_pair();
    assert_eq!(pair.master.counters().rx_total, 0);
    drop(pair);

    // the pty can be allocated again after restore + close
    let _again = pty_pair();
}

#[test]
fn test_write_then_read() {
    let mut pair = pty_pair();
    let timeout = Duration::from_millis(100);

    let written = pair.master.write(MESSAGE, timeout).unwrap();
    assert_eq!(written, MESSAGE);

    let mut buf = [0u8; 255];
    let read = pair.slave.read(&mut buf, timeout).unwrap();
    assert_eq!(read, MESSAGE);

    assert_eq!(pair.master.counters().tx, MESSAGE.len() as u64);
    assert_eq!(pair.slave.counters().rx, MESSAGE.len() as u64);
}

#[test]
fn test_read_stops_when_buffer_full() {
    let mut pair = pty_pair();
    pair.master.write(MESSAGE, Duration::ZERO).unwrap();

    let mut buf = [0u8; 5];
    let started = Instant::now();
    let read = pair.slave.read(&mut buf, Duration::from_secs(1)).unwrap();
    assert_eq!(read, b"hello");
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_async_read_and_write() {
    let PseudoPair {
        mut master,
        mut slave,
    } = pty_pair();
    let timeout = Duration::from_millis(100);

    thread::scope(|s| {
        let receiver = s.spawn(|| {
            let mut buf = [0u8; 255];
            slave.read(&mut buf, timeout).unwrap().to_vec()
        });

        let written = master.write(MESSAGE, timeout).unwrap();
        assert_eq!(written.len(), MESSAGE.len());

        assert_eq!(receiver.join().unwrap(), MESSAGE);
    });
}

#[test]
fn test_async_echo() {
    const STOP: &[u8] = b"STOP";
    let PseudoPair {
        mut master,
        mut slave,
    } = pty_pair();
    let timeout = Duration::from_millis(50);

    thread::scope(|s| {
        s.spawn(|| {
            let mut seen = Vec::new();
            while !seen.ends_with(STOP) {
                let mut buf = [0u8; 64];
                let data = slave.read(&mut buf, Duration::from_millis(10)).unwrap();
                if data.is_empty() {
                    continue;
                }
                seen.extend_from_slice(data);
                slave.write(data, timeout).unwrap();
            }
        });

        for round in 0..16u8 {
            let message: Vec<u8> = (0..32).map(|i| round.wrapping_mul(31).wrapping_add(i)).collect();
            master.write(&message, timeout).unwrap();

            let mut buf = vec![0u8; message.len()];
            let echoed = master.read(&mut buf, Duration::from_millis(500)).unwrap();
            assert_eq!(echoed, message.as_slice());
        }

        master.write(STOP, timeout).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(master.read(&mut buf, Duration::from_millis(500)).unwrap(), STOP);
    });
}

#[test]
fn test_read_timeout() {
    let mut pair = pty_pair();
    let deadline = Duration::from_millis(20);

    let mut buf = [0u8; 16];
    let started = Instant::now();
    let read = pair.slave.read(&mut buf, deadline).unwrap();
    let elapsed = started.elapsed();

    assert!(read.is_empty());
    assert!(elapsed >= deadline, "returned after {:?}", elapsed);
    assert!(elapsed < deadline + Duration::from_millis(200));
}

#[test]
fn test_read_after_hangup_waits_out_deadline() {
    let PseudoPair { master, mut slave } = pty_pair();
    drop(master);
    let deadline = Duration::from_millis(50);

    let mut buf = [0u8; 8];
    let started = Instant::now();
    let result = slave.read(&mut buf, deadline).map(<[u8]>::len);
    let elapsed = started.elapsed();

    // a hung-up line either times out quietly or reports the failed poll
    match result {
        Ok(n) => {
            assert_eq!(n, 0);
            assert!(elapsed >= Duration::from_millis(40), "returned after {:?}", elapsed);
        },
        Err(e) => assert!(matches!(e, RtuError::SystemCall { .. }), "{:?}", e),
    }
    assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
}

#[test]
fn test_rx_flush_discards_pending_input() {
    let mut pair = pty_pair();
    pair.master.write(b"stale", Duration::ZERO).unwrap();
    thread::sleep(Duration::from_millis(20));

    pair.slave.rx_flush().unwrap();

    let mut buf = [0u8; 8];
    let read = pair.slave.read(&mut buf, Duration::from_millis(20)).unwrap();
    assert!(read.is_empty());
}

#[test]
fn test_drain_and_flush() {
    let mut pair = pty_pair();
    pair.master.write(b"abc", Duration::ZERO).unwrap();
    pair.master.drain().unwrap();
    pair.master.tx_flush().unwrap();
    pair.master.flush().unwrap();
}

#[test]
fn test_counters_clear_keeps_totals() {
    let mut pair = pty_pair();
    pair.master.write(b"0123456789", Duration::ZERO).unwrap();
    pair.master.counters_mut().clear();
    pair.master.write(b"abc", Duration::ZERO).unwrap();

    let counters = pair.master.counters();
    assert_eq!(counters.tx, 3);
    assert_eq!(counters.tx_total, 13);
}
