//! `bandwidth`: loop a request file and report line throughput

use std::convert::Infallible;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{error, warn};
use voltage_rtu::constants::BITS_PER_CHAR;
use voltage_rtu::dispatch::dispatch;
use voltage_rtu::{ByteCounters, Master, SerialConfig, SerialConnector, Transport};

use crate::exec::load_requests;

/// Wait before reopening after a failure
const REOPEN_PAUSE: Duration = Duration::from_millis(500);

const MBIT: f64 = 1024.0 * 1024.0;

/// One throughput line: windowed rates in bit/s, totals in Mbit
pub fn report(counters: &ByteCounters, window_secs: u64) -> String {
    let secs = window_secs.max(1) as f64;
    let bits = |bytes: u64| (bytes * BITS_PER_CHAR) as f64;
    format!(
        "rx {:.0}bps tx {:.0}bps rx_total {:.4}Mbit tx_total {:.4}Mbit",
        bits(counters.rx) / secs,
        bits(counters.tx) / secs,
        bits(counters.rx_total) / MBIT,
        bits(counters.tx_total) / MBIT,
    )
}

/// Tracks failures in a row; the second one in a row is fatal
#[derive(Debug, Default)]
struct FailureGate {
    failed: bool,
}

impl FailureGate {
    fn success(&mut self) {
        self.failed = false;
    }

    /// Returns false once two failures happened back to back
    fn failure(&mut self) -> bool {
        let again = self.failed;
        self.failed = true;
        !again
    }
}

pub fn run(device: &str, serial: SerialConfig, input: &str, window: u64) -> Result<()> {
    anyhow::ensure!(window > 0, "report window must be at least one second");
    let requests = load_requests(input)?;
    let requests = requests.as_array().map(Vec::as_slice).unwrap_or_default();
    anyhow::ensure!(!requests.is_empty(), "{} holds no requests", input);
    let window = Duration::from_secs(window);
    let gap = serial.baud_rate.silent_interval();

    let mut gate = FailureGate::default();
    for round in 0u64.. {
        println!("loop {}", round);
        let mut master = Master::open(device, serial);

        match measure(&mut master, requests, window, gap, &mut gate) {
            Err(e) if e.is_retryable() || e.invalidates_transport() => {
                warn!("round {} failed: {}", round, e);
                if !gate.failure() {
                    return Err(anyhow!("giving up after consecutive failures: {}", e));
                }
                thread::sleep(REOPEN_PAUSE);
            },
            Err(e) => {
                error!("round {} failed: {}", round, e);
                return Err(e.into());
            },
            Ok(never) => match never {},
        }
    }
    Ok(())
}

/// Run the requests until one fails, printing a report every `window`
fn measure(
    master: &mut Master<SerialConnector>,
    requests: &[Value],
    window: Duration,
    gap: Duration,
    gate: &mut FailureGate,
) -> voltage_rtu::Result<Infallible> {
    let mut since = Instant::now();
    loop {
        for request in requests {
            dispatch(master, request)?;
            gate.success();
            thread::sleep(gap);
        }

        let elapsed = since.elapsed();
        if elapsed > window {
            let device = master.device()?;
            println!("{}", report(device.counters(), elapsed.as_secs()));
            device.counters_mut().clear();
            since = Instant::now();
        }
    }
}
