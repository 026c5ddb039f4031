//! `probe`: find slaves answering a holding register read

use std::thread;
use std::time::Duration;

use anyhow::Result;
use colored::*;
use tracing::{info, warn};
use voltage_rtu::{Addr, Master, RtuError, SerialConfig};

/// Pause after a silent or garbled slave
const QUIET_PAUSE: Duration = Duration::from_millis(25);

/// Pause after an unexpected error
const ERROR_PAUSE: Duration = Duration::from_millis(100);

/// What one slave address did
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Value(u16),
    /// Answered with a Modbus exception, so something is there
    Exception(u8),
    Silent,
    Garbled,
    Failed,
}

impl Outcome {
    pub fn responded(&self) -> bool {
        matches!(self, Outcome::Value(_) | Outcome::Exception(_))
    }

    fn classify(result: Result<Vec<u16>, RtuError>) -> Self {
        match result {
            Ok(values) => Outcome::Value(values.first().copied().unwrap_or_default()),
            Err(RtuError::Exception { code, .. }) => Outcome::Exception(code),
            Err(RtuError::Timeout { .. }) => Outcome::Silent,
            Err(e @ (RtuError::Reply(_) | RtuError::Crc(_))) => {
                info!("reply error {}", e);
                Outcome::Garbled
            },
            Err(e) => {
                warn!("unexpected error {}", e);
                Outcome::Failed
            },
        }
    }

    fn pause(&self) -> Duration {
        match self {
            Outcome::Silent | Outcome::Garbled => QUIET_PAUSE,
            Outcome::Failed => ERROR_PAUSE,
            _ => Duration::ZERO,
        }
    }
}

pub fn run(device: &str, serial: SerialConfig, slave: Option<Addr>, timeout_ms: u64) -> Result<()> {
    let timeout = Duration::from_millis(timeout_ms);
    let slaves: Vec<Addr> = match slave {
        Some(slave) => vec![slave],
        None => Addr::all().collect(),
    };

    let mut master = Master::open(device, serial);
    let mut found = 0usize;

    for slave in slaves {
        info!("slave {}", slave);
        let outcome = Outcome::classify(master.rd_registers(slave, 0, 1, timeout));

        match &outcome {
            Outcome::Value(value) => {
                println!("{} slave {:>3}: register 0 = {:#06x}", "✓".green(), slave, value)
            },
            Outcome::Exception(code) => println!(
                "{} slave {:>3}: exception {:#04x} ({})",
                "!".yellow(),
                slave,
                code,
                voltage_rtu::error::exception_description(*code)
            ),
            _ => {},
        }
        if outcome.responded() {
            found += 1;
        }
        thread::sleep(outcome.pause());
    }

    println!("{} responding slave(s)", found.to_string().bold());
    Ok(())
}
