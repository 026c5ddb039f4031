//! `monitor`: passive line dump

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use common::hex::dump_table;
use tracing::{debug, error};
use voltage_rtu::{SerialConfig, SerialTransport, Transport};

const READ_CHUNK: usize = 256;
const READ_TIMEOUT: Duration = Duration::from_millis(1000);
const REOPEN_PAUSE: Duration = Duration::from_millis(500);

/// Read the line forever, reopening the device after errors
pub fn run(device: &str, serial: SerialConfig, text: bool) -> Result<()> {
    loop {
        match SerialTransport::open(device, serial) {
            Ok(mut port) => {
                debug!("monitoring {} ({})", device, serial);
                if let Err(e) = watch(&mut port, text) {
                    error!("{}", e);
                }
            },
            Err(e) => error!("{}", e),
        }
        thread::sleep(REOPEN_PAUSE);
    }
}

fn watch(port: &mut SerialTransport, text: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let data = port.read(&mut buf, READ_TIMEOUT)?;
        if data.is_empty() {
            continue;
        }
        if text {
            stdout.write_all(data)?;
        } else {
            writeln!(stdout, "{}", dump_table(data))?;
        }
        stdout.flush()?;
    }
}
