//! `exec`: run a request file once

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};
use voltage_rtu::dispatch::dispatch_all;
use voltage_rtu::{Master, SerialConfig};

/// Parse a JSON request array from `input` (`-` is stdin)
pub fn load_requests(input: &str) -> Result<Value> {
    let text = if input == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read requests from stdin")?;
        text
    } else {
        fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };

    let requests: Value =
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", input))?;
    anyhow::ensure!(requests.is_array(), "{} is not a JSON array of requests", input);
    Ok(requests)
}

pub fn run(device: &str, serial: SerialConfig, input: &str, output: Option<&Path>) -> Result<()> {
    let requests = load_requests(input)?;
    info!("exec {} requests on {} ({})", count(&requests), device, serial);

    let mut master = Master::open(device, serial);
    let results = dispatch_all(&mut master, &requests, serial.baud_rate.silent_interval())?;
    debug!("exec done");

    let text = serde_json::to_string(&results)?;
    match output {
        Some(path) => fs::write(path, text + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", text)?;
            stdout.flush()?;
        },
    }
    Ok(())
}

fn count(requests: &Value) -> usize {
    requests.as_array().map_or(0, Vec::len)
}
