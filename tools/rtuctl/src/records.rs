//! JSON record filters: `set-slave` and `tlog-dump`

use std::io::{self, Read, Write};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;
use voltage_rtu::dispatch::{self, ADDR, SLAVE, VALUE};
use voltage_rtu::Addr;

fn read_stdin() -> Result<Value> {
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read stdin")?;
    serde_json::from_str(&text).context("stdin is not valid JSON")
}

pub fn set_slave(slave: Addr) -> Result<()> {
    let mut document = read_stdin()?;
    let rewritten = dispatch::set_slave(&mut document, slave);
    info!("rewrote {} request(s) to slave {}", rewritten, slave);

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", document)?;
    Ok(())
}

pub fn tlog_dump() -> Result<()> {
    let bytes = tlog_bytes(&read_stdin()?)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&bytes)?;
    writeln!(stdout)?;
    Ok(())
}

/// Concatenated `value` bytes of every record carrying an address
///
/// Arrays are walked recursively. Records without `addr` or `value` are
/// skipped; malformed tags are errors.
pub fn tlog_bytes(input: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    collect(input, &mut out)?;
    Ok(out)
}

fn collect(input: &Value, out: &mut Vec<u8>) -> Result<()> {
    if let Value::Array(items) = input {
        for item in items {
            collect(item, out)?;
        }
        return Ok(());
    }

    let Some(addr) = input.get(ADDR) else {
        return Ok(());
    };
    if !addr.as_u64().is_some_and(|a| a <= u64::from(u16::MAX)) {
        bail!("tag {:?} has invalid value {}", ADDR, addr);
    }

    let Some(value) = input.get(VALUE) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        bail!("tag {:?} is not an array", VALUE);
    };
    if let Some(slave) = input.get(SLAVE) {
        if !slave.is_number() {
            bail!("tag {:?} has invalid value {}", SLAVE, slave);
        }
    }

    for item in items {
        match item.as_i64() {
            Some(byte) => out.push(byte as u8),
            None => bail!("value entry {} is not a number", item),
        }
    }
    Ok(())
}
