//! JSON request dispatch
//!
//! Translates one JSON request object into a master call, retries
//! protocol-level failures and builds the JSON result.
//!
//! ```json
//! {"slave": 17, "fcode": 3, "addr": 0, "count": 2, "timeout_ms": 200, "retry": 3}
//! ```
//!
//! yields
//!
//! ```json
//! {"slave": 17, "addr": 0, "count": 2, "value": [4660, 43981]}
//! ```

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::constants::{
    DEFAULT_TIMEOUT, FC_READ_BYTES, FC_READ_COILS, FC_READ_HOLDING_REGISTERS, FC_WRITE_BYTES,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER,
    READ_COILS_LIMIT,
};
use crate::error::{Result, RtuError};
use crate::frame::Addr;
use crate::master::Master;
use crate::transport::Connector;

pub const ADDR: &str = "addr";
pub const COUNT: &str = "count";
pub const FCODE: &str = "fcode";
pub const RETRY: &str = "retry";
pub const SLAVE: &str = "slave";
pub const TIMEOUT_MS: &str = "timeout_ms";
pub const VALUE: &str = "value";

/// Attempts per request when `retry` is absent
pub const DEFAULT_RETRY: u32 = 1;

/// Fields shared by every request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub slave: Addr,
    pub fcode: u8,
    pub timeout: Duration,
    pub retry: u32,
}

fn tag<'a>(input: &'a Value, name: &str) -> Result<&'a Value> {
    input
        .get(name)
        .ok_or_else(|| RtuError::dispatch(format!("missing tag {:?}", name)))
}

fn format_error(name: &str, value: &Value) -> RtuError {
    RtuError::dispatch(format!("tag {:?} has invalid value {}", name, value))
}

/// Integer tag that fits `T`
fn int_tag<T: TryFrom<i64>>(input: &Value, name: &str) -> Result<T> {
    let value = tag(input, name)?;
    value
        .as_i64()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| format_error(name, value))
}

/// Optional strictly positive integer tag
fn positive_tag(input: &Value, name: &str) -> Result<Option<u32>> {
    if input.get(name).is_none() {
        return Ok(None);
    }
    let value: u32 = int_tag(input, name)?;
    if value == 0 {
        return Err(format_error(name, &Value::from(value)));
    }
    Ok(Some(value))
}

/// Array tag whose elements all fit `T`
fn array_tag<T: TryFrom<i64>>(input: &Value, name: &str) -> Result<Vec<T>> {
    let value = tag(input, name)?;
    let items = value.as_array().ok_or_else(|| format_error(name, value))?;
    items
        .iter()
        .map(|item| {
            item.as_i64()
                .and_then(|n| T::try_from(n).ok())
                .ok_or_else(|| format_error(name, item))
        })
        .collect()
}

/// `count` tag that must equal the number of values
fn count_matching(input: &Value, len: usize) -> Result<u8> {
    let count: u8 = int_tag(input, COUNT)?;
    if count as usize != len {
        return Err(RtuError::dispatch(format!(
            "tag \"count\" is {} but \"value\" has {} elements",
            count, len
        )));
    }
    Ok(count)
}

/// Parse the fields shared by every request
pub fn envelope(input: &Value) -> Result<Envelope> {
    if !input.is_object() {
        return Err(RtuError::dispatch(format!("request is not an object: {}", input)));
    }

    let slave: u8 = int_tag(input, SLAVE)?;
    let slave = Addr::new(slave).map_err(|_| format_error(SLAVE, &Value::from(slave)))?;

    let timeout = positive_tag(input, TIMEOUT_MS)?
        .map(|ms| Duration::from_millis(u64::from(ms)))
        .unwrap_or(DEFAULT_TIMEOUT);
    let retry = positive_tag(input, RETRY)?.unwrap_or(DEFAULT_RETRY);
    let fcode: u8 = int_tag(input, FCODE)?;

    Ok(Envelope {
        slave,
        fcode,
        timeout,
        retry,
    })
}

/// Run `op` up to `retry` times
///
/// Timeout, CRC and reply errors are retried after sleeping for the request
/// timeout; anything else, or the last failure, is returned unchanged.
fn with_retry<C, K, T>(
    master: &mut Master<C, K>,
    envelope: &Envelope,
    input: &Value,
    mut op: impl FnMut(&mut Master<C, K>) -> Result<T>,
) -> Result<T>
where
    C: Connector,
    K: Clock,
{
    let mut remaining = envelope.retry;
    loop {
        match op(master) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                remaining = remaining.saturating_sub(1);
                warn!(
                    "failed: {}, retries left {}, slave {}, data {}",
                    e, remaining, envelope.slave, input
                );
                if remaining == 0 {
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
        master.clock().sleep(envelope.timeout);
    }
}

/// Execute one JSON request; returns its JSON result
pub fn dispatch<C: Connector, K: Clock>(master: &mut Master<C, K>, input: &Value) -> Result<Value> {
    let env = envelope(input)?;
    let slave = env.slave;
    let timeout = env.timeout;
    let addr: u16 = int_tag(input, ADDR)?;

    debug!("dispatch fcode {} slave {} addr {}", env.fcode, slave, addr);

    match env.fcode {
        FC_READ_COILS => {
            let count: u16 = int_tag(input, COUNT)?;
            if count as usize >= READ_COILS_LIMIT {
                return Err(format_error(COUNT, &Value::from(count)));
            }
            let value = with_retry(master, &env, input, |m| {
                m.rd_coils(slave, addr, count, timeout)
            })?;
            Ok(json!({SLAVE: slave.value(), ADDR: addr, COUNT: count, VALUE: value}))
        },
        FC_READ_HOLDING_REGISTERS => {
            let count: u8 = int_tag(input, COUNT)?;
            let value = with_retry(master, &env, input, |m| {
                m.rd_registers(slave, addr, u16::from(count), timeout)
            })?;
            Ok(json!({SLAVE: slave.value(), ADDR: addr, COUNT: count, VALUE: value}))
        },
        FC_WRITE_SINGLE_COIL => {
            let raw = tag(input, VALUE)?;
            let on = raw.as_bool().ok_or_else(|| format_error(VALUE, raw))?;
            with_retry(master, &env, input, |m| m.wr_coil(slave, addr, on, timeout))?;
            Ok(json!({SLAVE: slave.value(), ADDR: addr}))
        },
        FC_WRITE_SINGLE_REGISTER => {
            let value: u16 = int_tag(input, VALUE)?;
            with_retry(master, &env, input, |m| {
                m.wr_register(slave, addr, value, timeout)
            })?;
            Ok(json!({SLAVE: slave.value(), ADDR: addr}))
        },
        FC_WRITE_MULTIPLE_REGISTERS => {
            let values: Vec<u16> = array_tag(input, VALUE)?;
            let count = count_matching(input, values.len())?;
            with_retry(master, &env, input, |m| {
                m.wr_registers(slave, addr, &values, timeout)
            })?;
            Ok(json!({SLAVE: slave.value(), ADDR: addr, COUNT: count}))
        },
        FC_WRITE_BYTES => {
            let data: Vec<u8> = array_tag(input, VALUE)?;
            let count = count_matching(input, data.len())?;
            with_retry(master, &env, input, |m| {
                m.wr_bytes(slave, addr, &data, timeout)
            })?;
            Ok(json!({SLAVE: slave.value(), ADDR: addr, COUNT: count}))
        },
        FC_READ_BYTES => {
            let count: u8 = int_tag(input, COUNT)?;
            let value = with_retry(master, &env, input, |m| {
                m.rd_bytes(slave, addr, count, timeout)
            })?;
            Ok(json!({SLAVE: slave.value(), ADDR: addr, COUNT: count, VALUE: value}))
        },
        other => Err(RtuError::dispatch(format!("unsupported fcode {}", other))),
    }
}

/// Execute a JSON array of requests in order, `gap` apart
///
/// Stops at the first failing request.
pub fn dispatch_all<C: Connector, K: Clock>(
    master: &mut Master<C, K>,
    requests: &Value,
    gap: Duration,
) -> Result<Value> {
    let requests = requests
        .as_array()
        .ok_or_else(|| RtuError::dispatch("input is not a JSON array"))?;

    let mut output = Vec::with_capacity(requests.len());
    for request in requests {
        output.push(dispatch(master, request)?);
        master.clock().sleep(gap);
    }
    Ok(Value::Array(output))
}

/// Replace `slave` in every request object of `document`
///
/// Accepts a single object or an array of objects; other values are left
/// untouched. Returns how many requests were rewritten.
pub fn set_slave(document: &mut Value, slave: Addr) -> usize {
    fn rewrite(object: &mut Map<String, Value>, slave: Addr) -> usize {
        object.insert(SLAVE.to_string(), Value::from(slave.value()));
        1
    }

    match document {
        Value::Object(object) => rewrite(object, slave),
        Value::Array(items) => items
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .map(|object| rewrite(object, slave))
            .sum(),
        _ => 0,
    }
}
