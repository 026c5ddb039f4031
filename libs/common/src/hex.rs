//! Hex encoding utility
//! Formatting helpers for frame tracing and the line monitor

use std::fmt::Write;

/// Bytes per row in `dump_table`
pub const TABLE_WIDTH: usize = 16;

/// Encode bytes to uppercase hex string
/// Example: [0x12, 0x34, 0xAB] -> "1234AB"
pub fn encode_upper(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2);
    for byte in data {
        // Writing to String buffer is infallible - no need for expect
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Space separated lowercase hex with zero runs collapsed
///
/// Example: [0x01, 0x00, 0x00, 0x00, 0xFF] -> "01 3x00 ff"
pub fn dump_compact(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 3);
    let mut zeros = 0usize;

    let push = |result: &mut String, token: &str| {
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(token);
    };

    for &byte in data {
        if byte == 0 {
            zeros += 1;
            continue;
        }
        if zeros > 0 {
            push(&mut result, &zero_run(zeros));
            zeros = 0;
        }
        push(&mut result, &format!("{:02x}", byte));
    }
    if zeros > 0 {
        push(&mut result, &zero_run(zeros));
    }
    result
}

fn zero_run(count: usize) -> String {
    if count > 1 {
        format!("{}x00", count)
    } else {
        "00".to_string()
    }
}

/// Hex + ASCII table, `TABLE_WIDTH` bytes per row
///
/// Non-printable bytes are shown as `?` in the ASCII column.
pub fn dump_table(data: &[u8]) -> String {
    let mut result = String::new();

    for row in data.chunks(TABLE_WIDTH) {
        let hex = row
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii: String = row
            .iter()
            .map(|&b| if (32..128).contains(&b) { b as char } else { '?' })
            .collect();
        let _ = writeln!(
            &mut result,
            "{:<width$}     | {}",
            hex,
            ascii,
            width = TABLE_WIDTH * 3 - 1
        );
    }
    result
}
