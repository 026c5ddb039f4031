//! Bit and word packing for Modbus payloads
//!
//! Coils are packed LSB-first: coil `n` is bit `n % 8` of byte `n / 8`.
//! Registers travel as big-endian byte pairs.

/// Number of bytes needed to carry `count` packed bits
#[inline]
pub fn packed_len(count: usize) -> usize {
    count.div_ceil(8)
}

/// Unpack the first `count` bits, LSB-first per byte
///
/// Bits past `count` in the last byte are padding and ignored. Missing bytes
/// read as zero.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| {
            bytes
                .get(i / 8)
                .map(|byte| (byte >> (i % 8)) & 0x01 != 0)
                .unwrap_or(false)
        })
        .collect()
}

/// Append a word big-endian
#[inline]
pub fn push_word(frame: &mut Vec<u8>, word: u16) {
    frame.extend_from_slice(&word.to_be_bytes());
}

/// Registers to wire bytes
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for &word in words {
        push_word(&mut bytes, word);
    }
    bytes
}

/// Wire bytes to registers; an odd trailing byte is the high byte of a
/// zero-padded word
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}
