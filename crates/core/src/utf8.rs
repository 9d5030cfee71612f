//! UTF-8 encoding and decoding
//!
//! The runtime stores strings as raw byte sequences and works in code
//! points at the edges. These helpers implement just enough of UTF-8 for
//! that: width queries, encoding a single code point, and decoding the
//! code point at the start of a byte slice.
//!
//! Decoding is deliberately permissive in the same places the runtime has
//! always been: it checks continuation-byte framing but does not reject
//! overlong encodings or surrogate values.

/// How many bytes `value` encodes to: 1..=4, or 0 when the value is beyond
/// the Unicode range.
///
/// Asking about a negative value is a caller bug.
pub fn utf8_num_bytes(value: i32) -> usize {
    assert!(value >= 0, "cannot encode a negative code point");

    if value <= 0x7f {
        1
    } else if value <= 0x7ff {
        2
    } else if value <= 0xffff {
        3
    } else if value <= 0x10ffff {
        4
    } else {
        0
    }
}

/// Encode `value` into the front of `bytes`, returning the number of bytes
/// written.
///
/// `value` must be a valid code point and `bytes` must have room for it.
pub fn utf8_encode(value: i32, bytes: &mut [u8]) -> usize {
    let num_bytes = utf8_num_bytes(value);
    assert!(num_bytes != 0, "cannot encode a value past the Unicode range");
    assert!(bytes.len() >= num_bytes, "encode buffer too small");

    match num_bytes {
        1 => {
            // Fits in ASCII.
            bytes[0] = (value & 0x7f) as u8;
        }
        2 => {
            // 110xxxxx 10xxxxxx
            bytes[0] = (0xc0 | ((value & 0x7c0) >> 6)) as u8;
            bytes[1] = (0x80 | (value & 0x3f)) as u8;
        }
        3 => {
            // 1110xxxx 10xxxxxx 10xxxxxx
            bytes[0] = (0xe0 | ((value & 0xf000) >> 12)) as u8;
            bytes[1] = (0x80 | ((value & 0xfc0) >> 6)) as u8;
            bytes[2] = (0x80 | (value & 0x3f)) as u8;
        }
        _ => {
            // 11110xxx 10xxxxxx 10xxxxxx 10xxxxxx
            bytes[0] = (0xf0 | ((value & 0x1c0000) >> 18)) as u8;
            bytes[1] = (0x80 | ((value & 0x3f000) >> 12)) as u8;
            bytes[2] = (0x80 | ((value & 0xfc0) >> 6)) as u8;
            bytes[3] = (0x80 | (value & 0x3f)) as u8;
        }
    }

    num_bytes
}

/// Decode the code point starting at `bytes[0]`.
///
/// Returns `None` when the slice is empty, the sequence is truncated, the
/// lead byte is not a valid sequence start, or a continuation byte does not
/// have `10` in its high bits.
pub fn utf8_decode(bytes: &[u8]) -> Option<u32> {
    let first = *bytes.first()?;

    // Fits in ASCII.
    if first <= 0x7f {
        return Some(first as u32);
    }

    let (mut value, remaining) = if first & 0xe0 == 0xc0 {
        // 110xxxxx 10xxxxxx
        ((first & 0x1f) as u32, 1)
    } else if first & 0xf0 == 0xe0 {
        // 1110xxxx 10xxxxxx 10xxxxxx
        ((first & 0x0f) as u32, 2)
    } else if first & 0xf8 == 0xf0 {
        // 11110xxx 10xxxxxx 10xxxxxx 10xxxxxx
        ((first & 0x07) as u32, 3)
    } else {
        // A bare continuation byte, or a lead byte for a five-or-more byte
        // sequence, neither of which is valid.
        return None;
    };

    if remaining > bytes.len() - 1 {
        return None;
    }

    for &byte in &bytes[1..=remaining] {
        if byte & 0xc0 != 0x80 {
            return None;
        }
        value = (value << 6) | (byte & 0x3f) as u32;
    }

    Some(value)
}
