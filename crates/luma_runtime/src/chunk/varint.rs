//! Variable-length unsigned integers: 7 bits per byte, most significant
//! group first, the last byte flagged with its high bit.

/// Longest encoding of a `u64`.
pub const MAX_LEN: usize = u64::BITS as usize / 7 + 1;

/// Append the encoding of `x` to `out`.
pub fn encode(x: u64, out: &mut Vec<u8>) {
    let mut buf = [0u8; MAX_LEN];
    let mut n = 0;
    let mut x = x;
    loop {
        n += 1;
        buf[MAX_LEN - n] = (x & 0x7f) as u8;
        x >>= 7;
        if x == 0 {
            break;
        }
    }
    buf[MAX_LEN - 1] |= 0x80;
    out.extend_from_slice(&buf[MAX_LEN - n..]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    /// Value does not fit below the requested limit.
    Overflow,
}

/// Decode one integer from the front of `input`, rejecting values that
/// would exceed `limit`. Returns the value and the bytes consumed.
pub fn decode(input: &[u8], limit: u64) -> Result<(u64, usize), DecodeError> {
    let guard = limit >> 7;
    let mut x: u64 = 0;
    for (i, &b) in input.iter().enumerate() {
        if x > guard {
            return Err(DecodeError::Overflow);
        }
        x = (x << 7) | u64::from(b & 0x7f);
        if b & 0x80 != 0 {
            if x > limit {
                return Err(DecodeError::Overflow);
            }
            return Ok((x, i + 1));
        }
    }
    Err(DecodeError::Truncated)
}
