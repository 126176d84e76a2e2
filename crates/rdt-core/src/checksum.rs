//! Length-only checksum carried in the 10-byte control field.
//!
//! The checksum is the byte length of the payload rendered as a 10-bit
//! binary string with every bit flipped. Verification adds the received
//! value to the payload length and expects all ten bits set.
//!
//! This is NOT an integrity check on content: two payloads of equal length
//! always verify against each other. It exists for wire compatibility with
//! existing peers. A deployment that needs real integrity should swap in a
//! content hash behind `compute`/`verify`.

use crate::error::PacketError;

/// Width of the checksum in bits, and in ASCII bytes on the wire.
pub const CHECKSUM_LEN: usize = 10;

/// Largest payload length the checksum can describe.
pub const MAX_CHECKSUM_PAYLOAD: usize = (1 << CHECKSUM_LEN) - 1;

pub type Checksum = [u8; CHECKSUM_LEN];

pub fn compute(payload: &[u8]) -> Result<Checksum, PacketError> {
    let len = payload.len();
    if len > MAX_CHECKSUM_PAYLOAD {
        return Err(PacketError::PayloadTooLarge {
            len,
            max: MAX_CHECKSUM_PAYLOAD,
        });
    }

    let mut out = [b'0'; CHECKSUM_LEN];
    for (i, digit) in out.iter_mut().enumerate() {
        let bit = (len >> (CHECKSUM_LEN - 1 - i)) & 1;
        // one's complement
        *digit = if bit == 0 { b'1' } else { b'0' };
    }
    Ok(out)
}

/// Check `checksum` (ASCII binary digits) against the payload length.
///
/// The sum must be exactly ten 1-bits wide. Shorter all-ones sums such as
/// `0b111111111` (511) count as corruption here, although a bare "every
/// digit is 1" test would pass them; rejecting them keeps any two
/// different lengths from ever verifying against the same checksum.
pub fn verify(checksum: &[u8], payload: &[u8]) -> bool {
    if checksum.len() != CHECKSUM_LEN {
        return false;
    }
    let mut value = 0usize;
    for &digit in checksum {
        let bit = match digit {
            b'0' => 0,
            b'1' => 1,
            _ => return false,
        };
        value = (value << 1) | bit;
    }
    value + payload.len() == MAX_CHECKSUM_PAYLOAD
}

/// True if `bytes` looks like a checksum (ten ASCII binary digits).
pub fn is_checksum_shaped(bytes: &[u8]) -> bool {
    bytes.len() == CHECKSUM_LEN && bytes.iter().all(|b| matches!(b, b'0' | b'1'))
}
