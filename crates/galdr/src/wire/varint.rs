//! Variable-length natural number encoding.
//!
//! Non-negative integers are written in base-128 groups, least-significant
//! group first, with the high bit of each byte set iff another byte follows.
//! Zero encodes to a single zero byte; the length grows by one byte at every
//! 7-bit boundary, so the full `u64` range needs at most ten bytes.
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::{Error, Result};

/// Maximum number of bytes a `u64` can occupy on the wire.
pub const MAX_BYTES: usize = (u64::BITS as usize).div_ceil(7);

/// Encodes `value` into `write` as a base-128 continuation sequence.
pub fn encode(mut value: u64, mut write: impl Write) -> Result<()> {
    while value >= 0x80 {
        write.write_u8(0b1000_0000 | (value as u8))?;
        value >>= 7;
    }
    write.write_u8(value as u8)?;

    Ok(())
}

/// Decodes a base-128 continuation sequence from `read`.
///
/// Fails with [`Error::TruncatedInput`] when the source ends before a
/// terminating byte, and with [`Error::MalformedVarInt`] when the sequence
/// runs past the 64-bit range.
pub fn decode(mut read: impl Read) -> Result<u64> {
    let mut value: u64 = 0;
    for group in 0..MAX_BYTES {
        let byte = read.read_u8()?;
        let payload = byte & 0b0111_1111;

        // Nine groups cover 63 bits; the tenth may only contribute bit 63.
        // Anything above that would be shifted out of range.
        if group == MAX_BYTES - 1 && payload > 1 {
            return Err(Error::MalformedVarInt);
        }
        value |= u64::from(payload) << (group * 7);

        if byte & 0b1000_0000 == 0 {
            return Ok(value);
        }
    }

    Err(Error::MalformedVarInt)
}

/// Number of bytes [`encode`] will write for `value`.
pub fn encoded_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        len += 1;
        value >>= 7;
    }
    len
}
