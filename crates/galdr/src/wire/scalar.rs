//! Fixed-width scalar primitives.
//!
//! All multi-byte values are little-endian. Strings are length-prefixed with
//! a 4-byte byte count; every other kind occupies exactly its fixed width and
//! is not self-delimiting.
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeDelta, Utc};
use std::io::{Read, Write};

use crate::{Decimal, Error, Result};

/// Narrows a byte count to the 4-byte wire prefix, refusing lengths the
/// prefix cannot represent exactly.
fn length_prefix(length: usize) -> Result<u32> {
    u32::try_from(length).map_err(|_| Error::ScalarOutOfRange("length exceeds 32-bit count"))
}

/// Writes a 4-byte little-endian byte count followed by the UTF-8 bytes.
///
/// The prefix counts bytes, not characters; an empty string writes a zero
/// count and nothing else. Strings longer than the prefix can represent are
/// rejected rather than written with a wrapped count.
pub fn write_string(mut write: impl Write, value: &str) -> Result<()> {
    write.write_u32::<LittleEndian>(length_prefix(value.len())?)?;
    write.write_all(value.as_bytes())?;

    Ok(())
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_string(mut read: impl Read) -> Result<String> {
    let length = read.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0; length];
    read.read_exact(&mut bytes)?;

    Ok(String::from_utf8(bytes)?)
}

/// Writes a `char` as its Unicode scalar value, 4 bytes little-endian.
pub fn write_char(mut write: impl Write, value: char) -> Result<()> {
    write.write_u32::<LittleEndian>(u32::from(value))?;

    Ok(())
}

/// Reads a `char`, rejecting values outside the Unicode scalar range.
pub fn read_char(mut read: impl Read) -> Result<char> {
    let raw = read.read_u32::<LittleEndian>()?;
    char::from_u32(raw).ok_or(Error::InvalidChar(raw))
}

/// Writes a bool as a single byte, `1` for true.
pub fn write_bool(mut write: impl Write, value: bool) -> Result<()> {
    write.write_u8(u8::from(value))?;

    Ok(())
}

/// Reads a single-byte bool.
pub fn read_bool(mut read: impl Read) -> Result<bool> {
    Ok(read.read_u8()? == u8::from(true))
}

/// Writes a decimal as its four 32-bit words, sign/scale word first.
pub fn write_decimal(mut write: impl Write, value: &Decimal) -> Result<()> {
    for word in value.words() {
        write.write_u32::<LittleEndian>(word)?;
    }

    Ok(())
}

/// Reads a decimal from its four wire words.
pub fn read_decimal(mut read: impl Read) -> Result<Decimal> {
    let mut words = [0u32; 4];
    for word in &mut words {
        *word = read.read_u32::<LittleEndian>()?;
    }

    Decimal::from_words(words)
}

/// Writes a timestamp as a signed 64-bit tick count.
///
/// Ticks are microseconds since the Unix epoch; this is the portability
/// boundary of the format and must match on both ends.
pub fn write_timestamp(mut write: impl Write, value: &DateTime<Utc>) -> Result<()> {
    write.write_i64::<LittleEndian>(value.timestamp_micros())?;

    Ok(())
}

/// Reads a microsecond-tick timestamp.
pub fn read_timestamp(mut read: impl Read) -> Result<DateTime<Utc>> {
    let ticks = read.read_i64::<LittleEndian>()?;
    DateTime::from_timestamp_micros(ticks)
        .ok_or(Error::ScalarOutOfRange("timestamp ticks outside chrono range"))
}

/// Writes a duration as a signed 64-bit microsecond count.
pub fn write_duration(mut write: impl Write, value: &TimeDelta) -> Result<()> {
    let ticks = value
        .num_microseconds()
        .ok_or(Error::ScalarOutOfRange("duration exceeds 64-bit microseconds"))?;
    write.write_i64::<LittleEndian>(ticks)?;

    Ok(())
}

/// Reads a microsecond-count duration.
pub fn read_duration(mut read: impl Read) -> Result<TimeDelta> {
    Ok(TimeDelta::microseconds(read.read_i64::<LittleEndian>()?))
}
