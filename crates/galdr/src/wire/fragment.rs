//! Tagged, length-prefixed framing header.
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::wire::varint;
use crate::Result;

/// A self-describing header placed before an opaque byte block: one tag byte
/// followed by the payload length as a varint.
///
/// The fragment carries no payload itself and performs no payload
/// validation; `length` is the exact count of payload bytes the writer must
/// emit (and the reader must consume) after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Free-use fragment tag.
    pub tag: u8,
    /// Exact number of payload bytes following the header.
    pub length: u64,
}

impl Fragment {
    /// Creates a fragment header.
    pub fn new(tag: u8, length: u64) -> Self {
        Self { tag, length }
    }

    /// Writes the header: the tag byte, then the length as a varint.
    pub fn encode(&self, mut write: impl Write) -> Result<()> {
        write.write_u8(self.tag)?;
        varint::encode(self.length, &mut write)?;

        Ok(())
    }

    /// Reads a header from `read`.
    pub fn decode(mut read: impl Read) -> Result<Self> {
        let tag = read.read_u8()?;
        let length = varint::decode(&mut read)?;

        Ok(Self { tag, length })
    }

    /// Number of bytes [`Fragment::encode`] will write.
    pub fn encoded_len(&self) -> usize {
        1 + varint::encoded_len(self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(fragment: Fragment) -> Result<()> {
        let mut encoded: Vec<u8> = Vec::new();
        fragment.encode(&mut encoded)?;

        assert_eq!(encoded.len(), fragment.encoded_len());
        assert_eq!(Fragment::decode(encoded.as_slice())?, fragment);

        Ok(())
    }

    #[test]
    fn empty_fragment_is_two_bytes() -> Result<()> {
        let fragment = Fragment::new(0, 0);

        let mut encoded: Vec<u8> = Vec::new();
        fragment.encode(&mut encoded)?;

        assert_eq!(encoded, [0u8, 0u8]);

        Ok(())
    }

    #[test]
    fn roundtrips_arbitrary_headers() -> Result<()> {
        roundtrip(Fragment::new(0, 0))?;
        roundtrip(Fragment::new(0x7F, 1))?;
        roundtrip(Fragment::new(0xFF, 127))?;
        roundtrip(Fragment::new(1, 128))?;
        roundtrip(Fragment::new(42, u64::from(u32::MAX)))?;
        roundtrip(Fragment::new(255, u64::MAX))?;

        Ok(())
    }

    #[test]
    fn truncated_length_fails() {
        // Tag present, length varint cut off mid-continuation.
        let bytes = [7u8, 0x80];
        assert!(Fragment::decode(bytes.as_slice()).is_err());
    }
}
