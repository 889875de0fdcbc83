// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Views over batched operation arguments.
//
// Batch handlers stage a whole request in one pooled buffer: a size-array
// prefix, then packed key bytes, then the result regions. Backends receive
// borrowed views into that buffer and write results in place. Size arrays
// travel as little-endian u64; key and value bytes are never copied on the
// way in.

use crate::error::{KvError, KvResult};

/// In-band sentinel: the key was not found.
pub const KEY_NOT_FOUND: u64 = u64::MAX;
/// In-band sentinel: the caller's buffer cannot hold this entry.
pub const SIZE_TOO_SMALL: u64 = u64::MAX - 1;
/// In-band sentinel: the listing is exhausted at this slot.
pub const NO_MORE_KEYS: u64 = u64::MAX - 2;

/// Width of one size slot on the wire.
pub const SIZE_WIDTH: usize = std::mem::size_of::<u64>();

/// A mutable view over a packed bit field with one bit per batch entry.
pub struct BitField<'a> {
    data: &'a mut [u8],
    len: usize,
}

impl<'a> BitField<'a> {
    /// Number of bytes needed to hold `count` bits.
    pub const fn bytes_needed(count: usize) -> usize {
        count.div_ceil(8)
    }

    /// Wrap `data` as a field of `len` bits.
    ///
    /// Returns `InvalidArgs` if `data` is too short.
    pub fn new(data: &'a mut [u8], len: usize) -> KvResult<Self> {
        if data.len() < Self::bytes_needed(len) {
            return Err(KvError::InvalidArgs);
        }
        Ok(Self { data, len })
    }

    /// Number of bits in the field.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the field holds no bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        for byte in self.data.iter_mut() {
            *byte = 0;
        }
    }

    /// Read bit `i`.
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.data[i / 8] & (1 << (i % 8)) != 0
    }

    /// Set bit `i` to `value`.
    pub fn set(&mut self, i: usize, value: bool) {
        debug_assert!(i < self.len);
        if value {
            self.data[i / 8] |= 1 << (i % 8);
        } else {
            self.data[i / 8] &= !(1 << (i % 8));
        }
    }
}

/// A byte output region plus the number of bytes actually written.
///
/// Mirrors the request layout: the region's capacity is fixed by the caller,
/// and `used` is reported back so the handler knows how much to push.
pub struct OutBuf<'a> {
    /// The destination bytes.
    pub data: &'a mut [u8],
    /// How many bytes of `data` carry results.
    pub used: usize,
}

impl<'a> OutBuf<'a> {
    /// Wrap a destination region; nothing written yet.
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, used: 0 }
    }

    /// Remaining capacity.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.used
    }
}

/// Sum a size array, failing with `InvalidArgs` on arithmetic overflow.
pub fn checked_total(sizes: &[u64]) -> KvResult<u64> {
    let mut total: u64 = 0;
    for &s in sizes {
        total = total.checked_add(s).ok_or(KvError::InvalidArgs)?;
    }
    Ok(total)
}

/// Decode `count` little-endian u64 size slots from the front of `bytes`.
pub fn decode_sizes(bytes: &[u8], count: usize) -> KvResult<Vec<u64>> {
    let needed = count
        .checked_mul(SIZE_WIDTH)
        .ok_or(KvError::InvalidArgs)?;
    if bytes.len() < needed {
        return Err(KvError::InvalidArgs);
    }
    Ok(bytes[..needed]
        .chunks_exact(SIZE_WIDTH)
        .map(|c| u64::from_le_bytes(c.try_into().expect("chunk width")))
        .collect())
}

/// Encode size slots as little-endian u64 into the front of `out`.
pub fn encode_sizes(sizes: &[u64], out: &mut [u8]) -> KvResult<()> {
    let needed = sizes
        .len()
        .checked_mul(SIZE_WIDTH)
        .ok_or(KvError::InvalidArgs)?;
    if out.len() < needed {
        return Err(KvError::InvalidArgs);
    }
    for (slot, &s) in out[..needed].chunks_exact_mut(SIZE_WIDTH).zip(sizes) {
        slot.copy_from_slice(&s.to_le_bytes());
    }
    Ok(())
}

/// Slice the `i`-th packed key out of `blob`, given the preceding offset.
///
/// Backends walk batches with a running offset; this helper centralizes the
/// bound check that every step needs.
pub fn key_at(blob: &[u8], offset: usize, ksize: u64) -> KvResult<&[u8]> {
    let ksize = usize::try_from(ksize).map_err(|_| KvError::InvalidArgs)?;
    let end = offset.checked_add(ksize).ok_or(KvError::InvalidArgs)?;
    if end > blob.len() {
        return Err(KvError::InvalidArgs);
    }
    Ok(&blob[offset..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_values() {
        assert_eq!(KEY_NOT_FOUND, u64::MAX);
        assert_eq!(SIZE_TOO_SMALL, u64::MAX - 1);
        assert_eq!(NO_MORE_KEYS, u64::MAX - 2);
    }

    #[test]
    fn test_bitfield_set_get() {
        let mut storage = [0u8; 2];
        let mut field = BitField::new(&mut storage, 11).unwrap();
        field.clear();
        field.set(0, true);
        field.set(8, true);
        field.set(10, true);
        assert!(field.get(0));
        assert!(!field.get(1));
        assert!(field.get(8));
        assert!(field.get(10));
        field.set(8, false);
        assert!(!field.get(8));
        assert_eq!(storage[0], 0b0000_0001);
        assert_eq!(storage[1], 0b0000_0100);
    }

    #[test]
    fn test_bitfield_too_short() {
        let mut storage = [0u8; 1];
        assert!(matches!(
            BitField::new(&mut storage, 9),
            Err(KvError::InvalidArgs)
        ));
    }

    #[test]
    fn test_bytes_needed_rounds_up() {
        assert_eq!(BitField::bytes_needed(0), 0);
        assert_eq!(BitField::bytes_needed(1), 1);
        assert_eq!(BitField::bytes_needed(8), 1);
        assert_eq!(BitField::bytes_needed(9), 2);
    }

    #[test]
    fn test_size_codec_round_trip() {
        let sizes = vec![0u64, 5, 1 << 40, KEY_NOT_FOUND];
        let mut wire = vec![0u8; sizes.len() * SIZE_WIDTH];
        encode_sizes(&sizes, &mut wire).unwrap();
        assert_eq!(decode_sizes(&wire, sizes.len()).unwrap(), sizes);
    }

    #[test]
    fn test_decode_short_buffer() {
        let wire = [0u8; 15];
        assert!(matches!(
            decode_sizes(&wire, 2),
            Err(KvError::InvalidArgs)
        ));
    }

    #[test]
    fn test_checked_total_overflow() {
        assert_eq!(checked_total(&[3, 4, 5]).unwrap(), 12);
        assert!(matches!(
            checked_total(&[u64::MAX, 1]),
            Err(KvError::InvalidArgs)
        ));
    }

    #[test]
    fn test_key_at_bounds() {
        let blob = b"abcdef";
        assert_eq!(key_at(blob, 0, 3).unwrap(), b"abc");
        assert_eq!(key_at(blob, 3, 3).unwrap(), b"def");
        assert!(matches!(key_at(blob, 4, 3), Err(KvError::InvalidArgs)));
    }

    #[test]
    fn test_outbuf_accounting() {
        let mut data = [0u8; 8];
        let mut out = OutBuf::new(&mut data);
        assert_eq!(out.remaining(), 8);
        out.data[..3].copy_from_slice(b"xyz");
        out.used = 3;
        assert_eq!(out.remaining(), 5);
    }
}
