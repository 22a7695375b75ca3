//! Bit level addressing of byte buffers.
//!
//! Bits are numbered MSB first: bit 0 is the high bit of the first byte. Neither views nor chunks
//! require byte alignment, and neither copies the underlying buffer.
use std::borrow::Cow;

use crate::{Error, Result};

/// A read-only, bit addressed view into a byte buffer.
///
/// A view may be a window into a larger buffer (see [BitView::window]), in which case bit 0 of
/// the view is some arbitrary bit of the buffer.
///
/// # Example
/// ```
/// use telemdec::BitView;
///
/// let view = BitView::new(&[0b1010_0101, 0xff]);
/// let chunk = view.slice(4, 8).unwrap();
/// assert_eq!(chunk.as_unsigned().unwrap(), 0b0101_1111);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BitView<'a> {
    data: &'a [u8],
    start: usize,
    len: usize,
}

impl<'a> BitView<'a> {
    /// View of all bits in `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        BitView {
            data,
            start: 0,
            len: data.len() * 8,
        }
    }

    /// View of the first `bit_len` bits of `data`.
    ///
    /// # Errors
    /// [Error::Range] if `data` holds fewer than `bit_len` bits.
    pub fn with_bit_len(data: &'a [u8], bit_len: usize) -> Result<Self> {
        BitView::new(data).window(0, bit_len)
    }

    /// Number of addressable bits.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sub-view of `bit_len` bits starting at `bit_offset` of this view.
    ///
    /// # Errors
    /// [Error::Range] if the window extends past the end of this view.
    pub fn window(&self, bit_offset: usize, bit_len: usize) -> Result<BitView<'a>> {
        self.check(bit_offset, bit_len)?;
        Ok(BitView {
            data: self.data,
            start: self.start + bit_offset,
            len: bit_len,
        })
    }

    /// The bits `[bit_offset, bit_offset + bit_width)` of this view.
    ///
    /// # Errors
    /// [Error::Range] if the slice extends past the end of this view.
    pub fn slice(&self, bit_offset: usize, bit_width: usize) -> Result<BitChunk<'a>> {
        self.check(bit_offset, bit_width)?;
        Ok(BitChunk {
            data: self.data,
            start: self.start + bit_offset,
            width: bit_width,
        })
    }

    fn check(&self, offset: usize, width: usize) -> Result<()> {
        match offset.checked_add(width) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Error::Range {
                offset,
                width,
                len: self.len,
            }),
        }
    }
}

/// A contiguous run of bits extracted from a [BitView].
#[derive(Debug, Clone, Copy)]
pub struct BitChunk<'a> {
    data: &'a [u8],
    /// Absolute bit offset into `data`
    start: usize,
    width: usize,
}

impl<'a> BitChunk<'a> {
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// This chunk as a view, so that it may be sliced further.
    #[must_use]
    pub fn view(&self) -> BitView<'a> {
        BitView {
            data: self.data,
            start: self.start,
            len: self.width,
        }
    }

    /// Big-endian unsigned value of the chunk, no sign extension.
    ///
    /// # Errors
    /// [Error::UnsupportedWidth] unless the width is 1 to 64 bits.
    pub fn as_unsigned(&self) -> Result<u64> {
        if !(1..=64).contains(&self.width) {
            return Err(Error::UnsupportedWidth {
                kind: "unsigned",
                width: self.width,
            });
        }
        Ok(read_bits(self.data, self.start, self.width))
    }

    /// Two's-complement value of the chunk over its own width.
    ///
    /// # Errors
    /// [Error::UnsupportedWidth] unless the width is 1 to 64 bits.
    pub fn as_signed(&self) -> Result<i64> {
        if !(1..=64).contains(&self.width) {
            return Err(Error::UnsupportedWidth {
                kind: "signed",
                width: self.width,
            });
        }
        Ok(sign_extend(
            read_bits(self.data, self.start, self.width),
            self.width,
        ))
    }

    /// IEEE-754 single or double read directly from the chunk bits. Singles are widened, which
    /// is exact for all values, although a signaling NaN may be quieted. Use [BitChunk::as_f32]
    /// to keep single precision bits intact.
    ///
    /// # Errors
    /// [Error::UnsupportedWidth] unless the width is 32 or 64 bits.
    pub fn as_float(&self) -> Result<f64> {
        match self.width {
            32 => Ok(f64::from(self.as_f32()?)),
            64 => Ok(f64::from_bits(read_bits(self.data, self.start, 64))),
            width => Err(Error::UnsupportedWidth {
                kind: "float",
                width,
            }),
        }
    }

    /// IEEE-754 single read directly from the chunk bits.
    ///
    /// # Errors
    /// [Error::UnsupportedWidth] unless the width is 32 bits.
    pub fn as_f32(&self) -> Result<f32> {
        if self.width != 32 {
            return Err(Error::UnsupportedWidth {
                kind: "float",
                width: self.width,
            });
        }
        Ok(f32::from_bits(read_bits(self.data, self.start, 32) as u32))
    }

    /// Bytes of the chunk. Borrowed when the chunk starts on a byte boundary.
    ///
    /// # Errors
    /// [Error::UnsupportedWidth] if the width is not a whole number of bytes.
    pub fn as_bytes(&self) -> Result<Cow<'a, [u8]>> {
        if self.width % 8 != 0 {
            return Err(Error::UnsupportedWidth {
                kind: "byte",
                width: self.width,
            });
        }
        if self.start % 8 == 0 {
            let first = self.start / 8;
            return Ok(Cow::Borrowed(&self.data[first..first + self.width / 8]));
        }
        Ok(Cow::Owned(self.to_vec()))
    }

    /// Copy of the chunk bits, left aligned into new bytes. A partial last byte is zero padded.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width.div_ceil(8));
        let mut pos = self.start;
        let mut remaining = self.width;
        while remaining > 0 {
            let n = remaining.min(8);
            let b = read_bits(self.data, pos, n) as u8;
            out.push(b << (8 - n));
            pos += n;
            remaining -= n;
        }
        out
    }
}

/// Reads `width` (1..=64) bits at absolute bit `offset`. Caller guarantees bounds.
fn read_bits(data: &[u8], offset: usize, width: usize) -> u64 {
    debug_assert!((1..=64).contains(&width));
    let first = offset / 8;
    let last = (offset + width - 1) / 8;
    // at most 9 bytes for an unaligned 64-bit read
    let acc = data[first..=last]
        .iter()
        .fold(0u128, |acc, b| (acc << 8) | u128::from(*b));
    let trailing = (last - first + 1) * 8 - (offset % 8) - width;
    let mask = u64::MAX >> (64 - width);
    (acc >> trailing) as u64 & mask
}

fn sign_extend(value: u64, width: usize) -> i64 {
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_unaligned() {
        let dat = [0b1010_1100, 0b0101_0011, 0xff];
        let view = BitView::new(&dat);

        assert_eq!(view.slice(0, 1).unwrap().as_unsigned().unwrap(), 1);
        assert_eq!(view.slice(1, 1).unwrap().as_unsigned().unwrap(), 0);
        assert_eq!(view.slice(2, 4).unwrap().as_unsigned().unwrap(), 0b1011);
        assert_eq!(view.slice(6, 6).unwrap().as_unsigned().unwrap(), 0b00_0101);
        assert_eq!(view.slice(12, 12).unwrap().as_unsigned().unwrap(), 0x3ff);
    }

    #[test]
    fn slice_out_of_range() {
        let dat = [0u8; 2];
        let view = BitView::new(&dat);

        assert!(view.slice(0, 16).is_ok());
        assert!(view.slice(16, 0).is_ok());
        let err = view.slice(9, 8).unwrap_err();
        assert!(
            matches!(
                err,
                Error::Range {
                    offset: 9,
                    width: 8,
                    len: 16
                }
            ),
            "got {err:?}"
        );
        assert!(view.slice(usize::MAX, 2).is_err(), "overflow must not wrap");
    }

    #[test]
    fn unaligned_64_bits() {
        // 0x0123456789abcdef shifted right by 3 bits across 9 bytes
        let value: u64 = 0x0123_4567_89ab_cdef;
        let wide = u128::from(value) << (72 - 64 - 3);
        let bytes = wide.to_be_bytes();
        let dat = &bytes[16 - 9..];

        let chunk = BitView::new(dat).slice(3, 64).unwrap();
        assert_eq!(chunk.as_unsigned().unwrap(), value);
        assert_eq!(chunk.as_signed().unwrap(), value as i64);
    }

    #[test]
    fn all_ones_32() {
        let dat = [0xff; 4];
        let chunk = BitView::new(&dat).slice(0, 32).unwrap();
        assert_eq!(chunk.as_unsigned().unwrap(), 4_294_967_295);
        assert_eq!(chunk.as_signed().unwrap(), -1);
    }

    #[test]
    fn signed_narrow() {
        let dat = [0b1100_0000];
        let view = BitView::new(&dat);
        assert_eq!(view.slice(0, 1).unwrap().as_signed().unwrap(), -1);
        assert_eq!(view.slice(0, 3).unwrap().as_signed().unwrap(), -2);
        assert_eq!(view.slice(1, 3).unwrap().as_signed().unwrap(), -4);
        assert_eq!(view.slice(2, 3).unwrap().as_signed().unwrap(), 0);
    }

    #[test]
    fn zero_and_wide_widths_unsupported() {
        let dat = [0u8; 9];
        let view = BitView::new(&dat);
        assert!(matches!(
            view.slice(0, 0).unwrap().as_unsigned(),
            Err(Error::UnsupportedWidth { width: 0, .. })
        ));
        assert!(matches!(
            view.slice(0, 65).unwrap().as_signed(),
            Err(Error::UnsupportedWidth { width: 65, .. })
        ));
    }

    #[test]
    fn float_widths() {
        let dat = 1.5f32.to_be_bytes();
        let view = BitView::new(&dat);
        assert_eq!(view.slice(0, 32).unwrap().as_float().unwrap(), 1.5);
        assert_eq!(view.slice(0, 32).unwrap().as_f32().unwrap(), 1.5);
        assert!(matches!(
            view.slice(0, 16).unwrap().as_float(),
            Err(Error::UnsupportedWidth {
                kind: "float",
                width: 16
            })
        ));

        let dat = (-2.25f64).to_be_bytes();
        assert_eq!(
            BitView::new(&dat).slice(0, 64).unwrap().as_float().unwrap(),
            -2.25
        );
    }

    #[test]
    fn bytes_borrowed_when_aligned() {
        let dat = b"xxABCDyy";
        let view = BitView::new(dat);

        let bytes = view.slice(16, 32).unwrap().as_bytes().unwrap();
        assert!(matches!(bytes, Cow::Borrowed(_)));
        assert_eq!(&bytes[..], b"ABCD");

        assert!(view.slice(16, 12).unwrap().as_bytes().is_err());
    }

    #[test]
    fn bytes_copied_when_unaligned() {
        // "AB" shifted right by 4 bits
        let dat = [0x04, 0x14, 0x20];
        let bytes = BitView::new(&dat).slice(4, 16).unwrap().as_bytes().unwrap();
        assert!(matches!(bytes, Cow::Owned(_)));
        assert_eq!(&bytes[..], b"AB");
    }

    #[test]
    fn to_vec_pads_last_byte() {
        let dat = [0b0111_1111, 0b1100_0000];
        let chunk = BitView::new(&dat).slice(1, 9).unwrap();
        assert_eq!(chunk.to_vec(), vec![0xff, 0x80]);
    }

    #[test]
    fn window_is_relative() {
        let dat = [0x00, 0b0000_1111, 0b0000_0000];
        let view = BitView::new(&dat);
        let win = view.window(8, 8).unwrap();

        assert_eq!(win.bit_len(), 8);
        assert_eq!(win.slice(4, 4).unwrap().as_unsigned().unwrap(), 0xf);
        assert!(win.slice(4, 8).is_err(), "slices are bounded by the window");

        let nested = win.slice(2, 6).unwrap().view();
        assert_eq!(nested.slice(2, 4).unwrap().as_unsigned().unwrap(), 0xf);
    }

    #[test]
    fn with_bit_len_limits_view() {
        let dat = [0xff, 0xff];
        let view = BitView::with_bit_len(&dat, 12).unwrap();
        assert_eq!(view.bit_len(), 12);
        assert!(view.slice(8, 5).is_err());
        assert!(BitView::with_bit_len(&dat, 17).is_err());
    }
}
