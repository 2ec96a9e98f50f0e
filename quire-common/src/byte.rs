//! A cursor over a byte slice.

use std::ops::Range;

/// A forward-moving cursor over borrowed bytes.
///
/// All reading methods are bounds-checked and return `None` instead of
/// reading past the end of the data.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    /// The underlying data of the reader.
    pub data: &'a [u8],
    /// The current byte offset.
    pub offset: usize,
}

impl<'a> Reader<'a> {
    /// Create a new reader positioned at the start of the data.
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Create a new reader positioned at `offset`.
    #[inline]
    pub fn new_at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    /// Whether the reader has consumed all data.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Move the reader to an absolute offset.
    #[inline]
    pub fn jump(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// The current offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The total length of the underlying data.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying data is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The number of bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// The unread part of the data.
    #[inline]
    pub fn tail(&self) -> &'a [u8] {
        self.data.get(self.offset..).unwrap_or_default()
    }

    /// A sub-slice of the data.
    #[inline]
    pub fn range(&self, range: Range<usize>) -> Option<&'a [u8]> {
        self.data.get(range)
    }

    /// Read `len` bytes.
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let v = self.peek_bytes(len)?;
        self.offset += len;

        Some(v)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_byte(&mut self) -> Option<u8> {
        let v = self.peek_byte()?;
        self.offset += 1;

        Some(v)
    }

    /// Skip `len` bytes, failing if fewer are left.
    #[inline]
    pub fn skip_bytes(&mut self, len: usize) -> Option<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Look at the next `len` bytes without consuming them.
    #[inline]
    pub fn peek_bytes(&self, len: usize) -> Option<&'a [u8]> {
        self.data.get(self.offset..self.offset.checked_add(len)?)
    }

    /// Look at the next byte without consuming it.
    #[inline]
    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    /// Consume the next byte if it satisfies the predicate.
    #[inline]
    pub fn eat(&mut self, f: impl Fn(u8) -> bool) -> Option<u8> {
        let val = self.peek_byte()?;

        if f(val) {
            self.forward();
            Some(val)
        } else {
            None
        }
    }

    /// Advance by one byte.
    #[inline]
    pub fn forward(&mut self) {
        self.offset += 1;
    }

    /// Advance while bytes satisfy the predicate.
    #[inline]
    pub fn forward_while(&mut self, f: impl Fn(u8) -> bool) {
        while let Some(b) = self.peek_byte() {
            if f(b) {
                self.forward();
            } else {
                break;
            }
        }
    }

    /// Advance while bytes satisfy the predicate, requiring at least one match.
    #[inline]
    pub fn forward_while_1(&mut self, f: impl Fn(u8) -> bool) -> Option<()> {
        self.eat(&f)?;
        self.forward_while(f);

        Some(())
    }

    /// Consume `tag` if the data continues with it.
    #[inline]
    pub fn forward_tag(&mut self, tag: &[u8]) -> Option<()> {
        self.peek_tag(tag)?;
        self.offset += tag.len();

        Some(())
    }

    /// Check whether the data continues with `tag`.
    #[inline]
    pub fn peek_tag(&self, tag: &[u8]) -> Option<()> {
        (self.peek_bytes(tag.len())? == tag).then_some(())
    }

    /// Read a big-endian `u16`.
    #[inline]
    pub fn read_u16(&mut self) -> Option<u16> {
        let bytes = self.read_bytes(2)?;

        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian `u32`.
    #[inline]
    pub fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.read_bytes(4)?;

        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a big-endian `i32`.
    #[inline]
    pub fn read_i32(&mut self) -> Option<i32> {
        self.read_u32().map(|n| n as i32)
    }

    /// Read a signed byte.
    #[inline]
    pub fn read_i8(&mut self) -> Option<i8> {
        self.read_byte().map(|b| b as i8)
    }
}

#[cfg(test)]
mod tests {
    use super::Reader;

    #[test]
    fn reads_stay_in_bounds() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert_eq!(r.read_bytes(2), Some(&[1, 2][..]));
        assert_eq!(r.read_bytes(2), None);
        assert_eq!(r.read_byte(), Some(3));
        assert_eq!(r.read_byte(), None);
        assert!(r.at_end());
    }

    #[test]
    fn tags() {
        let mut r = Reader::new(b"endstream");
        assert!(r.forward_tag(b"endobj").is_none());
        assert_eq!(r.offset(), 0);
        assert!(r.forward_tag(b"end").is_some());
        assert_eq!(r.tail(), b"stream");
    }

    #[test]
    fn big_endian_integers() {
        let mut r = Reader::new(&[0x00, 0x20, 0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(r.read_u16(), Some(0x20));
        assert_eq!(r.read_i32(), Some(-2));
    }

    #[test]
    fn huge_peek_does_not_overflow() {
        let mut r = Reader::new(&[1, 2, 3]);
        r.forward();
        assert_eq!(r.peek_bytes(usize::MAX), None);
    }
}
