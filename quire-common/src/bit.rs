//! MSB-first bit reading and writing.

/// A reader that yields bit fields, most significant bit first.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    cur_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Create a new bit reader.
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cur_pos: 0 }
    }

    /// Align the reader to the next byte boundary.
    #[inline]
    pub fn align(&mut self) {
        let bit_pos = self.bit_pos();

        if bit_pos != 0 {
            self.cur_pos += 8 - bit_pos;
        }
    }

    /// Read `bit_size` bits as an unsigned number.
    ///
    /// Returns `None` if `bit_size` is larger than 32 or if not enough
    /// bits are left.
    #[inline]
    pub fn read(&mut self, bit_size: u8) -> Option<u32> {
        let item = self.peek(bit_size)?;
        self.cur_pos += bit_size as usize;

        Some(item)
    }

    /// Read a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Option<u32> {
        let byte = *self.data.get(self.byte_pos())?;
        let bit = (byte >> (7 - self.bit_pos())) & 1;
        self.cur_pos += 1;

        Some(bit as u32)
    }

    /// Look at the next `bit_size` bits without consuming them.
    #[inline]
    pub fn peek(&self, bit_size: u8) -> Option<u32> {
        if bit_size > 32 {
            return None;
        }

        if bit_size == 0 {
            return Some(0);
        }

        let bit_size = bit_size as usize;

        if self.cur_pos + bit_size > self.data.len() * 8 {
            return None;
        }

        let byte_pos = self.byte_pos();
        let bit_pos = self.bit_pos();
        let mut buf = [0_u8; 8];
        let needed = (bit_pos + bit_size).div_ceil(8);
        buf[..needed].copy_from_slice(&self.data[byte_pos..byte_pos + needed]);

        let raw = u64::from_be_bytes(buf) >> (64 - bit_pos - bit_size);

        Some((raw as u32) & bit_mask(bit_size as u8))
    }

    /// Look at the next `bit_size` bits, padding with zeroes past the end of
    /// the data.
    ///
    /// Returns `None` only if no bit at all is left.
    #[inline]
    pub fn peek_padded(&self, bit_size: u8) -> Option<u32> {
        let left = self.bits_left();

        if left == 0 {
            return None;
        }

        if left >= bit_size as usize {
            return self.peek(bit_size);
        }

        let partial = self.peek(left as u8)?;

        Some(partial << (bit_size as usize - left))
    }

    /// Skip `bits` bits.
    #[inline]
    pub fn skip(&mut self, bits: usize) {
        self.cur_pos = (self.cur_pos + bits).min(self.data.len() * 8);
    }

    /// Whether all bits have been read.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.cur_pos >= self.data.len() * 8
    }

    /// The number of unread bits.
    #[inline]
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.cur_pos)
    }

    /// The current byte position.
    #[inline]
    pub fn byte_pos(&self) -> usize {
        self.cur_pos / 8
    }

    /// The current position within the byte.
    #[inline]
    pub fn bit_pos(&self) -> usize {
        self.cur_pos % 8
    }

    /// The current position in bits.
    #[inline]
    pub fn cur_pos(&self) -> usize {
        self.cur_pos
    }

    /// The data starting at the current byte position.
    #[inline]
    pub fn tail(&self) -> &'a [u8] {
        self.data.get(self.byte_pos()..).unwrap_or_default()
    }
}

/// The mask for the given bit size.
#[inline]
pub fn bit_mask(bit_size: u8) -> u32 {
    ((1_u64 << bit_size as u64) - 1) as u32
}

/// A growable, MSB-first bit writer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    data: Vec<u8>,
    cur_pos: usize,
}

impl BitWriter {
    /// Create a new, empty bit writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `bytes` bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            cur_pos: 0,
        }
    }

    /// Write the lowest `bit_size` bits of `val`.
    pub fn write(&mut self, val: u32, bit_size: u8) {
        for i in (0..bit_size).rev() {
            self.write_bit((val >> i) & 1 == 1);
        }
    }

    /// Write a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        let bit_pos = self.cur_pos % 8;

        if bit_pos == 0 {
            self.data.push(0);
        }

        if bit {
            if let Some(last) = self.data.last_mut() {
                *last |= 0x80 >> bit_pos;
            }
        }

        self.cur_pos += 1;
    }

    /// Write the same bit `count` times.
    pub fn write_run(&mut self, bit: bool, mut count: usize) {
        while count > 0 && self.cur_pos % 8 != 0 {
            self.write_bit(bit);
            count -= 1;
        }

        let fill = if bit { 0xFF } else { 0x00 };
        self.data.extend(std::iter::repeat_n(fill, count / 8));
        self.cur_pos += (count / 8) * 8;

        for _ in 0..count % 8 {
            self.write_bit(bit);
        }
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align(&mut self) {
        self.cur_pos = self.cur_pos.div_ceil(8) * 8;
    }

    /// The number of written bits.
    pub fn cur_pos(&self) -> usize {
        self.cur_pos
    }

    /// Consume the writer and return the written bytes.
    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_reader_16() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(16).unwrap(), 0x0102);
        assert_eq!(reader.read(16).unwrap(), 0x0304);
        assert!(reader.read(1).is_none());
    }

    #[test]
    fn bit_reader_12() {
        let data = [0b10011000, 0b00011111, 0b10101001, 0b11101001, 0b00011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(12).unwrap(), 0b100110000001);
        assert_eq!(reader.read(12).unwrap(), 0b111110101001);
        assert_eq!(reader.read(12).unwrap(), 0b111010010001);
    }

    #[test]
    fn unaligned_byte_read() {
        let data = [0b1010_1100, 0b0101_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(4).unwrap(), 0b1010);
        assert_eq!(reader.read(8).unwrap(), 0b1100_0101);
    }

    #[test]
    fn full_width_read() {
        let data = [0xFF, 0x00, 0xFF, 0x00, 0xAA];
        let mut reader = BitReader::new(&data);
        reader.read(3).unwrap();
        assert_eq!(reader.read(32).unwrap(), 0b11111000_00000111_11111000_00000101);
    }

    #[test]
    fn bit_reader_align() {
        let data = [0b10011000, 0b00010000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(4).unwrap(), 0b1001);
        reader.align();
        assert_eq!(reader.read(4).unwrap(), 0b0001);
        assert_eq!(reader.read_bit().unwrap(), 0);
    }

    #[test]
    fn padded_peek() {
        let data = [0b1011_0000];
        let mut reader = BitReader::new(&data);
        reader.read(6).unwrap();
        assert_eq!(reader.peek(4), None);
        assert_eq!(reader.peek_padded(4), Some(0b0000));
        reader.skip(2);
        assert_eq!(reader.peek_padded(4), None);
    }

    #[test]
    fn writer_runs() {
        let mut writer = BitWriter::new();
        writer.write_run(true, 3);
        writer.write_run(false, 2);
        writer.write_run(true, 12);
        assert_eq!(writer.cur_pos(), 17);
        assert_eq!(writer.finish(), [0b1110_0111, 0b1111_1111, 0b1000_0000]);
    }

    #[test]
    fn writer_round_trip() {
        let mut writer = BitWriter::new();
        writer.write(0b101, 3);
        writer.write(0x1FF, 9);
        writer.align();
        writer.write(0xAB, 8);
        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(3).unwrap(), 0b101);
        assert_eq!(reader.read(9).unwrap(), 0x1FF);
        reader.align();
        assert_eq!(reader.read(8).unwrap(), 0xAB);
    }
}
