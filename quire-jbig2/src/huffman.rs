//! Huffman code tables (Annex B).
//!
//! Tables are stored as their lines together with the canonical code
//! assignment of B.3, so that decoding only needs the first code and the
//! lines of each prefix length.

use std::sync::LazyLock;

use quire_common::bit::BitReader;
use quire_common::byte::Reader;

use crate::error::{DecodeError, HuffmanError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// Values from `low` upwards.
    Normal,
    /// Values from `low` downwards.
    Lower,
    OutOfBand,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Line {
    low: i32,
    prefix_len: u8,
    range_len: u8,
    kind: LineKind,
}

impl Line {
    pub(crate) const fn new(low: i32, prefix_len: u8, range_len: u8) -> Self {
        Self {
            low,
            prefix_len,
            range_len,
            kind: LineKind::Normal,
        }
    }

    const fn lower(high: i32, prefix_len: u8) -> Self {
        Self {
            low: high,
            prefix_len,
            range_len: 32,
            kind: LineKind::Lower,
        }
    }

    const fn upper(low: i32, prefix_len: u8) -> Self {
        Self::new(low, prefix_len, 32)
    }

    const fn oob(prefix_len: u8) -> Self {
        Self {
            low: 0,
            prefix_len,
            range_len: 0,
            kind: LineKind::OutOfBand,
        }
    }
}

/// A Huffman table, either one of the standard tables or a custom one.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    lines: Vec<Line>,
    /// The first code of each prefix length.
    first_code: Vec<u64>,
    /// The lines with each prefix length, in table order.
    by_length: Vec<Vec<usize>>,
}

impl Table {
    /// Assign the prefix codes (B.3).
    ///
    /// Prefix lengths must not exceed 32.
    pub(crate) fn build(lines: Vec<Line>) -> Self {
        let max_len = lines.iter().map(|l| l.prefix_len).max().unwrap_or(0) as usize;

        let mut by_length = vec![Vec::new(); max_len + 1];
        for (idx, line) in lines.iter().enumerate() {
            // A prefix length of zero marks an unused line.
            if line.prefix_len > 0 {
                by_length[line.prefix_len as usize].push(idx);
            }
        }

        let mut first_code = vec![0_u64; max_len + 1];
        for len in 1..=max_len {
            first_code[len] = (first_code[len - 1] + by_length[len - 1].len() as u64) * 2;
        }

        Self {
            lines,
            first_code,
            by_length,
        }
    }

    /// Decode a value, or `None` for the out-of-band value (B.4).
    pub(crate) fn decode(&self, reader: &mut BitReader<'_>) -> Result<Option<i32>> {
        let mut code = 0_u64;

        for len in 1..self.by_length.len() {
            let bit = reader.read_bit().ok_or(DecodeError::UnexpectedEof)?;
            code = (code << 1) | u64::from(bit);

            let candidates = &self.by_length[len];
            let Some(offset) = code
                .checked_sub(self.first_code[len])
                .filter(|o| *o < candidates.len() as u64)
            else {
                continue;
            };

            let line = self.lines[candidates[offset as usize]];
            let range = reader
                .read(line.range_len)
                .ok_or(DecodeError::UnexpectedEof)?;

            let value = match line.kind {
                LineKind::OutOfBand => return Ok(None),
                LineKind::Normal => i64::from(line.low) + i64::from(range),
                LineKind::Lower => i64::from(line.low) - i64::from(range),
            };

            return i32::try_from(value)
                .map(Some)
                .map_err(|_| DecodeError::Overflow);
        }

        Err(HuffmanError::InvalidCode.into())
    }

    /// Decode a value where the out-of-band value is not allowed.
    pub(crate) fn decode_value(&self, reader: &mut BitReader<'_>) -> Result<i32> {
        self.decode(reader)?
            .ok_or_else(|| HuffmanError::UnexpectedOob.into())
    }

    /// Parse the code table of a tables segment (B.2).
    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let flags = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;
        let low = reader.read_i32().ok_or(DecodeError::UnexpectedEof)?;
        let high = reader.read_i32().ok_or(DecodeError::UnexpectedEof)?;

        let has_oob = flags & 0x01 != 0;
        let prefix_bits = ((flags >> 1) & 0x07) + 1;
        let range_bits = ((flags >> 4) & 0x07) + 1;

        let mut bits = BitReader::new(reader.tail());
        let mut read = |size: u8| {
            bits.read(size)
                .map(|v| v as u8)
                .ok_or(DecodeError::UnexpectedEof)
        };

        let mut lines = Vec::new();
        let mut current = low;

        while current < high {
            let prefix_len = read(prefix_bits)?;
            let range_len = read(range_bits)?;
            lines.push(Line::new(current, prefix_len, range_len));

            current = 1_i64
                .checked_shl(u32::from(range_len))
                .filter(|_| range_len < 32)
                .and_then(|size| i32::try_from(i64::from(current) + size).ok())
                .ok_or(HuffmanError::InvalidTable)?;
        }

        let lower_high = low.checked_sub(1).ok_or(HuffmanError::InvalidTable)?;
        lines.push(Line::lower(lower_high, read(prefix_bits)?));
        lines.push(Line::upper(current, read(prefix_bits)?));

        if has_oob {
            lines.push(Line::oob(read(prefix_bits)?));
        }

        if lines.iter().any(|l| l.prefix_len > 32) {
            return Err(HuffmanError::InvalidTable.into());
        }

        Ok(Self::build(lines))
    }
}

/// The standard tables of B.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Standard {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
}

pub(crate) fn standard(table: Standard) -> &'static Table {
    &STANDARD_TABLES[table as usize]
}

static STANDARD_TABLES: LazyLock<[Table; 15]> =
    LazyLock::new(|| STANDARD_LINES.map(|lines| Table::build(lines.to_vec())));

#[rustfmt::skip]
static STANDARD_LINES: [&[Line]; 15] = [
    // B.1
    &[
        Line::new(0, 1, 4), Line::new(16, 2, 8), Line::new(272, 3, 16), Line::upper(65808, 3),
    ],
    // B.2
    &[
        Line::new(0, 1, 0), Line::new(1, 2, 0), Line::new(2, 3, 0), Line::new(3, 4, 3),
        Line::new(11, 5, 6), Line::upper(75, 6), Line::oob(6),
    ],
    // B.3
    &[
        Line::new(-256, 8, 8), Line::new(0, 1, 0), Line::new(1, 2, 0), Line::new(2, 3, 0),
        Line::new(3, 4, 3), Line::new(11, 5, 6), Line::lower(-257, 8), Line::upper(75, 7),
        Line::oob(6),
    ],
    // B.4
    &[
        Line::new(1, 1, 0), Line::new(2, 2, 0), Line::new(3, 3, 0), Line::new(4, 4, 3),
        Line::new(12, 5, 6), Line::upper(76, 5),
    ],
    // B.5
    &[
        Line::new(-255, 7, 8), Line::new(1, 1, 0), Line::new(2, 2, 0), Line::new(3, 3, 0),
        Line::new(4, 4, 3), Line::new(12, 5, 6), Line::lower(-256, 7), Line::upper(76, 6),
    ],
    // B.6
    &[
        Line::new(-2048, 5, 10), Line::new(-1024, 4, 9), Line::new(-512, 4, 8),
        Line::new(-256, 4, 7), Line::new(-128, 5, 6), Line::new(-64, 5, 5), Line::new(-32, 4, 5),
        Line::new(0, 2, 7), Line::new(128, 3, 7), Line::new(256, 3, 8), Line::new(512, 4, 9),
        Line::new(1024, 4, 10), Line::lower(-2049, 6), Line::upper(2048, 6),
    ],
    // B.7
    &[
        Line::new(-1024, 4, 9), Line::new(-512, 3, 8), Line::new(-256, 4, 7),
        Line::new(-128, 5, 6), Line::new(-64, 5, 5), Line::new(-32, 4, 5), Line::new(0, 4, 5),
        Line::new(32, 5, 5), Line::new(64, 5, 6), Line::new(128, 4, 7), Line::new(256, 3, 8),
        Line::new(512, 3, 9), Line::new(1024, 3, 10), Line::lower(-1025, 5),
        Line::upper(2048, 5),
    ],
    // B.8
    &[
        Line::new(-15, 8, 3), Line::new(-7, 9, 1), Line::new(-5, 8, 1), Line::new(-3, 9, 0),
        Line::new(-2, 7, 0), Line::new(-1, 4, 0), Line::new(0, 2, 1), Line::new(2, 5, 0),
        Line::new(3, 6, 0), Line::new(4, 3, 4), Line::new(20, 6, 1), Line::new(22, 4, 4),
        Line::new(38, 4, 5), Line::new(70, 5, 6), Line::new(134, 5, 7), Line::new(262, 6, 7),
        Line::new(390, 7, 8), Line::new(646, 6, 10), Line::lower(-16, 9), Line::upper(1670, 9),
        Line::oob(2),
    ],
    // B.9
    &[
        Line::new(-31, 8, 4), Line::new(-15, 9, 2), Line::new(-11, 8, 2), Line::new(-7, 9, 1),
        Line::new(-5, 7, 1), Line::new(-3, 4, 1), Line::new(-1, 3, 1), Line::new(1, 3, 1),
        Line::new(3, 5, 1), Line::new(5, 6, 1), Line::new(7, 3, 5), Line::new(39, 6, 2),
        Line::new(43, 4, 5), Line::new(75, 4, 6), Line::new(139, 5, 7), Line::new(267, 5, 8),
        Line::new(523, 6, 8), Line::new(779, 7, 9), Line::new(1291, 6, 11),
        Line::lower(-32, 9), Line::upper(3339, 9), Line::oob(2),
    ],
    // B.10
    &[
        Line::new(-21, 7, 4), Line::new(-5, 8, 0), Line::new(-4, 7, 0), Line::new(-3, 5, 0),
        Line::new(-2, 2, 2), Line::new(2, 5, 0), Line::new(3, 6, 0), Line::new(4, 7, 0),
        Line::new(5, 8, 0), Line::new(6, 2, 6), Line::new(70, 5, 5), Line::new(102, 6, 5),
        Line::new(134, 6, 6), Line::new(198, 6, 7), Line::new(326, 6, 8), Line::new(582, 6, 9),
        Line::new(1094, 6, 10), Line::new(2118, 7, 11), Line::lower(-22, 8),
        Line::upper(4166, 8), Line::oob(2),
    ],
    // B.11
    &[
        Line::new(1, 1, 0), Line::new(2, 2, 1), Line::new(4, 4, 0), Line::new(5, 4, 1),
        Line::new(7, 5, 1), Line::new(9, 5, 2), Line::new(13, 6, 2), Line::new(17, 7, 2),
        Line::new(21, 7, 3), Line::new(29, 7, 4), Line::new(45, 7, 5), Line::new(77, 7, 6),
        Line::upper(141, 7),
    ],
    // B.12
    &[
        Line::new(1, 1, 0), Line::new(2, 2, 0), Line::new(3, 3, 1), Line::new(5, 5, 0),
        Line::new(6, 5, 1), Line::new(8, 6, 1), Line::new(10, 7, 0), Line::new(11, 7, 1),
        Line::new(13, 7, 2), Line::new(17, 7, 3), Line::new(25, 7, 4), Line::new(41, 8, 5),
        Line::upper(73, 8),
    ],
    // B.13
    &[
        Line::new(1, 1, 0), Line::new(2, 3, 0), Line::new(3, 4, 0), Line::new(4, 5, 0),
        Line::new(5, 4, 1), Line::new(7, 3, 3), Line::new(15, 6, 1), Line::new(17, 6, 2),
        Line::new(21, 6, 3), Line::new(29, 6, 4), Line::new(45, 6, 5), Line::new(77, 7, 6),
        Line::upper(141, 7),
    ],
    // B.14
    &[
        Line::new(-2, 3, 0), Line::new(-1, 3, 0), Line::new(0, 1, 0), Line::new(1, 3, 0),
        Line::new(2, 3, 0),
    ],
    // B.15
    &[
        Line::new(-24, 7, 4), Line::new(-8, 6, 2), Line::new(-4, 5, 1), Line::new(-2, 4, 0),
        Line::new(-1, 3, 0), Line::new(0, 1, 0), Line::new(1, 3, 0), Line::new(2, 4, 0),
        Line::new(3, 5, 1), Line::new(5, 6, 2), Line::new(9, 7, 4), Line::lower(-25, 7),
        Line::upper(25, 7),
    ],
];
