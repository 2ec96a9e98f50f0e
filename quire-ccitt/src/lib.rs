/*!
A decoder for CCITT fax-encoded bitmaps (ITU-T T.4 and T.6).

Group 3 one-dimensional, Group 3 mixed one/two-dimensional and Group 4
streams are supported. Decoded pixels are packed MSB-first into bytes and
handed to a [`Decoder`] sink row by row, where a set bit is a white pixel.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

mod decode;
mod states;

use crate::decode::CodeReader;
use crate::states::{EOFB, EOL, Mode};
use log::{trace, warn};
use quire_common::bit::BitReader;
use std::fmt;
use std::iter;

/// The coding scheme of a fax stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncodingMode {
    /// Pure two-dimensional coding without EOL codes (`K < 0`).
    Group4,
    /// Pure one-dimensional coding (`K = 0`).
    Group3_1D,
    /// Mixed coding (`K > 0`): every line is preceded by a tag bit that
    /// selects one- or two-dimensional coding.
    Group3_2D {
        /// At most `k - 1` lines are coded two-dimensionally after a
        /// one-dimensional line.
        k: u32,
    },
}

/// Parameters that describe a fax stream.
#[derive(Copy, Clone, Debug)]
pub struct DecodeSettings {
    /// Fail on lines that are longer or shorter than `columns` instead of
    /// clamping them.
    pub strict: bool,
    /// The width of the bitmap in pixels.
    pub columns: u32,
    /// The expected number of rows, or 0 if unknown.
    pub rows: u32,
    /// Whether the data is terminated by an end-of-facsimile-block marker.
    pub end_of_block: bool,
    /// Whether lines are prefixed with EOL codes.
    pub end_of_line: bool,
    /// Whether every line starts at a byte boundary.
    pub rows_are_byte_aligned: bool,
    /// The coding scheme.
    pub encoding: EncodingMode,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            strict: false,
            columns: 1728,
            rows: 0,
            end_of_block: true,
            end_of_line: false,
            rows_are_byte_aligned: false,
            encoding: EncodingMode::Group3_1D,
        }
    }
}

/// A sink for decoded pixel data.
pub trait Decoder {
    /// Push a single packed byte. Each bit is a pixel (1 = white, 0 = black).
    fn push_byte(&mut self, byte: u8);
    /// Push `count` copies of the same packed byte.
    fn push_bytes(&mut self, byte: u8, count: usize);
    /// Called after the last byte of a row was pushed.
    fn next_line(&mut self);
}

/// A [`Decoder`] that collects all rows into one buffer.
#[derive(Debug, Default, Clone)]
pub struct PackedBitmap {
    /// The packed rows, each padded to a whole byte.
    pub data: Vec<u8>,
    /// The number of completed rows.
    pub rows: u32,
}

impl Decoder for PackedBitmap {
    fn push_byte(&mut self, byte: u8) {
        self.data.push(byte);
    }

    fn push_bytes(&mut self, byte: u8, count: usize) {
        self.data.extend(iter::repeat_n(byte, count));
    }

    fn next_line(&mut self) {
        self.rows += 1;
    }
}

/// An error that aborted decoding.
///
/// All rows completed before the error have already been pushed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The data ended in the middle of a code.
    UnexpectedEof,
    /// A bit sequence does not match any code.
    InvalidCode,
    /// A run length overflowed.
    Overflow,
    /// A changing element fell outside of the line.
    InvalidPosition,
    /// A line did not have the expected width.
    LineLength,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of data"),
            Self::InvalidCode => write!(f, "invalid code"),
            Self::Overflow => write!(f, "run length overflow"),
            Self::InvalidPosition => write!(f, "changing element outside of line"),
            Self::LineLength => write!(f, "line has wrong length"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode `data` into `decoder`.
///
/// Returns the number of bytes consumed.
pub fn decode(
    data: &[u8],
    decoder: &mut impl Decoder,
    settings: &DecodeSettings,
) -> Result<usize, DecodeError> {
    if settings.columns == 0 {
        return Err(DecodeError::LineLength);
    }

    let mut ctx = DecoderContext::new(decoder, settings);
    let mut reader = BitReader::new(data);

    match settings.encoding {
        EncodingMode::Group4 => decode_group4(&mut ctx, &mut reader)?,
        EncodingMode::Group3_1D => decode_group3_1d(&mut ctx, &mut reader)?,
        EncodingMode::Group3_2D { .. } => decode_group3_2d(&mut ctx, &mut reader)?,
    }

    trace!("decoded {} fax rows", ctx.decoded_rows);

    reader.align();
    Ok(reader.byte_pos())
}

fn decode_group3_1d<T: Decoder>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<(), DecodeError> {
    // Producers are sloppy with the `EndOfLine` flag, so always accept one.
    reader.skip_eols();

    loop {
        if ctx.all_rows_decoded() || only_padding_left(reader) {
            break;
        }

        decode_1d_line(ctx, reader)?;

        // Six consecutive EOLs are the return-to-control sequence.
        if reader.skip_eols() >= 6 {
            break;
        }
    }

    Ok(())
}

fn decode_group3_2d<T: Decoder>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<(), DecodeError> {
    loop {
        if ctx.all_rows_decoded() {
            break;
        }

        let eols = reader.skip_eols();

        if only_padding_left(reader) {
            break;
        }

        let one_dimensional = reader.next_bit()?;

        // An EOL with tag bit 1 directly followed by another EOL can only be
        // the return-to-control sequence.
        if eols > 0 && one_dimensional && reader.peek(12) == Some(EOL) {
            break;
        }

        if one_dimensional {
            decode_1d_line(ctx, reader)?;
        } else {
            decode_2d_line(ctx, reader)?;
        }
    }

    Ok(())
}

fn decode_group4<T: Decoder>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<(), DecodeError> {
    loop {
        if ctx.settings.end_of_block && reader.peek(24) == Some(EOFB) {
            reader.skip(24);
            break;
        }

        if ctx.all_rows_decoded() || only_padding_left(reader) {
            break;
        }

        decode_2d_line(ctx, reader)?;
    }

    Ok(())
}

fn decode_1d_line<T: Decoder>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<(), DecodeError> {
    while ctx.a0().unwrap_or(0) < ctx.max_idx {
        let run = reader.decode_run(ctx.is_white)?;
        ctx.push_pixels(run)?;
        ctx.is_white = !ctx.is_white;
    }

    ctx.maybe_finish_line(reader)
}

fn decode_2d_line<T: Decoder>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<(), DecodeError> {
    let row = ctx.decoded_rows;
    ctx.start_run();

    while ctx.decoded_rows == row {
        match reader.decode_mode()? {
            // No color change happens in pass mode.
            Mode::Pass => {
                let a0 = ctx.a0().unwrap_or(0);
                ctx.push_pixels(ctx.b2.checked_sub(a0).ok_or(DecodeError::InvalidPosition)?)?;
            }
            Mode::Horizontal => {
                for _ in 0..2 {
                    let run = reader.decode_run(ctx.is_white)?;
                    ctx.push_pixels(run)?;
                    ctx.is_white = !ctx.is_white;
                }
            }
            Mode::Vertical(i) => {
                let a1 = ctx
                    .b1
                    .checked_add_signed(i as isize)
                    .ok_or(DecodeError::InvalidPosition)?;
                let a0 = ctx.a0().unwrap_or(0);

                ctx.push_pixels(a1.checked_sub(a0).ok_or(DecodeError::InvalidPosition)?)?;
                ctx.is_white = !ctx.is_white;
            }
        }

        ctx.maybe_finish_line(reader)?;
    }

    Ok(())
}

fn only_padding_left(reader: &BitReader<'_>) -> bool {
    if reader.at_end() {
        return true;
    }

    let mut rest = reader.clone();

    while let Some(bit) = rest.read_bit() {
        if bit != 0 {
            return false;
        }
    }

    true
}

/// Packs single pixels into bytes, MSB-first.
#[derive(Default)]
struct BitPacker {
    buffer: u8,
    count: u8,
}

impl BitPacker {
    fn push_bit(&mut self, white: bool) -> Option<u8> {
        self.buffer = (self.buffer << 1) | u8::from(white);
        self.count += 1;

        if self.count == 8 {
            let byte = self.buffer;
            self.buffer = 0;
            self.count = 0;

            Some(byte)
        } else {
            None
        }
    }

    fn has_pending(&self) -> bool {
        self.count > 0
    }

    fn flush(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }

        let padded = self.buffer << (8 - self.count);
        self.buffer = 0;
        self.count = 0;

        Some(padded)
    }
}

struct DecoderContext<'a, T: Decoder> {
    /// The colors of the previous line, 1 for black.
    reference_line: Vec<u8>,
    /// The colors decoded so far on the current line.
    coding_line: Vec<u8>,
    decoder: &'a mut T,
    packer: BitPacker,
    /// The first changing element on the reference line right of a0 with the
    /// opposite color of a0.
    b1: usize,
    /// The next changing element right of b1 on the reference line.
    b2: usize,
    max_idx: usize,
    is_white: bool,
    decoded_rows: u32,
    settings: &'a DecodeSettings,
}

impl<'a, T: Decoder> DecoderContext<'a, T> {
    fn new(decoder: &'a mut T, settings: &'a DecodeSettings) -> Self {
        let max_idx = settings.columns as usize;

        Self {
            // The reference line of the first row is an imaginary white line.
            // One extra slot keeps `find_b2` in bounds when b1 hits the end.
            reference_line: vec![0; max_idx + 1],
            coding_line: Vec::with_capacity(max_idx + 1),
            decoder,
            packer: BitPacker::default(),
            b1: max_idx,
            b2: max_idx,
            max_idx,
            is_white: true,
            decoded_rows: 0,
            settings,
        }
    }

    fn all_rows_decoded(&self) -> bool {
        self.settings.rows > 0 && self.decoded_rows >= self.settings.rows
    }

    /// The position of the next pixel to decode, or `None` before the first
    /// pixel of the line.
    fn a0(&self) -> Option<usize> {
        if self.coding_line.is_empty() {
            None
        } else {
            Some(self.coding_line.len())
        }
    }

    fn cur_color(&self) -> u8 {
        u8::from(!self.is_white)
    }

    fn find_b1(&mut self) {
        let target_color = self.cur_color() ^ 1;

        let (start, mut last_color) = match self.a0() {
            Some(a0) => (a0 + 1, self.reference_line[a0.min(self.max_idx)]),
            None => (0, 0),
        };

        self.b1 = start.min(self.max_idx);

        while self.b1 < self.max_idx {
            let color = self.reference_line[self.b1];

            if color != last_color && color == target_color {
                break;
            }

            last_color = color;
            self.b1 += 1;
        }
    }

    fn find_b2(&mut self) {
        self.b2 = self.b1;
        let b1_color = self.reference_line[self.b1];

        while self.b2 < self.max_idx && self.reference_line[self.b2] == b1_color {
            self.b2 += 1;
        }
    }

    fn start_run(&mut self) {
        self.find_b1();
        self.find_b2();
    }

    fn push_pixels(&mut self, count: usize) -> Result<(), DecodeError> {
        let room = self.max_idx - self.coding_line.len();

        let count = if count > room {
            if self.settings.strict {
                return Err(DecodeError::LineLength);
            }

            warn!("fax run exceeds line width, clamping");
            room
        } else {
            count
        };

        let white = self.is_white;
        let mut remaining = count;

        while self.packer.has_pending() && remaining > 0 {
            if let Some(byte) = self.packer.push_bit(white) {
                self.decoder.push_byte(byte);
            }

            remaining -= 1;
        }

        let full_bytes = remaining / 8;

        if full_bytes > 0 {
            let fill = if white { 0xFF } else { 0x00 };
            self.decoder.push_bytes(fill, full_bytes);
            remaining %= 8;
        }

        for _ in 0..remaining {
            if let Some(byte) = self.packer.push_bit(white) {
                self.decoder.push_byte(byte);
            }
        }

        let color = self.cur_color();
        self.coding_line.extend(iter::repeat_n(color, count));

        Ok(())
    }

    /// Move to the next row if the current one is complete, otherwise
    /// recompute b1 and b2 for the next run.
    fn maybe_finish_line(&mut self, reader: &mut BitReader<'_>) -> Result<(), DecodeError> {
        if self.a0().unwrap_or(0) < self.max_idx {
            self.start_run();

            return Ok(());
        }

        if let Some(byte) = self.packer.flush() {
            self.decoder.push_byte(byte);
        }

        std::mem::swap(&mut self.reference_line, &mut self.coding_line);
        self.reference_line.resize(self.max_idx + 1, 0);
        self.coding_line.clear();
        self.is_white = true;
        self.decoded_rows += 1;
        self.decoder.next_line();

        if self.settings.rows_are_byte_aligned {
            reader.align();
        }

        self.start_run();

        Ok(())
    }
}
