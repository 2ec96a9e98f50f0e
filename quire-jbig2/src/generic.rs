//! Generic region segments (7.4.6) and the generic region decoding
//! procedure (6.2).

use log::trace;
use quire_common::byte::Reader;

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::{DecodeError, RegionError, Result};
use crate::region::{RegionInfo, check_dimensions, parse_region_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Template {
    T0,
    T1,
    T2,
    T3,
}

/// A pixel contributing to the context, relative to the current pixel.
#[derive(Debug, Clone, Copy)]
enum Tap {
    Fixed(i8, i8),
    /// The n-th adaptive template pixel.
    At(usize),
}

use Tap::{At, Fixed};

// Figures 3 to 6, most significant context bit first.
const TEMPLATE_0: [Tap; 16] = [
    At(3),
    Fixed(-1, -2),
    Fixed(0, -2),
    Fixed(1, -2),
    At(2),
    At(1),
    Fixed(-2, -1),
    Fixed(-1, -1),
    Fixed(0, -1),
    Fixed(1, -1),
    Fixed(2, -1),
    At(0),
    Fixed(-4, 0),
    Fixed(-3, 0),
    Fixed(-2, 0),
    Fixed(-1, 0),
];

const TEMPLATE_1: [Tap; 13] = [
    Fixed(-1, -2),
    Fixed(0, -2),
    Fixed(1, -2),
    Fixed(2, -2),
    Fixed(-2, -1),
    Fixed(-1, -1),
    Fixed(0, -1),
    Fixed(1, -1),
    Fixed(2, -1),
    At(0),
    Fixed(-3, 0),
    Fixed(-2, 0),
    Fixed(-1, 0),
];

const TEMPLATE_2: [Tap; 10] = [
    Fixed(-1, -2),
    Fixed(0, -2),
    Fixed(1, -2),
    Fixed(-2, -1),
    Fixed(-1, -1),
    Fixed(0, -1),
    Fixed(1, -1),
    At(0),
    Fixed(-2, 0),
    Fixed(-1, 0),
];

const TEMPLATE_3: [Tap; 10] = [
    Fixed(-3, -1),
    Fixed(-2, -1),
    Fixed(-1, -1),
    Fixed(0, -1),
    Fixed(1, -1),
    At(0),
    Fixed(-4, 0),
    Fixed(-3, 0),
    Fixed(-2, 0),
    Fixed(-1, 0),
];

impl Template {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::T0,
            1 => Self::T1,
            2 => Self::T2,
            _ => Self::T3,
        }
    }

    fn taps(self) -> &'static [Tap] {
        match self {
            Self::T0 => &TEMPLATE_0,
            Self::T1 => &TEMPLATE_1,
            Self::T2 => &TEMPLATE_2,
            Self::T3 => &TEMPLATE_3,
        }
    }

    pub(crate) fn context_count(self) -> usize {
        1 << self.taps().len()
    }

    fn at_pixels(self) -> usize {
        match self {
            Self::T0 => 4,
            _ => 1,
        }
    }

    /// The context used to decode SLTP (Figures 8 to 11).
    fn sltp_context(self) -> usize {
        match self {
            Self::T0 => 0b1001_1011_0010_0101,
            Self::T1 => 0b0_0111_1001_0101,
            Self::T2 => 0b00_1110_0101,
            Self::T3 => 0b01_1001_0101,
        }
    }
}

/// The coding of a generic region.
#[derive(Debug, Clone)]
enum Coding {
    Mmr,
    Arithmetic {
        template: Template,
        tpgdon: bool,
        at: Vec<(i32, i32)>,
    },
}

/// A decoded region, ready to be drawn onto the page.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    pub(crate) info: RegionInfo,
    pub(crate) bitmap: Bitmap,
}

/// Decode the data of a generic region segment.
///
/// If `unknown_length` is set, the data ends with the number of rows that
/// were actually coded (7.4.6.4).
pub(crate) fn decode_generic_region(data: &[u8], unknown_length: bool) -> Result<Region> {
    let mut reader = Reader::new(data);
    let mut info = parse_region_info(&mut reader)?;
    let flags = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;

    if flags & 0xE0 != 0 {
        return Err(RegionError::ReservedFlags.into());
    }

    let coding = if flags & 0x01 != 0 {
        Coding::Mmr
    } else {
        let template = Template::from_bits(flags >> 1);
        let at = read_at_pixels(&mut reader, template)?;

        Coding::Arithmetic {
            template,
            tpgdon: flags & 0x08 != 0,
            at,
        }
    };

    let mut encoded = reader.tail();

    if unknown_length {
        let split = encoded
            .len()
            .checked_sub(4)
            .ok_or(DecodeError::UnexpectedEof)?;
        let (head, rows) = encoded.split_at(split);
        let rows = u32::from_be_bytes([rows[0], rows[1], rows[2], rows[3]]);

        if rows > info.height {
            return Err(RegionError::InvalidDimension.into());
        }

        info.height = rows;
        encoded = head;
    }

    check_dimensions(info.width, info.height)?;
    let mut bitmap = Bitmap::new(info.width, info.height, false);

    trace!(
        "decoding {}x{} generic region with {:?}",
        info.width, info.height, coding
    );

    match coding {
        Coding::Mmr => {
            decode_mmr(&mut bitmap, encoded)?;
        }
        Coding::Arithmetic { template, tpgdon, at } => {
            let mut decoder = ArithmeticDecoder::new(encoded);
            let mut contexts = vec![Context::default(); template.context_count()];
            decode_arithmetic(
                &mut bitmap,
                &mut decoder,
                &mut contexts,
                template,
                tpgdon,
                &at,
                None,
            );
        }
    }

    Ok(Region { info, bitmap })
}

/// Read the adaptive template pixels of `template`.
pub(crate) fn read_at_pixels(reader: &mut Reader<'_>, template: Template) -> Result<Vec<(i32, i32)>> {
    let mut at = Vec::with_capacity(template.at_pixels());

    for _ in 0..template.at_pixels() {
        let x = reader.read_i8().ok_or(DecodeError::UnexpectedEof)?;
        let y = reader.read_i8().ok_or(DecodeError::UnexpectedEof)?;

        // Adaptive pixels must lie in the already decoded area.
        if y > 0 || (y == 0 && x >= 0) {
            return Err(RegionError::InvalidAtPixel.into());
        }

        at.push((i32::from(x), i32::from(y)));
    }

    Ok(at)
}

/// Writes fax rows into a bitmap, turning white pixels into 0 (6.2.6).
struct MmrSink<'a> {
    bitmap: &'a mut Bitmap,
    x: u32,
    y: u32,
}

impl quire_ccitt::Decoder for MmrSink<'_> {
    fn push_byte(&mut self, byte: u8) {
        for i in 0..8 {
            if self.x >= self.bitmap.width {
                break;
            }

            let white = byte & (0x80 >> i) != 0;
            self.bitmap.set(self.x, self.y, !white);
            self.x += 1;
        }
    }

    fn push_bytes(&mut self, byte: u8, count: usize) {
        for _ in 0..count {
            self.push_byte(byte);
        }
    }

    fn next_line(&mut self) {
        self.x = 0;
        self.y += 1;
    }
}

/// Decode MMR coded data into `bitmap`, returning the number of bytes read.
pub(crate) fn decode_mmr(bitmap: &mut Bitmap, data: &[u8]) -> Result<usize> {
    if bitmap.width == 0 || bitmap.height == 0 {
        return Ok(0);
    }

    let settings = quire_ccitt::DecodeSettings {
        strict: false,
        columns: bitmap.width,
        rows: bitmap.height,
        end_of_block: true,
        end_of_line: false,
        rows_are_byte_aligned: false,
        encoding: quire_ccitt::EncodingMode::Group4,
    };

    let mut sink = MmrSink {
        bitmap,
        x: 0,
        y: 0,
    };
    Ok(quire_ccitt::decode(data, &mut sink, &settings)?)
}

/// The arithmetic generic region decoding procedure (6.2.5.7).
///
/// Pixels set in `skip` are not coded and stay white.
pub(crate) fn decode_arithmetic(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    contexts: &mut [Context],
    template: Template,
    tpgdon: bool,
    at: &[(i32, i32)],
    skip: Option<&Bitmap>,
) {
    let taps = template.taps();
    let mut ltp = false;

    for y in 0..bitmap.height {
        if tpgdon {
            ltp ^= decoder.decode(&mut contexts[template.sltp_context()]) == 1;
        }

        if ltp {
            // Typical row: a copy of the row above, or white for the first row.
            if y > 0 {
                bitmap.copy_row(y - 1, y);
            }
            continue;
        }

        for x in 0..bitmap.width {
            if skip.is_some_and(|skip| skip.get(i64::from(x), i64::from(y))) {
                bitmap.set(x, y, false);
                continue;
            }

            let cx = gather_context(bitmap, i64::from(x), i64::from(y), taps, at);
            let pixel = decoder.decode(&mut contexts[cx]);
            bitmap.set(x, y, pixel == 1);
        }
    }
}

fn gather_context(bitmap: &Bitmap, x: i64, y: i64, taps: &[Tap], at: &[(i32, i32)]) -> usize {
    taps.iter().fold(0, |cx, tap| {
        let (dx, dy) = match *tap {
            Fixed(dx, dy) => (i32::from(dx), i32::from(dy)),
            At(n) => at[n],
        };

        (cx << 1) | usize::from(bitmap.get(x + i64::from(dx), y + i64::from(dy)))
    })
}

/// Encode `bitmap` without typical prediction, mirroring [`decode_arithmetic`].
#[cfg(test)]
pub(crate) fn encode_arithmetic(
    bitmap: &Bitmap,
    encoder: &mut crate::arithmetic_decoder::ArithmeticEncoder,
    contexts: &mut [Context],
    template: Template,
    at: &[(i32, i32)],
) {
    for y in 0..bitmap.height {
        for x in 0..bitmap.width {
            let (x, y) = (i64::from(x), i64::from(y));
            let cx = gather_context(bitmap, x, y, template.taps(), at);
            encoder.encode(&mut contexts[cx], u8::from(bitmap.get(x, y)));
        }
    }
}
