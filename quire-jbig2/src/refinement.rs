//! Generic refinement region segments (7.4.7) and the refinement decoding
//! procedure (6.3).

use log::trace;
use quire_common::byte::Reader;

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::{DecodeError, RegionError, Result};
use crate::generic::Region;
use crate::region::{RegionInfo, check_dimensions, parse_region_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefinementTemplate {
    T0,
    T1,
}

/// Where a context pixel is taken from.
#[derive(Debug, Clone, Copy)]
enum Tap {
    /// The bitmap being decoded.
    Current(i8, i8),
    /// The reference bitmap, relative to the corresponding pixel.
    Reference(i8, i8),
    /// The first adaptive pixel, in the bitmap being decoded.
    CurrentAt,
    /// The second adaptive pixel, in the reference bitmap.
    ReferenceAt,
}

use Tap::{Current, CurrentAt, Reference, ReferenceAt};

// Figures 12 and 13, most significant context bit first.
const TEMPLATE_0: [Tap; 13] = [
    CurrentAt,
    Current(0, -1),
    Current(1, -1),
    Current(-1, 0),
    ReferenceAt,
    Reference(0, -1),
    Reference(1, -1),
    Reference(-1, 0),
    Reference(0, 0),
    Reference(1, 0),
    Reference(-1, 1),
    Reference(0, 1),
    Reference(1, 1),
];

const TEMPLATE_1: [Tap; 10] = [
    Current(-1, -1),
    Current(0, -1),
    Current(1, -1),
    Current(-1, 0),
    Reference(0, -1),
    Reference(-1, 0),
    Reference(0, 0),
    Reference(1, 0),
    Reference(0, 1),
    Reference(1, 1),
];

impl RefinementTemplate {
    pub(crate) fn from_bit(bit: bool) -> Self {
        if bit { Self::T1 } else { Self::T0 }
    }

    fn taps(self) -> &'static [Tap] {
        match self {
            Self::T0 => &TEMPLATE_0,
            Self::T1 => &TEMPLATE_1,
        }
    }

    pub(crate) fn context_count(self) -> usize {
        1 << self.taps().len()
    }

    /// The context used to decode SLTP (Figures 14 and 15).
    fn sltp_context(self) -> usize {
        match self {
            Self::T0 => 0b0_0000_0001_0000,
            Self::T1 => 0b00_0000_1000,
        }
    }
}

/// The parameters of one refinement decoding pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Refinement<'a> {
    pub(crate) template: RefinementTemplate,
    /// The adaptive pixels, only used by template 0.
    pub(crate) at: [(i32, i32); 2],
    pub(crate) reference: &'a Bitmap,
    /// The offset of the reference relative to the refined bitmap.
    pub(crate) dx: i32,
    pub(crate) dy: i32,
    pub(crate) tpgron: bool,
}

/// Read the two adaptive pixels of refinement template 0.
pub(crate) fn read_at_pixels(reader: &mut Reader<'_>) -> Result<[(i32, i32); 2]> {
    let mut at = [(0, 0); 2];

    for pixel in &mut at {
        let x = reader.read_i8().ok_or(DecodeError::UnexpectedEof)?;
        let y = reader.read_i8().ok_or(DecodeError::UnexpectedEof)?;
        *pixel = (i32::from(x), i32::from(y));
    }

    // Only the pixel in the bitmap being decoded has to precede the current one.
    let (x, y) = at[0];
    if y > 0 || (y == 0 && x >= 0) {
        return Err(RegionError::InvalidAtPixel.into());
    }

    Ok(at)
}

/// The refinement decoding procedure (6.3.5.6).
pub(crate) fn decode_refinement(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    contexts: &mut [Context],
    params: &Refinement<'_>,
) {
    let mut ltp = false;

    for y in 0..bitmap.height {
        if params.tpgron {
            ltp ^= decoder.decode(&mut contexts[params.template.sltp_context()]) == 1;
        }

        for x in 0..bitmap.width {
            let (x64, y64) = (i64::from(x), i64::from(y));

            if ltp && let Some(value) = typical_value(params, x64, y64) {
                bitmap.set(x, y, value);
                continue;
            }

            let cx = gather_context(bitmap, params, x64, y64);
            bitmap.set(x, y, decoder.decode(&mut contexts[cx]) == 1);
        }
    }
}

/// The value of a pixel whose 3x3 reference neighborhood is uniform.
fn typical_value(params: &Refinement<'_>, x: i64, y: i64) -> Option<bool> {
    let rx = x - i64::from(params.dx);
    let ry = y - i64::from(params.dy);
    let center = params.reference.get(rx, ry);

    let uniform = (-1..=1)
        .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
        .all(|(dx, dy)| params.reference.get(rx + dx, ry + dy) == center);

    uniform.then_some(center)
}

fn gather_context(bitmap: &Bitmap, params: &Refinement<'_>, x: i64, y: i64) -> usize {
    let rx = x - i64::from(params.dx);
    let ry = y - i64::from(params.dy);
    let [(ax1, ay1), (ax2, ay2)] = params.at;

    params.template.taps().iter().fold(0, |cx, tap| {
        let pixel = match *tap {
            Current(dx, dy) => bitmap.get(x + i64::from(dx), y + i64::from(dy)),
            Reference(dx, dy) => params.reference.get(rx + i64::from(dx), ry + i64::from(dy)),
            CurrentAt => bitmap.get(x + i64::from(ax1), y + i64::from(ay1)),
            ReferenceAt => params.reference.get(rx + i64::from(ax2), ry + i64::from(ay2)),
        };

        (cx << 1) | usize::from(pixel)
    })
}

/// A parsed refinement region segment, waiting for its reference.
#[derive(Debug, Clone)]
pub(crate) struct RefinementRegion<'a> {
    pub(crate) info: RegionInfo,
    template: RefinementTemplate,
    tpgron: bool,
    at: [(i32, i32); 2],
    data: &'a [u8],
}

impl<'a> RefinementRegion<'a> {
    /// Parse the header of a refinement region segment (7.4.7.1).
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let info = parse_region_info(&mut reader)?;
        let flags = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;

        if flags & 0xFC != 0 {
            return Err(RegionError::ReservedFlags.into());
        }

        let template = RefinementTemplate::from_bit(flags & 0x01 != 0);
        let at = match template {
            RefinementTemplate::T0 => read_at_pixels(&mut reader)?,
            RefinementTemplate::T1 => [(0, 0); 2],
        };

        Ok(Self {
            info,
            template,
            tpgron: flags & 0x02 != 0,
            at,
            data: reader.tail(),
        })
    }

    /// Refine `reference`, whose top left corner is at `origin` on the page.
    pub(crate) fn decode(&self, reference: &Bitmap, origin: (u32, u32)) -> Result<Region> {
        let info = &self.info;
        check_dimensions(info.width, info.height)?;

        if info.width > reference.width || info.height > reference.height {
            return Err(RegionError::ReferenceTooSmall.into());
        }

        let offset = |reference: u32, region: u32| {
            i32::try_from(i64::from(reference) - i64::from(region)).map_err(|_| DecodeError::Overflow)
        };

        let params = Refinement {
            template: self.template,
            at: self.at,
            reference,
            dx: offset(origin.0, info.x)?,
            dy: offset(origin.1, info.y)?,
            tpgron: self.tpgron,
        };

        trace!(
            "refining {}x{} region with {:?}",
            info.width, info.height, self.template
        );

        let mut bitmap = Bitmap::new(info.width, info.height, false);
        let mut decoder = ArithmeticDecoder::new(self.data);
        let mut contexts = vec![Context::default(); self.template.context_count()];
        decode_refinement(&mut bitmap, &mut decoder, &mut contexts, &params);

        Ok(Region {
            info: info.clone(),
            bitmap,
        })
    }
}

/// Encode `bitmap` against a reference, mirroring [`decode_refinement`]
/// without typical prediction.
#[cfg(test)]
pub(crate) fn encode_refinement(
    bitmap: &Bitmap,
    encoder: &mut crate::arithmetic_decoder::ArithmeticEncoder,
    contexts: &mut [Context],
    params: &Refinement<'_>,
) {
    for y in 0..bitmap.height {
        for x in 0..bitmap.width {
            let (x, y) = (i64::from(x), i64::from(y));
            let cx = gather_context(bitmap, params, x, y);
            encoder.encode(&mut contexts[cx], u8::from(bitmap.get(x, y)));
        }
    }
}
