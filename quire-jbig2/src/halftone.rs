//! Pattern dictionary segments (7.4.4), halftone region segments (7.4.5)
//! and the gray-scale image decoding procedure (Annex C).

use log::trace;
use quire_common::byte::Reader;

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::{DecodeError, RegionError, Result};
use crate::generic::{Region, Template, decode_arithmetic, decode_mmr};
use crate::region::{CombinationOperator, check_dimensions, parse_region_info};

/// A decoded pattern dictionary.
#[derive(Debug, Clone)]
pub(crate) struct PatternDictionary {
    /// Patterns indexed by gray-scale value.
    pub(crate) patterns: Vec<Bitmap>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// Decode a pattern dictionary segment (6.7).
pub(crate) fn decode_pattern_dictionary(data: &[u8]) -> Result<PatternDictionary> {
    let mut reader = Reader::new(data);
    let flags = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;
    let width = u32::from(reader.read_byte().ok_or(DecodeError::UnexpectedEof)?);
    let height = u32::from(reader.read_byte().ok_or(DecodeError::UnexpectedEof)?);
    let gray_max = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;

    if width == 0 || height == 0 {
        return Err(RegionError::InvalidDimension.into());
    }

    let count = gray_max.checked_add(1).ok_or(DecodeError::Overflow)?;
    let collective_width = count.checked_mul(width).ok_or(DecodeError::Overflow)?;
    check_dimensions(collective_width, height)?;

    let mmr = flags & 0x01 != 0;
    let template = Template::from_bits(flags >> 1);

    trace!(
        "decoding pattern dictionary with {count} {width}x{height} patterns, mmr: {mmr}"
    );

    let mut collective = Bitmap::new(collective_width, height, false);

    if mmr {
        decode_mmr(&mut collective, reader.tail())?;
    } else {
        // The first adaptive pixel points at the previous pattern.
        let previous = -(width as i32);
        let at: &[(i32, i32)] = match template {
            Template::T0 => &[(previous, 0), (-3, -1), (2, -2), (-2, -2)],
            _ => &[(previous, 0)],
        };

        let mut decoder = ArithmeticDecoder::new(reader.tail());
        let mut contexts = vec![Context::default(); template.context_count()];
        decode_arithmetic(
            &mut collective,
            &mut decoder,
            &mut contexts,
            template,
            false,
            at,
            None,
        );
    }

    let patterns = (0..count)
        .map(|gray| collective.crop(gray * width, 0, width, height))
        .collect();

    Ok(PatternDictionary {
        patterns,
        width,
        height,
    })
}

/// The halftone grid (7.4.5.1.2 and 7.4.5.1.3).
#[derive(Debug, Clone, Copy)]
struct Grid {
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    /// The grid vector, in 1/256 pixels.
    rx: u16,
    ry: u16,
}

impl Grid {
    /// The top left corner of cell `(m, n)`, `m` being the row (6.6.5.2).
    fn cell(&self, m: u32, n: u32) -> (i64, i64) {
        let (m, n) = (i64::from(m), i64::from(n));
        let (rx, ry) = (i64::from(self.rx), i64::from(self.ry));

        let x = (i64::from(self.x) + m * ry + n * rx) >> 8;
        let y = (i64::from(self.y) + m * rx - n * ry) >> 8;

        (x, y)
    }

    /// Mark the cells whose pattern lies completely outside of a
    /// `region_width` x `region_height` region (6.6.5.1).
    fn skip_cells(&self, patterns: &PatternDictionary, region_width: u32, region_height: u32) -> Bitmap {
        let mut skip = Bitmap::new(self.width, self.height, false);
        let (pw, ph) = (i64::from(patterns.width), i64::from(patterns.height));
        let (rw, rh) = (i64::from(region_width), i64::from(region_height));

        for m in 0..self.height {
            for n in 0..self.width {
                let (x, y) = self.cell(m, n);
                let outside = x + pw <= 0 || x >= rw || y + ph <= 0 || y >= rh;
                skip.set(n, m, outside);
            }
        }

        skip
    }
}

/// How the gray-scale image of a halftone region is coded.
#[derive(Debug, Clone, Copy)]
struct GrayScale {
    mmr: bool,
    template: Template,
    bits_per_pixel: u32,
}

impl GrayScale {
    /// The adaptive pixels of the bit planes (C.5).
    fn at_pixels(self) -> &'static [(i32, i32)] {
        match self.template {
            Template::T0 => &[(3, -1), (-3, -1), (2, -2), (-2, -2)],
            Template::T1 => &[(3, -1)],
            _ => &[(2, -1)],
        }
    }

    /// Decode a `width` x `height` image of gray-scale values (C.5).
    ///
    /// Bit planes are Gray coded, most significant plane first.
    fn decode(self, data: &[u8], width: u32, height: u32, skip: Option<&Bitmap>) -> Result<Vec<u32>> {
        let mut values = vec![0_u32; width as usize * height as usize];
        let mut previous: Option<Bitmap> = None;

        let mut offset = 0;
        let mut decoder = ArithmeticDecoder::new(data);
        let mut contexts = vec![Context::default(); self.template.context_count()];

        for bit in (0..self.bits_per_pixel).rev() {
            let mut plane = Bitmap::new(width, height, false);

            if self.mmr {
                let tail = data.get(offset..).ok_or(DecodeError::UnexpectedEof)?;
                offset += decode_mmr(&mut plane, tail)?;
            } else {
                decode_arithmetic(
                    &mut plane,
                    &mut decoder,
                    &mut contexts,
                    self.template,
                    false,
                    self.at_pixels(),
                    skip,
                );
            }

            if let Some(previous) = &previous {
                for (pixel, above) in plane.data.iter_mut().zip(&previous.data) {
                    *pixel ^= *above;
                }
            }

            for (value, pixel) in values.iter_mut().zip(&plane.data) {
                *value |= u32::from(*pixel) << bit;
            }

            previous = Some(plane);
        }

        Ok(values)
    }
}

/// The number of bits needed for the index of `count` patterns, at least 1.
fn bits_per_pixel(count: usize) -> u32 {
    let mut bits = 1;
    while bits < 32 && (1_u64 << bits) < count as u64 {
        bits += 1;
    }
    bits
}

/// Decode a halftone region segment with the patterns of the referred
/// dictionary (6.6).
pub(crate) fn decode_halftone_region(data: &[u8], patterns: &PatternDictionary) -> Result<Region> {
    let mut reader = Reader::new(data);
    let info = parse_region_info(&mut reader)?;
    let flags = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;

    let mmr = flags & 0x01 != 0;
    let template = Template::from_bits(flags >> 1);
    let enable_skip = flags & 0x08 != 0;
    let operator =
        CombinationOperator::from_bits((flags >> 4) & 0x07).ok_or(RegionError::ReservedFlags)?;
    let default_pixel = flags & 0x80 != 0;

    let grid = Grid {
        width: reader.read_u32().ok_or(DecodeError::UnexpectedEof)?,
        height: reader.read_u32().ok_or(DecodeError::UnexpectedEof)?,
        x: reader.read_i32().ok_or(DecodeError::UnexpectedEof)?,
        y: reader.read_i32().ok_or(DecodeError::UnexpectedEof)?,
        rx: reader.read_u16().ok_or(DecodeError::UnexpectedEof)?,
        ry: reader.read_u16().ok_or(DecodeError::UnexpectedEof)?,
    };

    check_dimensions(info.width, info.height)?;
    check_dimensions(grid.width, grid.height)?;

    if patterns.patterns.is_empty() {
        return Err(RegionError::InvalidDimension.into());
    }

    trace!(
        "decoding {}x{} halftone region with a {}x{} grid of {} patterns",
        info.width,
        info.height,
        grid.width,
        grid.height,
        patterns.patterns.len()
    );

    let mut bitmap = Bitmap::new(info.width, info.height, default_pixel);
    let skip = enable_skip.then(|| grid.skip_cells(patterns, info.width, info.height));

    let gray_scale = GrayScale {
        mmr,
        template,
        bits_per_pixel: bits_per_pixel(patterns.patterns.len()),
    };
    let values = gray_scale.decode(reader.tail(), grid.width, grid.height, skip.as_ref())?;

    // Values beyond the dictionary use its last pattern.
    let last = patterns.patterns.len() - 1;

    for m in 0..grid.height {
        for n in 0..grid.width {
            let value = values[m as usize * grid.width as usize + n as usize] as usize;
            let pattern = &patterns.patterns[value.min(last)];
            let (x, y) = grid.cell(m, n);
            bitmap.combine_at(pattern, x, y, operator);
        }
    }

    Ok(Region { info, bitmap })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arithmetic_decoder::ArithmeticEncoder;
    use crate::generic::encode_arithmetic;
    use crate::text::tests::{bitmap, rows};

    fn dictionary(patterns: &[&[&str]]) -> PatternDictionary {
        let patterns: Vec<Bitmap> = patterns.iter().map(|rows| bitmap(2, rows)).collect();

        PatternDictionary {
            patterns,
            width: 2,
            height: 2,
        }
    }

    /// Encode gray-scale values as Gray coded bit planes, most significant
    /// plane first.
    pub(crate) fn encode_gray_scale(values: &[u32], width: u32, bits: u32) -> Vec<u8> {
        let height = values.len() as u32 / width;
        let at = [(3, -1), (-3, -1), (2, -2), (-2, -2)];
        let mut encoder = ArithmeticEncoder::new();
        let mut contexts = vec![Context::default(); Template::T0.context_count()];

        for bit in (0..bits).rev() {
            let mut plane = Bitmap::new(width, height, false);
            for (i, value) in values.iter().enumerate() {
                let coded = (value >> bit) ^ (value >> (bit + 1));
                plane.data[i] = coded & 1 == 1;
            }
            encode_arithmetic(&plane, &mut encoder, &mut contexts, Template::T0, &at);
        }

        encoder.finish()
    }

    fn halftone_segment(flags: u8, grid: (u32, u32, i32, u16), data: &[u8]) -> Vec<u8> {
        let (width, height, x, rx) = grid;
        let mut out = Vec::new();
        out.extend(4_u32.to_be_bytes());
        out.extend(4_u32.to_be_bytes());
        out.extend(0_u32.to_be_bytes());
        out.extend(0_u32.to_be_bytes());
        out.push(0x00);
        out.push(flags);
        out.extend(width.to_be_bytes());
        out.extend(height.to_be_bytes());
        out.extend(x.to_be_bytes());
        out.extend(0_i32.to_be_bytes());
        out.extend(rx.to_be_bytes());
        out.extend(0_u16.to_be_bytes());
        out.extend(data);
        out
    }

    #[test]
    fn pattern_dictionary_splits_collective_bitmap() {
        let collective = bitmap(6, &["#.##..", "..##.#"]);
        let at = [(-2, 0), (-3, -1), (2, -2), (-2, -2)];

        let mut encoder = ArithmeticEncoder::new();
        let mut contexts = vec![Context::default(); Template::T0.context_count()];
        encode_arithmetic(&collective, &mut encoder, &mut contexts, Template::T0, &at);

        let mut data = vec![0x00, 2, 2];
        data.extend(2_u32.to_be_bytes());
        data.extend(encoder.finish());

        let dictionary = decode_pattern_dictionary(&data).unwrap();
        assert_eq!(
            dictionary.patterns,
            [
                bitmap(2, &["#.", ".."]),
                bitmap(2, &["##", "##"]),
                bitmap(2, &["..", ".#"]),
            ]
        );
    }

    #[test]
    fn empty_patterns_are_rejected() {
        let mut data = vec![0x00, 0, 2];
        data.extend(0_u32.to_be_bytes());

        assert!(matches!(
            decode_pattern_dictionary(&data),
            Err(DecodeError::Region(RegionError::InvalidDimension))
        ));
    }

    #[test]
    fn halftone_grid_of_patterns() {
        let patterns = dictionary(&[
            &["..", ".."],
            &["#.", ".."],
            &["##", ".."],
            &["##", "##"],
        ]);

        // A 2x2 grid with cells two pixels apart.
        let data = encode_gray_scale(&[0, 1, 2, 3], 2, 2);
        let segment = halftone_segment(0x00, (2, 2, 0, 512), &data);

        let region = decode_halftone_region(&segment, &patterns).unwrap();
        assert_eq!(rows(&region.bitmap), ["..#.", "....", "####", "..##"]);

        // With three patterns the largest value falls back to the last one.
        let mut patterns = patterns;
        patterns.patterns.pop();
        let region = decode_halftone_region(&segment, &patterns).unwrap();
        assert_eq!(rows(&region.bitmap), ["..#.", "....", "####", "...."]);
    }

    #[test]
    fn cells_outside_the_region_are_skipped() {
        let patterns = dictionary(&[&["..", ".."], &["##", "##"]]);
        let grid = Grid {
            width: 4,
            height: 1,
            x: -3 * 256,
            y: 0,
            rx: 512,
            ry: 0,
        };

        let skip = grid.skip_cells(&patterns, 3, 4);
        assert_eq!(skip.data, [true, false, false, true]);
    }

    #[test]
    fn grid_vector_rotates_rows() {
        let grid = Grid {
            width: 2,
            height: 2,
            x: 256,
            y: 512,
            rx: 256,
            ry: 128,
        };

        assert_eq!(grid.cell(0, 0), (1, 2));
        assert_eq!(grid.cell(0, 1), (2, 1));
        assert_eq!(grid.cell(1, 0), (1, 3));
        assert_eq!(grid.cell(1, 1), (2, 2));
    }

    #[test]
    fn index_width_of_pattern_counts() {
        assert_eq!(bits_per_pixel(1), 1);
        assert_eq!(bits_per_pixel(2), 1);
        assert_eq!(bits_per_pixel(3), 2);
        assert_eq!(bits_per_pixel(4), 2);
        assert_eq!(bits_per_pixel(5), 3);
        assert_eq!(bits_per_pixel(256), 8);
    }

    #[test]
    fn reserved_combination_operator() {
        let patterns = dictionary(&[&["..", ".."]]);
        let segment = halftone_segment(0x50, (1, 1, 0, 512), &[]);

        assert!(matches!(
            decode_halftone_region(&segment, &patterns),
            Err(DecodeError::Region(RegionError::ReservedFlags))
        ));
    }
}
