//! Undoing the predictors of the LZW and Flate filters.

use crate::filter::{DecodeResult, Failure};
use crate::object::Dict;
use crate::object::keys::{BITS_PER_COMPONENT, COLORS, COLUMNS, EARLY_CHANGE, PREDICTOR};
use log::warn;
use quire_common::bit::{BitReader, BitWriter, bit_mask};

pub(crate) struct PredictorParams {
    predictor: u8,
    colors: u8,
    bits_per_component: u8,
    columns: usize,
    pub(crate) early_change: bool,
}

impl PredictorParams {
    fn bits_per_pixel(&self) -> usize {
        self.bits_per_component as usize * self.colors as usize
    }

    fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel().div_ceil(8)
    }

    fn row_length_in_bytes(&self) -> Option<usize> {
        Some(self.columns.checked_mul(self.bits_per_pixel())?.div_ceil(8))
    }

    pub(crate) fn from_params(dict: &Dict) -> Self {
        let small = |key: &[u8], default: u8| {
            dict.get_i64(key)
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(default)
        };

        Self {
            predictor: small(PREDICTOR, 1),
            colors: small(COLORS, 1),
            bits_per_component: small(BITS_PER_COMPONENT, 8),
            columns: dict
                .get_i64(COLUMNS)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(1),
            early_change: dict.get_i64(EARLY_CHANGE).is_none_or(|e| e != 0),
        }
    }
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: true,
        }
    }
}

pub(crate) fn apply(data: Vec<u8>, params: &PredictorParams) -> DecodeResult {
    if params.predictor == 1 {
        return Ok(data);
    }

    if !matches!(params.bits_per_component, 1 | 2 | 4 | 8 | 16)
        || params.colors == 0
        || params.colors > 32
        || params.columns == 0
    {
        warn!(
            "unsupported predictor parameters: {} colors, {} bits, {} columns",
            params.colors, params.bits_per_component, params.columns
        );

        return Err(Failure::unsupported());
    }

    let Some(row_len) = params.row_length_in_bytes() else {
        warn!("predictor rows of {} columns are too long", params.columns);

        return Err(Failure::unsupported());
    };

    match params.predictor {
        2 => Ok(tiff(data, row_len, params)),
        10..=15 => png(&data, row_len, params),
        other => {
            warn!("unknown predictor {other}");

            Err(Failure::unsupported())
        }
    }
}

fn png(data: &[u8], row_len: usize, params: &PredictorParams) -> DecodeResult {
    let bpp = params.bytes_per_pixel();

    // Rows never hold more than the input, whatever the declared width.
    let buffer_len = row_len.min(data.len());
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0; buffer_len];
    let mut cur = vec![0; buffer_len];

    // Each row starts with the predictor that is used for it. A truncated
    // last row is decoded as far as it goes.
    for chunk in data.chunks(row_len.saturating_add(1)) {
        let (&tag, row) = match chunk.split_first() {
            Some(split) => split,
            None => break,
        };

        cur[..row.len()].copy_from_slice(row);

        for i in 0..row.len() {
            let left = if i >= bpp { cur[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };

            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => {
                    warn!("invalid png predictor {tag}");

                    return Err(Failure::corrupt(out));
                }
            };

            cur[i] = cur[i].wrapping_add(predicted);
        }

        out.extend_from_slice(&cur[..row.len()]);
        std::mem::swap(&mut prev, &mut cur);
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn tiff(mut data: Vec<u8>, row_len: usize, params: &PredictorParams) -> Vec<u8> {
    let colors = params.colors as usize;

    match params.bits_per_component {
        8 => {
            for row in data.chunks_mut(row_len) {
                for i in colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }

            data
        }
        16 => {
            for row in data.chunks_mut(row_len) {
                for i in (colors * 2..row.len().saturating_sub(1)).step_by(2) {
                    let left = u16::from_be_bytes([row[i - colors * 2], row[i - colors * 2 + 1]]);
                    let cur = u16::from_be_bytes([row[i], row[i + 1]]);
                    let [hi, lo] = cur.wrapping_add(left).to_be_bytes();
                    row[i] = hi;
                    row[i + 1] = lo;
                }
            }

            data
        }
        bpc => {
            let mask = bit_mask(bpc);
            let mut writer = BitWriter::with_capacity(data.len());

            for row in data.chunks(row_len) {
                let mut reader = BitReader::new(row);
                let mut left = vec![0_u32; colors];

                'row: for _ in 0..params.columns {
                    for l in left.iter_mut() {
                        let Some(delta) = reader.read(bpc) else {
                            break 'row;
                        };

                        *l = (*l + delta) & mask;
                        writer.write(*l, bpc);
                    }
                }

                writer.align();
            }

            writer.finish()
        }
    }
}
