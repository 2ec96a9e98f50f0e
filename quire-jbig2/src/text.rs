//! Text region segments (7.4.3) and the text region decoding procedure
//! (6.4).

use std::iter;

use log::trace;
use quire_common::bit::BitReader;
use quire_common::byte::Reader;

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::{DecodeError, HuffmanError, Result, SymbolError};
use crate::generic::Region;
use crate::huffman::{self, Line, Standard, Table};
use crate::integer::{IntegerDecoder, SymbolIdDecoder, symbol_code_length};
use crate::refinement::{self, Refinement, RefinementTemplate, decode_refinement};
use crate::region::{CombinationOperator, RegionInfo, check_dimensions, parse_region_info};

/// The corner of a symbol instance that its coordinates refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Corner {
    BottomLeft,
    TopLeft,
    BottomRight,
    TopRight,
}

impl Corner {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x03 {
            0 => Self::BottomLeft,
            1 => Self::TopLeft,
            2 => Self::BottomRight,
            _ => Self::TopRight,
        }
    }

    fn is_right(self) -> bool {
        matches!(self, Self::TopRight | Self::BottomRight)
    }

    fn is_bottom(self) -> bool {
        matches!(self, Self::BottomLeft | Self::BottomRight)
    }
}

/// The parameters of the text region decoding procedure (Table 9).
#[derive(Debug, Clone)]
pub(crate) struct TextParams {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) instances: u32,
    pub(crate) log_strips: u8,
    pub(crate) default_pixel: bool,
    pub(crate) operator: CombinationOperator,
    pub(crate) transposed: bool,
    pub(crate) corner: Corner,
    pub(crate) ds_offset: i32,
    pub(crate) refine: bool,
    pub(crate) refinement_template: RefinementTemplate,
    pub(crate) refinement_at: [(i32, i32); 2],
}

/// The integer decoders of an arithmetically coded text region.
#[derive(Debug, Clone)]
pub(crate) struct TextContexts {
    pub(crate) iadt: IntegerDecoder,
    pub(crate) iafs: IntegerDecoder,
    pub(crate) iads: IntegerDecoder,
    pub(crate) iait: IntegerDecoder,
    pub(crate) iaid: SymbolIdDecoder,
    pub(crate) iari: IntegerDecoder,
    pub(crate) iardw: IntegerDecoder,
    pub(crate) iardh: IntegerDecoder,
    pub(crate) iardx: IntegerDecoder,
    pub(crate) iardy: IntegerDecoder,
}

impl TextContexts {
    pub(crate) fn new(code_len: u32) -> Self {
        Self {
            iadt: IntegerDecoder::new(),
            iafs: IntegerDecoder::new(),
            iads: IntegerDecoder::new(),
            iait: IntegerDecoder::new(),
            iaid: SymbolIdDecoder::new(code_len),
            iari: IntegerDecoder::new(),
            iardw: IntegerDecoder::new(),
            iardh: IntegerDecoder::new(),
            iardx: IntegerDecoder::new(),
            iardy: IntegerDecoder::new(),
        }
    }
}

/// The Huffman tables of a text region (7.4.3.1.6).
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextTables<'a> {
    pub(crate) first_s: &'a Table,
    pub(crate) delta_s: &'a Table,
    pub(crate) delta_t: &'a Table,
    pub(crate) rdw: &'a Table,
    pub(crate) rdh: &'a Table,
    pub(crate) rdx: &'a Table,
    pub(crate) rdy: &'a Table,
    pub(crate) rsize: &'a Table,
}

/// How symbol IDs are coded with Huffman coding.
#[derive(Debug, Clone)]
pub(crate) enum SymbolCodes {
    /// Codes from the symbol ID table of the segment (7.4.3.1.7).
    Table(Table),
    /// Plain numbers of the given bit length, as in refinement/aggregate
    /// coded symbols.
    Fixed(u8),
}

/// The entropy coder a text region is decoded with.
pub(crate) enum TextCoder<'a, 'b> {
    Arithmetic {
        decoder: &'a mut ArithmeticDecoder<'b>,
        contexts: &'a mut TextContexts,
        refinement: &'a mut [Context],
    },
    Huffman {
        reader: &'a mut BitReader<'b>,
        tables: TextTables<'a>,
        codes: &'a SymbolCodes,
    },
}

/// A value that must not be out-of-band.
pub(crate) fn required(value: Option<i32>) -> Result<i32> {
    value.ok_or_else(|| SymbolError::UnexpectedOob.into())
}

impl TextCoder<'_, '_> {
    fn strip_t(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic {
                decoder, contexts, ..
            } => required(contexts.iadt.decode(decoder)),
            Self::Huffman { reader, tables, .. } => tables.delta_t.decode_value(reader),
        }
    }

    fn first_s(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic {
                decoder, contexts, ..
            } => required(contexts.iafs.decode(decoder)),
            Self::Huffman { reader, tables, .. } => tables.first_s.decode_value(reader),
        }
    }

    /// `None` ends the current strip.
    fn delta_s(&mut self) -> Result<Option<i32>> {
        match self {
            Self::Arithmetic {
                decoder, contexts, ..
            } => Ok(contexts.iads.decode(decoder)),
            Self::Huffman { reader, tables, .. } => tables.delta_s.decode(reader),
        }
    }

    fn instance_t(&mut self, log_strips: u8) -> Result<i32> {
        if log_strips == 0 {
            return Ok(0);
        }

        match self {
            Self::Arithmetic {
                decoder, contexts, ..
            } => required(contexts.iait.decode(decoder)),
            Self::Huffman { reader, .. } => reader
                .read(log_strips)
                .map(|v| v as i32)
                .ok_or(DecodeError::UnexpectedEof),
        }
    }

    fn symbol_id(&mut self) -> Result<usize> {
        match self {
            Self::Arithmetic {
                decoder, contexts, ..
            } => Ok(contexts.iaid.decode(decoder) as usize),
            Self::Huffman { reader, codes, .. } => match codes {
                SymbolCodes::Table(table) => Ok(table.decode_value(reader)? as usize),
                SymbolCodes::Fixed(len) => reader
                    .read(*len)
                    .map(|v| v as usize)
                    .ok_or(DecodeError::UnexpectedEof),
            },
        }
    }

    fn refines(&mut self) -> Result<bool> {
        match self {
            Self::Arithmetic {
                decoder, contexts, ..
            } => Ok(required(contexts.iari.decode(decoder))? != 0),
            Self::Huffman { reader, .. } => reader
                .read_bit()
                .map(|b| b != 0)
                .ok_or(DecodeError::UnexpectedEof),
        }
    }

    /// The width, height, x and y deltas of a refined symbol (6.4.11).
    fn refinement_deltas(&mut self) -> Result<[i32; 4]> {
        match self {
            Self::Arithmetic {
                decoder, contexts, ..
            } => Ok([
                required(contexts.iardw.decode(decoder))?,
                required(contexts.iardh.decode(decoder))?,
                required(contexts.iardx.decode(decoder))?,
                required(contexts.iardy.decode(decoder))?,
            ]),
            Self::Huffman { reader, tables, .. } => Ok([
                tables.rdw.decode_value(reader)?,
                tables.rdh.decode_value(reader)?,
                tables.rdx.decode_value(reader)?,
                tables.rdy.decode_value(reader)?,
            ]),
        }
    }

    fn refine(&mut self, bitmap: &mut Bitmap, params: &Refinement<'_>) -> Result<()> {
        match self {
            Self::Arithmetic {
                decoder,
                refinement,
                ..
            } => decode_refinement(bitmap, decoder, refinement, params),
            Self::Huffman { reader, tables, .. } => {
                let size = tables.rsize.decode_value(reader)?;
                let size = usize::try_from(size).map_err(|_| HuffmanError::InvalidCode)?;
                reader.align();

                let data = reader
                    .tail()
                    .get(..size)
                    .ok_or(DecodeError::UnexpectedEof)?;
                reader.skip(size * 8);

                // Each refinement starts with a fresh coder and contexts.
                let mut decoder = ArithmeticDecoder::new(data);
                let mut contexts = vec![Context::default(); params.template.context_count()];
                decode_refinement(bitmap, &mut decoder, &mut contexts, params);
            }
        }

        Ok(())
    }
}

fn add(a: i64, b: impl Into<i64>) -> Result<i64> {
    a.checked_add(b.into()).ok_or(DecodeError::Overflow)
}

/// The text region decoding procedure (6.4.5).
pub(crate) fn decode_text(
    coder: &mut TextCoder<'_, '_>,
    symbols: &[&Bitmap],
    params: &TextParams,
) -> Result<Bitmap> {
    let mut region = Bitmap::new(params.width, params.height, params.default_pixel);
    let strips = 1_i64 << params.log_strips;

    let mut strip_t = -(i64::from(coder.strip_t()?) * strips);
    let mut first_s = 0_i64;
    let mut instances = 0_u32;

    while instances < params.instances {
        strip_t = add(strip_t, i64::from(coder.strip_t()?) * strips)?;
        let mut cur_s = None;

        loop {
            let s = match cur_s {
                None => {
                    first_s = add(first_s, coder.first_s()?)?;
                    first_s
                }
                Some(s) => {
                    let Some(delta) = coder.delta_s()? else {
                        break;
                    };

                    if instances >= params.instances {
                        return Err(SymbolError::TooManyInstances.into());
                    }

                    add(add(s, delta)?, params.ds_offset)?
                }
            };

            let t = add(strip_t, coder.instance_t(params.log_strips)?)?;
            let id = coder.symbol_id()?;
            let symbol = *symbols.get(id).ok_or(SymbolError::OutOfRange)?;

            let refined;
            let bitmap = if params.refine && coder.refines()? {
                refined = refine_symbol(coder, symbol, params)?;
                &refined
            } else {
                symbol
            };

            let (w, h) = (i64::from(bitmap.width), i64::from(bitmap.height));
            let extent = if params.transposed { h } else { w };
            let leading_edge = if params.transposed {
                params.corner.is_bottom()
            } else {
                params.corner.is_right()
            };

            let mut s = s;
            if leading_edge {
                s = add(s, extent - 1)?;
            }

            let (x, y) = placement(params, s, t, w, h);
            region.combine_at(bitmap, x, y, params.operator);

            if !leading_edge {
                s = add(s, extent - 1)?;
            }

            cur_s = Some(s);
            instances += 1;
        }
    }

    Ok(region)
}

/// The top left corner of a symbol instance (6.4.5, step 3 c) vi).
fn placement(params: &TextParams, s: i64, t: i64, w: i64, h: i64) -> (i64, i64) {
    let (x, y) = if params.transposed { (t, s) } else { (s, t) };

    let x = if params.corner.is_right() { x - w + 1 } else { x };
    let y = if params.corner.is_bottom() { y - h + 1 } else { y };

    (x, y)
}

fn refine_symbol(
    coder: &mut TextCoder<'_, '_>,
    symbol: &Bitmap,
    params: &TextParams,
) -> Result<Bitmap> {
    let [rdw, rdh, rdx, rdy] = coder.refinement_deltas()?;

    let size = |base: u32, delta: i32| {
        u32::try_from(i64::from(base) + i64::from(delta)).map_err(|_| DecodeError::Overflow)
    };
    let width = size(symbol.width, rdw)?;
    let height = size(symbol.height, rdh)?;
    check_dimensions(width, height)?;

    let offset = |delta: i32, extra: i32| {
        delta
            .div_euclid(2)
            .checked_add(extra)
            .ok_or(DecodeError::Overflow)
    };

    let refinement = Refinement {
        template: params.refinement_template,
        at: params.refinement_at,
        reference: symbol,
        dx: offset(rdw, rdx)?,
        dy: offset(rdh, rdy)?,
        tpgron: false,
    };

    let mut bitmap = Bitmap::new(width, height, false);
    coder.refine(&mut bitmap, &refinement)?;

    Ok(bitmap)
}

/// Decode the symbol ID Huffman table (7.4.3.1.7).
fn read_symbol_codes(reader: &mut BitReader<'_>, symbols: usize) -> Result<Table> {
    let mut run_lines = Vec::with_capacity(35);
    for code in 0..35 {
        let len = reader.read(4).ok_or(DecodeError::UnexpectedEof)?;
        run_lines.push(Line::new(code, len as u8, 0));
    }
    let runs = Table::build(run_lines);

    let mut lengths: Vec<u8> = Vec::with_capacity(symbols);
    let read = |reader: &mut BitReader<'_>, bits: u8| {
        reader
            .read(bits)
            .map(|v| v as usize)
            .ok_or(DecodeError::UnexpectedEof)
    };

    while lengths.len() < symbols {
        match runs.decode_value(reader)? {
            len @ 0..=31 => lengths.push(len as u8),
            32 => {
                let previous = *lengths.last().ok_or(HuffmanError::InvalidCode)?;
                let count = 3 + read(reader, 2)?;
                lengths.extend(iter::repeat_n(previous, count));
            }
            33 => {
                let count = 3 + read(reader, 3)?;
                lengths.extend(iter::repeat_n(0, count));
            }
            34 => {
                let count = 11 + read(reader, 7)?;
                lengths.extend(iter::repeat_n(0, count));
            }
            _ => return Err(HuffmanError::InvalidCode.into()),
        }
    }

    if lengths.len() != symbols {
        return Err(HuffmanError::InvalidCode.into());
    }

    reader.align();

    let lines = lengths
        .into_iter()
        .enumerate()
        .map(|(id, len)| Line::new(id as i32, len, 0))
        .collect();

    Ok(Table::build(lines))
}

/// Hands out the custom tables referred to by a segment, in order.
pub(crate) struct CustomTables<'a> {
    tables: std::slice::Iter<'a, &'a Table>,
}

impl<'a> CustomTables<'a> {
    pub(crate) fn new(tables: &'a [&'a Table]) -> Self {
        Self {
            tables: tables.iter(),
        }
    }

    pub(crate) fn next_table(&mut self) -> Result<&'a Table> {
        self.tables
            .next()
            .copied()
            .ok_or_else(|| HuffmanError::MissingTables.into())
    }

    /// The standard table for `bits`, or the next custom table if `bits` is
    /// `custom`.
    pub(crate) fn select(
        &mut self,
        bits: u16,
        custom: u16,
        standard: &[Standard],
    ) -> Result<&'a Table> {
        if bits == custom {
            return self.next_table();
        }

        standard
            .get(bits as usize)
            .map(|t| huffman::standard(*t))
            .ok_or_else(|| HuffmanError::InvalidSelection.into())
    }
}

fn select_tables<'a>(flags: u16, custom: &'a [&'a Table]) -> Result<TextTables<'a>> {
    let mut custom = CustomTables::new(custom);
    let bits = |shift: u16| (flags >> shift) & 0x03;
    let refinement = [Standard::N, Standard::O];

    let first_s = custom.select(bits(0), 3, &[Standard::F, Standard::G])?;
    let delta_s = custom.select(bits(2), 3, &[Standard::H, Standard::I, Standard::J])?;
    let delta_t = custom.select(bits(4), 3, &[Standard::K, Standard::L, Standard::M])?;
    let rdw = custom.select(bits(6), 3, &refinement)?;
    let rdh = custom.select(bits(8), 3, &refinement)?;
    let rdy = custom.select(bits(10), 3, &refinement)?;
    let rdx = custom.select(bits(12), 3, &refinement)?;
    let rsize = custom.select((flags >> 14) & 0x01, 1, &[Standard::A])?;

    Ok(TextTables {
        first_s,
        delta_s,
        delta_t,
        rdw,
        rdh,
        rdx,
        rdy,
        rsize,
    })
}

/// Decode a text region segment with the symbols of the referred symbol
/// dictionaries and the referred custom tables.
pub(crate) fn decode_text_region(
    data: &[u8],
    symbols: &[&Bitmap],
    custom: &[&Table],
) -> Result<Region> {
    let mut reader = Reader::new(data);
    let info = parse_region_info(&mut reader)?;
    let flags = reader.read_u16().ok_or(DecodeError::UnexpectedEof)?;

    let huffman = flags & 0x0001 != 0;
    let refine = flags & 0x0002 != 0;
    let refinement_template = RefinementTemplate::from_bit(flags & 0x8000 != 0);

    // A five bit two's complement number.
    let ds_offset = i32::from(((flags >> 10) & 0x1F) as u8 as i8) << 27 >> 27;

    let huffman_flags = if huffman {
        Some(reader.read_u16().ok_or(DecodeError::UnexpectedEof)?)
    } else {
        None
    };

    let refinement_at = if refine && refinement_template == RefinementTemplate::T0 {
        refinement::read_at_pixels(&mut reader)?
    } else {
        [(0, 0); 2]
    };

    let instances = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;

    check_dimensions(info.width, info.height)?;

    let params = TextParams {
        width: info.width,
        height: info.height,
        instances,
        log_strips: ((flags >> 2) & 0x03) as u8,
        default_pixel: flags & 0x0200 != 0,
        operator: CombinationOperator::from_bits(((flags >> 7) & 0x03) as u8)
            .unwrap_or(CombinationOperator::Or),
        transposed: flags & 0x0040 != 0,
        corner: Corner::from_bits(flags >> 4),
        ds_offset,
        refine,
        refinement_template,
        refinement_at,
    };

    trace!(
        "decoding {}x{} text region with {} instances of {} symbols, huffman: {}",
        info.width,
        info.height,
        instances,
        symbols.len(),
        huffman
    );

    let bitmap = match huffman_flags {
        Some(huffman_flags) => {
            let tables = select_tables(huffman_flags, custom)?;
            let mut bits = BitReader::new(reader.tail());
            let codes = SymbolCodes::Table(read_symbol_codes(&mut bits, symbols.len())?);

            let mut coder = TextCoder::Huffman {
                reader: &mut bits,
                tables,
                codes: &codes,
            };
            decode_text(&mut coder, symbols, &params)?
        }
        None => {
            let code_len = symbol_code_length(symbols.len() as u32);
            let mut decoder = ArithmeticDecoder::new(reader.tail());
            let mut contexts = TextContexts::new(code_len);
            let mut refinement = vec![Context::default(); refinement_template.context_count()];

            let mut coder = TextCoder::Arithmetic {
                decoder: &mut decoder,
                contexts: &mut contexts,
                refinement: &mut refinement,
            };
            decode_text(&mut coder, symbols, &params)?
        }
    };

    Ok(Region { info, bitmap })
}
