//! Symbol dictionary segments (7.4.2) and the symbol dictionary decoding
//! procedure (6.5).

use std::iter;

use log::trace;
use quire_common::bit::BitReader;
use quire_common::byte::Reader;

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::{DecodeError, HuffmanError, Result, SegmentError, SymbolError};
use crate::generic::{self, Template, decode_mmr};
use crate::huffman::{self, Standard, Table};
use crate::integer::{IntegerDecoder, symbol_code_length};
use crate::refinement::{self, Refinement, RefinementTemplate, decode_refinement};
use crate::region::{CombinationOperator, check_dimensions};
use crate::text::{
    Corner, CustomTables, SymbolCodes, TextCoder, TextContexts, TextParams, TextTables,
    decode_text, required,
};

/// A decoded symbol dictionary.
#[derive(Debug, Clone)]
pub(crate) struct SymbolDictionary {
    /// The exported symbols, in export order.
    pub(crate) symbols: Vec<Bitmap>,
    retained: Option<RetainedContexts>,
}

/// The generic and refinement coding statistics kept for a later
/// dictionary (7.4.2.2).
#[derive(Debug, Clone)]
struct RetainedContexts {
    generic: Vec<Context>,
    refinement: Vec<Context>,
}

#[derive(Debug, Clone)]
struct Header {
    flags: u16,
    huffman: bool,
    refagg: bool,
    template: Template,
    at: Vec<(i32, i32)>,
    refinement_template: RefinementTemplate,
    refinement_at: [(i32, i32); 2],
    context_used: bool,
    context_retained: bool,
    exported: u32,
    new: u32,
}

impl Header {
    /// Parse the symbol dictionary header (7.4.2.1).
    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let flags = reader.read_u16().ok_or(DecodeError::UnexpectedEof)?;
        let huffman = flags & 0x0001 != 0;
        let refagg = flags & 0x0002 != 0;
        let template = Template::from_bits((flags >> 10) as u8);
        let refinement_template = RefinementTemplate::from_bit(flags & 0x1000 != 0);

        let at = if huffman {
            Vec::new()
        } else {
            generic::read_at_pixels(reader, template)?
        };

        let refinement_at = if refagg && refinement_template == RefinementTemplate::T0 {
            refinement::read_at_pixels(reader)?
        } else {
            [(0, 0); 2]
        };

        let exported = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;
        let new = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;

        Ok(Self {
            flags,
            huffman,
            refagg,
            template,
            at,
            refinement_template,
            refinement_at,
            context_used: flags & 0x0100 != 0,
            context_retained: flags & 0x0200 != 0,
            exported,
            new,
        })
    }

    fn refinement<'a>(&self, reference: &'a Bitmap, dx: i32, dy: i32) -> Refinement<'a> {
        Refinement {
            template: self.refinement_template,
            at: self.refinement_at,
            reference,
            dx,
            dy,
            tpgron: false,
        }
    }

    /// Generic and refinement contexts, either fresh or continued from
    /// `inherited`.
    fn contexts(&self, inherited: Option<&SymbolDictionary>) -> Result<(Vec<Context>, Vec<Context>)> {
        let generic = self.template.context_count();
        let refinement = self.refinement_template.context_count();

        if !self.context_used {
            return Ok((
                vec![Context::default(); generic],
                vec![Context::default(); refinement],
            ));
        }

        let retained = inherited
            .and_then(|dictionary| dictionary.retained.as_ref())
            .filter(|r| r.generic.len() == generic && r.refinement.len() == refinement)
            .ok_or(SegmentError::MissingReference)?;

        Ok((retained.generic.clone(), retained.refinement.clone()))
    }
}

#[derive(Debug, Clone, Copy)]
struct DictionaryTables<'a> {
    height: &'a Table,
    width: &'a Table,
    size: &'a Table,
    instances: &'a Table,
}

/// Select the tables of a Huffman coded dictionary (7.4.2.1.6).
fn select_tables<'a>(flags: u16, custom: &'a [&'a Table]) -> Result<DictionaryTables<'a>> {
    let mut custom = CustomTables::new(custom);

    Ok(DictionaryTables {
        height: custom.select((flags >> 2) & 0x03, 3, &[Standard::D, Standard::E])?,
        width: custom.select((flags >> 4) & 0x03, 3, &[Standard::B, Standard::C])?,
        size: custom.select((flags >> 6) & 0x01, 1, &[Standard::A])?,
        instances: custom.select((flags >> 7) & 0x01, 1, &[Standard::A])?,
    })
}

enum Coder<'a> {
    Arithmetic {
        decoder: ArithmeticDecoder<'a>,
        iadh: IntegerDecoder,
        iadw: IntegerDecoder,
        iaai: IntegerDecoder,
        iaex: IntegerDecoder,
        generic: Vec<Context>,
        refinement: Vec<Context>,
        /// Shared by all refinement/aggregate coded symbols of the
        /// dictionary.
        text: Option<TextContexts>,
    },
    Huffman {
        reader: BitReader<'a>,
        tables: DictionaryTables<'a>,
    },
}

impl Coder<'_> {
    fn height_delta(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic { decoder, iadh, .. } => required(iadh.decode(decoder)),
            Self::Huffman { reader, tables } => tables.height.decode_value(reader),
        }
    }

    /// `None` ends the height class.
    fn width_delta(&mut self) -> Result<Option<i32>> {
        match self {
            Self::Arithmetic { decoder, iadw, .. } => Ok(iadw.decode(decoder)),
            Self::Huffman { reader, tables } => tables.width.decode(reader),
        }
    }

    fn aggregate_instances(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic { decoder, iaai, .. } => required(iaai.decode(decoder)),
            Self::Huffman { reader, tables } => tables.instances.decode_value(reader),
        }
    }

    fn export_run(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic { decoder, iaex, .. } => required(iaex.decode(decoder)),
            Self::Huffman { reader, .. } => huffman::standard(Standard::A).decode_value(reader),
        }
    }
}

/// Decode a symbol dictionary segment.
///
/// `input` holds the symbols of the referred dictionaries, `inherited` the
/// last of them, whose coding statistics may be continued.
pub(crate) fn decode_symbol_dictionary(
    data: &[u8],
    input: &[&Bitmap],
    custom: &[&Table],
    inherited: Option<&SymbolDictionary>,
) -> Result<SymbolDictionary> {
    let mut reader = Reader::new(data);
    let header = Header::parse(&mut reader)?;

    let total = u32::try_from(input.len())
        .ok()
        .and_then(|n| n.checked_add(header.new))
        .ok_or(DecodeError::Overflow)?;
    let code_len = symbol_code_length(total);

    let mut coder = if header.huffman {
        Coder::Huffman {
            reader: BitReader::new(reader.tail()),
            tables: select_tables(header.flags, custom)?,
        }
    } else {
        let (generic, refinement) = header.contexts(inherited)?;

        Coder::Arithmetic {
            decoder: ArithmeticDecoder::new(reader.tail()),
            iadh: IntegerDecoder::new(),
            iadw: IntegerDecoder::new(),
            iaai: IntegerDecoder::new(),
            iaex: IntegerDecoder::new(),
            generic,
            refinement,
            text: None,
        }
    };

    trace!(
        "decoding symbol dictionary with {} input and {} new symbols, huffman: {}, refagg: {}",
        input.len(),
        header.new,
        header.huffman,
        header.refagg
    );

    let collective = header.huffman && !header.refagg;
    let mut new_symbols: Vec<Bitmap> = Vec::new();
    let mut decoded = 0_u32;
    let mut height = 0_u32;

    while decoded < header.new {
        height = height
            .checked_add_signed(coder.height_delta()?)
            .ok_or(DecodeError::Overflow)?;

        let mut width = 0_u32;
        let mut total_width = 0_u32;
        let mut class_widths = Vec::new();

        while let Some(delta) = coder.width_delta()? {
            if decoded >= header.new {
                return Err(SymbolError::TooManyInstances.into());
            }

            width = width.checked_add_signed(delta).ok_or(DecodeError::Overflow)?;
            total_width = total_width
                .checked_add(width)
                .ok_or(DecodeError::Overflow)?;
            check_dimensions(width, height)?;

            if collective {
                class_widths.push(width);
            } else if header.refagg {
                let symbol =
                    decode_refined(&mut coder, &header, input, &new_symbols, code_len, width, height)?;
                new_symbols.push(symbol);
            } else if let Coder::Arithmetic {
                decoder, generic, ..
            } = &mut coder
            {
                let mut symbol = Bitmap::new(width, height, false);
                generic::decode_arithmetic(
                    &mut symbol,
                    decoder,
                    generic,
                    header.template,
                    false,
                    &header.at,
                    None,
                );
                new_symbols.push(symbol);
            }

            decoded += 1;
        }

        if collective && let Coder::Huffman { reader, tables } = &mut coder {
            let symbols = read_collective(reader, tables.size, &class_widths, total_width, height)?;
            new_symbols.extend(symbols);
        }
    }

    let symbols = export(&mut coder, input, new_symbols, header.exported)?;

    let retained = match coder {
        Coder::Arithmetic {
            generic,
            refinement,
            ..
        } if header.context_retained => Some(RetainedContexts {
            generic,
            refinement,
        }),
        _ => None,
    };

    Ok(SymbolDictionary { symbols, retained })
}

/// Decode a refinement/aggregate coded symbol (6.5.8.2).
#[allow(clippy::too_many_arguments)]
fn decode_refined(
    coder: &mut Coder<'_>,
    header: &Header,
    input: &[&Bitmap],
    new_symbols: &[Bitmap],
    code_len: u32,
    width: u32,
    height: u32,
) -> Result<Bitmap> {
    let instances = coder.aggregate_instances()?;
    let instances = u32::try_from(instances).map_err(|_| SymbolError::OutOfRange)?;
    let symbols: Vec<&Bitmap> = input.iter().copied().chain(new_symbols).collect();

    if instances == 1 {
        return refine_single(coder, header, &symbols, code_len, width, height);
    }

    // Table 17.
    let params = TextParams {
        width,
        height,
        instances,
        log_strips: 0,
        default_pixel: false,
        operator: CombinationOperator::Or,
        transposed: false,
        corner: Corner::TopLeft,
        ds_offset: 0,
        refine: true,
        refinement_template: header.refinement_template,
        refinement_at: header.refinement_at,
    };

    let codes = SymbolCodes::Fixed(code_len.max(1) as u8);
    let mut text_coder = match coder {
        Coder::Arithmetic {
            decoder,
            refinement,
            text,
            ..
        } => TextCoder::Arithmetic {
            decoder,
            contexts: text.get_or_insert_with(|| TextContexts::new(code_len)),
            refinement: refinement.as_mut_slice(),
        },
        Coder::Huffman { reader, .. } => TextCoder::Huffman {
            reader,
            tables: TextTables {
                first_s: huffman::standard(Standard::F),
                delta_s: huffman::standard(Standard::H),
                delta_t: huffman::standard(Standard::K),
                rdw: huffman::standard(Standard::O),
                rdh: huffman::standard(Standard::O),
                rdx: huffman::standard(Standard::O),
                rdy: huffman::standard(Standard::O),
                rsize: huffman::standard(Standard::A),
            },
            codes: &codes,
        },
    };

    decode_text(&mut text_coder, &symbols, &params)
}

/// Decode a symbol that refines a single earlier symbol (6.5.8.2.2).
fn refine_single(
    coder: &mut Coder<'_>,
    header: &Header,
    symbols: &[&Bitmap],
    code_len: u32,
    width: u32,
    height: u32,
) -> Result<Bitmap> {
    let mut bitmap = Bitmap::new(width, height, false);

    match coder {
        Coder::Arithmetic {
            decoder,
            refinement,
            text,
            ..
        } => {
            let contexts = text.get_or_insert_with(|| TextContexts::new(code_len));
            let id = contexts.iaid.decode(decoder) as usize;
            let dx = required(contexts.iardx.decode(decoder))?;
            let dy = required(contexts.iardy.decode(decoder))?;
            let reference = *symbols.get(id).ok_or(SymbolError::OutOfRange)?;

            decode_refinement(&mut bitmap, decoder, refinement, &header.refinement(reference, dx, dy));
        }
        Coder::Huffman { reader, .. } => {
            let id = reader
                .read(code_len.max(1) as u8)
                .ok_or(DecodeError::UnexpectedEof)? as usize;
            let offsets = huffman::standard(Standard::O);
            let dx = offsets.decode_value(reader)?;
            let dy = offsets.decode_value(reader)?;
            let size = huffman::standard(Standard::A).decode_value(reader)?;
            let size = usize::try_from(size).map_err(|_| HuffmanError::InvalidCode)?;
            reader.align();

            let data = reader
                .tail()
                .get(..size)
                .ok_or(DecodeError::UnexpectedEof)?;
            reader.skip(size * 8);

            let reference = *symbols.get(id).ok_or(SymbolError::OutOfRange)?;
            let mut decoder = ArithmeticDecoder::new(data);
            let mut contexts = vec![Context::default(); header.refinement_template.context_count()];
            decode_refinement(
                &mut bitmap,
                &mut decoder,
                &mut contexts,
                &header.refinement(reference, dx, dy),
            );
        }
    }

    Ok(bitmap)
}

/// Read the collective bitmap of a height class and split it into its
/// symbols (6.5.9).
fn read_collective(
    reader: &mut BitReader<'_>,
    size_table: &Table,
    widths: &[u32],
    total_width: u32,
    height: u32,
) -> Result<Vec<Bitmap>> {
    let size = size_table.decode_value(reader)?;
    let size = usize::try_from(size).map_err(|_| HuffmanError::InvalidCode)?;
    reader.align();

    check_dimensions(total_width, height)?;
    let mut collective = Bitmap::new(total_width, height, false);

    if size == 0 {
        // Uncompressed rows, each padded to a whole byte.
        let stride = total_width.div_ceil(8) as usize;
        let len = stride * height as usize;
        let data = reader
            .tail()
            .get(..len)
            .ok_or(DecodeError::UnexpectedEof)?;

        for y in 0..height {
            for x in 0..total_width {
                let byte = data[y as usize * stride + x as usize / 8];
                collective.set(x, y, byte & (0x80 >> (x % 8)) != 0);
            }
        }

        reader.skip(len * 8);
    } else {
        let data = reader
            .tail()
            .get(..size)
            .ok_or(DecodeError::UnexpectedEof)?;
        decode_mmr(&mut collective, data)?;
        reader.skip(size * 8);
    }

    let mut x = 0;
    Ok(widths
        .iter()
        .map(|&width| {
            let symbol = collective.crop(x, 0, width, height);
            x += width;
            symbol
        })
        .collect())
}

/// Select the exported symbols (6.5.10).
fn export(
    coder: &mut Coder<'_>,
    input: &[&Bitmap],
    new_symbols: Vec<Bitmap>,
    count: u32,
) -> Result<Vec<Bitmap>> {
    let total = input.len() + new_symbols.len();
    let mut flags = Vec::with_capacity(total);
    let mut exporting = false;
    let mut previous_run = None;

    while flags.len() < total {
        let run = usize::try_from(coder.export_run()?).map_err(|_| SymbolError::ExportCount)?;

        // Two empty runs in a row cannot make progress.
        if run > total - flags.len() || (run == 0 && previous_run == Some(0)) {
            return Err(SymbolError::ExportCount.into());
        }

        flags.extend(iter::repeat_n(exporting, run));
        exporting = !exporting;
        previous_run = Some(run);
    }

    let (from_input, from_new) = flags.split_at(input.len());

    let mut exported: Vec<Bitmap> = input
        .iter()
        .zip(from_input)
        .filter(|(_, export)| **export)
        .map(|(symbol, _)| (*symbol).clone())
        .collect();
    exported.extend(
        new_symbols
            .into_iter()
            .zip(from_new)
            .filter(|(_, export)| **export)
            .map(|(symbol, _)| symbol),
    );

    if exported.len() != count as usize {
        return Err(SymbolError::ExportCount.into());
    }

    Ok(exported)
}
