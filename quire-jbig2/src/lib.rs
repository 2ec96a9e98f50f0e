/*!
A decoder for JBIG2 streams embedded in PDF files.

Embedded streams (Annex D.3 of ITU-T T.88) are a plain sequence of
segments without the file header of standalone JBIG2 files. Segments shared
between several images, usually symbol dictionaries, are stored in a
separate global stream, which is decoded before the image's own segments.

All region types are decoded: generic, text, halftone and refinement
regions, together with the symbol dictionaries, pattern dictionaries and
code tables they refer to. Profiles, colour palettes and extensions carry
nothing that affects the bitmap and are skipped.

```rust,no_run
let data = std::fs::read("image.jb2").unwrap();
let image = quire_jbig2::decode_embedded(&data, None).unwrap();

println!("{}x{} image", image.width, image.height);
```
*/

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod arithmetic_decoder;
mod bitmap;
mod error;
mod generic;
mod halftone;
mod huffman;
mod integer;
mod page_info;
mod refinement;
mod region;
mod segment;
mod symbol;
mod text;

use log::{debug, warn};
use quire_common::byte::Reader;

use crate::bitmap::Bitmap;
use crate::generic::{Region, decode_generic_region};
use crate::halftone::{PatternDictionary, decode_halftone_region, decode_pattern_dictionary};
use crate::huffman::Table;
use crate::page_info::{UNKNOWN_HEIGHT, parse_page_info};
use crate::refinement::RefinementRegion;
use crate::segment::{Segment, SegmentHeader, SegmentType, parse_segments};
use crate::symbol::{SymbolDictionary, decode_symbol_dictionary};
use crate::text::decode_text_region;

pub use error::{DecodeError, HuffmanError, RegionError, SegmentError, SymbolError};

/// A decoded page.
#[derive(Debug, Clone)]
pub struct Image {
    /// The width in pixels.
    pub width: u32,
    /// The height in pixels.
    pub height: u32,
    /// The rows, packed MSB first and padded to whole bytes. A set bit is a
    /// black pixel.
    pub data: Vec<u8>,
    /// The error that stopped decoding early, if any.
    ///
    /// All regions decoded before the error are part of `data`.
    pub error: Option<DecodeError>,
}

/// Decode an embedded JBIG2 stream, with an optional global stream.
///
/// An error is only returned if no page could be set up at all. Errors after
/// the page information segment stop decoding and are reported through
/// [`Image::error`].
pub fn decode_embedded(data: &[u8], globals: Option<&[u8]>) -> Result<Image, DecodeError> {
    let mut page: Option<Page> = None;
    let mut store = Store::default();
    let mut error = None;

    for stream in globals.into_iter().chain(Some(data)) {
        let (segments, parse_error) = parse_segments(stream);

        if let Err(e) = process(&segments, &mut page, &mut store) {
            error = Some(e);
            break;
        }

        if let Some(e) = parse_error {
            error = Some(e);
            break;
        }
    }

    let Some(page) = page else {
        return Err(error.unwrap_or(DecodeError::MissingPageInfo));
    };

    if let Some(e) = &error {
        warn!("JBIG2 stream decoded partially: {e}");
    }

    Ok(Image {
        width: page.bitmap.width,
        height: page.bitmap.height,
        data: page.bitmap.pack(),
        error,
    })
}

struct Page {
    bitmap: Bitmap,
    default_pixel: bool,
    /// Whether the height grows with the decoded stripes.
    open_height: bool,
}

impl Page {
    fn draw(&mut self, region: &Region) {
        let info = &region.info;

        if self.open_height {
            let bottom = info.y.saturating_add(info.height);
            self.bitmap.grow(bottom, self.default_pixel);
        }

        self.bitmap.combine(&region.bitmap, info.x, info.y, info.operator);
    }
}

/// A decoded segment that later segments may refer to.
enum Stored {
    Symbols(SymbolDictionary),
    Patterns(PatternDictionary),
    Table(Table),
    /// An intermediate region.
    Region(Region),
}

/// The referable segments of the global and the page stream.
#[derive(Default)]
struct Store {
    entries: Vec<(u32, Stored)>,
}

impl Store {
    fn insert(&mut self, number: u32, stored: Stored) {
        self.entries.push((number, stored));
    }

    /// The segments referred to by `header` that were decoded, in order.
    fn referred<'a>(&'a self, header: &'a SegmentHeader) -> impl Iterator<Item = &'a Stored> {
        header.referred_to.iter().filter_map(move |number| {
            // The page stream may reuse a number of the global stream.
            self.entries
                .iter()
                .rev()
                .find(|(n, _)| n == number)
                .map(|(_, stored)| stored)
        })
    }

    fn symbol_dictionaries<'a>(&'a self, header: &'a SegmentHeader) -> Vec<&'a SymbolDictionary> {
        self.referred(header)
            .filter_map(|stored| match stored {
                Stored::Symbols(dictionary) => Some(dictionary),
                _ => None,
            })
            .collect()
    }

    fn tables<'a>(&'a self, header: &'a SegmentHeader) -> Vec<&'a Table> {
        self.referred(header)
            .filter_map(|stored| match stored {
                Stored::Table(table) => Some(table),
                _ => None,
            })
            .collect()
    }

    fn pattern_dictionary<'a>(&'a self, header: &'a SegmentHeader) -> Option<&'a PatternDictionary> {
        self.referred(header).find_map(|stored| match stored {
            Stored::Patterns(dictionary) => Some(dictionary),
            _ => None,
        })
    }

    fn region<'a>(&'a self, header: &'a SegmentHeader) -> Option<&'a Region> {
        self.referred(header).find_map(|stored| match stored {
            Stored::Region(region) => Some(region),
            _ => None,
        })
    }
}

/// The symbols of all referred symbol dictionaries, concatenated.
fn input_symbols<'a>(dictionaries: &[&'a SymbolDictionary]) -> Vec<&'a Bitmap> {
    dictionaries
        .iter()
        .copied()
        .flat_map(|dictionary| &dictionary.symbols)
        .collect()
}

fn process(
    segments: &[Segment<'_>],
    page: &mut Option<Page>,
    store: &mut Store,
) -> Result<(), DecodeError> {
    for segment in segments {
        let header = &segment.header;

        // Embedded streams only carry the first page and its global segments.
        if header.page > 1 {
            debug!("skipping segment {} of page {}", header.number, header.page);
            continue;
        }

        let region = match header.kind {
            SegmentType::PageInformation => {
                let info = parse_page_info(&mut Reader::new(segment.data))?;
                let open_height = info.height == UNKNOWN_HEIGHT;
                let height = if open_height { 0 } else { info.height };

                if open_height && !info.striped {
                    return Err(RegionError::UnknownPageHeight.into());
                }

                region::check_dimensions(info.width, height)?;
                debug!(
                    "JBIG2 page {}x{}, striped: {} ({} rows), default operator: {:?} (overridable: {})",
                    info.width,
                    height,
                    info.striped,
                    info.max_stripe_size,
                    info.default_operator,
                    info.operator_overridden,
                );

                *page = Some(Page {
                    bitmap: Bitmap::new(info.width, height, info.default_pixel),
                    default_pixel: info.default_pixel,
                    open_height,
                });
                None
            }
            SegmentType::SymbolDictionary => {
                let dictionaries = store.symbol_dictionaries(header);
                let dictionary = decode_symbol_dictionary(
                    segment.data,
                    &input_symbols(&dictionaries),
                    &store.tables(header),
                    dictionaries.last().copied(),
                )?;
                debug!(
                    "JBIG2 symbol dictionary {} exports {} symbols",
                    header.number,
                    dictionary.symbols.len()
                );

                store.insert(header.number, Stored::Symbols(dictionary));
                None
            }
            SegmentType::PatternDictionary => {
                let dictionary = decode_pattern_dictionary(segment.data)?;
                store.insert(header.number, Stored::Patterns(dictionary));
                None
            }
            SegmentType::Tables => {
                let table = Table::parse(segment.data)?;
                store.insert(header.number, Stored::Table(table));
                None
            }
            SegmentType::IntermediateTextRegion
            | SegmentType::ImmediateTextRegion
            | SegmentType::ImmediateLosslessTextRegion => {
                let dictionaries = store.symbol_dictionaries(header);
                let region = decode_text_region(
                    segment.data,
                    &input_symbols(&dictionaries),
                    &store.tables(header),
                )?;
                Some(region)
            }
            SegmentType::IntermediateHalftoneRegion
            | SegmentType::ImmediateHalftoneRegion
            | SegmentType::ImmediateLosslessHalftoneRegion => {
                let patterns = store
                    .pattern_dictionary(header)
                    .ok_or(SegmentError::MissingReference)?;
                Some(decode_halftone_region(segment.data, patterns)?)
            }
            SegmentType::IntermediateGenericRegion => {
                Some(decode_generic_region(segment.data, false)?)
            }
            SegmentType::ImmediateGenericRegion | SegmentType::ImmediateLosslessGenericRegion => {
                Some(decode_generic_region(segment.data, header.data_length.is_none())?)
            }
            SegmentType::IntermediateRefinementRegion
            | SegmentType::ImmediateRefinementRegion
            | SegmentType::ImmediateLosslessRefinementRegion => {
                let page = page.as_mut().ok_or(DecodeError::MissingPageInfo)?;
                let refinement = RefinementRegion::parse(segment.data)?;

                // Without a referred region, the page itself is refined.
                let region = match store.region(header) {
                    Some(reference) => {
                        refinement.decode(&reference.bitmap, (reference.info.x, reference.info.y))?
                    }
                    None => {
                        let info = &refinement.info;
                        if page.open_height {
                            let bottom = info.y.saturating_add(info.height);
                            page.bitmap.grow(bottom, page.default_pixel);
                        }
                        refinement.decode(&page.bitmap, (0, 0))?
                    }
                };
                Some(region)
            }
            SegmentType::EndOfStripe => {
                let page = page.as_mut().ok_or(DecodeError::MissingPageInfo)?;
                let end_row = Reader::new(segment.data)
                    .read_u32()
                    .ok_or(DecodeError::UnexpectedEof)?;

                if page.open_height {
                    let height = end_row.saturating_add(1);
                    region::check_dimensions(page.bitmap.width, height)?;
                    page.bitmap.grow(height, page.default_pixel);
                }
                None
            }
            SegmentType::EndOfPage | SegmentType::EndOfFile => break,
            kind => {
                warn!("skipping unsupported JBIG2 segment {kind:?}");
                None
            }
        };

        if let Some(region) = region {
            let page = page.as_mut().ok_or(DecodeError::MissingPageInfo)?;

            if header.kind.is_intermediate_region() {
                store.insert(header.number, Stored::Region(region));
            } else {
                page.draw(&region);
            }
        }
    }

    Ok(())
}
