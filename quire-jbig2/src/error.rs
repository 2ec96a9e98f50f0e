//! Error types for JBIG2 decoding.

use core::fmt;

/// The error type for JBIG2 decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The data ended before a segment was complete.
    UnexpectedEof,
    /// A segment header is malformed.
    Segment(SegmentError),
    /// A region segment is malformed.
    Region(RegionError),
    /// A region segment was found before the page information segment.
    MissingPageInfo,
    /// MMR coded data could not be decoded.
    Mmr(quire_ccitt::DecodeError),
    /// Huffman coded data or a code table is malformed.
    Huffman(HuffmanError),
    /// A symbol dictionary or a symbol reference is malformed.
    Symbol(SymbolError),
    /// A coordinate or size computation overflowed.
    Overflow,
}

/// Errors in segment headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    /// The segment type is reserved.
    ReservedType(u8),
    /// The referred-to segment count uses a reserved value.
    ReservedCount,
    /// A segment refers to a segment with a larger number.
    ForwardReference,
    /// No end marker was found for a segment with unknown length.
    MissingEndMarker,
    /// A region refers to a dictionary or region that was not decoded.
    MissingReference,
}

/// Errors in Huffman coded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanError {
    /// A bit sequence does not match any code of the table.
    InvalidCode,
    /// A code table segment is malformed.
    InvalidTable,
    /// A table selection uses a reserved value.
    InvalidSelection,
    /// Fewer custom tables were referred to than selected.
    MissingTables,
    /// An out-of-band value was decoded where a number is required.
    UnexpectedOob,
}

/// Errors in symbol dictionaries and symbol references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolError {
    /// A symbol ID is larger than the number of available symbols.
    OutOfRange,
    /// An out-of-band value was decoded where a number is required.
    UnexpectedOob,
    /// More symbol instances were decoded than announced.
    TooManyInstances,
    /// The number of exported symbols does not match the export flags.
    ExportCount,
}

/// Errors in region segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// The region is empty or too large.
    InvalidDimension,
    /// An adaptive template pixel refers to an undecoded pixel.
    InvalidAtPixel,
    /// A reserved flag bit is set.
    ReservedFlags,
    /// The page height is unknown and no end of stripe segment was found.
    UnknownPageHeight,
    /// A refinement region is larger than its reference.
    ReferenceTooSmall,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of data"),
            Self::Segment(e) => write!(f, "{e}"),
            Self::Region(e) => write!(f, "{e}"),
            Self::MissingPageInfo => write!(f, "region segment before page information"),
            Self::Mmr(e) => write!(f, "MMR decoding failed: {e}"),
            Self::Huffman(e) => write!(f, "{e}"),
            Self::Symbol(e) => write!(f, "{e}"),
            Self::Overflow => write!(f, "arithmetic overflow"),
        }
    }
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedType(t) => write!(f, "reserved segment type {t}"),
            Self::ReservedCount => write!(f, "reserved referred-to segment count"),
            Self::ForwardReference => write!(f, "segment refers to a later segment"),
            Self::MissingEndMarker => write!(f, "missing end marker for unknown length"),
            Self::MissingReference => write!(f, "referred-to segment is missing"),
        }
    }
}

impl fmt::Display for HuffmanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCode => write!(f, "invalid Huffman code"),
            Self::InvalidTable => write!(f, "invalid Huffman code table"),
            Self::InvalidSelection => write!(f, "reserved Huffman table selection"),
            Self::MissingTables => write!(f, "not enough referred Huffman tables"),
            Self::UnexpectedOob => write!(f, "unexpected out-of-band value"),
        }
    }
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "symbol ID out of range"),
            Self::UnexpectedOob => write!(f, "unexpected out-of-band value"),
            Self::TooManyInstances => write!(f, "too many symbol instances"),
            Self::ExportCount => write!(f, "wrong number of exported symbols"),
        }
    }
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimension => write!(f, "invalid region dimension"),
            Self::InvalidAtPixel => write!(f, "invalid adaptive template pixel"),
            Self::ReservedFlags => write!(f, "reserved region flags are set"),
            Self::UnknownPageHeight => write!(f, "page height is unknown"),
            Self::ReferenceTooSmall => write!(f, "refinement reference is too small"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<SegmentError> for DecodeError {
    fn from(e: SegmentError) -> Self {
        Self::Segment(e)
    }
}

impl From<RegionError> for DecodeError {
    fn from(e: RegionError) -> Self {
        Self::Region(e)
    }
}

impl From<HuffmanError> for DecodeError {
    fn from(e: HuffmanError) -> Self {
        Self::Huffman(e)
    }
}

impl From<SymbolError> for DecodeError {
    fn from(e: SymbolError) -> Self {
        Self::Symbol(e)
    }
}

impl From<quire_ccitt::DecodeError> for DecodeError {
    fn from(e: quire_ccitt::DecodeError) -> Self {
        Self::Mmr(e)
    }
}

pub(crate) type Result<T> = core::result::Result<T, DecodeError>;
