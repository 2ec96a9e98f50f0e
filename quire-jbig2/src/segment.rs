//! Segment headers (7.2) and the sequence of segments in an embedded
//! stream.

use quire_common::byte::Reader;

use crate::error::{DecodeError, Result, SegmentError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentType {
    SymbolDictionary,
    IntermediateTextRegion,
    ImmediateTextRegion,
    ImmediateLosslessTextRegion,
    PatternDictionary,
    IntermediateHalftoneRegion,
    ImmediateHalftoneRegion,
    ImmediateLosslessHalftoneRegion,
    IntermediateGenericRegion,
    ImmediateGenericRegion,
    ImmediateLosslessGenericRegion,
    IntermediateRefinementRegion,
    ImmediateRefinementRegion,
    ImmediateLosslessRefinementRegion,
    PageInformation,
    EndOfPage,
    EndOfStripe,
    EndOfFile,
    Profiles,
    Tables,
    ColourPalette,
    Extension,
}

impl SegmentType {
    fn from_bits(bits: u8) -> Result<Self> {
        Ok(match bits {
            0 => Self::SymbolDictionary,
            4 => Self::IntermediateTextRegion,
            6 => Self::ImmediateTextRegion,
            7 => Self::ImmediateLosslessTextRegion,
            16 => Self::PatternDictionary,
            20 => Self::IntermediateHalftoneRegion,
            22 => Self::ImmediateHalftoneRegion,
            23 => Self::ImmediateLosslessHalftoneRegion,
            36 => Self::IntermediateGenericRegion,
            38 => Self::ImmediateGenericRegion,
            39 => Self::ImmediateLosslessGenericRegion,
            40 => Self::IntermediateRefinementRegion,
            42 => Self::ImmediateRefinementRegion,
            43 => Self::ImmediateLosslessRefinementRegion,
            48 => Self::PageInformation,
            49 => Self::EndOfPage,
            50 => Self::EndOfStripe,
            51 => Self::EndOfFile,
            52 => Self::Profiles,
            53 => Self::Tables,
            54 => Self::ColourPalette,
            62 => Self::Extension,
            _ => return Err(SegmentError::ReservedType(bits).into()),
        })
    }

    /// Whether the region is kept for later segments instead of being drawn.
    pub(crate) fn is_intermediate_region(self) -> bool {
        matches!(
            self,
            Self::IntermediateTextRegion
                | Self::IntermediateHalftoneRegion
                | Self::IntermediateGenericRegion
                | Self::IntermediateRefinementRegion
        )
    }

    fn is_immediate_generic(self) -> bool {
        matches!(
            self,
            Self::ImmediateGenericRegion | Self::ImmediateLosslessGenericRegion
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SegmentHeader {
    pub(crate) number: u32,
    pub(crate) kind: SegmentType,
    pub(crate) referred_to: Vec<u32>,
    pub(crate) page: u32,
    /// `None` if the length is unknown (7.2.7).
    pub(crate) data_length: Option<u32>,
}

#[derive(Debug)]
pub(crate) struct Segment<'a> {
    pub(crate) header: SegmentHeader,
    pub(crate) data: &'a [u8],
}

pub(crate) fn parse_segment_header(reader: &mut Reader<'_>) -> Result<SegmentHeader> {
    let number = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;
    let flags = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;
    let kind = SegmentType::from_bits(flags & 0x3F)?;
    let long_page = flags & 0x40 != 0;

    let first = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;
    let count = match first >> 5 {
        5 | 6 => return Err(SegmentError::ReservedCount.into()),
        7 => {
            let rest = reader.read_bytes(3).ok_or(DecodeError::UnexpectedEof)?;
            let count = u32::from_be_bytes([first & 0x1F, rest[0], rest[1], rest[2]]);
            // One retention bit per referred segment, plus one for this one.
            let retention = (count as usize + 1).div_ceil(8);
            reader
                .skip_bytes(retention)
                .ok_or(DecodeError::UnexpectedEof)?;
            count
        }
        short => u32::from(short),
    };

    // Every referred number takes at least one byte.
    if count as usize > reader.remaining() {
        return Err(DecodeError::UnexpectedEof);
    }

    let mut referred_to = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let referred = if number <= 256 {
            reader.read_byte().map(u32::from)
        } else if number <= 65536 {
            reader.read_u16().map(u32::from)
        } else {
            reader.read_u32()
        }
        .ok_or(DecodeError::UnexpectedEof)?;

        if referred >= number {
            return Err(SegmentError::ForwardReference.into());
        }

        referred_to.push(referred);
    }

    let page = if long_page {
        reader.read_u32()
    } else {
        reader.read_byte().map(u32::from)
    }
    .ok_or(DecodeError::UnexpectedEof)?;

    let data_length = match reader.read_u32().ok_or(DecodeError::UnexpectedEof)? {
        0xFFFF_FFFF => None,
        len => Some(len),
    };

    Ok(SegmentHeader {
        number,
        kind,
        referred_to,
        page,
        data_length,
    })
}

fn parse_segment<'a>(reader: &mut Reader<'a>) -> Result<Segment<'a>> {
    let header = parse_segment_header(reader)?;

    let len = match header.data_length {
        Some(len) => len as usize,
        None if header.kind.is_immediate_generic() => unknown_generic_length(reader)?,
        None => return Err(DecodeError::UnexpectedEof),
    };

    let data = reader.read_bytes(len).ok_or(DecodeError::UnexpectedEof)?;

    Ok(Segment { header, data })
}

/// Find the length of an immediate generic region with unknown length.
///
/// The data ends with a four byte row count, preceded by `0x00 0x00` for MMR
/// coded regions and by `0xFF 0xAC` otherwise (7.4.6.4).
fn unknown_generic_length(reader: &Reader<'_>) -> Result<usize> {
    let data = reader.tail();
    // 17 bytes of region info, then the generic region flags.
    let flags = *data.get(17).ok_or(DecodeError::UnexpectedEof)?;
    let marker: [u8; 2] = if flags & 1 != 0 {
        [0x00, 0x00]
    } else {
        [0xFF, 0xAC]
    };

    data.windows(6)
        .enumerate()
        .skip(18)
        .find(|(_, w)| w[..2] == marker)
        .map(|(pos, _)| pos + 6)
        .ok_or_else(|| SegmentError::MissingEndMarker.into())
}

/// Split embedded stream data into segments.
///
/// Segments are returned up to the first malformed one, whose error is
/// returned alongside.
pub(crate) fn parse_segments(data: &[u8]) -> (Vec<Segment<'_>>, Option<DecodeError>) {
    let mut reader = Reader::new(data);
    let mut segments = Vec::new();

    while !reader.at_end() {
        match parse_segment(&mut reader) {
            Ok(segment) => {
                let end = segment.header.kind == SegmentType::EndOfFile;
                segments.push(segment);

                if end {
                    break;
                }
            }
            Err(e) => return (segments, Some(e)),
        }
    }

    (segments, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_header() {
        let data = [
            0x00, 0x00, 0x00, 0x20, // number 32
            0x86, // immediate text region, deferred non-retain
            0x6B, // three referred segments
            0x02, 0x1E, 0x05, // 2, 30, 5
            0x04, // page 4
            0x00, 0x00, 0x00, 0x10, // data length
        ];

        let header = parse_segment_header(&mut Reader::new(&data)).unwrap();
        assert_eq!(header.number, 32);
        assert_eq!(header.kind, SegmentType::ImmediateTextRegion);
        assert_eq!(header.referred_to, [2, 30, 5]);
        assert_eq!(header.page, 4);
        assert_eq!(header.data_length, Some(16));
    }

    #[test]
    fn long_form_header() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x02, 0x34,
            0x40,
            0xE0, 0x00, 0x00, 0x09,
            0x02, 0xFD,
            0x01, 0x00, 0x00, 0x02, 0x00, 0x1E, 0x00, 0x05, 0x02, 0x00,
            0x02, 0x01, 0x02, 0x02, 0x02, 0x03, 0x02, 0x04,
            0x00, 0x00, 0x04, 0x01,
            0x00, 0x00, 0x00, 0x20,
        ];

        let header = parse_segment_header(&mut Reader::new(&data)).unwrap();
        assert_eq!(header.number, 564);
        assert_eq!(header.kind, SegmentType::SymbolDictionary);
        assert_eq!(header.referred_to, [256, 2, 30, 5, 512, 513, 514, 515, 516]);
        assert_eq!(header.page, 1025);
    }

    #[test]
    fn forward_reference_is_rejected() {
        let data = [0x00, 0x00, 0x00, 0x01, 0x30, 0x20, 0x05, 0x01, 0, 0, 0, 0];
        assert_eq!(
            parse_segment_header(&mut Reader::new(&data)).unwrap_err(),
            DecodeError::Segment(SegmentError::ForwardReference)
        );
    }

    #[test]
    fn reserved_type_is_rejected() {
        let data = [0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x01, 0, 0, 0, 0];
        assert_eq!(
            parse_segment_header(&mut Reader::new(&data)).unwrap_err(),
            DecodeError::Segment(SegmentError::ReservedType(1))
        );
    }

    #[test]
    fn truncated_stream_keeps_complete_segments() {
        let mut data = vec![0x00, 0x00, 0x00, 0x00, 0x32, 0x00, 0x01, 0, 0, 0, 4, 0, 0, 0, 7];
        data.extend([0x00, 0x00, 0x00, 0x01, 0x32]);

        let (segments, err) = parse_segments(&data);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].header.kind, SegmentType::EndOfStripe);
        assert_eq!(segments[0].data, [0, 0, 0, 7]);
        assert_eq!(err, Some(DecodeError::UnexpectedEof));
    }
}
