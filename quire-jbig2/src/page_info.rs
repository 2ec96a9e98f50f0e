//! The page information segment (7.4.8).

use quire_common::byte::Reader;

use crate::error::{DecodeError, Result};
use crate::region::CombinationOperator;

/// Marks a page whose height is given by its end of stripe segments.
pub(crate) const UNKNOWN_HEIGHT: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone)]
pub(crate) struct PageInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) default_pixel: bool,
    pub(crate) default_operator: CombinationOperator,
    pub(crate) operator_overridden: bool,
    pub(crate) striped: bool,
    pub(crate) max_stripe_size: u16,
}

pub(crate) fn parse_page_info(reader: &mut Reader<'_>) -> Result<PageInfo> {
    let width = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;
    let height = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;
    // Resolution is irrelevant to the bitmap.
    reader.skip_bytes(8).ok_or(DecodeError::UnexpectedEof)?;
    let flags = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;
    let striping = reader.read_u16().ok_or(DecodeError::UnexpectedEof)?;

    let default_operator =
        CombinationOperator::from_bits((flags >> 3) & 0x03).unwrap_or(CombinationOperator::Or);

    Ok(PageInfo {
        width,
        height,
        default_pixel: flags & 0x04 != 0,
        default_operator,
        operator_overridden: flags & 0x40 != 0,
        striped: striping & 0x8000 != 0,
        max_stripe_size: striping & 0x7FFF,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn striped_page_with_unknown_height() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x40,
            0xFF, 0xFF, 0xFF, 0xFF,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0b0001_0100,
            0x80, 0x20,
        ];
        let info = parse_page_info(&mut Reader::new(&data)).unwrap();

        assert_eq!(info.width, 64);
        assert_eq!(info.height, UNKNOWN_HEIGHT);
        assert!(info.default_pixel);
        assert_eq!(info.default_operator, CombinationOperator::Xor);
        assert!(!info.operator_overridden);
        assert!(info.striped);
        assert_eq!(info.max_stripe_size, 32);
    }
}
