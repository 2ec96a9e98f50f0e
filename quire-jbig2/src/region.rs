//! The region segment information field (7.4.1).

use quire_common::byte::Reader;

use crate::error::{DecodeError, RegionError, Result};

/// How a region is drawn onto the page (7.4.1.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CombinationOperator {
    Or,
    And,
    Xor,
    Xnor,
    Replace,
}

impl CombinationOperator {
    pub(crate) fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Or),
            1 => Some(Self::And),
            2 => Some(Self::Xor),
            3 => Some(Self::Xnor),
            4 => Some(Self::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RegionInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) operator: CombinationOperator,
}

pub(crate) fn parse_region_info(reader: &mut Reader<'_>) -> Result<RegionInfo> {
    let width = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;
    let height = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;
    let x = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;
    let y = reader.read_u32().ok_or(DecodeError::UnexpectedEof)?;
    let flags = reader.read_byte().ok_or(DecodeError::UnexpectedEof)?;

    // Larger values are reserved; treat them like REPLACE.
    let operator =
        CombinationOperator::from_bits(flags & 0x07).unwrap_or(CombinationOperator::Replace);

    Ok(RegionInfo {
        width,
        height,
        x,
        y,
        operator,
    })
}

/// Reject regions whose pixel count would not fit into memory.
pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<()> {
    const MAX_PIXELS: u64 = 1 << 30;

    if u64::from(width) * u64::from(height) > MAX_PIXELS {
        return Err(RegionError::InvalidDimension.into());
    }

    Ok(())
}
