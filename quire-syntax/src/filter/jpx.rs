use crate::filter::{DecodeResult, Failure};
use log::warn;

/// There is no built-in JPEG 2000 codec. The data can still be decoded
/// through the image decoder hook of the decode settings.
pub(crate) fn decode(data: &[u8]) -> DecodeResult {
    warn!("no decoder for {} bytes of JPEG 2000 data", data.len());

    Err(Failure::unsupported())
}
