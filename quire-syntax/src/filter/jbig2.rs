use crate::config::DecodeSettings;
use crate::filter::{DecodeResult, Failure};
use crate::object::Dict;
use crate::object::keys::JBIG2_GLOBALS;
use log::warn;

/// Decode JBIG2 data from a PDF stream.
///
/// The `params` dictionary may contain a `JBIG2Globals` stream with shared
/// segments. The document resolves that reference before the pipeline runs.
pub(crate) fn decode(data: &[u8], params: &Dict, settings: &DecodeSettings) -> DecodeResult {
    let globals = params
        .get_stream(JBIG2_GLOBALS)
        .and_then(|g| g.decoded(settings).ok());

    if params.get(JBIG2_GLOBALS).is_some() && globals.is_none() {
        warn!("JBIG2 globals are unusable, decoding without them");
    }

    let image = quire_jbig2::decode_embedded(data, globals.as_deref()).map_err(|e| {
        warn!("failed to decode JBIG2 stream: {e}");

        Failure::corrupt(Vec::new())
    })?;

    // JBIG2 uses black = 1 and white = 0, PDF uses the opposite.
    let mut packed = image.data;

    for byte in &mut packed {
        *byte = !*byte;
    }

    match image.error {
        None => Ok(packed),
        Some(_) => Err(Failure::corrupt(packed)),
    }
}
