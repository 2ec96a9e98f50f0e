use crate::config::DecodeSettings;
use crate::error::FilterErrorKind;
use crate::filter::predictor::{self, PredictorParams};
use crate::filter::{DecodeResult, Failure};
use crate::object::Dict;
use flate2::{Decompress, FlushDecompress, Status};
use log::warn;

const CHUNK: usize = 64 * 1024;

pub(crate) fn decode(data: &[u8], params: &Dict, settings: &DecodeSettings) -> DecodeResult {
    let params = PredictorParams::from_params(params);

    let decoded = match inflate(data, true, settings) {
        Ok(decoded) => decoded,
        // Some writers omit the zlib header.
        Err(Failure { prefix, kind }) if prefix.is_empty() && kind == FilterErrorKind::Corrupt => {
            inflate(data, false, settings)?
        }
        Err(failure) if failure.kind == FilterErrorKind::Corrupt => {
            warn!("flate stream is corrupt after {} bytes", failure.prefix.len());

            // The prefix is still subject to the predictor.
            return Err(Failure::corrupt(predictor::apply(failure.prefix, &params)?));
        }
        Err(failure) => return Err(failure),
    };

    predictor::apply(decoded, &params)
}

fn inflate(data: &[u8], zlib_header: bool, settings: &DecodeSettings) -> DecodeResult {
    let mut inflater = Decompress::new(zlib_header);
    let mut decoded = Vec::with_capacity((data.len() * 4).min(CHUNK));

    loop {
        if settings.cancel.is_cancelled() {
            return Err(Failure::cancelled());
        }

        if decoded.len() == decoded.capacity() {
            decoded.reserve(CHUNK);
        }

        let consumed = inflater.total_in();
        let produced = inflater.total_out();
        let input = data.get(consumed as usize..).unwrap_or_default();

        match inflater.decompress_vec(input, &mut decoded, FlushDecompress::None) {
            Ok(Status::StreamEnd) => return Ok(decoded),
            Ok(_) => {
                if decoded.len() > settings.max_decoded_size {
                    return Err(Failure::size_limit());
                }

                // The input ended before the end of the stream.
                if inflater.total_in() == consumed && inflater.total_out() == produced {
                    return Err(Failure::corrupt(decoded));
                }
            }
            Err(_) => return Err(Failure::corrupt(decoded)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::object::keys::{COLUMNS, PREDICTOR};
    use flate2::Compression;
    use flate2::write::{DeflateEncoder, ZlibEncoder};
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn zlib_round_trip() {
        let text = b"The quick brown fox jumps over the lazy dog. ".repeat(20);
        let decoded = decode(&zlib(&text), &Dict::new(), &DecodeSettings::default()).unwrap();

        assert_eq!(decoded, text);
    }

    #[test]
    fn raw_deflate_fallback() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"raw deflate").unwrap();
        let data = encoder.finish().unwrap();

        assert_eq!(
            decode(&data, &Dict::new(), &DecodeSettings::default()).unwrap(),
            b"raw deflate"
        );
    }

    #[test]
    fn truncated_stream_keeps_prefix() {
        let text: Vec<u8> = (0..20_000_u32).flat_map(|i| i.to_le_bytes()).collect();
        let compressed = zlib(&text);
        let truncated = &compressed[..compressed.len() / 2];

        let failure = decode(truncated, &Dict::new(), &DecodeSettings::default()).unwrap_err();
        assert_eq!(failure.kind, FilterErrorKind::Corrupt);
        assert!(!failure.prefix.is_empty());
        assert_eq!(failure.prefix[..], text[..failure.prefix.len()]);
    }

    #[test]
    fn output_size_is_capped() {
        let compressed = zlib(&vec![0; 1 << 20]);
        let settings = DecodeSettings {
            max_decoded_size: 1000,
            ..DecodeSettings::default()
        };

        let failure = decode(&compressed, &Dict::new(), &settings).unwrap_err();
        assert_eq!(failure.kind, FilterErrorKind::SizeLimit);
    }

    #[test]
    fn predictor_is_applied() {
        let mut params = Dict::new();
        params.insert(PREDICTOR, Object::integer(12));
        params.insert(COLUMNS, Object::integer(2));

        let data = zlib(&[2, 1, 1, 2, 1, 1]);
        assert_eq!(
            decode(&data, &params, &DecodeSettings::default()).unwrap(),
            vec![1, 1, 2, 2]
        );
    }
}
