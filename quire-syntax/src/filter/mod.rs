//! The stream filter pipeline.

mod ascii_85;
mod ascii_hex;
mod ccitt;
mod dct;
mod flate;
mod jbig2;
mod jpx;
mod lzw;
mod predictor;
mod run_length;

use crate::config::DecodeSettings;
use crate::error::{FilterError, FilterErrorKind};
use crate::object::keys::*;
use crate::object::{Dict, Object, Stream};
use bytes::Bytes;
use log::{debug, warn};
use smallvec::SmallVec;

/// A stream filter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    /// `ASCIIHexDecode`.
    AsciiHexDecode,
    /// `ASCII85Decode`.
    Ascii85Decode,
    /// `LZWDecode`.
    LzwDecode,
    /// `FlateDecode`.
    FlateDecode,
    /// `RunLengthDecode`.
    RunLengthDecode,
    /// `CCITTFaxDecode`.
    CcittFaxDecode,
    /// `JBIG2Decode`.
    Jbig2Decode,
    /// `DCTDecode`.
    DctDecode,
    /// `JPXDecode`.
    JpxDecode,
    /// `Crypt`. Decryption happens before the pipeline, so this passes data
    /// through.
    Crypt,
}

impl Filter {
    /// Look up a filter by its name or abbreviation.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        let filter = match name {
            ASCII_HEX_DECODE | AHX => Self::AsciiHexDecode,
            ASCII85_DECODE | A85 => Self::Ascii85Decode,
            LZW_DECODE | LZW => Self::LzwDecode,
            FLATE_DECODE | FL => Self::FlateDecode,
            RUN_LENGTH_DECODE | RL => Self::RunLengthDecode,
            CCITTFAX_DECODE | CCF => Self::CcittFaxDecode,
            JBIG2_DECODE => Self::Jbig2Decode,
            DCT_DECODE | DCT => Self::DctDecode,
            JPX_DECODE => Self::JpxDecode,
            CRYPT => Self::Crypt,
            _ => return None,
        };

        Some(filter)
    }

    /// The full name of the filter.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AsciiHexDecode => "ASCIIHexDecode",
            Self::Ascii85Decode => "ASCII85Decode",
            Self::LzwDecode => "LZWDecode",
            Self::FlateDecode => "FlateDecode",
            Self::RunLengthDecode => "RunLengthDecode",
            Self::CcittFaxDecode => "CCITTFaxDecode",
            Self::Jbig2Decode => "JBIG2Decode",
            Self::DctDecode => "DCTDecode",
            Self::JpxDecode => "JPXDecode",
            Self::Crypt => "Crypt",
        }
    }

    fn is_image(&self) -> bool {
        matches!(
            self,
            Self::CcittFaxDecode | Self::Jbig2Decode | Self::DctDecode | Self::JpxDecode
        )
    }

    fn apply(&self, data: &[u8], params: &Dict, settings: &DecodeSettings) -> DecodeResult {
        if self.is_image()
            && let Some(decoder) = &settings.image_decoder
            && let Some(decoded) = decoder.decode(*self, data, params)
        {
            return Ok(decoded);
        }

        let result = match self {
            Self::AsciiHexDecode => ascii_hex::decode(data),
            Self::Ascii85Decode => ascii_85::decode(data),
            Self::RunLengthDecode => run_length::decode(data),
            Self::LzwDecode => lzw::decode(data, params, settings),
            Self::FlateDecode => flate::decode(data, params, settings),
            Self::CcittFaxDecode => ccitt::decode(data, params, settings),
            Self::Jbig2Decode => jbig2::decode(data, params, settings),
            Self::DctDecode => dct::decode(data, params),
            Self::JpxDecode => jpx::decode(data),
            Self::Crypt => Ok(data.to_vec()),
        };

        let limit = settings.max_decoded_size;

        match result {
            Ok(decoded) if decoded.len() > limit => Err(Failure::size_limit()),
            Err(mut failure) if failure.prefix.len() > limit => {
                failure.prefix.truncate(limit);
                Err(failure)
            }
            other => other,
        }
    }
}

/// The filters of a stream, with their parameters, in application order.
pub type FilterChain = SmallVec<[(Filter, Dict); 2]>;

/// Read the filter chain of a stream dictionary.
///
/// `DecodeParms` (or `DP`) is read in parallel to `Filter`. Missing or null
/// parameter entries default to an empty dictionary.
pub fn filter_chain(dict: &Dict) -> Result<FilterChain, FilterError> {
    let names: SmallVec<[&Object; 2]> = match dict.get(FILTER) {
        None | Some(Object::Null) => SmallVec::new(),
        Some(Object::Array(items)) => items.iter().collect(),
        Some(other) => SmallVec::from_elem(other, 1),
    };

    let params = dict.get(DECODE_PARMS).or_else(|| dict.get(DP));
    let param_at = |i: usize| -> Dict {
        let entry = match params {
            Some(Object::Array(items)) => items.get(i),
            Some(single) if i == 0 => Some(single),
            _ => None,
        };

        entry.and_then(Object::as_dict).cloned().unwrap_or_default()
    };

    let mut chain = FilterChain::new();

    for (i, name) in names.into_iter().enumerate() {
        let filter = name.as_name().and_then(|n| Filter::from_name(n));

        let Some(filter) = filter else {
            warn!("unknown filter: {name}");

            return Err(FilterError {
                filter: None,
                kind: FilterErrorKind::Unsupported,
                prefix: Bytes::new(),
            });
        };

        chain.push((filter, param_at(i)));
    }

    Ok(chain)
}

/// Apply a filter chain to `data`.
///
/// If a filter finds corrupt data, the prefix it could decode is fed through
/// the rest of the chain, and the error carries that final output. Any other
/// failure stops the chain; the error then carries the output of the last
/// filter that succeeded.
pub fn decode(
    data: &[u8],
    chain: &[(Filter, Dict)],
    settings: &DecodeSettings,
) -> Result<Bytes, FilterError> {
    let mut current = Bytes::copy_from_slice(data);
    let mut first_failure: Option<Filter> = None;

    for (filter, params) in chain {
        if settings.cancel.is_cancelled() {
            return Err(FilterError {
                filter: Some(*filter),
                kind: FilterErrorKind::Cancelled,
                prefix: current,
            });
        }

        match filter.apply(&current, params, settings) {
            Ok(decoded) => current = Bytes::from(decoded),
            Err(Failure {
                prefix,
                kind: FilterErrorKind::Corrupt,
            }) => {
                warn!(
                    "{} data is corrupt, continuing with {} decoded bytes",
                    filter.name(),
                    prefix.len()
                );

                first_failure.get_or_insert(*filter);
                current = Bytes::from(prefix);
            }
            Err(Failure { kind, .. }) => {
                debug!("{} failed: {kind}", filter.name());

                return Err(FilterError {
                    filter: Some(*filter),
                    kind,
                    prefix: current,
                });
            }
        }
    }

    match first_failure {
        None => Ok(current),
        Some(filter) => Err(FilterError {
            filter: Some(filter),
            kind: FilterErrorKind::Corrupt,
            prefix: current,
        }),
    }
}

pub(crate) fn decode_stream(stream: &Stream, settings: &DecodeSettings) -> Result<Bytes, FilterError> {
    let chain = filter_chain(stream.dict())?;

    if chain.is_empty() {
        return Ok(stream.raw_data().clone());
    }

    decode(stream.raw_data(), &chain, settings)
}

/// A filter that could not decode all of its input.
#[derive(Debug)]
pub(crate) struct Failure {
    /// What could be decoded before the failure.
    pub(crate) prefix: Vec<u8>,
    pub(crate) kind: FilterErrorKind,
}

impl Failure {
    pub(crate) fn corrupt(prefix: Vec<u8>) -> Self {
        Self {
            prefix,
            kind: FilterErrorKind::Corrupt,
        }
    }

    pub(crate) fn unsupported() -> Self {
        Self {
            prefix: Vec::new(),
            kind: FilterErrorKind::Unsupported,
        }
    }

    pub(crate) fn size_limit() -> Self {
        Self {
            prefix: Vec::new(),
            kind: FilterErrorKind::SizeLimit,
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            prefix: Vec::new(),
            kind: FilterErrorKind::Cancelled,
        }
    }
}

pub(crate) type DecodeResult = Result<Vec<u8>, Failure>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CancelToken;
    use crate::object::Name;

    fn chain_dict(filter: Object, params: Option<Object>) -> Dict {
        let mut dict = Dict::new();
        dict.insert(FILTER, filter);

        if let Some(params) = params {
            dict.insert(DECODE_PARMS, params);
        }

        dict
    }

    #[test]
    fn names_and_abbreviations() {
        assert_eq!(Filter::from_name(b"Fl"), Some(Filter::FlateDecode));
        assert_eq!(Filter::from_name(b"ASCII85Decode"), Some(Filter::Ascii85Decode));
        assert_eq!(Filter::from_name(b"CCF"), Some(Filter::CcittFaxDecode));
        assert_eq!(Filter::from_name(b"Brotli"), None);
        assert_eq!(Filter::DctDecode.name(), "DCTDecode");
    }

    #[test]
    fn chain_length_matches_filters() {
        let dict = chain_dict(
            Object::Array(vec![Object::name(A85), Object::name(FLATE_DECODE)]),
            Some(Object::Array(vec![Object::Null])),
        );
        let chain = filter_chain(&dict).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], (Filter::Ascii85Decode, Dict::new()));
        assert_eq!(chain[1], (Filter::FlateDecode, Dict::new()));
    }

    #[test]
    fn single_filter_with_params() {
        let mut params = Dict::new();
        params.insert(PREDICTOR, Object::integer(12));
        let dict = chain_dict(Object::name(LZW), Some(Object::Dict(params.clone())));

        assert_eq!(
            filter_chain(&dict).unwrap().as_slice(),
            &[(Filter::LzwDecode, params)]
        );
    }

    #[test]
    fn unknown_filter_is_unsupported() {
        let dict = chain_dict(Object::Name(Name::new(b"Brotli")), None);
        let err = filter_chain(&dict).unwrap_err();

        assert_eq!(err.filter, None);
        assert_eq!(err.kind, FilterErrorKind::Unsupported);
    }

    #[test]
    fn chain_is_applied_in_order() {
        // Run-length data [2, b'a', b'b', b'c', 254, b'x', 128] as hex.
        let chain = [
            (Filter::AsciiHexDecode, Dict::new()),
            (Filter::RunLengthDecode, Dict::new()),
        ];
        let decoded = decode(b"02616263FE7880>", &chain, &DecodeSettings::default()).unwrap();

        assert_eq!(decoded, &b"abcxxx"[..]);
    }

    #[test]
    fn corrupt_prefix_flows_through() {
        // The hex data contains garbage after the first run.
        let chain = [
            (Filter::AsciiHexDecode, Dict::new()),
            (Filter::RunLengthDecode, Dict::new()),
        ];
        let err = decode(b"FE41 zz 80>", &chain, &DecodeSettings::default()).unwrap_err();

        assert_eq!(err.filter, Some(Filter::AsciiHexDecode));
        assert_eq!(err.kind, FilterErrorKind::Corrupt);
        assert_eq!(err.prefix, &b"AAA"[..]);
        assert_eq!(err.prefix_len(), 3);
    }

    #[test]
    fn size_limit_stops_chain() {
        let settings = DecodeSettings {
            max_decoded_size: 4,
            ..DecodeSettings::default()
        };
        let err = decode(&[0xF9, 0x61], &[(Filter::RunLengthDecode, Dict::new())], &settings)
            .unwrap_err();

        assert_eq!(err.kind, FilterErrorKind::SizeLimit);
    }

    #[test]
    fn unsupported_filter_keeps_earlier_output() {
        let chain = [
            (Filter::AsciiHexDecode, Dict::new()),
            (Filter::JpxDecode, Dict::new()),
        ];
        let err = decode(b"6A7032>", &chain, &DecodeSettings::default()).unwrap_err();

        assert_eq!(err.filter, Some(Filter::JpxDecode));
        assert_eq!(err.kind, FilterErrorKind::Unsupported);
        assert_eq!(err.prefix, &b"jp2"[..]);
    }

    #[test]
    fn cancellation_is_checked() {
        let settings = DecodeSettings {
            cancel: CancelToken::from_fn(|| true),
            ..DecodeSettings::default()
        };
        let err = decode(b"41>", &[(Filter::AsciiHexDecode, Dict::new())], &settings)
            .unwrap_err();

        assert_eq!(err.kind, FilterErrorKind::Cancelled);
    }

    #[test]
    fn image_decoder_takes_precedence() {
        struct Fixed;

        impl crate::config::ImageDecoder for Fixed {
            fn decode(&self, filter: Filter, _: &[u8], _: &Dict) -> Option<Vec<u8>> {
                (filter == Filter::JpxDecode).then(|| vec![1, 2, 3])
            }
        }

        let settings = DecodeSettings {
            image_decoder: Some(std::sync::Arc::new(Fixed)),
            ..DecodeSettings::default()
        };

        assert_eq!(
            decode(b"jp2", &[(Filter::JpxDecode, Dict::new())], &settings).unwrap(),
            &[1_u8, 2, 3][..]
        );
        assert_eq!(
            decode(b"jp2", &[(Filter::JpxDecode, Dict::new())], &DecodeSettings::default())
                .unwrap_err()
                .kind,
            FilterErrorKind::Unsupported
        );
    }
}
